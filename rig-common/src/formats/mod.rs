//! Binary codecs for the three asset families
//!
//! Each codec module exposes `detect_version`, `decode` and `encode` over
//! byte slices. No codec touches the filesystem.

pub mod anm;
pub mod skl;
pub mod skn;

/// Asset family of a byte buffer, identified by its magic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Skeleton,
    Mesh,
    Animation,
}

impl AssetKind {
    /// Identify the family from the leading bytes, `None` when no codec
    /// recognizes them
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if skl::detect_version(bytes).is_ok() {
            Some(Self::Skeleton)
        } else if skn::detect_version(bytes).is_ok() {
            Some(Self::Mesh)
        } else if anm::detect_version(bytes).is_ok() {
            Some(Self::Animation)
        } else {
            None
        }
    }

    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            Self::Skeleton => "skl",
            Self::Mesh => "skn",
            Self::Animation => "anm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Animation, Joint, Skeleton, Transform};

    #[test]
    fn test_detect_each_family() {
        let skeleton = Skeleton::new(vec![Joint::new("Root", None, Transform::IDENTITY)], vec![0]).unwrap();
        let skl = skl::encode(&skeleton, skl::SklVersion::Modern).unwrap();
        assert_eq!(AssetKind::detect(&skl), Some(AssetKind::Skeleton));

        let anm = anm::encode(&Animation::default(), anm::EncodeMode::Uncompressed).unwrap();
        assert_eq!(AssetKind::detect(&anm), Some(AssetKind::Animation));

        let mut skn = 0x0011_2233u32.to_le_bytes().to_vec();
        skn.extend_from_slice(&[1, 0, 1, 0]);
        assert_eq!(AssetKind::detect(&skn), Some(AssetKind::Mesh));

        assert_eq!(AssetKind::detect(b"not an asset"), None);
        assert_eq!(AssetKind::Mesh.extension(), "skn");
    }
}
