//! SKL skeleton format (.skl)
//!
//! Two families share the extension:
//!
//! ```text
//! Legacy ("r3d2sklt", version 1 or 2):
//! 0x00: magic [u8; 8]          - "r3d2sklt"
//! 0x08: version u32            - 1 or 2
//! 0x0C: skeleton_id u32
//! 0x10: joint_count u32
//! 0x14: joints                 - joint_count × 88 bytes, world bind matrices
//! v2:   influence_count u32, influences [u32]
//!
//! Modern (version 0):
//! 0x00: file_size u32
//! 0x04: magic u32              - 0x22FD4FC3
//! 0x08: version u32            - 0
//! 0x0C: ...                    - see `modern.rs`, local bind transforms
//! ```
//!
//! Each generation has its own decode/encode pair selected once from the
//! leading bytes.

mod legacy;
mod modern;


use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;
use crate::model::Skeleton;
use crate::stream::BinaryReader;

pub use modern::SklHeader;

/// Magic of the legacy family
pub const SKL_LEGACY_MAGIC: &[u8; 8] = b"r3d2sklt";

/// Magic of the modern family (at offset 4)
pub const SKL_MODERN_MAGIC: u32 = 0x22FD_4FC3;

/// Recognized SKL generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SklVersion {
    /// Legacy world-matrix layout, identity influence table
    Legacy1,
    /// Legacy world-matrix layout with an influence table
    Legacy2,
    /// Hashed joints with local bind transforms
    Modern,
}

impl SklVersion {
    pub fn name(self) -> &'static str {
        match self {
            Self::Legacy1 => "legacy1",
            Self::Legacy2 => "legacy2",
            Self::Modern => "modern",
        }
    }
}

impl std::str::FromStr for SklVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy1" | "v1" | "1" => Ok(Self::Legacy1),
            "legacy2" | "v2" | "2" => Ok(Self::Legacy2),
            "modern" | "v0" | "0" => Ok(Self::Modern),
            other => Err(format!("unknown skeleton version '{other}'")),
        }
    }
}

/// Identify the generation from the leading bytes
pub fn detect_version(bytes: &[u8]) -> Result<SklVersion, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.ensure(12)?;
    let magic = r.read_array::<8>()?;
    let version = r.read_u32()?;

    if &magic == SKL_LEGACY_MAGIC {
        return match version {
            1 => Ok(SklVersion::Legacy1),
            2 => Ok(SklVersion::Legacy2),
            _ => Err(FormatError::UnsupportedVersion {
                format: "SKL",
                version,
            }),
        };
    }

    let modern_magic = LittleEndian::read_u32(&magic[4..8]);
    if modern_magic == SKL_MODERN_MAGIC {
        return match version {
            0 => Ok(SklVersion::Modern),
            _ => Err(FormatError::UnsupportedVersion {
                format: "SKL",
                version,
            }),
        };
    }

    Err(FormatError::BadMagic { format: "SKL" })
}

/// Decode a skeleton of any recognized generation
pub fn decode(bytes: &[u8]) -> Result<Skeleton, FormatError> {
    let version = detect_version(bytes)?;
    let skeleton = match version {
        SklVersion::Legacy1 | SklVersion::Legacy2 => legacy::decode(bytes)?,
        SklVersion::Modern => modern::decode(bytes)?,
    };
    tracing::debug!(
        "Decoded {} SKL: {} joints, {} influences",
        version.name(),
        skeleton.joint_count(),
        skeleton.influences().len()
    );
    Ok(skeleton)
}

/// Encode `skeleton` as `version`.
///
/// Legacy generations do not store hashes or flags (hashes are recomputed
/// from names on decode), and version 1 does not store the influence table.
pub fn encode(skeleton: &Skeleton, version: SklVersion) -> Result<Vec<u8>, FormatError> {
    let bytes = match version {
        SklVersion::Legacy1 => legacy::encode(skeleton, 1)?,
        SklVersion::Legacy2 => legacy::encode(skeleton, 2)?,
        SklVersion::Modern => modern::encode(skeleton)?,
    };
    tracing::debug!(
        "Encoded {} SKL: {} joints, {} bytes",
        version.name(),
        skeleton.joint_count(),
        bytes.len()
    );
    Ok(bytes)
}
