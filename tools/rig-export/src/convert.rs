//! Single-file conversions between SKL, SKN and ANM generations
//!
//! All filesystem access of the tool goes through here; the codecs only see
//! byte slices.

use anyhow::{Context, Result};
use std::path::Path;

use rig_common::formats::anm::{self, AnmVersion};
use rig_common::formats::skl::{self, SklVersion};
use rig_common::formats::skn::{self, SknDecodeOptions, SknVersion};
use rig_common::{Animation, Mesh, Skeleton};

/// Read a whole input file
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))
}

/// Write `bytes` to `path`, creating missing parent directories
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))
}

pub fn load_skeleton(path: &Path) -> Result<Skeleton> {
    let bytes = read_file(path)?;
    skl::decode(&bytes).with_context(|| format!("Failed to decode skeleton {:?}", path))
}

pub fn load_animation(path: &Path) -> Result<Animation> {
    let bytes = read_file(path)?;
    anm::decode(&bytes).with_context(|| format!("Failed to decode animation {:?}", path))
}

/// Decode a mesh and check it against the skeleton it is skinned to
pub fn load_mesh(path: &Path, skeleton: &Skeleton, repair_weights: bool) -> Result<Mesh> {
    decode_mesh(&read_file(path)?, path, skeleton, repair_weights)
}

fn decode_mesh(bytes: &[u8], path: &Path, skeleton: &Skeleton, repair_weights: bool) -> Result<Mesh> {
    let options = SknDecodeOptions {
        repair_weights,
        ..SknDecodeOptions::default()
    };
    skn::decode_with(bytes, skeleton, &options)
        .with_context(|| format!("Failed to decode mesh {:?}", path))
}

/// Re-encode a skeleton as `version`
pub fn convert_skeleton(input: &Path, output: &Path, version: SklVersion) -> Result<()> {
    let skeleton = load_skeleton(input)?;
    let bytes = skl::encode(&skeleton, version)
        .with_context(|| format!("Failed to encode {} skeleton", version.name()))?;
    write_file(output, &bytes)?;

    tracing::info!(
        "Exported skeleton: {} joints as {}",
        skeleton.joint_count(),
        version.name()
    );
    Ok(())
}

/// Re-encode a mesh as `version`, keeping the input's generation when `None`
pub fn convert_mesh(
    input: &Path,
    skeleton: &Path,
    output: &Path,
    version: Option<SknVersion>,
    repair_weights: bool,
) -> Result<()> {
    let skeleton = load_skeleton(skeleton)?;
    let bytes = read_file(input)?;
    let version = match version {
        Some(version) => version,
        None => skn::detect_version(&bytes)
            .with_context(|| format!("Failed to identify mesh {:?}", input))?,
    };
    let mesh = decode_mesh(&bytes, input, &skeleton, repair_weights)?;
    let encoded = skn::encode_version(&mesh, version)
        .with_context(|| format!("Failed to encode mesh as v{}", version.major()))?;
    write_file(output, &encoded)?;

    tracing::info!(
        "Exported mesh: {} vertices, {} submeshes as v{}",
        mesh.vertices.len(),
        mesh.submeshes.len(),
        version.major()
    );
    Ok(())
}

/// Re-encode an animation as `version`
pub fn convert_animation(input: &Path, output: &Path, version: AnmVersion) -> Result<()> {
    let animation = load_animation(input)?;
    save_animation(&animation, output, version)?;

    tracing::info!(
        "Exported animation: {} tracks, {} frames as {}",
        animation.tracks.len(),
        animation.frame_count(),
        version.name()
    );
    Ok(())
}

/// Encode and write an animation
pub fn save_animation(animation: &Animation, output: &Path, version: AnmVersion) -> Result<()> {
    if version == AnmVersion::Compressed {
        let bound = anm::error_bound(animation).context("Failed to measure animation ranges")?;
        tracing::debug!(
            "Compressed error bound: translation {:?}, rotation {}, scale {:?}",
            bound.translation,
            bound.rotation,
            bound.scale
        );
    }
    let bytes = anm::encode_version(animation, version)
        .with_context(|| format!("Failed to encode {} animation", version.name()))?;
    write_file(output, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_common::{Joint, Transform};

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/root.skl");
        let skeleton =
            Skeleton::new(vec![Joint::new("Root", None, Transform::IDENTITY)], vec![0]).unwrap();
        write_file(&path, &skl::encode(&skeleton, SklVersion::Modern).unwrap()).unwrap();

        let loaded = load_skeleton(&path).unwrap();
        assert_eq!(loaded.joints()[0].name, "Root");
    }

    #[test]
    fn test_missing_input_names_the_path() {
        let err = load_animation(Path::new("does/not/exist.anm")).unwrap_err();
        assert!(format!("{err:#}").contains("exist.anm"), "{err:#}");
    }
}
