//! Human-readable summaries of asset files

use anyhow::{Context, Result, bail};
use std::fmt::Write;
use std::path::Path;

use rig_common::formats::{anm, skl, skn};
use rig_common::{AssetKind, Skeleton};

use crate::convert::{load_skeleton, read_file};

/// Describe the asset at `path`.
///
/// Meshes are only fully decoded when `skeleton` names the skeleton they
/// are skinned to; otherwise just the generation is reported.
pub fn inspect(path: &Path, skeleton: Option<&Path>) -> Result<String> {
    let bytes = read_file(path)?;
    let Some(kind) = AssetKind::detect(&bytes) else {
        bail!("{:?} is not a recognized SKL, SKN or ANM file", path);
    };

    let mut out = String::new();
    match kind {
        AssetKind::Skeleton => describe_skeleton(&mut out, &bytes)?,
        AssetKind::Mesh => {
            let skeleton = skeleton.map(load_skeleton).transpose()?;
            describe_mesh(&mut out, &bytes, skeleton.as_ref())?;
        }
        AssetKind::Animation => describe_animation(&mut out, &bytes)?,
    }
    Ok(out)
}

fn describe_skeleton(out: &mut String, bytes: &[u8]) -> Result<()> {
    let version = skl::detect_version(bytes)?;
    let skeleton = skl::decode(bytes).context("Failed to decode skeleton")?;
    writeln!(
        out,
        "SKL {}: {} joints, {} influences",
        version.name(),
        skeleton.joint_count(),
        skeleton.influences().len()
    )?;
    for (i, joint) in skeleton.joints().iter().enumerate() {
        let parent = joint
            .parent
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        writeln!(
            out,
            "  [{:3}] {:<24} parent {:>3}  hash 0x{:08X}",
            i, joint.name, parent, joint.hash
        )?;
    }
    Ok(())
}

fn describe_mesh(out: &mut String, bytes: &[u8], skeleton: Option<&Skeleton>) -> Result<()> {
    let version = skn::detect_version(bytes)?;
    let Some(skeleton) = skeleton else {
        writeln!(out, "SKN v{} (pass --skeleton for details)", version.major())?;
        return Ok(());
    };

    let mesh = skn::decode(bytes, skeleton).context("Failed to decode mesh")?;
    let (min, max) = mesh.bounding_box();
    writeln!(
        out,
        "SKN v{}: {} vertices, {} indices, format {}",
        version.major(),
        mesh.vertices.len(),
        mesh.indices.len(),
        mesh.vertex_format.name()
    )?;
    writeln!(out, "  bounds {:?} .. {:?}", min, max)?;
    for submesh in &mesh.submeshes {
        writeln!(
            out,
            "  {:<24} vertices {}+{}  indices {}+{}",
            submesh.material,
            submesh.vertex_start,
            submesh.vertex_count,
            submesh.index_start,
            submesh.index_count
        )?;
    }
    Ok(())
}

fn describe_animation(out: &mut String, bytes: &[u8]) -> Result<()> {
    let version = anm::detect_version(bytes)?;
    let animation = anm::decode(bytes).context("Failed to decode animation")?;
    writeln!(
        out,
        "ANM {}: {} tracks, {} fps, {:.3}s ({} frames)",
        version.name(),
        animation.tracks.len(),
        animation.frame_rate,
        animation.duration,
        animation.frame_count()
    )?;
    for track in animation.tracks.values() {
        writeln!(
            out,
            "  0x{:08X} {:<24} {} keys",
            track.joint_hash,
            track.name.as_deref().unwrap_or("-"),
            track.keys.len()
        )?;
    }
    Ok(())
}
