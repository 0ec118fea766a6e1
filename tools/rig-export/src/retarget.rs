//! Retarget an animation file onto another skeleton file

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use rig_common::formats::anm::AnmVersion;
use rig_retarget::{AutoMapOptions, JointMap, RetargetOptions};

use crate::convert::{load_animation, load_skeleton, read_file, save_animation};

/// Where the joint map comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MapSource {
    /// A toml file with a `[joints]` table
    File(PathBuf),
    /// Name matching between the two skeletons
    Auto(AutoMapOptions),
}

/// One animation to retarget
#[derive(Debug, Clone)]
pub struct RetargetJob {
    pub source_skeleton: PathBuf,
    pub target_skeleton: PathBuf,
    pub animation: PathBuf,
    pub output: PathBuf,
    pub map: MapSource,
    pub frame_rate: Option<f32>,
    pub version: AnmVersion,
}

pub fn load_joint_map(path: &Path) -> Result<JointMap> {
    let bytes = read_file(path)?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("Joint map {:?} is not valid UTF-8", path))?;
    JointMap::from_toml_str(&text).with_context(|| format!("Failed to parse joint map {:?}", path))
}

/// Run one job, returning the number of retargeted tracks
pub fn retarget_file(job: &RetargetJob) -> Result<usize> {
    let source = load_skeleton(&job.source_skeleton)?;
    let target = load_skeleton(&job.target_skeleton)?;
    let animation = load_animation(&job.animation)?;

    let map = match &job.map {
        MapSource::File(path) => load_joint_map(path)?,
        MapSource::Auto(options) => JointMap::auto(&source, &target, options),
    };
    tracing::debug!("Joint map has {} entries", map.len());

    let options = RetargetOptions {
        frame_rate: job.frame_rate,
    };
    let retargeted = rig_retarget::retarget(&source, &animation, &target, &map, &options)
        .with_context(|| format!("Failed to retarget {:?}", job.animation))?;
    save_animation(&retargeted, &job.output, job.version)?;

    tracing::info!(
        "Retargeted {:?}: {} tracks at {} fps",
        job.animation,
        retargeted.tracks.len(),
        retargeted.frame_rate
    );
    Ok(retargeted.tracks.len())
}
