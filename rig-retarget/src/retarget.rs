//! Bind-pose delta retargeting
//!
//! For every mapped joint and output frame:
//!
//! ```text
//! rotation:     out_r = dst_bind_r · (src_bind_r⁻¹ · cur_r)
//! translation:  out_t = dst_bind_t + (cur_t − src_bind_t) · ratio
//! scale:        out_s = dst_bind_s · (cur_s / src_bind_s)
//! ```
//!
//! `ratio` is the target bone length over the source bone length, where the
//! bone of a joint runs from its parent to it in the bind pose. A joint's
//! local translation lies along that bone. Roots use 1.

use glam::Vec3;
use rig_common::model::frame_time;
use rig_common::{Animation, Keyframe, Skeleton, Track, Transform};

use crate::error::RetargetError;
use crate::joint_map::JointMap;

/// Bone lengths at or below this are degenerate
const MIN_BONE_LENGTH: f32 = 1e-6;

/// Scale components at or below this are not divided by
const MIN_SCALE: f32 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetargetOptions {
    /// Output frame rate, the source animation's when `None`
    pub frame_rate: Option<f32>,
}

/// Per-joint constants of one mapping
struct JointPair<'a> {
    track: &'a Track,
    source_bind: Transform,
    target_bind: Transform,
    target_hash: u32,
    target_name: &'a str,
    ratio: f32,
}

impl JointPair<'_> {
    fn apply(&self, current: Transform) -> Transform {
        let src = &self.source_bind;
        let dst = &self.target_bind;

        let delta_rotation = src.rotation.inverse() * current.rotation;
        let delta_translation = current.translation - src.translation;
        let scale_ratio = Vec3::select(
            src.scale.abs().cmpgt(Vec3::splat(MIN_SCALE)),
            current.scale / src.scale,
            Vec3::ONE,
        );

        Transform::new(
            dst.translation + delta_translation * self.ratio,
            (dst.rotation * delta_rotation).normalize(),
            dst.scale * scale_ratio,
        )
    }
}

fn check_frame_rate(frame_rate: f32) -> Result<f32, RetargetError> {
    if frame_rate.is_finite() && frame_rate > 0.0 {
        Ok(frame_rate)
    } else {
        Err(RetargetError::InvalidFrameRate { frame_rate })
    }
}

/// Bone length ratio of a mapped pair.
///
/// Joints sitting on their parent in both bind poses use 1.
fn length_ratio(
    source: &Skeleton,
    source_index: usize,
    target: &Skeleton,
    target_index: usize,
) -> Result<f32, RetargetError> {
    let Some(source_length) = source.bone_length(source_index) else {
        return Ok(1.0);
    };
    let target_length = target.bone_length(target_index).unwrap_or(source_length);
    if source_length > MIN_BONE_LENGTH {
        Ok(target_length / source_length)
    } else if target_length <= MIN_BONE_LENGTH {
        Ok(1.0)
    } else {
        Err(RetargetError::DegenerateBone {
            joint: source.joints()[source_index].name.clone(),
        })
    }
}

/// Number of output frames for `animation` resampled at `frame_rate`
pub(crate) fn output_frame_count(animation: &Animation, frame_rate: f32) -> usize {
    let frames = if animation.duration > 0.0 {
        (animation.duration * frame_rate).round() as usize
    } else {
        0
    };
    frames.max(1)
}

/// Remap `animation` from `source` onto `target`.
///
/// Only target joints reached through `map` from an animated source joint
/// receive a track; every other target joint keeps its bind pose. The
/// result is sampled at every frame of the output frame grid.
pub fn retarget(
    source: &Skeleton,
    animation: &Animation,
    target: &Skeleton,
    map: &JointMap,
    options: &RetargetOptions,
) -> Result<Animation, RetargetError> {
    let frame_rate = check_frame_rate(options.frame_rate.unwrap_or(animation.frame_rate))?;
    animation.validate()?;

    let mut pairs = Vec::new();
    for (s, t) in map.resolve_animated(source, target, animation) {
        let source_joint = &source.joints()[s];
        let Some(track) = animation.track(source_joint.hash) else {
            continue;
        };
        let target_joint = &target.joints()[t];
        pairs.push(JointPair {
            track,
            source_bind: source_joint.local,
            target_bind: target_joint.local,
            target_hash: target_joint.hash,
            target_name: &target_joint.name,
            ratio: length_ratio(source, s, target, t)?,
        });
    }
    if pairs.is_empty() {
        return Err(RetargetError::NoMappedJoints);
    }

    let frame_count = output_frame_count(animation, frame_rate);
    let mut output = Animation::new(frame_rate, animation.duration);
    for pair in &pairs {
        let keys = (0..frame_count)
            .map(|f| {
                let time = frame_time(f, frame_rate);
                let current = pair.track.sample(time).unwrap_or(pair.source_bind);
                Keyframe::new(time, pair.apply(current))
            })
            .collect();
        output.insert_track(Track {
            joint_hash: pair.target_hash,
            name: Some(pair.target_name.to_string()),
            keys,
        });
    }

    tracing::debug!(
        "Retargeted {} of {} tracks onto {} joints ({} frames at {} fps)",
        pairs.len(),
        animation.tracks.len(),
        target.joint_count(),
        frame_count,
        frame_rate
    );
    Ok(output)
}
