//! Secondary motion baking
//!
//! A secondary-motion solver (hair, cloth, tails) runs outside this crate.
//! It sees the local pose of every frame and rewrites the joints it drives;
//! [`bake_secondary_motion`] writes those joints back as tracks.

use rig_common::model::frame_time;
use rig_common::{Animation, Keyframe, Skeleton, Track, Transform};

use crate::error::RetargetError;
use crate::retarget::output_frame_count;

/// Per-frame pose adjustment
pub trait SecondaryMotion {
    /// Adjust `pose` (one local transform per joint of `skeleton`) at `frame`
    fn adjust(&mut self, skeleton: &Skeleton, frame: usize, time: f32, pose: &mut [Transform]);
}

impl<F> SecondaryMotion for F
where
    F: FnMut(&Skeleton, usize, f32, &mut [Transform]),
{
    fn adjust(&mut self, skeleton: &Skeleton, frame: usize, time: f32, pose: &mut [Transform]) {
        self(skeleton, frame, time, pose)
    }
}

/// Run `motion` over every frame of `animation` and bake the joints in
/// `joints` (by hash) into new tracks.
///
/// Tracks of other joints are copied unchanged. Hashes missing from the
/// skeleton are skipped.
pub fn bake_secondary_motion<M: SecondaryMotion + ?Sized>(
    skeleton: &Skeleton,
    animation: &Animation,
    joints: &[u32],
    motion: &mut M,
) -> Result<Animation, RetargetError> {
    let frame_rate = animation.frame_rate;
    if !(frame_rate.is_finite() && frame_rate > 0.0) {
        return Err(RetargetError::InvalidFrameRate { frame_rate });
    }
    animation.validate()?;

    let driven: Vec<usize> = joints
        .iter()
        .filter_map(|&hash| {
            let index = skeleton.find_by_hash(hash);
            if index.is_none() {
                tracing::warn!("Secondary joint 0x{:08X} is not in the skeleton", hash);
            }
            index
        })
        .collect();

    let frame_count = output_frame_count(animation, frame_rate);
    let mut keys: Vec<Vec<Keyframe>> = vec![Vec::with_capacity(frame_count); driven.len()];
    for frame in 0..frame_count {
        let time = frame_time(frame, frame_rate);
        let mut pose = animation.pose_at(skeleton, time);
        motion.adjust(skeleton, frame, time, &mut pose);
        for (slot, &joint) in driven.iter().enumerate() {
            keys[slot].push(Keyframe::new(time, pose[joint]));
        }
    }

    let mut output = animation.clone();
    for (&joint, keys) in driven.iter().zip(keys) {
        let joint = &skeleton.joints()[joint];
        output.insert_track(Track {
            joint_hash: joint.hash,
            name: Some(joint.name.clone()),
            keys,
        });
    }
    tracing::debug!(
        "Baked secondary motion of {} joints over {} frames",
        driven.len(),
        frame_count
    );
    Ok(output)
}
