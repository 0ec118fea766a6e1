//! Keyframed animation model
//!
//! Tracks are keyed by joint hash and sampled with linear interpolation for
//! translation and scale and spherical interpolation for rotation. Times
//! outside a track's key range clamp to the nearest boundary key.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use super::skeleton::Skeleton;
use super::transform::Transform;
use crate::error::FormatError;
use crate::hash::elf_hash;

/// Frame rate used when a file does not declare one
pub const DEFAULT_FRAME_RATE: f32 = 30.0;

/// Time of frame `frame` on a grid of `frame_rate` frames per second
#[inline]
pub fn frame_time(frame: usize, frame_rate: f32) -> f32 {
    frame as f32 / frame_rate
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    /// Seconds from the start of the animation
    pub time: f32,
    pub translation: Vec3,
    /// Unit quaternion
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Keyframe {
    pub fn new(time: f32, transform: Transform) -> Self {
        Self {
            time,
            translation: transform.translation,
            rotation: transform.rotation,
            scale: transform.scale,
        }
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.translation, self.rotation, self.scale)
    }
}

/// Keyframes of one joint, strictly increasing in time
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub joint_hash: u32,
    /// Joint name, present when the source generation stores names
    pub name: Option<String>,
    pub keys: Vec<Keyframe>,
}

impl Track {
    pub fn new(joint_hash: u32) -> Self {
        Self {
            joint_hash,
            name: None,
            keys: Vec::new(),
        }
    }

    /// Track identified by name (hash derived from it)
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            joint_hash: elf_hash(&name),
            name: Some(name),
            keys: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: Vec<Keyframe>) -> Self {
        self.keys = keys;
        self
    }

    /// Time of the last key (0 for an empty track)
    pub fn end_time(&self) -> f32 {
        self.keys.last().map_or(0.0, |k| k.time)
    }

    /// Key times must be finite and strictly increasing
    pub fn validate(&self) -> Result<(), FormatError> {
        for (index, key) in self.keys.iter().enumerate() {
            let ordered = match index {
                0 => key.time.is_finite(),
                _ => key.time.is_finite() && key.time > self.keys[index - 1].time,
            };
            if !ordered {
                return Err(FormatError::InvalidKeyframeOrder {
                    joint_hash: self.joint_hash,
                    index,
                });
            }
        }
        Ok(())
    }

    /// Interpolated transform at `time`, `None` for an empty track.
    ///
    /// A time equal to a key time returns that key exactly.
    pub fn sample(&self, time: f32) -> Option<Transform> {
        let first = self.keys.first()?;
        // Number of keys at or before `time`
        let after = self.keys.partition_point(|k| k.time <= time);
        if after == 0 {
            return Some(first.transform());
        }
        let a = &self.keys[after - 1];
        let Some(b) = self.keys.get(after) else {
            return Some(a.transform());
        };
        if a.time == time {
            return Some(a.transform());
        }

        let f = (time - a.time) / (b.time - a.time);
        Some(Transform::new(
            a.translation.lerp(b.translation, f),
            a.rotation.slerp(b.rotation, f),
            a.scale.lerp(b.scale, f),
        ))
    }
}

/// Animation clip: tracks keyed by joint hash
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub frame_rate: f32,
    /// Seconds
    pub duration: f32,
    pub tracks: BTreeMap<u32, Track>,
}

impl Default for Animation {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE, 0.0)
    }
}

impl Animation {
    pub fn new(frame_rate: f32, duration: f32) -> Self {
        Self {
            frame_rate,
            duration,
            tracks: BTreeMap::new(),
        }
    }

    /// Insert a track, replacing any previous track for the same joint
    pub fn insert_track(&mut self, track: Track) -> Option<Track> {
        self.tracks.insert(track.joint_hash, track)
    }

    pub fn track(&self, joint_hash: u32) -> Option<&Track> {
        self.tracks.get(&joint_hash)
    }

    /// Number of frames on the clip's frame grid
    pub fn frame_count(&self) -> usize {
        if self.frame_rate > 0.0 && self.duration > 0.0 {
            (self.duration * self.frame_rate).round() as usize
        } else {
            0
        }
    }

    /// Transform of `joint_hash` at `time`, `None` when the joint is not animated
    pub fn sample(&self, joint_hash: u32, time: f32) -> Option<Transform> {
        self.track(joint_hash)?.sample(time)
    }

    /// Local pose of every joint of `skeleton` at `time`.
    ///
    /// Joints without a track hold their bind pose.
    pub fn pose_at(&self, skeleton: &Skeleton, time: f32) -> Vec<Transform> {
        skeleton
            .joints()
            .iter()
            .map(|joint| self.sample(joint.hash, time).unwrap_or(joint.local))
            .collect()
    }

    /// Check every track's key order
    pub fn validate(&self) -> Result<(), FormatError> {
        self.tracks.values().try_for_each(Track::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Joint;
    use std::f32::consts::FRAC_PI_2;

    fn track() -> Track {
        Track::named("Arm").with_keys(vec![
            Keyframe::new(0.0, Transform::IDENTITY),
            Keyframe::new(
                1.0,
                Transform::new(Vec3::new(2.0, 0.0, 0.0), Quat::from_rotation_z(FRAC_PI_2), Vec3::splat(3.0)),
            ),
        ])
    }

    #[test]
    fn test_sample_exact_keys() {
        let track = track();
        assert_eq!(track.sample(0.0), Some(Transform::IDENTITY));
        assert_eq!(track.sample(1.0), Some(track.keys[1].transform()));
    }

    #[test]
    fn test_sample_interpolates() {
        let sampled = track().sample(0.5).unwrap();
        assert!(sampled.translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
        assert!(sampled.scale.abs_diff_eq(Vec3::splat(2.0), 1e-6));
        let expected = Quat::from_rotation_z(FRAC_PI_2 / 2.0);
        assert!(
            sampled.rotation.abs_diff_eq(expected, 1e-5),
            "slerp midpoint: {:?}",
            sampled.rotation
        );
    }

    #[test]
    fn test_sample_clamps() {
        let track = track();
        assert_eq!(track.sample(-5.0), Some(track.keys[0].transform()));
        assert_eq!(track.sample(9.0), Some(track.keys[1].transform()));
        assert_eq!(Track::new(1).sample(0.0), None);
    }

    #[test]
    fn test_key_order() {
        let mut t = track();
        assert_eq!(t.validate(), Ok(()));
        t.keys[1].time = 0.0;
        assert_eq!(
            t.validate(),
            Err(FormatError::InvalidKeyframeOrder {
                joint_hash: elf_hash("Arm"),
                index: 1
            })
        );
    }

    #[test]
    fn test_pose_at_uses_bind_for_missing_tracks() {
        let skeleton = Skeleton::new(
            vec![
                Joint::new("Root", None, Transform::from_translation(Vec3::Z)),
                Joint::new("Arm", Some(0), Transform::from_translation(Vec3::Y)),
            ],
            vec![],
        )
        .unwrap();
        let mut anim = Animation::new(30.0, 1.0);
        anim.insert_track(track());

        let pose = anim.pose_at(&skeleton, 1.0);
        assert_eq!(pose[0], Transform::from_translation(Vec3::Z));
        assert_eq!(pose[1].translation, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(Animation::new(30.0, 1.0).frame_count(), 30);
        assert_eq!(Animation::new(30.0, 0.0).frame_count(), 0);
        assert_eq!(Animation::new(24.0, 0.5).frame_count(), 12);
    }
}
