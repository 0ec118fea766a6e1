//! Legacy ANM generation ("r3d2anmd" versions 1 to 3)
//!
//! # Layout
//! ```text
//! 0x00: magic [u8; 8]          - "r3d2anmd"
//! 0x08: version u32            - written as 3
//! 0x0C: skeleton_id u32
//! 0x10: track_count u32
//! 0x14: frame_count u32
//! 0x18: fps u32                - 0 means 30
//! 0x1C: tracks:
//!       name [u8; 32]
//!       flags u32
//!       frames [frame_count]: rotation quat (xyzw), translation vec3
//! ```
//!
//! Tracks are keyed by name and scale is not stored (decoded as 1).

use glam::Vec3;

use crate::error::FormatError;
use crate::model::{Animation, DEFAULT_FRAME_RATE, Track, Transform};
use crate::stream::{BinaryReader, BinaryWriter};

use super::header::ANM_MAGIC;
use super::{DenseClip, dense_animation, dense_keys};

/// Width of the track name field
pub const NAME_SIZE: usize = 32;

/// Bytes per frame of one track
pub const FRAME_SIZE: usize = 28;

const HEADER_SIZE: usize = 28;

pub(super) fn decode(bytes: &[u8]) -> Result<Animation, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.ensure(HEADER_SIZE)?;
    r.read_magic(ANM_MAGIC, "ANM")?;
    let _version = r.read_u32()?;
    let _skeleton_id = r.read_u32()?;
    let track_count = r.read_u32()? as usize;
    let frame_count = r.read_u32()? as usize;
    let frame_rate = match r.read_u32()? {
        0 => DEFAULT_FRAME_RATE,
        fps => fps as f32,
    };

    let track_size = frame_count
        .checked_mul(FRAME_SIZE)
        .and_then(|n| n.checked_add(NAME_SIZE + 4))
        .unwrap_or(usize::MAX);
    r.ensure_array(track_count, track_size)?;

    let mut tracks = Vec::with_capacity(track_count);
    for _ in 0..track_count {
        let name = r.read_padded_string(NAME_SIZE)?;
        let _flags = r.read_u32()?;
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let rotation = r.read_quat()?;
            let translation = r.read_vec3()?;
            frames.push(Transform::new(translation, rotation, Vec3::ONE));
        }
        tracks.push(Track::named(name).with_keys(dense_keys(frames, frame_rate)));
    }

    Ok(dense_animation(frame_rate, frame_count, tracks))
}

pub(super) fn encode(animation: &Animation) -> Result<Vec<u8>, FormatError> {
    let clip = DenseClip::sample(animation)?;
    let fps = clip.frame_rate.round().max(1.0) as u32;
    if fps as f32 != clip.frame_rate {
        tracing::debug!(
            "Legacy ANM stores integer frame rates, writing {} for {}",
            fps,
            clip.frame_rate
        );
    }

    let mut w = BinaryWriter::with_capacity(
        HEADER_SIZE + clip.tracks.len() * (NAME_SIZE + 4 + clip.frame_count * FRAME_SIZE),
    );
    w.write_bytes(ANM_MAGIC);
    w.write_u32(3);
    // Skeleton id is not modelled
    w.write_u32(0);
    w.write_u32(clip.tracks.len() as u32);
    w.write_u32(clip.frame_count as u32);
    w.write_u32(fps);

    for track in &clip.tracks {
        let name = track.name.ok_or(FormatError::MissingJointName {
            joint_hash: track.joint_hash,
        })?;
        w.write_padded_string(name, NAME_SIZE)?;
        w.write_u32(0);
        for frame in &track.frames {
            w.write_quat(frame.rotation);
            w.write_vec3(frame.translation);
        }
    }

    Ok(w.into_inner())
}
