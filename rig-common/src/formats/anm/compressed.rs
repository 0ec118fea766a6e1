//! Compressed ANM generation ("r3d2canm")
//!
//! # Layout
//! ```text
//! 0x00: magic [u8; 8]          - "r3d2canm"
//! 0x08: version u32            - written as 3
//! 0x0C: header                 - see `CompressedHeader`
//! 0x80: joint_hashes [u32; joint_count]
//!       frames [frame_count]:
//!         time u16             - 0..=65535 over [0, max_time]
//!         bits u16             - joint index (14 bits) | channel << 14
//!         payload [u8; 6]      - 48-bit quaternion or 3 × u16 over global bounds
//! ```
//!
//! Channels: 0 rotation, 1 translation, 2 scale. Translation and scale are
//! quantized over bounds shared by every track. Interior entries of a run of
//! identical payloads are omitted and rebuilt by interpolation.

use glam::{Quat, Vec3};

use crate::error::FormatError;
use crate::model::{Animation, Keyframe, Track, Transform, frame_time};
use crate::stream::{BinaryReader, BinaryWriter};

use super::encoding::{
    ROTATION_ERROR_BOUND, compress_quat, compress_vec3, decompress_quat, decompress_vec3,
    dequantize_frame, linear_error_bound, quantize_frame,
};
use super::header::{ANM_COMPRESSED_MAGIC, CompressedHeader, ErrorMetric, OFFSET_BASE, absolute_offset};
use super::{DenseClip, ErrorBound, check_frame_rate};

/// Joint indices are stored in 14 bits
pub const MAX_COMPRESSED_JOINTS: usize = (1 << 14) - 1;

/// Frames addressable on the 16-bit time axis
pub const MAX_COMPRESSED_FRAMES: usize = u16::MAX as usize + 1;

const ENTRY_SIZE: usize = 10;
const JOINT_MASK: u16 = 0x3FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Channel {
    Rotation = 0,
    Translation = 1,
    Scale = 2,
}

impl Channel {
    const ALL: [Channel; 3] = [Channel::Rotation, Channel::Translation, Channel::Scale];

    fn from_bits(channel: u8, offset: usize) -> Result<Self, FormatError> {
        match channel {
            0 => Ok(Self::Rotation),
            1 => Ok(Self::Translation),
            2 => Ok(Self::Scale),
            _ => Err(FormatError::InvalidChannel { offset, channel }),
        }
    }
}

// ============================================================================
// Quantization bounds
// ============================================================================

/// Global translation and scale ranges of a clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bounds {
    pub translation_min: Vec3,
    pub translation_max: Vec3,
    pub scale_min: Vec3,
    pub scale_max: Vec3,
}

impl Bounds {
    pub fn of(clip: &DenseClip) -> Self {
        let mut frames = clip.tracks.iter().flat_map(|t| t.frames.iter());
        let Some(first) = frames.next() else {
            return Self {
                translation_min: Vec3::ZERO,
                translation_max: Vec3::ZERO,
                scale_min: Vec3::ONE,
                scale_max: Vec3::ONE,
            };
        };
        let mut bounds = Self {
            translation_min: first.translation,
            translation_max: first.translation,
            scale_min: first.scale,
            scale_max: first.scale,
        };
        for frame in frames {
            bounds.translation_min = bounds.translation_min.min(frame.translation);
            bounds.translation_max = bounds.translation_max.max(frame.translation);
            bounds.scale_min = bounds.scale_min.min(frame.scale);
            bounds.scale_max = bounds.scale_max.max(frame.scale);
        }
        bounds
    }

    pub fn error_bound(&self) -> ErrorBound {
        ErrorBound {
            translation: linear_error_bound(self.translation_min, self.translation_max),
            rotation: ROTATION_ERROR_BOUND,
            scale: linear_error_bound(self.scale_min, self.scale_max),
        }
    }

    fn quantize(&self, channel: Channel, transform: &Transform) -> [u8; 6] {
        match channel {
            Channel::Rotation => compress_quat(transform.rotation),
            Channel::Translation => compress_vec3(
                transform.translation,
                self.translation_min,
                self.translation_max,
            ),
            Channel::Scale => compress_vec3(transform.scale, self.scale_min, self.scale_max),
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

struct Entry {
    time: u16,
    joint: u16,
    channel: Channel,
    payload: [u8; 6],
}

pub(super) fn encode(animation: &Animation) -> Result<Vec<u8>, FormatError> {
    let clip = DenseClip::sample(animation)?;
    if clip.tracks.len() > MAX_COMPRESSED_JOINTS {
        return Err(FormatError::CountOverflow {
            what: "compressed joints",
            count: clip.tracks.len(),
            max: MAX_COMPRESSED_JOINTS,
        });
    }
    if clip.frame_count > MAX_COMPRESSED_FRAMES {
        return Err(FormatError::CountOverflow {
            what: "compressed frames",
            count: clip.frame_count,
            max: MAX_COMPRESSED_FRAMES,
        });
    }

    let bounds = Bounds::of(&clip);
    let mut entries = Vec::new();
    for (joint, track) in clip.tracks.iter().enumerate() {
        for channel in Channel::ALL {
            let payloads: Vec<[u8; 6]> = track
                .frames
                .iter()
                .map(|t| bounds.quantize(channel, t))
                .collect();
            let last = payloads.len().saturating_sub(1);
            for (f, payload) in payloads.iter().enumerate() {
                // Interior of a constant run is rebuilt exactly by interpolation
                let interior =
                    f > 0 && f < last && payloads[f - 1] == *payload && payloads[f + 1] == *payload;
                if interior {
                    continue;
                }
                entries.push(Entry {
                    time: quantize_frame(f, clip.frame_count),
                    joint: joint as u16,
                    channel,
                    payload: *payload,
                });
            }
        }
    }
    entries.sort_by_key(|e| (e.time, e.joint, e.channel));

    let dense_entries = clip.tracks.len() * clip.frame_count * Channel::ALL.len();
    tracing::debug!(
        "Compressed ANM keeps {} of {} channel keys",
        entries.len(),
        dense_entries
    );

    let error = bounds.error_bound();
    let max_time = clip.frame_count.saturating_sub(1) as f32 / clip.frame_rate;
    let hashes_at = OFFSET_BASE + CompressedHeader::SIZE;
    let frames_at = hashes_at + clip.tracks.len() * 4;
    let resource_size = frames_at + entries.len() * ENTRY_SIZE;
    let header = CompressedHeader {
        resource_size: resource_size as u32,
        flags: 0,
        joint_count: clip.tracks.len() as u32,
        frame_count: entries.len() as u32,
        jump_cache_count: 0,
        max_time,
        fps: clip.frame_rate,
        rotation_error: ErrorMetric {
            margin: error.rotation,
            discontinuity_threshold: 0.0,
        },
        translation_error: ErrorMetric {
            margin: error.translation.max_element(),
            discontinuity_threshold: 0.0,
        },
        scale_error: ErrorMetric {
            margin: error.scale.max_element(),
            discontinuity_threshold: 0.0,
        },
        translation_min: bounds.translation_min,
        translation_max: bounds.translation_max,
        scale_min: bounds.scale_min,
        scale_max: bounds.scale_max,
        frames_offset: (frames_at - OFFSET_BASE) as i32,
        jump_caches_offset: 0,
        joint_hashes_offset: (hashes_at - OFFSET_BASE) as i32,
    };

    let mut w = BinaryWriter::with_capacity(resource_size);
    w.write_bytes(ANM_COMPRESSED_MAGIC);
    w.write_u32(3);
    header.write(&mut w);
    for track in &clip.tracks {
        w.write_u32(track.joint_hash);
    }
    for entry in &entries {
        w.write_u16(entry.time);
        w.write_u16(entry.joint | (entry.channel as u16) << 14);
        w.write_bytes(&entry.payload);
    }
    Ok(w.into_inner())
}

// ============================================================================
// Decoding
// ============================================================================

/// Sparse keys of one channel, sorted by frame
#[derive(Default)]
struct ChannelKeys<T> {
    keys: Vec<(usize, T)>,
}

impl<T: Copy> ChannelKeys<T> {
    /// Insert a key; returns true when an existing key was replaced
    fn insert(&mut self, frame: usize, value: T) -> bool {
        match self.keys.binary_search_by_key(&frame, |&(f, _)| f) {
            Ok(i) => {
                self.keys[i].1 = value;
                true
            }
            Err(i) => {
                self.keys.insert(i, (frame, value));
                false
            }
        }
    }

    fn sample(&self, frame: usize, default: T, mix: impl Fn(T, T, f32) -> T) -> T {
        let i = self.keys.partition_point(|&(f, _)| f < frame);
        match (i.checked_sub(1).map(|p| self.keys[p]), self.keys.get(i)) {
            (_, Some(&(f, v))) if f == frame => v,
            (Some((f0, a)), Some(&(f1, b))) => {
                mix(a, b, (frame - f0) as f32 / (f1 - f0) as f32)
            }
            (Some((_, a)), None) => a,
            (None, Some(&(_, b))) => b,
            (None, None) => default,
        }
    }
}

#[derive(Default)]
struct SparseTrack {
    rotation: ChannelKeys<Quat>,
    translation: ChannelKeys<Vec3>,
    scale: ChannelKeys<Vec3>,
}

impl SparseTrack {
    fn into_keys(self, frame_rate: f32) -> Vec<Keyframe> {
        let mut frames: Vec<usize> = self
            .rotation
            .keys
            .iter()
            .map(|k| k.0)
            .chain(self.translation.keys.iter().map(|k| k.0))
            .chain(self.scale.keys.iter().map(|k| k.0))
            .collect();
        frames.sort_unstable();
        frames.dedup();

        frames
            .into_iter()
            .map(|f| {
                let transform = Transform::new(
                    self.translation.sample(f, Vec3::ZERO, Vec3::lerp),
                    self.rotation.sample(f, Quat::IDENTITY, Quat::slerp),
                    self.scale.sample(f, Vec3::ONE, Vec3::lerp),
                );
                Keyframe::new(frame_time(f, frame_rate), transform)
            })
            .collect()
    }
}

pub(super) fn decode(bytes: &[u8]) -> Result<Animation, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.skip(12)?;
    let header = CompressedHeader::read(&mut r)?;
    check_frame_rate(header.fps)?;
    let joint_count = header.joint_count as usize;
    let entry_count = header.frame_count as usize;

    r.seek(absolute_offset(header.joint_hashes_offset, &r)?)?;
    let hashes = r.read_u32_array(joint_count)?;

    r.seek(absolute_offset(header.frames_offset, &r)?)?;
    r.ensure_array(entry_count, ENTRY_SIZE)?;
    let mut tracks: Vec<SparseTrack> = (0..joint_count).map(|_| SparseTrack::default()).collect();
    for _ in 0..entry_count {
        let offset = r.position();
        let time = r.read_u16()?;
        let bits = r.read_u16()?;
        let payload = r.read_array::<6>()?;

        let joint = (bits & JOINT_MASK) as usize;
        let channel = Channel::from_bits((bits >> 14) as u8, offset)?;
        let track = tracks
            .get_mut(joint)
            .ok_or(FormatError::InvalidTrackReference {
                index: joint,
                track_count: joint_count,
            })?;
        let frame = dequantize_frame(time, header.max_time, header.fps);

        let replaced = match channel {
            Channel::Rotation => track
                .rotation
                .insert(frame, decompress_quat(payload, offset + 4)?),
            Channel::Translation => track.translation.insert(
                frame,
                decompress_vec3(payload, header.translation_min, header.translation_max),
            ),
            Channel::Scale => track.scale.insert(
                frame,
                decompress_vec3(payload, header.scale_min, header.scale_max),
            ),
        };
        if replaced {
            tracing::warn!(
                "Duplicate {:?} key for joint {} at frame {}, keeping the last",
                channel,
                joint,
                frame
            );
        }
    }

    // An empty clip stores no keys over a zero time axis
    let duration = if entry_count == 0 && header.max_time == 0.0 {
        0.0
    } else {
        header.max_time + header.fps.recip()
    };
    let mut animation = Animation::new(header.fps, duration);
    for (hash, sparse) in hashes.into_iter().zip(tracks) {
        animation.insert_track(Track::new(hash).with_keys(sparse.into_keys(header.fps)));
    }
    Ok(animation)
}
