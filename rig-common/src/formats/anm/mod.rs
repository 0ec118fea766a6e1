//! ANM animation format (.anm)
//!
//! Four generations are recognized:
//!
//! ```text
//! "r3d2anmd" v1-v3  Legacy3     named tracks, per-frame quat + vec3, no scale
//! "r3d2anmd" v4     V4          f32 vector/quaternion palettes, hashed frames
//! "r3d2anmd" v5     V5          f32 vector palette, 48-bit quaternion palette
//! "r3d2canm" v1-v3  Compressed  sparse quantized keys over a 16-bit time axis
//! ```
//!
//! The three uncompressed generations are dense: every track holds one key
//! per frame, so encoding samples each track at `frame / frame_rate` for
//! every frame of the clip. [`EncodeMode::Uncompressed`] (V4) is lossless
//! for dense clips; V5 quantizes rotations; the compressed generation
//! quantizes every channel within [`ErrorBound`].

mod compressed;
mod encoding;
mod header;
mod legacy;
mod uncompressed;

#[cfg(test)]
mod tests;

use glam::Vec3;

use crate::error::FormatError;
use crate::model::{Animation, Keyframe, Track, Transform, frame_time};
use crate::stream::BinaryReader;

pub use compressed::{MAX_COMPRESSED_FRAMES, MAX_COMPRESSED_JOINTS};
pub use encoding::{
    QUAT_COMPONENT_STEP, QUAT_RECONSTRUCTION_EPSILON, ROTATION_ERROR_BOUND, compress_quat,
    decompress_quat, dequantize_u16, quantize_u16,
};
pub use header::{ANM_COMPRESSED_MAGIC, ANM_FORMAT_TOKEN, ANM_MAGIC, AnmdHeader, CompressedHeader};

/// Recognized ANM generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnmVersion {
    Legacy3,
    V4,
    V5,
    Compressed,
}

impl AnmVersion {
    pub fn name(self) -> &'static str {
        match self {
            Self::Legacy3 => "legacy",
            Self::V4 => "v4",
            Self::V5 => "v5",
            Self::Compressed => "compressed",
        }
    }
}

impl std::str::FromStr for AnmVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "legacy3" | "v3" => Ok(Self::Legacy3),
            "v4" | "uncompressed" => Ok(Self::V4),
            "v5" => Ok(Self::V5),
            "compressed" => Ok(Self::Compressed),
            other => Err(format!("unknown animation mode '{other}'")),
        }
    }
}

/// Caller-selected encoding; compression is never chosen implicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeMode {
    /// Raw f32 palettes (V4). Tracks are resampled onto the frame grid and
    /// lose their names; values at grid points are exact.
    Uncompressed,
    /// Lossy quantized keys
    Compressed,
}

impl EncodeMode {
    pub fn version(self) -> AnmVersion {
        match self {
            Self::Uncompressed => AnmVersion::V4,
            Self::Compressed => AnmVersion::Compressed,
        }
    }
}

/// Maximum reconstruction error of a compressed encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorBound {
    /// Per axis: `(max - min) / 65535` over all translation keys
    pub translation: Vec3,
    /// Per quaternion component
    pub rotation: f32,
    /// Per axis: `(max - min) / 65535` over all scale keys
    pub scale: Vec3,
}

/// Identify the generation from the leading bytes
pub fn detect_version(bytes: &[u8]) -> Result<AnmVersion, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.ensure(header::PREFIX_SIZE)?;
    let magic = r.read_array::<8>()?;
    let version = r.read_u32()?;
    let unsupported = FormatError::UnsupportedVersion {
        format: "ANM",
        version,
    };

    if &magic == ANM_MAGIC {
        match version {
            1..=3 => Ok(AnmVersion::Legacy3),
            4 => Ok(AnmVersion::V4),
            5 => Ok(AnmVersion::V5),
            _ => Err(unsupported),
        }
    } else if &magic == ANM_COMPRESSED_MAGIC {
        match version {
            1..=3 => Ok(AnmVersion::Compressed),
            _ => Err(unsupported),
        }
    } else {
        Err(FormatError::BadMagic { format: "ANM" })
    }
}

/// Decode an animation of any recognized generation
pub fn decode(bytes: &[u8]) -> Result<Animation, FormatError> {
    let version = detect_version(bytes)?;
    let animation = match version {
        AnmVersion::Legacy3 => legacy::decode(bytes)?,
        AnmVersion::V4 => uncompressed::decode_v4(bytes)?,
        AnmVersion::V5 => uncompressed::decode_v5(bytes)?,
        AnmVersion::Compressed => compressed::decode(bytes)?,
    };
    tracing::debug!(
        "Decoded {} ANM: {} tracks, {} fps, {:.3}s",
        version.name(),
        animation.tracks.len(),
        animation.frame_rate,
        animation.duration
    );
    Ok(animation)
}

/// Encode with the caller-selected mode
pub fn encode(animation: &Animation, mode: EncodeMode) -> Result<Vec<u8>, FormatError> {
    encode_version(animation, mode.version())
}

/// Encode as a specific generation
pub fn encode_version(animation: &Animation, version: AnmVersion) -> Result<Vec<u8>, FormatError> {
    let bytes = match version {
        AnmVersion::Legacy3 => legacy::encode(animation)?,
        AnmVersion::V4 => uncompressed::encode_v4(animation)?,
        AnmVersion::V5 => uncompressed::encode_v5(animation)?,
        AnmVersion::Compressed => compressed::encode(animation)?,
    };
    tracing::debug!(
        "Encoded {} ANM: {} tracks, {} bytes",
        version.name(),
        animation.tracks.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Error bound [`EncodeMode::Compressed`] guarantees for `animation`
pub fn error_bound(animation: &Animation) -> Result<ErrorBound, FormatError> {
    let clip = DenseClip::sample(animation)?;
    Ok(compressed::Bounds::of(&clip).error_bound())
}

// ============================================================================
// Dense sampling shared by the encoders
// ============================================================================

/// Track sampled once per frame
pub(crate) struct DenseTrack<'a> {
    pub joint_hash: u32,
    pub name: Option<&'a str>,
    pub frames: Vec<Transform>,
}

/// Every non-empty track of an animation sampled on its frame grid
pub(crate) struct DenseClip<'a> {
    pub frame_rate: f32,
    pub frame_count: usize,
    pub tracks: Vec<DenseTrack<'a>>,
}

impl<'a> DenseClip<'a> {
    pub fn sample(animation: &'a Animation) -> Result<Self, FormatError> {
        check_frame_rate(animation.frame_rate)?;
        animation.validate()?;

        let has_keys = animation.tracks.values().any(|t| !t.keys.is_empty());
        let frame_count = match animation.frame_count() {
            // A single pose still needs one frame
            0 if has_keys => 1,
            n => n,
        };

        let mut tracks = Vec::with_capacity(animation.tracks.len());
        for track in animation.tracks.values() {
            if track.keys.is_empty() {
                tracing::debug!("Skipping empty track 0x{:08X}", track.joint_hash);
                continue;
            }
            let frames = (0..frame_count)
                .map(|f| {
                    track
                        .sample(frame_time(f, animation.frame_rate))
                        .unwrap_or_default()
                })
                .collect();
            tracks.push(DenseTrack {
                joint_hash: track.joint_hash,
                name: track.name.as_deref(),
                frames,
            });
        }

        Ok(Self {
            frame_rate: animation.frame_rate,
            frame_count,
            tracks,
        })
    }
}

pub(crate) fn check_frame_rate(frame_rate: f32) -> Result<(), FormatError> {
    if frame_rate.is_finite() && frame_rate > 0.0 {
        Ok(())
    } else {
        Err(FormatError::InvalidFrameRate { frame_rate })
    }
}

/// Frame rate from a stored frame duration.
///
/// Rates within 1e-3 of an integer snap to it, so `1 / (1 / 30)` reads back
/// as exactly 30.
pub(crate) fn frame_rate_from_duration(frame_duration: f32) -> Result<f32, FormatError> {
    let frame_rate = frame_duration.recip();
    check_frame_rate(frame_rate)?;
    let rounded = frame_rate.round();
    Ok(if (frame_rate - rounded).abs() < 1e-3 {
        rounded
    } else {
        frame_rate
    })
}

/// Build a dense animation from per-track per-frame transforms
pub(crate) fn dense_animation(
    frame_rate: f32,
    frame_count: usize,
    tracks: impl IntoIterator<Item = Track>,
) -> Animation {
    let mut animation = Animation::new(frame_rate, frame_count as f32 / frame_rate);
    for track in tracks {
        animation.insert_track(track);
    }
    animation
}

/// Keys for `frames` placed on the frame grid
pub(crate) fn dense_keys(frames: impl IntoIterator<Item = Transform>, frame_rate: f32) -> Vec<Keyframe> {
    frames
        .into_iter()
        .enumerate()
        .map(|(f, transform)| Keyframe::new(frame_time(f, frame_rate), transform))
        .collect()
}
