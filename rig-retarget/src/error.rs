//! Retargeting errors

use rig_common::FormatError;

#[derive(Debug, thiserror::Error)]
pub enum RetargetError {
    #[error("No animated source joint maps to a target joint")]
    NoMappedJoints,

    #[error("Joint '{joint}' has a zero-length bone in the source skeleton")]
    DegenerateBone { joint: String },

    #[error("Invalid frame rate {frame_rate}")]
    InvalidFrameRate { frame_rate: f32 },

    #[error("Invalid joint map: {0}")]
    InvalidMap(#[from] toml::de::Error),

    #[error(transparent)]
    Format(#[from] FormatError),
}
