//! Codec error types

/// Errors produced while decoding or encoding SKL, SKN and ANM data.
///
/// Every codec call either returns a complete, internally consistent model
/// (or byte buffer) or one of these errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormatError {
    /// The leading marker does not belong to the expected format
    #[error("Bad {format} magic")]
    BadMagic { format: &'static str },

    /// The version field is outside the recognized set
    #[error("Unsupported {format} version: {version}")]
    UnsupportedVersion { format: &'static str, version: u32 },

    /// A read or a declared count runs past the end of the buffer
    #[error("Truncated data: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A vertex influence does not resolve to a joint of the paired skeleton
    #[error("Vertex {vertex} references bone {bone}, skeleton has {joint_count} joints")]
    InvalidBoneReference {
        vertex: usize,
        bone: u32,
        joint_count: usize,
    },

    /// Influence weights are negative or do not sum to 1
    #[error("Vertex {vertex} has invalid weights (sum {sum})")]
    InvalidWeights { vertex: usize, sum: f32 },

    /// Submesh ranges do not partition the index buffer
    #[error("Submesh {submesh} has an invalid range: {reason}")]
    InvalidSubmeshRange { submesh: usize, reason: String },

    /// Parent resolution did not reach a root within `joint_count` steps
    #[error("Joint {joint} is part of a parent cycle")]
    CyclicHierarchy { joint: usize },

    /// A reconstructed quaternion component would be imaginary
    #[error("Corrupt quantized quaternion at offset {offset} (sum of squares {sum_of_squares})")]
    CorruptQuantization { offset: usize, sum_of_squares: f32 },

    /// A parent index is out of range or refers to the joint itself
    #[error("Joint {joint} has invalid parent {parent}")]
    InvalidParent { joint: usize, parent: i32 },

    /// A joint record's id differs from its position
    #[error("Joint record {index} carries id {id}")]
    InvalidJointId { index: usize, id: u16 },

    /// Two joints share the same identifier hash
    #[error("Duplicate joint hash 0x{hash:08X}")]
    DuplicateJoint { hash: u32 },

    /// An index buffer entry points past the vertex buffer
    #[error("Index {index} at position {position} exceeds vertex count {vertex_count}")]
    IndexOutOfRange {
        position: usize,
        index: u16,
        vertex_count: usize,
    },

    /// A compressed frame addresses a track that does not exist
    #[error("Track reference {index} out of range ({track_count} tracks)")]
    InvalidTrackReference { index: usize, track_count: usize },

    /// A compressed frame uses a channel tag outside rotation/translation/scale
    #[error("Unknown channel {channel} in compressed frame at offset {offset}")]
    InvalidChannel { offset: usize, channel: u8 },

    /// A frame references a palette entry that does not exist
    #[error("Palette index {index} out of range ({palette_len} entries)")]
    InvalidPaletteIndex { index: usize, palette_len: usize },

    /// Frame rate is zero, negative or not finite
    #[error("Invalid frame rate {frame_rate}")]
    InvalidFrameRate { frame_rate: f32 },

    /// Keyframe times are not strictly increasing
    #[error("Track 0x{joint_hash:08X} has out-of-order keyframe at {index}")]
    InvalidKeyframeOrder { joint_hash: u32, index: usize },

    /// A generation that keys tracks by name was asked to encode a nameless track
    #[error("Track 0x{joint_hash:08X} has no joint name")]
    MissingJointName { joint_hash: u32 },

    /// A vertex carries attributes its mesh's vertex format does not declare
    #[error("Vertex {vertex} does not match the {format} vertex format")]
    VertexFormatMismatch { vertex: usize, format: &'static str },

    /// A fixed-width string field cannot hold the name
    #[error("Name '{name}' exceeds {max} bytes")]
    NameTooLong { name: String, max: usize },

    /// A count does not fit the field that stores it
    #[error("Too many {what}: {count} (max {max})")]
    CountOverflow {
        what: &'static str,
        count: usize,
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            FormatError::BadMagic { format: "SKL" }.to_string(),
            "Bad SKL magic"
        );
        assert_eq!(
            FormatError::UnsupportedVersion {
                format: "ANM",
                version: 7
            }
            .to_string(),
            "Unsupported ANM version: 7"
        );
        assert_eq!(
            FormatError::DuplicateJoint { hash: 0xBEEF }.to_string(),
            "Duplicate joint hash 0x0000BEEF"
        );
    }
}
