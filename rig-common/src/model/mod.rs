//! In-memory skeleton, mesh and animation models
//!
//! Models are plain data owned by the caller. Codecs build them from bytes
//! and write them back; the retargeter reads and produces them without any
//! binary I/O.

mod animation;
mod mesh;
mod skeleton;
mod transform;

pub use animation::{Animation, DEFAULT_FRAME_RATE, Keyframe, Track, frame_time};
pub use mesh::{
    INFLUENCE_EPSILON, MAX_INFLUENCES, Mesh, Submesh, Vertex, VertexFormat, WEIGHT_TOLERANCE,
    limit_influences,
};
pub use skeleton::{DEFAULT_JOINT_RADIUS, Joint, Skeleton};
pub use transform::Transform;
