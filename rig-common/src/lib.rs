//! Shared models and binary codecs for rigged character assets
//!
//! This crate is used by:
//! - `rig-retarget` (animation retargeting)
//! - `rig-export` (command line conversion and batch builds)
//!
//! # Modules
//!
//! - [`model`] - Skeleton, skinned mesh and animation models
//! - [`formats`] - SKL, SKN and ANM codecs
//! - [`stream`] - Bounds-checked little-endian reader and writer
//! - [`hash`] - Joint name hashing
//! - [`error`] - Codec errors

pub mod error;
pub mod formats;
pub mod hash;
pub mod model;
pub mod stream;

pub use error::FormatError;
pub use formats::AssetKind;
pub use hash::elf_hash;
pub use model::{
    Animation, Joint, Keyframe, Mesh, Skeleton, Submesh, Track, Transform, Vertex, VertexFormat,
};
