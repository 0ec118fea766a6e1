//! rig-export library
//!
//! File-level conversion, inspection and retargeting for SKL/SKN/ANM assets,
//! plus rigkit.toml batch builds. The `rig-export` binary is a thin clap
//! front end over these functions.

pub mod convert;
pub mod inspect;
pub mod manifest;
pub mod retarget;

pub use convert::{convert_animation, convert_mesh, convert_skeleton};
pub use inspect::inspect;
pub use manifest::{BuildSummary, RigManifest, build_all, load_manifest};
pub use retarget::{MapSource, RetargetJob, retarget_file};
