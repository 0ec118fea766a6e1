//! Animation retargeting between skeletons
//!
//! Remaps an animation authored for one skeleton onto another with
//! different proportions or joint names. Motion is transferred as deltas
//! from the source bind pose, applied on top of the target bind pose, with
//! translations scaled by the bone length ratio.
//!
//! # Modules
//!
//! - [`joint_map`] - Manual, file-based and automatic joint mapping
//! - [`retarget`] - The retargeting transform
//! - [`secondary`] - Baking externally solved secondary motion

pub mod error;
pub mod joint_map;
pub mod retarget;
pub mod secondary;

pub use error::RetargetError;
pub use joint_map::{AutoMapOptions, JointMap, find_best_match, is_core_joint, normalize_joint_name};
pub use retarget::{RetargetOptions, retarget};
pub use secondary::{SecondaryMotion, bake_secondary_motion};
