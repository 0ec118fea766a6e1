//! Legacy SKL generations ("r3d2sklt" versions 1 and 2)
//!
//! # Layout
//! ```text
//! 0x00: magic [u8; 8]          - "r3d2sklt"
//! 0x08: version u32            - 1 or 2
//! 0x0C: skeleton_id u32
//! 0x10: joint_count u32
//! 0x14: joints (88 bytes each):
//!       name [u8; 32]          - zero padded
//!       parent i32             - -1 = root
//!       radius f32
//!       world [f32; 12]        - row-major 3×4, translation in the last column
//! v2 only:
//!       influence_count u32
//!       influences [u32; influence_count]
//! ```

use glam::{Mat4, Vec4};

use crate::error::FormatError;
use crate::model::{Joint, Skeleton};
use crate::stream::{BinaryReader, BinaryWriter};

use super::SKL_LEGACY_MAGIC;

/// Size of one legacy joint record
pub const JOINT_RECORD_SIZE: usize = 88;

/// Width of the name field
pub const NAME_SIZE: usize = 32;

const HEADER_SIZE: usize = 20;

fn read_row_major(r: &mut BinaryReader) -> Result<Mat4, FormatError> {
    let rows = [r.read_vec4()?, r.read_vec4()?, r.read_vec4()?];
    Ok(Mat4::from_cols(
        Vec4::new(rows[0].x, rows[1].x, rows[2].x, 0.0),
        Vec4::new(rows[0].y, rows[1].y, rows[2].y, 0.0),
        Vec4::new(rows[0].z, rows[1].z, rows[2].z, 0.0),
        Vec4::new(rows[0].w, rows[1].w, rows[2].w, 1.0),
    ))
}

fn write_row_major(w: &mut BinaryWriter, m: &Mat4) {
    for row in 0..3 {
        w.write_vec4(m.row(row));
    }
}

pub(super) fn decode(bytes: &[u8]) -> Result<Skeleton, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.ensure(HEADER_SIZE)?;
    r.read_magic(SKL_LEGACY_MAGIC, "SKL")?;
    let version = r.read_u32()?;
    if !(1..=2).contains(&version) {
        return Err(FormatError::UnsupportedVersion {
            format: "SKL",
            version,
        });
    }
    let _skeleton_id = r.read_u32()?;
    let joint_count = r.read_u32()? as usize;
    r.ensure_array(joint_count, JOINT_RECORD_SIZE)?;

    let mut joints = Vec::with_capacity(joint_count);
    for index in 0..joint_count {
        let name = r.read_padded_string(NAME_SIZE)?;
        let parent = r.read_i32()?;
        let radius = r.read_f32()?;
        let world = read_row_major(&mut r)?;

        let parent = match parent {
            -1 => None,
            p if p >= 0 => Some(p as usize),
            p => return Err(FormatError::InvalidParent { joint: index, parent: p }),
        };
        let mut joint = Joint::with_world(name, parent, world);
        joint.radius = radius;
        joints.push(joint);
    }

    let influences = if version == 2 {
        let count = r.read_u32()? as usize;
        r.ensure_array(count, 4)?;
        let mut influences = Vec::with_capacity(count);
        for _ in 0..count {
            let value = r.read_u32()?;
            let value = u16::try_from(value).map_err(|_| FormatError::CountOverflow {
                what: "influence joint index",
                count: value as usize,
                max: u16::MAX as usize,
            })?;
            influences.push(value);
        }
        influences
    } else {
        Skeleton::identity_influences(joint_count)
    };

    Skeleton::from_world_binds(joints, influences)
}

pub(super) fn encode(skeleton: &Skeleton, version: u32) -> Result<Vec<u8>, FormatError> {
    let joints = skeleton.joints();
    let mut w = BinaryWriter::with_capacity(HEADER_SIZE + joints.len() * JOINT_RECORD_SIZE);
    w.write_bytes(SKL_LEGACY_MAGIC);
    w.write_u32(version);
    // Skeleton id is not modelled
    w.write_u32(0);
    w.write_u32(joints.len() as u32);

    for joint in joints {
        w.write_padded_string(&joint.name, NAME_SIZE)?;
        w.write_i32(joint.parent.map_or(-1, |p| p as i32));
        w.write_f32(joint.radius);
        write_row_major(&mut w, &joint.world);
    }

    if version >= 2 {
        let influences = skeleton.influences();
        w.write_u32(influences.len() as u32);
        for &influence in influences {
            w.write_u32(influence as u32);
        }
    }

    Ok(w.into_inner())
}
