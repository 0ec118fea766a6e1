//! SKN header fields and submesh table

use glam::Vec3;

use crate::error::FormatError;
use crate::model::Submesh;
use crate::stream::{BinaryReader, BinaryWriter};

/// Leading magic of every SKN generation
pub const SKN_MAGIC: u32 = 0x0011_2233;

/// Minor version written by the encoder
pub const SKN_MINOR_VERSION: u16 = 1;

/// Width of the submesh material field
pub const MATERIAL_NAME_SIZE: usize = 64;

/// Size of one submesh table entry
pub const SUBMESH_RECORD_SIZE: usize = MATERIAL_NAME_SIZE + 16;

/// Material of the implicit submesh of version 0 files
pub const IMPLICIT_SUBMESH_NAME: &str = "Base";

/// Bytes of zero padding after the version 4 vertex buffer
pub const V4_TAIL_SIZE: usize = 12;

/// Recognized SKN generations (by major version)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SknVersion {
    /// No submesh table, one implicit submesh
    V0,
    V1,
    V2,
    /// Adds flags, vertex type and bounds
    V4,
}

impl SknVersion {
    pub fn major(self) -> u16 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V4 => 4,
        }
    }

    pub fn from_major(major: u16) -> Result<Self, FormatError> {
        match major {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            4 => Ok(Self::V4),
            other => Err(FormatError::UnsupportedVersion {
                format: "SKN",
                version: other as u32,
            }),
        }
    }

    pub fn has_submesh_table(self) -> bool {
        !matches!(self, Self::V0)
    }

    /// Only version 4 declares a vertex type
    pub fn has_vertex_type(self) -> bool {
        matches!(self, Self::V4)
    }
}

impl std::str::FromStr for SknVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().trim_start_matches('v') {
            "0" => Ok(Self::V0),
            "1" => Ok(Self::V1),
            "2" => Ok(Self::V2),
            "4" => Ok(Self::V4),
            other => Err(format!("unknown mesh version '{other}'")),
        }
    }
}

/// Version 4 bounds block (40 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SknBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub sphere_center: Vec3,
    pub sphere_radius: f32,
}

impl SknBounds {
    pub const SIZE: usize = 40;

    pub fn read(r: &mut BinaryReader) -> Result<Self, FormatError> {
        Ok(Self {
            min: r.read_vec3()?,
            max: r.read_vec3()?,
            sphere_center: r.read_vec3()?,
            sphere_radius: r.read_f32()?,
        })
    }

    pub fn write(&self, w: &mut BinaryWriter) {
        w.write_vec3(self.min);
        w.write_vec3(self.max);
        w.write_vec3(self.sphere_center);
        w.write_f32(self.sphere_radius);
    }
}

pub fn read_submesh(r: &mut BinaryReader) -> Result<Submesh, FormatError> {
    Ok(Submesh {
        material: r.read_padded_string(MATERIAL_NAME_SIZE)?,
        vertex_start: r.read_u32()?,
        vertex_count: r.read_u32()?,
        index_start: r.read_u32()?,
        index_count: r.read_u32()?,
    })
}

pub fn write_submesh(w: &mut BinaryWriter, submesh: &Submesh) -> Result<(), FormatError> {
    w.write_padded_string(&submesh.material, MATERIAL_NAME_SIZE)?;
    w.write_u32(submesh.vertex_start);
    w.write_u32(submesh.vertex_count);
    w.write_u32(submesh.index_start);
    w.write_u32(submesh.index_count);
    Ok(())
}
