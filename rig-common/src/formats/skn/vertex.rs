//! SKN vertex records
//!
//! ```text
//! 0x00: position vec3
//! 0x0C: bones [u8; 4]          - influence slots
//! 0x10: weights [f32; 4]
//! 0x20: normal vec3
//! 0x2C: uv vec2
//! type 1: + color [u8; 4] (BGRA)
//! type 2: + color [u8; 4] + tangent vec4
//! ```

use crate::error::FormatError;
use crate::model::{Vertex, VertexFormat};
use crate::stream::{BinaryReader, BinaryWriter};

/// Record size of a basic vertex
pub const BASIC_VERTEX_SIZE: usize = 52;

/// Vertex type tag stored by version 4 files
pub fn vertex_type(format: VertexFormat) -> u32 {
    match format {
        VertexFormat::Basic => 0,
        VertexFormat::Color => 1,
        VertexFormat::ColorTangent => 2,
    }
}

pub fn format_from_type(tag: u32) -> Result<VertexFormat, FormatError> {
    match tag {
        0 => Ok(VertexFormat::Basic),
        1 => Ok(VertexFormat::Color),
        2 => Ok(VertexFormat::ColorTangent),
        other => Err(FormatError::UnsupportedVersion {
            format: "SKN vertex type",
            version: other,
        }),
    }
}

/// Record size for `format`
pub fn vertex_size(format: VertexFormat) -> usize {
    match format {
        VertexFormat::Basic => BASIC_VERTEX_SIZE,
        VertexFormat::Color => BASIC_VERTEX_SIZE + 4,
        VertexFormat::ColorTangent => BASIC_VERTEX_SIZE + 4 + 16,
    }
}

pub fn read_vertex(r: &mut BinaryReader, format: VertexFormat) -> Result<Vertex, FormatError> {
    let position = r.read_vec3()?;
    let bones = r.read_array::<4>()?;
    let weights = [r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?];
    let normal = r.read_vec3()?;
    let uv = r.read_vec2()?;
    let color = if format.has_color() {
        Some(r.read_array::<4>()?)
    } else {
        None
    };
    let tangent = if format.has_tangent() {
        Some(r.read_vec4()?)
    } else {
        None
    };
    Ok(Vertex {
        position,
        normal,
        uv,
        bones,
        weights,
        color,
        tangent,
    })
}

/// Write the attributes of `vertex` that `format` carries
pub fn write_vertex(w: &mut BinaryWriter, vertex: &Vertex, format: VertexFormat) {
    w.write_vec3(vertex.position);
    w.write_bytes(&vertex.bones);
    for weight in vertex.weights {
        w.write_f32(weight);
    }
    w.write_vec3(vertex.normal);
    w.write_vec2(vertex.uv);
    if format.has_color() {
        w.write_bytes(&vertex.color.unwrap_or_default());
    }
    if format.has_tangent() {
        w.write_vec4(vertex.tangent.unwrap_or_default());
    }
}
