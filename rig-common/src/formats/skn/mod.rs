//! SKN skinned mesh format (.skn)
//!
//! # Layout
//! ```text
//! 0x00: magic u32              - 0x00112233
//! 0x04: major u16              - 0, 1, 2 or 4
//! 0x06: minor u16
//!
//! major 0:
//!       index_count u32, vertex_count u32
//! major 1, 2, 4:
//!       submesh_count u32
//!       submeshes (80 bytes each): material [u8; 64], vertex_start u32,
//!                 vertex_count u32, index_start u32, index_count u32
//!       major 4: flags u32
//!       index_count u32, vertex_count u32
//!       major 4: vertex_size u32, vertex_type u32, bbox min/max vec3,
//!                sphere center vec3 + radius f32
//!
//! indices [u16; index_count]
//! vertices [vertex_size; vertex_count]   - see `vertex.rs`
//! major 4: 12 zero bytes
//! ```
//!
//! Decoding checks the mesh against the skeleton it will be skinned to.
//! Encoding derives every count, size and bound from the mesh itself.

mod header;
mod vertex;


use crate::error::FormatError;
use crate::model::{Mesh, Skeleton, Submesh, VertexFormat, WEIGHT_TOLERANCE};
use crate::stream::{BinaryReader, BinaryWriter};

pub use header::{
    IMPLICIT_SUBMESH_NAME, MATERIAL_NAME_SIZE, SKN_MAGIC, SUBMESH_RECORD_SIZE, SknBounds,
    SknVersion,
};
pub use vertex::{vertex_size, vertex_type};

/// Vertex limit (indices are `u16`)
pub const MAX_VERTICES: usize = u16::MAX as usize;

/// Submesh limit
pub const MAX_SUBMESHES: usize = 32;

/// How strictly decoded influences are checked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SknDecodeOptions {
    /// Renormalise out-of-tolerance weights instead of failing
    pub repair_weights: bool,
    /// Allowed deviation of a weight sum from 1
    pub weight_tolerance: f32,
}

impl Default for SknDecodeOptions {
    fn default() -> Self {
        Self {
            repair_weights: false,
            weight_tolerance: WEIGHT_TOLERANCE,
        }
    }
}

/// Read the major version without decoding the rest
pub fn detect_version(bytes: &[u8]) -> Result<SknVersion, FormatError> {
    let mut r = BinaryReader::new(bytes);
    r.ensure(8)?;
    if r.read_u32()? != SKN_MAGIC {
        return Err(FormatError::BadMagic { format: "SKN" });
    }
    SknVersion::from_major(r.read_u16()?)
}

/// Decode and validate against `skeleton` with default options
pub fn decode(bytes: &[u8], skeleton: &Skeleton) -> Result<Mesh, FormatError> {
    decode_with(bytes, skeleton, &SknDecodeOptions::default())
}

pub fn decode_with(
    bytes: &[u8],
    skeleton: &Skeleton,
    options: &SknDecodeOptions,
) -> Result<Mesh, FormatError> {
    let version = detect_version(bytes)?;
    let mut r = BinaryReader::new(bytes);
    // magic, major, minor
    r.skip(8)?;

    let mut vertex_format = VertexFormat::Basic;
    let mut declared_vertex_size = None;

    let (submeshes, index_count, vertex_count) = if version.has_submesh_table() {
        let submesh_count = r.read_u32()? as usize;
        r.ensure_array(submesh_count, SUBMESH_RECORD_SIZE)?;
        let submeshes = (0..submesh_count)
            .map(|_| header::read_submesh(&mut r))
            .collect::<Result<Vec<_>, _>>()?;

        if version.has_vertex_type() {
            let _flags = r.read_u32()?;
        }
        let index_count = r.read_u32()? as usize;
        let vertex_count = r.read_u32()? as usize;

        if version.has_vertex_type() {
            declared_vertex_size = Some(r.read_u32()? as usize);
            vertex_format = vertex::format_from_type(r.read_u32()?)?;
            // Bounds are recomputed on encode
            SknBounds::read(&mut r)?;
        }
        (submeshes, index_count, vertex_count)
    } else {
        let index_count = r.read_u32()? as usize;
        let vertex_count = r.read_u32()? as usize;
        let implicit = Submesh {
            material: IMPLICIT_SUBMESH_NAME.to_string(),
            vertex_start: 0,
            vertex_count: vertex_count as u32,
            index_start: 0,
            index_count: index_count as u32,
        };
        (vec![implicit], index_count, vertex_count)
    };

    let indices = r.read_u16_array(index_count)?;

    let record_size = vertex_size(vertex_format);
    let stride = declared_vertex_size.unwrap_or(record_size).max(record_size);
    r.ensure_array(vertex_count, stride)?;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push(vertex::read_vertex(&mut r, vertex_format)?);
        r.skip(stride - record_size)?;
    }
    if version.has_vertex_type() {
        // Trailing padding, missing from some files
        r.skip(r.remaining().min(header::V4_TAIL_SIZE))?;
    }

    let mut mesh = Mesh {
        vertex_format,
        vertices,
        indices,
        submeshes,
    };

    mesh.validate_layout()?;
    mesh.validate_against(skeleton)?;
    if options.repair_weights {
        let repaired = mesh.repair_weights();
        if repaired > 0 {
            tracing::warn!("Renormalised weights of {} vertices", repaired);
        }
    } else {
        mesh.validate_weights(options.weight_tolerance)?;
    }

    tracing::debug!(
        "Decoded SKN v{}: {} vertices, {} indices, {} submeshes, format={}",
        version.major(),
        mesh.vertices.len(),
        mesh.indices.len(),
        mesh.submeshes.len(),
        mesh.vertex_format.name()
    );
    Ok(mesh)
}

/// Encode with the smallest generation that carries the mesh's vertex format
pub fn encode(mesh: &Mesh) -> Result<Vec<u8>, FormatError> {
    let version = match mesh.vertex_format {
        VertexFormat::Basic => SknVersion::V1,
        VertexFormat::Color | VertexFormat::ColorTangent => SknVersion::V4,
    };
    encode_version(mesh, version)
}

/// Encode as `version`.
///
/// Generations before 4 store basic vertices only; colors and tangents are
/// omitted. Version 0 holds exactly one submesh and does not store its
/// material.
pub fn encode_version(mesh: &Mesh, version: SknVersion) -> Result<Vec<u8>, FormatError> {
    mesh.validate()?;

    if mesh.vertices.len() > MAX_VERTICES {
        return Err(FormatError::CountOverflow {
            what: "vertices",
            count: mesh.vertices.len(),
            max: MAX_VERTICES,
        });
    }
    let max_submeshes = if version.has_submesh_table() {
        MAX_SUBMESHES
    } else {
        1
    };
    if mesh.submeshes.len() > max_submeshes {
        return Err(FormatError::CountOverflow {
            what: "submeshes",
            count: mesh.submeshes.len(),
            max: max_submeshes,
        });
    }

    let format = if version.has_vertex_type() {
        mesh.vertex_format
    } else {
        if mesh.vertex_format != VertexFormat::Basic {
            tracing::debug!(
                "SKN v{} has no {} vertices, writing basic records",
                version.major(),
                mesh.vertex_format.name()
            );
        }
        VertexFormat::Basic
    };
    let record_size = vertex_size(format);

    let mut w = BinaryWriter::with_capacity(
        64 + mesh.submeshes.len() * SUBMESH_RECORD_SIZE
            + mesh.indices.len() * 2
            + mesh.vertices.len() * record_size,
    );
    w.write_u32(SKN_MAGIC);
    w.write_u16(version.major());
    w.write_u16(header::SKN_MINOR_VERSION);

    if version.has_submesh_table() {
        w.write_u32(mesh.submeshes.len() as u32);
        for submesh in &mesh.submeshes {
            header::write_submesh(&mut w, submesh)?;
        }
        if version.has_vertex_type() {
            // flags
            w.write_u32(0);
        }
    }

    w.write_u32(mesh.indices.len() as u32);
    w.write_u32(mesh.vertices.len() as u32);

    if version.has_vertex_type() {
        let (min, max) = mesh.bounding_box();
        let (sphere_center, sphere_radius) = mesh.bounding_sphere();
        w.write_u32(record_size as u32);
        w.write_u32(vertex_type(format));
        SknBounds {
            min,
            max,
            sphere_center,
            sphere_radius,
        }
        .write(&mut w);
    }

    for &index in &mesh.indices {
        w.write_u16(index);
    }
    for v in &mesh.vertices {
        vertex::write_vertex(&mut w, v, format);
    }

    if version.has_vertex_type() {
        w.write_bytes(&[0u8; header::V4_TAIL_SIZE]);
    }

    tracing::debug!(
        "Encoded SKN v{}: {} vertices, {} bytes",
        version.major(),
        mesh.vertices.len(),
        w.position()
    );
    Ok(w.into_inner())
}
