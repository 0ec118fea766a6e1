//! Skinned mesh model

use glam::{Vec2, Vec3, Vec4};

use super::skeleton::Skeleton;
use crate::error::FormatError;

/// Allowed deviation of a vertex's weight sum from 1
pub const WEIGHT_TOLERANCE: f32 = 1e-3;

/// Influences at or below this weight are discarded when limiting
pub const INFLUENCE_EPSILON: f32 = 1e-3;

/// Influence slots per vertex
pub const MAX_INFLUENCES: usize = 4;

/// Per-vertex attributes beyond position, influences, normal and UV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexFormat {
    #[default]
    Basic,
    /// Adds a BGRA8 color
    Color,
    /// Adds a BGRA8 color and a tangent with handedness in `w`
    ColorTangent,
}

impl VertexFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Color => "color",
            Self::ColorTangent => "color+tangent",
        }
    }

    pub fn has_color(self) -> bool {
        !matches!(self, Self::Basic)
    }

    pub fn has_tangent(self) -> bool {
        matches!(self, Self::ColorTangent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    /// Influence slots (resolved through the skeleton's influence table)
    pub bones: [u8; 4],
    pub weights: [f32; 4],
    /// BGRA
    pub color: Option<[u8; 4]>,
    pub tangent: Option<Vec4>,
}

impl Vertex {
    /// Vertex bound entirely to influence slot `bone`
    pub fn rigid(position: Vec3, normal: Vec3, uv: Vec2, bone: u8) -> Self {
        Self {
            position,
            normal,
            uv,
            bones: [bone, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
            color: None,
            tangent: None,
        }
    }

    pub fn weight_sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Non-negative weights summing to 1 within `tolerance`
    pub fn has_valid_weights(&self, tolerance: f32) -> bool {
        self.weights.iter().all(|&w| w >= 0.0) && (self.weight_sum() - 1.0).abs() <= tolerance
    }

    /// Clamp negative weights and rescale to sum 1.
    ///
    /// A vertex with no positive weight is bound fully to its first slot.
    pub fn normalize_weights(&mut self) {
        for w in &mut self.weights {
            *w = w.max(0.0);
        }
        let sum = self.weight_sum();
        if sum > 0.0 {
            for w in &mut self.weights {
                *w /= sum;
            }
        } else {
            self.weights = [1.0, 0.0, 0.0, 0.0];
        }
    }

    /// Set influences from an arbitrary-length list.
    ///
    /// Keeps the strongest [`MAX_INFLUENCES`] entries above
    /// [`INFLUENCE_EPSILON`], renormalised. Unused slots get bone 0, weight 0.
    pub fn set_influences(&mut self, influences: &[(u8, f32)]) {
        let (bones, weights) = limit_influences(influences);
        self.bones = bones;
        self.weights = weights;
    }
}

/// Reduce an influence list to the strongest four, renormalised
pub fn limit_influences(influences: &[(u8, f32)]) -> ([u8; 4], [f32; 4]) {
    let mut kept: Vec<(u8, f32)> = influences
        .iter()
        .copied()
        .filter(|&(_, w)| w > INFLUENCE_EPSILON)
        .collect();
    kept.sort_by(|a, b| b.1.total_cmp(&a.1));
    kept.truncate(MAX_INFLUENCES);

    let mut bones = [0u8; 4];
    let mut weights = [0.0f32; 4];
    let sum: f32 = kept.iter().map(|&(_, w)| w).sum();
    if sum <= 0.0 {
        weights[0] = 1.0;
        return (bones, weights);
    }
    for (slot, (bone, weight)) in kept.into_iter().enumerate() {
        bones[slot] = bone;
        weights[slot] = weight / sum;
    }
    (bones, weights)
}

/// A contiguous index range drawn with one material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submesh {
    pub material: String,
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub index_start: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertex_format: VertexFormat,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub submeshes: Vec<Submesh>,
}

impl Mesh {
    /// Mesh whose vertex format is taken from the first vertex
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u16>, submeshes: Vec<Submesh>) -> Self {
        let vertex_format = match vertices.first() {
            Some(v) if v.tangent.is_some() => VertexFormat::ColorTangent,
            Some(v) if v.color.is_some() => VertexFormat::Color,
            _ => VertexFormat::Basic,
        };
        Self {
            vertex_format,
            vertices,
            indices,
            submeshes,
        }
    }

    /// Check structure and weights (no skeleton needed)
    pub fn validate(&self) -> Result<(), FormatError> {
        self.validate_layout()?;
        self.validate_weights(WEIGHT_TOLERANCE)
    }

    /// Check vertex attributes, index range and submesh partition
    pub fn validate_layout(&self) -> Result<(), FormatError> {
        let format = self.vertex_format;
        for (index, vertex) in self.vertices.iter().enumerate() {
            if vertex.color.is_some() != format.has_color()
                || vertex.tangent.is_some() != format.has_tangent()
            {
                return Err(FormatError::VertexFormatMismatch {
                    vertex: index,
                    format: format.name(),
                });
            }
        }

        let vertex_count = self.vertices.len();
        if let Some((position, &index)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, i)| **i as usize >= vertex_count)
        {
            return Err(FormatError::IndexOutOfRange {
                position,
                index,
                vertex_count,
            });
        }

        self.validate_submeshes()
    }

    fn validate_submeshes(&self) -> Result<(), FormatError> {
        let mut expected_start: u64 = 0;
        for (index, submesh) in self.submeshes.iter().enumerate() {
            if submesh.index_start as u64 != expected_start {
                let reason = if (submesh.index_start as u64) < expected_start {
                    format!("index_start {} overlaps the previous range", submesh.index_start)
                } else {
                    format!("gap before index_start {}", submesh.index_start)
                };
                return Err(FormatError::InvalidSubmeshRange {
                    submesh: index,
                    reason,
                });
            }
            expected_start += submesh.index_count as u64;

            let vertex_end = submesh.vertex_start as u64 + submesh.vertex_count as u64;
            if vertex_end > self.vertices.len() as u64 {
                return Err(FormatError::InvalidSubmeshRange {
                    submesh: index,
                    reason: format!(
                        "vertex range ends at {vertex_end}, mesh has {} vertices",
                        self.vertices.len()
                    ),
                });
            }
        }

        if expected_start != self.indices.len() as u64 {
            return Err(FormatError::InvalidSubmeshRange {
                submesh: self.submeshes.len().saturating_sub(1),
                reason: format!(
                    "ranges cover {expected_start} indices, buffer has {}",
                    self.indices.len()
                ),
            });
        }
        Ok(())
    }

    /// Every vertex has non-negative weights summing to 1 within `tolerance`
    pub fn validate_weights(&self, tolerance: f32) -> Result<(), FormatError> {
        match self
            .vertices
            .iter()
            .position(|v| !v.has_valid_weights(tolerance))
        {
            Some(vertex) => Err(FormatError::InvalidWeights {
                vertex,
                sum: self.vertices[vertex].weight_sum(),
            }),
            None => Ok(()),
        }
    }

    /// Every weighted influence resolves to a joint of `skeleton`
    pub fn validate_against(&self, skeleton: &Skeleton) -> Result<(), FormatError> {
        for (index, vertex) in self.vertices.iter().enumerate() {
            for (&bone, &weight) in vertex.bones.iter().zip(&vertex.weights) {
                if weight != 0.0 && skeleton.resolve_influence(bone).is_none() {
                    return Err(FormatError::InvalidBoneReference {
                        vertex: index,
                        bone: bone as u32,
                        joint_count: skeleton.joint_count(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Renormalise every vertex whose weights are out of tolerance.
    ///
    /// Returns the number of vertices changed.
    pub fn repair_weights(&mut self) -> usize {
        let mut repaired = 0;
        for vertex in &mut self.vertices {
            if !vertex.has_valid_weights(WEIGHT_TOLERANCE) {
                vertex.normalize_weights();
                repaired += 1;
            }
        }
        repaired
    }

    /// Axis-aligned bounds as `(min, max)`; zero for an empty mesh
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        self.vertices.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), v| (min.min(v.position), max.max(v.position)),
        )
    }

    /// Sphere around the box center reaching the box corners
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        let (min, max) = self.bounding_box();
        let center = (min + max) * 0.5;
        (center, (max - center).length())
    }
}
