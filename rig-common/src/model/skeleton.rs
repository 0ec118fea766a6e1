//! Joint hierarchy with bind pose
//!
//! A [`Skeleton`] is validated on construction and immutable afterwards.
//! Two construction paths exist because the on-disk generations disagree
//! about which bind transform is authoritative:
//!
//! - [`Skeleton::new`]: local transforms are authoritative, world matrices
//!   are derived by composing each joint with its parent's world matrix.
//! - [`Skeleton::from_world_binds`]: world matrices are authoritative
//!   (legacy files store baked 3x4 world matrices), local transforms are
//!   derived as `parent_world⁻¹ · world`.
//!
//! Either way both fields are populated, and re-encoding to the generation a
//! skeleton came from writes back exactly the authoritative values.

use glam::{Mat4, Vec3};
use hashbrown::HashMap;

use super::transform::Transform;
use crate::error::FormatError;
use crate::hash::elf_hash;

/// Radius written for joints that do not carry one
pub const DEFAULT_JOINT_RADIUS: f32 = 2.1;

/// One node of a skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// Stable identifier, the ELF hash of the lower-cased name
    pub hash: u32,
    pub parent: Option<usize>,
    pub flags: u16,
    pub radius: f32,
    /// Bind transform relative to the parent
    pub local: Transform,
    /// Bind transform in model space
    pub world: Mat4,
}

impl Joint {
    /// Joint with a local bind transform (world is filled in by [`Skeleton::new`])
    pub fn new(name: impl Into<String>, parent: Option<usize>, local: Transform) -> Self {
        let name = name.into();
        Self {
            hash: elf_hash(&name),
            name,
            parent,
            flags: 0,
            radius: DEFAULT_JOINT_RADIUS,
            local,
            world: Mat4::IDENTITY,
        }
    }

    /// Joint with a world bind matrix (local is filled in by [`Skeleton::from_world_binds`])
    pub fn with_world(name: impl Into<String>, parent: Option<usize>, world: Mat4) -> Self {
        let mut joint = Self::new(name, parent, Transform::IDENTITY);
        joint.world = world;
        joint
    }

    /// Inverse bind matrix (model space to joint space)
    pub fn inverse_bind(&self) -> Mat4 {
        self.world.inverse()
    }

    /// Bind position in model space
    pub fn world_position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }
}

/// Ordered joints, influence table and hash lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    joints: Vec<Joint>,
    influences: Vec<u16>,
    lookup: HashMap<u32, usize>,
}

impl Skeleton {
    /// Build from local bind transforms, deriving world matrices.
    pub fn new(joints: Vec<Joint>, influences: Vec<u16>) -> Result<Self, FormatError> {
        let mut skeleton = Self::validated(joints, influences)?;
        let parents = skeleton.parents();
        let locals: Vec<Mat4> = skeleton.joints.iter().map(|j| j.local.to_mat4()).collect();
        let worlds = compose_world(&parents, &locals);
        for (joint, world) in skeleton.joints.iter_mut().zip(worlds) {
            joint.world = world;
        }
        Ok(skeleton)
    }

    /// Build from world bind matrices, deriving local transforms.
    pub fn from_world_binds(joints: Vec<Joint>, influences: Vec<u16>) -> Result<Self, FormatError> {
        let mut skeleton = Self::validated(joints, influences)?;
        let locals: Vec<Transform> = skeleton
            .joints
            .iter()
            .map(|joint| {
                let relative = match joint.parent {
                    Some(parent) => skeleton.joints[parent].world.inverse() * joint.world,
                    None => joint.world,
                };
                Transform::from_mat4(&relative)
            })
            .collect();
        for (joint, local) in skeleton.joints.iter_mut().zip(locals) {
            joint.local = local;
        }
        Ok(skeleton)
    }

    /// Influence table mapping slot `i` to joint `i`
    pub fn identity_influences(joint_count: usize) -> Vec<u16> {
        (0..joint_count).map(|i| i as u16).collect()
    }

    fn validated(joints: Vec<Joint>, influences: Vec<u16>) -> Result<Self, FormatError> {
        let count = joints.len();
        for (index, joint) in joints.iter().enumerate() {
            match joint.parent {
                Some(parent) if parent >= count || parent == index => {
                    return Err(FormatError::InvalidParent {
                        joint: index,
                        parent: parent as i32,
                    });
                }
                _ => {}
            }
        }

        // A parent walk longer than the joint count must revisit a joint
        for index in 0..count {
            let mut current = joints[index].parent;
            let mut steps = 0;
            while let Some(parent) = current {
                steps += 1;
                if steps > count {
                    return Err(FormatError::CyclicHierarchy { joint: index });
                }
                current = joints[parent].parent;
            }
        }

        let mut lookup = HashMap::with_capacity(count);
        for (index, joint) in joints.iter().enumerate() {
            if lookup.insert(joint.hash, index).is_some() {
                return Err(FormatError::DuplicateJoint { hash: joint.hash });
            }
        }

        Ok(Self {
            joints,
            influences,
            lookup,
        })
    }

    fn parents(&self) -> Vec<Option<usize>> {
        self.joints.iter().map(|j| j.parent).collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    /// Influence table (may be empty, meaning slots index joints directly)
    pub fn influences(&self) -> &[u16] {
        &self.influences
    }

    /// Give back the joints and influence table for modification
    pub fn into_parts(self) -> (Vec<Joint>, Vec<u16>) {
        (self.joints, self.influences)
    }

    pub fn find_by_hash(&self, hash: u32) -> Option<usize> {
        self.lookup.get(&hash).copied()
    }

    /// Case-insensitive lookup through the name hash
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.find_by_hash(elf_hash(name))
    }

    pub fn is_root(&self, index: usize) -> bool {
        self.joints.get(index).is_some_and(|j| j.parent.is_none())
    }

    /// Indices of the direct children of `index`, in joint order
    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.joints
            .iter()
            .enumerate()
            .filter(move |(_, j)| j.parent == Some(index))
            .map(|(i, _)| i)
    }

    /// Bind-pose length of the bone ending at `index`, measured from its
    /// parent. `None` for roots.
    pub fn bone_length(&self, index: usize) -> Option<f32> {
        let parent = self.joints.get(index)?.parent?;
        let from = self.joints[parent].world_position();
        let to = self.joints[index].world_position();
        Some(from.distance(to))
    }

    /// Resolve a vertex influence slot to a joint index.
    ///
    /// An empty influence table maps slots straight to joints.
    pub fn resolve_influence(&self, slot: u8) -> Option<usize> {
        let joint = if self.influences.is_empty() {
            slot as usize
        } else {
            *self.influences.get(slot as usize)? as usize
        };
        (joint < self.joints.len()).then_some(joint)
    }

    /// Local bind transforms in joint order
    pub fn bind_pose(&self) -> Vec<Transform> {
        self.joints.iter().map(|j| j.local).collect()
    }

    /// Compose a local pose (one transform per joint) into model-space matrices
    pub fn world_pose(&self, pose: &[Transform]) -> Vec<Mat4> {
        let locals: Vec<Mat4> = self
            .joints
            .iter()
            .enumerate()
            .map(|(i, j)| pose.get(i).unwrap_or(&j.local).to_mat4())
            .collect();
        compose_world(&self.parents(), &locals)
    }
}

/// Compose local matrices down the hierarchy, parents before children.
///
/// Requires a validated (acyclic, in-range) parent list.
fn compose_world(parents: &[Option<usize>], locals: &[Mat4]) -> Vec<Mat4> {
    let mut world = vec![Mat4::IDENTITY; locals.len()];
    let mut done = vec![false; locals.len()];
    let mut chain = Vec::new();

    for index in 0..locals.len() {
        chain.clear();
        let mut current = Some(index);
        while let Some(joint) = current {
            if done[joint] {
                break;
            }
            chain.push(joint);
            current = parents[joint];
        }
        for &joint in chain.iter().rev() {
            world[joint] = match parents[joint] {
                Some(parent) => world[parent] * locals[joint],
                None => locals[joint],
            };
            done[joint] = true;
        }
    }

    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn chain() -> Skeleton {
        Skeleton::new(
            vec![
                Joint::new("Root", None, Transform::IDENTITY),
                Joint::new("Spine", Some(0), Transform::from_translation(Vec3::Y)),
                Joint::new("Head", Some(1), Transform::from_translation(Vec3::Y * 2.0)),
            ],
            vec![0, 1, 2],
        )
        .unwrap()
    }

    #[test]
    fn test_world_matrices_are_composed() {
        let skeleton = chain();
        assert_eq!(skeleton.joints()[2].world_position(), Vec3::new(0.0, 3.0, 0.0));
        let inverse = skeleton.joints()[2].inverse_bind();
        assert!(
            (inverse * skeleton.joints()[2].world).abs_diff_eq(Mat4::IDENTITY, 1e-6),
            "inverse bind should undo the world bind"
        );
    }

    #[test]
    fn test_parent_after_child_is_allowed() {
        // Modern files resolve parents through indices, not definition order
        let skeleton = Skeleton::new(
            vec![
                Joint::new("Child", Some(1), Transform::from_translation(Vec3::X)),
                Joint::new("Root", None, Transform::from_translation(Vec3::Z)),
            ],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(skeleton.joints()[0].world_position(), Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = Skeleton::new(
            vec![
                Joint::new("A", Some(1), Transform::IDENTITY),
                Joint::new("B", Some(0), Transform::IDENTITY),
            ],
            Vec::new(),
        );
        assert_eq!(result, Err(FormatError::CyclicHierarchy { joint: 0 }));
    }

    #[test]
    fn test_self_parent_and_out_of_range_rejected() {
        let result = Skeleton::new(vec![Joint::new("A", Some(0), Transform::IDENTITY)], vec![]);
        assert_eq!(result, Err(FormatError::InvalidParent { joint: 0, parent: 0 }));

        let result = Skeleton::new(vec![Joint::new("A", Some(4), Transform::IDENTITY)], vec![]);
        assert_eq!(result, Err(FormatError::InvalidParent { joint: 0, parent: 4 }));
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let result = Skeleton::new(
            vec![
                Joint::new("Root", None, Transform::IDENTITY),
                Joint::new("ROOT", Some(0), Transform::IDENTITY),
            ],
            vec![],
        );
        assert!(matches!(result, Err(FormatError::DuplicateJoint { .. })));
    }

    #[test]
    fn test_lookup_and_children() {
        let skeleton = chain();
        assert_eq!(skeleton.find_by_name("spine"), Some(1));
        assert_eq!(skeleton.find_by_hash(elf_hash("Head")), Some(2));
        assert_eq!(skeleton.find_by_name("Tail"), None);
        assert_eq!(skeleton.children(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(skeleton.children(2).count(), 0);
        assert!(skeleton.is_root(0));
        assert!(!skeleton.is_root(1));
    }

    #[test]
    fn test_bone_length() {
        let skeleton = chain();
        assert_eq!(skeleton.bone_length(0), None);
        assert_eq!(skeleton.bone_length(1), Some(1.0));
        assert_eq!(skeleton.bone_length(2), Some(2.0));
        assert_eq!(skeleton.bone_length(9), None);
    }

    #[test]
    fn test_resolve_influence() {
        let skeleton = Skeleton::new(
            vec![
                Joint::new("Root", None, Transform::IDENTITY),
                Joint::new("Spine", Some(0), Transform::IDENTITY),
            ],
            vec![1, 0, 7],
        )
        .unwrap();
        assert_eq!(skeleton.resolve_influence(0), Some(1));
        assert_eq!(skeleton.resolve_influence(1), Some(0));
        // Table entry points past the joints
        assert_eq!(skeleton.resolve_influence(2), None);
        // Slot past the table
        assert_eq!(skeleton.resolve_influence(3), None);

        let direct = chain().into_parts();
        let direct = Skeleton::new(direct.0, Vec::new()).unwrap();
        assert_eq!(direct.resolve_influence(2), Some(2));
        assert_eq!(direct.resolve_influence(3), None);
    }

    #[test]
    fn test_from_world_binds_derives_locals() {
        let root = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let child = root * Mat4::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::X);
        let skeleton = Skeleton::from_world_binds(
            vec![
                Joint::with_world("Root", None, root),
                Joint::with_world("Child", Some(0), child),
            ],
            vec![0, 1],
        )
        .unwrap();

        let local = skeleton.joints()[1].local;
        let expected = Transform::new(Vec3::X, Quat::from_rotation_z(0.5), Vec3::ONE);
        assert!(local.abs_diff_eq(&expected, 1e-5), "{local:?}");
        assert_eq!(skeleton.joints()[1].world, child);
    }

    #[test]
    fn test_world_pose() {
        let skeleton = chain();
        let mut pose = skeleton.bind_pose();
        pose[0].rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let world = skeleton.world_pose(&pose);
        let head = world[2].w_axis.truncate();
        assert!(head.abs_diff_eq(Vec3::new(-3.0, 0.0, 0.0), 1e-5), "{head}");
    }
}
