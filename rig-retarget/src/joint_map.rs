//! Source-to-target joint name mapping
//!
//! A map is built by hand, loaded from a TOML file, or generated from the
//! two skeletons' joint names:
//!
//! ```toml
//! [joints]
//! "Pelvis" = "C_Pelvis"
//! "L_Knee" = "L_KneeUpper"
//! ```
//!
//! Automatic mapping tries, in order: the exact name, the normalised name
//! (lower case, rig prefixes stripped), the alias table, then containment of
//! one normalised name in the other. Left and right joints never match each
//! other.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use rig_common::{Animation, Skeleton};
use serde::Deserialize;

use crate::error::RetargetError;

/// Prefixes stripped by [`normalize_joint_name`], in order
const STRIPPED_PREFIXES: [&str; 6] = ["c_", "l_", "r_", "buffbone_", "glb_", "cstm_"];

/// Alternative names of common joints, keyed by lower-case source name
const ALIASES: &[(&str, &[&str])] = &[
    ("spine3", &["chest", "buffbone_glb_chest", "c_chest"]),
    ("chest", &["spine3", "buffbone_glb_chest", "c_spine3"]),
    ("buffbone_glb_chest", &["chest", "spine3", "c_chest"]),
    ("root", &["pelvis", "c_pelvis", "c_root"]),
    ("pelvis", &["root", "c_root", "c_pelvis"]),
    ("c_spine", &["spine", "spine1"]),
    ("c_spine1", &["spine1", "spine"]),
    ("c_spine2", &["spine2"]),
];

/// Normalised names of the body joints kept when extras are ignored
const CORE_JOINTS: &[&str] = &[
    "root", "pelvis", "hip", "spine", "spine1", "spine2", "spine3", "chest", "neck", "head",
    "clavicle", "shoulder", "elbow", "hand", "thumb1", "thumb2", "thumb3", "index1", "index2",
    "index3", "middle1", "middle2", "middle3", "ring1", "ring2", "ring3", "pinky1", "pinky2",
    "pinky3", "knee", "kneelower", "kneeupper", "foot", "toe", "ball",
];

/// Lower-case `name` and strip the rig prefixes (`c_`, `l_`, `r_`,
/// `buffbone_`, `glb_`, `cstm_`), each at most once and in that order
pub fn normalize_joint_name(name: &str) -> String {
    let mut name = name.to_ascii_lowercase();
    for prefix in STRIPPED_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest.to_string();
        }
    }
    name
}

/// Body joint (not a buff bone, helper, weapon, hair or face joint)
pub fn is_core_joint(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.contains("buffbone") || lower.contains("helper") {
        return false;
    }
    CORE_JOINTS.contains(&normalize_joint_name(name).as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn side(name: &str) -> Option<Side> {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("l_") {
        Some(Side::Left)
    } else if lower.starts_with("r_") {
        Some(Side::Right)
    } else {
        None
    }
}

fn same_side(a: &str, b: &str) -> bool {
    match (side(a), side(b)) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Best target for `source` among `targets`, `None` when nothing matches
pub fn find_best_match<'a>(source: &str, targets: &[&'a str]) -> Option<&'a str> {
    if let Some(&exact) = targets.iter().find(|t| **t == source) {
        return Some(exact);
    }

    let normalized = normalize_joint_name(source);
    let candidates = || targets.iter().copied().filter(|t| same_side(source, t));

    if let Some(target) = candidates().find(|t| normalize_joint_name(t) == normalized) {
        return Some(target);
    }

    let lower = source.to_ascii_lowercase();
    if let Some((_, aliases)) = ALIASES.iter().find(|(name, _)| *name == lower) {
        for alias in *aliases {
            let found = candidates()
                .find(|t| t.to_ascii_lowercase() == *alias || normalize_joint_name(t) == *alias);
            if found.is_some() {
                return found;
            }
        }
    }

    if normalized.is_empty() {
        return None;
    }
    candidates().find(|t| {
        let target = normalize_joint_name(t);
        !target.is_empty() && (target.contains(&normalized) || normalized.contains(&target))
    })
}

/// Options of [`JointMap::auto`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoMapOptions {
    /// Map only core body joints on both sides
    pub ignore_extras: bool,
    /// Map the source root onto the target pelvis (or hip) and leave the
    /// source pelvis unmapped
    pub map_root_to_pelvis: bool,
}

impl Default for AutoMapOptions {
    fn default() -> Self {
        Self {
            ignore_extras: true,
            map_root_to_pelvis: false,
        }
    }
}

/// Joint map file contents
#[derive(Debug, Deserialize)]
struct JointMapFile {
    #[serde(default)]
    joints: BTreeMap<String, String>,
}

/// Source joint name to target joint name, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl JointMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `source` to `target`, returning the previous target of `source`
    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) -> Option<String> {
        let source = source.into();
        let target = target.into();
        match self.index.get(&source) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, target)),
            None => {
                self.index.insert(source.clone(), self.entries.len());
                self.entries.push((source, target));
                None
            }
        }
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.index.get(source).map(|&i| self.entries[i].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(source, target)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    /// Every joint of `skeleton` mapped to itself
    pub fn identity(skeleton: &Skeleton) -> Self {
        let mut map = Self::new();
        for joint in skeleton.joints() {
            map.insert(joint.name.clone(), joint.name.clone());
        }
        map
    }

    /// Parse a `[joints]` table of `"Source" = "Target"` entries
    pub fn from_toml_str(text: &str) -> Result<Self, RetargetError> {
        let file: JointMapFile = toml::from_str(text)?;
        let mut map = Self::new();
        for (source, target) in file.joints {
            map.insert(source, target);
        }
        Ok(map)
    }

    /// Generate a map from the joint names of both skeletons
    pub fn auto(source: &Skeleton, target: &Skeleton, options: &AutoMapOptions) -> Self {
        let targets: Vec<&str> = target.joints().iter().map(|j| j.name.as_str()).collect();
        let mut map = Self::new();
        let mut unmatched = 0;

        for joint in source.joints() {
            let name = joint.name.as_str();
            if options.ignore_extras && !is_core_joint(name) {
                unmatched += 1;
                continue;
            }

            let normalized = normalize_joint_name(name);
            if options.map_root_to_pelvis {
                if normalized == "pelvis" || normalized == "hip" {
                    unmatched += 1;
                    continue;
                }
                if normalized == "root" {
                    let pelvis = targets.iter().find(|t| {
                        let t = normalize_joint_name(t);
                        t == "pelvis" || t == "hip"
                    });
                    if let Some(pelvis) = pelvis {
                        map.insert(name, *pelvis);
                        continue;
                    }
                }
            }

            match find_best_match(name, &targets) {
                Some(found) if !options.ignore_extras || is_core_joint(found) => {
                    tracing::trace!("Auto-mapped {} -> {}", name, found);
                    map.insert(name, found);
                }
                _ => unmatched += 1,
            }
        }

        tracing::debug!(
            "Joint map generated: {} matched, {} unmatched",
            map.len(),
            unmatched
        );
        map
    }

    /// Resolve names to `(source index, target index)` pairs.
    ///
    /// Names missing from either skeleton are skipped. When several sources
    /// map to the same target, the first one wins.
    pub fn resolve(&self, source: &Skeleton, target: &Skeleton) -> Vec<(usize, usize)> {
        self.resolve_where(source, target, |_| true)
    }

    /// [`resolve`](Self::resolve) restricted to source joints `animation`
    /// moves, so an unanimated source never claims a target another
    /// source animates.
    pub fn resolve_animated(
        &self,
        source: &Skeleton,
        target: &Skeleton,
        animation: &Animation,
    ) -> Vec<(usize, usize)> {
        self.resolve_where(source, target, |s| {
            let joint = &source.joints()[s];
            let animated = animation
                .track(joint.hash)
                .is_some_and(|track| !track.keys.is_empty());
            if !animated {
                tracing::debug!("Source joint '{}' is not animated", joint.name);
            }
            animated
        })
    }

    fn resolve_where(
        &self,
        source: &Skeleton,
        target: &Skeleton,
        keep: impl Fn(usize) -> bool,
    ) -> Vec<(usize, usize)> {
        let mut pairs = Vec::with_capacity(self.entries.len());
        let mut used = HashSet::new();
        for (source_name, target_name) in self.iter() {
            let Some(s) = source.find_by_name(source_name) else {
                tracing::debug!("Mapped joint '{}' is not in the source skeleton", source_name);
                continue;
            };
            let Some(t) = target.find_by_name(target_name) else {
                tracing::debug!("Mapped joint '{}' is not in the target skeleton", target_name);
                continue;
            };
            if !keep(s) {
                continue;
            }
            if !used.insert(t) {
                tracing::warn!(
                    "Target joint '{}' is already mapped, ignoring '{}'",
                    target_name,
                    source_name
                );
                continue;
            }
            pairs.push((s, t));
        }
        pairs
    }
}
