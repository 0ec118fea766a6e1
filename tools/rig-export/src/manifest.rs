//! rigkit.toml build manifest
//!
//! ```toml
//! [output]
//! dir = "out/"
//!
//! [defaults]
//! skeleton_version = "modern"
//! animation_mode = "uncompressed"
//!
//! [[convert]]
//! input = "champions/"          # file or directory
//! animation_mode = "compressed"
//!
//! [[retarget]]
//! source_skeleton = "base.skl"
//! target_skeleton = "tall.skl"
//! animations = ["run.anm", "idle.anm"]
//! auto = true
//! ```
//!
//! Relative paths resolve against the manifest's directory. Every file job
//! is independent, so a build runs them in parallel.

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use rig_common::AssetKind;
use rig_common::formats::anm::AnmVersion;
use rig_common::formats::skl::SklVersion;
use rig_common::formats::skn::SknVersion;
use rig_retarget::AutoMapOptions;

use crate::convert::{convert_animation, convert_mesh, convert_skeleton};
use crate::retarget::{MapSource, RetargetJob, retarget_file};

/// rigkit.toml manifest structure
#[derive(Debug, Default, Deserialize)]
pub struct RigManifest {
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub convert: Vec<ConvertEntry>,
    #[serde(default)]
    pub retarget: Vec<RetargetEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OutputSection {
    /// Output directory, relative to the manifest
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out/")
}

/// Settings used by entries that do not override them
#[derive(Debug, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_skeleton_version")]
    pub skeleton_version: String,
    /// Keep each mesh's own generation when unset
    #[serde(default)]
    pub mesh_version: Option<String>,
    #[serde(default = "default_animation_mode")]
    pub animation_mode: String,
    /// Retarget output frame rate, the source animation's when unset
    #[serde(default)]
    pub frame_rate: Option<f32>,
    #[serde(default)]
    pub repair_weights: bool,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            skeleton_version: default_skeleton_version(),
            mesh_version: None,
            animation_mode: default_animation_mode(),
            frame_rate: None,
            repair_weights: false,
        }
    }
}

fn default_skeleton_version() -> String {
    "modern".to_string()
}

fn default_animation_mode() -> String {
    "uncompressed".to_string()
}

fn default_ignore_extras() -> bool {
    true
}

/// Files to re-encode
#[derive(Debug, Deserialize)]
pub struct ConvertEntry {
    /// File, or directory walked recursively for .skl/.skn/.anm files
    pub input: PathBuf,
    /// Skeleton for meshes; a mesh's sibling .skl is used when unset
    #[serde(default)]
    pub skeleton: Option<PathBuf>,
    #[serde(default)]
    pub skeleton_version: Option<String>,
    #[serde(default)]
    pub mesh_version: Option<String>,
    #[serde(default)]
    pub animation_mode: Option<String>,
    #[serde(default)]
    pub repair_weights: Option<bool>,
}

/// Animations to move from one skeleton to another
#[derive(Debug, Deserialize)]
pub struct RetargetEntry {
    pub source_skeleton: PathBuf,
    pub target_skeleton: PathBuf,
    pub animations: Vec<PathBuf>,
    /// Joint map file; required unless `auto` is set
    #[serde(default)]
    pub map: Option<PathBuf>,
    #[serde(default)]
    pub auto: bool,
    #[serde(default)]
    pub map_root_to_pelvis: bool,
    #[serde(default = "default_ignore_extras")]
    pub ignore_extras: bool,
    #[serde(default)]
    pub frame_rate: Option<f32>,
    /// Output animation mode
    #[serde(default)]
    pub mode: Option<String>,
}

/// Outcome of a build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub converted: usize,
    pub retargeted: usize,
}

/// One unit of work
#[derive(Debug)]
enum Job {
    Skeleton {
        input: PathBuf,
        output: PathBuf,
        version: SklVersion,
    },
    Mesh {
        input: PathBuf,
        skeleton: PathBuf,
        output: PathBuf,
        version: Option<SknVersion>,
        repair_weights: bool,
    },
    Animation {
        input: PathBuf,
        output: PathBuf,
        version: AnmVersion,
    },
    Retarget(RetargetJob),
}

impl Job {
    fn run(&self) -> Result<()> {
        match self {
            Self::Skeleton {
                input,
                output,
                version,
            } => convert_skeleton(input, output, *version),
            Self::Mesh {
                input,
                skeleton,
                output,
                version,
                repair_weights,
            } => convert_mesh(input, skeleton, output, *version, *repair_weights),
            Self::Animation {
                input,
                output,
                version,
            } => convert_animation(input, output, *version),
            Self::Retarget(job) => retarget_file(job).map(|_| ()),
        }
    }
}

/// Load manifest from file
pub fn load_manifest(path: &Path) -> Result<RigManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    parse_manifest(&content)
}

/// Parse manifest from string
pub fn parse_manifest(content: &str) -> Result<RigManifest> {
    let manifest: RigManifest = toml::from_str(content).context("Failed to parse rigkit.toml")?;
    validate(&manifest)?;
    Ok(manifest)
}

fn parse_skeleton_version(name: &str) -> Result<SklVersion> {
    name.parse().map_err(anyhow::Error::msg)
}

fn parse_mesh_version(name: Option<&str>) -> Result<Option<SknVersion>> {
    name.map(|n| n.parse().map_err(anyhow::Error::msg))
        .transpose()
}

fn parse_animation_mode(name: &str) -> Result<AnmVersion> {
    name.parse().map_err(anyhow::Error::msg)
}

/// Check every version name and retarget entry without touching the disk
pub fn validate(manifest: &RigManifest) -> Result<()> {
    let defaults = &manifest.defaults;
    parse_skeleton_version(&defaults.skeleton_version)?;
    parse_mesh_version(defaults.mesh_version.as_deref())?;
    parse_animation_mode(&defaults.animation_mode)?;

    for entry in &manifest.convert {
        if let Some(name) = &entry.skeleton_version {
            parse_skeleton_version(name)?;
        }
        parse_mesh_version(entry.mesh_version.as_deref())?;
        if let Some(name) = &entry.animation_mode {
            parse_animation_mode(name)?;
        }
    }

    for entry in &manifest.retarget {
        if entry.map.is_none() && !entry.auto {
            bail!(
                "Retarget of {:?} needs `map` or `auto = true`",
                entry.source_skeleton
            );
        }
        if entry.map.is_some() && entry.auto {
            bail!(
                "Retarget of {:?} sets both `map` and `auto`",
                entry.source_skeleton
            );
        }
        if entry.animations.is_empty() {
            bail!("Retarget of {:?} lists no animations", entry.source_skeleton);
        }
        if let Some(name) = &entry.mode {
            parse_animation_mode(name)?;
        }
    }
    Ok(())
}

/// Files under `input` with a recognized extension, with their path
/// relative to `input` (just the file name when `input` is a file)
fn collect_inputs(input: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    if !input.is_dir() {
        let name = input
            .file_name()
            .with_context(|| format!("Input {:?} has no file name", input))?;
        return Ok(vec![(input.to_path_buf(), PathBuf::from(name))]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", input))?;
        if !entry.file_type().is_file() || kind_from_extension(entry.path()).is_none() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(input)
            .with_context(|| format!("{:?} is outside {:?}", entry.path(), input))?
            .to_path_buf();
        files.push((entry.path().to_path_buf(), relative));
    }
    Ok(files)
}

fn kind_from_extension(path: &Path) -> Option<AssetKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "skl" => Some(AssetKind::Skeleton),
        "skn" => Some(AssetKind::Mesh),
        "anm" => Some(AssetKind::Animation),
        _ => None,
    }
}

fn convert_jobs(
    manifest: &RigManifest,
    base: &Path,
    output_dir: &Path,
    entry: &ConvertEntry,
) -> Result<Vec<Job>> {
    let defaults = &manifest.defaults;
    let skeleton_version = parse_skeleton_version(
        entry
            .skeleton_version
            .as_deref()
            .unwrap_or(&defaults.skeleton_version),
    )?;
    let mesh_version = parse_mesh_version(
        entry
            .mesh_version
            .as_deref()
            .or(defaults.mesh_version.as_deref()),
    )?;
    let animation_mode = parse_animation_mode(
        entry
            .animation_mode
            .as_deref()
            .unwrap_or(&defaults.animation_mode),
    )?;
    let repair_weights = entry.repair_weights.unwrap_or(defaults.repair_weights);

    let input = base.join(&entry.input);
    let files = collect_inputs(&input)?;
    if files.is_empty() {
        tracing::warn!("No .skl, .skn or .anm files under {:?}", input);
    }

    let mut jobs = Vec::with_capacity(files.len());
    for (path, relative) in files {
        let output = output_dir.join(&relative);
        let job = match kind_from_extension(&path) {
            Some(AssetKind::Skeleton) => Job::Skeleton {
                input: path,
                output,
                version: skeleton_version,
            },
            Some(AssetKind::Mesh) => Job::Mesh {
                skeleton: entry
                    .skeleton
                    .as_ref()
                    .map_or_else(|| path.with_extension("skl"), |s| base.join(s)),
                input: path,
                output,
                version: mesh_version,
                repair_weights,
            },
            Some(AssetKind::Animation) => Job::Animation {
                input: path,
                output,
                version: animation_mode,
            },
            None => bail!("Unsupported input {:?} (use .skl, .skn or .anm)", path),
        };
        jobs.push(job);
    }
    Ok(jobs)
}

fn retarget_jobs(
    manifest: &RigManifest,
    base: &Path,
    output_dir: &Path,
    entry: &RetargetEntry,
) -> Result<Vec<Job>> {
    let version = parse_animation_mode(
        entry
            .mode
            .as_deref()
            .unwrap_or(&manifest.defaults.animation_mode),
    )?;
    let map = match &entry.map {
        Some(path) => MapSource::File(base.join(path)),
        None => MapSource::Auto(AutoMapOptions {
            ignore_extras: entry.ignore_extras,
            map_root_to_pelvis: entry.map_root_to_pelvis,
        }),
    };

    entry
        .animations
        .iter()
        .map(|animation| {
            let name = animation
                .file_name()
                .with_context(|| format!("Animation {:?} has no file name", animation))?;
            Ok(Job::Retarget(RetargetJob {
                source_skeleton: base.join(&entry.source_skeleton),
                target_skeleton: base.join(&entry.target_skeleton),
                animation: base.join(animation),
                output: output_dir.join(name),
                map: map.clone(),
                frame_rate: entry.frame_rate.or(manifest.defaults.frame_rate),
                version,
            }))
        })
        .collect()
}

/// Run every job of `manifest`.
///
/// `base` is the directory relative paths resolve against; `output`
/// overrides `[output] dir`.
pub fn build_all(manifest: &RigManifest, base: &Path, output: Option<&Path>) -> Result<BuildSummary> {
    let output_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => base.join(&manifest.output.dir),
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let mut jobs = Vec::new();
    for entry in &manifest.convert {
        jobs.extend(convert_jobs(manifest, base, &output_dir, entry)?);
    }
    let converted = jobs.len();
    for entry in &manifest.retarget {
        jobs.extend(retarget_jobs(manifest, base, &output_dir, entry)?);
    }
    let summary = BuildSummary {
        converted,
        retargeted: jobs.len() - converted,
    };

    tracing::debug!(
        "Running {} conversions and {} retargets",
        summary.converted,
        summary.retargeted
    );
    jobs.par_iter()
        .map(Job::run)
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        "Built {} files into {:?}",
        summary.converted + summary.retargeted,
        output_dir
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let manifest = parse_manifest("").unwrap();
        assert_eq!(manifest.output.dir, PathBuf::from("out/"));
        assert_eq!(manifest.defaults.skeleton_version, "modern");
        assert_eq!(manifest.defaults.animation_mode, "uncompressed");
        assert!(!manifest.defaults.repair_weights);
        assert!(manifest.convert.is_empty());
        assert!(manifest.retarget.is_empty());
    }

    #[test]
    fn test_full_manifest() {
        let manifest = parse_manifest(
            r#"
            [output]
            dir = "build"

            [defaults]
            animation_mode = "compressed"
            frame_rate = 60.0

            [[convert]]
            input = "assets/"
            skeleton_version = "legacy2"

            [[retarget]]
            source_skeleton = "a.skl"
            target_skeleton = "b.skl"
            animations = ["run.anm"]
            auto = true
            map_root_to_pelvis = true
            "#,
        )
        .unwrap();

        assert_eq!(manifest.output.dir, PathBuf::from("build"));
        assert_eq!(manifest.defaults.frame_rate, Some(60.0));
        assert_eq!(manifest.convert[0].skeleton_version.as_deref(), Some("legacy2"));
        let retarget = &manifest.retarget[0];
        assert!(retarget.auto);
        assert!(retarget.map_root_to_pelvis);
        assert!(retarget.ignore_extras, "ignore_extras defaults to true");
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = parse_manifest("[defaults]\nanimation_mode = \"v9\"").unwrap_err();
        assert!(err.to_string().contains("v9"), "{err}");
    }

    #[test]
    fn test_retarget_needs_a_map() {
        let toml = r#"
            [[retarget]]
            source_skeleton = "a.skl"
            target_skeleton = "b.skl"
            animations = ["run.anm"]
        "#;
        assert!(parse_manifest(toml).is_err());
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(kind_from_extension(Path::new("a/B.SKL")), Some(AssetKind::Skeleton));
        assert_eq!(kind_from_extension(Path::new("b.skn")), Some(AssetKind::Mesh));
        assert_eq!(kind_from_extension(Path::new("c.anm")), Some(AssetKind::Animation));
        assert_eq!(kind_from_extension(Path::new("readme.txt")), None);
    }
}
