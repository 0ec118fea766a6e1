//! rig-export - rigged asset tool
//!
//! Inspects, converts and retargets skeletons (.skl), skinned meshes (.skn)
//! and animations (.anm)

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::{Path, PathBuf};

use rig_common::formats::anm::AnmVersion;
use rig_common::formats::skl::SklVersion;
use rig_common::formats::skn::SknVersion;
use rig_export::{convert, inspect, manifest, retarget};
use rig_retarget::AutoMapOptions;

#[derive(Parser)]
#[command(name = "rig-export")]
#[command(about = "Rigged asset tool for SKL, SKN and ANM files")]
#[command(version)]
struct Cli {
    /// Log debug details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary of an asset file
    Inspect {
        input: PathBuf,

        /// Skeleton a mesh is skinned to
        #[arg(short, long)]
        skeleton: Option<PathBuf>,
    },

    /// Re-encode a skeleton
    Skeleton {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Output generation (modern, legacy1, legacy2)
        #[arg(long, default_value = "modern")]
        version: SklVersion,
    },

    /// Re-encode a skinned mesh
    Mesh {
        input: PathBuf,

        /// Skeleton the mesh is skinned to
        #[arg(short, long)]
        skeleton: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Output generation (0, 1, 2, 4); the input's when omitted
        #[arg(long)]
        version: Option<SknVersion>,

        /// Renormalise vertex weights instead of rejecting them
        #[arg(long)]
        repair_weights: bool,
    },

    /// Re-encode an animation
    Animation {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Output mode (uncompressed, compressed, legacy, v5)
        #[arg(short, long, default_value = "uncompressed")]
        mode: AnmVersion,
    },

    /// Retarget an animation onto another skeleton
    #[command(group(ArgGroup::new("mapping").required(true).args(["map", "auto"])))]
    Retarget {
        /// Skeleton the animation was authored for
        #[arg(long)]
        source_skeleton: PathBuf,

        /// Skeleton to drive
        #[arg(long)]
        target_skeleton: PathBuf,

        #[arg(short, long)]
        animation: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Joint map toml ([joints] "Source" = "Target")
        #[arg(long)]
        map: Option<PathBuf>,

        /// Match joints by name
        #[arg(long)]
        auto: bool,

        /// Map the source root onto the target pelvis
        #[arg(long, requires = "auto")]
        map_root_to_pelvis: bool,

        /// Also map joints outside the core body set
        #[arg(long, requires = "auto")]
        keep_extras: bool,

        /// Output frame rate (default: the source animation's)
        #[arg(long)]
        fps: Option<f32>,

        /// Write a compressed animation
        #[arg(long)]
        compressed: bool,
    },

    /// Build assets from a manifest file
    Build {
        /// Path to rigkit.toml manifest
        #[arg(default_value = "rigkit.toml")]
        manifest: PathBuf,

        /// Output directory (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate manifest without building
    Check {
        /// Path to rigkit.toml manifest
        #[arg(default_value = "rigkit.toml")]
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Inspect { input, skeleton } => {
            let report = inspect::inspect(&input, skeleton.as_deref())?;
            print!("{}", report);
        }

        Commands::Skeleton {
            input,
            output,
            version,
        } => {
            tracing::info!("Converting {:?} -> {:?}", input, output);
            convert::convert_skeleton(&input, &output, version)?;
            tracing::info!("Done!");
        }

        Commands::Mesh {
            input,
            skeleton,
            output,
            version,
            repair_weights,
        } => {
            tracing::info!("Converting {:?} -> {:?}", input, output);
            convert::convert_mesh(&input, &skeleton, &output, version, repair_weights)?;
            tracing::info!("Done!");
        }

        Commands::Animation {
            input,
            output,
            mode,
        } => {
            tracing::info!("Converting {:?} -> {:?}", input, output);
            convert::convert_animation(&input, &output, mode)?;
            tracing::info!("Done!");
        }

        Commands::Retarget {
            source_skeleton,
            target_skeleton,
            animation,
            output,
            map,
            auto,
            map_root_to_pelvis,
            keep_extras,
            fps,
            compressed,
        } => {
            let map = match (map, auto) {
                (Some(path), false) => retarget::MapSource::File(path),
                (None, true) => retarget::MapSource::Auto(AutoMapOptions {
                    ignore_extras: !keep_extras,
                    map_root_to_pelvis,
                }),
                _ => bail!("Pass exactly one of --map or --auto"),
            };
            let version = if compressed {
                AnmVersion::Compressed
            } else {
                AnmVersion::V4
            };
            tracing::info!("Retargeting {:?} -> {:?}", animation, output);
            retarget::retarget_file(&retarget::RetargetJob {
                source_skeleton,
                target_skeleton,
                animation,
                output,
                map,
                frame_rate: fps,
                version,
            })?;
            tracing::info!("Done!");
        }

        Commands::Build { manifest, output } => {
            tracing::info!("Building assets from {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            let summary = manifest::build_all(&config, manifest_dir(&manifest), output.as_deref())
                .with_context(|| format!("Build of {:?} failed", manifest))?;
            tracing::info!(
                "Build complete! {} converted, {} retargeted",
                summary.converted,
                summary.retargeted
            );
        }

        Commands::Check { manifest } => {
            tracing::info!("Checking manifest {:?}", manifest);
            manifest::load_manifest(&manifest)?;
            tracing::info!("Manifest is valid!");
        }
    }

    Ok(())
}

/// Directory relative manifest paths resolve against
fn manifest_dir(manifest: &Path) -> &Path {
    manifest.parent().unwrap_or_else(|| Path::new("."))
}
