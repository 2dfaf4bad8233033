//! Door asset pipeline
//!
//! Usage:
//!   simdoor generate --door-type panel --handle-type knob --seed 1003
//!   simdoor batch --count 10 --sampler-seed 3
//!   simdoor render --out door_gen.py
//!   simdoor verify sim_exports/mjcf/door/1003
//!   simdoor init-config --blender /path/to/blender --infinigen-root /path/to/lib --python /path/to/python

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use simdoor::config::{self, DoorConfig, DoorType, ExportFormat, HandleType, PipelineConfig, ToolPaths};
use simdoor::template::{render_generation_script, RenderContext};
use simdoor::verify::verify_output;
use simdoor::{Pipeline, SystemRunner};

#[derive(Parser)]
#[command(name = "simdoor")]
#[command(about = "Generate simulation-ready door assets")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/simdoor/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output, including tool stdout
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and export a single door
    Generate {
        #[command(flatten)]
        door: DoorOverrides,
    },
    /// Generate many doors with sampled parameters
    Batch {
        /// Number of doors (default: batch.count from the config)
        #[arg(long)]
        count: Option<usize>,
        /// Sampler seed (default: batch.sampler_seed from the config)
        #[arg(long)]
        sampler_seed: Option<u64>,
    },
    /// Print the generation script without running anything
    Render {
        #[command(flatten)]
        door: DoorOverrides,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check an existing export directory
    Verify {
        /// Directory holding the simulator description
        dir: PathBuf,
        #[command(flatten)]
        door: DoorOverrides,
    },
    /// Write a config file with the given tool locations and default door
    InitConfig {
        /// 3D tool executable
        #[arg(long)]
        blender: PathBuf,
        /// Asset library installation root
        #[arg(long)]
        infinigen_root: PathBuf,
        /// Interpreter that runs the exporter
        #[arg(long)]
        python: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Per-run overrides of the configured door
#[derive(Args, Default)]
struct DoorOverrides {
    /// panel, glass_panel, louver, lite
    #[arg(long)]
    door_type: Option<DoorType>,
    /// knob, lever, pull, bar, none
    #[arg(long)]
    handle_type: Option<HandleType>,
    /// Horizontal subdivisions
    #[arg(long = "x")]
    x_subdivisions: Option<u32>,
    /// Vertical subdivisions
    #[arg(long = "y")]
    y_subdivisions: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    /// mjcf, urdf, usd
    #[arg(long)]
    format: Option<ExportFormat>,
}

impl DoorOverrides {
    fn apply(&self, door: &mut DoorConfig) {
        if let Some(v) = self.door_type {
            door.door_type = v;
        }
        if let Some(v) = self.handle_type {
            door.handle_type = v;
        }
        if let Some(v) = self.x_subdivisions {
            door.x_subdivisions = v;
        }
        if let Some(v) = self.y_subdivisions {
            door.y_subdivisions = v;
        }
        if let Some(v) = self.seed {
            door.seed = v;
        }
        if let Some(v) = self.format {
            door.export_format = v;
        }
    }
}

fn main() -> Result<()> {
    // Initialize crash logging FIRST (before any other code)
    crashlog::setup!(crashlog::cargo_metadata!().capitalized(), false);

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Generate { door } => generate(&config_path, &door),
        Commands::Batch { count, sampler_seed } => batch(&config_path, count, sampler_seed),
        Commands::Render { door, out } => render(&config_path, &door, out),
        Commands::Verify { dir, door } => verify(&config_path, &dir, &door),
        Commands::InitConfig {
            blender,
            infinigen_root,
            python,
            force,
        } => init_config(&config_path, ToolPaths::new(blender, infinigen_root, python), force),
    }
}

fn load(path: &std::path::Path, door: &DoorOverrides) -> Result<PipelineConfig> {
    let mut config = config::load_config(path).with_context(|| {
        format!(
            "Failed to load config {} (create one with `simdoor init-config`)",
            path.display()
        )
    })?;
    door.apply(&mut config.door);
    Ok(config)
}

fn generate(config_path: &std::path::Path, door: &DoorOverrides) -> Result<()> {
    let config = load(config_path, door)?;
    let mut pipeline = Pipeline::new(config, SystemRunner);
    let outcome = pipeline.run().context("Door pipeline failed")?;

    println!("Door exported: {}", outcome.output_dir.display());
    println!("  door_type:      {}", outcome.door.door_type);
    println!("  handle_type:    {}", outcome.door.handle_type);
    println!("  x_subdivisions: {}", outcome.door.x_subdivisions);
    println!("  y_subdivisions: {}", outcome.door.y_subdivisions);
    println!("  seed:           {}", outcome.door.seed);
    Ok(())
}

fn batch(config_path: &std::path::Path, count: Option<usize>, sampler_seed: Option<u64>) -> Result<()> {
    let mut config = load(config_path, &DoorOverrides::default())?;
    if let Some(seed) = sampler_seed {
        config.batch.sampler_seed = seed;
    }
    let count = count.unwrap_or(config.batch.count);

    let mut pipeline = Pipeline::new(config, SystemRunner);
    let outcomes = pipeline.batch(count).context("Batch generation failed")?;

    println!("Generated {} doors:", outcomes.len());
    for (i, outcome) in outcomes.iter().enumerate() {
        println!(
            "  Door {}: {} ({} / {})",
            i + 1,
            outcome.output_dir.display(),
            outcome.door.door_type,
            outcome.door.handle_type
        );
    }
    Ok(())
}

fn render(config_path: &std::path::Path, door: &DoorOverrides, out: Option<PathBuf>) -> Result<()> {
    let config = load(config_path, door)?;
    config.door.validate()?;

    let script = render_generation_script(
        &config.door,
        &RenderContext {
            library_root: &config.tools.infinigen_root,
        },
    );

    match out {
        Some(path) => {
            std::fs::write(&path, script)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote generation script to {}", path.display());
        }
        None => print!("{}", script),
    }
    Ok(())
}

fn verify(config_path: &std::path::Path, dir: &std::path::Path, door: &DoorOverrides) -> Result<()> {
    // Only the door matters here; no tool section needed
    let mut expected = config::load_door_config(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    door.apply(&mut expected);
    let report = verify_output(dir, &expected)?;
    report.log();
    if report.is_clean() {
        println!("Output OK: {}", dir.display());
    } else {
        println!("Output present with warnings: {}", dir.display());
    }
    Ok(())
}

fn init_config(path: &std::path::Path, tools: ToolPaths, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config::save_config(&PipelineConfig::new(tools), path)?;
    println!("Config written: {}", path.display());
    Ok(())
}
