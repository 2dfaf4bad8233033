//! Door Pipeline
//!
//! Strictly linear, fail fast:
//!
//! 1. validate the door config and locate the external tools
//! 2. render the generation and export scripts and joint bindings into temp files
//! 3. run the headless 3D tool on the script (scene file)
//! 4. run the export script (description, visual assets, metadata)
//! 5. move the export into the target directory if it landed elsewhere
//! 6. verify the output
//!
//! Every stage returns a `Result` and the first error ends the run. The temp
//! files are dropped on every path, which deletes them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::config::{DoorConfig, PipelineConfig};
use crate::error::{describe_exit, PipelineError, PipelineResult, Stage};
use crate::sampling::ParameterSampler;
use crate::template::{
    render_export_script, render_generation_script, render_joint_config, RenderContext, EXPORT_MARKER,
};
use crate::tools::{resolve_executable, Invocation, ToolOutput, ToolRunner};
use crate::verify::{verify_output, VerificationReport};

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub door: DoorConfig,
    pub output_dir: PathBuf,
    pub scene_file: PathBuf,
    pub report: VerificationReport,
}

/// Executables and directories after resolution, all absolute
#[derive(Debug, Clone)]
struct ResolvedTools {
    blender: PathBuf,
    python: PathBuf,
    root: PathBuf,
    export_root: PathBuf,
}

/// Temp files backing one door run
struct RunFiles {
    generation: NamedTempFile,
    export: NamedTempFile,
    joints: NamedTempFile,
}

impl RunFiles {
    /// Explicit close so a failed delete is at least visible
    fn close(self) {
        for file in [self.generation, self.export, self.joints] {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Runs the door pipeline against a [`ToolRunner`]
pub struct Pipeline<R: ToolRunner> {
    config: PipelineConfig,
    runner: R,
}

impl<R: ToolRunner> Pipeline<R> {
    pub fn new(config: PipelineConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Generate the configured door into `sim_exports/<format>/<asset>/<seed>`
    pub fn run(&mut self) -> PipelineResult<RunOutcome> {
        let door = self.config.door.clone();
        door.validate()?;
        let tools = self.check_prerequisites()?;
        let target = door.output_dir_under(&tools.export_root);
        self.run_resolved(&tools, &door, &target)
    }

    /// Generate `count` randomized doors into
    /// `sim_exports/<format>/<asset>s/<asset>_<index>`, stopping at the first failure
    pub fn batch(&mut self, count: usize) -> PipelineResult<Vec<RunOutcome>> {
        let mut sampler = ParameterSampler::new(self.config.batch.clone())?;
        let base = self.config.door.clone();
        let tools = self.check_prerequisites()?;

        let pb = ProgressBar::new(count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("Generating doors [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );

        let mut outcomes = Vec::with_capacity(count);
        for index in 0..count {
            let door = sampler.sample(&base);
            pb.set_message(format!(
                "{} / {} / {}x{} / seed {}",
                door.door_type, door.handle_type, door.x_subdivisions, door.y_subdivisions, door.seed
            ));

            let target = batch_dir(&tools.export_root, &door, index);
            match self.run_resolved(&tools, &door, &target) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    pb.abandon_with_message(format!("Door {} failed", index));
                    return Err(e);
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!("Generated {} doors", outcomes.len()));
        Ok(outcomes)
    }

    /// Run every stage for one door, leaving the result in `target`
    pub fn run_door(&mut self, door: &DoorConfig, target: &Path) -> PipelineResult<RunOutcome> {
        door.validate()?;
        let tools = self.check_prerequisites()?;
        self.run_resolved(&tools, door, target)
    }

    fn run_resolved(&mut self, tools: &ResolvedTools, door: &DoorConfig, target: &Path) -> PipelineResult<RunOutcome> {
        door.validate()?;
        info!(
            "Door: {} / handle {} / {}x{} / seed {} -> {}",
            door.door_type,
            door.handle_type,
            door.x_subdivisions,
            door.y_subdivisions,
            door.seed,
            target.display()
        );

        let ctx = RenderContext { library_root: &tools.root };
        let files = RunFiles {
            generation: write_temp(
                &format!("door_gen_{}_", door.seed),
                ".py",
                &render_generation_script(door, &ctx),
            )?,
            export: write_temp(
                &format!("door_export_{}_", door.seed),
                ".py",
                &render_export_script(door, &ctx, &self.config.tools.export_module),
            )?,
            joints: write_temp("door_joints_", ".gin", &render_joint_config(&door.joints))?,
        };
        debug!("Generation script: {}", files.generation.path().display());
        debug!("Export script: {}", files.export.path().display());

        let scene_file = self.generate(tools, door, files.generation.path())?;
        let export = self.export(tools, door, files.export.path(), files.joints.path())?;
        self.relocate(tools, door, &export, target)?;

        let report = verify_output(target, door)?;
        report.log();
        files.close();

        info!("Door ready: {}", target.display());
        Ok(RunOutcome {
            door: door.clone(),
            output_dir: target.to_path_buf(),
            scene_file,
            report,
        })
    }

    /// Resolve executables and the library root to absolute paths.
    ///
    /// Both tools run with the library root as working directory, so any
    /// relative path left here would be read against the wrong directory.
    fn check_prerequisites(&self) -> PipelineResult<ResolvedTools> {
        let tools = &self.config.tools;
        let blender = absolute(&resolve_executable(&tools.blender)?)?;
        let python = absolute(&resolve_executable(&tools.python)?)?;
        if !tools.infinigen_root.is_dir() {
            return Err(PipelineError::InvalidConfig(format!(
                "asset library root {} is not a directory",
                tools.infinigen_root.display()
            )));
        }
        let root = absolute(&tools.infinigen_root)?;
        let export_root = root.join(&self.config.export_root);
        Ok(ResolvedTools {
            blender,
            python,
            root,
            export_root,
        })
    }

    /// Headless 3D tool: build the door and save the scene
    fn generate(&mut self, tools: &ResolvedTools, door: &DoorConfig, script: &Path) -> PipelineResult<PathBuf> {
        info!("Step 1: generating door scene");
        let invocation = Invocation::new(Stage::Generate, &tools.blender)
            .arg("--background")
            .arg("--python")
            .arg(script)
            .current_dir(&tools.root);
        self.invoke(&invocation)?;

        let scene_file = tools.root.join(door.scene_file_name());
        if !scene_file.is_file() {
            warn!("Generation succeeded but {} is missing", scene_file.display());
        }
        Ok(scene_file)
    }

    /// Exporter: run the export script, which pins the library to this door
    fn export(
        &mut self,
        tools: &ResolvedTools,
        door: &DoorConfig,
        script: &Path,
        joints: &Path,
    ) -> PipelineResult<ToolOutput> {
        info!("Step 2: exporting to {}", door.export_format);
        fs::create_dir_all(&tools.export_root).map_err(|e| PipelineError::io(&tools.export_root, e))?;

        let mut invocation = Invocation::new(Stage::Export, &tools.python)
            .arg(script)
            .args(["--exporter", door.export_format.as_str()])
            .args(["--asset_name", door.asset_name.as_str()])
            .arg("--seed")
            .arg(door.seed.to_string())
            .arg("--export_dir")
            .arg(&tools.export_root)
            .arg("--gin_config")
            .arg(joints)
            .current_dir(&tools.root);
        if door.visual_only {
            invocation = invocation.arg("--visual_only");
        }
        self.invoke(&invocation)
    }

    fn invoke(&mut self, invocation: &Invocation) -> PipelineResult<ToolOutput> {
        debug!("Running: {}", invocation.display());
        let output = self.runner.run(invocation)?;
        for line in output.stdout.lines() {
            debug!("[{}] {}", invocation.stage, line);
        }
        if !output.success() {
            error!("{} step failed with {}", invocation.stage, describe_exit(output.code));
            for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
                error!("[{}] {}", invocation.stage, line);
            }
            return Err(PipelineError::ToolFailed {
                stage: invocation.stage,
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Copy the export into `target` when the exporter wrote it somewhere else
    fn relocate(&self, tools: &ResolvedTools, door: &DoorConfig, export: &ToolOutput, target: &Path) -> PipelineResult<()> {
        let source = reported_export_dir(&export.stdout, &tools.root)
            .unwrap_or_else(|| door.output_dir_under(&tools.export_root));

        if source == target || !source.is_dir() {
            return Ok(());
        }
        info!("Copying export {} -> {}", source.display(), target.display());
        copy_dir_recursive(&source, target)
    }
}

fn batch_dir(export_root: &Path, door: &DoorConfig, index: usize) -> PathBuf {
    export_root
        .join(door.export_format.as_str())
        .join(format!("{}s", door.asset_name))
        .join(format!("{}_{}", door.asset_name, index))
}

fn absolute(path: &Path) -> PipelineResult<PathBuf> {
    fs::canonicalize(path).map_err(|e| PipelineError::io(path, e))
}

/// Directory named by the last `Exported to:` line, resolved against `root`
pub fn reported_export_dir(stdout: &str, root: &Path) -> Option<PathBuf> {
    let reported = stdout
        .lines()
        .filter_map(|line| line.split_once(EXPORT_MARKER).map(|(_, rest)| rest.trim()))
        .filter(|rest| !rest.is_empty())
        .last()?;

    let path = root.join(reported);
    if path.is_dir() {
        Some(path)
    } else {
        path.parent().map(Path::to_path_buf)
    }
}

fn write_temp(prefix: &str, suffix: &str, contents: &str) -> PipelineResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
    let path = file.path().to_path_buf();
    file.write_all(contents.as_bytes())
        .map_err(|e| PipelineError::io(&path, e))?;
    file.flush().map_err(|e| PipelineError::io(&path, e))?;
    Ok(file)
}

/// Copy directory recursively
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> PipelineResult<()> {
    fs::create_dir_all(dst).map_err(|e| PipelineError::io(dst, e))?;
    for entry in fs::read_dir(src).map_err(|e| PipelineError::io(src, e))? {
        let entry = entry.map_err(|e| PipelineError::io(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| PipelineError::io(&src_path, e))?;
        }
    }
    Ok(())
}
