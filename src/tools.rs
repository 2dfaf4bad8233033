//! External Tool Invocation
//!
//! Everything that leaves the process goes through [`ToolRunner`]. The real
//! runner blocks on [`std::process::Command`]; tests substitute a scripted one.
//! There is no timeout or retry: a hung tool hangs the pipeline.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{PipelineError, PipelineResult, Stage};

/// One external process call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Working directory; inherits ours when `None`
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(stage: Stage, program: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Shell-like rendering for log lines
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

#[cfg(test)]
impl Invocation {
    /// Whether `flag` appears among the arguments
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Value following `flag`, if present
    pub fn arg_value(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external processes to completion
pub trait ToolRunner {
    /// Run `invocation` and wait for it to exit.
    ///
    /// Errors only when the process cannot be started; a non-zero exit is
    /// reported through [`ToolOutput::code`].
    fn run(&mut self, invocation: &Invocation) -> PipelineResult<ToolOutput>;
}

/// Runner backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> PipelineResult<ToolOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|source| PipelineError::Launch {
            stage: invocation.stage,
            program: invocation.program.clone(),
            source,
        })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locate an executable.
///
/// Paths with more than one component must exist as given. A bare name is
/// searched for in each `PATH` entry.
pub fn resolve_executable(program: &Path) -> PipelineResult<PathBuf> {
    resolve_executable_in(program, std::env::var_os("PATH").as_deref())
}

/// [`resolve_executable`] against an explicit search path
pub fn resolve_executable_in(program: &Path, search_path: Option<&OsStr>) -> PipelineResult<PathBuf> {
    let missing = || PipelineError::MissingExecutable(program.to_path_buf());

    if program.as_os_str().is_empty() {
        return Err(missing());
    }

    if program.components().count() > 1 || program.is_absolute() {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(missing())
        };
    }

    let search_path = search_path.ok_or_else(missing)?;
    std::env::split_paths(search_path)
        .flat_map(|dir| candidates(&dir, program))
        .find(|candidate| candidate.is_file())
        .ok_or_else(missing)
}

#[cfg(windows)]
fn candidates(dir: &Path, program: &Path) -> Vec<PathBuf> {
    let base = dir.join(program);
    vec![base.with_extension("exe"), base]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, program: &Path) -> Vec<PathBuf> {
    vec![dir.join(program)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new(Stage::Export, "/usr/bin/python3")
            .args(["-m", "exporter"])
            .arg("--seed")
            .arg("7")
            .current_dir("/srv/lib");

        assert_eq!(inv.display(), "/usr/bin/python3 -m exporter --seed 7");
        assert_eq!(inv.cwd.as_deref(), Some(Path::new("/srv/lib")));
        assert!(inv.has_arg("--seed"));
        assert_eq!(inv.arg_value("--seed"), Some(OsStr::new("7")));
        assert_eq!(inv.arg_value("--missing"), None);
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("blender");
        std::fs::write(&tool, b"").unwrap();

        assert_eq!(resolve_executable_in(&tool, None).unwrap(), tool);

        let absent = dir.path().join("nope");
        assert!(matches!(
            resolve_executable_in(&absent, None),
            Err(PipelineError::MissingExecutable(_))
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_resolve_bare_name_on_search_path() {
        let empty = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        std::fs::write(bin.path().join("blender"), b"").unwrap();

        let search = std::env::join_paths([empty.path(), bin.path()]).unwrap();
        let found = resolve_executable_in(Path::new("blender"), Some(search.as_os_str())).unwrap();
        assert_eq!(found, bin.path().join("blender"));

        assert!(resolve_executable_in(Path::new("not-a-tool"), Some(search.as_os_str())).is_err());
        assert!(resolve_executable_in(Path::new("blender"), None).is_err());
    }

    #[test]
    fn test_directory_is_not_an_executable() {
        let dir = TempDir::new().unwrap();
        assert!(resolve_executable_in(dir.path(), None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_exit_status() {
        let mut runner = SystemRunner;
        let ok = runner
            .run(&Invocation::new(Stage::Generate, "sh").args(["-c", "echo hi"]))
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hi");

        let failed = runner
            .run(&Invocation::new(Stage::Generate, "sh").args(["-c", "echo oops >&2; exit 3"]))
            .unwrap();
        assert!(!failed.success());
        assert_eq!(failed.code, Some(3));
        assert!(failed.stderr.contains("oops"));
    }

    #[test]
    fn test_system_runner_launch_failure() {
        let mut runner = SystemRunner;
        let result = runner.run(&Invocation::new(Stage::Export, "/definitely/not/here/tool"));
        assert!(matches!(result, Err(PipelineError::Launch { stage: Stage::Export, .. })));
    }
}
