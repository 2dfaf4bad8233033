//! Error types for the door pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage that spawns an external process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Headless 3D tool building the door scene
    Generate,
    /// Exporter converting the scene into a simulator description
    Export,
}

impl Stage {
    /// Human-readable label for the stage
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Generate => "generation",
            Stage::Export => "export",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that abort the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required executable was not found before invocation.
    #[error("Executable not found: {0}")]
    MissingExecutable(PathBuf),

    /// External process could not be started.
    #[error("Failed to launch {stage} tool {program}: {source}")]
    Launch {
        /// Stage that tried to spawn.
        stage: Stage,
        /// Program that failed to start.
        program: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// External process exited unsuccessfully.
    #[error("{stage} step failed with {}{}", exit_label(.code), stderr_tail(.stderr))]
    ToolFailed {
        /// Stage that failed.
        stage: Stage,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// Export claimed success but the description file is absent.
    #[error("Expected output missing: {0}")]
    MissingOutput(PathBuf),

    /// Configuration values out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("Failed to parse config {path}: {message}")]
    Config {
        /// Config file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Filesystem error at a known path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Wrap an IO error with the path it happened at
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Render an exit code for messages
pub fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

fn exit_label(code: &Option<i32>) -> String {
    describe_exit(*code)
}

/// Lines of stderr carried into the error message
pub const STDERR_TAIL_LINES: usize = 5;

/// Last non-empty stderr lines, formatted as a message suffix
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    format!(":\n  {}", lines[start..].join("\n  "))
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
