//! SIMDOOR: simulation-ready door assets
//!
//! Drives two external programs to turn a typed door description into a
//! physics-simulator asset:
//! - a headless 3D content-creation tool runs a rendered generation script
//!   that builds the door through a procedural asset library
//! - an exporter converts the result into a simulator description, visual
//!   meshes and a metadata file
//!
//! The crate itself only renders scripts, runs processes and checks files.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod sampling;
pub mod template;
pub mod tools;
pub mod verify;

pub use config::{DoorConfig, DoorType, ExportFormat, HandleType, PipelineConfig, ToolPaths};
pub use error::{PipelineError, PipelineResult, Stage};
pub use pipeline::{Pipeline, RunOutcome};
pub use tools::{Invocation, SystemRunner, ToolOutput, ToolRunner};
