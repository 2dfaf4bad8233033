//! Output Verification
//!
//! Best-effort checks on what the exporter left behind. Only a missing
//! description file is fatal; everything else is reported and logged.
//! Nothing here parses the simulator description semantically.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{DoorConfig, HandleType};
use crate::error::{PipelineError, PipelineResult};

/// Visual assets directory, relative to the output directory
pub const VISUAL_ASSETS_DIR: &str = "assets/visual";

/// Metadata file written next to the description
pub const METADATA_FILE: &str = "metadata.json";

/// Extensions counted as visual mesh/material files
pub const VISUAL_EXTENSIONS: &[&str] = &["obj", "mtl"];

/// What was found in the metadata file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataStatus {
    Missing,
    /// Parsed; number of top-level entries
    Valid { entries: usize },
    /// Present but not readable as JSON
    Invalid(String),
}

/// Result of verifying one output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub description: PathBuf,
    /// Handle identifiers present in the description text
    pub markers_found: Vec<String>,
    /// Handle identifiers absent from the description text
    pub markers_missing: Vec<String>,
    /// Visual asset file names, sorted
    pub visual_assets: Vec<String>,
    pub metadata: MetadataStatus,
}

impl VerificationReport {
    /// True when every advisory check passed too
    pub fn is_clean(&self) -> bool {
        self.markers_missing.is_empty()
            && !self.visual_assets.is_empty()
            && matches!(self.metadata, MetadataStatus::Valid { .. })
    }

    /// Log the report at info level, misses at warn level
    pub fn log(&self) {
        info!("Description: {}", self.description.display());
        for marker in &self.markers_found {
            info!("Found handle identifier '{}'", marker);
        }
        for marker in &self.markers_missing {
            warn!("Handle identifier '{}' not found in description", marker);
        }
        if self.visual_assets.is_empty() {
            warn!("No visual assets under {}", VISUAL_ASSETS_DIR);
        } else {
            info!("{} visual asset(s):", self.visual_assets.len());
            for name in &self.visual_assets {
                info!("  {}", name);
            }
        }
        match &self.metadata {
            MetadataStatus::Missing => warn!("No {} in output", METADATA_FILE),
            MetadataStatus::Valid { entries } => info!("Metadata: {} entries", entries),
            MetadataStatus::Invalid(msg) => warn!("Metadata unreadable: {}", msg),
        }
    }
}

/// Identifiers expected in the description for a door's handle
pub fn handle_markers(handle_type: HandleType) -> Vec<String> {
    match handle_type {
        HandleType::None => Vec::new(),
        other => vec!["handle".to_string(), other.as_str().to_string()],
    }
}

/// Verify the exporter output in `output_dir` for `door`.
///
/// Fails only with [`PipelineError::MissingOutput`] when the description
/// file does not exist.
pub fn verify_output(output_dir: &Path, door: &DoorConfig) -> PipelineResult<VerificationReport> {
    let description = output_dir.join(door.description_file_name());
    if !description.is_file() {
        return Err(PipelineError::MissingOutput(description));
    }

    let mut markers_found = Vec::new();
    let mut markers_missing = Vec::new();
    let markers = handle_markers(door.handle_type);
    match fs::read(&description) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).to_lowercase();
            for marker in markers {
                if text.contains(&marker) {
                    markers_found.push(marker);
                } else {
                    markers_missing.push(marker);
                }
            }
        }
        Err(e) => {
            warn!("Could not read {}: {}", description.display(), e);
            markers_missing = markers;
        }
    }

    Ok(VerificationReport {
        description,
        markers_found,
        markers_missing,
        visual_assets: list_visual_assets(&output_dir.join(VISUAL_ASSETS_DIR)),
        metadata: check_metadata(&output_dir.join(METADATA_FILE)),
    })
}

/// Sorted names of mesh/material files in `dir`; empty when absent
pub fn list_visual_assets(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_ascii_lowercase();
                    VISUAL_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();

    names.sort();
    names
}

fn check_metadata(path: &Path) -> MetadataStatus {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MetadataStatus::Missing,
        Err(e) => return MetadataStatus::Invalid(e.to_string()),
    };

    match serde_json::from_str::<serde_json::Value>(&contents) {
        Ok(serde_json::Value::Object(map)) => MetadataStatus::Valid { entries: map.len() },
        Ok(serde_json::Value::Array(items)) => MetadataStatus::Valid { entries: items.len() },
        Ok(_) => MetadataStatus::Valid { entries: 1 },
        Err(e) => MetadataStatus::Invalid(e.to_string()),
    }
}
