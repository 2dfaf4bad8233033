//! Pipeline Configuration
//!
//! Typed door parameters, external tool locations, and batch sampling ranges.
//! Saved and loaded as RON (.ron extension), the same format the rest of the
//! project uses for hand-editable data.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "simdoor";

/// Config file name inside [`APP_DIR`]
pub const CONFIG_FILE: &str = "config.ron";

/// Closed set of names with a lowercase wire form.
///
/// Generates `as_str`, `ALL`, `Display` and `FromStr` so the same spelling is
/// used in RON files, on the command line, and in the rendered script.
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Name as written in config files and scripts
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => {
                        let valid: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        Err(format!("unknown {} '{}' (expected one of: {})", $what, s, valid.join(", ")))
                    }
                }
            }
        }
    };
}

named_enum! {
    /// Style of generated door leaf
    DoorType, "door type" {
        Panel => "panel",
        GlassPanel => "glass_panel",
        Louver => "louver",
        Lite => "lite",
    }
}

named_enum! {
    /// Hardware attached to the door
    HandleType, "handle type" {
        Knob => "knob",
        Lever => "lever",
        Pull => "pull",
        Bar => "bar",
        None => "none",
    }
}

named_enum! {
    /// Side the handle sits on
    DoorOrientation, "door orientation" {
        Left => "left",
        Right => "right",
    }
}

named_enum! {
    /// Frame built around the door leaf
    FrameStyle, "frame style" {
        SingleColumn => "single_column",
        FullFrameSquare => "full_frame_square",
        FullFrameDome => "full_frame_dome",
        FullFrameDoubleDoor => "full_frame_double_door",
    }
}

named_enum! {
    /// Simulator description format produced by the exporter
    ExportFormat, "export format" {
        /// MuJoCo XML
        Mjcf => "mjcf",
        Urdf => "urdf",
        Usd => "usd",
    }
}

impl ExportFormat {
    /// Extension of the simulator description file
    pub fn description_extension(&self) -> &'static str {
        match self {
            ExportFormat::Mjcf => "xml",
            ExportFormat::Urdf => "urdf",
            ExportFormat::Usd => "usd",
        }
    }
}

/// Panel carving parameters (panel and glass panel doors)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelParams {
    pub panel_margin: f64,
    pub bevel_width: f64,
    pub shrink_width: f64,
    pub side_bevel: f64,
    /// Bevel outward instead of inward
    pub out_bevel: bool,
}

impl Default for PanelParams {
    fn default() -> Self {
        Self {
            panel_margin: 0.1,
            bevel_width: 0.0075,
            shrink_width: 0.025,
            side_bevel: 0.01,
            out_bevel: true,
        }
    }
}

/// Glass and louver switches; factories without the attribute ignore them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsetParams {
    pub has_glass: bool,
    /// Merge glass panes when there are fewer than four rows
    pub merge_glass: bool,
    pub has_louver: bool,
}

impl Default for InsetParams {
    fn default() -> Self {
        Self {
            has_glass: true,
            merge_glass: true,
            has_louver: true,
        }
    }
}

/// Inclusive min/max bound sampled by the exporter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn check(&self, name: &str) -> PipelineResult<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min < 0.0 || self.min > self.max {
            return Err(PipelineError::InvalidConfig(format!(
                "{} must satisfy 0 <= min <= max (got {} .. {})",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Hinge and handle joint dynamics handed to the exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointParams {
    pub hinge_stiffness: Bounds,
    pub hinge_damping: Bounds,
    pub handle_stiffness: Bounds,
    pub handle_damping: Bounds,
}

impl Default for JointParams {
    fn default() -> Self {
        Self {
            hinge_stiffness: Bounds::new(5.0, 10.0),
            hinge_damping: Bounds::new(2.0, 5.0),
            handle_stiffness: Bounds::new(3.0, 6.0),
            handle_damping: Bounds::new(1.5, 3.0),
        }
    }
}

impl JointParams {
    /// Binding keys paired with their bounds, in file order
    pub fn entries(&self) -> [(&'static str, Bounds); 4] {
        [
            ("door_hinge_stiffness", self.hinge_stiffness),
            ("door_hinge_damping", self.hinge_damping),
            ("door_handle_stiffness", self.handle_stiffness),
            ("door_handle_damping", self.handle_damping),
        ]
    }
}

/// Everything that shapes a single door asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorConfig {
    pub door_type: DoorType,
    pub handle_type: HandleType,
    pub orientation: DoorOrientation,
    pub frame_style: FrameStyle,
    /// Horizontal panel count
    pub x_subdivisions: u32,
    /// Vertical panel count
    pub y_subdivisions: u32,
    /// Handle height as a fraction of door height
    pub handle_height_ratio: f64,
    pub seed: u64,
    pub export_format: ExportFormat,
    /// Asset name passed to the exporter; also names the output files
    pub asset_name: String,
    /// Skip collision meshes
    pub visual_only: bool,
    pub panel: PanelParams,
    pub inset: InsetParams,
    pub joints: JointParams,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            door_type: DoorType::Panel,
            handle_type: HandleType::Knob,
            orientation: DoorOrientation::Right,
            frame_style: FrameStyle::FullFrameSquare,
            x_subdivisions: 1,
            y_subdivisions: 2,
            handle_height_ratio: 0.475,
            seed: 1003,
            export_format: ExportFormat::Mjcf,
            asset_name: "door".to_string(),
            visual_only: true,
            panel: PanelParams::default(),
            inset: InsetParams::default(),
            joints: JointParams::default(),
        }
    }
}

impl DoorConfig {
    /// Output directory relative to the export root's parent:
    /// `sim_exports/<format>/<asset>/<seed>`
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir_under(Path::new(DEFAULT_EXPORT_ROOT))
    }

    /// Output directory under an arbitrary export root
    pub fn output_dir_under(&self, export_root: &Path) -> PathBuf {
        export_root
            .join(self.export_format.as_str())
            .join(&self.asset_name)
            .join(self.seed.to_string())
    }

    /// Description file name, e.g. `door.xml`
    pub fn description_file_name(&self) -> String {
        format!("{}.{}", self.asset_name, self.export_format.description_extension())
    }

    /// Scene file the generation script saves, e.g. `door_panel_knob_1003.blend`
    pub fn scene_file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.blend",
            self.asset_name, self.door_type, self.handle_type, self.seed
        )
    }

    /// Check ranges the external library would otherwise fail on late
    pub fn validate(&self) -> PipelineResult<()> {
        if self.x_subdivisions == 0 {
            return Err(PipelineError::InvalidConfig(
                "x_subdivisions must be at least 1".to_string(),
            ));
        }
        if self.y_subdivisions == 0 {
            return Err(PipelineError::InvalidConfig(
                "y_subdivisions must be at least 1".to_string(),
            ));
        }
        if !(self.handle_height_ratio > 0.0 && self.handle_height_ratio <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "handle_height_ratio must be in (0, 1] (got {})",
                self.handle_height_ratio
            )));
        }
        let name_ok = !self.asset_name.is_empty()
            && self
                .asset_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !name_ok {
            return Err(PipelineError::InvalidConfig(format!(
                "asset_name must be non-empty ASCII letters, digits, '_' or '-' (got '{}')",
                self.asset_name
            )));
        }
        for (name, bounds) in self.joints.entries() {
            bounds.check(name)?;
        }
        Ok(())
    }
}

/// Default export root, relative to the asset library root
pub const DEFAULT_EXPORT_ROOT: &str = "sim_exports";

/// Locations of the external collaborators.
///
/// No defaults: these are machine specific and must come from the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// 3D content-creation tool executable, run headless
    pub blender: PathBuf,
    /// Asset library installation root; working directory of both tools
    pub infinigen_root: PathBuf,
    /// Interpreter that runs the exporter
    pub python: PathBuf,
    /// Module providing `spawn_simready`, imported by the export script
    #[serde(default = "default_export_module")]
    pub export_module: String,
}

fn default_export_module() -> String {
    "infinigen.core.sim.sim_factory".to_string()
}

impl ToolPaths {
    pub fn new(
        blender: impl Into<PathBuf>,
        infinigen_root: impl Into<PathBuf>,
        python: impl Into<PathBuf>,
    ) -> Self {
        Self {
            blender: blender.into(),
            infinigen_root: infinigen_root.into(),
            python: python.into(),
            export_module: default_export_module(),
        }
    }
}

/// Inclusive integer range for sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRange<T = u64> {
    pub min: T,
    pub max: T,
}

impl<T> SampleRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

/// Ranges used when generating many randomized doors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of doors to produce
    pub count: usize,
    /// Seed for the parameter sampler (not the per-door seed)
    pub sampler_seed: u64,
    pub door_types: Vec<DoorType>,
    pub handle_types: Vec<HandleType>,
    pub x_subdivisions: SampleRange<u32>,
    pub y_subdivisions: SampleRange<u32>,
    pub seeds: SampleRange,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 2,
            sampler_seed: 0,
            door_types: DoorType::ALL.to_vec(),
            handle_types: vec![HandleType::Knob, HandleType::Pull],
            x_subdivisions: SampleRange::new(1, 3),
            y_subdivisions: SampleRange::new(1, 4),
            seeds: SampleRange::new(1, 1000),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.door_types.is_empty() || self.handle_types.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "batch door_types and handle_types must not be empty".to_string(),
            ));
        }
        for (name, range) in [
            ("x_subdivisions", self.x_subdivisions),
            ("y_subdivisions", self.y_subdivisions),
        ] {
            if range.min == 0 || range.min > range.max {
                return Err(PipelineError::InvalidConfig(format!(
                    "batch {} range must satisfy 1 <= min <= max (got {} .. {})",
                    name, range.min, range.max
                )));
            }
        }
        if self.seeds.min > self.seeds.max {
            return Err(PipelineError::InvalidConfig(format!(
                "batch seed range is empty ({} .. {})",
                self.seeds.min, self.seeds.max
            )));
        }
        Ok(())
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub tools: ToolPaths,
    #[serde(default)]
    pub door: DoorConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Export root relative to the library root (or absolute)
    #[serde(default = "default_export_root")]
    pub export_root: PathBuf,
}

fn default_export_root() -> PathBuf {
    PathBuf::from(DEFAULT_EXPORT_ROOT)
}

impl PipelineConfig {
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            tools,
            door: DoorConfig::default(),
            batch: BatchConfig::default(),
            export_root: default_export_root(),
        }
    }
}

/// Default config file location (`<config dir>/simdoor/config.ron`)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Save a config to a file in RON format
pub fn save_config(config: &PipelineConfig, path: &Path) -> PipelineResult<()> {
    let pretty = ron::ser::PrettyConfig::new()
        .depth_limit(4)
        .indentor("  ".to_string());

    let contents = ron::ser::to_string_pretty(config, pretty).map_err(|e| PipelineError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
    }
    fs::write(path, contents).map_err(|e| PipelineError::io(path, e))
}

/// Load a config from a RON file
pub fn load_config(path: &Path) -> PipelineResult<PipelineConfig> {
    let contents = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    load_config_from_str(&contents).map_err(|message| PipelineError::Config {
        path: path.to_path_buf(),
        message,
    })
}

/// Door settings for commands that never launch a tool.
///
/// Uses the `door` section of the config when the file exists, otherwise
/// the default door; the `tools` section is not required here.
pub fn load_door_config(path: &Path) -> PipelineResult<DoorConfig> {
    #[derive(Deserialize)]
    struct DoorOnly {
        #[serde(default)]
        door: DoorConfig,
    }

    if !path.exists() {
        return Ok(DoorConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let parsed: DoorOnly = ron::from_str(&contents).map_err(|e| PipelineError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(parsed.door)
}

/// Parse a config from a RON string
pub fn load_config_from_str(contents: &str) -> Result<PipelineConfig, String> {
    ron::from_str(contents).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_tools() -> ToolPaths {
        ToolPaths::new("/opt/blender/blender", "/srv/infinigen", "/usr/bin/python3")
    }

    #[test]
    fn test_output_dir_layout() {
        let door = DoorConfig {
            door_type: DoorType::Panel,
            handle_type: HandleType::Knob,
            x_subdivisions: 1,
            y_subdivisions: 2,
            seed: 1003,
            ..DoorConfig::default()
        };
        assert_eq!(door.output_dir(), PathBuf::from("sim_exports/mjcf/door/1003"));
        assert_eq!(door.description_file_name(), "door.xml");
        assert_eq!(door.scene_file_name(), "door_panel_knob_1003.blend");
    }

    #[test]
    fn test_description_extension_follows_format() {
        let door = DoorConfig {
            export_format: ExportFormat::Urdf,
            seed: 4,
            ..DoorConfig::default()
        };
        assert_eq!(door.description_file_name(), "door.urdf");
        assert_eq!(door.output_dir(), PathBuf::from("sim_exports/urdf/door/4"));
    }

    #[test]
    fn test_enum_names_round_trip() {
        for door_type in DoorType::ALL {
            assert_eq!(door_type.as_str().parse::<DoorType>().unwrap(), *door_type);
        }
        for handle in HandleType::ALL {
            assert_eq!(handle.as_str().parse::<HandleType>().unwrap(), *handle);
        }
        assert_eq!("glass_panel".parse::<DoorType>().unwrap(), DoorType::GlassPanel);
    }

    #[test]
    fn test_unknown_door_type_rejected() {
        let err = "garage".parse::<DoorType>().unwrap_err();
        assert!(err.contains("garage"));
        assert!(err.contains("glass_panel"));
    }

    #[test]
    fn test_validate_rejects_zero_subdivisions() {
        let door = DoorConfig {
            y_subdivisions: 0,
            ..DoorConfig::default()
        };
        assert!(matches!(door.validate(), Err(PipelineError::InvalidConfig(_))));
        assert!(DoorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_joint_bounds() {
        let mut door = DoorConfig::default();
        door.joints.hinge_damping = Bounds::new(5.0, 2.0);
        let err = door.validate().unwrap_err();
        assert!(err.to_string().contains("door_hinge_damping"));
    }

    #[test]
    fn test_validate_rejects_unsafe_asset_name() {
        let door = DoorConfig {
            asset_name: "door/../etc".to_string(),
            ..DoorConfig::default()
        };
        assert!(door.validate().is_err());
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = PipelineConfig::new(sample_tools());
        config.door.door_type = DoorType::Louver;
        config.door.handle_type = HandleType::Pull;
        config.door.seed = 15;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();

        let loaded = load_config(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let text = r#"(
            tools: (
                blender: "/opt/blender/blender",
                infinigen_root: "/srv/infinigen",
                python: "/usr/bin/python3",
            ),
            door: (door_type: lite, seed: 77),
        )"#;
        let config = load_config_from_str(text).unwrap();
        assert_eq!(config.door.door_type, DoorType::Lite);
        assert_eq!(config.door.seed, 77);
        assert_eq!(config.door.handle_type, HandleType::Knob);
        assert_eq!(config.export_root, PathBuf::from("sim_exports"));
        assert_eq!(config.tools.export_module, "infinigen.core.sim.sim_factory");
    }

    #[test]
    fn test_missing_tools_is_an_error() {
        assert!(load_config_from_str("(door: (seed: 1))").is_err());
    }

    #[test]
    fn test_load_invalid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "not valid ron data").unwrap();

        let result = load_config(temp_file.path());
        assert!(matches!(result, Err(PipelineError::Config { .. })));
    }

    #[test]
    fn test_door_config_without_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let door = load_door_config(&dir.path().join("absent.ron")).unwrap();
        assert_eq!(door, DoorConfig::default());
    }

    #[test]
    fn test_door_config_ignores_missing_tools() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "(door: (handle_type: lever, seed: 12))").unwrap();

        let door = load_door_config(temp_file.path()).unwrap();
        assert_eq!(door.handle_type, HandleType::Lever);
        assert_eq!(door.seed, 12);
    }

    #[test]
    fn test_subdivision_range_beyond_u32_rejected() {
        let text = r#"(
            tools: (
                blender: "/opt/blender/blender",
                infinigen_root: "/srv/infinigen",
                python: "/usr/bin/python3",
            ),
            batch: (x_subdivisions: (min: 4294967296, max: 4294967296)),
        )"#;
        assert!(load_config_from_str(text).is_err());
    }

    #[test]
    fn test_batch_validate() {
        assert!(BatchConfig::default().validate().is_ok());

        let batch = BatchConfig {
            x_subdivisions: SampleRange::new(0, 2),
            ..BatchConfig::default()
        };
        assert!(batch.validate().is_err());

        let batch = BatchConfig {
            handle_types: Vec::new(),
            ..BatchConfig::default()
        };
        assert!(batch.validate().is_err());
    }
}
