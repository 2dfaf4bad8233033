//! Script Rendering
//!
//! Turns a [`DoorConfig`] into the text handed to the external tools:
//! - the generation script run inside the headless 3D tool
//! - the export script that pins the exporter to the configured door
//! - the joint binding file read by the exporter
//!
//! Values never reach the output through raw interpolation. Every value is
//! encoded as a Python literal first, so paths or names containing quotes,
//! backslashes or newlines cannot change the meaning of the script.
//! Rendering is pure: the same config always yields the same bytes.

use std::fmt::Write;
use std::path::Path;

use crate::config::{DoorConfig, DoorType, JointParams};

/// Binding prefix for the exporter's joint sampler
pub const JOINT_BINDING_PREFIX: &str = "SimDoorFactory.sample_joint_parameters";

/// Marker printed by the script once the scene is saved
pub const SCENE_SAVED_MARKER: &str = "Saved scene:";

/// Line prefix the export script prints with the path it wrote
pub const EXPORT_MARKER: &str = "Exported to:";

/// Package holding the simulation door module whose factory is replaced
pub const SIM_OBJECTS_MODULE: &str = "infinigen.assets.sim_objects";

/// Environment the script is rendered for
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// Asset library root, prepended to the interpreter's import path
    pub library_root: &'a Path,
}

/// Encode a string as a single-quoted Python literal
pub fn py_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Encode a bool as a Python literal
pub fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Encode a float as a Python literal; always carries a decimal point or exponent
pub fn py_float(value: f64) -> String {
    if value.is_nan() {
        "float('nan')".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "float('inf')".to_string()
        } else {
            "float('-inf')".to_string()
        }
    } else {
        format!("{:?}", value)
    }
}

/// Factory class implementing a door type in the asset library
pub fn factory_class(door_type: DoorType) -> &'static str {
    match door_type {
        DoorType::Panel => "PanelDoorFactory",
        DoorType::GlassPanel => "GlassPanelDoorFactory",
        DoorType::Louver => "LouverDoorFactory",
        DoorType::Lite => "LiteDoorFactory",
    }
}

/// Module that defines a factory class
fn factory_module(door_type: DoorType) -> &'static str {
    match door_type {
        DoorType::Panel | DoorType::GlassPanel => "infinigen.assets.objects.elements.doors.panel",
        DoorType::Louver => "infinigen.assets.objects.elements.doors.louver",
        DoorType::Lite => "infinigen.assets.objects.elements.doors.lite",
    }
}

/// Path insert and factory imports shared by both scripts
fn push_preamble(s: &mut String, ctx: &RenderContext<'_>, purpose: &str) {
    let _ = writeln!(s, "# Generated by simdoor for a single {}; removed afterwards.", purpose);
    s.push_str("import sys\n\n");
    let _ = writeln!(
        s,
        "sys.path.insert(0, {})\n",
        py_str(&ctx.library_root.to_string_lossy())
    );
}

fn push_factory_imports(s: &mut String) {
    for door_type in DoorType::ALL {
        let _ = writeln!(
            s,
            "from {} import {}",
            factory_module(*door_type),
            factory_class(*door_type)
        );
    }
}

/// Door literals, optional overrides, factory map and the door type guard
fn push_door_definition(s: &mut String, door: &DoorConfig) {
    // Exact literals; callers grep for these
    let _ = writeln!(s, "door_type = {}", py_str(door.door_type.as_str()));
    let _ = writeln!(s, "handle_type = {}", py_str(door.handle_type.as_str()));
    let _ = writeln!(s, "x_subdivisions = {}", door.x_subdivisions);
    let _ = writeln!(s, "y_subdivisions = {}", door.y_subdivisions);
    let _ = writeln!(s, "seed = {}", door.seed);
    let _ = writeln!(s, "door_orientation = {}", py_str(door.orientation.as_str()));
    let _ = writeln!(s, "door_frame_style = {}", py_str(door.frame_style.as_str()));
    let _ = writeln!(s, "handle_height_ratio = {}", py_float(door.handle_height_ratio));
    let _ = writeln!(s, "scene_file = {}\n", py_str(&door.scene_file_name()));

    // Optional attributes; only applied when the factory has them
    s.push_str("optional_overrides = {\n");
    let panel = &door.panel;
    let inset = &door.inset;
    let optional: [(&str, String); 8] = [
        ("panel_margin", py_float(panel.panel_margin)),
        ("bevel_width", py_float(panel.bevel_width)),
        ("shrink_width", py_float(panel.shrink_width)),
        ("side_bevel", py_float(panel.side_bevel)),
        ("out_bevel", py_bool(panel.out_bevel).to_string()),
        ("has_glass", py_bool(inset.has_glass).to_string()),
        ("merge_glass", py_bool(inset.merge_glass).to_string()),
        ("has_louver", py_bool(inset.has_louver).to_string()),
    ];
    for (name, value) in optional {
        let _ = writeln!(s, "    {}: {},", py_str(name), value);
    }
    s.push_str("}\n\n");

    s.push_str("factories = {\n");
    for door_type in DoorType::ALL {
        let _ = writeln!(
            s,
            "    {}: {},",
            py_str(door_type.as_str()),
            factory_class(*door_type)
        );
    }
    s.push_str("}\n\n");

    s.push_str(
        r#"if door_type not in factories:
    raise ValueError(f"Unknown door type: {door_type} (expected one of {sorted(factories)})")

"#,
    );
}

/// Assignments forcing the configured door onto `factory`
fn push_forced_attributes(s: &mut String, indent: &str) {
    const LINES: &[&str] = &[
        "factory.handle_type = handle_type",
        "factory.door_orientation = door_orientation",
        "factory.door_frame_style = door_frame_style",
        "factory.handle_height_ratio = handle_height_ratio",
        "factory.x_subdivisions = x_subdivisions",
        "factory.y_subdivisions = y_subdivisions",
        "for name, value in optional_overrides.items():",
        "    if hasattr(factory, name):",
        "        setattr(factory, name, value)",
    ];
    for line in LINES {
        let _ = writeln!(s, "{}{}", indent, line);
    }
}

/// Render the generation script for one door.
///
/// The script builds the door through the library's factory for the
/// configured door type, forces the configured parameters onto the factory,
/// and saves the scene as [`DoorConfig::scene_file_name`] in its working
/// directory. Door type names outside the factory map raise `ValueError`
/// inside the script before any scene is touched.
pub fn render_generation_script(door: &DoorConfig, ctx: &RenderContext<'_>) -> String {
    let mut s = String::new();

    push_preamble(&mut s, ctx, "headless run");
    s.push_str("import bpy\n\n");
    push_factory_imports(&mut s);
    s.push_str("from infinigen.core.util.math import FixedSeed\n\n");
    push_door_definition(&mut s, door);

    s.push_str(
        r#"bpy.ops.object.select_all(action='SELECT')
bpy.ops.object.delete(use_global=False)

with FixedSeed(seed):
    factory = factories[door_type](factory_seed=seed)
"#,
    );
    push_forced_attributes(&mut s, "    ");
    s.push_str(
        r#"    door = factory.create_asset()

if door is None:
    raise RuntimeError("create_asset() returned no object")

bpy.ops.wm.save_as_mainfile(filepath=scene_file)
"#,
    );
    let _ = writeln!(s, "print({} + ' ' + scene_file)", py_str(SCENE_SAVED_MARKER));

    s
}

/// Render the export script for one door.
///
/// The stock exporter picks a random door factory, so the script replaces
/// the library's `random_door_factory` with one that always builds the
/// configured door type with the configured handle, subdivisions and
/// overrides. It takes `--exporter`, `--asset_name`, `--seed`,
/// `--export_dir`, `--gin_config` and `--visual_only`, then hands off to
/// `spawn_simready` from `export_module` and prints [`EXPORT_MARKER`] with
/// the written path.
pub fn render_export_script(door: &DoorConfig, ctx: &RenderContext<'_>, export_module: &str) -> String {
    let mut s = String::new();

    push_preamble(&mut s, ctx, "export run");
    s.push_str("import argparse\nfrom pathlib import Path\n\nimport gin\n\n");
    push_factory_imports(&mut s);
    let _ = writeln!(s, "from {} import spawn_simready", export_module);
    let _ = writeln!(s, "from {} import door as door_module\n", SIM_OBJECTS_MODULE);
    push_door_definition(&mut s, door);

    s.push_str(
        r#"parser = argparse.ArgumentParser(description="Export one configured door")
parser.add_argument("--exporter", required=True)
parser.add_argument("--asset_name", required=True)
parser.add_argument("--seed", type=int, required=True)
parser.add_argument("--export_dir", required=True)
parser.add_argument("--gin_config")
parser.add_argument("--visual_only", action="store_true")
args = parser.parse_args()


def forced_door_factory():
    def build(factory_seed, coarse=False, constants=None):
        factory = factories[door_type](factory_seed, coarse)
"#,
    );
    push_forced_attributes(&mut s, "        ");
    s.push_str(
        r#"        return factory

    return build


door_module.random_door_factory = forced_door_factory

if args.gin_config:
    gin.parse_config_file(args.gin_config, skip_unknown=True)

export_path, _ = spawn_simready(
    name=args.asset_name,
    seed=args.seed,
    exporter=args.exporter,
    export_dir=Path(args.export_dir),
    visual_only=args.visual_only,
)
"#,
    );
    let _ = writeln!(s, "print({} + ' ' + str(export_path))", py_str(EXPORT_MARKER));

    s
}

/// Render the joint binding file read by the exporter.
///
/// One `<prefix>.<key>_min=<v>` / `_max=<v>` line per bound.
pub fn render_joint_config(joints: &JointParams) -> String {
    let mut s = String::from("# Door joint dynamics for the simulation exporter\n");
    for (key, bounds) in joints.entries() {
        let _ = writeln!(s, "{}.{}_min={}", JOINT_BINDING_PREFIX, key, py_float(bounds.min));
        let _ = writeln!(s, "{}.{}_max={}", JOINT_BINDING_PREFIX, key, py_float(bounds.max));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bounds, HandleType};

    fn ctx() -> RenderContext<'static> {
        RenderContext {
            library_root: Path::new("/srv/infinigen"),
        }
    }

    fn scenario_door() -> DoorConfig {
        DoorConfig {
            door_type: DoorType::Panel,
            handle_type: HandleType::Knob,
            x_subdivisions: 1,
            y_subdivisions: 2,
            seed: 1003,
            ..DoorConfig::default()
        }
    }

    #[test]
    fn test_scenario_literals() {
        let script = render_generation_script(&scenario_door(), &ctx());

        assert!(script.contains("door_type = 'panel'"));
        assert!(script.contains("handle_type = 'knob'"));
        assert!(script.contains("x_subdivisions = 1\n"));
        assert!(script.contains("y_subdivisions = 2\n"));
        assert!(script.contains("seed = 1003\n"));
        assert!(script.contains("scene_file = 'door_panel_knob_1003.blend'"));
    }

    #[test]
    fn test_every_type_pair_renders_exact_literals() {
        for door_type in DoorType::ALL {
            for handle_type in HandleType::ALL {
                let door = DoorConfig {
                    door_type: *door_type,
                    handle_type: *handle_type,
                    ..DoorConfig::default()
                };
                let script = render_generation_script(&door, &ctx());
                assert!(
                    script.contains(&format!("door_type = '{}'\n", door_type.as_str())),
                    "missing door_type literal for {}",
                    door_type
                );
                assert!(
                    script.contains(&format!("handle_type = '{}'\n", handle_type.as_str())),
                    "missing handle_type literal for {}",
                    handle_type
                );
            }
        }
    }

    #[test]
    fn test_script_guards_unknown_door_type() {
        let script = render_generation_script(&scenario_door(), &ctx());

        let guard = script.find("if door_type not in factories:").unwrap();
        let raise = script.find("raise ValueError(f\"Unknown door type").unwrap();
        let first_scene_op = script.find("bpy.ops.").unwrap();
        assert!(guard < raise && raise < first_scene_op);

        // The map holds exactly the supported names
        for door_type in DoorType::ALL {
            assert!(script.contains(&format!(
                "    '{}': {},",
                door_type.as_str(),
                factory_class(*door_type)
            )));
        }
        assert_eq!(script.matches("DoorFactory,\n").count(), DoorType::ALL.len());
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let door = scenario_door();
        let first = render_generation_script(&door, &ctx());
        let second = render_generation_script(&door, &ctx());
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_library_root_is_escaped() {
        let root = Path::new("/tmp/it's\\here");
        let script = render_generation_script(&scenario_door(), &RenderContext { library_root: root });
        assert!(script.contains(r"sys.path.insert(0, '/tmp/it\'s\\here')"));
    }

    #[test]
    fn test_py_literals() {
        assert_eq!(py_str("panel"), "'panel'");
        assert_eq!(py_str("a'b"), r"'a\'b'");
        assert_eq!(py_str("line\nbreak"), r"'line\nbreak'");
        assert_eq!(py_str("\u{1}"), r"'\x01'");
        assert_eq!(py_bool(true), "True");
        assert_eq!(py_bool(false), "False");
        assert_eq!(py_float(5.0), "5.0");
        assert_eq!(py_float(0.0075), "0.0075");
        assert_eq!(py_float(f64::NAN), "float('nan')");
    }

    #[test]
    fn test_export_script_forces_configured_door() {
        let door = DoorConfig {
            door_type: DoorType::Louver,
            handle_type: HandleType::Pull,
            x_subdivisions: 2,
            y_subdivisions: 3,
            seed: 15,
            ..DoorConfig::default()
        };
        let script = render_export_script(&door, &ctx(), "infinigen.core.sim.sim_factory");

        assert!(script.contains("door_type = 'louver'\n"));
        assert!(script.contains("handle_type = 'pull'\n"));
        assert!(script.contains("x_subdivisions = 2\n"));
        assert!(script.contains("y_subdivisions = 3\n"));
        assert!(script.contains("from infinigen.core.sim.sim_factory import spawn_simready"));
        assert!(script.contains("from infinigen.assets.sim_objects import door as door_module"));

        // Replacement is installed before the exporter runs
        let build = script.find("factory = factories[door_type](factory_seed, coarse)").unwrap();
        let forced = script.find("        factory.handle_type = handle_type\n").unwrap();
        let install = script.find("door_module.random_door_factory = forced_door_factory").unwrap();
        let spawn = script.find("export_path, _ = spawn_simready(").unwrap();
        assert!(build < forced && forced < install && install < spawn);
        assert!(script.contains("        factory.y_subdivisions = y_subdivisions\n"));

        for flag in ["--exporter", "--asset_name", "--seed", "--export_dir", "--gin_config", "--visual_only"] {
            assert!(script.contains(&format!("parser.add_argument(\"{}\"", flag)), "missing {}", flag);
        }
        assert!(script.contains("print('Exported to:' + ' ' + str(export_path))"));
    }

    #[test]
    fn test_export_script_guards_unknown_door_type() {
        let script = render_export_script(&scenario_door(), &ctx(), "exporter");
        let guard = script.find("if door_type not in factories:").unwrap();
        let install = script.find("door_module.random_door_factory").unwrap();
        assert!(guard < install);
    }

    #[test]
    fn test_joint_config_lines() {
        let mut joints = JointParams::default();
        joints.hinge_stiffness = Bounds::new(20.0, 30.0);
        let text = render_joint_config(&joints);

        assert!(text.contains("SimDoorFactory.sample_joint_parameters.door_hinge_stiffness_min=20.0\n"));
        assert!(text.contains("SimDoorFactory.sample_joint_parameters.door_hinge_stiffness_max=30.0\n"));
        assert!(text.contains("SimDoorFactory.sample_joint_parameters.door_handle_damping_max=3.0\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with(JOINT_BINDING_PREFIX)).count(), 8);
    }
}
