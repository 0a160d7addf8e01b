//! JSON motion plans replayed through a [`GcodeWriter`].
//!
//! A plan names its path configurations once and then lists the writer
//! operations in order. It is the input format of the `strata` command line
//! tool and a convenient way to script the writer in tests.
//!
//! ```json
//! {
//!   "paths": { "wall": { "speed": 30.0, "retraction": { "amount": 4.5 } } },
//!   "steps": [
//!     { "op": "header" },
//!     { "op": "layer", "number": 0, "z": 200 },
//!     { "op": "travel", "x": 0, "y": 0, "speed": 150.0 },
//!     { "op": "move", "path": "wall", "x": 10000, "y": 0 },
//!     { "op": "retract", "path": "wall" },
//!     { "op": "finalize", "max_height": 10000 }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GcodeError, Result};
use crate::path_config::PathConfig;
use crate::retraction::RetractionConfig;
use crate::units::{Coord, Point3};
use crate::writer::{GcodeWriter, PrintSummary};

/// Parameters of a named path configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSpec {
    /// Print speed (mm/s).
    pub speed: f64,
    /// Line width (µm).
    pub line_width: Coord,
    /// Layer height (µm).
    pub layer_height: Coord,
    /// Filament diameter (µm).
    pub filament_diameter: Coord,
    /// Flow (%).
    pub flow: f64,
    /// Part of a spiralized outer wall.
    pub spiralize: bool,
    /// Retraction used before travels leaving this path.
    pub retraction: Option<RetractionConfig>,
}

impl Default for PathSpec {
    fn default() -> Self {
        Self {
            speed: 30.0,
            line_width: 400,
            layer_height: 200,
            filament_diameter: 1_750,
            flow: 100.0,
            spiralize: false,
            retraction: None,
        }
    }
}

impl PathSpec {
    /// Build the path configuration named `name`.
    pub fn to_config(&self, name: &str) -> PathConfig {
        let mut config = PathConfig::new(name, self.retraction);
        config.spiralize = self.spiralize;
        config.set_speed(self.speed);
        config.set_line_width(self.line_width);
        config.set_layer_height(self.layer_height);
        config.set_filament_diameter(self.filament_diameter);
        config.set_flow(self.flow);
        config
    }
}

fn default_travel_speed() -> f64 {
    150.0
}

/// One writer operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanStep {
    /// Flavor header.
    Header,
    /// Start a layer at height `z` (µm).
    Layer {
        /// Layer number.
        number: i64,
        /// Layer height above the bed (µm).
        z: Coord,
    },
    /// Extrude to a point using a named path configuration.
    Move {
        /// Path configuration name.
        path: String,
        /// X (µm).
        x: Coord,
        /// Y (µm).
        y: Coord,
        /// Z (µm); the current layer height when absent.
        #[serde(default)]
        z: Option<Coord>,
    },
    /// Travel without extruding.
    Travel {
        /// X (µm).
        x: Coord,
        /// Y (µm).
        y: Coord,
        /// Z (µm); the current layer height when absent.
        #[serde(default)]
        z: Option<Coord>,
        /// Travel speed (mm/s).
        #[serde(default = "default_travel_speed")]
        speed: f64,
    },
    /// Retract with an inline config, or the retraction of a named path.
    Retract {
        /// Path whose retraction config is used.
        #[serde(default)]
        path: Option<String>,
        /// Inline retraction config; takes precedence over `path`.
        #[serde(default)]
        config: Option<RetractionConfig>,
        /// Bypass the retraction limiter.
        #[serde(default)]
        force: bool,
    },
    /// Material coasted at the end of the previous path.
    Coast {
        /// Coasted amount (mm or mm³).
        amount: f64,
    },
    /// Change tools.
    SwitchExtruder {
        /// New extruder.
        extruder: usize,
    },
    /// Nozzle temperature.
    Temperature {
        /// Extruder.
        extruder: usize,
        /// Temperature (°C).
        temperature: f64,
        /// Block until reached.
        #[serde(default)]
        wait: bool,
    },
    /// Bed temperature.
    BedTemperature {
        /// Temperature (°C).
        temperature: f64,
        /// Block until reached.
        #[serde(default)]
        wait: bool,
    },
    /// Fan speed.
    Fan {
        /// Speed (%).
        speed: f64,
    },
    /// A `;` comment.
    Comment {
        /// Comment text.
        text: String,
    },
    /// Raw G-code block.
    Code {
        /// Lines to emit.
        code: String,
    },
    /// Dwell.
    Delay {
        /// Duration (s).
        seconds: f64,
    },
    /// End the program; must be the last step.
    Finalize {
        /// Height to lift to at the end (µm).
        #[serde(default)]
        max_height: Option<Coord>,
        /// Speed of the final lift (mm/s).
        #[serde(default = "default_travel_speed")]
        travel_speed: f64,
        /// Code emitted at the very end.
        #[serde(default)]
        end_code: String,
    },
}

/// A motion plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Named path configurations.
    #[serde(default)]
    pub paths: BTreeMap<String, PathSpec>,
    /// Operations in program order.
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Serialize to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check path references and step order without running anything.
    pub fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            match step {
                PlanStep::Move { path, .. } | PlanStep::Retract { path: Some(path), .. } => {
                    if !self.paths.contains_key(path) {
                        return Err(GcodeError::UnknownPathConfig(path.clone()));
                    }
                }
                PlanStep::Finalize { .. } if index + 1 != self.steps.len() => {
                    return Err(GcodeError::Plan(format!(
                        "finalize at step {index} is not the last step"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Replay the plan through `writer`.
    ///
    /// Returns the print summary when the plan ends with a `finalize` step.
    /// Print time is folded at every layer, so the estimator only ever holds
    /// one layer of moves. A `;TYPE:` comment is written whenever consecutive moves switch path
    /// configuration.
    pub fn run<W: Write>(&self, writer: &mut GcodeWriter<W>) -> Result<Option<PrintSummary>> {
        self.validate()?;
        let configs: BTreeMap<&str, PathConfig> = self
            .paths
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.to_config(name)))
            .collect();
        let lookup = |name: &str| {
            configs
                .get(name)
                .ok_or_else(|| GcodeError::UnknownPathConfig(name.to_string()))
        };

        let mut current_path: Option<&str> = None;
        for step in &self.steps {
            match step {
                PlanStep::Header => writer.write_header()?,
                PlanStep::Layer { number, z } => {
                    writer.update_total_print_time();
                    writer.write_layer_comment(*number)?;
                    writer.set_z(*z);
                    current_path = None;
                }
                PlanStep::Move { path, x, y, z } => {
                    let config = lookup(path.as_str())?;
                    if current_path != Some(path.as_str()) {
                        writer.write_type_comment(path)?;
                        current_path = Some(path.as_str());
                    }
                    let z = z.unwrap_or(writer.state().layer_z);
                    writer.write_extrusion(Point3::new(*x, *y, z), config)?;
                }
                PlanStep::Travel { x, y, z, speed } => {
                    let z = z.unwrap_or(writer.state().layer_z);
                    writer.write_travel(Point3::new(*x, *y, z), *speed)?;
                }
                PlanStep::Retract {
                    path,
                    config,
                    force,
                } => {
                    let retraction = match (config, path) {
                        (Some(config), _) => Some(*config),
                        (None, Some(path)) => lookup(path.as_str())?.retraction,
                        (None, None) => Some(RetractionConfig::default()),
                    };
                    match retraction {
                        Some(retraction) => writer.write_retraction(&retraction, *force)?,
                        None => debug!(?path, "path has retraction disabled"),
                    }
                }
                PlanStep::Coast { amount } => writer.set_last_coasted_amount(*amount),
                PlanStep::SwitchExtruder { extruder } => writer.switch_extruder(*extruder)?,
                PlanStep::Temperature {
                    extruder,
                    temperature,
                    wait,
                } => writer.write_temperature_command(*extruder, *temperature, *wait)?,
                PlanStep::BedTemperature { temperature, wait } => {
                    writer.write_bed_temperature_command(*temperature, *wait)?
                }
                PlanStep::Fan { speed } => writer.write_fan_command(*speed)?,
                PlanStep::Comment { text } => writer.write_comment(text)?,
                PlanStep::Code { code } => writer.write_code(code)?,
                PlanStep::Delay { seconds } => writer.write_delay(*seconds)?,
                PlanStep::Finalize {
                    max_height,
                    travel_speed,
                    end_code,
                } => {
                    let summary = writer.finalize(*max_height, *travel_speed, end_code)?;
                    return Ok(Some(summary));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{
        "paths": {
            "wall": { "speed": 30.0, "retraction": { "amount": 4.5, "speed": 40.0 } },
            "infill": { "speed": 60.0, "line_width": 500 }
        },
        "steps": [
            { "op": "header" },
            { "op": "temperature", "extruder": 0, "temperature": 210.0, "wait": true },
            { "op": "layer", "number": 0, "z": 200 },
            { "op": "travel", "x": 0, "y": 0 },
            { "op": "move", "path": "wall", "x": 10000, "y": 0 },
            { "op": "move", "path": "wall", "x": 10000, "y": 10000 },
            { "op": "retract", "path": "wall" },
            { "op": "travel", "x": 20000, "y": 0 },
            { "op": "move", "path": "infill", "x": 30000, "y": 0 },
            { "op": "finalize", "max_height": 5000, "end_code": "M84" }
        ]
    }"#;

    fn run(plan: &Plan) -> (String, Option<PrintSummary>) {
        let mut writer = GcodeWriter::new(Vec::new());
        let summary = plan.run(&mut writer).unwrap();
        let bytes = writer.into_inner().unwrap();
        (String::from_utf8(bytes).unwrap(), summary)
    }

    #[test]
    fn test_run_plan() {
        let plan = Plan::from_json(PLAN).unwrap();
        let (gcode, summary) = run(&plan);
        let lines: Vec<&str> = gcode.lines().collect();

        assert_eq!(lines[0], ";FLAVOR:Marlin");
        assert!(lines.contains(&"M109 S210"));
        assert!(lines.contains(&";LAYER:0"));
        assert!(lines.contains(&";TYPE:wall"));
        assert!(lines.contains(&";TYPE:infill"));
        assert!(lines.iter().any(|l| l.starts_with("G1 F2400 E-")));
        assert_eq!(*lines.last().unwrap(), "M84");

        let summary = summary.unwrap();
        assert!(summary.print_time_seconds > 0.0);
        assert!(summary.filament_used[0] > 0.0);
    }

    #[test]
    fn test_print_time_folded_per_layer() {
        let mut steps = Vec::new();
        for layer in 0..3 {
            steps.push(PlanStep::Layer {
                number: layer,
                z: 200 * (layer + 1),
            });
            for i in 0..4 {
                steps.push(PlanStep::Travel {
                    x: (i % 2) * 50_000,
                    y: i * 10_000,
                    z: None,
                    speed: 100.0,
                });
            }
        }
        let plan = Plan {
            paths: BTreeMap::new(),
            steps,
        };

        let mut writer = GcodeWriter::new(Vec::new());
        assert!(plan.run(&mut writer).unwrap().is_none());
        // Two layers folded, the last one still queued.
        assert!(writer.total_print_time() > 0.0);
        assert_eq!(writer.time_estimator().len(), 4);

        let folded = writer.total_print_time();
        writer.update_total_print_time();
        assert!(writer.total_print_time() > folded);
        assert!(writer.time_estimator().is_empty());
    }

    #[test]
    fn test_unknown_path() {
        let err = Plan::from_json(
            r#"{ "steps": [ { "op": "move", "path": "wall", "x": 0, "y": 0 } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, GcodeError::UnknownPathConfig(name) if name == "wall"));
    }

    #[test]
    fn test_finalize_must_be_last() {
        let err = Plan::from_json(
            r#"{ "steps": [ { "op": "finalize" }, { "op": "comment", "text": "late" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, GcodeError::Plan(_)));
    }

    #[test]
    fn test_plan_without_finalize() {
        let plan = Plan::from_json(r#"{ "steps": [ { "op": "comment", "text": "hi" } ] }"#)
            .unwrap();
        let (gcode, summary) = run(&plan);
        assert_eq!(gcode, ";hi\n");
        assert!(summary.is_none());
    }

    #[test]
    fn test_path_spec_to_config() {
        let spec = PathSpec {
            speed: 45.0,
            flow: 50.0,
            ..PathSpec::default()
        };
        let config = spec.to_config("skin");
        assert_eq!(config.name, "skin");
        assert_eq!(config.speed(), 45.0);
        assert_eq!(config.flow(), 50.0);
        assert!(config.retraction.is_none());
    }
}
