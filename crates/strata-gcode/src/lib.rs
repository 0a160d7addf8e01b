#![warn(missing_docs)]

//! Stateful G-code writer for FDM printers.
//!
//! [`GcodeWriter`] turns planned tool-head motions into G-code for one of
//! several firmware flavors. It tracks the device state implied by every
//! emitted line (position, retraction, z-hop, temperatures, fan, active
//! extruder) and applies the usual print-quality heuristics: a
//! retraction-frequency limit, z-hop recovery before extruding and priming
//! after a retraction.
//!
//! # Example
//!
//! ```
//! use strata_gcode::{GcodeWriter, PathConfig, Point3, RetractionConfig};
//!
//! let mut writer = GcodeWriter::new(Vec::new());
//! writer.write_header().unwrap();
//!
//! let mut wall = PathConfig::new("wall", Some(RetractionConfig::default()));
//! wall.set_speed(30.0);
//! wall.set_line_width(400);
//! wall.set_layer_height(200);
//! wall.set_filament_diameter(1_750);
//!
//! writer.write_travel(Point3::new(0, 0, 200), 150.0).unwrap();
//! writer.write_extrusion(Point3::new(10_000, 0, 200), &wall).unwrap();
//! writer.write_retraction(&RetractionConfig::default(), false).unwrap();
//! let summary = writer.finalize(Some(10_000), 150.0, "M84").unwrap();
//!
//! let gcode = String::from_utf8(writer.into_inner().unwrap()).unwrap();
//! assert!(gcode.starts_with(";FLAVOR:Marlin"));
//! assert!(summary.filament_used[0] > 0.0);
//! ```

pub mod dialect;
pub mod error;
pub mod flavor;
pub mod path_config;
pub mod plan;
pub mod retraction;
pub mod settings;
pub mod state;
pub mod units;
pub mod writer;

pub use dialect::{Dialect, ExtrusionMode};
pub use error::{GcodeError, Result};
pub use flavor::GcodeFlavor;
pub use path_config::{extrusion_ratios, ExtrusionRatios, PathConfig};
pub use plan::{PathSpec, Plan, PlanStep};
pub use retraction::{CoastingConfig, RetractionConfig, RetractionWindow};
pub use settings::{ExtruderSettings, MachineSettings};
pub use state::{DeviceState, ExtruderState, MAX_EXTRUDERS};
pub use units::{Coord, Point, Point3};
pub use writer::{GcodeWriter, PrintSummary};

pub use strata_timing::{KinematicLimits, TimeEstimator};
