//! Per-flavor G-code spelling.
//!
//! Every line whose spelling depends on the firmware is produced through the
//! [`Dialect`] trait. The writer decides *what* to emit; a dialect decides
//! *how* it reads. Default methods give the common RepRap/Marlin forms and
//! each flavor overrides only what differs.

mod mach3;
mod makerbot;
mod marlin;
mod reprap;

pub use mach3::Mach3;
pub use makerbot::Makerbot;
pub use marlin::{Marlin, UltiGCode};
pub use reprap::RepRap;

use crate::flavor::GcodeFlavor;
use crate::units::{format_coord, format_feedrate, format_mm, Coord};

/// How E values are accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrusionMode {
    /// E is the running filament position (`M82`).
    Absolute,
    /// E is the delta of each move (`M83`).
    Relative,
}

/// Words of one linear move, already in machine coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveLine {
    /// Extruding (`G1`) or travel (`G0`).
    pub extruding: bool,
    /// New feedrate (mm/s), when it changed.
    pub feedrate: Option<f64>,
    /// X (µm).
    pub x: Coord,
    /// Y (µm).
    pub y: Coord,
    /// Z (µm), when it changed.
    pub z: Option<Coord>,
    /// Extruder axis letter and value.
    pub e: Option<(char, f64)>,
}

/// Decimal places of E values.
pub const E_PRECISION: usize = 5;

/// Format an E value.
pub fn format_e(value: f64) -> String {
    format_coord(value, E_PRECISION)
}

/// Emission interface implemented by each flavor.
pub trait Dialect: Sync {
    /// Name written into the `;FLAVOR:` header.
    fn header_name(&self) -> &'static str;

    /// Axis letter driving `extruder`.
    fn extruder_axis(&self, _extruder: usize) -> char {
        'E'
    }

    /// E values are mm³ rather than mm of filament.
    fn is_volumetric(&self) -> bool {
        false
    }

    /// Absolute or relative E.
    fn extrusion_mode(&self) -> ExtrusionMode {
        ExtrusionMode::Absolute
    }

    /// Retraction is delegated to the firmware via `G10`/`G11`.
    fn uses_firmware_retraction(&self) -> bool {
        false
    }

    /// The firmware understands `G92` on the extruder axis.
    fn supports_extrusion_reset(&self) -> bool {
        true
    }

    /// Each extruder has its own axis that must be synchronised after a tool change.
    fn has_axis_per_extruder(&self) -> bool {
        false
    }

    /// Line terminator.
    fn line_ending(&self) -> &'static str {
        "\n"
    }

    /// Lines opening the program.
    fn header(&self) -> Vec<String> {
        let mut lines = vec![format!(";FLAVOR:{}", self.header_name())];
        match self.extrusion_mode() {
            ExtrusionMode::Absolute => lines.push("M82 ;absolute extrusion mode".into()),
            ExtrusionMode::Relative => lines.push("M83 ;relative extrusion mode".into()),
        }
        lines
    }

    /// A linear move.
    fn linear_move(&self, mv: &MoveLine) -> String {
        let mut line = String::from(if mv.extruding { "G1" } else { "G0" });
        if let Some(feedrate) = mv.feedrate {
            line.push_str(" F");
            line.push_str(&format_feedrate(feedrate));
        }
        line.push_str(" X");
        line.push_str(&format_mm(mv.x));
        line.push_str(" Y");
        line.push_str(&format_mm(mv.y));
        if let Some(z) = mv.z {
            line.push_str(" Z");
            line.push_str(&format_mm(z));
        }
        if let Some((axis, value)) = mv.e {
            line.push(' ');
            line.push(axis);
            line.push_str(&format_e(value));
        }
        line
    }

    /// Extruder-only move (retract or prime).
    fn extruder_move(&self, extruder: usize, value: f64, speed: f64) -> String {
        format!(
            "G1 F{} {}{}",
            format_feedrate(speed),
            self.extruder_axis(extruder),
            format_e(value)
        )
    }

    /// Z-only move (z-hop and its recovery).
    fn z_move(&self, z: Coord) -> String {
        format!("G1 Z{}", format_mm(z))
    }

    /// Firmware retraction; `switching` asks for the long tool-change retraction.
    fn firmware_retract(&self, switching: bool) -> String {
        if switching {
            "G10 S1".into()
        } else {
            "G10".into()
        }
    }

    /// Firmware un-retraction.
    fn firmware_prime(&self) -> String {
        "G11".into()
    }

    /// Set the extruder axis position without moving.
    fn reset_extrusion(&self, extruder: usize, value: f64) -> String {
        if value == 0.0 {
            format!("G92 {}0", self.extruder_axis(extruder))
        } else {
            format!("G92 {}{}", self.extruder_axis(extruder), format_e(value))
        }
    }

    /// Select a tool.
    fn tool_change(&self, extruder: usize) -> String {
        format!("T{}", extruder)
    }

    /// Fan speed in percent; zero switches the fan off.
    fn fan(&self, percent: f64) -> String {
        if percent > 0.0 {
            format!("M106 S{}", format_coord(percent * 255.0 / 100.0, 0))
        } else {
            "M107".into()
        }
    }

    /// Nozzle temperature; `extruder` is set when it is not the active one.
    fn temperature(&self, extruder: Option<usize>, temperature: f64, wait: bool) -> String {
        let mut line = String::from(if wait { "M109" } else { "M104" });
        if let Some(extruder) = extruder {
            line.push_str(&format!(" T{}", extruder));
        }
        line.push_str(&format!(" S{}", temperature));
        line
    }

    /// Bed temperature.
    fn bed_temperature(&self, temperature: f64, wait: bool) -> String {
        format!("{} S{}", if wait { "M190" } else { "M140" }, temperature)
    }

    /// Pause for `seconds`.
    fn dwell(&self, seconds: f64) -> String {
        format!("G4 P{}", (seconds * 1000.0) as i64)
    }
}

static MARLIN: Marlin = Marlin { volumetric: false };
static MARLIN_VOLUMETRIC: Marlin = Marlin { volumetric: true };
static ULTIGCODE: UltiGCode = UltiGCode;
static MAKERBOT: Makerbot = Makerbot;
static MACH3: Mach3 = Mach3;
static REPRAP: RepRap = RepRap;

/// Dispatch table from flavor to emitter.
pub fn for_flavor(flavor: GcodeFlavor) -> &'static dyn Dialect {
    match flavor {
        GcodeFlavor::Marlin => &MARLIN,
        GcodeFlavor::MarlinVolumetric => &MARLIN_VOLUMETRIC,
        GcodeFlavor::UltiGCode => &ULTIGCODE,
        GcodeFlavor::Makerbot => &MAKERBOT,
        GcodeFlavor::Mach3 => &MACH3,
        GcodeFlavor::RepRap => &REPRAP,
    }
}
