//! Machine settings and built-in machine profiles.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_timing::KinematicLimits;

use crate::error::{GcodeError, Result};
use crate::flavor::GcodeFlavor;
use crate::state::MAX_EXTRUDERS;
use crate::units::Coord;

/// Per-extruder machine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtruderSettings {
    /// Nozzle X offset relative to extruder 0 (µm).
    pub offset_x: Coord,
    /// Nozzle Y offset relative to extruder 0 (µm).
    pub offset_y: Coord,
    /// Code run after switching to this extruder.
    pub pre_switch_code: String,
    /// Code run before switching away from this extruder.
    pub post_switch_code: String,
}

/// Everything the writer needs to know about a machine before the first move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Profile name.
    pub name: String,
    /// G-code flavor.
    pub flavor: GcodeFlavor,
    /// One entry per extruder.
    pub extruders: Vec<ExtruderSettings>,
    /// Retraction before a tool change (mm).
    pub switch_retraction_amount: f64,
    /// Speed of the tool-change retraction (mm/s).
    pub switch_retraction_speed: f64,
    /// Speed of the prime after a tool change (mm/s).
    pub switch_prime_speed: f64,
    /// Extrusion window of the retraction limiter (mm).
    pub retraction_extrusion_window: f64,
    /// Retractions allowed within the window; 0 disables the limit.
    pub retraction_count_max: usize,
    /// Kinematic limits used for print-time estimation.
    pub kinematics: KinematicLimits,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self::generic()
    }
}

impl MachineSettings {
    /// Parse settings from TOML and validate them.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check that the settings describe a machine the writer can drive.
    pub fn validate(&self) -> Result<()> {
        let count = self.extruders.len();
        if count == 0 || count > MAX_EXTRUDERS {
            return Err(GcodeError::InvalidSettings(format!(
                "{}: extruder count must be between 1 and {MAX_EXTRUDERS}, got {count}",
                self.name
            )));
        }
        let speeds = [
            ("switch_retraction_speed", self.switch_retraction_speed),
            ("switch_prime_speed", self.switch_prime_speed),
        ];
        for (field, value) in speeds {
            if !(value > 0.0) {
                return Err(GcodeError::InvalidSettings(format!(
                    "{}: {field} must be positive, got {value}",
                    self.name
                )));
            }
        }
        if self.switch_retraction_amount < 0.0 || self.retraction_extrusion_window < 0.0 {
            return Err(GcodeError::InvalidSettings(format!(
                "{}: retraction distances must not be negative",
                self.name
            )));
        }
        if !self.kinematics.is_valid() {
            return Err(GcodeError::InvalidSettings(format!(
                "{}: kinematic limits must be positive",
                self.name
            )));
        }
        Ok(())
    }

    /// Single-extruder Marlin machine.
    pub fn generic() -> Self {
        Self {
            name: "generic".into(),
            flavor: GcodeFlavor::Marlin,
            extruders: vec![ExtruderSettings::default()],
            switch_retraction_amount: 14.5,
            switch_retraction_speed: 20.0,
            switch_prime_speed: 20.0,
            retraction_extrusion_window: 4.5,
            retraction_count_max: 90,
            kinematics: KinematicLimits::default(),
        }
    }

    /// Ultimaker 2: UltiGCode with firmware retraction.
    pub fn ultimaker2() -> Self {
        Self {
            name: "ultimaker2".into(),
            flavor: GcodeFlavor::UltiGCode,
            kinematics: KinematicLimits {
                max_feedrate: [300.0, 300.0, 40.0, 45.0],
                max_acceleration: [9000.0, 9000.0, 100.0, 10000.0],
                acceleration: 3000.0,
                ..KinematicLimits::default()
            },
            ..Self::generic()
        }
    }

    /// Ultimaker Original with the dual extrusion upgrade.
    pub fn ultimaker_original_dual() -> Self {
        Self {
            name: "ultimaker_original_dual".into(),
            extruders: vec![
                ExtruderSettings::default(),
                ExtruderSettings {
                    offset_x: 18_000,
                    ..ExtruderSettings::default()
                },
            ],
            switch_retraction_amount: 16.0,
            ..Self::generic()
        }
    }

    /// Makerbot Replicator 2X on Sailfish firmware.
    pub fn makerbot_replicator() -> Self {
        Self {
            name: "makerbot_replicator".into(),
            flavor: GcodeFlavor::Makerbot,
            extruders: vec![
                ExtruderSettings::default(),
                ExtruderSettings {
                    offset_x: 34_000,
                    ..ExtruderSettings::default()
                },
            ],
            kinematics: KinematicLimits {
                max_feedrate: [200.0, 200.0, 15.0, 100.0],
                acceleration: 1000.0,
                ..KinematicLimits::default()
            },
            ..Self::generic()
        }
    }

    /// Duet board running RepRapFirmware with relative extrusion.
    pub fn duet_reprap() -> Self {
        Self {
            name: "duet_reprap".into(),
            flavor: GcodeFlavor::RepRap,
            switch_retraction_amount: 10.0,
            kinematics: KinematicLimits {
                max_feedrate: [500.0, 500.0, 20.0, 60.0],
                acceleration: 5000.0,
                ..KinematicLimits::default()
            },
            ..Self::generic()
        }
    }

    /// Mach3-controlled machine with two extruders on the A and B axes.
    pub fn mach3() -> Self {
        Self {
            name: "mach3".into(),
            flavor: GcodeFlavor::Mach3,
            extruders: vec![ExtruderSettings::default(), ExtruderSettings::default()],
            ..Self::generic()
        }
    }

    /// All built-in profiles.
    pub fn all_profiles() -> Vec<Self> {
        vec![
            Self::generic(),
            Self::ultimaker2(),
            Self::ultimaker_original_dual(),
            Self::makerbot_replicator(),
            Self::duet_reprap(),
            Self::mach3(),
        ]
    }

    /// Look up a built-in profile by name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::all_profiles().into_iter().find(|p| p.name == name)
    }
}
