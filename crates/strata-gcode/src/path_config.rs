//! Per-move-class extrusion configuration.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::retraction::RetractionConfig;
use crate::units::{int2mm, Coord};

/// Extrusion ratios derived from a line's cross-section and the filament.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtrusionRatios {
    /// mm³ of material per mm of path.
    pub volume_per_mm: f64,
    /// mm of filament per mm of path.
    pub filament_per_mm: f64,
}

/// Compute the extrusion ratios for a line of `line_width` × `layer_height`
/// (µm) printed at `flow` percent from filament of `filament_diameter` µm.
///
/// A zero filament diameter gives a zero linear ratio.
pub fn extrusion_ratios(
    line_width: Coord,
    layer_height: Coord,
    filament_diameter: Coord,
    flow: f64,
) -> ExtrusionRatios {
    let volume_per_mm = int2mm(line_width) * int2mm(layer_height) * flow / 100.0;
    let radius = int2mm(filament_diameter) / 2.0;
    let filament_area = PI * radius * radius;
    let filament_per_mm = if filament_area > 0.0 {
        volume_per_mm / filament_area
    } else {
        0.0
    };
    ExtrusionRatios {
        volume_per_mm,
        filament_per_mm,
    }
}

/// Configuration for one kind of move (outer wall, infill, support, ...).
///
/// Width, layer height, filament diameter and flow feed the derived
/// extrusion ratios, which are recomputed on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct PathConfig {
    /// Display name, also written as the `;TYPE:` comment.
    pub name: String,
    /// Continuous-Z (spiral vase) mode.
    pub spiralize: bool,
    /// Retraction policy used before travels away from this path.
    pub retraction: Option<RetractionConfig>,
    speed: f64,
    line_width: Coord,
    layer_height: Coord,
    filament_diameter: Coord,
    flow: f64,
    ratios: ExtrusionRatios,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self::new("", None)
    }
}

impl PathConfig {
    /// Create an empty config with 100% flow.
    pub fn new(name: impl Into<String>, retraction: Option<RetractionConfig>) -> Self {
        Self {
            name: name.into(),
            spiralize: false,
            retraction,
            speed: 0.0,
            line_width: 0,
            layer_height: 0,
            filament_diameter: 0,
            flow: 100.0,
            ratios: ExtrusionRatios::default(),
        }
    }

    /// Set the movement speed (mm/s).
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Set the extruded line width (µm).
    pub fn set_line_width(&mut self, line_width: Coord) {
        self.line_width = line_width;
        self.calculate_extrusion();
    }

    /// Set the layer height (µm).
    pub fn set_layer_height(&mut self, layer_height: Coord) {
        self.layer_height = layer_height;
        self.calculate_extrusion();
    }

    /// Set the filament diameter as it comes off the spool (µm).
    pub fn set_filament_diameter(&mut self, diameter: Coord) {
        self.filament_diameter = diameter;
        self.calculate_extrusion();
    }

    /// Set the flow multiplier in percent.
    pub fn set_flow(&mut self, flow: f64) {
        self.flow = flow;
        self.calculate_extrusion();
    }

    /// Ramp the speed up over the first layers.
    ///
    /// Interpolates between `min_speed` at layer 0 and the current speed at
    /// `max_speed_layer`. Each call rescales the current speed, so it must be
    /// applied once per layer to a fresh copy of the nominal config.
    pub fn smooth_speed(&mut self, min_speed: f64, layer_nr: i64, max_speed_layer: i64) {
        if max_speed_layer <= 0 {
            return;
        }
        let layer = layer_nr as f64;
        let max_layer = max_speed_layer as f64;
        self.speed = (self.speed * layer) / max_layer + (min_speed * (max_layer - layer) / max_layer);
    }

    /// Extrusion per mm of path: mm³ when `volumetric`, else mm of filament.
    pub fn extrusion_per_mm(&self, volumetric: bool) -> f64 {
        if volumetric {
            self.ratios.volume_per_mm
        } else {
            self.ratios.filament_per_mm
        }
    }

    /// Both derived ratios.
    pub fn ratios(&self) -> ExtrusionRatios {
        self.ratios
    }

    /// Movement speed (mm/s).
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Line width (µm).
    pub fn line_width(&self) -> Coord {
        self.line_width
    }

    /// Layer height (µm).
    pub fn layer_height(&self) -> Coord {
        self.layer_height
    }

    /// Filament diameter (µm).
    pub fn filament_diameter(&self) -> Coord {
        self.filament_diameter
    }

    /// Flow (%).
    pub fn flow(&self) -> f64 {
        self.flow
    }

    fn calculate_extrusion(&mut self) {
        self.ratios = extrusion_ratios(
            self.line_width,
            self.layer_height,
            self.filament_diameter,
            self.flow,
        );
    }
}
