//! Integer coordinates and unit conversion.
//!
//! Positions travel through the writer as integer micrometres and are only
//! converted to millimetres when a line is formatted.

use serde::{Deserialize, Serialize};

/// A length in micrometres.
pub type Coord = i64;

/// Micrometres per millimetre.
pub const MICRONS_PER_MM: f64 = 1000.0;

/// Convert micrometres to millimetres.
pub fn int2mm(value: Coord) -> f64 {
    value as f64 / MICRONS_PER_MM
}

/// Convert millimetres to micrometres, rounding to the nearest micrometre.
pub fn mm2int(value: f64) -> Coord {
    (value * MICRONS_PER_MM).round() as Coord
}

/// Format a floating point value with a fixed number of decimals.
pub fn format_coord(value: f64, precision: usize) -> String {
    format!("{:.prec$}", value, prec = precision)
}

/// Format a micrometre coordinate as millimetres with three decimals.
pub fn format_mm(value: Coord) -> String {
    format_coord(int2mm(value), 3)
}

/// Format a speed given in mm/s as a per-minute feedrate.
pub fn format_feedrate(speed: f64) -> String {
    format_coord(speed * 60.0, 0)
}

/// A point in the XY plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// X (µm).
    pub x: Coord,
    /// Y (µm).
    pub y: Coord,
}

impl Point {
    /// Create a new point.
    pub fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }
}

/// A point in 3D machine space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point3 {
    /// X (µm).
    pub x: Coord,
    /// Y (µm).
    pub y: Coord,
    /// Z (µm).
    pub z: Coord,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: Coord, y: Coord, z: Coord) -> Self {
        Self { x, y, z }
    }

    /// Lift an XY point to height `z`.
    pub fn from_xy(p: Point, z: Coord) -> Self {
        Self::new(p.x, p.y, z)
    }

    /// Projection onto the XY plane.
    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Euclidean distance to `other` in millimetres.
    pub fn distance_mm(&self, other: &Point3) -> f64 {
        let dx = int2mm(other.x - self.x);
        let dy = int2mm(other.y - self.y);
        let dz = int2mm(other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}
