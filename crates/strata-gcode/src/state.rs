//! Device state implied by the emitted program.

use crate::units::{Coord, Point, Point3};

/// Maximum number of extruders a writer can drive.
pub const MAX_EXTRUDERS: usize = 16;

/// Per-extruder bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtruderState {
    /// Nozzle offset relative to extruder 0 (µm).
    pub offset: Point,
    /// Last commanded temperature (°C).
    pub temperature: Option<f64>,
    /// Code emitted when switching to this extruder.
    pub pre_switch_code: String,
    /// Code emitted when switching away from this extruder.
    pub post_switch_code: String,
    /// Material pushed by this extruder so far (mm or mm³).
    pub filament_used: f64,
}

/// Machine state tracked across every emitted line.
///
/// The firmware's E position is always `extrusion_amount - retracted_by`
/// (for firmware retraction the firmware hides the retraction, so
/// `retracted_by` stays zero).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    /// Logical head position (µm), without extruder offset or z-hop.
    pub position: Point3,
    /// Offset of the extruder that made the last move (µm).
    pub head_offset: Point,
    /// Whether Z has been emitted at least once.
    pub z_known: bool,
    /// End of the last move, cleared by `reset_start_position`.
    pub start_position: Option<Point3>,
    /// Height used by XY-only moves (µm).
    pub layer_z: Coord,
    /// Filament pushed since the last reset (mm or mm³); never decreases otherwise.
    pub extrusion_amount: f64,
    /// E position last sent to the firmware.
    pub e_position: f64,
    /// Currently retracted.
    pub retracted: bool,
    /// Current z-hop height (µm); zero when at print height.
    pub z_hop: Coord,
    /// Speed of the pending prime (mm/s).
    pub prime_speed: f64,
    /// Extra material added by the pending prime.
    pub prime_amount: f64,
    /// Material coasted at the end of the last path, re-primed on the next extrusion.
    pub last_coasted_amount: f64,
    /// Active extruder.
    pub extruder: usize,
    /// Last commanded bed temperature (°C).
    pub bed_temperature: Option<f64>,
    /// Last commanded fan speed (%).
    pub fan_speed: Option<f64>,
    /// Last emitted feedrate (mm/s).
    pub speed: Option<f64>,
    /// Accepted retractions since the writer was created.
    pub retraction_count: u64,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            position: Point3::default(),
            head_offset: Point::default(),
            z_known: false,
            start_position: None,
            layer_z: 0,
            extrusion_amount: 0.0,
            e_position: 0.0,
            retracted: false,
            z_hop: 0,
            prime_speed: 25.0,
            prime_amount: 0.0,
            last_coasted_amount: 0.0,
            extruder: 0,
            bed_temperature: None,
            fan_speed: None,
            speed: None,
            retraction_count: 0,
        }
    }
}

impl DeviceState {
    /// True while the head is lifted by a z-hop.
    pub fn is_z_hopped(&self) -> bool {
        self.z_hop > 0
    }

    /// Where the head physically sits in XY (µm), offset included.
    pub fn head_xy(&self) -> Point {
        Point::new(
            self.position.x + self.head_offset.x,
            self.position.y + self.head_offset.y,
        )
    }

    /// Height the head physically sits at (µm).
    pub fn physical_z(&self) -> Coord {
        self.position.z + self.z_hop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_z_includes_hop() {
        let mut state = DeviceState::default();
        state.position.z = 200;
        assert_eq!(state.physical_z(), 200);
        state.z_hop = 1_000;
        assert!(state.is_z_hopped());
        assert_eq!(state.physical_z(), 1_200);
    }

    #[test]
    fn test_head_xy_includes_offset() {
        let mut state = DeviceState::default();
        state.position.x = 5_000;
        state.head_offset = Point::new(20_000, -1_000);
        assert_eq!(state.head_xy(), Point::new(25_000, -1_000));
    }
}
