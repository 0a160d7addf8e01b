//! Machine kinematic limits used by the planner.

use serde::{Deserialize, Serialize};

/// Number of planned axes (X, Y, Z, E).
pub const NUM_AXES: usize = 4;

/// Axis index of X.
pub const X_AXIS: usize = 0;
/// Axis index of Y.
pub const Y_AXIS: usize = 1;
/// Axis index of Z.
pub const Z_AXIS: usize = 2;
/// Axis index of the extruder.
pub const E_AXIS: usize = 3;

/// Kinematic limits of the simulated firmware planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicLimits {
    /// Maximum feedrate per axis (mm/s), in X, Y, Z, E order.
    pub max_feedrate: [f64; NUM_AXES],
    /// Maximum acceleration per axis (mm/s²), in X, Y, Z, E order.
    pub max_acceleration: [f64; NUM_AXES],
    /// Default move acceleration (mm/s²).
    pub acceleration: f64,
    /// Maximum instantaneous XY speed change (mm/s).
    pub max_xy_jerk: f64,
    /// Maximum instantaneous Z speed change (mm/s).
    pub max_z_jerk: f64,
    /// Maximum instantaneous E speed change (mm/s).
    pub max_e_jerk: f64,
    /// Feedrates below this are raised to it (mm/s).
    pub minimum_feedrate: f64,
    /// Speed the planner assumes at the end of the queue (mm/s).
    pub minimum_planner_speed: f64,
}

impl Default for KinematicLimits {
    fn default() -> Self {
        Self {
            max_feedrate: [600.0, 600.0, 40.0, 25.0],
            max_acceleration: [9000.0, 9000.0, 100.0, 10000.0],
            acceleration: 3000.0,
            max_xy_jerk: 20.0,
            max_z_jerk: 0.4,
            max_e_jerk: 5.0,
            minimum_feedrate: 0.01,
            minimum_planner_speed: 0.05,
        }
    }
}

impl KinematicLimits {
    /// Check that every limit is positive.
    pub fn is_valid(&self) -> bool {
        self.max_feedrate.iter().all(|v| *v > 0.0)
            && self.max_acceleration.iter().all(|v| *v > 0.0)
            && self.acceleration > 0.0
            && self.max_xy_jerk > 0.0
            && self.max_z_jerk > 0.0
            && self.max_e_jerk > 0.0
            && self.minimum_feedrate > 0.0
            && self.minimum_planner_speed > 0.0
    }
}
