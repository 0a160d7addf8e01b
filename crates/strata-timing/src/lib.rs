#![warn(missing_docs)]

//! Print time estimation for the strata G-code writer.
//!
//! The estimator replays moves through a simplified firmware planner:
//! per-axis feedrate and acceleration limits, jerk-limited junction speeds
//! and trapezoidal velocity profiles.
//!
//! # Example
//!
//! ```
//! use strata_timing::{Position, TimeEstimator};
//!
//! let mut estimator = TimeEstimator::default();
//! estimator.plan(Position::new(100.0, 0.0, 0.0, 0.0), 10.0);
//! let seconds = estimator.calculate();
//! assert!(seconds > 9.9 && seconds < 10.1);
//! ```

pub mod limits;
pub mod planner;

pub use limits::KinematicLimits;
pub use planner::{Position, TimeEstimator};
