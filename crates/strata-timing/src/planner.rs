//! Trapezoidal motion planner used to estimate print time.
//!
//! Moves are queued as blocks. Each block gets a maximum entry speed from
//! the jerk limits at its junction with the previous block; [`TimeEstimator::calculate`]
//! then runs a reverse and a forward pass over the queue so that every block
//! can decelerate into its successor, and sums the time of the resulting
//! accelerate / cruise / decelerate profiles.

use crate::limits::{KinematicLimits, E_AXIS, NUM_AXES, X_AXIS, Y_AXIS, Z_AXIS};

/// A tool position in millimetres, including the extruder axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    /// Axis values in X, Y, Z, E order.
    pub axis: [f64; NUM_AXES],
}

impl Position {
    /// Create a position from its four axis values.
    pub fn new(x: f64, y: f64, z: f64, e: f64) -> Self {
        Self { axis: [x, y, z, e] }
    }
}

#[derive(Debug, Clone, Default)]
struct Block {
    recalculate: bool,
    nominal_length: bool,
    distance: f64,
    acceleration: f64,
    nominal_feedrate: f64,
    entry_speed: f64,
    max_entry_speed: f64,
    initial_feedrate: f64,
    final_feedrate: f64,
    accelerate_until: f64,
    decelerate_after: f64,
}

/// Distance needed to go from `initial_rate` to `target_rate` at `accel`.
fn estimate_acceleration_distance(initial_rate: f64, target_rate: f64, accel: f64) -> f64 {
    if accel == 0.0 {
        return 0.0;
    }
    (target_rate * target_rate - initial_rate * initial_rate) / (2.0 * accel)
}

/// Point at which to stop accelerating and start decelerating when the
/// block is too short to reach its nominal rate.
fn intersection_distance(initial_rate: f64, final_rate: f64, accel: f64, distance: f64) -> f64 {
    if accel == 0.0 {
        return 0.0;
    }
    (2.0 * accel * distance - initial_rate * initial_rate + final_rate * final_rate) / (4.0 * accel)
}

/// Highest speed from which `target_velocity` is still reachable over `distance`.
fn max_allowable_speed(accel: f64, target_velocity: f64, distance: f64) -> f64 {
    (target_velocity * target_velocity - 2.0 * accel * distance)
        .max(0.0)
        .sqrt()
}

fn acceleration_time_from_distance(initial_feedrate: f64, distance: f64, accel: f64) -> f64 {
    if accel == 0.0 {
        return 0.0;
    }
    let discriminant = (initial_feedrate * initial_feedrate + 2.0 * accel * distance).max(0.0);
    (-initial_feedrate + discriminant.sqrt()) / accel
}

impl Block {
    fn calculate_trapezoid(&mut self, entry_factor: f64, exit_factor: f64) {
        let initial_feedrate = self.nominal_feedrate * entry_factor;
        let final_feedrate = self.nominal_feedrate * exit_factor;

        let mut accelerate_distance =
            estimate_acceleration_distance(initial_feedrate, self.nominal_feedrate, self.acceleration);
        let decelerate_distance =
            estimate_acceleration_distance(self.nominal_feedrate, final_feedrate, -self.acceleration);

        let mut plateau_distance = self.distance - accelerate_distance - decelerate_distance;
        if plateau_distance < 0.0 {
            accelerate_distance = intersection_distance(
                initial_feedrate,
                final_feedrate,
                self.acceleration,
                self.distance,
            )
            .clamp(0.0, self.distance);
            plateau_distance = 0.0;
        }

        self.accelerate_until = accelerate_distance;
        self.decelerate_after = accelerate_distance + plateau_distance;
        self.initial_feedrate = initial_feedrate;
        self.final_feedrate = final_feedrate;
    }

    fn time(&self) -> f64 {
        if self.nominal_feedrate <= 0.0 {
            return 0.0;
        }
        let plateau_distance = self.decelerate_after - self.accelerate_until;
        acceleration_time_from_distance(self.initial_feedrate, self.accelerate_until, self.acceleration)
            + plateau_distance / self.nominal_feedrate
            + acceleration_time_from_distance(
                self.final_feedrate,
                self.distance - self.decelerate_after,
                self.acceleration,
            )
    }
}

/// Accumulates planned moves and reports how long the firmware needs for them.
#[derive(Debug, Clone)]
pub struct TimeEstimator {
    limits: KinematicLimits,
    position: Position,
    previous_feedrate: [f64; NUM_AXES],
    previous_nominal_feedrate: f64,
    blocks: Vec<Block>,
}

impl Default for TimeEstimator {
    fn default() -> Self {
        Self::new(KinematicLimits::default())
    }
}

impl TimeEstimator {
    /// Create an estimator for a machine with the given limits.
    pub fn new(limits: KinematicLimits) -> Self {
        Self {
            limits,
            position: Position::default(),
            previous_feedrate: [0.0; NUM_AXES],
            previous_nominal_feedrate: 0.0,
            blocks: Vec::new(),
        }
    }

    /// Limits in use.
    pub fn limits(&self) -> &KinematicLimits {
        &self.limits
    }

    /// Last planned position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Set the current position without planning a move.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Number of queued blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when no move is queued.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop all queued blocks, keeping the current position.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.previous_feedrate = [0.0; NUM_AXES];
        self.previous_nominal_feedrate = 0.0;
    }

    /// Queue a move to `target` at `feedrate` (mm/s).
    pub fn plan(&mut self, target: Position, feedrate: f64) {
        let limits = &self.limits;
        let mut delta = [0.0; NUM_AXES];
        for (n, d) in delta.iter_mut().enumerate() {
            *d = target.axis[n] - self.position.axis[n];
        }
        let max_travel = delta.iter().fold(0.0f64, |acc, d| acc.max(d.abs()));
        if max_travel <= 0.0 {
            return;
        }

        let feedrate = feedrate.max(limits.minimum_feedrate);
        let mut distance = (delta[X_AXIS] * delta[X_AXIS]
            + delta[Y_AXIS] * delta[Y_AXIS]
            + delta[Z_AXIS] * delta[Z_AXIS])
            .sqrt();
        if distance <= 0.0 {
            distance = delta[E_AXIS].abs();
        }

        let mut block = Block {
            distance,
            nominal_feedrate: feedrate,
            ..Default::default()
        };

        let mut current_feedrate = [0.0; NUM_AXES];
        let mut speed_factor = 1.0f64;
        for n in 0..NUM_AXES {
            current_feedrate[n] = delta[n] * feedrate / distance;
            let abs = current_feedrate[n].abs();
            if abs > limits.max_feedrate[n] {
                speed_factor = speed_factor.min(limits.max_feedrate[n] / abs);
            }
        }
        if speed_factor < 1.0 {
            for v in current_feedrate.iter_mut() {
                *v *= speed_factor;
            }
            block.nominal_feedrate *= speed_factor;
        }

        block.acceleration = limits.acceleration;
        for n in 0..NUM_AXES {
            if block.acceleration * delta[n].abs() / distance > limits.max_acceleration[n] {
                block.acceleration = limits.max_acceleration[n];
            }
        }

        let mut vmax_junction = limits.max_xy_jerk / 2.0;
        if current_feedrate[Z_AXIS].abs() > limits.max_z_jerk / 2.0 {
            vmax_junction = vmax_junction.min(limits.max_z_jerk / 2.0);
        }
        if current_feedrate[E_AXIS].abs() > limits.max_e_jerk / 2.0 {
            vmax_junction = vmax_junction.min(limits.max_e_jerk / 2.0);
        }
        vmax_junction = vmax_junction.min(block.nominal_feedrate);
        let safe_speed = vmax_junction;

        if !self.blocks.is_empty() && self.previous_nominal_feedrate > 0.0001 {
            let prev = &self.previous_feedrate;
            let xy_jerk = ((current_feedrate[X_AXIS] - prev[X_AXIS]).powi(2)
                + (current_feedrate[Y_AXIS] - prev[Y_AXIS]).powi(2))
            .sqrt();
            let mut factor = 1.0f64;
            if xy_jerk > limits.max_xy_jerk {
                factor = limits.max_xy_jerk / xy_jerk;
            }
            let z_jerk = (current_feedrate[Z_AXIS] - prev[Z_AXIS]).abs();
            if z_jerk > limits.max_z_jerk {
                factor = factor.min(limits.max_z_jerk / z_jerk);
            }
            let e_jerk = (current_feedrate[E_AXIS] - prev[E_AXIS]).abs();
            if e_jerk > limits.max_e_jerk {
                factor = factor.min(limits.max_e_jerk / e_jerk);
            }
            vmax_junction = self
                .previous_nominal_feedrate
                .min(block.nominal_feedrate * factor);
        }
        block.max_entry_speed = vmax_junction;

        let v_allowable =
            max_allowable_speed(-block.acceleration, limits.minimum_planner_speed, distance);
        block.entry_speed = vmax_junction.min(v_allowable);
        block.nominal_length = block.nominal_feedrate <= v_allowable;
        block.recalculate = true;

        self.previous_feedrate = current_feedrate;
        self.previous_nominal_feedrate = block.nominal_feedrate;
        self.position = target;

        let nominal = block.nominal_feedrate;
        block.calculate_trapezoid(block.entry_speed / nominal, safe_speed / nominal);
        self.blocks.push(block);
    }

    /// Total time in seconds needed for every queued block.
    pub fn calculate(&mut self) -> f64 {
        self.reverse_pass();
        self.forward_pass();
        self.recalculate_trapezoids();
        self.blocks.iter().map(Block::time).sum()
    }

    fn reverse_pass(&mut self) {
        for i in (0..self.blocks.len().saturating_sub(1)).rev() {
            let next_entry = self.blocks[i + 1].entry_speed;
            let current = &mut self.blocks[i];
            if current.entry_speed != current.max_entry_speed {
                if !current.nominal_length && current.max_entry_speed > next_entry {
                    current.entry_speed = current.max_entry_speed.min(max_allowable_speed(
                        -current.acceleration,
                        next_entry,
                        current.distance,
                    ));
                } else {
                    current.entry_speed = current.max_entry_speed;
                }
                current.recalculate = true;
            }
        }
    }

    fn forward_pass(&mut self) {
        for i in 1..self.blocks.len() {
            let (head, tail) = self.blocks.split_at_mut(i);
            let previous = &head[i - 1];
            let current = &mut tail[0];
            if !previous.nominal_length && previous.entry_speed < current.entry_speed {
                let entry_speed = current.entry_speed.min(max_allowable_speed(
                    -previous.acceleration,
                    previous.entry_speed,
                    previous.distance,
                ));
                if current.entry_speed != entry_speed {
                    current.entry_speed = entry_speed;
                    current.recalculate = true;
                }
            }
        }
    }

    fn recalculate_trapezoids(&mut self) {
        let count = self.blocks.len();
        for i in 0..count {
            let next = self
                .blocks
                .get(i + 1)
                .map(|b| (b.entry_speed, b.recalculate));
            let minimum_planner_speed = self.limits.minimum_planner_speed;
            let current = &mut self.blocks[i];
            match next {
                Some((next_entry, next_recalculate)) => {
                    if current.recalculate || next_recalculate {
                        let nominal = current.nominal_feedrate;
                        current.calculate_trapezoid(
                            current.entry_speed / nominal,
                            next_entry / nominal,
                        );
                        current.recalculate = false;
                    }
                }
                None => {
                    let nominal = current.nominal_feedrate;
                    current.calculate_trapezoid(
                        current.entry_speed / nominal,
                        minimum_planner_speed / nominal,
                    );
                    current.recalculate = false;
                }
            }
        }
    }
}
