//! The stateful G-code writer.
//!
//! [`GcodeWriter`] is the only place that knows what the firmware's state
//! is after each line: where the head is, how much filament has been pushed,
//! whether the nozzle is retracted or lifted, which extruder is active and
//! what temperatures and fan speed were last requested. Every public
//! operation updates that state and emits zero or more lines through the
//! active [`Dialect`].

use std::io::{BufWriter, Write};

use serde::{Deserialize, Serialize};
use strata_timing::limits::E_AXIS;
use strata_timing::{Position, TimeEstimator};
use tracing::{debug, info, trace};

use crate::dialect::{Dialect, ExtrusionMode, MoveLine};
use crate::error::{GcodeError, Result};
use crate::flavor::GcodeFlavor;
use crate::path_config::PathConfig;
use crate::retraction::{RetractionConfig, RetractionWindow};
use crate::settings::MachineSettings;
use crate::state::{DeviceState, ExtruderState, MAX_EXTRUDERS};
use crate::units::{int2mm, Coord, Point, Point3};

/// Extrusion ratios at or below this are travel moves.
pub const MIN_EXTRUSION_PER_MM: f64 = 0.000001;

/// The E counter is reset once it grows past this, to keep float precision.
pub const EXTRUSION_RESET_THRESHOLD: f64 = 10_000.0;

/// Retraction distance and speed assumed for firmware retraction when
/// estimating time; the real values live in the firmware.
const FIRMWARE_RETRACTION_DISTANCE: f64 = 4.5;
const FIRMWARE_RETRACTION_SPEED: f64 = 25.0;

/// Totals reported when a program is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintSummary {
    /// Estimated print time (s).
    pub print_time_seconds: f64,
    /// Material used per extruder (mm of filament, or mm³ for volumetric flavors).
    pub filament_used: Vec<f64>,
}

/// Writes G-code for one print.
///
/// Configure it once (flavor, extruders, retraction settings), then feed it
/// moves, retractions and machine commands in program order. The sink is
/// buffered; [`finalize`](Self::finalize) flushes it and dropping the writer
/// flushes on a best-effort basis.
pub struct GcodeWriter<W: Write> {
    sink: BufWriter<W>,
    flavor: GcodeFlavor,
    dialect: &'static dyn Dialect,
    state: DeviceState,
    extruders: Vec<ExtruderState>,
    switch_retraction: RetractionConfig,
    retraction_extrusion_window: f64,
    retraction_window: RetractionWindow,
    last_retraction: Option<RetractionConfig>,
    estimator: TimeEstimator,
    total_print_time: f64,
}

impl<W: Write> GcodeWriter<W> {
    /// Create a single-extruder Marlin writer with default retraction settings.
    pub fn new(sink: W) -> Self {
        let flavor = GcodeFlavor::default();
        Self {
            sink: BufWriter::new(sink),
            flavor,
            dialect: flavor.dialect(),
            state: DeviceState::default(),
            extruders: vec![ExtruderState::default()],
            switch_retraction: RetractionConfig {
                amount: 14.5,
                speed: 20.0,
                prime_speed: 20.0,
                prime_amount: 0.0,
                z_hop: 0,
            },
            retraction_extrusion_window: 4.5,
            retraction_window: RetractionWindow::new(90),
            last_retraction: None,
            estimator: TimeEstimator::default(),
            total_print_time: 0.0,
        }
    }

    /// Create a writer configured from machine settings.
    pub fn from_settings(sink: W, settings: &MachineSettings) -> Result<Self> {
        settings.validate()?;
        let mut writer = Self::new(sink);
        writer.set_flavor(settings.flavor);
        writer.set_extruder_count(settings.extruders.len())?;
        for (id, extruder) in settings.extruders.iter().enumerate() {
            writer.set_extruder_offset(id, Point::new(extruder.offset_x, extruder.offset_y))?;
            writer.set_switch_extruder_code(
                id,
                extruder.pre_switch_code.clone(),
                extruder.post_switch_code.clone(),
            )?;
        }
        writer.set_retraction_settings(
            settings.switch_retraction_amount,
            settings.switch_retraction_speed,
            settings.switch_prime_speed,
            settings.retraction_extrusion_window,
            settings.retraction_count_max,
        );
        writer.set_time_estimator(TimeEstimator::new(settings.kinematics.clone()));
        Ok(writer)
    }

    // ----- configuration -----

    /// Replace the output sink, returning the previous one after flushing it.
    pub fn set_output_target(&mut self, sink: W) -> Result<W> {
        let previous = std::mem::replace(&mut self.sink, BufWriter::new(sink));
        previous
            .into_inner()
            .map_err(|e| GcodeError::Io(e.into_error()))
    }

    /// Flush and return the sink.
    pub fn into_inner(self) -> Result<W> {
        self.sink
            .into_inner()
            .map_err(|e| GcodeError::Io(e.into_error()))
    }

    /// Select the G-code flavor.
    pub fn set_flavor(&mut self, flavor: GcodeFlavor) {
        self.flavor = flavor;
        self.dialect = flavor.dialect();
    }

    /// Active flavor.
    pub fn flavor(&self) -> GcodeFlavor {
        self.flavor
    }

    /// Are E values in mm³?
    pub fn is_volumetric(&self) -> bool {
        self.dialect.is_volumetric()
    }

    /// Set the number of extruders (1 to [`MAX_EXTRUDERS`]).
    pub fn set_extruder_count(&mut self, count: usize) -> Result<()> {
        if count == 0 || count > MAX_EXTRUDERS {
            return Err(GcodeError::InvalidSettings(format!(
                "extruder count must be between 1 and {MAX_EXTRUDERS}, got {count}"
            )));
        }
        self.extruders.resize_with(count, ExtruderState::default);
        Ok(())
    }

    /// Number of configured extruders.
    pub fn extruder_count(&self) -> usize {
        self.extruders.len()
    }

    /// Set the nozzle offset of extruder `id`.
    pub fn set_extruder_offset(&mut self, id: usize, offset: Point) -> Result<()> {
        self.check_extruder(id)?;
        self.extruders[id].offset = offset;
        Ok(())
    }

    /// Nozzle offset of extruder `id`.
    pub fn extruder_offset(&self, id: usize) -> Result<Point> {
        self.check_extruder(id)?;
        Ok(self.extruders[id].offset)
    }

    /// Set the code emitted when switching to (`pre`) and away from (`post`) extruder `id`.
    pub fn set_switch_extruder_code(
        &mut self,
        id: usize,
        pre: impl Into<String>,
        post: impl Into<String>,
    ) -> Result<()> {
        self.check_extruder(id)?;
        let extruder = &mut self.extruders[id];
        extruder.pre_switch_code = pre.into();
        extruder.post_switch_code = post.into();
        Ok(())
    }

    /// Configure extruder-switch retraction and the retraction frequency limit.
    ///
    /// At most `retraction_count_max` retractions are accepted within any
    /// `retraction_extrusion_window` mm of extruded material. A count of zero
    /// disables the limit.
    pub fn set_retraction_settings(
        &mut self,
        switch_amount: f64,
        switch_speed: f64,
        switch_prime_speed: f64,
        retraction_extrusion_window: f64,
        retraction_count_max: usize,
    ) {
        self.switch_retraction = RetractionConfig {
            amount: switch_amount,
            speed: switch_speed,
            prime_speed: switch_prime_speed,
            prime_amount: 0.0,
            z_hop: 0,
        };
        self.retraction_extrusion_window = retraction_extrusion_window;
        self.retraction_window = RetractionWindow::new(retraction_count_max);
    }

    /// Replace the time estimator.
    pub fn set_time_estimator(&mut self, estimator: TimeEstimator) {
        self.estimator = estimator;
    }

    /// The time estimator fed by this writer.
    pub fn time_estimator(&self) -> &TimeEstimator {
        &self.estimator
    }

    // ----- state accessors -----

    /// Full device state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Snapshots of the recent retractions.
    pub fn retraction_window(&self) -> &RetractionWindow {
        &self.retraction_window
    }

    /// Current logical position.
    pub fn position(&self) -> Point3 {
        self.state.position
    }

    /// Current logical XY position.
    pub fn position_xy(&self) -> Point {
        self.state.position.xy()
    }

    /// Current print height (without z-hop).
    pub fn position_z(&self) -> Coord {
        self.state.position.z
    }

    /// End of the last move, unless reset since.
    pub fn start_position_xy(&self) -> Option<Point> {
        self.state.start_position.map(|p| p.xy())
    }

    /// Forget the start position.
    pub fn reset_start_position(&mut self) {
        self.state.start_position = None;
    }

    /// Active extruder.
    pub fn extruder(&self) -> usize {
        self.state.extruder
    }

    /// Extrusion counter since the last reset.
    pub fn extrusion_amount(&self) -> f64 {
        self.state.extrusion_amount
    }

    /// Whether the filament is currently retracted.
    pub fn is_retracted(&self) -> bool {
        self.state.retracted
    }

    /// Whether the head is currently lifted by a z-hop.
    pub fn is_z_hopped(&self) -> bool {
        self.state.is_z_hopped()
    }

    /// Accepted retractions so far.
    pub fn retraction_count(&self) -> u64 {
        self.state.retraction_count
    }

    /// Material used by extruder `e`.
    pub fn total_filament_used(&self, e: usize) -> Result<f64> {
        self.check_extruder(e)?;
        Ok(self.extruders[e].filament_used)
    }

    /// Last commanded temperature of extruder `e`.
    pub fn temperature(&self, e: usize) -> Option<f64> {
        self.extruders.get(e).and_then(|x| x.temperature)
    }

    /// Last commanded bed temperature.
    pub fn bed_temperature(&self) -> Option<f64> {
        self.state.bed_temperature
    }

    /// Last commanded fan speed (%).
    pub fn fan_speed(&self) -> Option<f64> {
        self.state.fan_speed
    }

    /// Print time accumulated by [`update_total_print_time`](Self::update_total_print_time) and delays (s).
    pub fn total_print_time(&self) -> f64 {
        self.total_print_time
    }

    /// Fold the moves queued in the estimator into the total print time.
    pub fn update_total_print_time(&mut self) {
        self.total_print_time += self.estimator.calculate();
        self.estimator.reset();
    }

    /// Zero the total print time.
    pub fn reset_total_print_time(&mut self) {
        self.total_print_time = 0.0;
    }

    // ----- raw output -----

    /// Write one line followed by the dialect's line ending.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.sink.write_all(line.as_bytes())?;
        self.sink.write_all(self.dialect.line_ending().as_bytes())?;
        Ok(())
    }

    /// Write a block of user code, one line at a time.
    pub fn write_code(&mut self, code: &str) -> Result<()> {
        for line in code.lines() {
            self.write_line(line)?;
        }
        Ok(())
    }

    /// Write the flavor header.
    pub fn write_header(&mut self) -> Result<()> {
        for line in self.dialect.header() {
            self.write_line(&line)?;
        }
        Ok(())
    }

    /// Write a `;` comment.
    pub fn write_comment(&mut self, comment: &str) -> Result<()> {
        self.write_line(&format!(";{comment}"))
    }

    /// Write a `;TYPE:` comment naming the kind of path that follows.
    pub fn write_type_comment(&mut self, kind: &str) -> Result<()> {
        self.write_line(&format!(";TYPE:{kind}"))
    }

    /// Write a `;LAYER:` comment.
    pub fn write_layer_comment(&mut self, layer_nr: i64) -> Result<()> {
        self.write_line(&format!(";LAYER:{layer_nr}"))
    }

    /// Pause for `seconds`.
    pub fn write_delay(&mut self, seconds: f64) -> Result<()> {
        let line = self.dialect.dwell(seconds);
        self.write_line(&line)?;
        self.total_print_time += seconds;
        Ok(())
    }

    // ----- motion -----

    /// Set the height used by [`write_move_xy`](Self::write_move_xy).
    pub fn set_z(&mut self, z: Coord) {
        self.state.layer_z = z;
    }

    /// Record material coasted away at the end of the last path; it is
    /// re-primed with the next extrusion.
    pub fn set_last_coasted_amount(&mut self, amount: f64) {
        self.state.last_coasted_amount = amount;
    }

    /// Move in the current layer plane.
    pub fn write_move_xy(&mut self, target: Point, speed: f64, extrusion_per_mm: f64) -> Result<()> {
        self.write_move(Point3::from_xy(target, self.state.layer_z), speed, extrusion_per_mm)
    }

    /// Travel to `target` without extruding.
    pub fn write_travel(&mut self, target: Point3, speed: f64) -> Result<()> {
        self.write_move(target, speed, 0.0)
    }

    /// Extrude to `target` using the speed and flow of `path`.
    pub fn write_extrusion(&mut self, target: Point3, path: &PathConfig) -> Result<()> {
        let extrusion_per_mm = path.extrusion_per_mm(self.is_volumetric());
        self.write_move(target, path.speed(), extrusion_per_mm)
    }

    /// Move to `target` at `speed` (mm/s), extruding `extrusion_per_mm` per mm of path.
    ///
    /// An extruding move first lowers the head from a z-hop and re-primes a
    /// retracted nozzle, so material is only deposited at print height and
    /// pressure. Position comparison and extrusion length use the physical
    /// head position, so after a tool change a move to the same logical
    /// point still brings the new nozzle into place. Moves that leave the
    /// head where it is are dropped.
    pub fn write_move(&mut self, target: Point3, speed: f64, extrusion_per_mm: f64) -> Result<()> {
        let offset = self.extruders[self.state.extruder].offset;
        let from = Point3::from_xy(self.state.head_xy(), self.state.position.z);
        let to = Point3::new(target.x + offset.x, target.y + offset.y, target.z);
        if self.state.z_known && from == to {
            return Ok(());
        }

        let extruding = extrusion_per_mm > MIN_EXTRUSION_PER_MM;
        let distance = from.distance_mm(&to);
        let mut e = None;
        if extruding {
            self.restore_z_hop()?;
            let coasted = std::mem::take(&mut self.state.last_coasted_amount);
            self.extrude(coasted);
            if self.state.retracted {
                self.write_prime()?;
            }
            self.extrude(distance * extrusion_per_mm);
            let axis = self.dialect.extruder_axis(self.state.extruder);
            e = Some((axis, self.e_word(self.state.extrusion_amount)));
        }

        let z = if !self.state.z_known || target.z != self.state.position.z {
            Some(target.z + self.state.z_hop)
        } else {
            None
        };
        let feedrate = (self.state.speed != Some(speed)).then_some(speed);
        let line = self.dialect.linear_move(&MoveLine {
            extruding,
            feedrate,
            x: to.x,
            y: to.y,
            z,
            e,
        });
        trace!(%line, "move");
        self.write_line(&line)?;

        self.state.speed = Some(speed);
        self.state.position = target;
        self.state.head_offset = offset;
        self.state.z_known = true;
        self.state.start_position = Some(target);
        self.plan_time(speed);
        Ok(())
    }

    /// Retract the filament according to `config`.
    ///
    /// Nothing happens when already retracted. Unless `force` is set, the
    /// request is silently dropped when it would exceed the configured
    /// number of retractions within the extrusion window.
    pub fn write_retraction(&mut self, config: &RetractionConfig, force: bool) -> Result<()> {
        if self.state.retracted || config.amount <= 0.0 {
            return Ok(());
        }
        if !force && self.retraction_limited() {
            debug!(
                extrusion = self.state.extrusion_amount,
                window = self.retraction_extrusion_window,
                "retraction suppressed by frequency limit"
            );
            return Ok(());
        }

        if self.dialect.uses_firmware_retraction() {
            let line = self.dialect.firmware_retract(false);
            self.write_line(&line)?;
            self.plan_time_with_e(
                self.state.e_position - FIRMWARE_RETRACTION_DISTANCE,
                FIRMWARE_RETRACTION_SPEED,
            );
        } else {
            let target = self.state.extrusion_amount - config.amount;
            self.write_extruder_move(target, config.speed)?;
        }
        self.state.prime_speed = config.prime_speed;
        self.state.prime_amount = config.prime_amount;

        if config.z_hop > 0 {
            self.state.z_hop = config.z_hop;
            let line = self.dialect.z_move(self.state.physical_z());
            self.write_line(&line)?;
            if let Some(speed) = self.state.speed {
                self.plan_time(speed);
            }
        }

        self.retraction_window.push(self.state.extrusion_amount);
        self.state.retracted = true;
        self.state.retraction_count += 1;
        self.last_retraction = Some(*config);
        Ok(())
    }

    /// Switch to extruder `new_extruder`.
    ///
    /// Retracts with the extruder-switch settings, runs the outgoing
    /// extruder's post-switch code, selects the new tool and runs its
    /// pre-switch code. The new extruder is primed by the next extruding move.
    pub fn switch_extruder(&mut self, new_extruder: usize) -> Result<()> {
        self.check_extruder(new_extruder)?;
        let old_extruder = self.state.extruder;
        if new_extruder == old_extruder {
            return Ok(());
        }
        debug!(from = old_extruder, to = new_extruder, "switching extruder");

        self.reset_extrusion_value()?;
        if self.dialect.uses_firmware_retraction() {
            let line = self.dialect.firmware_retract(true);
            self.write_line(&line)?;
        } else {
            let target = self.state.extrusion_amount - self.switch_retraction.amount;
            self.write_extruder_move(target, self.switch_retraction.speed)?;
        }
        self.state.retracted = true;
        self.state.prime_speed = self.switch_retraction.prime_speed;
        self.state.prime_amount = 0.0;

        let post = self.extruders[old_extruder].post_switch_code.clone();
        self.write_code(&post)?;

        self.state.extruder = new_extruder;
        if self.dialect.has_axis_per_extruder() {
            let line = self
                .dialect
                .reset_extrusion(new_extruder, self.state.e_position);
            self.write_line(&line)?;
        }
        let line = self.dialect.tool_change(new_extruder);
        self.write_line(&line)?;

        let pre = self.extruders[new_extruder].pre_switch_code.clone();
        self.write_code(&pre)
    }

    /// Reset the E counter to zero with `G92`, shifting the retraction
    /// history along with it. Flavors without `G92` keep counting.
    pub fn reset_extrusion_value(&mut self) -> Result<()> {
        let amount = self.state.extrusion_amount;
        if amount == 0.0 || !self.dialect.supports_extrusion_reset() {
            return Ok(());
        }
        self.retraction_window.shift(-amount);
        self.state.extrusion_amount = 0.0;
        self.state.e_position -= amount;
        if self.dialect.extrusion_mode() == ExtrusionMode::Absolute {
            let line = self
                .dialect
                .reset_extrusion(self.state.extruder, self.state.e_position);
            self.write_line(&line)?;
        }

        let mut position = self.estimator.position();
        position.axis[E_AXIS] = self.state.e_position;
        self.estimator.set_position(position);
        Ok(())
    }

    // ----- machine commands -----

    /// Set (or wait for) the temperature of extruder `extruder`.
    pub fn write_temperature_command(
        &mut self,
        extruder: usize,
        temperature: f64,
        wait: bool,
    ) -> Result<()> {
        self.check_extruder(extruder)?;
        if !wait && self.extruders[extruder].temperature == Some(temperature) {
            return Ok(());
        }
        let target = (extruder != self.state.extruder).then_some(extruder);
        let line = self.dialect.temperature(target, temperature, wait);
        self.write_line(&line)?;
        self.extruders[extruder].temperature = Some(temperature);
        Ok(())
    }

    /// Set (or wait for) the bed temperature.
    pub fn write_bed_temperature_command(&mut self, temperature: f64, wait: bool) -> Result<()> {
        let line = self.dialect.bed_temperature(temperature, wait);
        self.write_line(&line)?;
        self.state.bed_temperature = Some(temperature);
        Ok(())
    }

    /// Set the fan speed in percent; repeated requests for the same speed emit nothing.
    pub fn write_fan_command(&mut self, speed: f64) -> Result<()> {
        if self.state.fan_speed == Some(speed) {
            return Ok(());
        }
        let line = self.dialect.fan(speed);
        self.write_line(&line)?;
        self.state.fan_speed = Some(speed);
        Ok(())
    }

    /// End the program.
    ///
    /// Turns the fan off, retracts (forced, so the limiter cannot skip it, but
    /// never twice) with the last retraction used or the default one, lifts the head to `max_height` when that is above it,
    /// writes `end_code` and flushes the sink.
    pub fn finalize(
        &mut self,
        max_height: Option<Coord>,
        travel_speed: f64,
        end_code: &str,
    ) -> Result<PrintSummary> {
        self.write_fan_command(0.0)?;

        let retraction = self.last_retraction.unwrap_or_default();
        self.write_retraction(&retraction, true)?;

        if let Some(height) = max_height {
            if height > self.state.physical_z() {
                self.state.z_hop = 0;
                let position = self.state.position;
                self.write_travel(Point3::new(position.x, position.y, height), travel_speed)?;
            }
        }

        self.write_code(end_code)?;
        self.update_total_print_time();
        self.sink.flush()?;

        let summary = PrintSummary {
            print_time_seconds: self.total_print_time,
            filament_used: self.extruders.iter().map(|e| e.filament_used).collect(),
        };
        info!(
            print_time = summary.print_time_seconds,
            filament = ?summary.filament_used,
            "G-code finalized"
        );
        Ok(summary)
    }

    // ----- internals -----

    fn check_extruder(&self, index: usize) -> Result<()> {
        if index < self.extruders.len() {
            Ok(())
        } else {
            Err(GcodeError::InvalidExtruder {
                index,
                count: self.extruders.len(),
            })
        }
    }

    fn retraction_limited(&self) -> bool {
        if !self.retraction_window.is_full() {
            return false;
        }
        match self.retraction_window.oldest() {
            Some(oldest) => {
                self.state.extrusion_amount - oldest < self.retraction_extrusion_window
            }
            None => false,
        }
    }

    fn extrude(&mut self, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        self.state.extrusion_amount += amount;
        self.extruders[self.state.extruder].filament_used += amount;
    }

    /// E word for moving the filament to `new_position`, per the extrusion mode.
    fn e_word(&mut self, new_position: f64) -> f64 {
        let value = match self.dialect.extrusion_mode() {
            ExtrusionMode::Absolute => new_position,
            ExtrusionMode::Relative => new_position - self.state.e_position,
        };
        self.state.e_position = new_position;
        value
    }

    fn write_extruder_move(&mut self, new_position: f64, speed: f64) -> Result<()> {
        let extruder = self.state.extruder;
        let value = self.e_word(new_position);
        let line = self.dialect.extruder_move(extruder, value, speed);
        self.write_line(&line)?;
        self.state.speed = Some(speed);
        self.plan_time(speed);
        Ok(())
    }

    fn write_prime(&mut self) -> Result<()> {
        let prime_amount = std::mem::take(&mut self.state.prime_amount);
        self.extrude(prime_amount);
        let prime_speed = self.state.prime_speed;

        if self.dialect.uses_firmware_retraction() {
            let line = self.dialect.firmware_prime();
            self.write_line(&line)?;
            self.plan_time(FIRMWARE_RETRACTION_SPEED);
            if self.state.extrusion_amount > self.state.e_position {
                self.write_extruder_move(self.state.extrusion_amount, prime_speed)?;
            }
        } else {
            self.write_extruder_move(self.state.extrusion_amount, prime_speed)?;
        }
        self.state.retracted = false;

        if self.state.extrusion_amount > EXTRUSION_RESET_THRESHOLD {
            self.reset_extrusion_value()?;
        }
        Ok(())
    }

    fn restore_z_hop(&mut self) -> Result<()> {
        if !self.state.is_z_hopped() {
            return Ok(());
        }
        self.state.z_hop = 0;
        let line = self.dialect.z_move(self.state.position.z);
        self.write_line(&line)?;
        if let Some(speed) = self.state.speed {
            self.plan_time(speed);
        }
        Ok(())
    }

    fn plan_time(&mut self, speed: f64) {
        self.plan_time_with_e(self.state.e_position, speed);
    }

    fn plan_time_with_e(&mut self, e: f64, speed: f64) {
        let head = self.state.head_xy();
        self.estimator.plan(
            Position::new(
                int2mm(head.x),
                int2mm(head.y),
                int2mm(self.state.physical_z()),
                e,
            ),
            speed,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lines(writer: GcodeWriter<Vec<u8>>) -> Vec<String> {
        let bytes = writer.into_inner().unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    fn retraction(amount: f64, z_hop: Coord) -> RetractionConfig {
        RetractionConfig {
            amount,
            speed: 25.0,
            prime_speed: 20.0,
            prime_amount: 0.0,
            z_hop,
        }
    }

    /// Travel to the origin at 0.2 mm, then extrude 10 mm along X at 0.1 mm/mm.
    fn first_line(writer: &mut GcodeWriter<Vec<u8>>) {
        writer.write_travel(Point3::new(0, 0, 200), 150.0).unwrap();
        writer.write_move(Point3::new(10_000, 0, 200), 30.0, 0.1).unwrap();
    }

    #[test]
    fn test_move_format() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        writer.write_move(Point3::new(10_000, 5_000, 200), 30.0, 0.1).unwrap();
        assert_relative_eq!(writer.extrusion_amount(), 1.5, epsilon = 1e-9);
        assert_eq!(
            lines(writer),
            vec![
                "G0 F9000 X0.000 Y0.000 Z0.200",
                "G1 F1800 X10.000 Y0.000 E1.00000",
                "G1 X10.000 Y5.000 E1.50000",
            ]
        );
    }

    #[test]
    fn test_zero_length_move_dropped() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        writer.write_move(Point3::new(10_000, 0, 200), 30.0, 0.1).unwrap();
        writer.write_travel(Point3::new(10_000, 0, 200), 150.0).unwrap();
        assert_relative_eq!(writer.extrusion_amount(), 1.0, epsilon = 1e-9);
        assert_eq!(lines(writer).len(), 2);
    }

    #[test]
    fn test_move_xy_uses_layer_z() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_z(300);
        writer.write_move_xy(Point::new(1_000, 1_000), 100.0, 0.0).unwrap();
        assert_eq!(writer.position_z(), 300);
        assert_eq!(writer.position_xy(), Point::new(1_000, 1_000));
        assert_eq!(lines(writer), vec!["G0 F6000 X1.000 Y1.000 Z0.300"]);
    }

    #[test]
    fn test_retract_and_prime() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        writer.write_retraction(&retraction(4.5, 0), false).unwrap();
        assert!(writer.is_retracted());
        writer.write_travel(Point3::new(20_000, 0, 200), 150.0).unwrap();
        writer.write_move(Point3::new(30_000, 0, 200), 30.0, 0.1).unwrap();
        assert!(!writer.is_retracted());
        assert_eq!(writer.retraction_count(), 1);

        assert_eq!(
            lines(writer)[2..],
            [
                "G1 F1500 E-3.50000",
                "G0 F9000 X20.000 Y0.000",
                "G1 F1200 E1.00000",
                "G1 F1800 X30.000 Y0.000 E2.00000",
            ]
        );
    }

    #[test]
    fn test_retraction_while_retracted_is_ignored() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        writer.write_retraction(&retraction(4.5, 0), false).unwrap();
        writer.write_retraction(&retraction(4.5, 0), false).unwrap();
        writer.write_retraction(&retraction(4.5, 0), true).unwrap();
        assert_eq!(writer.retraction_count(), 1);
        assert_eq!(lines(writer).len(), 3);
    }

    #[test]
    fn test_non_positive_retraction_is_ignored() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        writer.write_retraction(&retraction(0.0, 0), true).unwrap();
        assert!(!writer.is_retracted());
        assert_eq!(lines(writer).len(), 2);
    }

    #[test]
    fn test_forced_retraction_bypasses_limit() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_retraction_settings(14.5, 20.0, 20.0, 100.0, 1);
        first_line(&mut writer);
        writer.write_retraction(&retraction(1.0, 0), false).unwrap();
        writer.write_move(Point3::new(20_000, 0, 200), 30.0, 0.1).unwrap();

        writer.write_retraction(&retraction(1.0, 0), false).unwrap();
        assert!(!writer.is_retracted());
        writer.write_retraction(&retraction(1.0, 0), true).unwrap();
        assert!(writer.is_retracted());
        assert_eq!(writer.retraction_count(), 2);
    }

    #[test]
    fn test_zero_count_disables_limit() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_retraction_settings(14.5, 20.0, 20.0, 100.0, 0);
        writer.write_travel(Point3::new(0, 0, 200), 150.0).unwrap();
        for i in 1..=5 {
            writer.write_move(Point3::new(i * 1_000, 0, 200), 30.0, 0.1).unwrap();
            writer.write_retraction(&retraction(1.0, 0), false).unwrap();
        }
        assert_eq!(writer.retraction_count(), 5);
    }

    #[test]
    fn test_z_hop_travel_and_restore() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        writer.write_retraction(&retraction(4.5, 1_000), false).unwrap();
        assert!(writer.is_z_hopped());
        writer.write_travel(Point3::new(20_000, 0, 200), 150.0).unwrap();
        writer.write_travel(Point3::new(20_000, 0, 400), 150.0).unwrap();
        writer.write_move(Point3::new(30_000, 0, 400), 30.0, 0.1).unwrap();
        assert!(!writer.is_z_hopped());
        assert_eq!(writer.position_z(), 400);

        assert_eq!(
            lines(writer)[2..],
            [
                "G1 F1500 E-3.50000",
                "G1 Z1.200",
                "G0 F9000 X20.000 Y0.000",
                "G0 X20.000 Y0.000 Z1.400",
                "G1 Z0.400",
                "G1 F1200 E1.00000",
                "G1 F1800 X30.000 Y0.000 E2.00000",
            ]
        );
    }

    #[test]
    fn test_coasted_amount_reprimed() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.write_travel(Point3::new(0, 0, 200), 150.0).unwrap();
        writer.set_last_coasted_amount(0.2);
        writer.write_move(Point3::new(10_000, 0, 200), 30.0, 0.1).unwrap();
        writer.write_move(Point3::new(20_000, 0, 200), 30.0, 0.1).unwrap();
        let lines = lines(writer);
        assert_eq!(lines[1], "G1 F1800 X10.000 Y0.000 E1.20000");
        assert_eq!(lines[2], "G1 X20.000 Y0.000 E2.20000");
    }

    #[test]
    fn test_relative_extrusion() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_flavor(GcodeFlavor::RepRap);
        writer.write_header().unwrap();
        first_line(&mut writer);
        writer.write_retraction(&retraction(4.5, 0), false).unwrap();
        writer.write_move(Point3::new(20_000, 0, 200), 30.0, 0.1).unwrap();

        assert_eq!(
            lines(writer),
            vec![
                ";FLAVOR:RepRap",
                "M83 ;relative extrusion mode",
                "G0 F9000 X0.000 Y0.000 Z0.200",
                "G1 F1800 X10.000 Y0.000 E1.00000",
                "G1 F1500 E-4.50000",
                "G1 F1200 E4.50000",
                "G1 F1800 X20.000 Y0.000 E1.00000",
            ]
        );
    }

    #[test]
    fn test_firmware_retraction() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_flavor(GcodeFlavor::UltiGCode);
        assert!(writer.is_volumetric());
        first_line(&mut writer);
        let config = RetractionConfig {
            prime_amount: 0.5,
            ..RetractionConfig::default()
        };
        writer.write_retraction(&config, false).unwrap();
        writer.write_move(Point3::new(20_000, 0, 200), 30.0, 0.1).unwrap();

        assert_eq!(
            lines(writer)[2..],
            [
                "G10",
                "G11",
                "G1 F1500 E1.50000",
                "G1 F1800 X20.000 Y0.000 E2.50000",
            ]
        );
    }

    #[test]
    fn test_switch_extruder() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_extruder_count(2).unwrap();
        writer.set_extruder_offset(1, Point::new(20_000, 0)).unwrap();
        writer
            .set_switch_extruder_code(1, "M117 T1 in", "")
            .unwrap();
        writer.set_switch_extruder_code(0, "", "M117 T0 out").unwrap();
        first_line(&mut writer);
        writer.switch_extruder(1).unwrap();
        assert_eq!(writer.extruder(), 1);
        assert!(writer.is_retracted());
        writer.write_move(Point3::new(20_000, 0, 200), 30.0, 0.1).unwrap();

        // The new nozzle moves from X10 to X40: 30 mm of physical path.
        assert_relative_eq!(writer.total_filament_used(0).unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(writer.total_filament_used(1).unwrap(), 3.0, epsilon = 1e-9);
        assert_eq!(
            lines(writer)[2..],
            [
                "G92 E0",
                "G1 F1200 E-14.50000",
                "M117 T0 out",
                "T1",
                "M117 T1 in",
                "G1 F1200 E0.00000",
                "G1 F1800 X40.000 Y0.000 E3.00000",
            ]
        );
    }

    #[test]
    fn test_switch_to_same_or_invalid_extruder() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.switch_extruder(0).unwrap();
        assert!(matches!(
            writer.switch_extruder(1),
            Err(GcodeError::InvalidExtruder { index: 1, count: 1 })
        ));
        assert!(writer.set_extruder_offset(3, Point::default()).is_err());
        assert!(writer.total_filament_used(1).is_err());
        assert!(writer.set_extruder_count(0).is_err());
        assert!(writer.set_extruder_count(MAX_EXTRUDERS + 1).is_err());
        assert!(lines(writer).is_empty());
    }

    #[test]
    fn test_mach3_axis_per_extruder() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_flavor(GcodeFlavor::Mach3);
        writer.set_extruder_count(2).unwrap();
        first_line(&mut writer);
        writer.switch_extruder(1).unwrap();

        assert_eq!(
            lines(writer)[1..],
            [
                "G1 F1800 X10.000 Y0.000 A1.00000",
                "G92 A0",
                "G1 F1200 A-14.50000",
                "G92 B-14.50000",
                "T1",
            ]
        );
    }

    #[test]
    fn test_makerbot_never_resets() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_flavor(GcodeFlavor::Makerbot);
        writer.set_extruder_count(2).unwrap();
        first_line(&mut writer);
        writer.switch_extruder(1).unwrap();
        assert_relative_eq!(writer.extrusion_amount(), 1.0, epsilon = 1e-9);
        assert_eq!(lines(writer)[2..], ["G1 F1200 E-13.50000", "T1"]);
    }

    #[test]
    fn test_extrusion_reset_after_threshold() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.write_travel(Point3::new(0, 0, 200), 150.0).unwrap();
        writer.write_move(Point3::new(10_000, 0, 200), 30.0, 1001.0).unwrap();
        writer.write_retraction(&retraction(1.0, 0), false).unwrap();
        writer.write_move(Point3::new(20_000, 0, 200), 30.0, 0.1).unwrap();

        assert_relative_eq!(writer.extrusion_amount(), 1.0, epsilon = 1e-9);
        assert_eq!(writer.retraction_window().oldest(), Some(0.0));
        assert_relative_eq!(
            writer.total_filament_used(0).unwrap(),
            10_011.0,
            epsilon = 1e-6
        );
        assert_eq!(
            lines(writer)[2..],
            [
                "G1 F1500 E10009.00000",
                "G1 F1200 E10010.00000",
                "G92 E0",
                "G1 F1800 X20.000 Y0.000 E1.00000",
            ]
        );
    }

    #[test]
    fn test_temperature_commands() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.set_extruder_count(2).unwrap();
        writer.write_temperature_command(0, 210.0, false).unwrap();
        writer.write_temperature_command(0, 210.0, false).unwrap();
        writer.write_temperature_command(0, 210.0, true).unwrap();
        writer.write_temperature_command(1, 200.0, false).unwrap();
        writer.write_bed_temperature_command(60.0, false).unwrap();
        assert_eq!(writer.temperature(1), Some(200.0));
        assert_eq!(writer.bed_temperature(), Some(60.0));
        assert!(writer.write_temperature_command(2, 200.0, false).is_err());

        assert_eq!(
            lines(writer),
            vec!["M104 S210", "M109 S210", "M104 T1 S200", "M140 S60"]
        );
    }

    #[test]
    fn test_fan_only_on_change() {
        let mut writer = GcodeWriter::new(Vec::new());
        assert_eq!(writer.fan_speed(), None);
        writer.write_fan_command(100.0).unwrap();
        writer.write_fan_command(100.0).unwrap();
        writer.write_fan_command(0.0).unwrap();
        assert_eq!(writer.fan_speed(), Some(0.0));
        assert_eq!(lines(writer), vec!["M106 S255", "M107"]);
    }

    #[test]
    fn test_comments_and_code() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.write_layer_comment(3).unwrap();
        writer.write_type_comment("WALL-OUTER").unwrap();
        writer.write_comment("hello").unwrap();
        writer.write_code("").unwrap();
        writer.write_code("M117 a\nM117 b").unwrap();
        assert_eq!(
            lines(writer),
            vec![";LAYER:3", ";TYPE:WALL-OUTER", ";hello", "M117 a", "M117 b"]
        );
    }

    #[test]
    fn test_delay_adds_print_time() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.write_delay(2.0).unwrap();
        assert_relative_eq!(writer.total_print_time(), 2.0);
        writer.reset_total_print_time();
        assert_eq!(writer.total_print_time(), 0.0);
        assert_eq!(lines(writer), vec!["G4 P2000"]);
    }

    #[test]
    fn test_print_time_estimate() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.write_travel(Point3::new(100_000, 0, 0), 10.0).unwrap();
        writer.update_total_print_time();
        assert_relative_eq!(writer.total_print_time(), 10.0, epsilon = 0.1);
        assert!(writer.time_estimator().is_empty());
    }

    #[test]
    fn test_start_position() {
        let mut writer = GcodeWriter::new(Vec::new());
        assert_eq!(writer.start_position_xy(), None);
        first_line(&mut writer);
        assert_eq!(writer.start_position_xy(), Some(Point::new(10_000, 0)));
        writer.reset_start_position();
        assert_eq!(writer.start_position_xy(), None);
    }

    #[test]
    fn test_finalize_retracts_and_lifts() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        let summary = writer.finalize(Some(5_000), 150.0, "M84\nM104 S0").unwrap();
        assert_relative_eq!(summary.filament_used[0], 1.0, epsilon = 1e-9);
        assert!(summary.print_time_seconds > 0.0);

        assert_eq!(
            lines(writer)[2..],
            [
                "M107",
                "G1 F1500 E-3.50000",
                "G0 F9000 X10.000 Y0.000 Z5.000",
                "M84",
                "M104 S0",
            ]
        );
    }

    #[test]
    fn test_finalize_reuses_last_retraction() {
        let mut writer = GcodeWriter::new(Vec::new());
        first_line(&mut writer);
        writer.write_retraction(&retraction(2.0, 0), false).unwrap();
        writer.write_move(Point3::new(20_000, 0, 200), 30.0, 0.1).unwrap();
        writer.finalize(None, 150.0, "").unwrap();

        let lines = lines(writer);
        assert_eq!(lines[lines.len() - 2], "M107");
        assert_eq!(lines[lines.len() - 1], "G1 F1500 E0.00000");
    }

    #[test]
    fn test_set_output_target() {
        let mut writer = GcodeWriter::new(Vec::new());
        writer.write_comment("first").unwrap();
        let first = writer.set_output_target(Vec::new()).unwrap();
        writer.write_comment("second").unwrap();
        assert_eq!(first, b";first\n");
        assert_eq!(lines(writer), vec![";second"]);
    }

    #[test]
    fn test_from_settings() {
        let settings = MachineSettings::ultimaker_original_dual();
        let writer = GcodeWriter::from_settings(Vec::new(), &settings).unwrap();
        assert_eq!(writer.extruder_count(), 2);
        assert_eq!(writer.extruder_offset(1).unwrap(), Point::new(18_000, 0));
        assert_eq!(writer.flavor(), GcodeFlavor::Marlin);

        let mut broken = settings;
        broken.switch_prime_speed = 0.0;
        assert!(GcodeWriter::from_settings(Vec::new(), &broken).is_err());
    }
}
