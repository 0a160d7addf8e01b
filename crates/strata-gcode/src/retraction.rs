//! Retraction and coasting parameters, and the retraction history window.

use serde::{Deserialize, Serialize};

use crate::units::Coord;

/// One retraction policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetractionConfig {
    /// Filament pulled back (mm).
    pub amount: f64,
    /// Retraction speed (mm/s).
    pub speed: f64,
    /// Speed of the un-retract (mm/s).
    pub prime_speed: f64,
    /// Extra material pushed after un-retracting (mm).
    pub prime_amount: f64,
    /// Head lift during the retracted travel (µm); 0 disables z-hop.
    pub z_hop: Coord,
}

impl Default for RetractionConfig {
    fn default() -> Self {
        Self {
            amount: 4.5,
            speed: 25.0,
            prime_speed: 25.0,
            prime_amount: 0.0,
            z_hop: 0,
        }
    }
}

/// Coasting thresholds. The decision to coast is made upstream; the writer
/// only receives the coasted amount to re-prime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoastingConfig {
    /// Whether coasting is enabled.
    pub enabled: bool,
    /// Volume coasted before a plain travel (mm³).
    pub volume_move: f64,
    /// Speed while coasting before a travel, relative to the path speed (%).
    pub speed_move: f64,
    /// Minimal extrusion volume of a path before it may coast before a travel (mm³).
    pub min_volume_move: f64,
    /// Volume coasted before a retraction (mm³).
    pub volume_retract: f64,
    /// Speed while coasting before a retraction (%).
    pub speed_retract: f64,
    /// Minimal extrusion volume of a path before it may coast before a retraction (mm³).
    pub min_volume_retract: f64,
}

impl Default for CoastingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            volume_move: 0.064,
            speed_move: 90.0,
            min_volume_move: 0.8,
            volume_retract: 0.064,
            speed_retract: 90.0,
            min_volume_retract: 0.8,
        }
    }
}

impl CoastingConfig {
    /// Volume to coast before a travel for a path that extrudes `path_volume` mm³.
    ///
    /// Paths below the minimal volume coast proportionally less.
    pub fn effective_volume_move(&self, path_volume: f64) -> f64 {
        Self::effective_volume(self.enabled, self.volume_move, self.min_volume_move, path_volume)
    }

    /// Volume to coast before a retraction for a path that extrudes `path_volume` mm³.
    pub fn effective_volume_retract(&self, path_volume: f64) -> f64 {
        Self::effective_volume(
            self.enabled,
            self.volume_retract,
            self.min_volume_retract,
            path_volume,
        )
    }

    fn effective_volume(enabled: bool, volume: f64, min_volume: f64, path_volume: f64) -> f64 {
        if !enabled || path_volume <= 0.0 {
            return 0.0;
        }
        let min_volume = min_volume.max(volume);
        if path_volume < min_volume {
            volume * path_volume / min_volume
        } else {
            volume
        }
    }
}

/// Extrusion amounts recorded at the most recent retractions.
///
/// Fixed-capacity ring buffer allocated once; pushing into a full window
/// evicts the oldest snapshot.
#[derive(Debug, Clone)]
pub struct RetractionWindow {
    slots: Box<[f64]>,
    head: usize,
    len: usize,
}

impl RetractionWindow {
    /// Create a window holding up to `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of snapshots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of snapshots held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no snapshot is held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when another push would evict a snapshot.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Oldest snapshot still held.
    pub fn oldest(&self) -> Option<f64> {
        if self.len == 0 {
            None
        } else {
            Some(self.slots[self.head])
        }
    }

    /// Record a snapshot, evicting the oldest one when full.
    pub fn push(&mut self, amount: f64) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        let tail = (self.head + self.len) % capacity;
        self.slots[tail] = amount;
        if self.len == capacity {
            self.head = (self.head + 1) % capacity;
        } else {
            self.len += 1;
        }
    }

    /// Shift every snapshot by `delta`, used when the extrusion counter is reset.
    pub fn shift(&mut self, delta: f64) {
        let capacity = self.capacity();
        for i in 0..self.len {
            self.slots[(self.head + i) % capacity] += delta;
        }
    }

    /// Forget every snapshot.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Snapshots from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let capacity = self.capacity();
        (0..self.len).map(move |i| self.slots[(self.head + i) % capacity])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = RetractionWindow::new(3);
        assert!(window.oldest().is_none());
        for amount in [1.0, 2.0, 3.0] {
            window.push(amount);
        }
        assert!(window.is_full());
        assert_eq!(window.oldest(), Some(1.0));

        window.push(4.0);
        assert_eq!(window.len(), 3);
        assert_eq!(window.oldest(), Some(2.0));
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_window_shift() {
        let mut window = RetractionWindow::new(2);
        window.push(10.0);
        window.push(12.0);
        window.push(15.0);
        window.shift(-15.0);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![-3.0, 0.0]);
    }

    #[test]
    fn test_zero_capacity_window() {
        let mut window = RetractionWindow::new(0);
        window.push(1.0);
        assert!(window.is_empty());
        assert!(window.is_full());
    }

    #[test]
    fn test_coasting_volume() {
        let coasting = CoastingConfig {
            enabled: true,
            volume_move: 0.1,
            min_volume_move: 1.0,
            ..Default::default()
        };
        assert_relative_eq!(coasting.effective_volume_move(2.0), 0.1);
        assert_relative_eq!(coasting.effective_volume_move(0.5), 0.05);
        assert_eq!(coasting.effective_volume_move(0.0), 0.0);

        let disabled = CoastingConfig::default();
        assert_eq!(disabled.effective_volume_retract(5.0), 0.0);
    }
}
