//! Mach3 dialect.

use super::Dialect;

/// Mach3 CNC controller driving extruders as rotary axes `A`, `B`, `C`, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct Mach3;

impl Dialect for Mach3 {
    fn header_name(&self) -> &'static str {
        "Mach3"
    }

    fn extruder_axis(&self, extruder: usize) -> char {
        // Clamped to Z.
        let offset = extruder.min(25) as u8;
        (b'A' + offset) as char
    }

    fn has_axis_per_extruder(&self) -> bool {
        true
    }

    fn header(&self) -> Vec<String> {
        vec![format!(";FLAVOR:{}", self.header_name())]
    }
}
