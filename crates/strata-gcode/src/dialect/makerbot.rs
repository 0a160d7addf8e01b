//! Makerbot / Sailfish dialect.

use super::Dialect;

/// Makerbot printers running Sailfish.
///
/// The fan is a plain on/off valve and the firmware has no `G92` on E.
#[derive(Debug, Clone, Copy, Default)]
pub struct Makerbot;

impl Dialect for Makerbot {
    fn header_name(&self) -> &'static str {
        "MakerBot"
    }

    fn supports_extrusion_reset(&self) -> bool {
        false
    }

    fn fan(&self, percent: f64) -> String {
        if percent > 0.0 {
            "M126 T0".into()
        } else {
            "M127 T0".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_valve() {
        assert_eq!(Makerbot.fan(40.0), "M126 T0");
        assert_eq!(Makerbot.fan(0.0), "M127 T0");
        assert!(!Makerbot.supports_extrusion_reset());
    }
}
