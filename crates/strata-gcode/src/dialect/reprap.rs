//! RepRapFirmware dialect.

use super::{Dialect, ExtrusionMode};

/// RepRapFirmware (Duet boards) with relative extrusion.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepRap;

impl Dialect for RepRap {
    fn header_name(&self) -> &'static str {
        "RepRap"
    }

    fn extrusion_mode(&self) -> ExtrusionMode {
        ExtrusionMode::Relative
    }
}
