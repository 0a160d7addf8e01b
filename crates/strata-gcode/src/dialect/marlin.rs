//! Marlin-family dialects.

use super::Dialect;

/// Marlin and compatible RepRap firmware.
#[derive(Debug, Clone, Copy, Default)]
pub struct Marlin {
    /// E values in mm³ with firmware retraction.
    pub volumetric: bool,
}

impl Dialect for Marlin {
    fn header_name(&self) -> &'static str {
        if self.volumetric {
            "RepRap (Volumetric)"
        } else {
            "Marlin"
        }
    }

    fn is_volumetric(&self) -> bool {
        self.volumetric
    }

    fn uses_firmware_retraction(&self) -> bool {
        self.volumetric
    }
}

/// Ultimaker 2 firmware.
///
/// Temperatures, retraction lengths and filament diameter live in the
/// printer's material settings, so the program only carries `G10`/`G11`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UltiGCode;

impl Dialect for UltiGCode {
    fn header_name(&self) -> &'static str {
        "UltiGCode"
    }

    fn is_volumetric(&self) -> bool {
        true
    }

    fn uses_firmware_retraction(&self) -> bool {
        true
    }

    fn header(&self) -> Vec<String> {
        vec![format!(";FLAVOR:{}", self.header_name())]
    }
}
