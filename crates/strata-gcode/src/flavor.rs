//! G-code flavor definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dialect::{self, Dialect};
use crate::error::GcodeError;

/// G-code flavor (dialect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcodeFlavor {
    /// Marlin and other RepRap-style firmware with absolute E in mm of filament.
    #[default]
    Marlin,
    /// Marlin with volumetric E (mm³) and firmware retraction.
    MarlinVolumetric,
    /// Ultimaker 2 firmware: volumetric E, retraction handled by `G10`/`G11`.
    #[serde(rename = "ultigcode")]
    UltiGCode,
    /// Makerbot / Sailfish: no `G92` resets, on/off fan.
    Makerbot,
    /// Mach3 CNC controllers: one rotary axis letter per extruder.
    Mach3,
    /// RepRapFirmware (Duet) with relative extrusion.
    #[serde(rename = "reprap")]
    RepRap,
}

impl GcodeFlavor {
    /// Every supported flavor.
    pub const ALL: [GcodeFlavor; 6] = [
        GcodeFlavor::Marlin,
        GcodeFlavor::MarlinVolumetric,
        GcodeFlavor::UltiGCode,
        GcodeFlavor::Makerbot,
        GcodeFlavor::Mach3,
        GcodeFlavor::RepRap,
    ];

    /// Configuration name of this flavor.
    pub fn name(&self) -> &'static str {
        match self {
            GcodeFlavor::Marlin => "marlin",
            GcodeFlavor::MarlinVolumetric => "marlin_volumetric",
            GcodeFlavor::UltiGCode => "ultigcode",
            GcodeFlavor::Makerbot => "makerbot",
            GcodeFlavor::Mach3 => "mach3",
            GcodeFlavor::RepRap => "reprap",
        }
    }

    /// The emitter for this flavor.
    pub fn dialect(&self) -> &'static dyn Dialect {
        dialect::for_flavor(*self)
    }

    /// Are E values in mm³ rather than mm of filament?
    pub fn is_volumetric(&self) -> bool {
        self.dialect().is_volumetric()
    }

    /// Does the firmware retract on its own (`G10`/`G11`)?
    pub fn uses_firmware_retraction(&self) -> bool {
        self.dialect().uses_firmware_retraction()
    }
}

impl fmt::Display for GcodeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GcodeFlavor {
    type Err = GcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "marlin" => Ok(GcodeFlavor::Marlin),
            "marlin_volumetric" | "reprap_volumetric" => Ok(GcodeFlavor::MarlinVolumetric),
            "ultigcode" | "ultimaker2" => Ok(GcodeFlavor::UltiGCode),
            "makerbot" | "sailfish" => Ok(GcodeFlavor::Makerbot),
            "mach3" => Ok(GcodeFlavor::Mach3),
            "reprap" | "reprapfirmware" | "duet" => Ok(GcodeFlavor::RepRap),
            _ => Err(GcodeError::UnknownFlavor(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for flavor in GcodeFlavor::ALL {
            assert_eq!(flavor.name().parse::<GcodeFlavor>().unwrap(), flavor);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("Duet".parse::<GcodeFlavor>().unwrap(), GcodeFlavor::RepRap);
        assert_eq!(
            "RepRap-Volumetric".parse::<GcodeFlavor>().unwrap(),
            GcodeFlavor::MarlinVolumetric
        );
        assert!(matches!(
            "bfb".parse::<GcodeFlavor>(),
            Err(GcodeError::UnknownFlavor(_))
        ));
    }

    #[test]
    fn test_serde_names_match_display() {
        for flavor in GcodeFlavor::ALL {
            let json = serde_json::to_string(&flavor).unwrap();
            assert_eq!(json, format!("\"{}\"", flavor));
        }
    }

    #[test]
    fn test_capabilities() {
        assert!(!GcodeFlavor::Marlin.is_volumetric());
        assert!(GcodeFlavor::UltiGCode.is_volumetric());
        assert!(GcodeFlavor::UltiGCode.uses_firmware_retraction());
        assert!(!GcodeFlavor::RepRap.uses_firmware_retraction());
    }
}
