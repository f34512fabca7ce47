//! Chip families and the baud-rate policy that depends on them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Baud rates the stub may be switched to.
pub const BAUD_RATES: [u32; 4] = [115_200, 230_400, 460_800, 921_600];

/// Rate the ROM bootloader talks at before any negotiation.
pub const ROM_BAUD: u32 = 115_200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChipFamily {
    #[serde(rename = "ESP32")]
    Esp32,
    #[serde(rename = "ESP32-S2")]
    Esp32S2,
    #[serde(rename = "ESP32-S3")]
    Esp32S3,
    #[serde(rename = "ESP32-C3")]
    Esp32C3,
    #[serde(rename = "ESP32-C6")]
    Esp32C6,
    #[serde(rename = "ESP32-H2")]
    Esp32H2,
    #[serde(rename = "ESP8266")]
    Esp8266,
}

impl ChipFamily {
    pub fn all() -> &'static [ChipFamily] {
        &[
            ChipFamily::Esp32,
            ChipFamily::Esp32S2,
            ChipFamily::Esp32S3,
            ChipFamily::Esp32C3,
            ChipFamily::Esp32C6,
            ChipFamily::Esp32H2,
            ChipFamily::Esp8266,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChipFamily::Esp32 => "ESP32",
            ChipFamily::Esp32S2 => "ESP32-S2",
            ChipFamily::Esp32S3 => "ESP32-S3",
            ChipFamily::Esp32C3 => "ESP32-C3",
            ChipFamily::Esp32C6 => "ESP32-C6",
            ChipFamily::Esp32H2 => "ESP32-H2",
            ChipFamily::Esp8266 => "ESP8266",
        }
    }

    /// Identifier used on the esptool command line (`--chip`).
    pub fn esptool_id(&self) -> &'static str {
        match self {
            ChipFamily::Esp32 => "esp32",
            ChipFamily::Esp32S2 => "esp32s2",
            ChipFamily::Esp32S3 => "esp32s3",
            ChipFamily::Esp32C3 => "esp32c3",
            ChipFamily::Esp32C6 => "esp32c6",
            ChipFamily::Esp32H2 => "esp32h2",
            ChipFamily::Esp8266 => "esp8266",
        }
    }

    /// Resolve a family from a reported chip name such as `ESP32-S3 (QFN56)`
    /// or `ESP32-D0WD-V3`.
    ///
    /// Matching is case-insensitive, ignores `-`/`_`, and picks the longest
    /// family id the name starts with, so package suffixes do not matter.
    pub fn from_chip_name(name: &str) -> Option<ChipFamily> {
        let normalized: String = name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        ChipFamily::all()
            .iter()
            .copied()
            .filter(|family| normalized.starts_with(family.esptool_id()))
            .max_by_key(|family| family.esptool_id().len())
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Console warning when an original ESP32 is asked for a faster link.
pub const ESP32_BAUD_WARNING: &str =
    "WARNING: ESP32 is having issues working at speeds faster than 115200. Continuing at 115200 for now...";

/// Decide which rate to switch the stub to, if any.
///
/// Returns `None` when the link should stay at the ROM rate: the request is
/// already the default, the rate is not one we allow, or the chip is an
/// original ESP32 (unstable above 115200).
pub fn negotiated_baud(chip: ChipFamily, requested: u32) -> Option<u32> {
    if requested == ROM_BAUD || chip == ChipFamily::Esp32 || !BAUD_RATES.contains(&requested) {
        return None;
    }
    Some(requested)
}
