//! Instrument types and interpretation of package metadata

use serde::{Deserialize, Serialize};

use crate::value_type::ValueTypeCode;

/// Instrument family, derived from the firmware version string
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    EmStatPico,
    EmStat4Lr,
    EmStat4Hr,
    MultiEmStat4Lr,
    MultiEmStat4Hr,
    #[default]
    Unknown,
}

impl DeviceType {
    /// Detect the instrument from the reply to the `t` command
    pub fn from_firmware_version(version: &str) -> Self {
        let version = version.trim_start();
        if version.starts_with("espico") {
            Self::EmStatPico
        } else if version.starts_with("es4_lr") {
            Self::EmStat4Lr
        } else if version.starts_with("es4_hr") {
            Self::EmStat4Hr
        } else if version.starts_with("mes4lr") {
            Self::MultiEmStat4Lr
        } else if version.starts_with("mes4hr") {
            Self::MultiEmStat4Hr
        } else {
            Self::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EmStatPico => "EmStat Pico",
            Self::EmStat4Lr => "EmStat4 LR",
            Self::EmStat4Hr => "EmStat4 HR",
            Self::MultiEmStat4Lr => "MultiEmStat4 LR",
            Self::MultiEmStat4Hr => "MultiEmStat4 HR",
            Self::Unknown => "Unknown device",
        }
    }

    fn is_emstat4(&self) -> bool {
        matches!(
            self,
            Self::EmStat4Lr | Self::EmStat4Hr | Self::MultiEmStat4Lr | Self::MultiEmStat4Hr
        )
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bits of the status metadata entry
pub mod status {
    pub const TIMING_ERROR: u8 = 0x1;
    pub const OVERLOAD: u8 = 0x2;
    pub const UNDERLOAD: u8 = 0x4;
    pub const OVERLOAD_WARNING: u8 = 0x8;
}

/// Human-readable names of the flags set in a status value
pub fn status_flags(status: u8) -> Vec<&'static str> {
    if status == 0 {
        return vec!["OK"];
    }
    [
        (status::TIMING_ERROR, "Timing not met"),
        (status::OVERLOAD, "Overload"),
        (status::UNDERLOAD, "Underload"),
        (status::OVERLOAD_WARNING, "Overload warning"),
    ]
    .into_iter()
    .filter(|(bit, _)| status & bit != 0)
    .map(|(_, name)| name)
    .collect()
}

/// Status flags joined into one string
pub fn status_text(status: u8) -> String {
    status_flags(status).join(", ")
}

/// Human-readable range for a range metadata entry.
///
/// EmStat4 instruments report a potential range for potential and ZImag
/// values, and a current range for everything else.
pub fn range_text(device: DeviceType, code: ValueTypeCode, range: u16) -> Option<&'static str> {
    if device == DeviceType::EmStatPico {
        return pico_current_range(range);
    }
    if device.is_emstat4() {
        if code == ValueTypeCode::POTENTIAL || code == ValueTypeCode::Z_IMAG {
            return emstat4_potential_range(range);
        }
        return emstat4_current_range(range);
    }
    None
}

fn pico_current_range(range: u16) -> Option<&'static str> {
    let text = match range {
        0 => "100 nA",
        1 => "2 uA",
        2 => "4 uA",
        3 => "8 uA",
        4 => "16 uA",
        5 => "32 uA",
        6 => "63 uA",
        7 => "125 uA",
        8 => "250 uA",
        9 => "500 uA",
        10 => "1 mA",
        11 => "5 mA",
        128 => "100 nA (High speed)",
        129 => "1 uA (High speed)",
        130 => "6 uA (High speed)",
        131 => "13 uA (High speed)",
        132 => "25 uA (High speed)",
        133 => "50 uA (High speed)",
        134 => "100 uA (High speed)",
        135 => "200 uA (High speed)",
        136 => "1 mA (High speed)",
        137 => "5 mA (High speed)",
        _ => return None,
    };
    Some(text)
}

fn emstat4_potential_range(range: u16) -> Option<&'static str> {
    let text = match range {
        2 => "50 mV",
        3 => "100 mV",
        4 => "200 mV",
        5 => "500 mV",
        6 => "1 V",
        _ => return None,
    };
    Some(text)
}

fn emstat4_current_range(range: u16) -> Option<&'static str> {
    let text = match range {
        // LR only
        3 => "1 nA",
        6 => "10 nA",
        9 => "100 nA",
        12 => "1 uA",
        15 => "10 uA",
        18 => "100 uA",
        21 => "1 mA",
        24 => "10 mA",
        // HR only
        27 => "100 mA",
        _ => return None,
    };
    Some(text)
}
