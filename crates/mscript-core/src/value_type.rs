//! MethodSCRIPT variable types
//!
//! Every field of a data package starts with a two-letter code identifying
//! the physical quantity it carries (e.g. `ba` = WE current). The registry
//! maps those codes to a display name and unit. Lookups never fail: a code
//! this table does not know resolves to [`ValueTypeInfo::UNKNOWN`] so newer
//! firmware keeps working with this host software.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::value::DecodeError;

/// Two-character variable type code (e.g. `ab`, `ba`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueTypeCode([u8; 2]);

impl ValueTypeCode {
    /// Potential, WE/SE vs RE
    pub const POTENTIAL: Self = Self(*b"ab");
    /// WE current
    pub const CURRENT: Self = Self(*b"ba");
    /// Imaginary part of impedance
    pub const Z_IMAG: Self = Self(*b"cd");

    /// Build a code from its two ASCII characters
    pub fn from_bytes(bytes: [u8; 2]) -> Result<Self, DecodeError> {
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            Ok(Self(bytes))
        } else {
            Err(DecodeError::InvalidTypeCode(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        // Constructed from ASCII only
        std::str::from_utf8(&self.0).unwrap_or("??")
    }

    /// Name and unit from the registry
    pub fn info(&self) -> ValueTypeInfo {
        lookup(*self)
    }
}

impl FromStr for ValueTypeCode {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [a, b] => Self::from_bytes([*a, *b]),
            _ => Err(DecodeError::InvalidTypeCode(s.to_string())),
        }
    }
}

impl fmt::Display for ValueTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValueTypeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValueTypeCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Display name and unit of a variable type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValueTypeInfo {
    pub name: &'static str,
    pub unit: &'static str,
}

impl ValueTypeInfo {
    /// Fallback for codes missing from the registry
    pub const UNKNOWN: Self = Self {
        name: "unknown",
        unit: "?",
    };

    const fn new(name: &'static str, unit: &'static str) -> Self {
        Self { name, unit }
    }
}

static REGISTRY: &[(&[u8; 2], ValueTypeInfo)] = &[
    (b"aa", ValueTypeInfo::new("unknown", " ")),
    // Potentials
    (b"ab", ValueTypeInfo::new("WE vs RE potential", "V")),
    (b"ac", ValueTypeInfo::new("CE potential", "V")),
    (b"ad", ValueTypeInfo::new("SE potential", "V")),
    (b"ae", ValueTypeInfo::new("RE potential", "V")),
    (b"af", ValueTypeInfo::new("WE potential", "V")),
    (b"ag", ValueTypeInfo::new("WE vs CE potential", "V")),
    (b"as", ValueTypeInfo::new("AIN0 potential", "V")),
    (b"at", ValueTypeInfo::new("AIN1 potential", "V")),
    (b"au", ValueTypeInfo::new("AIN2 potential", "V")),
    (b"av", ValueTypeInfo::new("AIN3 potential", "V")),
    (b"aw", ValueTypeInfo::new("AIN4 potential", "V")),
    (b"ax", ValueTypeInfo::new("AIN5 potential", "V")),
    (b"ay", ValueTypeInfo::new("AIN6 potential", "V")),
    (b"az", ValueTypeInfo::new("AIN7 potential", "V")),
    // Currents
    (b"ba", ValueTypeInfo::new("WE current", "A")),
    // Impedance
    (b"ca", ValueTypeInfo::new("Phase", "Degrees")),
    (b"cb", ValueTypeInfo::new("Impedance", "Ohm")),
    (b"cc", ValueTypeInfo::new("ZReal", "Ohm")),
    (b"cd", ValueTypeInfo::new("ZImag", "Ohm")),
    (b"ce", ValueTypeInfo::new("EIS E TDD", "V")),
    (b"cf", ValueTypeInfo::new("EIS I TDD", "A")),
    (b"cg", ValueTypeInfo::new("EIS sampling frequency", "Hz")),
    (b"ch", ValueTypeInfo::new("EIS E AC", "Vrms")),
    (b"ci", ValueTypeInfo::new("EIS E DC", "V")),
    (b"cj", ValueTypeInfo::new("EIS I AC", "Arms")),
    (b"ck", ValueTypeInfo::new("EIS I DC", "A")),
    // Applied (set) values
    (b"da", ValueTypeInfo::new("Applied potential", "V")),
    (b"db", ValueTypeInfo::new("Applied current", "A")),
    (b"dc", ValueTypeInfo::new("Applied frequency", "Hz")),
    (b"dd", ValueTypeInfo::new("Applied AC amplitude", "Vrms")),
    // Other
    (b"ea", ValueTypeInfo::new("Channel", " ")),
    (b"eb", ValueTypeInfo::new("Time", "s")),
    (b"ec", ValueTypeInfo::new("Pin mask", " ")),
    (b"ed", ValueTypeInfo::new("Temperature", "degC")),
    // Generic
    (b"ha", ValueTypeInfo::new("Current generic 1", "A")),
    (b"hb", ValueTypeInfo::new("Current generic 2", "A")),
    (b"hc", ValueTypeInfo::new("Current generic 3", "A")),
    (b"hd", ValueTypeInfo::new("Current generic 4", "A")),
    (b"ia", ValueTypeInfo::new("Potential generic 1", "V")),
    (b"ib", ValueTypeInfo::new("Potential generic 2", "V")),
    (b"ic", ValueTypeInfo::new("Potential generic 3", "V")),
    (b"id", ValueTypeInfo::new("Potential generic 4", "V")),
    (b"ja", ValueTypeInfo::new("Misc. generic 1", " ")),
    (b"jb", ValueTypeInfo::new("Misc. generic 2", " ")),
    (b"jc", ValueTypeInfo::new("Misc. generic 3", " ")),
    (b"jd", ValueTypeInfo::new("Misc. generic 4", " ")),
];

/// Look up the name and unit of a variable type code
pub fn lookup(code: ValueTypeCode) -> ValueTypeInfo {
    REGISTRY
        .iter()
        .find(|(c, _)| **c == code.0)
        .map(|(_, info)| *info)
        .unwrap_or(ValueTypeInfo::UNKNOWN)
}

/// Look up a code given as text; malformed codes also resolve to unknown
pub fn lookup_str(code: &str) -> ValueTypeInfo {
    code.parse().map(lookup).unwrap_or(ValueTypeInfo::UNKNOWN)
}
