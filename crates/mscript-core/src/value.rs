//! Measurement value decoding
//!
//! A value token is 8 characters: 7 hex digits holding an offset-binary
//! 28-bit integer, followed by one SI prefix character that scales it.
//! `8000000 ` is zero, `0000000 ` is -2^27.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_type::ValueTypeCode;

/// Offset subtracted from the raw 28-bit value to make it signed
pub const VALUE_OFFSET: i32 = 1 << 27;

/// Token the device sends for a value that is not a number
const NAN_TOKEN: &str = "     nan";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Value token must be 8 characters, got {0:?}")]
    InvalidTokenLength(String),
    #[error("Invalid hex digits in value token {0:?}")]
    InvalidHex(String),
    #[error("Unknown SI prefix {0:?}")]
    UnknownPrefix(char),
    #[error("Invalid variable type code {0:?}")]
    InvalidTypeCode(String),
    #[error("Field too short to hold a value: {0:?}")]
    FieldTooShort(String),
    #[error("Malformed metadata entry {0:?}")]
    InvalidMetadata(String),
}

/// What to do with a prefix character outside the SI table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixPolicy {
    /// Fail with [`DecodeError::UnknownPrefix`]
    #[default]
    Reject,
    /// Decode to NaN (legacy behavior)
    NotANumber,
}

/// SI prefix character scaling a decoded magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiPrefix {
    Atto,
    Femto,
    Pico,
    Nano,
    Micro,
    Milli,
    /// Plain value (space)
    None,
    /// Integer value (`i`); not an SI prefix but scales by 1
    Integer,
    Kilo,
    Mega,
    Giga,
    Tera,
    Peta,
    Exa,
}

impl SiPrefix {
    pub fn from_char(c: char) -> Option<Self> {
        let prefix = match c {
            'a' => Self::Atto,
            'f' => Self::Femto,
            'p' => Self::Pico,
            'n' => Self::Nano,
            'u' => Self::Micro,
            'm' => Self::Milli,
            ' ' => Self::None,
            'i' => Self::Integer,
            'k' => Self::Kilo,
            'M' => Self::Mega,
            'G' => Self::Giga,
            'T' => Self::Tera,
            'P' => Self::Peta,
            'E' => Self::Exa,
            _ => return None,
        };
        Some(prefix)
    }

    pub fn factor(&self) -> f64 {
        match self {
            Self::Atto => 1e-18,
            Self::Femto => 1e-15,
            Self::Pico => 1e-12,
            Self::Nano => 1e-9,
            Self::Micro => 1e-6,
            Self::Milli => 1e-3,
            Self::None | Self::Integer => 1.0,
            Self::Kilo => 1e3,
            Self::Mega => 1e6,
            Self::Giga => 1e9,
            Self::Tera => 1e12,
            Self::Peta => 1e15,
            Self::Exa => 1e18,
        }
    }
}

/// Decoded number from one value token
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodedValue {
    /// Signed magnitude in [-2^27, 2^27 - 1]
    pub raw: i32,
    /// Prefix character as received
    pub prefix: char,
    /// `raw * factor(prefix)`
    pub value: f64,
}

/// Metadata trailing the value token of a field, e.g. `,14,288`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Everything after the value token, untouched
    pub raw: String,
    /// Status bit mask (entry id `1`)
    pub status: Option<u8>,
    /// Range code (entry id `2`)
    pub range: Option<u16>,
}

impl Metadata {
    /// Parse `,<id><hex>` entries. Unknown ids, and trailing text that does
    /// not start with `,`, are kept in `raw` only.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let mut metadata = Metadata {
            raw: raw.to_string(),
            ..Default::default()
        };
        let Some(entries) = raw.strip_prefix(',') else {
            return Ok(metadata);
        };
        for entry in entries.split(',') {
            let mut chars = entry.chars();
            let id = chars.next();
            let digits = chars.as_str();
            match id {
                Some('1') => {
                    let status = u8::from_str_radix(digits, 16)
                        .map_err(|_| DecodeError::InvalidMetadata(entry.to_string()))?;
                    metadata.status = Some(status);
                }
                Some('2') => {
                    let range = u16::from_str_radix(digits, 16)
                        .map_err(|_| DecodeError::InvalidMetadata(entry.to_string()))?;
                    metadata.range = Some(range);
                }
                _ => {}
            }
        }
        Ok(metadata)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// One typed, scaled value of a data package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementValue {
    pub type_code: ValueTypeCode,
    /// Signed magnitude before scaling
    pub raw: i32,
    pub prefix: char,
    /// Scaled value in the unit of `type_code`
    pub value: f64,
    pub metadata: Metadata,
}

/// Decode an 8-character value token (7 hex digits + SI prefix)
pub fn decode(token: &str, policy: PrefixPolicy) -> Result<DecodedValue, DecodeError> {
    if token == NAN_TOKEN {
        return Ok(DecodedValue {
            raw: 0,
            prefix: ' ',
            value: f64::NAN,
        });
    }

    let bytes = token.as_bytes();
    if bytes.len() != 8 || !token.is_ascii() {
        return Err(DecodeError::InvalidTokenLength(token.to_string()));
    }

    // Checked by hand: from_str_radix would accept a leading '+'
    let digits = &token[..7];
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHex(token.to_string()));
    }
    let unsigned =
        u32::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidHex(token.to_string()))?;
    let raw = unsigned as i32 - VALUE_OFFSET;

    let prefix = bytes[7] as char;
    let value = match (SiPrefix::from_char(prefix), policy) {
        (Some(si), _) => raw as f64 * si.factor(),
        (None, PrefixPolicy::NotANumber) => f64::NAN,
        (None, PrefixPolicy::Reject) => return Err(DecodeError::UnknownPrefix(prefix)),
    };

    Ok(DecodedValue { raw, prefix, value })
}

/// Decode a token to its scaled value only
pub fn decode_value(token: &str) -> Result<f64, DecodeError> {
    decode(token, PrefixPolicy::Reject).map(|d| d.value)
}

/// Decode one package field: type code, value token and optional metadata
pub fn decode_field(field: &str, policy: PrefixPolicy) -> Result<MeasurementValue, DecodeError> {
    if field.len() < 10 || !field.is_char_boundary(2) || !field.is_char_boundary(10) {
        return Err(DecodeError::FieldTooShort(field.to_string()));
    }
    let type_code: ValueTypeCode = field[..2].parse()?;
    let decoded = decode(&field[2..10], policy)?;
    let metadata = Metadata::parse(&field[10..])?;

    Ok(MeasurementValue {
        type_code,
        raw: decoded.raw,
        prefix: decoded.prefix,
        value: decoded.value,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1e-30)
    }

    #[test]
    fn test_offset_binary() {
        assert_eq!(decode_value("0800000 ").unwrap(), -125_829_120.0);
        assert_eq!(decode_value("8000000 ").unwrap(), 0.0);
        assert_eq!(decode("0000000 ", PrefixPolicy::Reject).unwrap().raw, -(1 << 27));
        assert_eq!(decode("FFFFFFF ", PrefixPolicy::Reject).unwrap().raw, (1 << 27) - 1);
    }

    #[test]
    fn test_si_scaling() {
        // 0x8000064 = offset + 100
        assert!(approx_eq(decode_value("8000064m").unwrap(), 0.1));
        assert!(approx_eq(decode_value("8000064u").unwrap(), 100e-6));
        assert!(approx_eq(decode_value("8000064k").unwrap(), 100e3));
        assert_eq!(decode_value("8000064i").unwrap(), 100.0);
        // 'a' and 'f' are prefixes here, not hex digits
        assert!(approx_eq(decode_value("8000064a").unwrap(), 100e-18));
        assert!(approx_eq(decode_value("7FFFF9Cf").unwrap(), -100e-15));
    }

    #[test]
    fn test_decode_is_pure() {
        let a = decode("80A1B2Cn", PrefixPolicy::Reject).unwrap();
        let b = decode("80A1B2Cn", PrefixPolicy::Reject).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_prefix() {
        assert_eq!(
            decode_value("8000000x"),
            Err(DecodeError::UnknownPrefix('x'))
        );
        let lenient = decode("8000000x", PrefixPolicy::NotANumber).unwrap();
        assert!(lenient.value.is_nan());
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(matches!(decode_value("80000 "), Err(DecodeError::InvalidTokenLength(_))));
        assert!(matches!(decode_value("80G0000 "), Err(DecodeError::InvalidHex(_))));
        assert!(matches!(decode_value("+800000 "), Err(DecodeError::InvalidHex(_))));
    }

    #[test]
    fn test_nan_token() {
        assert!(decode_value("     nan").unwrap().is_nan());
    }

    #[test]
    fn test_metadata_parsing() {
        let m = Metadata::parse(",14,288").unwrap();
        assert_eq!(m.status, Some(4));
        assert_eq!(m.range, Some(0x88));
        assert_eq!(m.raw, ",14,288");

        // Unknown ids are preserved but not interpreted
        let m = Metadata::parse(",9abc").unwrap();
        assert_eq!(m.status, None);
        assert_eq!(m.raw, ",9abc");

        assert!(Metadata::parse("").unwrap().is_empty());
        assert!(Metadata::parse(",1zz").is_err());

        let m = Metadata::parse(" ").unwrap();
        assert_eq!(m.raw, " ");
        assert_eq!(m.status, None);
    }

    #[test]
    fn test_decode_field() {
        let v = decode_field("ba7FFFF9Cn,10,20B", PrefixPolicy::Reject).unwrap();
        assert_eq!(v.type_code, ValueTypeCode::CURRENT);
        assert_eq!(v.raw, -100);
        assert!(approx_eq(v.value, -100e-9));
        assert_eq!(v.metadata.status, Some(0));
        assert_eq!(v.metadata.range, Some(0x0b));

        assert!(matches!(
            decode_field("ba800", PrefixPolicy::Reject),
            Err(DecodeError::FieldTooShort(_))
        ));
    }
}
