//! MethodSCRIPT response line classification and data package parsing
//!
//! Response lines fall into four groups:
//! - `P<field>;<field>...` data packages
//! - `*`, `+`, `-` end of a measurement loop, loop or scan (curve terminators)
//! - an empty line, ending the script output
//! - anything else (echo, version reply, text, error), which carries no data

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::value::{decode_field, DecodeError, MeasurementValue, PrefixPolicy};
use crate::value_type::ValueTypeCode;

/// First character of a data package line
pub const DATA_PACKAGE_ID: char = 'P';

/// Characters that end a curve (measurement loop, loop, scan)
pub const CURVE_TERMINATORS: [char; 3] = ['*', '+', '-'];

/// How a malformed field affects the rest of its line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorPolicy {
    /// The whole line is rejected with the field's error
    #[default]
    AbortLine,
    /// The field is dropped and the remaining fields are kept
    SkipField,
}

/// Whether rows after the first must repeat the curve's type code sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Reject rows whose type codes differ from the first row
    #[default]
    Strict,
    /// Assume every row matches the first one
    Trust,
}

/// Decoding options shared by the parser and the aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub field_errors: FieldErrorPolicy,
    pub unknown_prefix: PrefixPolicy,
    pub schema: SchemaPolicy,
}

/// The decoded values of one `P` line, in field order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataPackage {
    values: Vec<MeasurementValue>,
}

impl DataPackage {
    pub fn new(values: Vec<MeasurementValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[MeasurementValue] {
        &self.values
    }

    pub fn get(&self, column: usize) -> Option<&MeasurementValue> {
        self.values.get(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Type codes of all fields, in order
    pub fn schema(&self) -> Vec<ValueTypeCode> {
        self.values.iter().map(|v| v.type_code).collect()
    }

    /// First value with the given type code
    pub fn find(&self, code: ValueTypeCode) -> Option<&MeasurementValue> {
        self.values.iter().find(|v| v.type_code == code)
    }
}

/// Classified response line
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseLine {
    /// A decoded data package
    Data(DataPackage),
    /// End of a curve; holds the terminator character
    CurveEnd(char),
    /// Empty line: the script has finished
    EndOfOutput,
    /// Any line holding no data (echo, text, device error, ...)
    Other(String),
}

/// Remove the trailing `\n` / `\r\n`
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Whether the line ends the current curve
pub fn is_curve_terminator(line: &str) -> bool {
    line.starts_with(&CURVE_TERMINATORS[..])
}

/// Parses data package lines according to a set of [`ParseOptions`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DataPackageParser {
    options: ParseOptions,
}

impl DataPackageParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Decode a line into a data package.
    ///
    /// Returns `Ok(None)` for lines that are not data packages, and for a
    /// `P` line without any fields.
    pub fn parse(&self, line: &str) -> Result<Option<DataPackage>, DecodeError> {
        let Some(body) = line.strip_prefix(DATA_PACKAGE_ID) else {
            return Ok(None);
        };
        let body = strip_terminator(body);
        if body.is_empty() {
            return Ok(None);
        }

        let mut values = Vec::new();
        for field in body.split(';') {
            match decode_field(field, self.options.unknown_prefix) {
                Ok(value) => values.push(value),
                Err(e) => match self.options.field_errors {
                    FieldErrorPolicy::AbortLine => return Err(e),
                    FieldErrorPolicy::SkipField => {
                        warn!(field = field, error = %e, "Skipping malformed field");
                    }
                },
            }
        }

        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(DataPackage::new(values)))
    }

    /// Classify any response line
    pub fn classify(&self, line: &str) -> Result<ResponseLine, DecodeError> {
        if strip_terminator(line).is_empty() {
            return Ok(ResponseLine::EndOfOutput);
        }
        if let Some(terminator) = line.chars().next().filter(|_| is_curve_terminator(line)) {
            return Ok(ResponseLine::CurveEnd(terminator));
        }
        match self.parse(line)? {
            Some(package) => Ok(ResponseLine::Data(package)),
            None => Ok(ResponseLine::Other(strip_terminator(line).to_string())),
        }
    }
}

/// Parse a line with default options
pub fn parse_data_package(line: &str) -> Result<Option<DataPackage>, DecodeError> {
    DataPackageParser::default().parse(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_data_lines() {
        let parser = DataPackageParser::default();
        assert_eq!(parser.parse("e\n").unwrap(), None);
        assert_eq!(parser.parse("tespico1.2\n").unwrap(), None);
        assert_eq!(parser.parse("\n").unwrap(), None);
        assert_eq!(parser.parse("!0004\n").unwrap(), None);
        assert_eq!(parser.parse("P\n").unwrap(), None);
    }

    #[test]
    fn test_parse_multi_field_package() {
        let package = parse_data_package("Pda7F85E36u;ba48D4DA8p,14,288\n")
            .unwrap()
            .unwrap();
        assert_eq!(package.len(), 2);
        assert_eq!(package.schema(), vec![
            "da".parse::<ValueTypeCode>().unwrap(),
            ValueTypeCode::CURRENT,
        ]);

        let current = package.find(ValueTypeCode::CURRENT).unwrap();
        assert_eq!(current.metadata.status, Some(4));
        assert_eq!(current.metadata.range, Some(0x88));
        assert!(package.get(0).unwrap().metadata.is_empty());
        assert!(package.get(2).is_none());
    }

    #[test]
    fn test_crlf_terminator() {
        let package = parse_data_package("Pba8000064i\r\n").unwrap().unwrap();
        assert_eq!(package.get(0).unwrap().value, 100.0);
    }

    #[test]
    fn test_abort_line_on_bad_field() {
        let result = parse_data_package("Pba8000064i;baXYZ0000 \n");
        assert!(matches!(result, Err(DecodeError::InvalidHex(_))));
    }

    #[test]
    fn test_skip_bad_field() {
        let parser = DataPackageParser::new(ParseOptions {
            field_errors: FieldErrorPolicy::SkipField,
            ..Default::default()
        });
        let package = parser.parse("Pba8000064i;baXYZ0000 \n").unwrap().unwrap();
        assert_eq!(package.len(), 1);

        // Nothing left after skipping: not a package
        assert_eq!(parser.parse("Pba12\n").unwrap(), None);
    }

    #[test]
    fn test_curve_terminators() {
        assert!(is_curve_terminator("*\n"));
        assert!(is_curve_terminator("+"));
        assert!(is_curve_terminator("-\r\n"));
        assert!(!is_curve_terminator("Pba8000000 \n"));
        assert!(!is_curve_terminator(""));
        assert!(!is_curve_terminator(" *"));
    }

    #[test]
    fn test_classify() {
        let parser = DataPackageParser::default();
        assert_eq!(parser.classify("\n").unwrap(), ResponseLine::EndOfOutput);
        assert_eq!(parser.classify("*\n").unwrap(), ResponseLine::CurveEnd('*'));
        assert_eq!(parser.classify("+\n").unwrap(), ResponseLine::CurveEnd('+'));
        assert_eq!(parser.classify("-\n").unwrap(), ResponseLine::CurveEnd('-'));
        assert_eq!(parser.classify("M0000\n").unwrap(), ResponseLine::Other("M0000".to_string()));
        assert!(matches!(parser.classify("Pba8000000 \n").unwrap(), ResponseLine::Data(_)));
    }
}
