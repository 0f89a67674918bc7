//! Grouping of data packages into curves
//!
//! A script run produces a [`ResultSet`]: curves of rows of values. Curves are
//! separated in the response stream by terminator lines (`*`, `+`, `-`).
//! A curve is only allocated once it receives its first data package, so a
//! loop that produced no data leaves no empty curve behind.

use serde::Serialize;
use thiserror::Error;

use crate::observer::{ProtocolObserver, TracingObserver};
use crate::package::{DataPackage, DataPackageParser, ParseOptions, ResponseLine, SchemaPolicy};
use crate::value::{DecodeError, MeasurementValue};
use crate::value_type::ValueTypeCode;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("Malformed data package on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: DecodeError,
    },
    #[error(
        "Row {row} of curve {curve} has columns {found:?}, expected {expected:?} (line {line})"
    )]
    SchemaMismatch {
        line: usize,
        curve: usize,
        row: usize,
        expected: Vec<ValueTypeCode>,
        found: Vec<ValueTypeCode>,
    },
}

/// One measurement run's worth of data packages
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Curve {
    schema: Vec<ValueTypeCode>,
    rows: Vec<DataPackage>,
}

impl Curve {
    fn start(first: DataPackage) -> Self {
        Self {
            schema: first.schema(),
            rows: vec![first],
        }
    }

    /// Column type codes, taken from the first row
    pub fn schema(&self) -> &[ValueTypeCode] {
        &self.schema
    }

    pub fn rows(&self) -> &[DataPackage] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&DataPackage> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Scaled values of one column. `None` if the curve has no such column
    /// or a row is too short to hold it.
    pub fn column(&self, column: usize) -> Option<Vec<f64>> {
        if column >= self.schema.len() {
            return None;
        }
        self.rows
            .iter()
            .map(|row| row.get(column).map(|v| v.value))
            .collect()
    }

    /// Values of the first column with the given type code
    pub fn column_by_type(&self, code: ValueTypeCode) -> Option<Vec<f64>> {
        let column = self.schema.iter().position(|c| *c == code)?;
        self.column(column)
    }

    /// Value at `(row, column)`
    pub fn value(&self, row: usize, column: usize) -> Option<&MeasurementValue> {
        self.rows.get(row)?.get(column)
    }
}

/// All curves of one script execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    curves: Vec<Curve>,
}

impl ResultSet {
    pub fn curves(&self) -> &[Curve] {
        &self.curves
    }

    pub fn curve(&self, index: usize) -> Option<&Curve> {
        self.curves.get(index)
    }

    pub fn curve_count(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Total number of data packages over all curves
    pub fn package_count(&self) -> usize {
        self.curves.iter().map(Curve::len).sum()
    }

    /// A column concatenated over all curves
    pub fn column(&self, column: usize) -> Option<Vec<f64>> {
        let mut values = Vec::new();
        for curve in &self.curves {
            values.extend(curve.column(column)?);
        }
        Some(values)
    }
}

/// Builds a [`ResultSet`] from response lines, one line at a time
pub struct CurveAggregator {
    parser: DataPackageParser,
    observer: Box<dyn ProtocolObserver>,
    results: ResultSet,
    /// The next package opens a new curve
    new_curve_pending: bool,
    lines_seen: usize,
    finished: bool,
}

impl CurveAggregator {
    pub fn new(options: ParseOptions) -> Self {
        Self::with_observer(options, Box::new(TracingObserver))
    }

    pub fn with_observer(options: ParseOptions, observer: Box<dyn ProtocolObserver>) -> Self {
        Self {
            parser: DataPackageParser::new(options),
            observer,
            results: ResultSet::default(),
            new_curve_pending: true,
            lines_seen: 0,
            finished: false,
        }
    }

    /// Feed one response line. Returns the classified line so the caller can
    /// react to non-data lines (errors, end of output).
    ///
    /// On error the curves collected so far stay available through
    /// [`CurveAggregator::results`].
    pub fn push_line(&mut self, line: &str) -> Result<ResponseLine, AggregateError> {
        self.lines_seen += 1;
        let line_no = self.lines_seen;

        let classified = self
            .parser
            .classify(line)
            .map_err(|source| AggregateError::Decode {
                line: line_no,
                source,
            })?;

        match &classified {
            ResponseLine::CurveEnd(_) => self.new_curve_pending = true,
            ResponseLine::Data(package) => self.add_package(line_no, package.clone())?,
            ResponseLine::EndOfOutput => self.finished = true,
            ResponseLine::Other(_) => {}
        }
        Ok(classified)
    }

    fn add_package(&mut self, line: usize, package: DataPackage) -> Result<(), AggregateError> {
        if self.new_curve_pending || self.results.curves.is_empty() {
            self.results.curves.push(Curve::start(package));
            self.new_curve_pending = false;
        } else {
            let curve_index = self.results.curves.len() - 1;
            let curve = &mut self.results.curves[curve_index];
            if self.parser.options().schema == SchemaPolicy::Strict {
                let found = package.schema();
                if found != curve.schema {
                    return Err(AggregateError::SchemaMismatch {
                        line,
                        curve: curve_index,
                        row: curve.rows.len(),
                        expected: curve.schema.clone(),
                        found,
                    });
                }
            }
            curve.rows.push(package);
        }

        let curve_index = self.results.curves.len() - 1;
        if let Some(row) = self.results.curves[curve_index].rows.last() {
            self.observer.package_decoded(curve_index, row);
        }
        Ok(())
    }

    /// Whether the empty line ending the output has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Curves collected so far
    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn into_results(self) -> ResultSet {
        self.results
    }
}

/// Aggregate a captured response. Lines after the terminating empty line
/// are ignored.
pub fn aggregate<I, S>(lines: I, options: ParseOptions) -> Result<ResultSet, AggregateError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut aggregator = CurveAggregator::new(options);
    for line in lines {
        aggregator.push_line(line.as_ref())?;
        if aggregator.is_finished() {
            break;
        }
    }
    Ok(aggregator.into_results())
}
