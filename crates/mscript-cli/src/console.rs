//! Console output: `--verbose` protocol echo and result formatting

use mscript_core::curve::ResultSet;
use mscript_core::device::{range_text, status_text, DeviceType};
use mscript_core::firmware::UploadState;
use mscript_core::observer::{ProtocolObserver, TracingObserver};
use mscript_core::package::DataPackage;
use mscript_core::value::MeasurementValue;

/// Prints every line sent and received, decoded packages and upload
/// progress to stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleObserver;

impl ProtocolObserver for ConsoleObserver {
    fn line_sent(&mut self, line: &str) {
        eprintln!("> {}", line.trim_end());
    }

    fn line_received(&mut self, line: &str) {
        eprintln!("< {}", line.trim_end());
    }

    fn package_decoded(&mut self, curve: usize, package: &DataPackage) {
        eprintln!("  [curve {}] {}", curve, format_package(package, DeviceType::Unknown));
    }

    fn upload_state(&mut self, state: &UploadState) {
        match state {
            UploadState::Uploading { chunk, total } => {
                eprintln!("  chunk {}/{}", chunk + 1, total)
            }
            other => eprintln!("  {:?}", other),
        }
    }
}

/// Observer for a component: console echo with `--verbose`, tracing otherwise
pub fn observer(verbose: bool) -> Box<dyn ProtocolObserver> {
    if verbose {
        Box::new(ConsoleObserver)
    } else {
        Box::new(TracingObserver)
    }
}

/// `name = value unit`, followed by status and range when present
pub fn format_value(value: &MeasurementValue, device: DeviceType) -> String {
    let info = value.type_code.info();
    let mut text = format!("{} = {:.6e} {}", info.name, value.value, info.unit);

    let mut extras = Vec::new();
    if let Some(status) = value.metadata.status {
        extras.push(format!("status: {}", status_text(status)));
    }
    if let Some(range) = value.metadata.range {
        match range_text(device, value.type_code, range) {
            Some(range) => extras.push(format!("range: {}", range)),
            None => extras.push(format!("range: 0x{:x}", range)),
        }
    }
    if !extras.is_empty() {
        text.push_str(&format!(" ({})", extras.join(", ")));
    }
    text
}

pub fn format_package(package: &DataPackage, device: DeviceType) -> String {
    package
        .values()
        .iter()
        .map(|v| format_value(v, device))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One block per curve, one line per package
pub fn format_results(results: &ResultSet, device: DeviceType) -> String {
    let mut out = String::new();
    for (index, curve) in results.curves().iter().enumerate() {
        out.push_str(&format!("Curve {} ({} packages)\n", index, curve.len()));
        for (row, package) in curve.rows().iter().enumerate() {
            out.push_str(&format!("  {:>4}: {}\n", row, format_package(package, device)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mscript_core::curve::aggregate;
    use mscript_core::package::{parse_data_package, ParseOptions};

    #[test]
    fn test_format_value_with_metadata() {
        let package = parse_data_package("Pba8000064n,14,288\n").unwrap().unwrap();
        let text = format_value(&package.values()[0], DeviceType::EmStatPico);
        assert_eq!(
            text,
            "WE current = 1.000000e-7 A (status: Underload, range: 1 mA (High speed))"
        );
    }

    #[test]
    fn test_unknown_range_is_shown_raw() {
        let package = parse_data_package("Pba8000064n,203\n").unwrap().unwrap();
        let text = format_value(&package.values()[0], DeviceType::Unknown);
        assert!(text.ends_with("(range: 0x3)"));
    }

    #[test]
    fn test_format_results() {
        let results = aggregate(
            ["Pda8000001 ;ba8000002 \n", "*\n", "Pda8000003 ;ba8000004 \n", "\n"],
            ParseOptions::default(),
        )
        .unwrap();
        let text = format_results(&results, DeviceType::Unknown);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Curve 0 (1 packages)");
        assert!(lines[1].contains("; WE current = 2.000000e0 A"));
        assert_eq!(lines[2], "Curve 1 (1 packages)");
    }
}
