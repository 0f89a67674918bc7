//! MethodSCRIPT CLI - Main entry point
//!
//! Uploads firmware, runs scripts and queries MethodSCRIPT instruments over
//! a serial port.

mod config;
mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mscript_core::curve::{aggregate, CurveAggregator, ResultSet};
use mscript_core::device::DeviceType;
use mscript_serial::{
    available_ports, BootloaderUploader, Instrument, Script, ScriptError, ScriptTransmitter,
    SerialTransport,
};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::console::{format_results, observer};

#[derive(Parser, Debug)]
#[command(name = "mscript")]
#[command(about = "Firmware upload and MethodSCRIPT execution for electrochemical instruments")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mscript.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Serial port (overrides the configuration)
    #[arg(short, long)]
    port: Option<String>,

    /// Print every line sent to and received from the device
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a firmware binary through the bootloader
    Upload {
        /// Firmware image
        binary: PathBuf,
    },
    /// Run a MethodSCRIPT and print its results
    Run {
        /// Script file
        script: PathBuf,
        /// Print the result set as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a captured device response offline
    Parse {
        /// Response file
        file: PathBuf,
        /// Instrument the response came from (espico, es4_lr, es4_hr, mes4lr, mes4hr)
        #[arg(long, value_parser = parse_device)]
        device: Option<DeviceType>,
        /// Print the result set as JSON
        #[arg(long)]
        json: bool,
    },
    /// Query the instrument's versions and serial number
    Info,
    /// List serial ports
    Ports,
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_device(name: &str) -> Result<DeviceType, String> {
    match DeviceType::from_firmware_version(name) {
        DeviceType::Unknown => Err(format!("unknown device {:?}", name)),
        device => Ok(device),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Command::InitConfig { force } = args.command {
        if args.config.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                args.config.display()
            );
        }
        config::save_default_config(&args.config)?;
        println!("Wrote {}", args.config.display());
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;
    if let Some(port) = args.port {
        config.serial.port = Some(port);
    }
    let verbose = args.verbose;

    match args.command {
        Command::Upload { binary } => {
            let image = tokio::fs::read(&binary)
                .await
                .with_context(|| format!("Failed to read {}", binary.display()))?;
            info!(path = %binary.display(), bytes = image.len(), "Uploading firmware");
            let report = blocking(move || {
                let transport = SerialTransport::open(&config.bootloader_settings())?;
                let mut uploader = BootloaderUploader::with_observer(
                    transport,
                    config.upload_options(),
                    observer(verbose),
                );
                Ok(uploader.upload(&image)?)
            })
            .await?;
            println!(
                "Upload complete: {} bytes in {} chunks",
                report.bytes, report.chunks
            );
        }
        Command::Run { script, json } => {
            let script = Script::from_file(&script)?;
            let outcome = blocking(move || run_script(&config, &script, verbose)).await?;
            print_results(&outcome.results, outcome.device, json)?;
            if let Some(e) = outcome.error {
                return Err(e.into());
            }
        }
        Command::Parse { file, device, json } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let results = aggregate(content.split_inclusive('\n'), config.parser)?;
            print_results(&results, device.unwrap_or_default(), json)?;
        }
        Command::Info => {
            let info = blocking(move || {
                let transport = SerialTransport::open(&config.serial_settings())?;
                let mut instrument = Instrument::with_observer(transport, observer(verbose))
                    .with_timeout(config.read_timeout());
                Ok(instrument.info()?)
            })
            .await?;
            println!("Device:              {}", info.device_type);
            println!("Firmware version:    {}", info.firmware_version);
            println!("MethodSCRIPT version: {}", info.mscript_version.trim());
            println!("Serial number:       {}", info.serial_number.trim());
        }
        Command::Ports => {
            let ports = available_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}\t{}", port.name, port.description);
            }
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

/// Run a blocking device session on the blocking pool. Ctrl-C abandons the
/// session; exiting closes the port.
async fn blocking<F, R>(session: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    let task = tokio::task::spawn_blocking(session);
    tokio::select! {
        result = task => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning device session");
            std::process::exit(130);
        }
    }
}

struct RunOutcome {
    device: DeviceType,
    results: ResultSet,
    /// Set when the run failed after collecting `results`
    error: Option<ScriptError>,
}

fn run_script(config: &Config, script: &Script, verbose: bool) -> Result<RunOutcome> {
    let mut transport = SerialTransport::open(&config.serial_settings())?;

    let version = Instrument::with_observer(&mut transport, observer(verbose))
        .with_timeout(config.read_timeout())
        .firmware_version()
        .context("Device did not answer the version query")?;
    let device = DeviceType::from_firmware_version(&version);
    if device == DeviceType::Unknown {
        warn!(version = %version, "Unrecognized device");
    } else {
        info!(device = %device, version = %version, "Connected");
    }

    let mut transmitter = ScriptTransmitter::with_observer(&mut transport, observer(verbose));
    let mut aggregator = CurveAggregator::with_observer(config.parser, observer(verbose));
    transmitter.send_script(script)?;
    let error = transmitter
        .collect(&mut aggregator, config.read_timeout())
        .err();
    if let Some(e) = &error {
        warn!(
            error = %e,
            packages = aggregator.results().package_count(),
            "Script run failed, results are incomplete"
        );
    }

    Ok(RunOutcome {
        device,
        results: aggregator.into_results(),
        error,
    })
}

fn print_results(results: &ResultSet, device: DeviceType, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else if results.is_empty() {
        println!("No data");
    } else {
        print!("{}", format_results(results, device));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_device() {
        assert_eq!(parse_device("espico"), Ok(DeviceType::EmStatPico));
        assert_eq!(parse_device("mes4hr"), Ok(DeviceType::MultiEmStat4Hr));
        assert!(parse_device("pico").is_err());
    }

    #[test]
    fn test_parse_captured_response() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "e\r\nM0000\r\nPda8000001 ;ba8000064n,10,288\r\n*\r\nPda8000002 ;ba8000065n\r\n*\r\n\r\n"
        )
        .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let results =
            aggregate(content.split_inclusive('\n'), Config::default().parser).unwrap();
        assert_eq!(results.curve_count(), 2);
        assert_eq!(results.column(0), Some(vec![1.0, 2.0]));

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["curves"][0]["rows"][0][1]["metadata"]["range"], 0x88);
        assert_eq!(json["curves"][1]["rows"][0][0]["type_code"], "da");
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["mscript", "--port", "/dev/ttyACM0", "run", "cv.mscr", "--json"])
            .unwrap();
        assert_eq!(args.port.as_deref(), Some("/dev/ttyACM0"));
        assert!(matches!(args.command, Command::Run { json: true, .. }));

        let args = Args::try_parse_from(["mscript", "parse", "out.txt", "--device", "es4_lr"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Parse { device: Some(DeviceType::EmStat4Lr), .. }
        ));
    }
}
