//! Configuration loading

use anyhow::Result;
use mscript_core::package::ParseOptions;
use mscript_serial::{FlowControl, SerialSettings, UploadOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub bootloader: BootloaderConfig,
    #[serde(default)]
    pub parser: ParseOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port (auto-detected when absent)
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub flow_control: FlowControl,
    /// Bound for each response line while a script runs
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            flow_control: FlowControl::None,
            read_timeout_secs: default_read_timeout(),
        }
    }
}

fn default_baud_rate() -> u32 {
    mscript_serial::transport::DEFAULT_BAUD_RATE
}

fn default_read_timeout() -> u64 {
    mscript_serial::script::DEFAULT_READ_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootloaderConfig {
    /// Bytes per `data` command (1..=50)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_upload_timeout")]
    pub read_timeout_secs: u64,
    /// The bootloader uses RTS/CTS
    #[serde(default = "default_bootloader_flow_control")]
    pub flow_control: FlowControl,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            read_timeout_secs: default_upload_timeout(),
            flow_control: default_bootloader_flow_control(),
        }
    }
}

fn default_chunk_size() -> usize {
    mscript_core::firmware::MAX_CHUNK_SIZE
}

fn default_upload_timeout() -> u64 {
    mscript_serial::bootloader::DEFAULT_UPLOAD_TIMEOUT_SECS
}

fn default_bootloader_flow_control() -> FlowControl {
    FlowControl::Hardware
}

impl Config {
    /// Port settings for scripts and queries
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
            flow_control: self.serial.flow_control,
        }
    }

    /// Port settings for firmware upload
    pub fn bootloader_settings(&self) -> SerialSettings {
        SerialSettings {
            flow_control: self.bootloader.flow_control,
            ..self.serial_settings()
        }
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            chunk_size: self.bootloader.chunk_size,
            read_timeout_secs: self.bootloader.read_timeout_secs,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.serial.read_timeout_secs)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mscript_core::package::{FieldErrorPolicy, SchemaPolicy};
    use mscript_core::value::PrefixPolicy;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("mscript.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.serial.baud_rate, 230_400);
        assert_eq!(config.bootloader.chunk_size, 50);
        assert_eq!(config.bootloader.flow_control, FlowControl::Hardware);
        assert_eq!(config.parser.schema, SchemaPolicy::Strict);
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mscript.toml");
        save_default_config(&path).unwrap();
        assert_eq!(load_config(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mscript.toml");
        std::fs::write(
            &path,
            r#"
[serial]
port = "/dev/ttyUSB0"
flow_control = "software"

[parser]
field_errors = "skip_field"
unknown_prefix = "not_a_number"
schema = "trust"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.baud_rate, 230_400);
        assert_eq!(config.serial.flow_control, FlowControl::Software);
        assert_eq!(config.parser.field_errors, FieldErrorPolicy::SkipField);
        assert_eq!(config.parser.unknown_prefix, PrefixPolicy::NotANumber);
        assert_eq!(config.parser.schema, SchemaPolicy::Trust);

        let settings = config.bootloader_settings();
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(settings.flow_control, FlowControl::Hardware);
        assert_eq!(config.upload_options(), UploadOptions::default());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mscript.toml");
        std::fs::write(&path, "[serial]\nflow_control = \"sometimes\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
