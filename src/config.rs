//! YAML configuration for the capture process.
//!
//! Sections:
//! - `buffer` - shared buffer capacity, persisted ring, field labels
//! - `csv` - output path and line formatting
//! - `file_input`, `serial_input`, `ip_input` - sources, each off unless `enabled`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sources::{FileTailSettings, NetworkSettings, SerialSettings};
use crate::Pipeline::format::RecordFormat;
use crate::Pipeline::Structs::{BufferOptions, FieldNames};
use crate::Pipeline::WriterSettings;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub buffer: BufferConfig,
    pub csv: CsvConfig,
    pub file_input: FileInputConfig,
    pub serial_input: SerialInputConfig,
    pub ip_input: IpInputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    pub max_payload_size: usize,
    pub persisted: bool,
    pub backing_file: Option<PathBuf>,
    pub source_field: String,
    pub timestamp_field: String,
    pub payload_field: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        let options = BufferOptions::default();
        Self {
            capacity: options.capacity,
            max_payload_size: options.max_payload_size,
            persisted: options.persisted,
            backing_file: None,
            source_field: options.field_names.source,
            timestamp_field: options.field_names.timestamp,
            payload_field: options.field_names.payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub output_path: PathBuf,
    pub delimiter: char,
    pub quote_strings: bool,
    pub include_timestamp: bool,
    pub flush_interval_ms: u64,
    pub timestamp_format: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        let format = RecordFormat::default();
        Self {
            output_path: PathBuf::from("output.csv"),
            delimiter: format.delimiter,
            quote_strings: format.quote_strings,
            include_timestamp: format.include_timestamp,
            flush_interval_ms: 1000,
            timestamp_format: format.timestamp_format,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileInputConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub follow: bool,
    pub read_chunk_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for FileInputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
            follow: false,
            read_chunk_size: 4096,
            poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialInputConfig {
    pub enabled: bool,
    pub port: String,
    pub baud_rate: u32,
    pub read_chunk_size: usize,
}

impl Default for SerialInputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: String::new(),
            baud_rate: 9600,
            read_chunk_size: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpInputConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub udp: bool,
    pub read_chunk_size: usize,
}

impl Default for IpInputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 0,
            udp: false,
            read_chunk_size: 512,
        }
    }
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate YAML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.buffer.capacity == 0 {
            return invalid("buffer.capacity must be greater than zero");
        }
        if self.buffer.persisted {
            if self.buffer.max_payload_size == 0 {
                return invalid("buffer.max_payload_size must be greater than zero when persisted");
            }
            match &self.buffer.backing_file {
                Some(path) if !path.as_os_str().is_empty() => {}
                _ => return invalid("buffer.backing_file is required when persisted"),
            }
        }

        if self.csv.output_path.as_os_str().is_empty() {
            return invalid("csv.output_path cannot be empty");
        }

        if self.file_input.enabled {
            if self.file_input.path.as_os_str().is_empty() {
                return invalid("file_input.path is required when enabled");
            }
            if self.file_input.read_chunk_size == 0 {
                return invalid("file_input.read_chunk_size must be greater than zero");
            }
        }

        if self.serial_input.enabled {
            if self.serial_input.port.is_empty() {
                return invalid("serial_input.port is required when enabled");
            }
            if self.serial_input.read_chunk_size == 0 {
                return invalid("serial_input.read_chunk_size must be greater than zero");
            }
        }

        if self.ip_input.enabled {
            if self.ip_input.port == 0 {
                return invalid("ip_input.port must be greater than zero when enabled");
            }
            if self.ip_input.read_chunk_size == 0 {
                return invalid("ip_input.read_chunk_size must be greater than zero");
            }
        }

        Ok(())
    }
}

impl BufferConfig {
    pub fn to_options(&self) -> BufferOptions {
        BufferOptions {
            capacity: self.capacity,
            max_payload_size: self.max_payload_size,
            persisted: self.persisted,
            backing_file: self.backing_file.clone(),
            field_names: FieldNames {
                source: self.source_field.clone(),
                timestamp: self.timestamp_field.clone(),
                payload: self.payload_field.clone(),
            }
            .normalized(),
        }
    }
}

impl CsvConfig {
    pub fn to_settings(&self) -> WriterSettings {
        WriterSettings {
            output_path: self.output_path.clone(),
            format: RecordFormat {
                delimiter: self.delimiter,
                quote_strings: self.quote_strings,
                include_timestamp: self.include_timestamp,
                timestamp_format: self.timestamp_format.clone(),
            },
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }
}

impl FileInputConfig {
    /// `None` when the input is disabled.
    pub fn settings(&self) -> Option<FileTailSettings> {
        self.enabled.then(|| FileTailSettings {
            path: self.path.clone(),
            follow: self.follow,
            read_chunk_size: self.read_chunk_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        })
    }
}

impl SerialInputConfig {
    pub fn settings(&self) -> Option<SerialSettings> {
        self.enabled.then(|| SerialSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            read_chunk_size: self.read_chunk_size,
        })
    }
}

impl IpInputConfig {
    pub fn settings(&self) -> Option<NetworkSettings> {
        self.enabled.then(|| NetworkSettings {
            host: self.host.clone(),
            port: self.port,
            udp: self.udp,
            read_chunk_size: self.read_chunk_size,
        })
    }
}
