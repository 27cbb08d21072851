// Records and options shared by producers, the buffer and the writer.

use std::path::PathBuf;
use std::time::SystemTime;

pub const DEFAULT_SOURCE_FIELD: &str = "source";
pub const DEFAULT_TIMESTAMP_FIELD: &str = "timestamp";
pub const DEFAULT_PAYLOAD_FIELD: &str = "payload";

/// Labels used for the three record fields when records are rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldNames {
    pub source: String,
    pub timestamp: String,
    pub payload: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE_FIELD.to_string(),
            timestamp: DEFAULT_TIMESTAMP_FIELD.to_string(),
            payload: DEFAULT_PAYLOAD_FIELD.to_string(),
        }
    }
}

impl FieldNames {
    /// Replace empty labels with the defaults.
    pub fn normalized(mut self) -> Self {
        if self.source.is_empty() {
            self.source = DEFAULT_SOURCE_FIELD.to_string();
        }
        if self.timestamp.is_empty() {
            self.timestamp = DEFAULT_TIMESTAMP_FIELD.to_string();
        }
        if self.payload.is_empty() {
            self.payload = DEFAULT_PAYLOAD_FIELD.to_string();
        }
        self
    }
}

/// One captured chunk of bytes.
///
/// Ownership moves producer -> buffer -> consumer; nothing mutates it in between
/// except the buffer, which stamps its own field labels on the way in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferItem {
    /// Where the bytes came from (file path, serial port, `host:port`).
    pub source: String,
    /// Wall-clock capture time.
    pub timestamp: SystemTime,
    pub payload: Vec<u8>,
    pub field_names: FieldNames,
}

impl BufferItem {
    /// A record captured now, with default field labels.
    pub fn new(source: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::with_timestamp(source, SystemTime::now(), payload)
    }

    pub fn with_timestamp(
        source: impl Into<String>,
        timestamp: SystemTime,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source: source.into(),
            timestamp,
            payload,
            field_names: FieldNames::default(),
        }
    }
}

/// Construction parameters for a [`SharedBuffer`](crate::Pipeline::Buffer::SharedBuffer).
#[derive(Clone, Debug)]
pub struct BufferOptions {
    /// Maximum number of records in flight. Must be > 0.
    pub capacity: usize,
    /// Largest payload accepted in persisted mode. Must be > 0 when persisted.
    pub max_payload_size: usize,
    /// Keep payload bytes in a memory-mapped ring instead of the heap.
    pub persisted: bool,
    /// Ring file; required when `persisted` is set.
    pub backing_file: Option<PathBuf>,
    pub field_names: FieldNames,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_payload_size: 4096,
            persisted: false,
            backing_file: None,
            field_names: FieldNames::default(),
        }
    }
}
