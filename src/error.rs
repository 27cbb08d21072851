// Error types, one per failure class.
//
// Construction failures abort startup, push failures go back to the pushing
// producer, corruption stops the consumer.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Raised while building a [`SharedBuffer`](crate::Pipeline::Buffer::SharedBuffer).
/// Fatal: nothing has been spawned yet when this is returned.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,

    #[error("a backing file path is required when persisted mode is enabled")]
    MissingBackingFile,

    #[error("max payload size must be greater than zero when persisted mode is enabled")]
    ZeroPayloadSize,

    #[error("max payload size {0} does not fit the 32-bit slot length prefix")]
    PayloadSizeTooLarge(usize),

    #[error("ring of {capacity} slots x {slot_size} bytes does not fit in memory")]
    RingTooLarge { capacity: usize, slot_size: usize },

    /// The file already holds a ring laid out for a different capacity or slot size.
    #[error(
        "backing file {} is {found} bytes, expected {expected} for the configured ring",
        path.display()
    )]
    LayoutMismatch {
        path: PathBuf,
        found: u64,
        expected: u64,
    },

    #[error("failed to map backing file {}: {source}", path.display())]
    Mapping {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Raised by `push` when the record cannot be stored.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("payload of {len} bytes exceeds the configured maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

/// A popped slot's length prefix disagrees with what was recorded at push time.
#[derive(Debug, Error)]
#[error("slot {slot} holds a {stored}-byte payload but the queued entry recorded {expected} bytes")]
pub struct CorruptionError {
    pub slot: usize,
    pub stored: u32,
    pub expected: usize,
}

/// Failures local to one producer. They end that producer's worker only.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("{source_label}: {error}")]
    Io {
        source_label: String,
        #[source]
        error: io::Error,
    },

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("failed to spawn worker thread for {name}: {error}")]
    Spawn {
        name: String,
        #[source]
        error: io::Error,
    },

    #[error("worker thread for {name} panicked")]
    Panicked { name: String },

    #[error("source for {name} was lost by an earlier panic")]
    SourceLost { name: String },
}

impl ProducerError {
    pub(crate) fn io(source_label: impl Into<String>, error: io::Error) -> Self {
        ProducerError::Io {
            source_label: source_label.into(),
            error,
        }
    }
}

/// Failures of the CSV writer thread.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to open output {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write output: {0}")]
    Write(#[from] io::Error),

    #[error("invalid timestamp format {0:?}")]
    InvalidTimestampFormat(String),

    #[error(transparent)]
    Corruption(#[from] CorruptionError),

    #[error("failed to spawn writer thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("writer thread panicked")]
    Panicked,
}
