use std::path::PathBuf;

use super::Buffer::SharedBuffer;
use super::Structs::{BufferOptions, FieldNames};
use crate::error::ConstructionError;

/// Fluent construction of a [`SharedBuffer`].
pub struct BufferBuilder {
    options: BufferOptions,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self {
            options: BufferOptions::default(),
        }
    }
}

impl BufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: BufferOptions) -> Self {
        Self { options }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.options.capacity = capacity;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.options.max_payload_size = size;
        self
    }

    /// Keep payloads in a memory-mapped ring stored at `backing_file`.
    pub fn persisted(mut self, backing_file: impl Into<PathBuf>) -> Self {
        self.options.persisted = true;
        self.options.backing_file = Some(backing_file.into());
        self
    }

    pub fn with_field_names(mut self, field_names: FieldNames) -> Self {
        self.options.field_names = field_names;
        self
    }

    pub fn build(self) -> Result<SharedBuffer, ConstructionError> {
        SharedBuffer::new(self.options)
    }
}
