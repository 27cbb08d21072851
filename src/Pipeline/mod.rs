mod builder;
mod consumer;
pub mod format;
mod producer;

pub use builder::BufferBuilder;
pub use consumer::{ConsumerWriter, WriterSettings};
pub use format::RecordFormat;
pub use producer::{Lifecycle, Producer, RunContext, Source};

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use Buffer::SharedBuffer; // re-export for stable path
    pub use layout::{SlotLayout, LENGTH_PREFIX};
}

pub mod Structs {
    pub mod Buffer_Structs;
    pub use Buffer_Structs::{BufferItem, BufferOptions, FieldNames}; // re-export for stable path
}
