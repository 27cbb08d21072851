// Module naming follows project convention (Core = platform plumbing, Pipeline = buffer + threads)
#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
pub mod Pipeline;

#[allow(non_snake_case)]
mod Debug {
    pub mod StructDebug;
}

pub mod config;
pub mod error;
pub mod sources;

pub use error::{ConstructionError, CorruptionError, ProducerError, PushError, WriterError};
pub use Pipeline::Buffer::SharedBuffer;
pub use Pipeline::Structs::{BufferItem, BufferOptions, FieldNames};
pub use Pipeline::{
    BufferBuilder, ConsumerWriter, Lifecycle, Producer, RunContext, Source, WriterSettings,
};
