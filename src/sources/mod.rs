//! Concrete producers. Each one is a [`Source`](crate::Pipeline::Source) run
//! under a [`Lifecycle`], which gives it the [`Producer`] start/stop surface.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::Pipeline::Buffer::SharedBuffer;
use crate::Pipeline::{Lifecycle, Producer};

pub mod file;
pub mod network;
pub mod serial;

pub use file::{FileTail, FileTailSettings};
pub use network::{NetworkSettings, NetworkSource};
pub use serial::{SerialSettings, SerialSource};

/// Sleep between polls when a non-blocking source has nothing to read.
pub const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Build a producer for every input enabled in `config`.
pub fn producers_from_config(
    config: &AppConfig,
    buffer: &Arc<SharedBuffer>,
) -> Vec<Box<dyn Producer>> {
    let mut producers: Vec<Box<dyn Producer>> = Vec::with_capacity(3);

    if let Some(settings) = config.file_input.settings() {
        producers.push(Box::new(Lifecycle::new(
            "file",
            Arc::clone(buffer),
            FileTail::new(settings),
        )));
    }
    if let Some(settings) = config.serial_input.settings() {
        producers.push(Box::new(Lifecycle::new(
            "serial",
            Arc::clone(buffer),
            SerialSource::new(settings),
        )));
    }
    if let Some(settings) = config.ip_input.settings() {
        producers.push(Box::new(Lifecycle::new(
            "ip",
            Arc::clone(buffer),
            NetworkSource::new(settings),
        )));
    }

    producers
}
