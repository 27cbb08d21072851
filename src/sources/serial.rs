use std::fs::File;
use std::io::{ErrorKind, Read};
use std::thread;

use crate::error::ProducerError;
use crate::sources::RETRY_DELAY;
use crate::Core::open_serial_port;
use crate::Pipeline::{RunContext, Source};

#[derive(Clone, Debug)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub read_chunk_size: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            read_chunk_size: 256,
        }
    }
}

/// Reads raw bytes from a serial device.
pub struct SerialSource {
    settings: SerialSettings,
    port: Option<File>,
}

impl SerialSource {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }
}

impl Source for SerialSource {
    fn run(&mut self, ctx: &RunContext<'_>) -> Result<(), ProducerError> {
        let label = self.settings.port.clone();
        let port = open_serial_port(label.as_ref(), self.settings.baud_rate)
            .map_err(|e| ProducerError::io(&label, e))?;
        let port = self.port.insert(port);
        let mut chunk = vec![0u8; self.settings.read_chunk_size.max(1)];

        while ctx.is_running() {
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(count) => {
                    if !ctx.push(&label, chunk[..count].to_vec())? {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(RETRY_DELAY),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(ProducerError::io(&label, e)),
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.port.take();
    }
}
