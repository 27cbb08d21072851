use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::error::ProducerError;
use crate::Pipeline::{RunContext, Source};

#[derive(Clone, Debug)]
pub struct FileTailSettings {
    pub path: PathBuf,
    /// Keep polling for appended data at EOF instead of finishing.
    pub follow: bool,
    pub read_chunk_size: usize,
    pub poll_interval: Duration,
}

impl Default for FileTailSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            follow: false,
            read_chunk_size: 4096,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Reads a file in chunks, optionally tailing it like `tail -f`.
pub struct FileTail {
    settings: FileTailSettings,
    label: String,
    file: Option<File>,
}

impl FileTail {
    pub fn new(settings: FileTailSettings) -> Self {
        let label = settings.path.display().to_string();
        Self {
            settings,
            label,
            file: None,
        }
    }
}

impl Source for FileTail {
    fn run(&mut self, ctx: &RunContext<'_>) -> Result<(), ProducerError> {
        let file = File::open(&self.settings.path).map_err(|e| ProducerError::io(&self.label, e))?;
        let file = self.file.insert(file);
        let mut chunk = vec![0u8; self.settings.read_chunk_size.max(1)];

        while ctx.is_running() {
            let count = match file.read(&mut chunk) {
                Ok(count) => count,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProducerError::io(&self.label, e)),
            };

            if count > 0 {
                if !ctx.push(&self.label, chunk[..count].to_vec())? {
                    break;
                }
                continue;
            }

            if !self.settings.follow {
                break;
            }
            thread::sleep(self.settings.poll_interval);
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.file.take();
    }
}
