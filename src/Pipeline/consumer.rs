// src/Pipeline/consumer.rs

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::format::RecordFormat;
use super::Buffer::SharedBuffer;
use crate::error::WriterError;

/// Back-off when the buffer reports "no item" but the writer was not told to stop.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Where and how the writer emits lines.
#[derive(Clone, Debug)]
pub struct WriterSettings {
    pub output_path: PathBuf,
    pub format: RecordFormat,
    /// Zero flushes after every line.
    pub flush_interval: Duration,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output.csv"),
            format: RecordFormat::default(),
            flush_interval: Duration::from_millis(1000),
        }
    }
}

type Output = Arc<Mutex<Option<BufWriter<File>>>>;

/// The single consumer: drains the [`SharedBuffer`] on its own thread and
/// appends one CSV line per record to the output file.
///
/// The output stream sits behind a lock shared with `stop`, so a final
/// flush/close never interleaves with an in-flight write.
#[derive(Debug)]
pub struct ConsumerWriter {
    settings: WriterSettings,
    buffer: Arc<SharedBuffer>,
    running: Arc<CachePadded<AtomicBool>>,
    output: Output,
    worker: Mutex<Option<JoinHandle<Result<(), WriterError>>>>,
}

impl ConsumerWriter {
    pub fn new(settings: WriterSettings, buffer: Arc<SharedBuffer>) -> Result<Self, WriterError> {
        settings.format.validate()?;
        Ok(Self {
            settings,
            buffer,
            running: Arc::new(CachePadded::new(AtomicBool::new(false))),
            output: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
        })
    }

    /// Open the output in append mode and spawn the writer thread.
    /// Returns `Ok(false)` if the writer is already running.
    pub fn start(&self) -> Result<bool, WriterError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }

        // A worker that died on its own is still parked here until reaped.
        if let Some(stale) = self.worker.lock().take() {
            if let Ok(Err(e)) = stale.join() {
                warn!(error = %e, "discarding error from previous writer run");
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.settings.output_path)
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                WriterError::Open {
                    path: self.settings.output_path.clone(),
                    source,
                }
            })?;
        *self.output.lock() = Some(BufWriter::new(file));

        let worker = DrainLoop {
            buffer: Arc::clone(&self.buffer),
            running: Arc::clone(&self.running),
            output: Arc::clone(&self.output),
            format: self.settings.format.clone(),
            flush_interval: self.settings.flush_interval,
        };

        let handle = thread::Builder::new()
            .name("csv-writer".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                self.output.lock().take();
                WriterError::Spawn(e)
            })?;
        *self.worker.lock() = Some(handle);

        info!(path = %self.settings.output_path.display(), "writer started");
        Ok(true)
    }

    /// Stop accepting, drain what is queued, then flush and close the output.
    ///
    /// Returns the error that ended the writer thread early, if there was one.
    pub fn stop(&self) -> Result<(), WriterError> {
        self.running.store(false, Ordering::Release);
        self.buffer.shutdown();

        let outcome = match self.worker.lock().take() {
            Some(handle) => handle.join().unwrap_or(Err(WriterError::Panicked)),
            None => Ok(()),
        };

        let closed = match self.output.lock().take() {
            Some(mut out) => out.flush().map_err(WriterError::from),
            None => Ok(()),
        };

        info!(path = %self.settings.output_path.display(), "writer stopped");
        outcome.and(closed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }
}

impl Drop for ConsumerWriter {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() || self.output.lock().is_some() {
            if let Err(e) = self.stop() {
                error!(error = %e, "writer stopped with error on drop");
            }
        }
    }
}

/// State moved onto the writer thread.
struct DrainLoop {
    buffer: Arc<SharedBuffer>,
    running: Arc<CachePadded<AtomicBool>>,
    output: Output,
    format: RecordFormat,
    flush_interval: Duration,
}

impl DrainLoop {
    fn run(self) -> Result<(), WriterError> {
        let result = self.drain();
        if let Err(e) = &result {
            error!(error = %e, "writer thread failed, shutting down buffer");
            self.running.store(false, Ordering::Release);
            // Producers blocked on a full buffer would otherwise wait forever.
            self.buffer.shutdown();
        }
        result
    }

    fn drain(&self) -> Result<(), WriterError> {
        let mut last_flush = Instant::now();

        loop {
            let item = match self.buffer.pop()? {
                Some(item) => item,
                None => {
                    if !self.running.load(Ordering::Acquire) {
                        debug!("buffer drained, writer loop exiting");
                        return Ok(());
                    }
                    // Shutdown raced ahead of our own stop flag.
                    thread::sleep(IDLE_BACKOFF);
                    continue;
                }
            };

            let line = self.format.format(&item);

            let mut guard = self.output.lock();
            let Some(out) = guard.as_mut() else {
                return Ok(());
            };
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;

            if self.flush_interval.is_zero() || last_flush.elapsed() >= self.flush_interval {
                out.flush()?;
                last_flush = Instant::now();
            }
        }
    }
}
