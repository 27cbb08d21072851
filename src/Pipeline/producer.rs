// Generic producer lifecycle: Idle -> Running -> Idle around one worker thread.
// Concrete sources only supply the read loop and an optional cleanup hook.

use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::Buffer::SharedBuffer;
use super::Structs::BufferItem;
use crate::error::{ProducerError, PushError};

/// Lifecycle phase, stored in an `AtomicU8`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle = 0,
    Running = 1,
}

/// A byte source read on its own thread.
pub trait Source: Send + 'static {
    /// Read until `ctx.is_running()` turns false, the source is exhausted, or
    /// an error occurs. Errors end this producer only.
    fn run(&mut self, ctx: &RunContext<'_>) -> Result<(), ProducerError>;

    /// Release handles. Called once after every run, whatever its outcome.
    fn cleanup(&mut self) {}
}

/// The start/stop surface every producer exposes, independent of its source kind.
pub trait Producer: Send + Sync {
    /// Spawn the worker. Returns `Ok(false)` if it was already running.
    fn start(&self) -> Result<bool, ProducerError>;

    /// Signal the worker, join it and run cleanup. Returns the read loop's error, if any.
    fn stop(&self) -> Result<(), ProducerError>;

    fn is_running(&self) -> bool;

    fn name(&self) -> &str;
}

/// What a read loop sees while it runs.
pub struct RunContext<'a> {
    phase: &'a AtomicU8,
    buffer: &'a SharedBuffer,
}

impl<'a> RunContext<'a> {
    pub fn is_running(&self) -> bool {
        self.phase.load(Ordering::Acquire) == Phase::Running as u8
    }

    pub fn buffer(&self) -> &SharedBuffer {
        self.buffer
    }

    /// Push a chunk captured now. `Ok(false)` means the buffer has shut down.
    pub fn push(&self, source: &str, payload: Vec<u8>) -> Result<bool, PushError> {
        self.buffer.push(BufferItem::with_timestamp(
            source,
            SystemTime::now(),
            payload,
        ))
    }
}

/// A worker hands its source back along with the read loop's outcome.
type Worker<S> = JoinHandle<(S, Result<(), ProducerError>)>;

enum Slot<S> {
    Parked(S),
    Running(Worker<S>),
    /// The source went down with a panicking worker.
    Lost,
}

/// Runs a [`Source`] on a dedicated thread and implements [`Producer`] for it.
pub struct Lifecycle<S: Source> {
    name: String,
    buffer: Arc<SharedBuffer>,
    phase: Arc<CachePadded<AtomicU8>>,
    slot: Mutex<Slot<S>>,
}

impl<S: Source> Lifecycle<S> {
    pub fn new(name: impl Into<String>, buffer: Arc<SharedBuffer>, source: S) -> Self {
        Self {
            name: name.into(),
            buffer,
            phase: Arc::new(CachePadded::new(AtomicU8::new(Phase::Idle as u8))),
            slot: Mutex::new(Slot::Parked(source)),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.phase.load(Ordering::Acquire) == Phase::Running as u8 {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    fn spawn(&self, mut source: S) -> Result<Worker<S>, ProducerError> {
        let name = self.name.clone();
        let phase = Arc::clone(&self.phase);
        let buffer = Arc::clone(&self.buffer);

        thread::Builder::new()
            .name(format!("producer-{}", self.name))
            .spawn(move || {
                let _idle = ResetOnExit(&phase);
                let ctx = RunContext {
                    phase: &phase,
                    buffer: &buffer,
                };
                let result = source.run(&ctx);
                match &result {
                    Ok(()) => debug!(producer = %name, "read loop finished"),
                    Err(e) => error!(producer = %name, error = %e, "read loop failed"),
                }
                (source, result)
            })
            .map_err(|error| ProducerError::Spawn {
                name: self.name.clone(),
                error,
            })
    }

    fn join(&self, handle: Worker<S>) -> Result<(S, Result<(), ProducerError>), ProducerError> {
        handle.join().map_err(|_| ProducerError::Panicked {
            name: self.name.clone(),
        })
    }
}

impl<S: Source> Producer for Lifecycle<S> {
    fn start(&self) -> Result<bool, ProducerError> {
        let mut slot = self.slot.lock();

        if self
            .phase
            .compare_exchange(
                Phase::Idle as u8,
                Phase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(false);
        }

        let source = match mem::replace(&mut *slot, Slot::Lost) {
            Slot::Parked(source) => source,
            // The previous run ended on its own and was never stopped.
            Slot::Running(handle) => match self.join(handle) {
                Ok((mut source, result)) => {
                    source.cleanup();
                    if let Err(e) = result {
                        warn!(
                            producer = %self.name,
                            error = %e,
                            "discarding error from previous run"
                        );
                    }
                    source
                }
                Err(e) => {
                    self.phase.store(Phase::Idle as u8, Ordering::Release);
                    return Err(e);
                }
            },
            Slot::Lost => {
                self.phase.store(Phase::Idle as u8, Ordering::Release);
                return Err(ProducerError::SourceLost {
                    name: self.name.clone(),
                });
            }
        };

        match self.spawn(source) {
            Ok(handle) => {
                *slot = Slot::Running(handle);
                info!(producer = %self.name, "producer started");
                Ok(true)
            }
            Err(e) => {
                self.phase.store(Phase::Idle as u8, Ordering::Release);
                Err(e)
            }
        }
    }

    fn stop(&self) -> Result<(), ProducerError> {
        // Phase is cleared under the slot lock, so no `start` can flip it
        // back to Running before this worker is joined.
        let mut slot = self.slot.lock();
        self.phase.store(Phase::Idle as u8, Ordering::Release);

        match mem::replace(&mut *slot, Slot::Lost) {
            Slot::Running(handle) => {
                let (mut source, result) = self.join(handle)?;
                source.cleanup();
                *slot = Slot::Parked(source);
                info!(producer = %self.name, "producer stopped");
                result
            }
            other => {
                *slot = other;
                Ok(())
            }
        }
    }

    fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<S: Source> Drop for Lifecycle<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(producer = %self.name, error = %e, "producer stopped with error on drop");
        }
    }
}

/// Puts the phase back to Idle when the worker leaves its read loop, panics included.
struct ResetOnExit<'a>(&'a AtomicU8);

impl Drop for ResetOnExit<'_> {
    fn drop(&mut self) {
        self.0.store(Phase::Idle as u8, Ordering::Release);
    }
}
