use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use super::layout::{SlotLayout, SlotRing};
use super::Buffer::{BufferState, QueueEntry, SharedBuffer};
use crate::error::{ConstructionError, CorruptionError, PushError};
use crate::Core::{create_mapped_file, existing_len};
use crate::Pipeline::Structs::Buffer_Structs::{BufferItem, BufferOptions, FieldNames};

impl SharedBuffer {
    /// Build a buffer from `options`, mapping the backing file when persisted mode is on.
    pub fn new(options: BufferOptions) -> Result<Self, ConstructionError> {
        if options.capacity == 0 {
            return Err(ConstructionError::ZeroCapacity);
        }

        let ring = if options.persisted {
            let path = match options.backing_file.as_deref() {
                Some(path) if !path.as_os_str().is_empty() => path,
                _ => return Err(ConstructionError::MissingBackingFile),
            };
            let layout = SlotLayout::new(options.capacity, options.max_payload_size)?;
            let expected = layout.file_size() as u64;

            let mapping_error = |source| ConstructionError::Mapping {
                path: path.to_path_buf(),
                source,
            };

            // An empty or missing file is sized fresh; anything else must already match.
            match existing_len(path).map_err(mapping_error)? {
                Some(found) if found != 0 && found != expected => {
                    return Err(ConstructionError::LayoutMismatch {
                        path: path.to_path_buf(),
                        found,
                        expected,
                    });
                }
                _ => {}
            }

            let mapping = create_mapped_file(path, layout.file_size()).map_err(mapping_error)?;
            info!(
                path = %path.display(),
                capacity = layout.capacity,
                slot_size = layout.slot_size,
                "mapped persisted buffer ring"
            );
            Some(SlotRing::new(mapping, layout))
        } else {
            debug!(capacity = options.capacity, "created in-memory buffer");
            None
        };

        Ok(Self {
            capacity: options.capacity,
            max_payload_size: options.max_payload_size,
            field_names: options.field_names.normalized(),
            state: Mutex::new(BufferState {
                // Grows on demand; `capacity` only bounds it.
                queue: VecDeque::new(),
                shutdown: false,
                ring,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    /// Enqueue `item`, blocking while the buffer is full.
    ///
    /// # Returns
    /// * `Ok(true)` if the item was queued
    /// * `Ok(false)` if the buffer was shut down; the item is dropped
    /// * `Err(PushError)` if the payload does not fit a persisted slot
    pub fn push(&self, mut item: BufferItem) -> Result<bool, PushError> {
        let mut state = self.state.lock();
        while !state.shutdown && state.queue.len() >= self.capacity {
            self.not_full.wait(&mut state);
        }
        if state.shutdown {
            trace!(source = %item.source, "push after shutdown dropped");
            return Ok(false);
        }

        item.field_names = self.field_names.clone();
        let payload_len = item.payload.len();

        let slot = match state.ring.as_mut() {
            Some(ring) => match ring.store(&item.payload) {
                Ok(slot) => Some(slot),
                Err(e) => {
                    // We may have consumed the wakeup another pusher was waiting for.
                    self.not_full.notify_one();
                    return Err(e);
                }
            },
            None => None,
        };
        if slot.is_some() {
            item.payload = Vec::new();
        }

        state.queue.push_back(QueueEntry {
            item,
            payload_len,
            slot,
        });
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Dequeue the oldest item, blocking while the buffer is empty.
    ///
    /// Returns `Ok(None)` once the buffer is shut down and drained.
    pub fn pop(&self) -> Result<Option<BufferItem>, CorruptionError> {
        let mut state = self.state.lock();
        while !state.shutdown && state.queue.is_empty() {
            self.not_empty.wait(&mut state);
        }
        self.take_front(&mut state)
    }

    /// Like [`pop`](Self::pop) but returns `Ok(None)` instead of waiting.
    pub fn try_pop(&self) -> Result<Option<BufferItem>, CorruptionError> {
        let mut state = self.state.lock();
        self.take_front(&mut state)
    }

    // Slot reads happen before the lock is released: with a full queue the
    // next push targets the very slot being read.
    fn take_front(&self, state: &mut BufferState) -> Result<Option<BufferItem>, CorruptionError> {
        let Some(entry) = state.queue.pop_front() else {
            return Ok(None);
        };
        self.not_full.notify_one();

        let QueueEntry {
            mut item,
            payload_len,
            slot,
        } = entry;
        if let (Some(ring), Some(slot)) = (state.ring.as_ref(), slot) {
            item.payload = ring.load(slot, payload_len)?;
        }
        Ok(Some(item))
    }

    /// Stop accepting items and wake every waiter. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            debug!(queued = state.queue.len(), "buffer shut down");
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    pub fn is_persisted(&self) -> bool {
        self.state.lock().ring.is_some()
    }

    /// Labels stamped on every pushed item.
    pub fn field_names(&self) -> &FieldNames {
        &self.field_names
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        self.shutdown();
        // Dropping the ring unmaps the view, then closes the file.
        if let Some(ring) = self.state.get_mut().ring.take() {
            debug!(path = %ring.mapping().path().display(), "releasing persisted buffer ring");
        }
    }
}
