// The shared buffer between every producer thread and the writer thread.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::layout::SlotRing;
use crate::Pipeline::Structs::Buffer_Structs::{BufferItem, FieldNames};

/// A bounded, blocking, multi-producer queue of [`BufferItem`]s.
///
/// ### Concurrency Design:
/// - One lock guards the queue, the shutdown flag and (in persisted mode) the
///   slot ring, so slot writes, cursor moves and slot reads never overlap.
/// - `not_full` parks pushers while the queue holds `capacity` entries.
/// - `not_empty` parks poppers while the queue is empty.
/// - `shutdown` is sticky and wakes everybody: pushes become no-ops, pops
///   drain what is left and then report "no item" forever.
///
/// ### Persisted mode:
/// Payload bytes are written into a memory-mapped ring of `capacity` slots and
/// dropped from the heap; the queue only keeps the length and slot index.
/// Since the queue never holds more than `capacity` entries and the cursor
/// advances once per queued entry, a slot is never reused while an entry that
/// references it is still queued.
pub struct SharedBuffer {
    pub(crate) capacity: usize,
    pub(crate) max_payload_size: usize,
    pub(crate) field_names: FieldNames,

    pub(crate) state: Mutex<BufferState>,
    pub(crate) not_full: Condvar,
    pub(crate) not_empty: Condvar,
}

pub(crate) struct BufferState {
    pub(crate) queue: VecDeque<QueueEntry>,
    pub(crate) shutdown: bool,
    /// Present only in persisted mode.
    pub(crate) ring: Option<SlotRing>,
}

/// A queued record. In persisted mode `item.payload` is empty and the bytes
/// live in slot `slot` of the ring; `slot` is `Some` exactly in persisted mode.
pub(crate) struct QueueEntry {
    pub(crate) item: BufferItem,
    pub(crate) payload_len: usize,
    pub(crate) slot: Option<usize>,
}
