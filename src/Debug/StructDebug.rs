use std::fmt;

use crate::Pipeline::Buffer::layout::SlotRing;
use crate::Pipeline::Buffer::SharedBuffer;

/// Debug for SharedBuffer
///
/// Never blocks: if the lock is held elsewhere the queue state is shown as `<locked>`.
pub fn debug_shared_buffer(buffer: &SharedBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = f.debug_struct("SharedBuffer");
    s.field("capacity", &buffer.capacity)
        .field("max_payload_size", &buffer.max_payload_size)
        .field("field_names", &buffer.field_names);

    match buffer.state.try_lock() {
        Some(state) => {
            s.field("queued", &state.queue.len())
                .field("shutdown", &state.shutdown)
                .field("ring", &state.ring);
        }
        None => {
            s.field("state", &"<locked>");
        }
    }
    s.finish()
}

/// Debug for SlotRing
///
/// Shows the mapping's location and geometry without dereferencing it.
pub fn debug_slot_ring(ring: &SlotRing, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SlotRing")
        .field("path", &ring.mapping().path())
        .field("base", &format_args!("0x{:x}", ring.mapping().as_ptr() as usize))
        .field("layout", ring.layout())
        .field("cursor", &ring.cursor())
        .finish()
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_shared_buffer(self, f)
    }
}

impl fmt::Debug for SlotRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_slot_ring(self, f)
    }
}
