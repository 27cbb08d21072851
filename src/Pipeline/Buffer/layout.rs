use std::mem::size_of;
use std::ptr;

use crate::error::{ConstructionError, CorruptionError, PushError};
use crate::Core::MappingBackend;

/// Bytes taken by the length prefix at the start of every slot.
pub const LENGTH_PREFIX: usize = size_of::<u32>();

/// Geometry of the persisted ring.
///
/// The file holds exactly `capacity` slots back to back. Slot `i` starts at
/// `i * slot_size` and is a native-endian `u32` payload length followed by
/// `max_payload_size` payload bytes. Bytes past the recorded length are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    pub capacity: usize,
    pub max_payload_size: usize,
    pub slot_size: usize,
}

impl SlotLayout {
    pub fn new(capacity: usize, max_payload_size: usize) -> Result<Self, ConstructionError> {
        if capacity == 0 {
            return Err(ConstructionError::ZeroCapacity);
        }
        if max_payload_size == 0 {
            return Err(ConstructionError::ZeroPayloadSize);
        }
        if u32::try_from(max_payload_size).is_err() {
            return Err(ConstructionError::PayloadSizeTooLarge(max_payload_size));
        }
        let slot_size = LENGTH_PREFIX + max_payload_size;
        if capacity.checked_mul(slot_size).is_none() {
            return Err(ConstructionError::RingTooLarge {
                capacity,
                slot_size,
            });
        }
        Ok(Self {
            capacity,
            max_payload_size,
            slot_size,
        })
    }

    /// Total length of the backing file in bytes.
    #[inline]
    pub fn file_size(&self) -> usize {
        self.capacity * self.slot_size
    }

    /// Byte offset of slot `index`.
    #[inline]
    pub fn offset(&self, index: usize) -> usize {
        debug_assert!(index < self.capacity);
        index * self.slot_size
    }
}

/// The mapped ring plus its write cursor.
///
/// Lives inside the buffer's lock, so every cursor move and every read or write
/// of mapped memory is serialized.
pub struct SlotRing {
    mapping: Box<dyn MappingBackend>,
    layout: SlotLayout,
    cursor: usize,
}

impl SlotRing {
    pub fn new(mapping: Box<dyn MappingBackend>, layout: SlotLayout) -> Self {
        debug_assert!(mapping.size() >= layout.file_size());
        Self {
            mapping,
            layout,
            cursor: 0,
        }
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn mapping(&self) -> &dyn MappingBackend {
        self.mapping.as_ref()
    }

    /// Next slot a store will use.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Write `payload` into the slot under the cursor and advance the cursor.
    /// Returns the slot index used.
    pub fn store(&mut self, payload: &[u8]) -> Result<usize, PushError> {
        if payload.len() > self.layout.max_payload_size {
            return Err(PushError::PayloadTooLarge {
                len: payload.len(),
                max: self.layout.max_payload_size,
            });
        }

        let slot = self.cursor;
        let prefix = (payload.len() as u32).to_ne_bytes();
        unsafe {
            let base = self.slot_ptr(slot);
            ptr::copy_nonoverlapping(prefix.as_ptr(), base, LENGTH_PREFIX);
            ptr::copy_nonoverlapping(payload.as_ptr(), base.add(LENGTH_PREFIX), payload.len());
        }

        self.cursor = (self.cursor + 1) % self.layout.capacity;
        Ok(slot)
    }

    /// Read back the payload of `slot`, checking the stored length against `expected`.
    pub fn load(&self, slot: usize, expected: usize) -> Result<Vec<u8>, CorruptionError> {
        let mut prefix = [0u8; LENGTH_PREFIX];
        let stored = unsafe {
            let base = self.slot_ptr(slot);
            ptr::copy_nonoverlapping(base, prefix.as_mut_ptr(), LENGTH_PREFIX);
            u32::from_ne_bytes(prefix)
        };

        if stored as usize != expected || expected > self.layout.max_payload_size {
            return Err(CorruptionError {
                slot,
                stored,
                expected,
            });
        }

        let mut payload = vec![0u8; expected];
        unsafe {
            ptr::copy_nonoverlapping(
                self.slot_ptr(slot).add(LENGTH_PREFIX),
                payload.as_mut_ptr(),
                expected,
            );
        }
        Ok(payload)
    }

    #[inline]
    unsafe fn slot_ptr(&self, index: usize) -> *mut u8 {
        self.mapping.as_ptr().add(self.layout.offset(index))
    }
}
