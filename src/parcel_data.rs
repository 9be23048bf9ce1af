//! The shared payload data model a [`crate::writer::Writer`] builds up:
//! bytes, object offsets, the out-of-line buffer size total, and the arena
//! that keeps boxed HIDL descriptors alive for the lifetime of the parcel.

use crate::hidl::{HidlString, HidlVec};
use crate::io::IoVTable;

fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

/// Owning replacement for the original `(pointer, free-function)` cleanup
/// list: every HIDL descriptor or arena-copied byte buffer a [`Writer`]
/// embeds a pointer to lives here, and is freed (via ordinary `Drop`) in
/// insertion order when the `ParcelData` is dropped.
///
/// [`Writer`]: crate::writer::Writer
enum ArenaEntry {
    Bytes(Box<[u8]>),
    HidlString(Box<HidlString>),
    HidlStringArray(Box<[HidlString]>),
    HidlVec(Box<HidlVec>),
}

pub(crate) struct ParcelData<'io> {
    pub(crate) bytes: Vec<u8>,
    pub(crate) offsets: Vec<u32>,
    pub(crate) buffers_size: u32,
    arena: Vec<ArenaEntry>,
    pub(crate) io: &'io dyn IoVTable,
}

impl<'io> ParcelData<'io> {
    pub(crate) fn new(io: &'io dyn IoVTable) -> Self {
        Self {
            bytes: Vec::new(),
            offsets: Vec::new(),
            buffers_size: 0,
            arena: Vec::new(),
            io,
        }
    }

    /// Appends a new object offset, matching
    /// `gbinder_writer_data_record_offset`.
    pub(crate) fn record_offset(&mut self, offset: u32) {
        self.offsets.push(offset);
    }

    /// Returns the parent index the next object appended will receive —
    /// matching `gbinder_writer_data_prepare`.
    pub(crate) fn prepare(&self) -> u32 {
        self.offsets.len() as u32
    }

    pub(crate) fn add_buffers_size(&mut self, payload_size: usize) {
        self.buffers_size += align_up(payload_size as u32, 8);
    }

    /// Copies `data` into the arena and returns a stable pointer to the
    /// copy, valid for as long as this `ParcelData` lives.
    pub(crate) fn arena_copy_bytes(&mut self, data: &[u8]) -> *const u8 {
        let boxed: Box<[u8]> = data.into();
        let ptr = boxed.as_ptr();
        self.arena.push(ArenaEntry::Bytes(boxed));
        ptr
    }

    pub(crate) fn arena_push_hidl_string(&mut self, s: HidlString) -> *const HidlString {
        let boxed = Box::new(s);
        let ptr = &*boxed as *const HidlString;
        self.arena.push(ArenaEntry::HidlString(boxed));
        ptr
    }

    pub(crate) fn arena_push_hidl_string_array(
        &mut self,
        strings: Vec<HidlString>,
    ) -> *const HidlString {
        let boxed: Box<[HidlString]> = strings.into_boxed_slice();
        let ptr = boxed.as_ptr();
        self.arena.push(ArenaEntry::HidlStringArray(boxed));
        ptr
    }

    pub(crate) fn arena_push_hidl_vec(&mut self, v: HidlVec) -> *const HidlVec {
        let boxed = Box::new(v);
        let ptr = &*boxed as *const HidlVec;
        self.arena.push(ArenaEntry::HidlVec(boxed));
        ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_the_next_multiple() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
    }

    #[test]
    fn prepare_tracks_offsets_len() {
        let io = crate::io::Io64;
        let mut data = ParcelData::new(&io);
        assert_eq!(data.prepare(), 0);
        data.record_offset(0);
        assert_eq!(data.prepare(), 1);
        data.record_offset(40);
        assert_eq!(data.prepare(), 2);
    }
}
