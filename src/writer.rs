//! Append-only parcel encoder. See `SPEC_FULL.md` §4.1 for the bit-exact
//! rules; this module's structure mirrors `gbinder_writer.c` one function at
//! a time, generalized from the original's raw-pointer `const void*` API to
//! an arena-owning, safe-by-default one (see `SPEC_FULL.md` §9).

use std::mem::size_of;

use crate::hidl::{HidlString, HidlVec, Parent, HIDL_STRING_BUFFER_OFFSET, HIDL_VEC_BUFFER_OFFSET};
use crate::io::{IoVTable, LocalObject, RemoteObject};
use crate::parcel_data::ParcelData;

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Append-only encoder, backed by a [`ParcelData`]. Every method here is
/// total: there is no way to supply inputs that make it fail, so none of
/// them return `Result` (allocation failure aside, which is fatal to the
/// process the way it is everywhere else in Rust).
pub struct Writer<'io> {
    data: ParcelData<'io>,
}

impl<'io> Writer<'io> {
    pub fn new(io: &'io dyn IoVTable) -> Self {
        Self { data: ParcelData::new(io) }
    }

    /// The payload built so far.
    pub fn bytes(&self) -> &[u8] {
        &self.data.bytes
    }

    /// Object offsets recorded so far, in append order.
    pub fn offsets(&self) -> &[u32] {
        &self.data.offsets
    }

    /// Running total of out-of-line sub-buffer sizes, 8-byte aligned.
    pub fn buffers_size(&self) -> u32 {
        self.data.buffers_size
    }

    pub fn len(&self) -> usize {
        self.data.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.bytes.is_empty()
    }

    // ---- scalars ---------------------------------------------------

    pub fn write_byte(&mut self, value: u8) {
        self.data.bytes.push(value);
    }

    /// Booleans are padded to 4 bytes; the trailing three are filled with
    /// `0xFF`, a corruption-detection sentinel the reader ignores.
    pub fn write_bool(&mut self, value: bool) {
        self.data.bytes.push(if value { 1 } else { 0 });
        self.data.bytes.extend_from_slice(&[0xff, 0xff, 0xff]);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.data.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    /// Copies `data` into the payload verbatim; no alignment is applied.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.data.bytes.extend_from_slice(data);
    }

    // ---- AIDL strings ------------------------------------------------

    pub fn append_string8(&mut self, s: Option<&str>) {
        self.append_string8_len(s, s.map(str::len).unwrap_or(0));
    }

    /// Writes `len` bytes of `s` (which may differ from `s.len()` — the
    /// AIDL header carries its own length, this routine only pads the
    /// payload) followed by a NUL and zero padding to a 4-byte boundary. A
    /// `None` input writes nothing at all.
    pub fn append_string8_len(&mut self, s: Option<&str>, len: usize) {
        if let Some(s) = s {
            let padded = align_up(len + 1, 4);
            let old_len = self.data.bytes.len();
            self.data.bytes.resize(old_len + padded, 0);
            self.data.bytes[old_len..old_len + len].copy_from_slice(&s.as_bytes()[..len]);
            // self.data.bytes[old_len + len] is already the NUL from resize's zero-fill.
        }
    }

    /// Appends a valid Rust string as AIDL string16 (UTF-16, length
    /// prefixed). `None` writes the null encoding.
    pub fn append_string16(&mut self, s: Option<&str>) {
        match s {
            None => self.write_i32(-1),
            Some(s) => self.append_string16_validated(s),
        }
    }

    /// Appends raw bytes as AIDL string16, validating as UTF-8 and
    /// truncating at the first invalid byte — matching the original
    /// `g_utf8_validate`-based truncation, for callers that only have raw
    /// bytes (e.g. from FFI) rather than an already-valid `&str`.
    pub fn append_string16_bytes(&mut self, utf8: Option<&[u8]>) {
        match utf8 {
            None => self.write_i32(-1),
            Some(bytes) => {
                let valid_len = match std::str::from_utf8(bytes) {
                    Ok(s) => s.len(),
                    Err(e) => e.valid_up_to(),
                };
                // Safety: `[..valid_len]` is exactly the valid prefix `from_utf8` agreed on.
                let s = unsafe { std::str::from_utf8_unchecked(&bytes[..valid_len]) };
                self.append_string16_validated(s);
            }
        }
    }

    fn append_string16_validated(&mut self, s: &str) {
        if s.is_empty() {
            // Empty-non-null sentinel: {0, 0, 0, 0xFFFF} as four u16 words.
            self.data
                .bytes
                .extend_from_slice(&[0, 0, 0, 0, 0, 0, 0xff, 0xff]);
            return;
        }

        let units: Vec<u16> = s.encode_utf16().collect();
        self.write_i32(units.len() as i32);

        let old_len = self.data.bytes.len();
        let payload_units = units.len() + 1; // + NUL terminator
        let written = payload_units * 2;
        let padded = align_up(written, 4);
        self.data.bytes.resize(old_len + padded, 0);
        for (i, unit) in units.iter().enumerate() {
            self.data.bytes[old_len + i * 2..old_len + i * 2 + 2]
                .copy_from_slice(&unit.to_ne_bytes());
        }
        // NUL terminator word and any further padding are already zero from `resize`.
    }

    // ---- buffer / binder objects --------------------------------------

    fn write_buffer_object_raw(
        &mut self,
        ptr: *const u8,
        size: usize,
        parent: Option<Parent>,
    ) -> u32 {
        let index = self.data.prepare();
        let offset = self.data.bytes.len();
        let max = self.data.io.max_buffer_object_size();
        self.data.bytes.resize(offset + max, 0);
        let n = self
            .data
            .io
            .encode_buffer_object(&mut self.data.bytes[offset..], ptr, size, parent);
        self.data.bytes.truncate(offset + n);
        self.data.record_offset(offset as u32);
        self.data.add_buffers_size(size);
        index
    }

    /// Copies `data` into the arena and embeds a buffer object pointing at
    /// the copy. Returns the new offset entry's index, usable as a parent
    /// index for subsequent children. This is the safe, owning default;
    /// see [`Self::append_buffer_object_borrowed`] for zero-copy.
    pub fn append_buffer_object(&mut self, data: &[u8], parent: Option<Parent>) -> u32 {
        let ptr = self.data.arena_copy_bytes(data);
        self.write_buffer_object_raw(ptr, data.len(), parent)
    }

    /// Embeds a buffer object pointing directly at caller memory, without
    /// copying it into the arena.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `ptr..ptr+size` stays valid and
    /// unmoved for at least as long as this parcel (and anything the
    /// transport does with it) is alive. This is the one place the
    /// original's unenforced "caller-provided string that outlives the
    /// parcel" contract survives unchanged; prefer
    /// [`Self::append_buffer_object`] unless the copy is unacceptable.
    pub unsafe fn append_buffer_object_borrowed(
        &mut self,
        ptr: *const u8,
        size: usize,
        parent: Option<Parent>,
    ) -> u32 {
        self.write_buffer_object_raw(ptr, size, parent)
    }

    pub fn append_local_object(&mut self, obj: &LocalObject) {
        let offset = self.data.bytes.len();
        let max = self.data.io.max_binder_object_size();
        self.data.bytes.resize(offset + max, 0);
        let n = self.data.io.encode_local_object(&mut self.data.bytes[offset..], obj);
        self.data.bytes.truncate(offset + n);
        self.data.record_offset(offset as u32);
    }

    pub fn append_remote_object(&mut self, obj: &RemoteObject) {
        let offset = self.data.bytes.len();
        let max = self.data.io.max_binder_object_size();
        self.data.bytes.resize(offset + max, 0);
        let n = self.data.io.encode_remote_object(&mut self.data.bytes[offset..], obj);
        self.data.bytes.truncate(offset + n);
        self.data.record_offset(offset as u32);
    }

    // ---- HIDL ----------------------------------------------------------

    /// Appends a `hidl_string`: a descriptor buffer object, and — for
    /// non-null input — a second buffer object for the NUL-terminated
    /// bytes, parented to the descriptor's `str` field.
    pub fn append_hidl_string(&mut self, s: Option<&str>) {
        let (str_ptr, len) = match s {
            Some(s) => {
                let mut owned = Vec::with_capacity(s.len() + 1);
                owned.extend_from_slice(s.as_bytes());
                owned.push(0);
                let ptr = self.data.arena_copy_bytes(&owned);
                (ptr, s.len() as u32)
            }
            None => (std::ptr::null(), 0),
        };

        let desc_ptr = self.data.arena_push_hidl_string(HidlString::new(str_ptr, len, true));
        let desc_index =
            self.write_buffer_object_raw(desc_ptr as *const u8, size_of::<HidlString>(), None);

        if s.is_some() {
            let parent = Parent::new(desc_index, HIDL_STRING_BUFFER_OFFSET);
            self.write_buffer_object_raw(str_ptr, len as usize + 1, Some(parent));
        }
    }

    /// Appends a `hidl_vec<hidl_string>`: a vec descriptor, a contiguous
    /// array of `hidl_string` descriptors (parented to the vec), and one
    /// leaf buffer object per non-null element (parented to the array).
    pub fn append_hidl_string_vec(&mut self, items: &[Option<&str>]) {
        let count = items.len();

        if count == 0 {
            let vec_ptr = self.data.arena_push_hidl_vec(HidlVec::new(std::ptr::null(), 0, true));
            self.write_buffer_object_raw(vec_ptr as *const u8, size_of::<HidlVec>(), None);
            return;
        }

        let mut leaves: Vec<(*const u8, u32)> = Vec::with_capacity(count);
        for item in items {
            match item {
                Some(s) => {
                    let mut owned = Vec::with_capacity(s.len() + 1);
                    owned.extend_from_slice(s.as_bytes());
                    owned.push(0);
                    let ptr = self.data.arena_copy_bytes(&owned);
                    leaves.push((ptr, s.len() as u32));
                }
                None => leaves.push((std::ptr::null(), 0)),
            }
        }

        let hidl_strings: Vec<HidlString> = leaves
            .iter()
            .map(|&(ptr, len)| HidlString::new(ptr, len, !ptr.is_null()))
            .collect();
        let strings_ptr = self.data.arena_push_hidl_string_array(hidl_strings);

        let vec_ptr = self
            .data
            .arena_push_hidl_vec(HidlVec::new(strings_ptr as *const u8, count as u32, true));
        let vec_index =
            self.write_buffer_object_raw(vec_ptr as *const u8, size_of::<HidlVec>(), None);

        let array_parent = Parent::new(vec_index, HIDL_VEC_BUFFER_OFFSET);
        let array_index = self.write_buffer_object_raw(
            strings_ptr as *const u8,
            size_of::<HidlString>() * count,
            Some(array_parent),
        );

        for (i, &(ptr, len)) in leaves.iter().enumerate() {
            if !ptr.is_null() {
                let offset =
                    HIDL_STRING_BUFFER_OFFSET + (i as u32) * (size_of::<HidlString>() as u32);
                let leaf_parent = Parent::new(array_index, offset);
                self.write_buffer_object_raw(ptr, len as usize + 1, Some(leaf_parent));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Io64;

    #[test]
    fn bool_trip() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.write_bool(false);
        assert_eq!(w.bytes(), &[0x00, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn bool_true() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.write_bool(true);
        assert_eq!(w.bytes(), &[0x01, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn string8_hi() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_string8(Some("hi"));
        assert_eq!(w.bytes(), &[b'h', b'i', 0x00, 0x00]);
    }

    #[test]
    fn string8_none_writes_nothing() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_string8(None);
        assert!(w.bytes().is_empty());
    }

    #[test]
    fn string16_null() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_string16(None);
        assert_eq!(w.bytes(), &[0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn string16_empty_non_null() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_string16(Some(""));
        assert_eq!(w.bytes(), &[0, 0, 0, 0, 0, 0, 0xff, 0xff]);
    }

    #[test]
    fn string16_a() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_string16(Some("A"));
        assert_eq!(w.bytes(), &[0x01, 0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn hidl_string_records_two_offsets_and_buffers_size() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_hidl_string(Some("x"));
        assert_eq!(w.offsets().len(), 2);
        let expected = align_up(size_of::<HidlString>(), 8) + align_up(2, 8);
        assert_eq!(w.buffers_size() as usize, expected);
    }

    #[test]
    fn hidl_string_null_emits_only_descriptor() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_hidl_string(None);
        assert_eq!(w.offsets().len(), 1);
    }

    #[test]
    fn hidl_string_vec_records_four_offsets() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_hidl_string_vec(&[Some("a"), Some("b")]);
        assert_eq!(w.offsets().len(), 4);
    }

    #[test]
    fn buffer_object_index_is_usable_as_a_parent() {
        let io = Io64;
        let mut w = Writer::new(&io);
        let i0 = w.append_buffer_object(b"one", None);
        let i1 = w.append_buffer_object(b"two", Some(Parent::new(i0, 0)));
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(w.offsets().len(), 2);
    }
}
