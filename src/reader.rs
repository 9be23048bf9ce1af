//! Position-based parcel decoder. Mirrors `gbinder_reader.c` method for
//! method; every fallible read returns a [`ReaderError`] instead of a
//! boolean/NULL, and a successfully decoded out-of-line sub-buffer comes
//! back as a borrow-checked [`Buffer`] instead of a pointer the caller must
//! remember to free.

use std::cmp::Ordering;
use std::mem::size_of;

use crate::error::ReaderError;
use crate::hidl::{HidlString, HidlVec};
use crate::io::{IoVTable, ObjectRegistry, RemoteObject};

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// An out-of-line sub-buffer recovered by [`Reader::read_buffer`]. Its
/// lifetime is tied to the backing parcel bytes (or, for a HIDL pointer
/// target, to whatever the writer's arena is keeping alive) — it can never
/// outlive the data it borrows.
#[derive(Debug, Clone, Copy)]
pub struct Buffer<'a> {
    data: &'a [u8],
}

impl<'a> Buffer<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reads a parcel previously produced by a [`crate::writer::Writer`] (or an
/// equivalent byte stream and object-offset table).
pub struct Reader<'a> {
    full: &'a [u8],
    start: usize,
    end: usize,
    pos: usize,
    objects: &'a [u32],
    next_object_idx: usize,
    io: &'a dyn IoVTable,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8], objects: &'a [u32], io: &'a dyn IoVTable) -> Self {
        Self {
            full: bytes,
            start: 0,
            end: bytes.len(),
            pos: 0,
            objects,
            next_object_idx: 0,
            io,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    pub fn bytes_read(&self) -> usize {
        self.pos - self.start
    }

    pub fn bytes_remaining(&self) -> usize {
        self.end - self.pos
    }

    fn can_read(&self, len: usize) -> bool {
        self.end - self.pos >= len
    }

    // ---- scalars ---------------------------------------------------

    pub fn read_byte(&mut self) -> Result<u8, ReaderError> {
        if self.pos < self.end {
            let v = self.full[self.pos];
            self.pos += 1;
            Ok(v)
        } else {
            Err(ReaderError::InsufficientInput)
        }
    }

    /// Booleans are padded to 4 bytes; only the first byte is meaningful,
    /// matching the writer (and the original, which never checks the
    /// padding bytes on the way in).
    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        if self.can_read(4) {
            let v = self.full[self.pos] != 0;
            self.pos += 4;
            Ok(v)
        } else {
            Err(ReaderError::InsufficientInput)
        }
    }

    pub fn read_i32(&mut self) -> Result<i32, ReaderError> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        if self.can_read(4) {
            let bytes: [u8; 4] = self.full[self.pos..self.pos + 4]
                .try_into()
                .expect("length checked above");
            self.pos += 4;
            Ok(u32::from_ne_bytes(bytes))
        } else {
            Err(ReaderError::InsufficientInput)
        }
    }

    pub fn read_i64(&mut self) -> Result<i64, ReaderError> {
        self.read_u64().map(|v| v as i64)
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        if self.can_read(8) {
            let bytes: [u8; 8] = self.full[self.pos..self.pos + 8]
                .try_into()
                .expect("length checked above");
            self.pos += 8;
            Ok(u64::from_ne_bytes(bytes))
        } else {
            Err(ReaderError::InsufficientInput)
        }
    }

    // ---- AIDL strings ------------------------------------------------

    /// Scans for the NUL terminator within the remaining input; there is no
    /// null-string encoding at this layer, just success or failure to find
    /// one within bounds.
    pub fn read_string8(&mut self) -> Result<&'a str, ReaderError> {
        let mut i = self.pos;
        while i < self.end && self.full[i] != 0 {
            i += 1;
        }
        if i >= self.end {
            return Err(ReaderError::InsufficientInput);
        }
        let len = i - self.pos;
        let padded = align_up(len + 1, 4);
        if self.pos + padded > self.end {
            return Err(ReaderError::InsufficientInput);
        }
        let s = std::str::from_utf8(&self.full[self.pos..self.pos + len])
            .map_err(|_| ReaderError::Malformed)?;
        self.pos += padded;
        Ok(s)
    }

    fn peek_string16_len(&self) -> Result<i32, ReaderError> {
        if !self.can_read(4) {
            return Err(ReaderError::InsufficientInput);
        }
        let bytes: [u8; 4] = self.full[self.pos..self.pos + 4]
            .try_into()
            .expect("length checked above");
        Ok(i32::from_ne_bytes(bytes))
    }

    pub fn read_string16(&mut self) -> Result<Option<String>, ReaderError> {
        let len = self.peek_string16_len()?;
        if len == -1 {
            self.pos += 4;
            return Ok(None);
        }
        if len < 0 {
            return Err(ReaderError::Malformed);
        }
        let len = len as usize;
        let padded = align_up((len + 1) * 2, 4);
        if self.pos + 4 + padded > self.end {
            return Err(ReaderError::InsufficientInput);
        }
        let units_start = self.pos + 4;
        let units: Vec<u16> = (0..len)
            .map(|i| {
                let off = units_start + i * 2;
                u16::from_ne_bytes([self.full[off], self.full[off + 1]])
            })
            .collect();
        let s = String::from_utf16(&units).map_err(|_| ReaderError::Malformed)?;
        self.pos += 4 + padded;
        Ok(Some(s))
    }

    pub fn skip_string16(&mut self) -> Result<(), ReaderError> {
        let len = self.peek_string16_len()?;
        if len == -1 {
            self.pos += 4;
            return Ok(());
        }
        if len < 0 {
            return Err(ReaderError::Malformed);
        }
        let padded = align_up((len as usize + 1) * 2, 4);
        if self.pos + 4 + padded > self.end {
            return Err(ReaderError::InsufficientInput);
        }
        self.pos += 4 + padded;
        Ok(())
    }

    // ---- objects / buffers ---------------------------------------------

    /// Compares the next recorded object offset against the cursor, or
    /// `None` if there are no more recorded objects at all.
    fn next_expected_object(&self) -> Option<Ordering> {
        self.objects
            .get(self.next_object_idx)
            .map(|&off| (off as usize).cmp(&self.pos))
    }

    pub fn read_object(
        &mut self,
        registry: &dyn ObjectRegistry,
    ) -> Result<Option<RemoteObject>, ReaderError> {
        match self.next_expected_object() {
            None => Ok(None),
            Some(Ordering::Equal) => {
                let (eaten, obj) = self
                    .io
                    .decode_binder_object(&self.full[self.pos..self.end], registry);
                if eaten == 0 {
                    return Err(ReaderError::Malformed);
                }
                self.pos += eaten;
                self.next_object_idx += 1;
                Ok(obj)
            }
            Some(Ordering::Greater) => Err(ReaderError::OutOfOrderObject),
            Some(Ordering::Less) => Err(ReaderError::Malformed),
        }
    }

    pub fn read_buffer(&mut self) -> Result<Option<Buffer<'a>>, ReaderError> {
        match self.next_expected_object() {
            None => Ok(None),
            Some(Ordering::Equal) => {
                let (eaten, raw) = self.io.decode_buffer_object(self.full, self.pos);
                if eaten == 0 {
                    return Err(ReaderError::Malformed);
                }
                self.pos += eaten;
                self.next_object_idx += 1;
                match raw {
                    // Safety: `ptr`/`len` were produced by a matching
                    // `encode_buffer_object` call and the memory is kept
                    // alive by the writer's arena for at least `'a` — the
                    // one unsafe contract the reader carries.
                    Some(r) => {
                        let data = unsafe { std::slice::from_raw_parts(r.ptr, r.len) };
                        Ok(Some(Buffer { data }))
                    }
                    None => Ok(None),
                }
            }
            Some(Ordering::Greater) => Err(ReaderError::OutOfOrderObject),
            Some(Ordering::Less) => Err(ReaderError::Malformed),
        }
    }

    pub fn skip_buffer(&mut self) -> Result<(), ReaderError> {
        self.read_buffer().map(|_| ())
    }

    // ---- HIDL ----------------------------------------------------------

    /// Reads a `hidl_string`: a descriptor buffer, and — unless the
    /// descriptor's pointer is null — a second buffer carrying the
    /// NUL-terminated bytes it points at. Every structural mismatch is
    /// logged and treated as absence, matching the original's
    /// always-return-NULL-on-trouble behavior.
    pub fn read_hidl_string(&mut self) -> Option<String> {
        let desc = match self.read_buffer() {
            Ok(Some(b)) => b,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("hidl_string descriptor read failed: {}", e);
                return None;
            }
        };
        if desc.data.len() != size_of::<HidlString>() {
            log::warn!("unexpected hidl_string descriptor size {}", desc.data.len());
            return None;
        }
        // Safety: size just checked against the exact repr(C) layout.
        let s: &HidlString = unsafe { &*(desc.data.as_ptr() as *const HidlString) };
        if s.str_ptr.is_null() {
            return None;
        }

        let sbuf = match self.read_buffer() {
            Ok(Some(b)) => b,
            Ok(None) => {
                log::warn!("hidl_string data buffer missing");
                return None;
            }
            Err(e) => {
                log::warn!("hidl_string data buffer read failed: {}", e);
                return None;
            }
        };
        if sbuf.data.len() != s.len as usize + 1
            || sbuf.data.as_ptr() != s.str_ptr
            || sbuf.data[s.len as usize] != 0
        {
            log::warn!("hidl_string data buffer does not match its descriptor");
            return None;
        }
        std::str::from_utf8(&sbuf.data[..s.len as usize])
            .ok()
            .map(String::from)
    }

    /// Reads a `hidl_vec<hidl_string>`. Elements whose descriptor has a
    /// null pointer contribute `None` without expecting a leaf buffer —
    /// matching how this crate's own writer emits per-element nulls
    /// (the original C reader does not handle this case distinctly).
    pub fn read_hidl_string_vec(&mut self) -> Option<Vec<Option<String>>> {
        let vec_buf = match self.read_buffer() {
            Ok(Some(b)) => b,
            Ok(None) => {
                log::warn!("hidl_vec<string> descriptor missing");
                return None;
            }
            Err(e) => {
                log::warn!("hidl_vec<string> descriptor read failed: {}", e);
                return None;
            }
        };
        if vec_buf.data.len() != size_of::<HidlVec>() {
            log::warn!("unexpected hidl_vec descriptor size {}", vec_buf.data.len());
            return None;
        }
        let vec: &HidlVec = unsafe { &*(vec_buf.data.as_ptr() as *const HidlVec) };
        let count = vec.count as usize;

        if vec.data_ptr.is_null() {
            return if count == 0 {
                Some(Vec::new())
            } else {
                log::warn!("hidl_vec<string> null data pointer with nonzero count");
                None
            };
        }

        let array_buf = match self.read_buffer() {
            Ok(Some(b)) => b,
            Ok(None) => {
                log::warn!("hidl_vec<string> element array missing");
                return None;
            }
            Err(e) => {
                log::warn!("hidl_vec<string> element array read failed: {}", e);
                return None;
            }
        };
        if array_buf.data.as_ptr() != vec.data_ptr
            || array_buf.data.len() != size_of::<HidlString>() * count
        {
            log::warn!("hidl_vec<string> element array does not match its descriptor");
            return None;
        }
        // Safety: size just checked as exactly `count` contiguous HidlStrings.
        let strings: &[HidlString] = unsafe {
            std::slice::from_raw_parts(array_buf.data.as_ptr() as *const HidlString, count)
        };

        let mut out = Vec::with_capacity(count);
        for s in strings {
            if s.str_ptr.is_null() {
                out.push(None);
                continue;
            }
            let sbuf = match self.read_buffer() {
                Ok(Some(b)) => b,
                Ok(None) => {
                    log::warn!("hidl_vec<string> element buffer missing");
                    return None;
                }
                Err(e) => {
                    log::warn!("hidl_vec<string> element buffer read failed: {}", e);
                    return None;
                }
            };
            if sbuf.data.len() != s.len as usize + 1
                || sbuf.data.as_ptr() != s.str_ptr
                || sbuf.data[s.len as usize] != 0
            {
                log::warn!("hidl_vec<string> element buffer does not match its descriptor");
                return None;
            }
            match std::str::from_utf8(&sbuf.data[..s.len as usize]) {
                Ok(v) => out.push(Some(v.to_string())),
                Err(_) => {
                    log::warn!("hidl_vec<string> element is not valid utf-8");
                    return None;
                }
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Io64, LocalObject};
    use crate::writer::Writer;

    struct EmptyRegistry;
    impl ObjectRegistry for EmptyRegistry {
        fn resolve_local(&self, _addr: usize) -> Option<LocalObject> {
            None
        }
    }

    #[test]
    fn scalar_truncated_input_errors() {
        let bytes = [0u8; 2];
        let io = Io64;
        let mut r = Reader::new(&bytes, &[], &io);
        assert_eq!(r.read_i32(), Err(ReaderError::InsufficientInput));
    }

    #[test]
    fn bool_round_trip() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.write_bool(true);
        w.write_bool(false);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(r.read_bool(), Ok(true));
        assert_eq!(r.read_bool(), Ok(false));
        assert!(r.at_end());
    }

    #[test]
    fn string8_round_trip() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_string8(Some("hi"));
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(r.read_string8(), Ok("hi"));
    }

    #[test]
    fn string8_missing_nul_is_insufficient_input() {
        let bytes = [b'h', b'i', b'x', b'y'];
        let io = Io64;
        let mut r = Reader::new(&bytes, &[], &io);
        assert_eq!(r.read_string8(), Err(ReaderError::InsufficientInput));
    }

    #[test]
    fn string16_round_trip() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_string16(Some("A"));
        w.append_string16(None);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(r.read_string16(), Ok(Some("A".to_string())));
        assert_eq!(r.read_string16(), Ok(None));
    }

    #[test]
    fn string16_rejects_bad_length() {
        let bytes = (-2i32).to_ne_bytes();
        let io = Io64;
        let mut r = Reader::new(&bytes, &[], &io);
        assert_eq!(r.read_string16(), Err(ReaderError::Malformed));
    }

    #[test]
    fn buffer_object_round_trips() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_buffer_object(b"hello", None);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        let buf = r.read_buffer().unwrap().expect("buffer present");
        assert_eq!(buf.bytes(), b"hello");
        assert!(r.at_end());
    }

    #[test]
    fn reading_object_ahead_of_cursor_is_out_of_order() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.write_i32(1);
        w.append_buffer_object(b"x", None);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        let reg = EmptyRegistry;
        assert_eq!(r.read_object(&reg), Err(ReaderError::OutOfOrderObject));
    }

    #[test]
    fn hidl_string_round_trips() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_hidl_string(Some("x"));
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(r.read_hidl_string(), Some("x".to_string()));
    }

    #[test]
    fn hidl_string_null_round_trips() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_hidl_string(None);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(r.read_hidl_string(), None);
    }

    #[test]
    fn hidl_string_vec_round_trips() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_hidl_string_vec(&[Some("a"), Some("b")]);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(
            r.read_hidl_string_vec(),
            Some(vec![Some("a".to_string()), Some("b".to_string())])
        );
    }

    #[test]
    fn empty_hidl_string_vec_round_trips() {
        let io = Io64;
        let mut w = Writer::new(&io);
        w.append_hidl_string_vec(&[]);
        let mut r = Reader::new(w.bytes(), w.offsets(), &io);
        assert_eq!(r.read_hidl_string_vec(), Some(Vec::new()));
    }
}
