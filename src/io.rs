//! The injected driver interface: the one seam where the codec defers to
//! kernel-ABI-specific knowledge it otherwise stays oblivious to.
//!
//! `IoVTable` mirrors libgbinder's `GBinderIo` function table. Two concrete
//! implementations are provided, one per historical binder kernel ABI
//! width — `Io32` and `Io64` — matching how `flat_binder_object` and
//! `binder_buffer_object` change size depending on whether
//! `binder_uintptr_t`/`binder_size_t` are 4 or 8 bytes wide. Driver-version
//! selection happens once, at transport construction time, outside this
//! crate; the codec itself only ever holds a `&dyn IoVTable`.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::hidl::Parent;

bitflags::bitflags! {
    /// Flag bits shared by `flat_binder_object.flags` and
    /// `binder_buffer_object.flags`. Only the bits each object kind actually
    /// uses are meaningful in that context.
    pub struct BinderObjectFlags: u32 {
        const ACCEPTS_FDS     = 0x100;
        const TXN_SECURITY_CTX = 0x1000;
        /// Set on a `binder_buffer_object` that carries a parent/offset
        /// patch point.
        const HAS_PARENT      = 0x20;
    }
}

macro_rules! pack_chars {
    ($c1:expr, $c2:expr, $c3:expr, $c4:expr) => {
        ((($c1 as u32) << 24) | (($c2 as u32) << 16) | (($c3 as u32) << 8) | ($c4 as u32))
    };
}

const BINDER_TYPE_LARGE: u8 = 0x85;

/// The `hdr.type` tag of a flat or buffer binder object, as packed
/// four-character codes (matching the kernel UAPI header).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum BinderObjectType {
    Binder = pack_chars!(b's', b'b', b'*', BINDER_TYPE_LARGE),
    WeakBinder = pack_chars!(b'w', b'b', b'*', BINDER_TYPE_LARGE),
    Handle = pack_chars!(b's', b'h', b'*', BINDER_TYPE_LARGE),
    WeakHandle = pack_chars!(b'w', b'h', b'*', BINDER_TYPE_LARGE),
    Ptr = pack_chars!(b'p', b't', b'*', BINDER_TYPE_LARGE),
}

/// A handle to a local object, resolved by the transport's object registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalObject {
    pub addr: usize,
    pub cookie: usize,
}

/// A handle to a remote object, decoded from a `flat_binder_object` or
/// resolved via the [`ObjectRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteObject {
    pub handle: u32,
}

/// A sub-buffer recovered by [`IoVTable::decode_buffer_object`]. Carries a
/// raw pointer because at this layer there's no lifetime to attach it to
/// yet; the [`crate::reader::Reader`] wraps it into a borrow-checked
/// [`crate::reader::Buffer`] before handing it to callers.
#[derive(Debug, Clone, Copy)]
pub struct RawBuffer {
    pub ptr: *const u8,
    pub len: usize,
}

/// Resolves addresses embedded in decoded binder objects back to local
/// object handles. A stand-in for the full local/remote object lifecycle
/// manager, which is out of scope for the codec.
pub trait ObjectRegistry {
    fn resolve_local(&self, addr: usize) -> Option<LocalObject>;
}

/// The driver-specific encode/decode operations the codec defers to.
pub trait IoVTable: Send + Sync {
    /// Upper bound on the number of bytes [`Self::encode_local_object`] or
    /// [`Self::encode_remote_object`] will write.
    fn max_binder_object_size(&self) -> usize;
    /// Upper bound on the number of bytes [`Self::encode_buffer_object`]
    /// will write.
    fn max_buffer_object_size(&self) -> usize;

    fn encode_local_object(&self, dest: &mut [u8], obj: &LocalObject) -> usize;
    fn encode_remote_object(&self, dest: &mut [u8], obj: &RemoteObject) -> usize;
    fn encode_buffer_object(
        &self,
        dest: &mut [u8],
        ptr: *const u8,
        size: usize,
        parent: Option<Parent>,
    ) -> usize;

    fn decode_binder_object(
        &self,
        src: &[u8],
        registry: &dyn ObjectRegistry,
    ) -> (usize, Option<RemoteObject>);

    fn decode_buffer_object(&self, buffer: &[u8], offset: usize) -> (usize, Option<RawBuffer>);
}

/// 64-bit binder kernel ABI: `binder_uintptr_t`/`binder_size_t` are 8 bytes.
/// `flat_binder_object` is 24 bytes, `binder_buffer_object` is 40 bytes.
pub struct Io64;

/// 32-bit binder kernel ABI: `binder_uintptr_t`/`binder_size_t` are 4 bytes.
/// `flat_binder_object` is 16 bytes, `binder_buffer_object` is 24 bytes.
pub struct Io32;

impl IoVTable for Io64 {
    fn max_binder_object_size(&self) -> usize {
        24
    }
    fn max_buffer_object_size(&self) -> usize {
        40
    }

    fn encode_local_object(&self, dest: &mut [u8], obj: &LocalObject) -> usize {
        let mut c = Cursor::new(dest);
        let _ = c.write_u32::<NativeEndian>(BinderObjectType::Binder as u32);
        let _ = c.write_u32::<NativeEndian>(0);
        let _ = c.write_u64::<NativeEndian>(obj.addr as u64);
        let _ = c.write_u64::<NativeEndian>(obj.cookie as u64);
        24
    }

    fn encode_remote_object(&self, dest: &mut [u8], obj: &RemoteObject) -> usize {
        let mut c = Cursor::new(dest);
        let _ = c.write_u32::<NativeEndian>(BinderObjectType::Handle as u32);
        let _ = c.write_u32::<NativeEndian>(0);
        let _ = c.write_u32::<NativeEndian>(obj.handle);
        let _ = c.write_u32::<NativeEndian>(0); // handle is padded to the union's 8-byte width
        let _ = c.write_u64::<NativeEndian>(0); // cookie, unused for handles
        24
    }

    fn encode_buffer_object(
        &self,
        dest: &mut [u8],
        ptr: *const u8,
        size: usize,
        parent: Option<Parent>,
    ) -> usize {
        let flags = if parent.is_some() {
            BinderObjectFlags::HAS_PARENT.bits()
        } else {
            0
        };
        let (parent_index, parent_offset) = match parent {
            Some(p) => (p.index, p.offset),
            None => (0, 0),
        };
        let mut c = Cursor::new(dest);
        let _ = c.write_u32::<NativeEndian>(BinderObjectType::Ptr as u32);
        let _ = c.write_u32::<NativeEndian>(flags);
        let _ = c.write_u64::<NativeEndian>(ptr as u64);
        let _ = c.write_u64::<NativeEndian>(size as u64);
        let _ = c.write_u64::<NativeEndian>(parent_index as u64);
        let _ = c.write_u64::<NativeEndian>(parent_offset as u64);
        40
    }

    fn decode_binder_object(
        &self,
        src: &[u8],
        registry: &dyn ObjectRegistry,
    ) -> (usize, Option<RemoteObject>) {
        if src.len() < 24 {
            return (0, None);
        }
        let mut c = Cursor::new(src);
        let tag = c.read_u32::<NativeEndian>().unwrap_or(0);
        let _flags = c.read_u32::<NativeEndian>().unwrap_or(0);
        let binder_or_handle = c.read_u64::<NativeEndian>().unwrap_or(0);
        let _cookie = c.read_u64::<NativeEndian>().unwrap_or(0);

        match num_traits::FromPrimitive::from_u32(tag) {
            Some(BinderObjectType::Handle) | Some(BinderObjectType::WeakHandle) => {
                (24, Some(RemoteObject { handle: binder_or_handle as u32 }))
            }
            Some(BinderObjectType::Binder) | Some(BinderObjectType::WeakBinder) => {
                let local = registry.resolve_local(binder_or_handle as usize);
                (24, local.map(|l| RemoteObject { handle: l.addr as u32 }))
            }
            _ => (0, None),
        }
    }

    fn decode_buffer_object(&self, buffer: &[u8], offset: usize) -> (usize, Option<RawBuffer>) {
        if buffer.len() < offset || buffer[offset..].len() < 40 {
            return (0, None);
        }
        let mut c = Cursor::new(&buffer[offset..]);
        let tag = c.read_u32::<NativeEndian>().unwrap_or(0);
        let _flags = c.read_u32::<NativeEndian>().unwrap_or(0);
        let addr = c.read_u64::<NativeEndian>().unwrap_or(0);
        let len = c.read_u64::<NativeEndian>().unwrap_or(0);

        if num_traits::FromPrimitive::from_u32(tag) != Some(BinderObjectType::Ptr) {
            return (0, None);
        }
        // Safety boundary: `addr` is a raw address embedded by a matching
        // `encode_buffer_object` call earlier in this process (or, on a real
        // device, patched in by the kernel). Recovering it as a slice is the
        // one unsafe step the whole codec needs.
        (40, Some(RawBuffer { ptr: addr as *const u8, len: len as usize }))
    }
}

impl IoVTable for Io32 {
    fn max_binder_object_size(&self) -> usize {
        16
    }
    fn max_buffer_object_size(&self) -> usize {
        24
    }

    fn encode_local_object(&self, dest: &mut [u8], obj: &LocalObject) -> usize {
        let mut c = Cursor::new(dest);
        let _ = c.write_u32::<NativeEndian>(BinderObjectType::Binder as u32);
        let _ = c.write_u32::<NativeEndian>(0);
        let _ = c.write_u32::<NativeEndian>(obj.addr as u32);
        let _ = c.write_u32::<NativeEndian>(obj.cookie as u32);
        16
    }

    fn encode_remote_object(&self, dest: &mut [u8], obj: &RemoteObject) -> usize {
        let mut c = Cursor::new(dest);
        let _ = c.write_u32::<NativeEndian>(BinderObjectType::Handle as u32);
        let _ = c.write_u32::<NativeEndian>(0);
        let _ = c.write_u32::<NativeEndian>(obj.handle);
        let _ = c.write_u32::<NativeEndian>(0); // cookie, unused for handles
        16
    }

    fn encode_buffer_object(
        &self,
        dest: &mut [u8],
        ptr: *const u8,
        size: usize,
        parent: Option<Parent>,
    ) -> usize {
        let flags = if parent.is_some() {
            BinderObjectFlags::HAS_PARENT.bits()
        } else {
            0
        };
        let (parent_index, parent_offset) = match parent {
            Some(p) => (p.index, p.offset),
            None => (0, 0),
        };
        let mut c = Cursor::new(dest);
        let _ = c.write_u32::<NativeEndian>(BinderObjectType::Ptr as u32);
        let _ = c.write_u32::<NativeEndian>(flags);
        let _ = c.write_u32::<NativeEndian>(ptr as u32);
        let _ = c.write_u32::<NativeEndian>(size as u32);
        let _ = c.write_u32::<NativeEndian>(parent_index);
        let _ = c.write_u32::<NativeEndian>(parent_offset);
        24
    }

    fn decode_binder_object(
        &self,
        src: &[u8],
        registry: &dyn ObjectRegistry,
    ) -> (usize, Option<RemoteObject>) {
        if src.len() < 16 {
            return (0, None);
        }
        let mut c = Cursor::new(src);
        let tag = c.read_u32::<NativeEndian>().unwrap_or(0);
        let _flags = c.read_u32::<NativeEndian>().unwrap_or(0);
        let binder_or_handle = c.read_u32::<NativeEndian>().unwrap_or(0);
        let _cookie = c.read_u32::<NativeEndian>().unwrap_or(0);

        match num_traits::FromPrimitive::from_u32(tag) {
            Some(BinderObjectType::Handle) | Some(BinderObjectType::WeakHandle) => {
                (16, Some(RemoteObject { handle: binder_or_handle }))
            }
            Some(BinderObjectType::Binder) | Some(BinderObjectType::WeakBinder) => {
                let local = registry.resolve_local(binder_or_handle as usize);
                (16, local.map(|l| RemoteObject { handle: l.addr as u32 }))
            }
            _ => (0, None),
        }
    }

    fn decode_buffer_object(&self, buffer: &[u8], offset: usize) -> (usize, Option<RawBuffer>) {
        if buffer.len() < offset || buffer[offset..].len() < 24 {
            return (0, None);
        }
        let mut c = Cursor::new(&buffer[offset..]);
        let tag = c.read_u32::<NativeEndian>().unwrap_or(0);
        let _flags = c.read_u32::<NativeEndian>().unwrap_or(0);
        let addr = c.read_u32::<NativeEndian>().unwrap_or(0);
        let len = c.read_u32::<NativeEndian>().unwrap_or(0);

        if num_traits::FromPrimitive::from_u32(tag) != Some(BinderObjectType::Ptr) {
            return (0, None);
        }
        (24, Some(RawBuffer { ptr: addr as *const u8, len: len as usize }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyRegistry;
    impl ObjectRegistry for EmptyRegistry {
        fn resolve_local(&self, _addr: usize) -> Option<LocalObject> {
            None
        }
    }

    #[test]
    fn io64_buffer_object_round_trips_through_its_own_wire_format() {
        let io = Io64;
        let data = b"hello".to_vec();
        let mut dest = vec![0u8; io.max_buffer_object_size()];
        let n = io.encode_buffer_object(&mut dest, data.as_ptr(), data.len(), None);
        assert_eq!(n, 40);

        let (eaten, buf) = io.decode_buffer_object(&dest, 0);
        assert_eq!(eaten, 40);
        let buf = buf.expect("buffer object should decode");
        assert_eq!(buf.len, data.len());
        assert_eq!(buf.ptr, data.as_ptr());
    }

    #[test]
    fn io32_buffer_object_is_twenty_four_bytes() {
        let io = Io32;
        let data = [1u8, 2, 3];
        let mut dest = vec![0u8; io.max_buffer_object_size()];
        let n = io.encode_buffer_object(&mut dest, data.as_ptr(), data.len(), Some(Parent::new(1, 4)));
        assert_eq!(n, 24);
        let (eaten, buf) = io.decode_buffer_object(&dest, 0);
        assert_eq!(eaten, 24);
        assert!(buf.is_some());
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let io = Io64;
        let short = [0u8; 4];
        assert_eq!(io.decode_buffer_object(&short, 0), (0, None));
        let reg = EmptyRegistry;
        assert_eq!(io.decode_binder_object(&short, &reg), (0, None));
    }
}
