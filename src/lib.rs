//! Android Binder parcel codec: a reader/writer pair that serializes typed
//! values into the bit-exact byte layouts the kernel Binder driver (and the
//! HIDL/AIDL runtimes built on top of it) expect, with the kernel-ABI- and
//! transport-specific pieces pushed behind an injected [`io::IoVTable`].
//!
//! Building and sending an actual transaction — opening `/dev/binder`,
//! `ioctl`/`mmap`, service discovery, looper threads, interface tokens — is
//! out of scope; this crate only speaks the wire format.

mod error;
mod hidl;
mod io;
mod parcel_data;
mod parcelable;
mod reader;
mod writer;

pub use error::{Error, ReaderError};
pub use hidl::{HidlString, HidlVec, Parent};
pub use io::{
    BinderObjectFlags, BinderObjectType, Io32, Io64, IoVTable, LocalObject, ObjectRegistry,
    RawBuffer, RemoteObject,
};
pub use parcelable::{Parcelable, String8};
pub use reader::{Buffer, Reader};
pub use writer::Writer;

pub use parcelable_derive::Parcelable;
