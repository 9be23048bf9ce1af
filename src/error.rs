use thiserror::Error;

/// The three reader-side failure kinds the codec distinguishes.
///
/// The writer cannot fail on well-formed input; allocation failure is fatal
/// to the process the way it is everywhere else in Rust, not a `Result`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderError {
    /// A typed read would extend past the end of the input. The cursor is
    /// left unchanged.
    #[error("not enough input remaining")]
    InsufficientInput,
    /// A structural rule was violated (bad string16 length, missing NUL,
    /// buffer-object size mismatch, HIDL pointer-identity failure, ...).
    #[error("malformed parcel data")]
    Malformed,
    /// An object read was attempted while the next expected object position
    /// is still ahead of the cursor.
    #[error("object read out of order")]
    OutOfOrderObject,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("stdio error")]
    StdioError(#[from] std::io::Error),
    #[error("utf-16 error")]
    Utf16Error(#[from] std::string::FromUtf16Error),
    #[error("utf-8 error")]
    Utf8Error(#[from] std::string::FromUtf8Error),
    #[error("deserialization error")]
    DeserializationError,
    #[error("bad enum value")]
    BadEnumValue,
    #[error(transparent)]
    Reader(#[from] ReaderError),
}
