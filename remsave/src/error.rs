use thiserror::Error;

/// The specific failure kinds raised while decoding.
///
/// Kinds that are raised at a known cursor position carry that position in
/// an `offset` field; everything else gets its offset from the
/// [`DecodeError`] wrapper when it reaches the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),

    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("chunk {chunk_index} exceeds the size caps")]
    ChunkTooLarge { chunk_index: usize },

    #[error("chunk {chunk_index} failed to inflate")]
    InflateFailed {
        chunk_index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("end of input inside chunk {chunk_index}")]
    TruncatedChunk { chunk_index: usize },

    #[error("unsupported save file version {version} (uncompressed legacy format)")]
    UnsupportedVersion { version: u32 },

    #[error("name index {index} out of range for table of {len} entries at offset {offset}")]
    NameIndexOutOfRange { index: u16, len: usize, offset: u64 },

    #[error("object index {index} out of range for table of {len} entries at offset {offset}")]
    ObjectIndexOutOfRange { index: i32, len: usize, offset: u64 },

    #[error("unknown property type {name:?} at offset {offset}")]
    UnknownPropertyType { name: String, offset: u64 },

    #[error("negative string length {length} at offset {offset}")]
    NegativeStringLength { length: i32, offset: u64 },

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(error),
        }
    }
}

/// An [`Error`] tagged with the absolute byte offset the cursor had reached
/// when decoding stopped.
#[derive(Debug, Error)]
#[error("decode failed at offset {offset}: {error}")]
pub struct DecodeError {
    pub offset: u64,
    #[source]
    pub error: Error,
}
