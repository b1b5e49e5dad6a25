use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("The file's magic value does not match the expectation {magic:#010x}")]
    InvalidMagicValue { magic: u32 },

    #[error("The file is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    #[error("Unsupported container version {version}")]
    UnsupportedVersion { version: u32 },

    /// The compression tag of a footprint is neither `None` nor `GDeflate`.
    #[error("Unsupported compression type {tag}")]
    UnsupportedCompression { tag: u32 },

    #[error("Missing mandatory {chunk} chunk")]
    MissingChunk { chunk: &'static str },

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    StringConversationError(#[from] std::ffi::IntoStringError),

    #[error(transparent)]
    Compression(#[from] tilestream::TileStreamError),
}

pub mod common;
pub mod container;
pub mod footprint;
pub mod metadata;
