//! A tiled raw-DEFLATE stream.
//!
//! The payload is split into 64 KiB tiles which are compressed independently, so that a decoder can
//! inflate all tiles in parallel. A small header and a table of tile offsets precede the tile data.

#![allow(clippy::unreadable_literal)]

mod compression;
mod header;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use crate::compression::{compress, crc32, decompress, decompress_into, payload_size};
pub use crate::header::{header_size, TileStreamHeader, HEADER_LEN, TILE_SIZE};

#[derive(Error, Debug)]
pub enum TileStreamError {
    #[error("Invalid tile stream header: {reason}")]
    InvalidHeader { reason: &'static str },

    #[error("The stream declares {declared} tiles, but the output needs {expected}")]
    TileCountMismatch { declared: usize, expected: usize },

    #[error("Tile {tile} is out of bounds of the compressed data")]
    TileOutOfBounds { tile: usize },

    #[error("Failed to inflate tile {tile}: {source}")]
    Inflate { tile: usize, source: std::io::Error },

    #[error("Decompressed {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}
