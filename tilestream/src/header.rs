use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::TileStreamError;

pub const STREAM_ID: u8 = 4;
pub const TILE_SIZE: usize = 64 * 1024;
pub const HEADER_LEN: usize = 8;

const TILE_SIZE_IDX: u32 = 1;
const LAST_TILE_BITS: u32 = 18;

/// Size of the header plus tile table in front of the tile data, for a payload of `uncompressed_size` bytes.
pub fn header_size(uncompressed_size: u64) -> u64 {
    HEADER_LEN as u64 + 4 * uncompressed_size.div_ceil(TILE_SIZE as u64)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileStreamHeader {
    pub num_tiles: u16,
    /// Uncompressed size of the last tile; 0 for an empty stream.
    pub last_tile_size: u32,
}

impl TileStreamHeader {
    pub fn for_size(uncompressed_size: usize) -> Result<TileStreamHeader, TileStreamError> {
        let tiles = uncompressed_size.div_ceil(TILE_SIZE);
        let num_tiles = u16::try_from(tiles).map_err(|_| TileStreamError::InvalidHeader {
            reason: "Payload needs more than 65535 tiles",
        })?;

        let last_tile_size = match uncompressed_size % TILE_SIZE {
            0 if tiles > 0 => TILE_SIZE,
            rest => rest,
        };

        Ok(TileStreamHeader {
            num_tiles,
            last_tile_size: last_tile_size as u32,
        })
    }

    pub fn uncompressed_size(&self) -> usize {
        match self.num_tiles {
            0 => 0,
            n => (n as usize - 1) * TILE_SIZE + self.last_tile_size as usize,
        }
    }

    pub fn read<R: Read>(rdr: &mut R) -> Result<TileStreamHeader, TileStreamError> {
        let id = rdr.read_u8()?;
        let magic = rdr.read_u8()?;
        if id != STREAM_ID || magic != id ^ 0xFF {
            return Err(TileStreamError::InvalidHeader {
                reason: "Unknown stream id",
            });
        }

        let num_tiles = rdr.read_u16::<LittleEndian>()?;
        let packed = rdr.read_u32::<LittleEndian>()?;

        if packed & 0b11 != TILE_SIZE_IDX {
            return Err(TileStreamError::InvalidHeader {
                reason: "Unsupported tile size",
            });
        }

        let last_tile_size = (packed >> 2) & ((1 << LAST_TILE_BITS) - 1);
        if last_tile_size as usize > TILE_SIZE {
            return Err(TileStreamError::InvalidHeader {
                reason: "Last tile is larger than a tile",
            });
        }

        Ok(TileStreamHeader {
            num_tiles,
            last_tile_size,
        })
    }

    pub fn write<W: Write>(&self, wtr: &mut W) -> Result<(), TileStreamError> {
        wtr.write_u8(STREAM_ID)?;
        wtr.write_u8(STREAM_ID ^ 0xFF)?;
        wtr.write_u16::<LittleEndian>(self.num_tiles)?;
        wtr.write_u32::<LittleEndian>(TILE_SIZE_IDX | (self.last_tile_size << 2))?;
        Ok(())
    }
}
