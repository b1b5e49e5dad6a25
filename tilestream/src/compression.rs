use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use log::trace;

use crate::header::{TileStreamHeader, HEADER_LEN, TILE_SIZE};
use crate::TileStreamError;

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

/// Compresses `data` into a tile stream. `level` is the DEFLATE level (0-9).
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>, TileStreamError> {
    let header = TileStreamHeader::for_size(data.len())?;

    let tiles = data
        .chunks(TILE_SIZE)
        .map(|tile| {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level.min(9)));
            encoder.write_all(tile)?;
            encoder.finish()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let table_len = tiles.len() * 4;
    let data_len: usize = tiles.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(HEADER_LEN + table_len + data_len);
    header.write(&mut out)?;

    // Entry 0 holds the size of the last tile, all others the start of their tile.
    let mut start = 0u32;
    for (index, tile) in tiles.iter().enumerate() {
        if index == 0 {
            let last = tiles.last().map_or(0, Vec::len);
            out.write_u32::<LittleEndian>(last as u32)?;
        } else {
            out.write_u32::<LittleEndian>(start)?;
        }
        start += tile.len() as u32;
    }

    for tile in &tiles {
        out.extend_from_slice(tile);
    }

    trace!("Compressed {} bytes into {} tiles, {} bytes", data.len(), tiles.len(), out.len());
    Ok(out)
}

/// Inflates a tile stream into `dst`, which has to be exactly as large as the uncompressed payload.
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<(), TileStreamError> {
    let mut rdr = Cursor::new(src);
    let header = TileStreamHeader::read(&mut rdr)?;

    let expected_tiles = dst.len().div_ceil(TILE_SIZE);
    if header.num_tiles as usize != expected_tiles {
        return Err(TileStreamError::TileCountMismatch {
            declared: header.num_tiles as usize,
            expected: expected_tiles,
        });
    }

    if header.uncompressed_size() != dst.len() {
        return Err(TileStreamError::SizeMismatch {
            expected: dst.len(),
            actual: header.uncompressed_size(),
        });
    }

    let table = (0..expected_tiles)
        .map(|_| rdr.read_u32::<LittleEndian>().map(|value| value as usize))
        .collect::<Result<Vec<_>, _>>()?;

    let data = &src[HEADER_LEN + 4 * expected_tiles..];
    for (tile, output) in dst.chunks_mut(TILE_SIZE).enumerate() {
        let start = if tile == 0 { 0 } else { table[tile] };
        let end = if tile + 1 == expected_tiles {
            start + table[0]
        } else {
            table[tile + 1]
        };

        let input = data
            .get(start..end)
            .ok_or(TileStreamError::TileOutOfBounds { tile })?;

        inflate_tile(input, output).map_err(|source| TileStreamError::Inflate { tile, source })?;
    }

    Ok(())
}

/// Size of the tile data that follows `header`, which has to contain the header and the complete tile table.
pub fn payload_size(header: &[u8]) -> Result<usize, TileStreamError> {
    let mut rdr = Cursor::new(header);
    let parsed = TileStreamHeader::read(&mut rdr)?;
    let table = (0..parsed.num_tiles)
        .map(|_| rdr.read_u32::<LittleEndian>().map(|value| value as usize))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match table.len() {
        0 => 0,
        1 => table[0],
        n => table[n - 1] + table[0],
    })
}

/// Inflates a whole tile stream, taking the size from its header.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>, TileStreamError> {
    let header = TileStreamHeader::read(&mut Cursor::new(src))?;
    let mut out = vec![0u8; header.uncompressed_size()];
    decompress_into(src, &mut out)?;
    Ok(out)
}

fn inflate_tile(input: &[u8], output: &mut [u8]) -> std::io::Result<()> {
    let mut decoder = DeflateDecoder::new(input);
    decoder.read_exact(output)?;

    let mut probe = [0u8; 1];
    if decoder.read(&mut probe)? != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "tile inflates to more than its size",
        ));
    }
    Ok(())
}
