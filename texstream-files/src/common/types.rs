use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;
use crate::common::reader::Parseable;

/// Chunk magics are stored so that the big endian bytes spell the name.
pub const fn magic_from_str(name: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*name)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkHeader {
    pub magic: u32,
    pub size: u32,
}

impl ChunkHeader {
    pub fn read<R: Read>(rdr: &mut R) -> Result<ChunkHeader, ParserError> {
        let magic = rdr.read_u32::<LittleEndian>()?;
        let size = rdr.read_u32::<LittleEndian>()?;
        Ok(ChunkHeader { magic, size })
    }

    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic.to_be_bytes()[..]).into_owned()
    }
}

#[derive(Debug)]
pub(crate) struct IffChunk {
    pub magic: u32,
    pub data: Vec<u8>,
}

impl IffChunk {
    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic.to_be_bytes()[..]).into_owned()
    }

    pub fn parse<T: Parseable<T>>(&self) -> Result<T, ParserError> {
        T::parse(&mut Cursor::new(&self.data))
    }

    pub fn read_body<R: Read>(header: ChunkHeader, rdr: &mut R) -> Result<IffChunk, ParserError> {
        let mut data = vec![0; header.size as usize];
        rdr.read_exact(&mut data)?;

        Ok(IffChunk {
            magic: header.magic,
            data,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VersionChunk {
    pub version: u32,
}

impl Parseable<VersionChunk> for VersionChunk {
    fn parse<R: Read>(rdr: &mut R) -> Result<VersionChunk, ParserError> {
        Ok(VersionChunk {
            version: rdr.read_u32::<LittleEndian>()?,
        })
    }
}
