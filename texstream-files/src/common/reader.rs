use std::ffi::CString;
use std::io::ErrorKind::UnexpectedEof;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ParserError;
use crate::common::types::IffChunk;

pub trait Parseable<T> {
    fn parse<R: Read>(rdr: &mut R) -> Result<T, ParserError>;
}

impl Parseable<u8> for u8 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u8, ParserError> {
        Ok(rdr.read_u8()?)
    }
}

impl Parseable<u16> for u16 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u16, ParserError> {
        Ok(rdr.read_u16::<LittleEndian>()?)
    }
}

impl Parseable<u32> for u32 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u32, ParserError> {
        Ok(rdr.read_u32::<LittleEndian>()?)
    }
}

impl Parseable<u64> for u64 {
    fn parse<R: Read>(rdr: &mut R) -> Result<u64, ParserError> {
        Ok(rdr.read_u64::<LittleEndian>()?)
    }
}

pub(crate) fn read_cstring<R: Read>(rdr: &mut R) -> Result<CString, ParserError> {
    let mut buf = Vec::new();
    loop {
        let c = rdr.read_u8()?;
        if c == 0 {
            // SAFETY: We can ensure, that there are no nul-bytes in buf
            return Ok(unsafe { CString::from_vec_unchecked(buf) });
        }
        buf.push(c);
    }
}

/// Parses records until the reader is exhausted. A record cut short by the end of the data is an error.
pub fn read_chunk_array<T: Parseable<T>, R: Read>(rdr: &mut R) -> Result<Vec<T>, ParserError> {
    let mut list = Vec::<T>::new();
    loop {
        let mut probe = [0u8; 1];
        match rdr.read(&mut probe)? {
            0 => return Ok(list),
            _ => {
                let mut chained = (&probe[..]).chain(&mut *rdr);
                list.push(T::parse(&mut chained)?);
            }
        }
    }
}

pub(crate) fn is_eof(err: &ParserError) -> bool {
    matches!(err, ParserError::IOError(internal) if internal.kind() == UnexpectedEof)
}

pub(crate) fn get_mandatory_chunk_by_name<T: Parseable<T>>(
    chunk_list: &[IffChunk],
    chunk_magic: &'static str,
) -> Result<T, ParserError> {
    chunk_list
        .iter()
        .find(|chunk| chunk.magic_str() == chunk_magic)
        .ok_or(ParserError::MissingChunk { chunk: chunk_magic })?
        .parse::<T>()
}
