use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::ParserError;

pub trait Emittable {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError>;
}

impl Emittable for u8 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u8(*self)?)
    }
}

impl Emittable for u16 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u16::<LittleEndian>(*self)?)
    }
}

impl Emittable for u32 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u32::<LittleEndian>(*self)?)
    }
}

impl Emittable for u64 {
    fn emit<W: Write>(&self, wtr: &mut W) -> Result<(), ParserError> {
        Ok(wtr.write_u64::<LittleEndian>(*self)?)
    }
}

pub(crate) fn write_cstring<W: Write>(wtr: &mut W, value: &str) -> Result<(), ParserError> {
    if value.as_bytes().contains(&0) {
        return Err(ParserError::FormatError {
            reason: "Strings must not contain NUL bytes",
        });
    }
    wtr.write_all(value.as_bytes())?;
    wtr.write_u8(0)?;
    Ok(())
}

pub(crate) fn write_chunk<W: Write>(wtr: &mut W, magic: u32, data: &[u8]) -> Result<(), ParserError> {
    let size = u32::try_from(data.len()).map_err(|_| ParserError::FormatError {
        reason: "Chunk exceeds 4 GiB",
    })?;
    wtr.write_u32::<LittleEndian>(magic)?;
    wtr.write_u32::<LittleEndian>(size)?;
    wtr.write_all(data)?;
    Ok(())
}
