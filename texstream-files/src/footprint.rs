use std::io::Read;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use texstream_files_derive_parseable::{Emit, Parse};

use crate::ParserError;
use crate::common::reader::Parseable;

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
pub enum CompressionType {
    #[default]
    None = 0,
    GDeflate = 1,
}

/// A byte range inside the source stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StreamRange {
    pub offset: u64,
    pub size: u64,
}

/// Describes where one piece of payload lives in the stream and how it is stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct BufferFootprint {
    pub range_in_stream: StreamRange,
    pub uncompressed_size: u64,
    /// CRC32 of the uncompressed payload.
    pub uncompressed_crc32: u32,
    pub compression_type: CompressionType,
}

impl BufferFootprint {
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size == 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct LatentTextureFootprint {
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub buffer: BufferFootprint,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Parse, Emit)]
pub struct TextureSetDesc {
    pub width: u32,
    pub height: u32,
    pub mips: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Parse, Emit)]
pub struct LatentTextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_size: u32,
}

// on-disk layouts

#[derive(Debug, Copy, Clone, Parse, Emit)]
pub(crate) struct BufferFootprintRecord {
    pub offset: u64,
    pub size: u64,
    pub uncompressed_size: u64,
    pub uncompressed_crc32: u32,
    pub compression: u32,
}

impl TryFrom<BufferFootprintRecord> for BufferFootprint {
    type Error = ParserError;

    fn try_from(record: BufferFootprintRecord) -> Result<Self, Self::Error> {
        let compression_type = CompressionType::try_from(record.compression)
            .map_err(|_| ParserError::UnsupportedCompression { tag: record.compression })?;

        Ok(BufferFootprint {
            range_in_stream: StreamRange {
                offset: record.offset,
                size: record.size,
            },
            uncompressed_size: record.uncompressed_size,
            uncompressed_crc32: record.uncompressed_crc32,
            compression_type,
        })
    }
}

impl From<&BufferFootprint> for BufferFootprintRecord {
    fn from(footprint: &BufferFootprint) -> Self {
        BufferFootprintRecord {
            offset: footprint.range_in_stream.offset,
            size: footprint.range_in_stream.size,
            uncompressed_size: footprint.uncompressed_size,
            uncompressed_crc32: footprint.uncompressed_crc32,
            compression: footprint.compression_type.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, Parse, Emit)]
pub(crate) struct LatentFootprintRecord {
    pub mip: u32,
    pub layer: u32,
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub buffer: BufferFootprintRecord,
}

impl LatentFootprintRecord {
    pub fn to_footprint(self) -> Result<LatentTextureFootprint, ParserError> {
        Ok(LatentTextureFootprint {
            width: self.width,
            height: self.height,
            row_pitch: self.row_pitch,
            slice_pitch: self.slice_pitch,
            buffer: BufferFootprint::try_from(self.buffer)?,
        })
    }
}

/// Reads `count` records, as opposed to `read_chunk_array` which consumes until the end of the chunk.
pub(crate) fn read_records<T: Parseable<T>, R: Read>(rdr: &mut R, count: usize) -> Result<Vec<T>, ParserError> {
    (0..count).map(|_| T::parse(rdr)).collect()
}
