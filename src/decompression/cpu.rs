use log::trace;
use texstream_files::footprint::CompressionType;

use crate::decompression::{CpuDecompressor, DecompressionError};

/// Software decoder for GDeflate tile streams.
#[derive(Debug, Copy, Clone)]
pub struct TileStreamDecompressor {
    pub verify_checksum: bool,
}

impl Default for TileStreamDecompressor {
    fn default() -> Self {
        Self { verify_checksum: true }
    }
}

impl CpuDecompressor for TileStreamDecompressor {
    fn decompress(
        &self,
        compression_type: CompressionType,
        src: &[u8],
        dst: &mut [u8],
        crc32: u32,
    ) -> Result<(), DecompressionError> {
        match compression_type {
            CompressionType::None => {
                if src.len() != dst.len() {
                    return Err(DecompressionError::SizeMismatch {
                        expected: src.len(),
                        actual: dst.len(),
                    });
                }
                dst.copy_from_slice(src);
            }
            CompressionType::GDeflate => {
                tilestream::decompress_into(src, dst).map_err(|err| DecompressionError::Backend {
                    status: "FileUnrecognized",
                    message: err.to_string(),
                })?;
            }
        }

        if self.verify_checksum {
            let actual = tilestream::crc32(dst);
            if actual != crc32 {
                return Err(DecompressionError::ChecksumMismatch { expected: crc32, actual });
            }
        }

        trace!("Decompressed {} bytes into {}", src.len(), dst.len());
        Ok(())
    }
}
