use log::trace;

use crate::ParserError;
use crate::common::writer::{Emittable, write_chunk, write_cstring};
use crate::container::types::{CONTAINER_VERSION, SetChunk, TDAT, TLAT, TSET, TTEX, TVER};
use crate::footprint::{
    BufferFootprint, BufferFootprintRecord, CompressionType, LatentFootprintRecord, LatentTextureDesc, StreamRange,
    TextureSetDesc,
};

const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Debug, Clone)]
struct Payload {
    stored: Vec<u8>,
    uncompressed_size: u64,
    uncompressed_crc32: u32,
    compression_type: CompressionType,
}

impl Payload {
    fn new(data: &[u8], compression_type: CompressionType, level: u32) -> Result<Payload, ParserError> {
        let stored = match compression_type {
            CompressionType::None => data.to_vec(),
            CompressionType::GDeflate => tilestream::compress(data, level)?,
        };

        Ok(Payload {
            stored,
            uncompressed_size: data.len() as u64,
            uncompressed_crc32: tilestream::crc32(data),
            compression_type,
        })
    }

    fn footprint(&self, offset: u64) -> BufferFootprint {
        BufferFootprint {
            range_in_stream: StreamRange {
                offset,
                size: self.stored.len() as u64,
            },
            uncompressed_size: self.uncompressed_size,
            uncompressed_crc32: self.uncompressed_crc32,
            compression_type: self.compression_type,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTexture {
    name: String,
    mode_buffers: Vec<Payload>,
}

#[derive(Debug, Clone)]
struct PendingLatent {
    mip: u32,
    layer: u32,
    width: u32,
    height: u32,
    row_pitch: u32,
    slice_pitch: u32,
    payload: Payload,
}

/// Builds a texture set container in memory. Payloads are laid out in the order they were added.
#[derive(Debug, Clone)]
pub struct ContainerWriter {
    desc: TextureSetDesc,
    latent_desc: LatentTextureDesc,
    compression_level: u32,
    textures: Vec<PendingTexture>,
    latents: Vec<PendingLatent>,
}

impl ContainerWriter {
    pub fn new(desc: TextureSetDesc, latent_desc: LatentTextureDesc) -> Self {
        Self {
            desc,
            latent_desc,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            textures: Vec::new(),
            latents: Vec::new(),
        }
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Returns the index of the new texture.
    pub fn add_texture(&mut self, name: &str) -> usize {
        self.textures.push(PendingTexture {
            name: name.to_string(),
            mode_buffers: Vec::new(),
        });
        self.textures.len() - 1
    }

    /// Appends the mode buffer of the next mip level. An empty slice produces an empty footprint.
    pub fn add_mode_buffer(
        &mut self,
        texture: usize,
        data: &[u8],
        compression_type: CompressionType,
    ) -> Result<(), ParserError> {
        let payload = Payload::new(data, compression_type, self.compression_level)?;
        let texture = self.textures.get_mut(texture).ok_or(ParserError::FormatError {
            reason: "Mode buffer added to an unknown texture",
        })?;
        texture.mode_buffers.push(payload);
        Ok(())
    }

    pub fn add_latent_layer(
        &mut self,
        mip: u32,
        layer: u32,
        (width, height): (u32, u32),
        row_pitch: u32,
        data: &[u8],
        compression_type: CompressionType,
    ) -> Result<(), ParserError> {
        let payload = Payload::new(data, compression_type, self.compression_level)?;
        self.latents.push(PendingLatent {
            mip,
            layer,
            width,
            height,
            row_pitch,
            slice_pitch: data.len() as u32,
            payload,
        });
        Ok(())
    }

    pub fn finish(&self) -> Result<Vec<u8>, ParserError> {
        // Metadata size does not depend on the offsets, so a first pass with a zero base yields the payload start.
        let metadata_size = self.write_metadata(0)?.len() as u64 + 8;
        let mut out = self.write_metadata(metadata_size)?;

        let payload: Vec<u8> = self
            .payloads()
            .flat_map(|payload| payload.stored.iter().copied())
            .collect();

        write_chunk(&mut out, TDAT, &payload)?;
        trace!(
            "Wrote container: {} bytes metadata, {} bytes payload",
            metadata_size,
            payload.len()
        );
        Ok(out)
    }

    fn payloads(&self) -> impl Iterator<Item = &Payload> {
        self.textures
            .iter()
            .flat_map(|texture| texture.mode_buffers.iter())
            .chain(self.latents.iter().map(|latent| &latent.payload))
    }

    fn write_metadata(&self, payload_base: u64) -> Result<Vec<u8>, ParserError> {
        let mut out = Vec::new();
        let mut offset = payload_base;

        let mut version = Vec::new();
        CONTAINER_VERSION.emit(&mut version)?;
        write_chunk(&mut out, TVER, &version)?;

        let mut set = Vec::new();
        SetChunk {
            desc: self.desc,
            latent_desc: self.latent_desc,
            texture_count: self.textures.len() as u32,
        }
        .emit(&mut set)?;
        write_chunk(&mut out, TSET, &set)?;

        for texture in &self.textures {
            let mut chunk = Vec::new();
            write_cstring(&mut chunk, &texture.name)?;
            (texture.mode_buffers.len() as u32).emit(&mut chunk)?;
            for payload in &texture.mode_buffers {
                BufferFootprintRecord::from(&payload.footprint(offset)).emit(&mut chunk)?;
                offset += payload.stored.len() as u64;
            }
            write_chunk(&mut out, TTEX, &chunk)?;
        }

        if !self.latents.is_empty() {
            let mut chunk = Vec::new();
            for latent in &self.latents {
                LatentFootprintRecord {
                    mip: latent.mip,
                    layer: latent.layer,
                    width: latent.width,
                    height: latent.height,
                    row_pitch: latent.row_pitch,
                    slice_pitch: latent.slice_pitch,
                    buffer: BufferFootprintRecord::from(&latent.payload.footprint(offset)),
                }
                .emit(&mut chunk)?;
                offset += latent.payload.stored.len() as u64;
            }
            write_chunk(&mut out, TLAT, &chunk)?;
        }

        Ok(out)
    }
}
