use std::collections::HashMap;

use texstream_files_derive_parseable::{Emit, Parse};

use crate::common::types::magic_from_str;
use crate::footprint::{BufferFootprint, LatentTextureDesc, LatentTextureFootprint, TextureSetDesc};
use crate::metadata::{TextureMetadata, TextureSetMetadata};

pub const CONTAINER_VERSION: u32 = 1;

pub const TVER: u32 = magic_from_str(b"TVER");
pub const TSET: u32 = magic_from_str(b"TSET");
pub const TTEX: u32 = magic_from_str(b"TTEX");
pub const TLAT: u32 = magic_from_str(b"TLAT");
pub const TDAT: u32 = magic_from_str(b"TDAT");

#[derive(Debug, Copy, Clone, Parse, Emit)]
pub(crate) struct SetChunk {
    pub desc: TextureSetDesc,
    pub latent_desc: LatentTextureDesc,
    pub texture_count: u32,
}

#[derive(Debug, Clone)]
pub struct ContainerTexture {
    pub name: String,
    pub mode_buffers: Vec<BufferFootprint>,
}

impl TextureMetadata for ContainerTexture {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode_buffer(&self, _mip_level: u32) -> Option<&[u8]> {
        // everything in a container is streamed
        None
    }

    fn mode_buffer_footprint(&self, mip_level: u32) -> BufferFootprint {
        self.mode_buffers
            .get(mip_level as usize)
            .copied()
            .unwrap_or_default()
    }
}

/// The metadata of a texture set container. The payload stays in the stream.
#[derive(Debug, Clone)]
pub struct TextureSetContainer {
    pub version: u32,
    pub desc: TextureSetDesc,
    pub latent_desc: LatentTextureDesc,
    pub textures: Vec<ContainerTexture>,
    pub latent_footprints: HashMap<(u32, u32), LatentTextureFootprint>,
    /// Absolute offset of the payload region, if the container has one.
    pub data_offset: Option<u64>,
}

impl TextureSetMetadata for TextureSetContainer {
    fn desc(&self) -> TextureSetDesc {
        self.desc
    }

    fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn texture(&self, index: usize) -> Option<&dyn TextureMetadata> {
        self.textures
            .get(index)
            .map(|texture| texture as &dyn TextureMetadata)
    }

    fn latent_texture_desc(&self) -> LatentTextureDesc {
        self.latent_desc
    }

    fn latent_texture_footprint(&self, mip_level: u32, layer: u32) -> Option<LatentTextureFootprint> {
        self.latent_footprints.get(&(mip_level, layer)).copied()
    }
}
