use crate::footprint::{BufferFootprint, LatentTextureDesc, LatentTextureFootprint, TextureSetDesc};

/// Per-texture view of a texture set: the block-compression mode buffer of every mip.
pub trait TextureMetadata {
    fn name(&self) -> &str;

    /// Mode buffer data that is already resident in host memory, bypassing the stream. Empty data is ignored.
    fn mode_buffer(&self, mip_level: u32) -> Option<&[u8]>;

    /// Where the mode buffer of `mip_level` lives in the stream. Mips without data report an empty footprint.
    fn mode_buffer_footprint(&self, mip_level: u32) -> BufferFootprint;
}

pub trait TextureSetMetadata {
    fn desc(&self) -> TextureSetDesc;

    fn texture_count(&self) -> usize;

    fn texture(&self, index: usize) -> Option<&dyn TextureMetadata>;

    fn latent_texture_desc(&self) -> LatentTextureDesc;

    /// `None` if the subresource has no footprint.
    fn latent_texture_footprint(&self, mip_level: u32, layer: u32) -> Option<LatentTextureFootprint>;
}

/// Mode buffers that were produced in memory (e.g. right after block compression) and never hit the stream.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTextureMetadata {
    pub name: String,
    pub mode_buffers: Vec<Vec<u8>>,
    /// Fallback footprints for mips without host data.
    pub footprints: Vec<BufferFootprint>,
}

impl TextureMetadata for InMemoryTextureMetadata {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode_buffer(&self, mip_level: u32) -> Option<&[u8]> {
        self.mode_buffers
            .get(mip_level as usize)
            .map(Vec::as_slice)
            .filter(|data| !data.is_empty())
    }

    fn mode_buffer_footprint(&self, mip_level: u32) -> BufferFootprint {
        self.footprints
            .get(mip_level as usize)
            .copied()
            .unwrap_or_default()
    }
}
