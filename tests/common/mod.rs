#![allow(dead_code)]

use std::io::Cursor;

use texstream::io::container::loader::ContainerFile;
use texstream_files::container::writer::ContainerWriter;
use texstream_files::footprint::{CompressionType, LatentTextureDesc, TextureSetDesc};

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i / 3) as u8).wrapping_mul(7).wrapping_add(seed))
        .collect()
}

/// Mode buffers of one texture: 1024 stored bytes, an empty mip, 70000 bytes spanning two tiles
/// and 128 bytes, the last two compressed.
pub fn mode_buffers() -> Vec<(Vec<u8>, CompressionType)> {
    vec![
        (pattern(1024, 1), CompressionType::None),
        (Vec::new(), CompressionType::None),
        (pattern(70_000, 2), CompressionType::GDeflate),
        (pattern(128, 3), CompressionType::GDeflate),
    ]
}

pub fn texture_set_desc(mips: u32) -> TextureSetDesc {
    TextureSetDesc {
        width: 256,
        height: 256,
        mips,
    }
}

pub fn latent_desc() -> LatentTextureDesc {
    LatentTextureDesc {
        width: 16,
        height: 16,
        mip_levels: 2,
        array_size: 2,
    }
}

/// Uncompressed latent data of every subresource, as (mip, layer, extent, row pitch, data).
pub fn latent_layers() -> Vec<(u32, u32, (u32, u32), u32, Vec<u8>)> {
    vec![
        (0, 0, (16, 16), 64, pattern(1024, 10)),
        (0, 1, (16, 16), 64, pattern(1024, 11)),
        (1, 0, (8, 8), 32, pattern(256, 12)),
        (1, 1, (8, 8), 32, pattern(256, 13)),
    ]
}

pub fn build_container(
    mode_buffers: &[(Vec<u8>, CompressionType)],
    latent_compression: Option<CompressionType>,
) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = ContainerWriter::new(texture_set_desc(mode_buffers.len() as u32), latent_desc());

    let texture = writer.add_texture("albedo");
    for (data, compression) in mode_buffers {
        writer.add_mode_buffer(texture, data, *compression)?;
    }

    if let Some(compression) = latent_compression {
        for (mip, layer, extent, row_pitch, data) in latent_layers() {
            writer.add_latent_layer(mip, layer, extent, row_pitch, &data, compression)?;
        }
    }

    Ok(writer.finish()?)
}

pub fn open(bytes: Vec<u8>) -> Result<ContainerFile<Cursor<Vec<u8>>>, anyhow::Error> {
    Ok(ContainerFile::from_reader(Cursor::new(bytes))?)
}
