use std::collections::HashMap;
use std::io::{Cursor, Read};

use log::{debug, trace};

use crate::ParserError;
use crate::common::reader::{Parseable, get_mandatory_chunk_by_name, is_eof, read_chunk_array, read_cstring};
use crate::common::types::{ChunkHeader, IffChunk, VersionChunk};
use crate::container::types::{
    CONTAINER_VERSION, ContainerTexture, SetChunk, TDAT, TLAT, TTEX, TVER, TextureSetContainer,
};
use crate::footprint::{BufferFootprint, BufferFootprintRecord, LatentFootprintRecord, read_records};

pub struct ContainerReader {}

impl ContainerReader {
    /// Reads all metadata chunks. Reading stops at the payload chunk, which is left in the stream.
    pub fn parse_metadata<R: Read>(rdr: &mut R) -> Result<TextureSetContainer, ParserError> {
        let version_hdr = ChunkHeader::read(rdr)?;
        if version_hdr.magic != TVER {
            return Err(ParserError::InvalidMagicValue {
                magic: version_hdr.magic,
            });
        }

        let version = IffChunk::read_body(version_hdr, rdr)?.parse::<VersionChunk>()?;
        if version.version != CONTAINER_VERSION {
            return Err(ParserError::UnsupportedVersion {
                version: version.version,
            });
        }

        let mut position = 8 + u64::from(version_hdr.size);
        let mut data_offset = None;
        let mut chunk_list = Vec::<IffChunk>::new();
        loop {
            let header = match ChunkHeader::read(rdr) {
                Ok(header) => header,
                // No real error, only an EOF: a container without payload.
                Err(err) if is_eof(&err) => break,
                Err(err) => return Err(err),
            };
            position += 8;

            if header.magic == TDAT {
                data_offset = Some(position);
                break;
            }

            trace!("Chunk {} ({} bytes)", header.magic_str(), header.size);
            chunk_list.push(IffChunk::read_body(header, rdr)?);
            position += u64::from(header.size);
        }

        let set = get_mandatory_chunk_by_name::<SetChunk>(&chunk_list, "TSET")?;

        let textures = chunk_list
            .iter()
            .filter(|chunk| chunk.magic == TTEX)
            .map(Self::parse_texture)
            .collect::<Result<Vec<_>, _>>()?;

        if textures.len() != set.texture_count as usize {
            return Err(ParserError::FormatError {
                reason: "Texture count does not match the number of TTEX chunks",
            });
        }

        let mut latent_footprints = HashMap::new();
        for chunk in chunk_list.iter().filter(|chunk| chunk.magic == TLAT) {
            let records = read_chunk_array::<LatentFootprintRecord, _>(&mut Cursor::new(&chunk.data))?;
            for record in records {
                latent_footprints.insert((record.mip, record.layer), record.to_footprint()?);
            }
        }

        debug!(
            "Parsed container: {} textures, {} latent footprints, payload at {:?}",
            textures.len(),
            latent_footprints.len(),
            data_offset
        );

        Ok(TextureSetContainer {
            version: version.version,
            desc: set.desc,
            latent_desc: set.latent_desc,
            textures,
            latent_footprints,
            data_offset,
        })
    }

    fn parse_texture(chunk: &IffChunk) -> Result<ContainerTexture, ParserError> {
        let mut rdr = Cursor::new(&chunk.data);
        let name = read_cstring(&mut rdr)?.into_string()?;
        let mip_count = u32::parse(&mut rdr)?;

        let mode_buffers = read_records::<BufferFootprintRecord, _>(&mut rdr, mip_count as usize)?
            .into_iter()
            .map(BufferFootprint::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ContainerTexture { name, mode_buffers })
    }
}
