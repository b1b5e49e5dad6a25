use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::{debug, trace};
use texstream_files::ParserError;
use texstream_files::container::reader::ContainerReader;
use texstream_files::container::types::TextureSetContainer;

/// A parsed container together with the stream its payloads are read from.
pub struct ContainerFile<R> {
    pub metadata: TextureSetContainer,
    pub stream: R,
}

impl ContainerFile<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ParserError> {
        trace!("Opening {}", path.as_ref().display());
        Self::from_reader(BufReader::new(File::open(path.as_ref())?))
    }
}

impl<R: Read + Seek> ContainerFile<R> {
    pub fn from_reader(mut stream: R) -> Result<Self, ParserError> {
        stream.rewind()?;
        let metadata = ContainerReader::parse_metadata(&mut stream)?;
        debug!(
            "Loaded container with {} textures ({}x{}, {} mips)",
            metadata.textures.len(),
            metadata.desc.width,
            metadata.desc.height,
            metadata.desc.mips
        );
        Ok(Self { metadata, stream })
    }
}
