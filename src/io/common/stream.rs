use std::io::{Read, Seek, SeekFrom};

/// The source of streamed payloads. Every call may fail and has to be checked.
pub trait AssetStream {
    fn seek_to(&mut self, offset: u64) -> std::io::Result<()>;

    fn read_into(&mut self, buf: &mut [u8]) -> std::io::Result<()>;
}

impl<T: Read + Seek> AssetStream for T {
    fn seek_to(&mut self, offset: u64) -> std::io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.read_exact(buf)
    }
}
