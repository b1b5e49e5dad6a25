use std::fmt::{Display, Formatter};

use texstream_files::footprint::CompressionType;
use thiserror::Error;

use crate::gpu::{GraphicsApi, NativeHandle};

pub mod cpu;
pub mod queue;


#[derive(Error, Debug)]
pub enum DecompressionError {
    #[error("Decompression failed, error code = {status}: {message}")]
    Backend { status: &'static str, message: String },

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Output buffer holds {actual} bytes, the payload needs {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("No {0:?} decoder available")]
    Unsupported(CompressionType),

    #[error("The command list does not expose a native handle for GPU decompression")]
    NoNativeHandle,

    #[error(transparent)]
    TileStream(#[from] tilestream::TileStreamError),
}

/// The decompression capability of the running device, decided once during device setup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DecompressionBackend {
    /// Compressed data cannot be decoded at all.
    None,
    CpuOnly,
    /// A compute-based GDeflate extension on the graphics queue (Vulkan).
    GpuExtension,
    /// A dedicated I/O queue that decompresses from host memory into GPU resources (D3D12).
    HardwareQueue,
}

impl DecompressionBackend {
    pub fn detect(gpu_decompression_supported: bool, graphics_api: GraphicsApi) -> Self {
        match (gpu_decompression_supported, graphics_api) {
            (true, GraphicsApi::Vulkan) => DecompressionBackend::GpuExtension,
            (true, GraphicsApi::D3D12) => DecompressionBackend::HardwareQueue,
            _ => DecompressionBackend::CpuOnly,
        }
    }
}

impl Display for DecompressionBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DecompressionBackend::None => "none",
            DecompressionBackend::CpuOnly => "cpu",
            DecompressionBackend::GpuExtension => "gpu-extension",
            DecompressionBackend::HardwareQueue => "hardware-queue",
        };
        write!(f, "{}", name)
    }
}

pub trait CpuDecompressor {
    /// Decodes `src` into `dst`, which has exactly the uncompressed size, and verifies `crc32` over the result.
    fn decompress(
        &self,
        compression_type: CompressionType,
        src: &[u8],
        dst: &mut [u8],
        crc32: u32,
    ) -> Result<(), DecompressionError>;
}

pub trait GpuDecompressor {
    /// Records GDeflate decompression into `command_list`. The compressed tile data (without the header)
    /// is read from `compressed_address`, `uncompressed_size` bytes are written to `decompressed_address`.
    fn decompress_gdeflate(
        &self,
        command_list: NativeHandle,
        header: &[u8],
        uncompressed_size: u64,
        compressed_address: u64,
        decompressed_address: u64,
    ) -> Result<(), DecompressionError>;
}
