use std::fmt::{Display, Formatter};

use itertools::Itertools;
use log::{debug, trace};
use texstream_files::footprint::{CompressionType, LatentTextureFootprint};
use texstream_files::metadata::TextureSetMetadata;

use crate::decompression::DecompressionBackend;
use crate::gpu::TextureHandle;
use crate::loading::range::{BufferRange, append_buffer_range};
use crate::loading::{LoadingError, PipelineKind, TaskFailure};

#[derive(Debug)]
pub enum TexturePipeline {
    /// The subresource has no footprint.
    Empty,
    Failed(TaskFailure),
    ReadUncompressed {
        uncompressed: Vec<u8>,
    },
    DecompressOnCpu {
        compressed: Vec<u8>,
        uncompressed: Vec<u8>,
    },
    /// `compressed` holds header and tile data; only the tile data is uploaded into `compressed_range`.
    DecompressWithGpuExt {
        compressed: Vec<u8>,
        header_size: usize,
        compressed_range: BufferRange,
        decompressed_range: BufferRange,
    },
    DecompressWithHwQueue {
        compressed: Vec<u8>,
    },
}

impl TexturePipeline {
    pub fn kind(&self) -> PipelineKind {
        match self {
            TexturePipeline::Empty => PipelineKind::Empty,
            TexturePipeline::Failed(_) => PipelineKind::Failed,
            TexturePipeline::ReadUncompressed { .. } => PipelineKind::ReadUncompressed,
            TexturePipeline::DecompressOnCpu { .. } => PipelineKind::DecompressOnCpu,
            TexturePipeline::DecompressWithGpuExt { .. } => PipelineKind::DecompressWithGpuExt,
            TexturePipeline::DecompressWithHwQueue { .. } => PipelineKind::DecompressWithHwQueue,
        }
    }
}

/// Uploads one subresource of a latent texture.
#[derive(Debug)]
pub struct TextureLoadingTask {
    pub texture: TextureHandle,
    pub mip_level: u32,
    pub array_layer: u32,
    pub footprint: LatentTextureFootprint,
    pub pipeline: TexturePipeline,
}

impl TextureLoadingTask {
    pub fn kind(&self) -> PipelineKind {
        self.pipeline.kind()
    }

    pub fn is_loaded(&self) -> bool {
        self.kind().is_loaded()
    }
}

/// Subresource tasks for any number of textures, grouped by texture, and the sizes of the two
/// intermediate buffers used by the GPU extension pipeline.
#[derive(Debug, Default)]
pub struct TextureLoadingPlan {
    pub tasks: Vec<TextureLoadingTask>,
    pub compressed_size: u64,
    pub decompressed_size: u64,
}

impl TextureLoadingPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: PipelineKind) -> usize {
        self.tasks.iter().filter(|task| task.kind() == kind).count()
    }

    /// Appends one task per subresource of `texture`, starting at `first_mip_level`.
    pub fn add_latent_texture(
        &mut self,
        metadata: &dyn TextureSetMetadata,
        texture: &TextureHandle,
        first_mip_level: u32,
        backend: DecompressionBackend,
    ) -> Result<(), LoadingError> {
        // Queue uploads need the texture to stay in CopyDest between command lists; automatic tracking
        // would return it to its initial state at the end of every list.
        if texture.desc().keep_initial_state {
            return Err(LoadingError::AutomaticStateTracking {
                name: texture.desc().debug_name.clone(),
            });
        }

        let latent_desc = metadata.latent_texture_desc();
        let first_task = self.tasks.len();

        for mip_level in first_mip_level..latent_desc.mip_levels {
            for array_layer in 0..latent_desc.array_size {
                let mut task = TextureLoadingTask {
                    texture: texture.clone(),
                    mip_level,
                    array_layer,
                    footprint: LatentTextureFootprint::default(),
                    pipeline: TexturePipeline::Empty,
                };

                if let Some(footprint) = metadata.latent_texture_footprint(mip_level, array_layer) {
                    task.footprint = footprint;
                    task.pipeline = self.select(&footprint, mip_level, array_layer, backend)?;
                }

                trace!("Latent mip {} layer {}: {}", mip_level, array_layer, task.kind());
                self.tasks.push(task);
            }
        }

        debug!(
            "Planned {} latent tasks for \"{}\" with backend {}",
            self.tasks.len() - first_task,
            texture.desc().debug_name,
            backend
        );
        Ok(())
    }

    fn select(
        &mut self,
        footprint: &LatentTextureFootprint,
        mip_level: u32,
        layer: u32,
        backend: DecompressionBackend,
    ) -> Result<TexturePipeline, LoadingError> {
        let range_size = footprint.buffer.range_in_stream.size;
        let uncompressed_size = footprint.buffer.uncompressed_size;

        if footprint.buffer.is_empty() {
            return Ok(TexturePipeline::Empty);
        }

        let pipeline = match (footprint.buffer.compression_type, backend) {
            (CompressionType::None, _) => {
                if range_size != uncompressed_size {
                    return Err(LoadingError::InvalidFootprint {
                        mip_level,
                        layer,
                        reason: "uncompressed data with a stored size different from its uncompressed size",
                    });
                }

                TexturePipeline::ReadUncompressed {
                    uncompressed: vec![0; range_size as usize],
                }
            }
            (CompressionType::GDeflate, DecompressionBackend::GpuExtension) => {
                let header_size = tilestream::header_size(uncompressed_size);
                if header_size >= range_size {
                    return Err(LoadingError::InvalidFootprint {
                        mip_level,
                        layer,
                        reason: "the compressed range is not larger than its header",
                    });
                }

                TexturePipeline::DecompressWithGpuExt {
                    compressed: vec![0; range_size as usize],
                    header_size: header_size as usize,
                    compressed_range: append_buffer_range(&mut self.compressed_size, range_size - header_size),
                    decompressed_range: append_buffer_range(&mut self.decompressed_size, uncompressed_size),
                }
            }
            (CompressionType::GDeflate, DecompressionBackend::HardwareQueue) => TexturePipeline::DecompressWithHwQueue {
                compressed: vec![0; range_size as usize],
            },
            (CompressionType::GDeflate, DecompressionBackend::CpuOnly) => TexturePipeline::DecompressOnCpu {
                compressed: vec![0; range_size as usize],
                uncompressed: vec![0; uncompressed_size as usize],
            },
            (CompressionType::GDeflate, DecompressionBackend::None) => TexturePipeline::Failed(TaskFailure::NoDecoder),
        };

        Ok(pipeline)
    }
}

impl Display for TextureLoadingPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "compressed {} bytes, decompressed {} bytes",
            self.compressed_size, self.decompressed_size
        )?;
        let lines = self.tasks.iter().map(|task| {
            format!(
                "  {} mip {} layer {}: {}",
                task.texture.desc().debug_name,
                task.mip_level,
                task.array_layer,
                task.kind()
            )
        });
        write!(f, "{}", lines.format("\n"))
    }
}
