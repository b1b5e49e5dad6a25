use std::fmt::{Display, Formatter};

use itertools::Itertools;
use log::{debug, trace};
use texstream_files::footprint::{BufferFootprint, CompressionType, TextureSetDesc};
use texstream_files::metadata::TextureMetadata;

use crate::decompression::DecompressionBackend;
use crate::loading::range::{BufferRange, append_buffer_range};
use crate::loading::{LoadingError, PipelineKind, TaskFailure};

/// How one mip's buffer data gets from its source into the final buffer.
#[derive(Debug)]
pub enum BufferPipeline<'a> {
    /// The mip has no data.
    Empty,
    Failed(TaskFailure),
    /// Host data is copied into staging, no stream access.
    DirectCopy { source: &'a [u8], staging: BufferRange },
    /// The stored bytes are read straight into staging.
    ReadUncompressed { staging: BufferRange },
    /// The compressed bytes are read and decoded on the CPU, the result goes into staging.
    DecompressOnCpu {
        compressed: Vec<u8>,
        uncompressed: Vec<u8>,
        staging: BufferRange,
    },
    /// The stream header is read into `header`, the tile data into staging and copied to temp, where the
    /// GPU extension decodes it.
    DecompressWithGpuExt {
        header: Vec<u8>,
        staging: BufferRange,
        temp: BufferRange,
    },
    /// The whole compressed range is read into host memory and handed to the decompression queue.
    DecompressWithHwQueue { compressed: Vec<u8> },
}

impl BufferPipeline<'_> {
    pub fn kind(&self) -> PipelineKind {
        match self {
            BufferPipeline::Empty => PipelineKind::Empty,
            BufferPipeline::Failed(_) => PipelineKind::Failed,
            BufferPipeline::DirectCopy { .. } => PipelineKind::DirectCopy,
            BufferPipeline::ReadUncompressed { .. } => PipelineKind::ReadUncompressed,
            BufferPipeline::DecompressOnCpu { .. } => PipelineKind::DecompressOnCpu,
            BufferPipeline::DecompressWithGpuExt { .. } => PipelineKind::DecompressWithGpuExt,
            BufferPipeline::DecompressWithHwQueue { .. } => PipelineKind::DecompressWithHwQueue,
        }
    }
}

#[derive(Debug)]
pub struct BufferLoadingTask<'a> {
    pub mip_level: u32,
    /// Default for direct copies and empty mips.
    pub footprint: BufferFootprint,
    pub final_range: BufferRange,
    pub pipeline: BufferPipeline<'a>,
}

impl BufferLoadingTask<'_> {
    pub fn kind(&self) -> PipelineKind {
        self.pipeline.kind()
    }

    pub fn is_loaded(&self) -> bool {
        self.kind().is_loaded()
    }
}

/// One task per mip plus the exact sizes of the buffers the tasks' ranges point into.
#[derive(Debug)]
pub struct BufferLoadingPlan<'a> {
    pub tasks: Vec<BufferLoadingTask<'a>>,
    pub staging_size: u64,
    pub temp_size: u64,
    pub final_size: u64,
}

impl BufferLoadingPlan<'_> {
    pub fn count(&self, kind: PipelineKind) -> usize {
        self.tasks.iter().filter(|task| task.kind() == kind).count()
    }

    pub fn contains(&self, kind: PipelineKind) -> bool {
        self.tasks.iter().any(|task| task.kind() == kind)
    }
}

impl Display for BufferLoadingPlan<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "staging {} bytes, temp {} bytes, final {} bytes",
            self.staging_size, self.temp_size, self.final_size
        )?;
        let lines = self.tasks.iter().map(|task| {
            format!(
                "  mip {}: {} (final {}+{})",
                task.mip_level,
                task.kind(),
                task.final_range.offset,
                task.final_range.size
            )
        });
        write!(f, "{}", lines.format("\n"))
    }
}

/// Assigns a pipeline to every mip of a texture's mode buffers and computes the buffer totals.
pub fn plan_buffer_loading<'a>(
    desc: &TextureSetDesc,
    metadata: &'a dyn TextureMetadata,
    backend: DecompressionBackend,
) -> Result<BufferLoadingPlan<'a>, LoadingError> {
    let mut staging_size = 0;
    let mut temp_size = 0;
    let mut final_size = 0;

    let mut tasks = Vec::with_capacity(desc.mips as usize);
    for mip_level in 0..desc.mips {
        if let Some(source) = metadata.mode_buffer(mip_level).filter(|data| !data.is_empty()) {
            let size = source.len() as u64;
            tasks.push(BufferLoadingTask {
                mip_level,
                footprint: BufferFootprint::default(),
                pipeline: BufferPipeline::DirectCopy {
                    source,
                    staging: append_buffer_range(&mut staging_size, size),
                },
                final_range: append_buffer_range(&mut final_size, size),
            });
            continue;
        }

        let footprint = metadata.mode_buffer_footprint(mip_level);
        let range_size = footprint.range_in_stream.size;
        let uncompressed_size = footprint.uncompressed_size;

        let mut task = BufferLoadingTask {
            mip_level,
            footprint,
            final_range: BufferRange::default(),
            pipeline: BufferPipeline::Empty,
        };

        if footprint.is_empty() {
            tasks.push(task);
            continue;
        }

        task.pipeline = match (footprint.compression_type, backend) {
            (CompressionType::None, _) => {
                if range_size != uncompressed_size {
                    return Err(LoadingError::InvalidFootprint {
                        mip_level,
                        layer: 0,
                        reason: "uncompressed data with a stored size different from its uncompressed size",
                    });
                }

                BufferPipeline::ReadUncompressed {
                    staging: append_buffer_range(&mut staging_size, range_size),
                }
            }
            (CompressionType::GDeflate, DecompressionBackend::GpuExtension) => {
                let header_size = tilestream::header_size(uncompressed_size);
                if header_size >= range_size {
                    return Err(LoadingError::InvalidFootprint {
                        mip_level,
                        layer: 0,
                        reason: "the compressed range is not larger than its header",
                    });
                }

                let upload_size = range_size - header_size;
                BufferPipeline::DecompressWithGpuExt {
                    header: vec![0; header_size as usize],
                    staging: append_buffer_range(&mut staging_size, upload_size),
                    temp: append_buffer_range(&mut temp_size, upload_size),
                }
            }
            (CompressionType::GDeflate, DecompressionBackend::HardwareQueue) => BufferPipeline::DecompressWithHwQueue {
                compressed: vec![0; range_size as usize],
            },
            (CompressionType::GDeflate, DecompressionBackend::CpuOnly) => BufferPipeline::DecompressOnCpu {
                compressed: vec![0; range_size as usize],
                uncompressed: vec![0; uncompressed_size as usize],
                staging: append_buffer_range(&mut staging_size, uncompressed_size),
            },
            (CompressionType::GDeflate, DecompressionBackend::None) => BufferPipeline::Failed(TaskFailure::NoDecoder),
        };

        if task.is_loaded() {
            task.final_range = append_buffer_range(&mut final_size, uncompressed_size);
        }

        trace!("Mip {}: {} ({} bytes in stream)", mip_level, task.kind(), range_size);
        tasks.push(task);
    }

    let plan = BufferLoadingPlan {
        tasks,
        staging_size,
        temp_size,
        final_size,
    };
    debug!("Planned {} buffer tasks with backend {}: {}", plan.tasks.len(), backend, plan);
    Ok(plan)
}
