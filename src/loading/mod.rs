//! Planning and execution of streamed buffer and texture uploads.
//!
//! Loading happens in two steps. A plan assigns every mip (or texture subresource) one decode pipeline and
//! packs the byte ranges it needs into a few shared buffers, whose totals are known before anything is
//! created. An executor then creates those buffers, reads the source stream and records the copies.

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::decompression::queue::DecompressionQueue;
use crate::decompression::{CpuDecompressor, DecompressionError, GpuDecompressor};
use crate::gpu::{BufferDesc, BufferHandle, CommandList, Device, GpuError, NativeObjectType, ResourceState};
use crate::io::common::stream::AssetStream;
use crate::loading::range::BufferRange;

pub mod buffer_executor;
pub mod buffer_tasks;
pub mod range;
pub mod texture_executor;
pub mod texture_tasks;

#[cfg(test)]
mod tests;

/// Failures that abort a whole load before any work is submitted.
#[derive(Error, Debug)]
pub enum LoadingError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("Invalid footprint for mip {mip_level} layer {layer}: {reason}")]
    InvalidFootprint {
        mip_level: u32,
        layer: u32,
        reason: &'static str,
    },

    #[error("Texture \"{name}\" uses automatic state tracking, which breaks queue uploads")]
    AutomaticStateTracking { name: String },

    #[error("The plan contains {pipeline} tasks, but no {collaborator} was provided")]
    MissingCollaborator {
        pipeline: PipelineKind,
        collaborator: &'static str,
    },
}

/// Why a single task did not load. The rest of the batch is unaffected.
#[derive(Error, Debug)]
pub enum TaskFailure {
    #[error("failed to read {size} bytes at offset {offset}: {source}")]
    Read {
        offset: u64,
        size: u64,
        source: std::io::Error,
    },

    #[error(transparent)]
    Decompression(#[from] DecompressionError),

    #[error("the texture copy could not be recorded: {0}")]
    Copy(GpuError),

    #[error("no decoder is available for compressed data")]
    NoDecoder,

    #[error("the {buffer} buffer does not cover the task's range")]
    BufferUnavailable { buffer: &'static str },
}

/// Which pipeline a task runs, without the data it carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// No data for this unit of work.
    Empty,
    Failed,
    DirectCopy,
    ReadUncompressed,
    DecompressOnCpu,
    DecompressWithGpuExt,
    DecompressWithHwQueue,
}

impl Display for PipelineKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineKind::Empty => "Empty",
            PipelineKind::Failed => "Failed",
            PipelineKind::DirectCopy => "DirectCopy",
            PipelineKind::ReadUncompressed => "ReadUncompressed",
            PipelineKind::DecompressOnCpu => "DecompressOnCpu",
            PipelineKind::DecompressWithGpuExt => "DecompressWithGpuExt",
            PipelineKind::DecompressWithHwQueue => "DecompressWithHwQueue",
        };
        f.write_str(name)
    }
}

impl PipelineKind {
    /// Whether the task produced data. For [`PipelineKind::DecompressWithHwQueue`] this only means the
    /// request was submitted; the queue reports its own failures.
    pub fn is_loaded(&self) -> bool {
        !matches!(self, PipelineKind::Empty | PipelineKind::Failed)
    }
}

/// Everything an executor talks to. The device and command list are borrowed for the whole load.
pub struct LoadingContext<'a, D: Device> {
    pub device: &'a D,
    pub command_list: &'a mut D::CommandList,
    pub stream: &'a mut dyn AssetStream,
    pub cpu_decompressor: &'a dyn CpuDecompressor,
    pub gpu_decompressor: Option<&'a dyn GpuDecompressor>,
    pub decompression_queue: Option<&'a mut dyn DecompressionQueue>,
}

impl<'a, D: Device> LoadingContext<'a, D> {
    pub fn new(
        device: &'a D,
        command_list: &'a mut D::CommandList,
        stream: &'a mut dyn AssetStream,
        cpu_decompressor: &'a dyn CpuDecompressor,
    ) -> Self {
        Self {
            device,
            command_list,
            stream,
            cpu_decompressor,
            gpu_decompressor: None,
            decompression_queue: None,
        }
    }

    pub fn with_gpu_decompressor(mut self, decompressor: &'a dyn GpuDecompressor) -> Self {
        self.gpu_decompressor = Some(decompressor);
        self
    }

    pub fn with_decompression_queue(mut self, queue: &'a mut dyn DecompressionQueue) -> Self {
        self.decompression_queue = Some(queue);
        self
    }
}

/// Reads one task's source range: first `cpu` (if any), then `staging` (if any), back to back.
pub(crate) fn read_source(
    stream: &mut dyn AssetStream,
    offset: u64,
    size: u64,
    cpu: Option<&mut [u8]>,
    staging: Option<&mut [u8]>,
) -> Result<(), TaskFailure> {
    let read_error = |source| TaskFailure::Read { offset, size, source };

    stream.seek_to(offset).map_err(read_error)?;

    let mut total = 0u64;
    for destination in [cpu, staging].into_iter().flatten() {
        stream.read_into(destination).map_err(read_error)?;
        total += destination.len() as u64;
    }

    debug_assert_eq!(total, size, "destination sizes must add up to the source range");
    Ok(())
}

/// Fails before anything is created if planned work has nobody to run it.
pub(crate) fn check_collaborators(
    kinds: impl IntoIterator<Item = PipelineKind>,
    has_gpu_decompressor: bool,
    has_queue: bool,
) -> Result<(), LoadingError> {
    for kind in kinds {
        match kind {
            PipelineKind::DecompressWithGpuExt if !has_gpu_decompressor => {
                return Err(LoadingError::MissingCollaborator {
                    pipeline: kind,
                    collaborator: "GPU decompressor",
                });
            }
            PipelineKind::DecompressWithHwQueue if !has_queue => {
                return Err(LoadingError::MissingCollaborator {
                    pipeline: kind,
                    collaborator: "decompression queue",
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// A zero sized buffer is never created.
pub(crate) fn create_optional_buffer<D: Device>(device: &D, desc: BufferDesc) -> Result<Option<BufferHandle>, GpuError> {
    if desc.byte_size == 0 {
        return Ok(None);
    }
    device.create_buffer(desc).map(Some)
}

pub(crate) fn require_buffer<'b>(
    buffer: &'b Option<BufferHandle>,
    range: BufferRange,
    name: &'static str,
) -> Result<&'b BufferHandle, TaskFailure> {
    buffer
        .as_ref()
        .filter(|buffer| range.end() <= buffer.desc().byte_size)
        .ok_or(TaskFailure::BufferUnavailable { buffer: name })
}

/// Records the GDeflate extension call that decodes `compressed` into `decompressed`.
pub(crate) fn decompress_with_gpu_extension<C: CommandList + ?Sized>(
    command_list: &mut C,
    decompressor: &dyn GpuDecompressor,
    header: &[u8],
    uncompressed_size: u64,
    (compressed, compressed_offset): (&BufferHandle, u64),
    (decompressed, decompressed_offset): (&BufferHandle, u64),
) -> Result<(), DecompressionError> {
    let native = command_list
        .native_object(NativeObjectType::VkCommandBuffer)
        .ok_or(DecompressionError::NoNativeHandle)?;

    command_list.set_buffer_state(compressed, ResourceState::ShaderResource);
    command_list.set_buffer_state(decompressed, ResourceState::UnorderedAccess);
    command_list.commit_barriers();

    decompressor.decompress_gdeflate(
        native,
        header,
        uncompressed_size,
        compressed.gpu_address() + compressed_offset,
        decompressed.gpu_address() + decompressed_offset,
    )
}
