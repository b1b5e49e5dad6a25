use std::sync::Arc;

use log::{debug, error, trace, warn};
use texstream_files::footprint::CompressionType;

use crate::decompression::DecompressionError;
use crate::decompression::queue::{CompletionEvent, DecompressionRequest, QueueDestination};
use crate::gpu::mapped_buffer::MappedBuffer;
use crate::gpu::{BufferDesc, BufferHandle, CommandList, CpuAccessMode, Device, ResourceState};
use crate::loading::buffer_tasks::{BufferLoadingPlan, BufferLoadingTask, BufferPipeline};
use crate::loading::range::BufferRange;
use crate::loading::{
    LoadingContext, LoadingError, PipelineKind, TaskFailure, check_collaborators, create_optional_buffer,
    decompress_with_gpu_extension, read_source, require_buffer,
};

struct LoadingBuffers {
    staging: Option<BufferHandle>,
    temp: Option<BufferHandle>,
    final_buffer: Option<BufferHandle>,
}

fn staging_region<'m, D: Device>(
    mapped: &'m mut MappedBuffer<'_, D>,
    range: BufferRange,
) -> Result<&'m mut [u8], TaskFailure> {
    mapped
        .as_mut_slice()
        .and_then(|slice| slice.get_mut(range.as_usize_range()))
        .ok_or(TaskFailure::BufferUnavailable { buffer: "staging" })
}

/// Creates the buffers of `plan`, uploads every task and returns the final buffer (`None` if it is empty).
///
/// Only setup failures are returned. A task that fails to read or decode is marked
/// [`BufferPipeline::Failed`] and the batch continues.
pub fn execute_buffer_loading<D: Device>(
    ctx: &mut LoadingContext<'_, D>,
    plan: &mut BufferLoadingPlan<'_>,
) -> Result<Option<BufferHandle>, LoadingError> {
    check_collaborators(
        plan.tasks.iter().map(BufferLoadingTask::kind),
        ctx.gpu_decompressor.is_some(),
        ctx.decompression_queue.is_some(),
    )?;

    let buffers = LoadingBuffers {
        staging: create_optional_buffer(
            ctx.device,
            BufferDesc::new(plan.staging_size, "Mode Staging Buffer").with_cpu_access(CpuAccessMode::Write),
        )?,
        temp: create_optional_buffer(
            ctx.device,
            BufferDesc::new(plan.temp_size, "Mode Temp Buffer")
                .with_raw_views()
                .with_uavs()
                .with_automatic_state_tracking(ResourceState::CopyDest),
        )?,
        final_buffer: create_optional_buffer(
            ctx.device,
            BufferDesc::new(plan.final_size, "Mode Buffer")
                .with_raw_views()
                .with_uavs()
                .with_automatic_state_tracking(ResourceState::ShaderResource),
        )?,
    };

    let mut mapped = MappedBuffer::<D>::new(ctx.device);
    if let Some(staging) = &buffers.staging {
        mapped.map(staging, CpuAccessMode::Write)?;
    }

    let mut queue_requests = Vec::new();
    ctx.command_list.open();
    for task in plan.tasks.iter_mut() {
        match record_task(ctx, &buffers, &mut mapped, task) {
            Ok(Some(request)) => queue_requests.push(request),
            Ok(None) => {}
            Err(failure) => {
                match failure {
                    TaskFailure::Read { .. } => warn!("Mip {}: {}", task.mip_level, failure),
                    _ => error!("Mip {}: {}", task.mip_level, failure),
                }
                task.pipeline = BufferPipeline::Failed(failure);
            }
        }
    }
    ctx.command_list.close();

    // The GPU reads staging, so the CPU mapping has to be gone first.
    mapped.unmap();
    ctx.device.execute_command_list(ctx.command_list)?;

    if !queue_requests.is_empty() {
        run_queue_pass(ctx, queue_requests)?;
    }

    debug!(
        "Buffer loading finished: {} of {} tasks loaded",
        plan.tasks.iter().filter(|task| task.is_loaded()).count(),
        plan.tasks.len()
    );
    Ok(buffers.final_buffer)
}

/// Records one task. Hardware queue tasks return their request instead of recording anything.
fn record_task<D: Device>(
    ctx: &mut LoadingContext<'_, D>,
    buffers: &LoadingBuffers,
    mapped: &mut MappedBuffer<'_, D>,
    task: &mut BufferLoadingTask<'_>,
) -> Result<Option<DecompressionRequest>, TaskFailure> {
    let footprint = task.footprint;
    let final_range = task.final_range;
    let source = footprint.range_in_stream;

    match &mut task.pipeline {
        BufferPipeline::Empty | BufferPipeline::Failed(_) => {}
        BufferPipeline::DirectCopy { source, staging } => {
            staging_region(mapped, *staging)?.copy_from_slice(source);
            ctx.command_list.copy_buffer(
                require_buffer(&buffers.final_buffer, final_range, "final")?,
                final_range.offset,
                require_buffer(&buffers.staging, *staging, "staging")?,
                staging.offset,
                staging.size,
            );
        }
        BufferPipeline::ReadUncompressed { staging } => {
            let region = staging_region(mapped, *staging)?;
            read_source(&mut *ctx.stream, source.offset, source.size, None, Some(region))?;

            ctx.command_list.copy_buffer(
                require_buffer(&buffers.final_buffer, final_range, "final")?,
                final_range.offset,
                require_buffer(&buffers.staging, *staging, "staging")?,
                staging.offset,
                source.size,
            );
        }
        BufferPipeline::DecompressOnCpu {
            compressed,
            uncompressed,
            staging,
        } => {
            read_source(&mut *ctx.stream, source.offset, source.size, Some(compressed.as_mut_slice()), None)?;
            ctx.cpu_decompressor.decompress(
                CompressionType::GDeflate,
                compressed,
                uncompressed,
                footprint.uncompressed_crc32,
            )?;

            staging_region(mapped, *staging)?.copy_from_slice(uncompressed);
            ctx.command_list.copy_buffer(
                require_buffer(&buffers.final_buffer, final_range, "final")?,
                final_range.offset,
                require_buffer(&buffers.staging, *staging, "staging")?,
                staging.offset,
                footprint.uncompressed_size,
            );
        }
        BufferPipeline::DecompressWithGpuExt { header, staging, temp } => {
            let region = staging_region(mapped, *staging)?;
            read_source(&mut *ctx.stream, source.offset, source.size, Some(header.as_mut_slice()), Some(region))?;

            let staging_buffer = require_buffer(&buffers.staging, *staging, "staging")?;
            let temp_buffer = require_buffer(&buffers.temp, *temp, "temp")?;
            let final_buffer = require_buffer(&buffers.final_buffer, final_range, "final")?;
            ctx.command_list
                .copy_buffer(temp_buffer, temp.offset, staging_buffer, staging.offset, staging.size);

            let decompressor = ctx
                .gpu_decompressor
                .ok_or(DecompressionError::Unsupported(CompressionType::GDeflate))?;
            decompress_with_gpu_extension(
                &mut *ctx.command_list,
                decompressor,
                header,
                footprint.uncompressed_size,
                (temp_buffer, temp.offset),
                (final_buffer, final_range.offset),
            )?;
        }
        BufferPipeline::DecompressWithHwQueue { compressed } => {
            read_source(&mut *ctx.stream, source.offset, source.size, Some(compressed.as_mut_slice()), None)?;
            let final_buffer = require_buffer(&buffers.final_buffer, final_range, "final")?;

            trace!("Mip {}: deferred to the decompression queue", task.mip_level);
            return Ok(Some(DecompressionRequest {
                source: std::mem::take(compressed),
                destination: QueueDestination::Buffer {
                    buffer: final_buffer.clone(),
                    offset: final_range.offset,
                },
                uncompressed_size: footprint.uncompressed_size,
            }));
        }
    }

    Ok(None)
}

/// Runs strictly after the command list: the GPU is drained, then the queue is submitted and waited on.
pub(crate) fn run_queue_pass<D: Device>(
    ctx: &mut LoadingContext<'_, D>,
    requests: Vec<DecompressionRequest>,
) -> Result<(), LoadingError> {
    ctx.device.wait_for_idle();

    let queue = ctx
        .decompression_queue
        .as_deref_mut()
        .ok_or(LoadingError::MissingCollaborator {
            pipeline: PipelineKind::DecompressWithHwQueue,
            collaborator: "decompression queue",
        })?;

    debug!("Submitting {} requests to the decompression queue", requests.len());
    for request in requests {
        queue.enqueue_request(request);
    }

    let failures = queue.failures();
    let event = Arc::new(CompletionEvent::default());
    queue.enqueue_signal(event.clone());
    queue.submit();
    event.wait();

    if queue.failures() > failures {
        warn!("{} decompression queue requests failed", queue.failures() - failures);
    }
    Ok(())
}
