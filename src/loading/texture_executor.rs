use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, error, trace, warn};
use texstream_files::footprint::CompressionType;

use crate::decompression::DecompressionError;
use crate::decompression::queue::{DecompressionRequest, QueueDestination};
use crate::gpu::{BufferDesc, BufferHandle, CommandList, Device, ResourceState, TextureRegion};
use crate::loading::buffer_executor::run_queue_pass;
use crate::loading::texture_tasks::{TextureLoadingPlan, TextureLoadingTask, TexturePipeline};
use crate::loading::{
    LoadingContext, LoadingError, TaskFailure, check_collaborators, create_optional_buffer,
    decompress_with_gpu_extension, read_source, require_buffer,
};

struct LatentBuffers {
    compressed: Option<BufferHandle>,
    decompressed: Option<BufferHandle>,
}

/// Uploads every subresource task of `plan` and leaves all of the plan's textures permanently in
/// the `ShaderResource` state.
///
/// Like the buffer executor, only setup failures are returned; broken tasks end up as
/// [`TexturePipeline::Failed`].
pub fn execute_texture_loading<D: Device>(
    ctx: &mut LoadingContext<'_, D>,
    plan: &mut TextureLoadingPlan,
) -> Result<(), LoadingError> {
    check_collaborators(
        plan.tasks.iter().map(TextureLoadingTask::kind),
        ctx.gpu_decompressor.is_some(),
        ctx.decompression_queue.is_some(),
    )?;

    let buffers = LatentBuffers {
        compressed: create_optional_buffer(
            ctx.device,
            BufferDesc::new(plan.compressed_size, "Compressed Latents Buffer")
                .with_raw_views()
                .with_automatic_state_tracking(ResourceState::CopyDest),
        )?,
        decompressed: create_optional_buffer(
            ctx.device,
            BufferDesc::new(plan.decompressed_size, "Decompressed Latents Buffer")
                .with_raw_views()
                .with_uavs()
                .with_automatic_state_tracking(ResourceState::CopyDest),
        )?,
    };

    let mut writable = HashSet::new();
    let mut queue_requests = Vec::new();

    ctx.command_list.open();
    for task in plan.tasks.iter_mut() {
        match record_task(ctx, &buffers, &mut writable, task) {
            Ok(Some(request)) => queue_requests.push(request),
            Ok(None) => {}
            Err(failure) => {
                match failure {
                    TaskFailure::Read { .. } => warn!(
                        "{} mip {} layer {}: {}",
                        task.texture.desc().debug_name,
                        task.mip_level,
                        task.array_layer,
                        failure
                    ),
                    _ => error!(
                        "{} mip {} layer {}: {}",
                        task.texture.desc().debug_name,
                        task.mip_level,
                        task.array_layer,
                        failure
                    ),
                }
                task.pipeline = TexturePipeline::Failed(failure);
            }
        }
    }
    ctx.command_list.close();
    ctx.device.execute_command_list(ctx.command_list)?;

    if !queue_requests.is_empty() {
        run_queue_pass(ctx, queue_requests)?;
    }

    // Subresources that did not load are left undefined, the textures are still handed to the shaders.
    ctx.command_list.open();
    for texture in plan.tasks.iter().map(|task| &task.texture).unique_by(|texture| texture.id()) {
        ctx.command_list
            .begin_tracking_texture_state(texture, ResourceState::CopyDest);
        ctx.command_list
            .set_permanent_texture_state(texture, ResourceState::ShaderResource);
    }
    ctx.command_list.commit_barriers();
    ctx.command_list.close();
    ctx.device.execute_command_list(ctx.command_list)?;

    debug!(
        "Texture loading finished: {} of {} subresources loaded",
        plan.tasks.iter().filter(|task| task.is_loaded()).count(),
        plan.tasks.len()
    );
    Ok(())
}

fn record_task<D: Device>(
    ctx: &mut LoadingContext<'_, D>,
    buffers: &LatentBuffers,
    writable: &mut HashSet<u64>,
    task: &mut TextureLoadingTask,
) -> Result<Option<DecompressionRequest>, TaskFailure> {
    let footprint = task.footprint;
    let source = footprint.buffer.range_in_stream;
    let texture = &task.texture;

    let cpu_buffer = match &mut task.pipeline {
        TexturePipeline::Empty | TexturePipeline::Failed(_) => return Ok(None),
        TexturePipeline::ReadUncompressed { uncompressed } => uncompressed,
        TexturePipeline::DecompressOnCpu { compressed, .. }
        | TexturePipeline::DecompressWithGpuExt { compressed, .. }
        | TexturePipeline::DecompressWithHwQueue { compressed } => compressed,
    };
    read_source(&mut *ctx.stream, source.offset, source.size, Some(cpu_buffer.as_mut_slice()), None)?;

    if writable.insert(texture.id()) {
        ctx.command_list
            .begin_tracking_texture_state(texture, ResourceState::Common);
        ctx.command_list.set_texture_state(texture, ResourceState::CopyDest);
        ctx.command_list.commit_barriers();
    }

    match &mut task.pipeline {
        TexturePipeline::Empty | TexturePipeline::Failed(_) => {}
        TexturePipeline::ReadUncompressed { uncompressed } => {
            ctx.command_list
                .write_texture(texture, task.array_layer, task.mip_level, uncompressed, footprint.row_pitch);
        }
        TexturePipeline::DecompressOnCpu { compressed, uncompressed } => {
            ctx.cpu_decompressor.decompress(
                CompressionType::GDeflate,
                compressed,
                uncompressed,
                footprint.buffer.uncompressed_crc32,
            )?;
            ctx.command_list
                .write_texture(texture, task.array_layer, task.mip_level, uncompressed, footprint.row_pitch);
        }
        TexturePipeline::DecompressWithGpuExt {
            compressed,
            header_size,
            compressed_range,
            decompressed_range,
        } => {
            let compressed_buffer = require_buffer(&buffers.compressed, *compressed_range, "compressed latents")?;
            let decompressed_buffer =
                require_buffer(&buffers.decompressed, *decompressed_range, "decompressed latents")?;
            let (header, payload) = compressed.split_at(*header_size);

            ctx.command_list
                .write_buffer(compressed_buffer, payload, compressed_range.offset);

            let decompressor = ctx
                .gpu_decompressor
                .ok_or(DecompressionError::Unsupported(CompressionType::GDeflate))?;
            decompress_with_gpu_extension(
                &mut *ctx.command_list,
                decompressor,
                header,
                footprint.buffer.uncompressed_size,
                (compressed_buffer, compressed_range.offset),
                (decompressed_buffer, decompressed_range.offset),
            )?;

            ctx.command_list
                .set_buffer_state(decompressed_buffer, ResourceState::CopySource);
            ctx.command_list
                .copy_buffer_to_texture(
                    decompressed_buffer,
                    decompressed_range.offset,
                    texture,
                    TextureRegion {
                        mip_level: task.mip_level,
                        array_layer: task.array_layer,
                        width: footprint.width,
                        height: footprint.height,
                        row_pitch: footprint.row_pitch,
                        slice_pitch: footprint.slice_pitch,
                    },
                )
                .map_err(TaskFailure::Copy)?;
        }
        TexturePipeline::DecompressWithHwQueue { compressed } => {
            let (width, height) = texture.mip_extent(task.mip_level);
            trace!(
                "{} mip {} layer {}: deferred to the decompression queue",
                texture.desc().debug_name,
                task.mip_level,
                task.array_layer
            );
            return Ok(Some(DecompressionRequest {
                source: std::mem::take(compressed),
                destination: QueueDestination::Texture {
                    texture: texture.clone(),
                    subresource: texture.subresource_index(task.mip_level, task.array_layer),
                    width,
                    height,
                },
                uncompressed_size: footprint.buffer.uncompressed_size,
            }));
        }
    }

    Ok(None)
}
