use texstream::decompression::DecompressionBackend;
use texstream::decompression::cpu::TileStreamDecompressor;
use texstream::decompression::queue::DecompressionQueue;
use texstream::gpu::headless::{DeviceEvent, HeadlessDevice, ResourceId};
use texstream::gpu::{Device, GraphicsApi, ResourceState, TextureDesc, TextureHandle};
use texstream::io::container::loader::ContainerFile;
use texstream::loading::texture_executor::execute_texture_loading;
use texstream::loading::texture_tasks::{TextureLoadingPlan, TexturePipeline};
use texstream::loading::{LoadingContext, LoadingError, PipelineKind, TaskFailure};
use texstream_files::footprint::CompressionType;

mod common;

fn create_latent_texture(device: &HeadlessDevice, name: &str) -> Result<TextureHandle, anyhow::Error> {
    let desc = common::latent_desc();
    Ok(device.create_texture(TextureDesc {
        width: desc.width,
        height: desc.height,
        mip_levels: desc.mip_levels,
        array_size: desc.array_size,
        debug_name: name.to_string(),
        ..Default::default()
    })?)
}

fn assert_uploaded(device: &HeadlessDevice, texture: &TextureHandle, plan: &TextureLoadingPlan) {
    for task in plan
        .tasks
        .iter()
        .filter(|task| task.is_loaded() && task.texture == *texture)
    {
        let expected = common::latent_layers()
            .into_iter()
            .find(|(mip, layer, ..)| *mip == task.mip_level && *layer == task.array_layer)
            .map(|(.., data)| data);
        assert_eq!(
            device.texture_subresource(texture, task.mip_level, task.array_layer),
            expected,
            "mip {} layer {}",
            task.mip_level,
            task.array_layer
        );
    }
}

fn assert_shader_resource(device: &HeadlessDevice, texture: &TextureHandle) {
    assert_eq!(device.texture_state(texture), Some((ResourceState::ShaderResource, true)));
}

#[test_log::test]
fn stored_latents_are_written_directly() -> Result<(), anyhow::Error> {
    let bytes = common::build_container(&[], Some(CompressionType::None))?;
    let ContainerFile { metadata, mut stream } = common::open(bytes)?;

    let device = HeadlessDevice::new(GraphicsApi::Headless);
    let texture = create_latent_texture(&device, "latents")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &texture, 0, DecompressionBackend::CpuOnly)?;
    execute_texture_loading(&mut ctx, &mut plan)?;

    assert_eq!(plan.count(PipelineKind::ReadUncompressed), 4);
    assert_uploaded(&device, &texture, &plan);
    assert_shader_resource(&device, &texture);
    assert!(device.validation_errors().is_empty());
    Ok(())
}

#[test_log::test]
fn cpu_decompression_of_latents() -> Result<(), anyhow::Error> {
    let bytes = common::build_container(&[], Some(CompressionType::GDeflate))?;
    let ContainerFile { metadata, mut stream } = common::open(bytes)?;

    let device = HeadlessDevice::new(GraphicsApi::Headless);
    let texture = create_latent_texture(&device, "latents")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &texture, 0, DecompressionBackend::CpuOnly)?;
    execute_texture_loading(&mut ctx, &mut plan)?;

    assert_eq!(plan.count(PipelineKind::DecompressOnCpu), 4);
    assert_uploaded(&device, &texture, &plan);
    assert_shader_resource(&device, &texture);
    assert!(device.validation_errors().is_empty());
    Ok(())
}

#[test_log::test]
fn gpu_extension_copies_into_the_texture() -> Result<(), anyhow::Error> {
    let bytes = common::build_container(&[], Some(CompressionType::GDeflate))?;
    let ContainerFile { metadata, mut stream } = common::open(bytes)?;

    let device = HeadlessDevice::new(GraphicsApi::Vulkan);
    let texture = create_latent_texture(&device, "latents")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let gpu_decompressor = device.gpu_decompressor();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor)
        .with_gpu_decompressor(&gpu_decompressor);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &texture, 0, DecompressionBackend::GpuExtension)?;
    assert_eq!(plan.decompressed_size, 2 * 1024 + 2 * 256);

    execute_texture_loading(&mut ctx, &mut plan)?;

    assert_eq!(plan.count(PipelineKind::DecompressWithGpuExt), 4);
    assert_uploaded(&device, &texture, &plan);
    assert_shader_resource(&device, &texture);
    assert!(device.validation_errors().is_empty());
    Ok(())
}

#[test_log::test]
fn hardware_queue_writes_before_the_final_transition() -> Result<(), anyhow::Error> {
    let bytes = common::build_container(&[], Some(CompressionType::GDeflate))?;
    let ContainerFile { metadata, mut stream } = common::open(bytes)?;

    let device = HeadlessDevice::new(GraphicsApi::D3D12);
    let texture = create_latent_texture(&device, "latents")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let mut queue = device.decompression_queue();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor)
        .with_decompression_queue(&mut queue);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &texture, 0, DecompressionBackend::HardwareQueue)?;
    execute_texture_loading(&mut ctx, &mut plan)?;
    drop(ctx);

    assert_eq!(queue.failures(), 0);
    let events = device.events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[1], DeviceEvent::WaitForIdle);
    assert_eq!(events[2], DeviceEvent::QueueSubmitted { requests: 4 });
    assert!(matches!(events[3], DeviceEvent::CommandListExecuted { .. }));

    assert_uploaded(&device, &texture, &plan);
    assert_shader_resource(&device, &texture);
    assert!(device.validation_errors().is_empty());
    Ok(())
}

#[test_log::test]
fn each_texture_is_transitioned_once() -> Result<(), anyhow::Error> {
    let bytes = common::build_container(&[], Some(CompressionType::None))?;
    let ContainerFile { metadata, mut stream } = common::open(bytes)?;

    let device = HeadlessDevice::new(GraphicsApi::Headless);
    let first = create_latent_texture(&device, "first")?;
    let second = create_latent_texture(&device, "second")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &first, 0, DecompressionBackend::CpuOnly)?;
    plan.add_latent_texture(&metadata, &second, 1, DecompressionBackend::CpuOnly)?;
    assert_eq!(plan.tasks.len(), 6);
    execute_texture_loading(&mut ctx, &mut plan)?;

    for texture in [&first, &second] {
        let transitions: Vec<_> = device
            .transitions()
            .into_iter()
            .filter(|transition| transition.resource == ResourceId::Texture(texture.id()))
            .map(|transition| (transition.state, transition.permanent))
            .collect();
        assert_eq!(
            transitions,
            vec![
                (ResourceState::CopyDest, false),
                (ResourceState::ShaderResource, true)
            ]
        );
        assert_uploaded(&device, texture, &plan);
    }
    assert!(device.texture_subresource(&second, 0, 0).is_none());
    assert!(device.validation_errors().is_empty());
    Ok(())
}

#[test_log::test]
fn missing_subresources_still_end_up_readable() -> Result<(), anyhow::Error> {
    let mut writer = texstream_files::container::writer::ContainerWriter::new(
        common::texture_set_desc(0),
        common::latent_desc(),
    );
    let layers = common::latent_layers();
    let (mip, layer, extent, row_pitch, data) = &layers[1];
    writer.add_latent_layer(*mip, *layer, *extent, *row_pitch, data, CompressionType::None)?;
    let ContainerFile { metadata, mut stream } = common::open(writer.finish()?)?;

    let device = HeadlessDevice::new(GraphicsApi::Headless);
    let texture = create_latent_texture(&device, "sparse")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &texture, 0, DecompressionBackend::CpuOnly)?;
    execute_texture_loading(&mut ctx, &mut plan)?;

    assert_eq!(plan.count(PipelineKind::Empty), 3);
    assert_uploaded(&device, &texture, &plan);
    assert_shader_resource(&device, &texture);
    assert!(device.validation_errors().is_empty());
    Ok(())
}

#[test_log::test]
fn unreadable_subresources_fail_alone() -> Result<(), anyhow::Error> {
    let mut bytes = common::build_container(&[], Some(CompressionType::None))?;
    // the last payload is mip 1 layer 1
    bytes.truncate(bytes.len() - 1);
    let ContainerFile { metadata, mut stream } = common::open(bytes)?;

    let device = HeadlessDevice::new(GraphicsApi::Headless);
    let texture = create_latent_texture(&device, "latents")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &texture, 0, DecompressionBackend::CpuOnly)?;
    execute_texture_loading(&mut ctx, &mut plan)?;

    assert!(matches!(plan.tasks[3].pipeline, TexturePipeline::Failed(TaskFailure::Read { .. })));
    assert_eq!(plan.count(PipelineKind::ReadUncompressed), 3);
    assert!(device.texture_subresource(&texture, 1, 1).is_none());
    assert_uploaded(&device, &texture, &plan);
    assert_shader_resource(&device, &texture);
    Ok(())
}

#[test_log::test]
fn missing_gpu_decompressor_is_a_setup_failure() -> Result<(), anyhow::Error> {
    let bytes = common::build_container(&[], Some(CompressionType::GDeflate))?;
    let ContainerFile { metadata, mut stream } = common::open(bytes)?;

    let device = HeadlessDevice::new(GraphicsApi::Vulkan);
    let texture = create_latent_texture(&device, "latents")?;
    let mut command_list = device.create_command_list();
    let decompressor = TileStreamDecompressor::default();
    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &decompressor);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&metadata, &texture, 0, DecompressionBackend::GpuExtension)?;
    let result = execute_texture_loading(&mut ctx, &mut plan);

    assert!(matches!(result, Err(LoadingError::MissingCollaborator { .. })));
    assert!(device.events().is_empty());
    assert_eq!(device.texture_state(&texture), Some((ResourceState::Common, false)));
    Ok(())
}
