use std::path::Path;

use clap::Parser;
use log::{info, warn};
use texstream::decompression::DecompressionBackend;
use texstream::decompression::cpu::TileStreamDecompressor;
use texstream::decompression::queue::DecompressionQueue;
use texstream::gpu::headless::HeadlessDevice;
use texstream::gpu::{Device, GraphicsApi, TextureDesc, TextureHandle};
use texstream::io::container::loader::ContainerFile;
use texstream::loading::buffer_executor::execute_buffer_loading;
use texstream::loading::buffer_tasks::plan_buffer_loading;
use texstream::loading::texture_executor::execute_texture_loading;
use texstream::loading::texture_tasks::TextureLoadingPlan;
use texstream::loading::{LoadingContext, PipelineKind};
use texstream_files::metadata::TextureSetMetadata;

use crate::settings::{CliArgs, Command};

mod settings;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let graphics_api = GraphicsApi::from(args.graphics_api);
    let backend = args.backend.resolve(graphics_api, args.gpu_decompression);
    info!("Using the {} decompression backend on {}", backend, graphics_api);

    match &args.command {
        Command::Inspect { file } => inspect(file, &args, graphics_api, backend),
        Command::Load { file } => load(file, &args, graphics_api, backend),
    }
}

fn outcome(kind: PipelineKind) -> &'static str {
    match kind {
        PipelineKind::Empty => "empty",
        PipelineKind::Failed => "failed",
        PipelineKind::DecompressWithHwQueue => "submitted",
        _ => "loaded",
    }
}

fn latent_texture(device: &HeadlessDevice, metadata: &dyn TextureSetMetadata) -> anyhow::Result<TextureHandle> {
    let desc = metadata.latent_texture_desc();
    Ok(device.create_texture(TextureDesc {
        width: desc.width,
        height: desc.height,
        mip_levels: desc.mip_levels,
        array_size: desc.array_size,
        debug_name: "Latent Texture".to_string(),
        ..Default::default()
    })?)
}

fn inspect(file: &Path, args: &CliArgs, graphics_api: GraphicsApi, backend: DecompressionBackend) -> anyhow::Result<()> {
    let container = ContainerFile::open(file)?;
    let metadata = &container.metadata;
    let desc = metadata.desc();

    println!(
        "{}: {}x{}, {} mips, {} textures",
        file.display(),
        desc.width,
        desc.height,
        desc.mips,
        metadata.texture_count()
    );

    for index in (0..metadata.texture_count()).filter(|index| args.textures.contains(*index)) {
        let Some(texture) = metadata.texture(index) else {
            continue;
        };
        let plan = plan_buffer_loading(&desc, texture, backend)?;
        println!("texture {} \"{}\": {}", index, texture.name(), plan);
    }

    let latent_desc = metadata.latent_texture_desc();
    if latent_desc.mip_levels > 0 && latent_desc.array_size > 0 {
        let device = HeadlessDevice::new(graphics_api);
        let mut plan = TextureLoadingPlan::new();
        plan.add_latent_texture(metadata, &latent_texture(&device, metadata)?, args.first_latent_mip, backend)?;
        println!("latents: {}", plan);
    }

    Ok(())
}

fn load(file: &Path, args: &CliArgs, graphics_api: GraphicsApi, backend: DecompressionBackend) -> anyhow::Result<()> {
    let ContainerFile { metadata, mut stream } = ContainerFile::open(file)?;
    let desc = metadata.desc();

    let device = HeadlessDevice::new(graphics_api);
    let mut command_list = device.create_command_list();
    let cpu_decompressor = TileStreamDecompressor::default();
    let gpu_decompressor = device.gpu_decompressor();
    let mut queue = device.decompression_queue();

    let mut ctx = LoadingContext::new(&device, &mut command_list, &mut stream, &cpu_decompressor)
        .with_gpu_decompressor(&gpu_decompressor)
        .with_decompression_queue(&mut queue);

    for index in (0..metadata.texture_count()).filter(|index| args.textures.contains(*index)) {
        let Some(texture) = metadata.texture(index) else {
            continue;
        };

        let mut plan = plan_buffer_loading(&desc, texture, backend)?;
        let buffer = execute_buffer_loading(&mut ctx, &mut plan)?;

        println!(
            "texture {} \"{}\": {} bytes in {}",
            index,
            texture.name(),
            plan.final_size,
            buffer.as_ref().map_or("no buffer", |buffer| buffer.desc().debug_name.as_str())
        );
        for task in &plan.tasks {
            println!("  mip {}: {} ({})", task.mip_level, outcome(task.kind()), task.kind());
        }
    }

    let latent_desc = metadata.latent_texture_desc();
    if latent_desc.mip_levels > 0 && latent_desc.array_size > 0 {
        let texture = latent_texture(&device, &metadata)?;
        let mut plan = TextureLoadingPlan::new();
        plan.add_latent_texture(&metadata, &texture, args.first_latent_mip, backend)?;
        execute_texture_loading(&mut ctx, &mut plan)?;

        println!("latents:");
        for task in &plan.tasks {
            println!(
                "  mip {} layer {}: {} ({})",
                task.mip_level,
                task.array_layer,
                outcome(task.kind()),
                task.kind()
            );
        }
    }

    drop(ctx);

    let validation_errors = device.validation_errors();
    for message in &validation_errors {
        warn!("Device validation: {}", message);
    }
    if !validation_errors.is_empty() {
        anyhow::bail!("{} device validation errors", validation_errors.len());
    }
    if queue.failures() > 0 {
        anyhow::bail!("{} decompression queue requests failed", queue.failures());
    }

    Ok(())
}
