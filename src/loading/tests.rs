use std::collections::HashMap;
use std::io::Cursor;

use texstream_files::footprint::{
    BufferFootprint, CompressionType, LatentTextureDesc, LatentTextureFootprint, StreamRange, TextureSetDesc,
};
use texstream_files::metadata::{InMemoryTextureMetadata, TextureMetadata, TextureSetMetadata};

use crate::decompression::DecompressionBackend;
use crate::gpu::{TextureDesc, TextureHandle};
use crate::loading::buffer_tasks::{BufferPipeline, plan_buffer_loading};
use crate::loading::range::{BufferRange, append_buffer_range, round_up_4};
use crate::loading::texture_tasks::{TextureLoadingPlan, TexturePipeline};
use crate::loading::{LoadingError, PipelineKind, TaskFailure, check_collaborators, read_source};

fn footprint(offset: u64, size: u64, uncompressed_size: u64, compression_type: CompressionType) -> BufferFootprint {
    BufferFootprint {
        range_in_stream: StreamRange { offset, size },
        uncompressed_size,
        uncompressed_crc32: 0,
        compression_type,
    }
}

/// Mips 0-2 stored (1024, 512, 256 bytes), mip 3 compressed from 128 into 64 bytes.
fn four_mip_asset() -> (TextureSetDesc, InMemoryTextureMetadata) {
    let desc = TextureSetDesc {
        width: 64,
        height: 64,
        mips: 4,
    };
    let metadata = InMemoryTextureMetadata {
        name: "albedo".to_string(),
        mode_buffers: Vec::new(),
        footprints: vec![
            footprint(100, 1024, 1024, CompressionType::None),
            footprint(1124, 512, 512, CompressionType::None),
            footprint(1636, 256, 256, CompressionType::None),
            footprint(1892, 64, 128, CompressionType::GDeflate),
        ],
    };
    (desc, metadata)
}

struct LatentSet {
    desc: LatentTextureDesc,
    footprints: HashMap<(u32, u32), LatentTextureFootprint>,
}

impl TextureSetMetadata for LatentSet {
    fn desc(&self) -> TextureSetDesc {
        TextureSetDesc::default()
    }

    fn texture_count(&self) -> usize {
        0
    }

    fn texture(&self, _index: usize) -> Option<&dyn TextureMetadata> {
        None
    }

    fn latent_texture_desc(&self) -> LatentTextureDesc {
        self.desc
    }

    fn latent_texture_footprint(&self, mip_level: u32, layer: u32) -> Option<LatentTextureFootprint> {
        self.footprints.get(&(mip_level, layer)).copied()
    }
}

fn latent_set(compression_type: CompressionType) -> LatentSet {
    let mut footprints = HashMap::new();
    let compressed_size = match compression_type {
        CompressionType::None => 1024,
        CompressionType::GDeflate => 100,
    };
    for (mip_level, layer, offset) in [(0, 0, 0), (0, 1, 2000), (1, 1, 4000)] {
        footprints.insert(
            (mip_level, layer),
            LatentTextureFootprint {
                width: 16,
                height: 16,
                row_pitch: 64,
                slice_pitch: 1024,
                buffer: footprint(offset, compressed_size, 1024, compression_type),
            },
        );
    }

    LatentSet {
        desc: LatentTextureDesc {
            width: 16,
            height: 16,
            mip_levels: 2,
            array_size: 2,
        },
        footprints,
    }
}

fn latent_texture(keep_initial_state: bool) -> TextureHandle {
    TextureHandle::new(
        7,
        TextureDesc {
            width: 16,
            height: 16,
            mip_levels: 2,
            array_size: 2,
            debug_name: "latents".to_string(),
            keep_initial_state,
            ..Default::default()
        },
    )
}

#[test]
fn ranges_are_disjoint_and_aligned() {
    let mut total = 0;
    let mut previous_end = 0;
    for size in [1, 4, 7, 0, 13, 1024, 3] {
        let range = append_buffer_range(&mut total, size);
        assert_eq!(range.size, size);
        assert_eq!(range.offset % 4, 0);
        assert!(range.offset >= previous_end);
        assert_eq!(total, range.offset + round_up_4(size));
        previous_end = range.end();
    }
    assert_eq!(total, 4 + 4 + 8 + 16 + 1024 + 4);
}

#[test]
fn cpu_only_plan() -> Result<(), anyhow::Error> {
    let (desc, metadata) = four_mip_asset();
    let plan = plan_buffer_loading(&desc, &metadata, DecompressionBackend::CpuOnly)?;

    assert_eq!(plan.count(PipelineKind::ReadUncompressed), 3);
    assert_eq!(plan.count(PipelineKind::DecompressOnCpu), 1);
    assert_eq!(plan.final_size, 1920);
    assert_eq!(plan.staging_size, 1920);
    assert_eq!(plan.temp_size, 0);
    assert_eq!(plan.tasks[3].final_range, BufferRange { offset: 1792, size: 128 });

    match &plan.tasks[3].pipeline {
        BufferPipeline::DecompressOnCpu {
            compressed,
            uncompressed,
            staging,
        } => {
            assert_eq!(compressed.len(), 64);
            assert_eq!(uncompressed.len(), 128);
            assert_eq!(*staging, BufferRange { offset: 1792, size: 128 });
        }
        other => panic!("unexpected pipeline {:?}", other),
    }
    Ok(())
}

#[test]
fn gpu_extension_plan_splits_off_the_header() -> Result<(), anyhow::Error> {
    let (desc, metadata) = four_mip_asset();
    let plan = plan_buffer_loading(&desc, &metadata, DecompressionBackend::GpuExtension)?;

    let header_size = tilestream::header_size(128);
    assert_eq!(header_size, 12);
    assert_eq!(plan.count(PipelineKind::DecompressWithGpuExt), 1);
    assert_eq!(plan.temp_size, round_up_4(64 - header_size));
    assert_eq!(plan.staging_size, 1024 + 512 + 256 + round_up_4(64 - header_size));
    assert_eq!(plan.final_size, 1920);

    match &plan.tasks[3].pipeline {
        BufferPipeline::DecompressWithGpuExt { header, staging, temp } => {
            assert_eq!(header.len() as u64 + staging.size, 64);
            assert_eq!(staging.size, temp.size);
            assert_eq!(temp.offset, 0);
        }
        other => panic!("unexpected pipeline {:?}", other),
    }
    Ok(())
}

#[test]
fn hardware_queue_plan_needs_no_staging() -> Result<(), anyhow::Error> {
    let (desc, metadata) = four_mip_asset();
    let plan = plan_buffer_loading(&desc, &metadata, DecompressionBackend::HardwareQueue)?;

    assert_eq!(plan.count(PipelineKind::DecompressWithHwQueue), 1);
    assert_eq!(plan.staging_size, 1024 + 512 + 256);
    assert_eq!(plan.final_size, 1920);
    assert!(matches!(
        &plan.tasks[3].pipeline,
        BufferPipeline::DecompressWithHwQueue { compressed } if compressed.len() == 64
    ));
    Ok(())
}

#[test]
fn host_data_is_copied_directly() -> Result<(), anyhow::Error> {
    let (desc, mut metadata) = four_mip_asset();
    metadata.mode_buffers = vec![vec![5u8; 2048]];
    let plan = plan_buffer_loading(&desc, &metadata, DecompressionBackend::CpuOnly)?;

    let task = &plan.tasks[0];
    assert_eq!(task.kind(), PipelineKind::DirectCopy);
    assert_eq!(task.final_range, BufferRange { offset: 0, size: 2048 });
    match &task.pipeline {
        BufferPipeline::DirectCopy { source, staging } => {
            assert_eq!(source.len(), 2048);
            assert_eq!(*staging, BufferRange { offset: 0, size: 2048 });
        }
        other => panic!("unexpected pipeline {:?}", other),
    }
    assert_eq!(plan.final_size, 2048 + 512 + 256 + 128);
    Ok(())
}

#[test]
fn empty_mips_get_no_ranges() -> Result<(), anyhow::Error> {
    let (desc, mut metadata) = four_mip_asset();
    metadata.footprints[1] = BufferFootprint::default();
    let plan = plan_buffer_loading(&desc, &metadata, DecompressionBackend::CpuOnly)?;

    assert_eq!(plan.tasks.len(), 4);
    assert_eq!(plan.tasks[1].kind(), PipelineKind::Empty);
    assert!(!plan.tasks[1].is_loaded());
    assert_eq!(plan.tasks[1].final_range, BufferRange::default());
    assert_eq!(plan.final_size, 1024 + 256 + 128);
    Ok(())
}

#[test]
fn missing_decoder_fails_the_task_only() -> Result<(), anyhow::Error> {
    let (desc, metadata) = four_mip_asset();
    let plan = plan_buffer_loading(&desc, &metadata, DecompressionBackend::None)?;

    assert_eq!(plan.count(PipelineKind::ReadUncompressed), 3);
    assert!(matches!(
        plan.tasks[3].pipeline,
        BufferPipeline::Failed(TaskFailure::NoDecoder)
    ));
    assert_eq!(plan.final_size, 1024 + 512 + 256);
    Ok(())
}

#[test]
fn header_must_be_smaller_than_the_range() {
    let (desc, mut metadata) = four_mip_asset();
    metadata.footprints[3] = footprint(1892, 12, 128, CompressionType::GDeflate);

    let result = plan_buffer_loading(&desc, &metadata, DecompressionBackend::GpuExtension);
    assert!(matches!(result, Err(LoadingError::InvalidFootprint { mip_level: 3, .. })));

    // only the extension path splits the range
    assert!(plan_buffer_loading(&desc, &metadata, DecompressionBackend::CpuOnly).is_ok());
}

#[test]
fn stored_ranges_must_match_their_size() {
    let (desc, mut metadata) = four_mip_asset();
    metadata.footprints[0] = footprint(100, 1000, 1024, CompressionType::None);

    let result = plan_buffer_loading(&desc, &metadata, DecompressionBackend::CpuOnly);
    assert!(matches!(result, Err(LoadingError::InvalidFootprint { mip_level: 0, .. })));
}

#[test]
fn plan_summary_lists_every_mip() -> Result<(), anyhow::Error> {
    let (desc, metadata) = four_mip_asset();
    let plan = plan_buffer_loading(&desc, &metadata, DecompressionBackend::CpuOnly)?;

    let summary = plan.to_string();
    assert!(summary.starts_with("staging 1920 bytes, temp 0 bytes, final 1920 bytes"));
    assert!(summary.contains("mip 3: DecompressOnCpu (final 1792+128)"));
    Ok(())
}

#[test]
fn texture_plan_covers_every_subresource() -> Result<(), anyhow::Error> {
    let set = latent_set(CompressionType::GDeflate);
    let texture = latent_texture(false);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&set, &texture, 0, DecompressionBackend::GpuExtension)?;

    assert_eq!(plan.tasks.len(), 4);
    assert_eq!(plan.count(PipelineKind::DecompressWithGpuExt), 3);
    // mip 1 layer 0 has no footprint
    assert_eq!(plan.tasks[2].kind(), PipelineKind::Empty);

    let header_size = tilestream::header_size(1024);
    assert_eq!(plan.compressed_size, 3 * round_up_4(100 - header_size));
    assert_eq!(plan.decompressed_size, 3 * 1024);

    match &plan.tasks[3].pipeline {
        TexturePipeline::DecompressWithGpuExt {
            compressed,
            header_size: task_header,
            compressed_range,
            decompressed_range,
        } => {
            assert_eq!(compressed.len(), 100);
            assert_eq!(*task_header as u64, header_size);
            assert_eq!(compressed_range.size, 100 - header_size);
            assert_eq!(*decompressed_range, BufferRange { offset: 2048, size: 1024 });
        }
        other => panic!("unexpected pipeline {:?}", other),
    }
    Ok(())
}

#[test]
fn texture_plan_starts_at_the_first_mip() -> Result<(), anyhow::Error> {
    let set = latent_set(CompressionType::None);
    let texture = latent_texture(false);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&set, &texture, 1, DecompressionBackend::CpuOnly)?;

    assert_eq!(plan.tasks.len(), 2);
    assert!(plan.tasks.iter().all(|task| task.mip_level == 1));
    assert_eq!(plan.count(PipelineKind::ReadUncompressed), 1);
    assert_eq!(plan.compressed_size + plan.decompressed_size, 0);
    Ok(())
}

#[test]
fn texture_plan_per_backend() -> Result<(), anyhow::Error> {
    let set = latent_set(CompressionType::GDeflate);
    let texture = latent_texture(false);

    let mut plan = TextureLoadingPlan::new();
    plan.add_latent_texture(&set, &texture, 0, DecompressionBackend::CpuOnly)?;
    plan.add_latent_texture(&set, &texture, 0, DecompressionBackend::HardwareQueue)?;
    plan.add_latent_texture(&set, &texture, 0, DecompressionBackend::None)?;

    assert_eq!(plan.count(PipelineKind::DecompressOnCpu), 3);
    assert_eq!(plan.count(PipelineKind::DecompressWithHwQueue), 3);
    assert_eq!(plan.count(PipelineKind::Failed), 3);
    assert_eq!(plan.compressed_size + plan.decompressed_size, 0);
    Ok(())
}

#[test]
fn stored_subresources_must_match_their_size() {
    let mut set = latent_set(CompressionType::None);
    if let Some(footprint) = set.footprints.get_mut(&(0, 1)) {
        footprint.buffer.range_in_stream.size = 1000;
    }
    let texture = latent_texture(false);

    let mut plan = TextureLoadingPlan::new();
    let result = plan.add_latent_texture(&set, &texture, 0, DecompressionBackend::CpuOnly);
    assert!(matches!(
        result,
        Err(LoadingError::InvalidFootprint {
            mip_level: 0,
            layer: 1,
            ..
        })
    ));
}

#[test]
fn tracked_textures_are_rejected() {
    let set = latent_set(CompressionType::None);
    let texture = latent_texture(true);

    let mut plan = TextureLoadingPlan::new();
    let result = plan.add_latent_texture(&set, &texture, 0, DecompressionBackend::CpuOnly);
    assert!(matches!(result, Err(LoadingError::AutomaticStateTracking { .. })));
    assert!(plan.tasks.is_empty());
}

#[test]
fn collaborators_are_checked_per_pipeline() {
    let kinds = [PipelineKind::ReadUncompressed, PipelineKind::DecompressWithGpuExt];
    assert!(check_collaborators(kinds, true, false).is_ok());
    assert!(matches!(
        check_collaborators(kinds, false, true),
        Err(LoadingError::MissingCollaborator {
            pipeline: PipelineKind::DecompressWithGpuExt,
            ..
        })
    ));
    assert!(check_collaborators([PipelineKind::DecompressWithHwQueue], false, false).is_err());
    assert!(check_collaborators([PipelineKind::Failed, PipelineKind::Empty], false, false).is_ok());
}

#[test]
fn split_reads_fill_host_memory_first() -> Result<(), anyhow::Error> {
    let data: Vec<u8> = (0..32u8).collect();
    let mut stream = Cursor::new(data);

    let mut header = [0u8; 4];
    let mut staging = [0u8; 8];
    read_source(&mut stream, 10, 12, Some(&mut header[..]), Some(&mut staging[..]))?;
    assert_eq!(header, [10, 11, 12, 13]);
    assert_eq!(staging, [14, 15, 16, 17, 18, 19, 20, 21]);

    let mut past_end = [0u8; 8];
    let result = read_source(&mut stream, 28, 8, Some(&mut past_end[..]), None);
    assert!(matches!(result, Err(TaskFailure::Read { offset: 28, size: 8, .. })));
    Ok(())
}
