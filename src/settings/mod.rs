use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum, value_parser};
use itertools::Itertools;
use texstream::decompression::DecompressionBackend;
use texstream::gpu::GraphicsApi;

#[derive(Parser, Debug)]
#[command(name = "texstream")]
#[command(version)]
#[command(about = "Plans and runs streamed texture set uploads")]
pub struct CliArgs {
    #[arg(long, value_enum, env = "TEXSTREAM_BACKEND", default_value_t = BackendChoice::Auto)]
    pub backend: BackendChoice,

    #[arg(long, value_enum, default_value_t = ApiChoice::Headless)]
    pub graphics_api: ApiChoice,

    /// Whether the device reports GPU decompression support, only used with `--backend auto`.
    #[arg(long)]
    pub gpu_decompression: bool,

    #[arg(long, default_value_t = 0)]
    pub first_latent_mip: u32,

    /// `all` or a comma separated list of texture indices, e.g. `0,2`.
    #[arg(long, default_value = "all", value_parser = value_parser!(TextureSelection))]
    pub textures: TextureSelection,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prints the texture set and the plans the selected backend would run.
    Inspect {
        #[arg(env = "TEXSTREAM_FILE")]
        file: PathBuf,
    },
    /// Loads every selected texture into the headless device and reports the outcome per task.
    Load {
        #[arg(env = "TEXSTREAM_FILE")]
        file: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    /// Decide like device setup would, from the graphics API and GPU decompression support.
    Auto,
    Cpu,
    GpuExtension,
    HardwareQueue,
    None,
}

impl BackendChoice {
    pub fn resolve(self, graphics_api: GraphicsApi, gpu_decompression: bool) -> DecompressionBackend {
        match self {
            BackendChoice::Auto => DecompressionBackend::detect(gpu_decompression, graphics_api),
            BackendChoice::Cpu => DecompressionBackend::CpuOnly,
            BackendChoice::GpuExtension => DecompressionBackend::GpuExtension,
            BackendChoice::HardwareQueue => DecompressionBackend::HardwareQueue,
            BackendChoice::None => DecompressionBackend::None,
        }
    }
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ApiChoice {
    Vulkan,
    D3d12,
    Headless,
}

impl From<ApiChoice> for GraphicsApi {
    fn from(choice: ApiChoice) -> Self {
        match choice {
            ApiChoice::Vulkan => GraphicsApi::Vulkan,
            ApiChoice::D3d12 => GraphicsApi::D3D12,
            ApiChoice::Headless => GraphicsApi::Headless,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSelection {
    All,
    Indices(Vec<usize>),
}

impl TextureSelection {
    pub fn contains(&self, index: usize) -> bool {
        match self {
            TextureSelection::All => true,
            TextureSelection::Indices(indices) => indices.contains(&index),
        }
    }
}

impl FromStr for TextureSelection {
    type Err = String;

    // all | 0,2,3
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let string: String = s.chars().filter(|&c| !c.is_whitespace()).collect();
        if string.eq_ignore_ascii_case("all") {
            return Ok(TextureSelection::All);
        }

        let indices = string
            .split(',')
            .map(|split| {
                split
                    .parse::<usize>()
                    .map_err(|err| format!("Invalid texture index \"{}\": {}", split, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TextureSelection::Indices(indices.into_iter().unique().collect_vec()))
    }
}
