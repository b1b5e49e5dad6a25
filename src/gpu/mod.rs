//! The device and command list contract the loading pipeline records its work against.

use std::fmt::{Display, Formatter};
use std::ptr::NonNull;
use std::sync::Arc;

use thiserror::Error;

pub mod headless;
pub mod mapped_buffer;


#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Failed to create buffer \"{name}\" ({size} bytes)")]
    BufferCreation { name: String, size: u64 },

    #[error("Failed to create texture \"{name}\"")]
    TextureCreation { name: String },

    #[error("Failed to map buffer \"{name}\": {reason}")]
    Mapping { name: String, reason: &'static str },

    #[error("Unknown resource {id}")]
    UnknownResource { id: u64 },

    #[error("The command list has no native {object:?} object")]
    NoNativeObject { object: NativeObjectType },

    #[error("Command list is not open")]
    CommandListClosed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    Vulkan,
    D3D12,
    /// No real API behind the device, e.g. the in-memory test device.
    Headless,
}

impl Display for GraphicsApi {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphicsApi::Vulkan => write!(f, "Vulkan"),
            GraphicsApi::D3D12 => write!(f, "D3D12"),
            GraphicsApi::Headless => write!(f, "Headless"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CpuAccessMode {
    #[default]
    None,
    Read,
    Write,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Common,
    CopySource,
    CopyDest,
    ShaderResource,
    UnorderedAccess,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NativeObjectType {
    VkCommandBuffer,
    D3D12GraphicsCommandList,
}

/// An opaque native object, e.g. a `VkCommandBuffer`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferDesc {
    pub byte_size: u64,
    pub debug_name: String,
    pub cpu_access: CpuAccessMode,
    pub can_have_raw_views: bool,
    pub can_have_uavs: bool,
    /// `Some` enables automatic state tracking, starting in (and returning to) this state.
    pub initial_state: Option<ResourceState>,
}

impl BufferDesc {
    pub fn new(byte_size: u64, debug_name: &str) -> Self {
        Self {
            byte_size,
            debug_name: debug_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_cpu_access(mut self, cpu_access: CpuAccessMode) -> Self {
        self.cpu_access = cpu_access;
        self
    }

    pub fn with_raw_views(mut self) -> Self {
        self.can_have_raw_views = true;
        self
    }

    pub fn with_uavs(mut self) -> Self {
        self.can_have_uavs = true;
        self
    }

    pub fn with_automatic_state_tracking(mut self, initial_state: ResourceState) -> Self {
        self.initial_state = Some(initial_state);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub debug_name: String,
    pub initial_state: ResourceState,
    /// Automatic state tracking returns the texture to `initial_state` at the end of every command list.
    pub keep_initial_state: bool,
}

/// Where a buffer-to-texture copy lands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureRegion {
    pub mip_level: u32,
    pub array_layer: u32,
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

#[derive(Debug)]
struct Resource<D> {
    id: u64,
    gpu_address: u64,
    desc: D,
}

/// Reference counted buffer handle. Clones refer to the same buffer.
#[derive(Debug, Clone)]
pub struct BufferHandle(Arc<Resource<BufferDesc>>);

impl BufferHandle {
    pub fn new(id: u64, gpu_address: u64, desc: BufferDesc) -> Self {
        Self(Arc::new(Resource { id, gpu_address, desc }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.0.desc
    }

    pub fn gpu_address(&self) -> u64 {
        self.0.gpu_address
    }
}

impl PartialEq for BufferHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for BufferHandle {}

#[derive(Debug, Clone)]
pub struct TextureHandle(Arc<Resource<TextureDesc>>);

impl TextureHandle {
    pub fn new(id: u64, desc: TextureDesc) -> Self {
        Self(Arc::new(Resource {
            id,
            gpu_address: 0,
            desc,
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.0.desc
    }

    /// D3D12 style subresource numbering: mips of layer 0 first.
    pub fn subresource_index(&self, mip_level: u32, array_layer: u32) -> u32 {
        mip_level + array_layer * self.desc().mip_levels
    }

    pub fn subresource_from_index(&self, index: u32) -> (u32, u32) {
        let mips = self.desc().mip_levels.max(1);
        (index % mips, index / mips)
    }

    pub fn mip_extent(&self, mip_level: u32) -> (u32, u32) {
        let desc = self.desc();
        ((desc.width >> mip_level).max(1), (desc.height >> mip_level).max(1))
    }
}

impl PartialEq for TextureHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TextureHandle {}

/// A graphics device. All methods take `&self`, devices synchronize internally.
///
/// # Safety
/// A pointer returned by [`Device::map_buffer`] must be valid for reads and writes of
/// `byte_size` bytes of that buffer, and must not be accessed by the device itself,
/// until [`Device::unmap_buffer`] is called for the same buffer.
pub unsafe trait Device {
    type CommandList: CommandList;

    fn graphics_api(&self) -> GraphicsApi;

    fn create_buffer(&self, desc: BufferDesc) -> Result<BufferHandle, GpuError>;

    fn create_texture(&self, desc: TextureDesc) -> Result<TextureHandle, GpuError>;

    fn create_command_list(&self) -> Self::CommandList;

    fn map_buffer(&self, buffer: &BufferHandle, access: CpuAccessMode) -> Result<NonNull<u8>, GpuError>;

    fn unmap_buffer(&self, buffer: &BufferHandle);

    /// Submits a closed command list.
    fn execute_command_list(&self, command_list: &mut Self::CommandList) -> Result<(), GpuError>;

    fn wait_for_idle(&self);
}

/// Records GPU work. Texture state methods always address all subresources.
pub trait CommandList {
    fn open(&mut self);

    fn close(&mut self);

    fn copy_buffer(&mut self, dst: &BufferHandle, dst_offset: u64, src: &BufferHandle, src_offset: u64, size: u64);

    fn write_buffer(&mut self, dst: &BufferHandle, data: &[u8], dst_offset: u64);

    fn write_texture(&mut self, dst: &TextureHandle, array_layer: u32, mip_level: u32, data: &[u8], row_pitch: u32);

    /// Copies tightly packed rows from a buffer into a texture subresource that is in the `CopyDest` state.
    fn copy_buffer_to_texture(
        &mut self,
        src: &BufferHandle,
        src_offset: u64,
        dst: &TextureHandle,
        region: TextureRegion,
    ) -> Result<(), GpuError>;

    fn set_buffer_state(&mut self, buffer: &BufferHandle, state: ResourceState);

    fn begin_tracking_texture_state(&mut self, texture: &TextureHandle, state: ResourceState);

    fn set_texture_state(&mut self, texture: &TextureHandle, state: ResourceState);

    /// Transitions the texture and stops tracking it; it stays in `state` from now on.
    fn set_permanent_texture_state(&mut self, texture: &TextureHandle, state: ResourceState);

    fn commit_barriers(&mut self);

    fn native_object(&self, object: NativeObjectType) -> Option<NativeHandle>;
}
