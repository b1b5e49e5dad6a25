//! An in-memory device. Buffers and texture subresources are plain byte vectors, command lists are
//! recorded and replayed on execution, and every state transition is logged for inspection.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, error, trace, warn};

use crate::decompression::queue::{CompletionEvent, DecompressionQueue, DecompressionRequest, QueueDestination};
use crate::decompression::{DecompressionError, GpuDecompressor};
use crate::gpu::{
    BufferDesc, BufferHandle, CommandList, CpuAccessMode, Device, GpuError, GraphicsApi, NativeHandle,
    NativeObjectType, ResourceState, TextureDesc, TextureHandle, TextureRegion,
};

const ADDRESS_SHIFT: u32 = 32;
const ADDRESS_MASK: u64 = (1 << ADDRESS_SHIFT) - 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Buffer(u64),
    Texture(u64),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    pub resource: ResourceId,
    pub state: ResourceState,
    pub permanent: bool,
}

/// Coarse timeline of what happened on the device, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    CommandListExecuted { commands: usize },
    WaitForIdle,
    QueueSubmitted { requests: usize },
}

#[derive(Debug, Clone)]
enum Command {
    CopyBuffer {
        dst: u64,
        dst_offset: u64,
        src: u64,
        src_offset: u64,
        size: u64,
    },
    WriteBuffer {
        dst: u64,
        offset: u64,
        data: Vec<u8>,
    },
    WriteTexture {
        texture: u64,
        mip_level: u32,
        array_layer: u32,
        data: Vec<u8>,
    },
    CopyBufferToTexture {
        src: u64,
        src_offset: u64,
        texture: u64,
        region: TextureRegion,
    },
    BeginTracking {
        texture: u64,
        state: ResourceState,
    },
    Barriers(Vec<Transition>),
    GDeflate {
        header: Vec<u8>,
        uncompressed_size: u64,
        compressed_address: u64,
        decompressed_address: u64,
    },
}

#[derive(Debug, Default)]
struct Recording {
    open: bool,
    commands: Vec<Command>,
    pending_barriers: Vec<Transition>,
}

#[derive(Debug)]
struct BufferStorage {
    desc: BufferDesc,
    data: Box<[u8]>,
    mapped: bool,
    state: ResourceState,
}

#[derive(Debug)]
struct TextureStorage {
    desc: TextureDesc,
    subresources: HashMap<(u32, u32), Vec<u8>>,
    state: ResourceState,
    permanent: bool,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u64,
    buffers: HashMap<u64, BufferStorage>,
    textures: HashMap<u64, TextureStorage>,
    recordings: HashMap<u64, Recording>,
    transitions: Vec<Transition>,
    events: Vec<DeviceEvent>,
    validation_errors: Vec<String>,
    failing_buffers: Vec<String>,
}

impl DeviceState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn report(&mut self, message: String) {
        error!("Headless validation: {}", message);
        self.validation_errors.push(message);
    }

    fn buffer_region(&mut self, id: u64, offset: u64, size: u64) -> Result<&mut [u8], String> {
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or_else(|| format!("unknown buffer {}", id))?;

        let end = offset
            .checked_add(size)
            .filter(|end| *end <= buffer.data.len() as u64)
            .ok_or_else(|| {
                format!(
                    "range {}+{} is outside of buffer \"{}\" ({} bytes)",
                    offset,
                    size,
                    buffer.desc.debug_name,
                    buffer.data.len()
                )
            })?;

        Ok(&mut buffer.data[offset as usize..end as usize])
    }

    fn resolve_address(&mut self, address: u64, size: u64) -> Result<&mut [u8], String> {
        self.buffer_region(address >> ADDRESS_SHIFT, address & ADDRESS_MASK, size)
    }

    fn check_not_mapped(&mut self, id: u64) {
        if let Some(buffer) = self.buffers.get(&id)
            && buffer.mapped
        {
            let message = format!("buffer \"{}\" is mapped while the GPU accesses it", buffer.desc.debug_name);
            self.report(message);
        }
    }

    fn texture_for_write(&mut self, id: u64) -> Result<&mut TextureStorage, String> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| format!("unknown texture {}", id))?;

        if texture.state != ResourceState::CopyDest {
            return Err(format!(
                "texture \"{}\" is written in state {:?}",
                texture.desc.debug_name, texture.state
            ));
        }

        Ok(texture)
    }

    fn write_subresource(&mut self, id: u64, mip_level: u32, array_layer: u32, data: Vec<u8>) -> Result<(), String> {
        let texture = self.texture_for_write(id)?;
        if mip_level >= texture.desc.mip_levels || array_layer >= texture.desc.array_size {
            return Err(format!(
                "subresource mip {} layer {} does not exist in \"{}\"",
                mip_level, array_layer, texture.desc.debug_name
            ));
        }
        texture.subresources.insert((mip_level, array_layer), data);
        Ok(())
    }

    fn apply_transition(&mut self, transition: Transition) {
        match transition.resource {
            ResourceId::Buffer(id) => {
                if let Some(buffer) = self.buffers.get_mut(&id) {
                    buffer.state = transition.state;
                }
            }
            ResourceId::Texture(id) => {
                let Some(texture) = self.textures.get_mut(&id) else {
                    return;
                };
                if texture.permanent {
                    let message = format!("texture \"{}\" changes state after a permanent transition", texture.desc.debug_name);
                    self.report(message);
                    return;
                }
                texture.state = transition.state;
                texture.permanent = transition.permanent;
            }
        }
        self.transitions.push(transition);
    }

    fn apply(&mut self, command: Command) -> Result<(), String> {
        match command {
            Command::CopyBuffer {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                self.check_not_mapped(src);
                let data = self.buffer_region(src, src_offset, size)?.to_vec();
                self.buffer_region(dst, dst_offset, size)?.copy_from_slice(&data);
            }
            Command::WriteBuffer { dst, offset, data } => {
                self.buffer_region(dst, offset, data.len() as u64)?.copy_from_slice(&data);
            }
            Command::WriteTexture {
                texture,
                mip_level,
                array_layer,
                data,
            } => {
                self.write_subresource(texture, mip_level, array_layer, data)?;
            }
            Command::CopyBufferToTexture {
                src,
                src_offset,
                texture,
                region,
            } => {
                self.check_not_mapped(src);
                let data = self
                    .buffer_region(src, src_offset, u64::from(region.slice_pitch))?
                    .to_vec();
                self.write_subresource(texture, region.mip_level, region.array_layer, data)?;
            }
            Command::BeginTracking { texture, state } => {
                if let Some(texture) = self.textures.get_mut(&texture) {
                    texture.state = state;
                }
            }
            Command::Barriers(transitions) => {
                for transition in transitions {
                    self.apply_transition(transition);
                }
            }
            Command::GDeflate {
                header,
                uncompressed_size,
                compressed_address,
                decompressed_address,
            } => {
                let payload_size = tilestream::payload_size(&header).map_err(|err| err.to_string())?;
                let mut stream = header;
                stream.extend_from_slice(self.resolve_address(compressed_address, payload_size as u64)?);

                let output = self.resolve_address(decompressed_address, uncompressed_size)?;
                tilestream::decompress_into(&stream, output).map_err(|err| format!("GPU decompression failed: {}", err))?;
            }
        }

        Ok(())
    }
}

/// Cheap to clone, all clones share the same device.
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    api: GraphicsApi,
    state: Rc<RefCell<DeviceState>>,
}

impl HeadlessDevice {
    /// `api` decides which native objects command lists hand out.
    pub fn new(api: GraphicsApi) -> Self {
        Self {
            api,
            state: Rc::new(RefCell::new(DeviceState::default())),
        }
    }

    /// Makes every following buffer creation with this debug name fail.
    pub fn fail_buffer_creation(&self, debug_name: &str) {
        self.state.borrow_mut().failing_buffers.push(debug_name.to_string());
    }

    pub fn buffer_contents(&self, buffer: &BufferHandle) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .buffers
            .get(&buffer.id())
            .map(|storage| storage.data.to_vec())
    }

    pub fn is_mapped(&self, buffer: &BufferHandle) -> bool {
        self.state
            .borrow()
            .buffers
            .get(&buffer.id())
            .is_some_and(|storage| storage.mapped)
    }

    pub fn texture_subresource(&self, texture: &TextureHandle, mip_level: u32, array_layer: u32) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .textures
            .get(&texture.id())
            .and_then(|storage| storage.subresources.get(&(mip_level, array_layer)).cloned())
    }

    /// Current state and whether it is permanent.
    pub fn texture_state(&self, texture: &TextureHandle) -> Option<(ResourceState, bool)> {
        self.state
            .borrow()
            .textures
            .get(&texture.id())
            .map(|storage| (storage.state, storage.permanent))
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.state.borrow().transitions.clone()
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.borrow().events.clone()
    }

    pub fn validation_errors(&self) -> Vec<String> {
        self.state.borrow().validation_errors.clone()
    }

    pub fn gpu_decompressor(&self) -> HeadlessGpuDecompressor {
        HeadlessGpuDecompressor { device: self.clone() }
    }

    pub fn decompression_queue(&self) -> HeadlessDecompressionQueue {
        HeadlessDecompressionQueue {
            device: self.clone(),
            requests: Vec::new(),
            signals: Vec::new(),
            failures: 0,
        }
    }

    fn record(&self, list: u64, command: Command) {
        let mut state = self.state.borrow_mut();
        let recording = state.recordings.entry(list).or_default();
        if !recording.open {
            state.report(format!("command recorded into closed command list {}", list));
            return;
        }

        // barriers that were not committed explicitly go in front of the next command
        if !recording.pending_barriers.is_empty() {
            let barriers = std::mem::take(&mut recording.pending_barriers);
            recording.commands.push(Command::Barriers(barriers));
        }
        recording.commands.push(command);
    }

    fn record_barrier(&self, list: u64, transition: Transition) {
        let mut state = self.state.borrow_mut();
        state
            .recordings
            .entry(list)
            .or_default()
            .pending_barriers
            .push(transition);
    }
}

unsafe impl Device for HeadlessDevice {
    type CommandList = HeadlessCommandList;

    fn graphics_api(&self) -> GraphicsApi {
        self.api
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<BufferHandle, GpuError> {
        let mut state = self.state.borrow_mut();
        if state.failing_buffers.contains(&desc.debug_name) {
            return Err(GpuError::BufferCreation {
                name: desc.debug_name,
                size: desc.byte_size,
            });
        }

        if desc.byte_size > ADDRESS_MASK {
            return Err(GpuError::BufferCreation {
                name: desc.debug_name,
                size: desc.byte_size,
            });
        }

        let id = state.allocate_id();
        trace!("Creating buffer {} \"{}\" ({} bytes)", id, desc.debug_name, desc.byte_size);
        state.buffers.insert(
            id,
            BufferStorage {
                desc: desc.clone(),
                data: vec![0u8; desc.byte_size as usize].into_boxed_slice(),
                mapped: false,
                state: desc.initial_state.unwrap_or_default(),
            },
        );

        Ok(BufferHandle::new(id, id << ADDRESS_SHIFT, desc))
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<TextureHandle, GpuError> {
        if desc.mip_levels == 0 || desc.array_size == 0 {
            return Err(GpuError::TextureCreation { name: desc.debug_name });
        }

        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        trace!("Creating texture {} \"{}\"", id, desc.debug_name);
        state.textures.insert(
            id,
            TextureStorage {
                desc: desc.clone(),
                subresources: HashMap::new(),
                state: desc.initial_state,
                permanent: false,
            },
        );

        Ok(TextureHandle::new(id, desc))
    }

    fn create_command_list(&self) -> HeadlessCommandList {
        let id = self.state.borrow_mut().allocate_id();
        HeadlessCommandList {
            id,
            device: self.clone(),
        }
    }

    fn map_buffer(&self, buffer: &BufferHandle, access: CpuAccessMode) -> Result<NonNull<u8>, GpuError> {
        let mut state = self.state.borrow_mut();
        let storage = state
            .buffers
            .get_mut(&buffer.id())
            .ok_or(GpuError::UnknownResource { id: buffer.id() })?;

        let mapping_error = |reason| GpuError::Mapping {
            name: storage.desc.debug_name.clone(),
            reason,
        };

        if access == CpuAccessMode::None || storage.desc.cpu_access != access {
            return Err(mapping_error("the buffer was not created for this kind of CPU access"));
        }

        if storage.mapped {
            return Err(mapping_error("the buffer is already mapped"));
        }

        let ptr = NonNull::new(storage.data.as_mut_ptr()).ok_or_else(|| mapping_error("null storage"))?;
        storage.mapped = true;
        Ok(ptr)
    }

    fn unmap_buffer(&self, buffer: &BufferHandle) {
        if let Some(storage) = self.state.borrow_mut().buffers.get_mut(&buffer.id()) {
            storage.mapped = false;
        }
    }

    fn execute_command_list(&self, command_list: &mut HeadlessCommandList) -> Result<(), GpuError> {
        let mut state = self.state.borrow_mut();
        let recording = state
            .recordings
            .remove(&command_list.id)
            .ok_or(GpuError::UnknownResource { id: command_list.id })?;

        if recording.open {
            state.report(format!("command list {} executed while open", command_list.id));
        }

        let count = recording.commands.len();
        for command in recording.commands {
            if let Err(message) = state.apply(command) {
                state.report(message);
            }
        }

        debug!("Executed command list {} ({} commands)", command_list.id, count);
        state.events.push(DeviceEvent::CommandListExecuted { commands: count });
        Ok(())
    }

    fn wait_for_idle(&self) {
        // execution is synchronous, there is never outstanding work
        self.state.borrow_mut().events.push(DeviceEvent::WaitForIdle);
    }
}

pub struct HeadlessCommandList {
    id: u64,
    device: HeadlessDevice,
}

impl HeadlessCommandList {
    fn transition(&mut self, resource: ResourceId, state: ResourceState, permanent: bool) {
        self.device.record_barrier(
            self.id,
            Transition {
                resource,
                state,
                permanent,
            },
        );
    }
}

impl CommandList for HeadlessCommandList {
    fn open(&mut self) {
        let mut state = self.device.state.borrow_mut();
        let recording = state.recordings.entry(self.id).or_default();
        recording.open = true;
    }

    fn close(&mut self) {
        let mut state = self.device.state.borrow_mut();
        let recording = state.recordings.entry(self.id).or_default();
        if !recording.pending_barriers.is_empty() {
            let barriers = std::mem::take(&mut recording.pending_barriers);
            recording.commands.push(Command::Barriers(barriers));
        }
        recording.open = false;
    }

    fn copy_buffer(&mut self, dst: &BufferHandle, dst_offset: u64, src: &BufferHandle, src_offset: u64, size: u64) {
        self.device.record(
            self.id,
            Command::CopyBuffer {
                dst: dst.id(),
                dst_offset,
                src: src.id(),
                src_offset,
                size,
            },
        );
    }

    fn write_buffer(&mut self, dst: &BufferHandle, data: &[u8], dst_offset: u64) {
        self.device.record(
            self.id,
            Command::WriteBuffer {
                dst: dst.id(),
                offset: dst_offset,
                data: data.to_vec(),
            },
        );
    }

    fn write_texture(&mut self, dst: &TextureHandle, array_layer: u32, mip_level: u32, data: &[u8], row_pitch: u32) {
        if row_pitch == 0 || data.len() % row_pitch as usize != 0 {
            warn!(
                "Texture write of {} bytes is not a multiple of the row pitch {}",
                data.len(),
                row_pitch
            );
        }

        self.device.record(
            self.id,
            Command::WriteTexture {
                texture: dst.id(),
                mip_level,
                array_layer,
                data: data.to_vec(),
            },
        );
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &BufferHandle,
        src_offset: u64,
        dst: &TextureHandle,
        region: TextureRegion,
    ) -> Result<(), GpuError> {
        self.device.record(
            self.id,
            Command::CopyBufferToTexture {
                src: src.id(),
                src_offset,
                texture: dst.id(),
                region,
            },
        );
        Ok(())
    }

    fn set_buffer_state(&mut self, buffer: &BufferHandle, state: ResourceState) {
        self.transition(ResourceId::Buffer(buffer.id()), state, false);
    }

    fn begin_tracking_texture_state(&mut self, texture: &TextureHandle, state: ResourceState) {
        self.device.record(
            self.id,
            Command::BeginTracking {
                texture: texture.id(),
                state,
            },
        );
    }

    fn set_texture_state(&mut self, texture: &TextureHandle, state: ResourceState) {
        self.transition(ResourceId::Texture(texture.id()), state, false);
    }

    fn set_permanent_texture_state(&mut self, texture: &TextureHandle, state: ResourceState) {
        self.transition(ResourceId::Texture(texture.id()), state, true);
    }

    fn commit_barriers(&mut self) {
        let mut state = self.device.state.borrow_mut();
        let recording = state.recordings.entry(self.id).or_default();
        if !recording.pending_barriers.is_empty() {
            let barriers = std::mem::take(&mut recording.pending_barriers);
            recording.commands.push(Command::Barriers(barriers));
        }
    }

    fn native_object(&self, object: NativeObjectType) -> Option<NativeHandle> {
        match (self.device.api, object) {
            (GraphicsApi::Vulkan, NativeObjectType::VkCommandBuffer)
            | (GraphicsApi::D3D12, NativeObjectType::D3D12GraphicsCommandList) => Some(NativeHandle(self.id)),
            _ => None,
        }
    }
}

/// Records GDeflate decompression into the command list behind a native handle, replayed with the
/// tile-stream codec when the list executes.
#[derive(Debug, Clone)]
pub struct HeadlessGpuDecompressor {
    device: HeadlessDevice,
}

impl GpuDecompressor for HeadlessGpuDecompressor {
    fn decompress_gdeflate(
        &self,
        command_list: NativeHandle,
        header: &[u8],
        uncompressed_size: u64,
        compressed_address: u64,
        decompressed_address: u64,
    ) -> Result<(), DecompressionError> {
        tilestream::payload_size(header)?;

        self.device.record(
            command_list.0,
            Command::GDeflate {
                header: header.to_vec(),
                uncompressed_size,
                compressed_address,
                decompressed_address,
            },
        );
        Ok(())
    }
}

/// A decompression queue that inflates every request on the CPU when it is submitted.
#[derive(Debug)]
pub struct HeadlessDecompressionQueue {
    device: HeadlessDevice,
    requests: Vec<DecompressionRequest>,
    signals: Vec<Arc<CompletionEvent>>,
    failures: usize,
}

impl HeadlessDecompressionQueue {
    fn process(&self, request: DecompressionRequest) -> Result<(), String> {
        let mut output = vec![0u8; request.uncompressed_size as usize];
        tilestream::decompress_into(&request.source, &mut output).map_err(|err| err.to_string())?;

        let mut state = self.device.state.borrow_mut();
        match request.destination {
            QueueDestination::Buffer { buffer, offset } => {
                state
                    .buffer_region(buffer.id(), offset, request.uncompressed_size)?
                    .copy_from_slice(&output);
            }
            QueueDestination::Texture { texture, subresource, .. } => {
                let (mip_level, array_layer) = texture.subresource_from_index(subresource);
                state.write_subresource(texture.id(), mip_level, array_layer, output)?;
            }
        }
        Ok(())
    }
}

impl DecompressionQueue for HeadlessDecompressionQueue {
    fn enqueue_request(&mut self, request: DecompressionRequest) {
        self.requests.push(request);
    }

    fn enqueue_signal(&mut self, event: Arc<CompletionEvent>) {
        self.signals.push(event);
    }

    fn submit(&mut self) {
        let requests = std::mem::take(&mut self.requests);
        self.device
            .state
            .borrow_mut()
            .events
            .push(DeviceEvent::QueueSubmitted { requests: requests.len() });

        for request in requests {
            if let Err(message) = self.process(request) {
                error!("Decompression queue request failed: {}", message);
                self.failures += 1;
            }
        }

        for event in self.signals.drain(..) {
            event.signal();
        }
    }

    fn failures(&self) -> usize {
        self.failures
    }
}
