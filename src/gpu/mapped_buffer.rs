use std::marker::PhantomData;
use std::ptr::NonNull;

use bytemuck::Pod;
use log::trace;

use crate::gpu::{BufferHandle, CpuAccessMode, Device, GpuError};

/// Scoped CPU access to a buffer. The mapping is released when a different buffer gets mapped,
/// on [`MappedBuffer::unmap`] and when the guard is dropped, whichever comes first.
pub struct MappedBuffer<'d, D: Device, T: Pod = u8> {
    device: &'d D,
    mapping: Option<(BufferHandle, NonNull<u8>)>,
    _marker: PhantomData<T>,
}

impl<'d, D: Device, T: Pod> MappedBuffer<'d, D, T> {
    pub fn new(device: &'d D) -> Self {
        Self {
            device,
            mapping: None,
            _marker: PhantomData,
        }
    }

    pub fn map(&mut self, buffer: &BufferHandle, access: CpuAccessMode) -> Result<(), GpuError> {
        self.unmap();

        let ptr = self.device.map_buffer(buffer, access)?;
        if ptr.as_ptr().align_offset(align_of::<T>()) != 0 {
            self.device.unmap_buffer(buffer);
            return Err(GpuError::Mapping {
                name: buffer.desc().debug_name.clone(),
                reason: "mapped pointer is not aligned for the element type",
            });
        }

        trace!("Mapped buffer {}", buffer.desc().debug_name);
        self.mapping = Some((buffer.clone(), ptr));
        Ok(())
    }

    pub fn unmap(&mut self) {
        if let Some((buffer, _)) = self.mapping.take() {
            self.device.unmap_buffer(&buffer);
            trace!("Unmapped buffer {}", buffer.desc().debug_name);
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn buffer(&self) -> Option<&BufferHandle> {
        self.mapping.as_ref().map(|(buffer, _)| buffer)
    }

    /// The whole mapped buffer as elements of `T`; trailing bytes that don't fill a `T` are not exposed.
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        let (buffer, ptr) = self.mapping.as_ref()?;
        let len = buffer.desc().byte_size as usize / size_of::<T>().max(1);

        // SAFETY: the device guarantees the pointer is valid for byte_size bytes until unmap, alignment was
        // checked in map, T is Pod and the slice borrows self mutably, so it cannot outlive the mapping.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<T>(), len) })
    }
}

impl<D: Device, T: Pod> Drop for MappedBuffer<'_, D, T> {
    fn drop(&mut self) {
        self.unmap();
    }
}
