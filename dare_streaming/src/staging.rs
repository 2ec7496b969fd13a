use std::fmt::{Debug, Formatter};
use std::ptr::NonNull;

use dagal::device::Device;
use dagal::resource::{BufferDesc, BufferUsage, MemoryLocation};
use dagal::traits::BufferResource;
use dagal::DagalError;

/// Host writable window into a mapped upload buffer
///
/// The range keeps its buffer alive, so the pointer stays valid for as long as the range exists.
pub struct MappedMemoryRange<D: Device> {
    pub buffer: D::Buffer,
    ptr: NonNull<u8>,
    pub offset: u64,
    pub size: u64,
}
unsafe impl<D: Device> Send for MappedMemoryRange<D> {}

impl<D: Device> Debug for MappedMemoryRange<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedMemoryRange")
            .field("ptr", &self.ptr)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

impl<D: Device> MappedMemoryRange<D> {
    pub fn new(buffer: D::Buffer, offset: u64, size: u64) -> Result<Self, DagalError> {
        let base = buffer.mapped_ptr().ok_or(DagalError::NoMappedPointer)?;
        match offset.checked_add(size) {
            Some(end) if end <= buffer.size() => {}
            _ => return Err(DagalError::OutOfBounds),
        }
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset as usize)) };
        Ok(Self {
            buffer,
            ptr,
            offset,
            size,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size as usize) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size as usize) }
    }
}

/// Bump allocator over one resource set's staging buffer
pub(crate) struct StagingBuffer<D: Device> {
    buffer: D::Buffer,
    allocated: u64,
}

impl<D: Device> StagingBuffer<D> {
    pub fn new(device: &D, size: u64, index: usize) -> Result<Self, DagalError> {
        let buffer = device.create_buffer(
            &BufferDesc::new(size, MemoryLocation::CpuOnly, BufferUsage::TRANSFER_SRC)
                .with_name(format!("Staging buffer {index}")),
        )?;
        Ok(Self {
            buffer,
            allocated: 0,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.buffer.size()
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Carves `size` bytes out at the next `alignment` boundary, if they fit
    pub fn try_suballocate(&mut self, size: u64, alignment: u64) -> Option<MappedMemoryRange<D>> {
        let offset = dagal::util::align(self.allocated, alignment);
        if offset.checked_add(size)? > self.capacity() {
            return None;
        }
        let range = MappedMemoryRange::new(self.buffer.clone(), offset, size).ok()?;
        self.allocated = offset + size;
        Some(range)
    }

    pub fn reset(&mut self) {
        self.allocated = 0;
    }
}

/// Dedicated host visible buffer sized exactly to `size`
pub(crate) fn allocate_upload_memory<D: Device>(
    device: &D,
    size: u64,
) -> Result<MappedMemoryRange<D>, DagalError> {
    let buffer = device.create_buffer(
        &BufferDesc::new(size, MemoryLocation::CpuOnly, BufferUsage::TRANSFER_SRC)
            .with_name("Temporary upload buffer"),
    )?;
    MappedMemoryRange::new(buffer, 0, size)
}
