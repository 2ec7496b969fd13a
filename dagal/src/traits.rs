use std::ptr::NonNull;

use crate::resource::{BufferDesc, TextureDesc};

/// A buffer handle handed out by a [`Device`](crate::device::Device)
///
/// Handles are cheap to clone and every clone refers to the same allocation. The allocation is
/// released once the last clone is dropped.
pub trait BufferResource: Clone + Send + Sync + 'static {
    fn desc(&self) -> &BufferDesc;

    fn size(&self) -> u64 {
        self.desc().size
    }

    /// Persistently mapped pointer to the start of the buffer
    ///
    /// Only host visible memory is mapped.
    fn mapped_ptr(&self) -> Option<NonNull<u8>>;
}

/// A texture handle handed out by a [`Device`](crate::device::Device)
pub trait TextureResource: Clone + Send + Sync + 'static {
    fn desc(&self) -> &TextureDesc;
}
