/// Command recording surface of a [`Device`].
///
/// A command buffer is reused across submissions: [`CmdBuffer::begin`] starts a new recording,
/// [`CmdBuffer::end`] closes it and [`Device::submit`] hands the recorded work to the device
/// timeline, after which the buffer may begin again.
use crate::device::Device;
use crate::sync::{BufferBarrier, TextureBarrier};
use crate::Result;

/// Region for a buffer to buffer copy
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Copies a whole subresource out of a buffer
///
/// Rows are `row_pitch` bytes apart and depth slices `slice_pitch` bytes apart, starting at
/// `buffer_offset`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferTextureCopy {
    pub buffer_offset: u64,
    pub row_pitch: u64,
    pub slice_pitch: u64,
    pub mip_level: u32,
    pub array_layer: u32,
}

/// Linear downsample of one mip into another in the same layer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MipBlit {
    pub src_mip: u32,
    pub dst_mip: u32,
    pub array_layer: u32,
}

pub trait CmdBuffer<D: Device>: Send + 'static {
    fn begin(&mut self) -> Result<()>;

    fn end(&mut self) -> Result<()>;

    fn is_recording(&self) -> bool;

    fn copy_buffer(&mut self, src: &D::Buffer, dst: &D::Buffer, region: BufferCopy) -> Result<()>;

    fn copy_buffer_to_texture(
        &mut self,
        src: &D::Buffer,
        dst: &D::Texture,
        region: BufferTextureCopy,
    ) -> Result<()>;

    fn blit_mip(&mut self, texture: &D::Texture, blit: MipBlit) -> Result<()>;

    fn buffer_barriers(&mut self, barriers: &[BufferBarrier<D::Buffer>]) -> Result<()>;

    fn texture_barriers(&mut self, barriers: &[TextureBarrier<D::Texture>]) -> Result<()>;
}
