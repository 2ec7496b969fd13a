use crate::command::CmdBuffer;
use crate::resource::{BufferDesc, TextureDesc};
use crate::sync::FenceStatus;
use crate::traits::{BufferResource, TextureResource};
use crate::Result;

/// Placement rules for texture data inside upload buffers
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Alignment of every subresource's first byte
    pub upload_texture_alignment: u64,
    /// Alignment of the distance between two rows
    pub upload_texture_row_alignment: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            upload_texture_alignment: 16,
            upload_texture_row_alignment: 256,
        }
    }
}

/// Capabilities the streaming layer needs out of a graphics backend
pub trait Device: Send + Sync + Sized + 'static {
    type Buffer: BufferResource;
    type Texture: TextureResource;
    type Fence: Send + Sync + 'static;
    type CommandBuffer: CmdBuffer<Self>;

    fn limits(&self) -> DeviceLimits;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Buffer>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<Self::Texture>;

    fn create_fence(&self, signaled: bool) -> Result<Self::Fence>;

    fn create_command_buffer(&self) -> Result<Self::CommandBuffer>;

    /// Submits everything recorded into `cmd`. `fence` is unsignaled on submission and signaled
    /// once the work retires
    fn submit(&self, cmd: &mut Self::CommandBuffer, fence: &Self::Fence) -> Result<()>;

    fn fence_status(&self, fence: &Self::Fence) -> Result<FenceStatus>;

    fn wait_for_fence(&self, fence: &Self::Fence) -> Result<()>;

    /// Blocks until every submission has retired
    fn wait_idle(&self) -> Result<()>;
}
