pub use crate::command::{BufferCopy, BufferTextureCopy, CmdBuffer, MipBlit};
pub use crate::device::{Device, DeviceLimits};
pub use crate::resource::{
    BufferDesc, BufferUsage, ChannelType, ImageFormat, MemoryLocation, TextureDesc, TextureFlags,
};
pub use crate::sync::{BufferBarrier, FenceStatus, ResourceState, TextureBarrier};
pub use crate::traits::{BufferResource, TextureResource};
pub use crate::DagalError;
