pub mod buffer;
pub mod format;
pub mod memory_location;
pub mod texture;

pub use buffer::{BufferDesc, BufferUsage};
pub use format::{ChannelType, ImageFormat, SurfaceInfo};
pub use memory_location::MemoryLocation;
pub use texture::{TextureDesc, TextureFlags};
