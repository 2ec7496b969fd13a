/// Handles synchronization
pub mod fence;
pub mod memory_barrier;
pub mod state;

pub use fence::FenceStatus;
pub use memory_barrier::{BufferBarrier, TextureBarrier};
pub use state::ResourceState;
