//! CPU emulated [`Device`](crate::device::Device).
//!
//! Every allocation lives in host memory and submissions execute in order on a dedicated
//! timeline thread, which makes the device usable from tests. The timeline can be paused,
//! resumed and lost to exercise fence and failure handling.
mod command;
mod device;
mod resource;
mod timeline;

pub use command::HeadlessCommandBuffer;
pub use device::{HeadlessConfig, HeadlessDevice};
pub use resource::{HeadlessBuffer, HeadlessFence, HeadlessTexture};
