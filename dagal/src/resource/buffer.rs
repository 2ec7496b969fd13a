use bitflags::bitflags;

use crate::resource::MemoryLocation;
use crate::sync::ResourceState;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const VERTEX = 1 << 3;
        const INDEX = 1 << 4;
        /// Read only shader storage
        const STORAGE = 1 << 5;
        /// Read/write shader storage
        const STORAGE_RW = 1 << 6;
        const INDIRECT = 1 << 7;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: Option<String>,
    pub size: u64,
    pub memory: MemoryLocation,
    pub usage: BufferUsage,
    /// First usable state of the buffer. Empty lets the loader pick one from [`Self::usage`]
    pub start_state: ResourceState,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            name: None,
            size: 0,
            memory: MemoryLocation::GpuOnly,
            usage: BufferUsage::empty(),
            start_state: ResourceState::UNDEFINED,
        }
    }
}

impl BufferDesc {
    pub fn new(size: u64, memory: MemoryLocation, usage: BufferUsage) -> Self {
        Self {
            size,
            memory,
            usage,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_start_state(mut self, state: ResourceState) -> Self {
        self.start_state = state;
        self
    }
}
