#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Memory useful in device accessible memory
    #[default]
    GpuOnly,
    /// Memory useful for uploading data to the device
    CpuToGpu,
    /// Memory useful for read back of data
    GpuToCpu,
    /// Memory that is restricted to the host
    CpuOnly,
}

impl MemoryLocation {
    /// Whether the host can write through a persistent mapping
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, MemoryLocation::GpuOnly)
    }
}
