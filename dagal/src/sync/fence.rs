#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    /// Every submission signalling the fence has retired
    Complete,
    /// A submission signalling the fence is still pending
    Incomplete,
}
