use std::sync::PoisonError;

/// Possible errors
use thiserror::Error;

#[derive(Debug, Error, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DagalError {
    #[error("Device has been lost")]
    DeviceLost,

    #[error("Poisoned mutex")]
    PoisonError,

    #[error("Resource does not have a mapped pointer. You're most likely using GPU only")]
    NoMappedPointer,

    #[error("Allocation error")]
    AllocationError,

    #[error("Format is undefined or does not support the requested operation")]
    UnsupportedFormat,

    #[error("Region lies outside of the resource")]
    OutOfBounds,

    #[error("Command buffer is not in the recording state")]
    NotRecording,

    #[error("Command buffer is still recording")]
    StillRecording,
}

impl<T> From<PoisonError<T>> for DagalError {
    fn from(_: PoisonError<T>) -> Self {
        DagalError::PoisonError
    }
}
