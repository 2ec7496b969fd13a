use dagal::DagalError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamingError {
    #[error(transparent)]
    Device(#[from] DagalError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Streaming worker stopped after a fatal error: {0}")]
    DeviceLost(String),

    #[error("Resource loader has been shut down")]
    ShutDown,

    #[error("Failed to spawn the streaming worker: {0}")]
    WorkerSpawn(String),

    #[error("Poisoned mutex")]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for StreamingError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StreamingError::Poisoned
    }
}

/// Reasons an image source could not be turned into texture data
#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] image::ImageError),

    #[error("Cube faces must be square and share size and pixel layout")]
    CubeFaceMismatch,

    #[error("{width}x{height} is neither a horizontal (4:3) nor a vertical (3:4) cube cross")]
    CubeCrossLayout { width: u32, height: u32 },

    #[error("Image is empty")]
    Empty,

    #[error("Image holds {actual} bytes of pixels, its dimensions need {expected}")]
    PixelSizeMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, StreamingError>;
