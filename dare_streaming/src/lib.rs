//! Asynchronous resource streaming.
//!
//! Producers hand buffer and texture uploads to a [`ResourceLoader`] and receive a
//! [`SyncToken`]. A single worker thread stages the data through a ring of host visible
//! buffers, records copies into rotating command buffers and publishes a completion watermark
//! once the device retired them.
pub mod codec;
pub mod config;
pub(crate) mod copy_engine;
pub mod error;
pub mod image;
pub mod loader;
pub(crate) mod request;
pub mod staging;
pub mod stats;
pub mod token;
pub(crate) mod upload;
pub(crate) mod worker;

#[cfg(test)]
mod tests;

pub use config::StreamingConfig;
pub use error::{ImageLoadError, Result, StreamingError};
pub use loader::{
    BufferLoadDesc, BufferUpdateDesc, LoadedTexture, PendingTexture, ResourceLoader,
    TextureLoadDesc, TextureUpdateDesc,
};
pub use stats::StatsSnapshot;
pub use token::{SyncToken, TokenStatus};

pub mod prelude {
    pub use crate::codec::TextureUpdateRange;
    pub use crate::image::{DecodedImage, TextureSource};
    pub use crate::{
        BufferLoadDesc, LoadedTexture, PendingTexture, ResourceLoader, StreamingConfig,
        StreamingError, SyncToken, TextureLoadDesc, TokenStatus,
    };
}
