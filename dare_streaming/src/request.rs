use std::sync::{Arc, Condvar, Mutex, OnceLock};

use dagal::device::Device;
use dagal::sync::{BufferBarrier, ResourceState, TextureBarrier};
use derivative::Derivative;
use tracing::trace;

use crate::codec::SubresourceLayout;
use crate::error::{Result, StreamingError};
use crate::image::DecodedImage;
use crate::loader::{LoadedTexture, TextureLoadDesc};
use crate::staging::MappedMemoryRange;
use crate::token::{SyncToken, TokenTracker};

/// Where the bytes of a buffer update come from
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum UpdateSource<D: Device> {
    /// Copied into staging memory by the worker
    Host(#[derivative(Debug = "ignore")] Box<[u8]>),
    /// Already written by the producer
    Mapped(MappedMemoryRange<D>),
}

impl<D: Device> UpdateSource<D> {
    pub fn len(&self) -> u64 {
        match self {
            UpdateSource::Host(bytes) => bytes.len() as u64,
            UpdateSource::Mapped(range) => range.size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct BufferUpdate<D: Device> {
    #[derivative(Debug = "ignore")]
    pub buffer: D::Buffer,
    pub dst_offset: u64,
    pub source: UpdateSource<D>,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum TextureData<D: Device> {
    /// Base level of every array layer. Rows are re-pitched and expanded while staging
    Images(Vec<DecodedImage>),
    /// Subresources the producer already laid out in upload memory
    Staged {
        range: MappedMemoryRange<D>,
        layouts: Vec<SubresourceLayout>,
    },
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct TextureUpdate<D: Device> {
    #[derivative(Debug = "ignore")]
    pub texture: D::Texture,
    pub data: TextureData<D>,
    /// State the touched subresources are in before the update
    pub current_state: ResourceState,
    /// Fill every level past the base level by successive blits
    pub generate_mips: bool,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct TextureLoad<D: Device> {
    pub desc: TextureLoadDesc,
    #[derivative(Debug = "ignore")]
    pub slot: Arc<OnceLock<LoadedTexture<D>>>,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum UpdateRequest<D: Device> {
    BufferUpdate(BufferUpdate<D>),
    TextureUpdate(TextureUpdate<D>),
    BufferBarrier(#[derivative(Debug = "ignore")] BufferBarrier<D::Buffer>),
    TextureBarrier(#[derivative(Debug = "ignore")] TextureBarrier<D::Texture>),
    TextureLoad(TextureLoad<D>),
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct QueuedRequest<D: Device> {
    pub request: UpdateRequest<D>,
    /// Token satisfied once this request retires
    pub wait_index: SyncToken,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
struct QueueState<D: Device> {
    requests: Vec<QueuedRequest<D>>,
    running: bool,
}

/// Multi producer, single consumer hand-off to the streaming worker
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct RequestQueue<D: Device> {
    state: Mutex<QueueState<D>>,
    condvar: Condvar,
    tokens: Arc<TokenTracker>,
}

impl<D: Device> RequestQueue<D> {
    pub fn new(tokens: Arc<TokenTracker>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                requests: Vec::new(),
                running: true,
            }),
            condvar: Condvar::new(),
            tokens,
        }
    }

    pub fn enqueue(&self, request: UpdateRequest<D>) -> Result<SyncToken> {
        self.enqueue_batch(std::iter::once(request))
    }

    /// Enqueues every request under a single lock so they land in the same drain. Returns the
    /// token of the last request
    pub fn enqueue_batch(
        &self,
        requests: impl IntoIterator<Item = UpdateRequest<D>>,
    ) -> Result<SyncToken> {
        let mut state = self.state.lock()?;
        if let Some(reason) = self.tokens.failure() {
            return Err(StreamingError::DeviceLost(reason));
        }
        if !state.running {
            return Err(StreamingError::ShutDown);
        }
        let mut token = self.tokens.issued();
        for request in requests {
            token = self.tokens.issue();
            trace!("Queued request {token}");
            state.requests.push(QueuedRequest {
                request,
                wait_index: token,
            });
        }
        drop(state);
        self.condvar.notify_one();
        Ok(token)
    }

    /// Takes every queued request, leaving an empty queue behind
    pub fn drain(&self) -> Result<Vec<QueuedRequest<D>>> {
        Ok(std::mem::take(&mut self.state.lock()?.requests))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.state.lock()?.requests.is_empty())
    }

    /// Sleeps while the queue is empty, the queue is running and `idle` holds. `idle` is
    /// evaluated under the queue lock. Returns whether the queue is still running
    pub fn wait_for_work(&self, idle: impl Fn() -> bool) -> Result<bool> {
        let mut state = self.state.lock()?;
        while state.requests.is_empty() && state.running && idle() {
            state = self.condvar.wait(state)?;
        }
        Ok(state.running)
    }

    /// Stops accepting requests and wakes the worker. Already queued requests stay queued
    pub fn shutdown(&self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.running = false;
        drop(state);
        self.condvar.notify_all();
    }
}
