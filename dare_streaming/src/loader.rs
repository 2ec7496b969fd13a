use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use dagal::device::Device;
use dagal::resource::{BufferDesc, BufferUsage, ChannelType, MemoryLocation, TextureDesc, TextureFlags};
use dagal::sync::{BufferBarrier, ResourceState, TextureBarrier};
use dagal::traits::{BufferResource, TextureResource};
use derivative::Derivative;
use tracing::{error, info, trace, warn};

use crate::codec::{self, RowCopy, SubresourceLayout, TextureUpdateRange};
use crate::config::StreamingConfig;
use crate::copy_engine::CopyEngine;
use crate::error::{Result, StreamingError};
use crate::image::TextureSource;
use crate::request::{
    BufferUpdate, RequestQueue, TextureData, TextureLoad, TextureUpdate, UpdateRequest,
    UpdateSource,
};
use crate::staging::{self, MappedMemoryRange};
use crate::stats::{StatsSnapshot, StreamingStats};
use crate::token::{SyncToken, TokenStatus, TokenTracker};
use crate::worker::Streamer;

/// First usable state of a buffer derived from where it lives and how it is used
pub fn determine_buffer_start_state(desc: &BufferDesc) -> ResourceState {
    match desc.memory {
        MemoryLocation::GpuOnly => {
            if desc.usage.contains(BufferUsage::STORAGE_RW) {
                ResourceState::UNORDERED_ACCESS
            } else if desc.usage.intersects(BufferUsage::VERTEX | BufferUsage::UNIFORM) {
                ResourceState::VERTEX_AND_CONSTANT_BUFFER
            } else if desc.usage.contains(BufferUsage::INDEX) {
                ResourceState::INDEX_BUFFER
            } else if desc.usage.contains(BufferUsage::STORAGE) {
                ResourceState::SHADER_RESOURCE
            } else {
                ResourceState::COMMON
            }
        }
        MemoryLocation::CpuToGpu | MemoryLocation::CpuOnly => ResourceState::GENERIC_READ,
        MemoryLocation::GpuToCpu => ResourceState::COPY_DESTINATION,
    }
}

pub fn determine_texture_start_state(desc: &TextureDesc) -> ResourceState {
    if desc.flags.contains(TextureFlags::STORAGE) {
        ResourceState::UNORDERED_ACCESS
    } else {
        ResourceState::SHADER_RESOURCE
    }
}

/// Buffer creation with optional initial contents
#[derive(Debug, Clone)]
pub struct BufferLoadDesc<'a> {
    pub desc: BufferDesc,
    /// Uploaded to the start of the buffer
    pub data: Option<&'a [u8]>,
    /// Zero the buffer when no data is given
    pub force_reset: bool,
}

impl<'a> BufferLoadDesc<'a> {
    pub fn new(desc: BufferDesc) -> Self {
        Self {
            desc,
            data: None,
            force_reset: false,
        }
    }

    pub fn with_data(mut self, data: &'a [u8]) -> Self {
        self.data = Some(data);
        self
    }

    pub fn zeroed(mut self) -> Self {
        self.force_reset = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TextureLoadDesc {
    pub source: TextureSource,
    pub generate_mipmaps: bool,
    /// Treat 8 bit colour as sRGB encoded
    pub srgb: bool,
    pub name: Option<String>,
}

impl TextureLoadDesc {
    pub fn new(source: TextureSource) -> Self {
        Self {
            source,
            generate_mipmaps: false,
            srgb: false,
            name: None,
        }
    }

    pub fn with_mipmaps(mut self) -> Self {
        self.generate_mipmaps = true;
        self
    }

    pub fn with_srgb(mut self) -> Self {
        self.srgb = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct LoadedTexture<D: Device> {
    #[derivative(Debug = "ignore")]
    pub texture: D::Texture,
    placeholder: bool,
}

impl<D: Device> LoadedTexture<D> {
    pub(crate) fn new(texture: D::Texture, placeholder: bool) -> Self {
        Self {
            texture,
            placeholder,
        }
    }

    /// Whether the source failed to load and the built-in placeholder was uploaded instead
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

/// A texture whose handle is created by the streaming worker
///
/// The handle becomes available once the worker executed the load, at the latest once the
/// load's token completed.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
pub struct PendingTexture<D: Device> {
    #[derivative(Debug = "ignore")]
    slot: Arc<OnceLock<LoadedTexture<D>>>,
}

impl<D: Device> PendingTexture<D> {
    pub fn get(&self) -> Option<&LoadedTexture<D>> {
        self.slot.get()
    }

    pub fn texture(&self) -> Option<&D::Texture> {
        self.get().map(|loaded| &loaded.texture)
    }
}

/// Scoped write into a buffer, see [`ResourceLoader::begin_update_buffer`]
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct BufferUpdateDesc<D: Device> {
    #[derivative(Debug = "ignore")]
    buffer: D::Buffer,
    dst_offset: u64,
    range: MappedMemoryRange<D>,
    /// The range maps the destination itself
    direct: bool,
}

impl<D: Device> BufferUpdateDesc<D> {
    pub fn mapped(&mut self) -> &mut [u8] {
        self.range.as_mut_slice()
    }

    pub fn size(&self) -> u64 {
        self.range.size
    }
}

/// Scoped write into texture subresources, see [`ResourceLoader::begin_update_texture`]
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct TextureUpdateDesc<D: Device> {
    #[derivative(Debug = "ignore")]
    texture: D::Texture,
    range: MappedMemoryRange<D>,
    layouts: Vec<SubresourceLayout>,
    current_state: ResourceState,
    /// Blit every level past the base level once the copies are done
    pub generate_mips: bool,
}

impl<D: Device> TextureUpdateDesc<D> {
    pub fn layouts(&self) -> &[SubresourceLayout] {
        &self.layouts
    }

    pub fn subresource_layout(&self, mip_level: u32, array_layer: u32) -> Option<&SubresourceLayout> {
        self.layouts
            .iter()
            .find(|l| l.mip_level == mip_level && l.array_layer == array_layer)
    }

    /// Raw upload memory laid out as described by [`Self::layouts`]
    pub fn mapped(&mut self) -> &mut [u8] {
        self.range.as_mut_slice()
    }

    /// Writes tightly packed rows of one subresource at the pitch the device expects
    pub fn write_subresource(&mut self, mip_level: u32, array_layer: u32, data: &[u8]) -> Result<()> {
        let layout = *self
            .subresource_layout(mip_level, array_layer)
            .ok_or_else(|| StreamingError::InvalidRequest("subresource is not part of this update".into()))?;
        let slice_bytes = (layout.row_bytes * layout.num_rows) as usize;
        if data.len() != slice_bytes * layout.depth as usize {
            return Err(StreamingError::InvalidRequest(format!(
                "expected {} bytes for mip {mip_level} layer {array_layer}, got {}",
                slice_bytes * layout.depth as usize,
                data.len()
            )));
        }
        let mapped = self.range.as_mut_slice();
        for slice in 0..layout.depth as usize {
            let dst_offset = (layout.offset + slice as u64 * layout.slice_pitch) as usize;
            let copied = codec::copy_rows(
                &data[slice * slice_bytes..],
                &mut mapped[dst_offset..],
                RowCopy {
                    width: layout.row_bytes as u32,
                    rows: layout.num_rows as u32,
                    src_row_pitch: layout.row_bytes as usize,
                    dst_row_pitch: layout.row_pitch as usize,
                    src_channels: 1,
                    dst_channels: 1,
                    channel: ChannelType::U8,
                },
            );
            if !copied {
                return Err(StreamingError::InvalidRequest(
                    "subresource does not fit its upload memory".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Asynchronous resource streaming over a [`Device`]
///
/// Producers on any thread create and fill resources through the loader and get a
/// [`SyncToken`] back. One background worker records and submits the transfers, and the token
/// completes once the device retired them.
pub struct ResourceLoader<D: Device> {
    device: Arc<D>,
    config: StreamingConfig,
    queue: Arc<RequestQueue<D>>,
    tokens: Arc<TokenTracker>,
    stats: Arc<StreamingStats>,
    worker: Option<JoinHandle<()>>,
}

impl<D: Device> Drop for ResourceLoader<D> {
    fn drop(&mut self) {
        trace!("Stopping resource loader");
        self.queue.shutdown();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Streaming worker panicked during shutdown");
            }
        }
        trace!("Stopped resource loader");
    }
}

impl<D: Device> ResourceLoader<D> {
    pub fn new(device: Arc<D>, config: StreamingConfig) -> Result<Self> {
        let config = config.validated();
        let tokens = Arc::new(TokenTracker::new());
        let stats = Arc::new(StreamingStats::default());
        let queue = Arc::new(RequestQueue::new(tokens.clone()));
        let engine = CopyEngine::new(device.clone(), &config, stats.clone())?;
        let worker = Streamer::new(queue.clone(), tokens.clone(), stats.clone(), engine).spawn()?;
        info!(
            "Resource loader started with {} staging buffers of {} bytes",
            config.staging_buffer_count, config.staging_buffer_size
        );
        Ok(Self {
            device,
            config,
            queue,
            tokens,
            stats,
            worker: Some(worker),
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Creates a buffer and uploads its initial contents
    ///
    /// Host visible buffers are written immediately and return token `0`. Device local
    /// buffers are uploaded in staging sized chunks. A device local buffer without contents is
    /// transitioned into its start state instead.
    pub fn add_buffer(&self, load: BufferLoadDesc<'_>) -> Result<(D::Buffer, SyncToken)> {
        let BufferLoadDesc {
            mut desc,
            data,
            force_reset,
        } = load;
        if data.is_some_and(|data| data.len() as u64 > desc.size) {
            return Err(StreamingError::InvalidRequest(format!(
                "{} bytes of data do not fit a {} byte buffer",
                data.map_or(0, <[u8]>::len),
                desc.size
            )));
        }
        // empty contents take the same path as no contents
        let data = data.filter(|data| !data.is_empty());
        let update = data.is_some() || force_reset;
        if desc.memory == MemoryLocation::GpuOnly {
            if update {
                desc.start_state = ResourceState::COMMON;
            } else if desc.start_state.is_empty() {
                desc.start_state = determine_buffer_start_state(&desc);
                warn!(
                    "Buffer {:?} has no start state, using {:?}",
                    desc.name, desc.start_state
                );
            }
        }

        let buffer = self.device.create_buffer(&desc)?;
        if !update {
            if desc.memory == MemoryLocation::GpuOnly
                && desc.start_state != ResourceState::UNDEFINED
                && desc.start_state != ResourceState::COMMON
            {
                let token = self.queue.enqueue(UpdateRequest::BufferBarrier(BufferBarrier {
                    buffer: buffer.clone(),
                    old_state: ResourceState::UNDEFINED,
                    new_state: desc.start_state,
                }))?;
                return Ok((buffer, token));
            }
            return Ok((buffer, 0));
        }

        if buffer.mapped_ptr().is_some() {
            let mut range = MappedMemoryRange::<D>::new(buffer.clone(), 0, desc.size)?;
            let mapped = range.as_mut_slice();
            match data {
                Some(data) => mapped[..data.len()].copy_from_slice(data),
                None => mapped.fill(0),
            }
            return Ok((buffer, 0));
        }

        let len = data.map_or(desc.size, |data| data.len() as u64);
        let requests: Vec<UpdateRequest<D>> = codec::chunk_ranges(len, self.config.staging_buffer_size)
            .map(|(offset, size)| {
                let bytes: Box<[u8]> = match data {
                    Some(data) => data[offset as usize..(offset + size) as usize].into(),
                    None => vec![0u8; size as usize].into_boxed_slice(),
                };
                UpdateRequest::BufferUpdate(BufferUpdate {
                    buffer: buffer.clone(),
                    dst_offset: offset,
                    source: UpdateSource::Host(bytes),
                })
            })
            .collect();
        trace!("Uploading {len} bytes in {} chunks", requests.len());
        let token = self.queue.enqueue_batch(requests)?;
        Ok((buffer, token))
    }

    /// Creates an empty texture and transitions it into its start state
    pub fn add_texture(&self, mut desc: TextureDesc) -> Result<(D::Texture, SyncToken)> {
        if desc.start_state.is_empty() {
            desc.start_state = determine_texture_start_state(&desc);
            warn!(
                "Texture {:?} has no start state, using {:?}",
                desc.name, desc.start_state
            );
        }
        let texture = self.device.create_texture(&desc)?;
        let token = self.queue.enqueue(UpdateRequest::TextureBarrier(TextureBarrier::whole(
            texture.clone(),
            ResourceState::UNDEFINED,
            desc.start_state,
        )))?;
        Ok((texture, token))
    }

    /// Decodes and uploads a texture on the streaming worker
    ///
    /// Sources that fail to decode, or cube faces that do not match, are replaced by the
    /// built-in placeholder, see [`LoadedTexture::is_placeholder`].
    pub fn load_texture(&self, desc: TextureLoadDesc) -> Result<(PendingTexture<D>, SyncToken)> {
        let slot = Arc::new(OnceLock::new());
        let token = self.queue.enqueue(UpdateRequest::TextureLoad(TextureLoad {
            desc,
            slot: slot.clone(),
        }))?;
        Ok((PendingTexture { slot }, token))
    }

    /// Maps `size` bytes for writing into `buffer` at `dst_offset`
    ///
    /// Host visible buffers are mapped directly, everything else gets dedicated upload memory
    /// that is copied over once the update ends.
    pub fn begin_update_buffer(
        &self,
        buffer: &D::Buffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<BufferUpdateDesc<D>> {
        let fits = dst_offset
            .checked_add(size)
            .is_some_and(|end| end <= buffer.size());
        if size == 0 || !fits {
            return Err(StreamingError::InvalidRequest(format!(
                "update of {size} bytes at {dst_offset} does not fit a {} byte buffer",
                buffer.size()
            )));
        }
        let (range, direct) = if buffer.mapped_ptr().is_some() {
            (MappedMemoryRange::new(buffer.clone(), dst_offset, size)?, true)
        } else {
            (staging::allocate_upload_memory(self.device.as_ref(), size)?, false)
        };
        Ok(BufferUpdateDesc {
            buffer: buffer.clone(),
            dst_offset,
            range,
            direct,
        })
    }

    /// Hands the written range back. Direct writes are complete already and return token `0`
    pub fn end_update_buffer(&self, update: BufferUpdateDesc<D>) -> Result<SyncToken> {
        if update.direct {
            return Ok(0);
        }
        self.queue.enqueue(UpdateRequest::BufferUpdate(BufferUpdate {
            buffer: update.buffer,
            dst_offset: update.dst_offset,
            source: UpdateSource::Mapped(update.range),
        }))
    }

    /// Maps upload memory for the subresources in `range`
    ///
    /// `current_state` is the state the texture is in when the update executes.
    pub fn begin_update_texture(
        &self,
        texture: &D::Texture,
        range: TextureUpdateRange,
        current_state: ResourceState,
    ) -> Result<TextureUpdateDesc<D>> {
        let limits = self.device.limits();
        let (layouts, size) = codec::layout_texture_update(texture.desc(), &range, &limits)
            .ok_or_else(|| {
                StreamingError::InvalidRequest(format!(
                    "{range:?} cannot be laid out for {:?}",
                    texture.desc()
                ))
            })?;
        let memory = staging::allocate_upload_memory(self.device.as_ref(), size)?;
        Ok(TextureUpdateDesc {
            texture: texture.clone(),
            range: memory,
            layouts,
            current_state,
            generate_mips: false,
        })
    }

    pub fn end_update_texture(&self, update: TextureUpdateDesc<D>) -> Result<SyncToken> {
        self.queue.enqueue(UpdateRequest::TextureUpdate(TextureUpdate {
            texture: update.texture,
            data: TextureData::Staged {
                range: update.range,
                layouts: update.layouts,
            },
            current_state: update.current_state,
            generate_mips: update.generate_mips,
        }))
    }

    /// Blocks until `token` retired on the device
    pub fn wait_for_token(&self, token: SyncToken) -> Result<()> {
        self.tokens.wait(token)
    }

    pub async fn wait_for_token_async(&self, token: SyncToken) -> Result<()> {
        self.tokens.wait_async(token).await
    }

    pub fn is_token_completed(&self, token: SyncToken) -> bool {
        self.tokens.is_completed(token)
    }

    /// Blocks until every token issued so far retired
    pub fn wait_for_all_resource_loads(&self) -> Result<()> {
        self.tokens.wait_all()
    }

    pub fn all_resource_loads_completed(&self) -> bool {
        self.tokens.all_completed()
    }

    pub fn last_token_completed(&self) -> SyncToken {
        self.tokens.last_completed()
    }

    pub fn last_token_issued(&self) -> SyncToken {
        self.tokens.issued()
    }

    pub fn token_status(&self, token: SyncToken) -> Result<TokenStatus> {
        self.tokens.status(token)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
