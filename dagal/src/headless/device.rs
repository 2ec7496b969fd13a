use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use derivative::Derivative;
use tracing::{error, trace};

use crate::device::{Device, DeviceLimits};
use crate::headless::command::HeadlessCommandBuffer;
use crate::headless::resource::{lock, Counters};
use crate::headless::timeline::{self, Submission, TimelineState};
use crate::headless::{HeadlessBuffer, HeadlessFence, HeadlessTexture};
use crate::resource::{BufferDesc, TextureDesc};
use crate::sync::{FenceStatus, ResourceState};
use crate::traits::TextureResource;
use crate::{DagalError, Result};

#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub limits: DeviceLimits,
    /// Time every submission spends on the timeline before it executes
    pub latency: Duration,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            limits: DeviceLimits::default(),
            latency: Duration::ZERO,
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct HeadlessDevice {
    config: HeadlessConfig,
    state: Arc<TimelineState>,
    counters: Arc<Counters>,
    #[derivative(Debug = "ignore")]
    sender: Option<crossbeam_channel::Sender<Submission>>,
    #[derivative(Debug = "ignore")]
    thread: Option<JoinHandle<()>>,
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        trace!("Stopping headless timeline");
        self.state.resume();
        drop(self.sender.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Headless timeline thread panicked");
            }
        }
    }
}

impl HeadlessDevice {
    pub fn new(config: HeadlessConfig) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let state = Arc::new(TimelineState::default());
        let thread = timeline::spawn(state.clone(), receiver, config.latency).map_err(|e| {
            error!("Failed to spawn headless timeline: {e}");
            DagalError::DeviceLost
        })?;
        Ok(Self {
            config,
            state,
            counters: Arc::new(Counters::default()),
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Holds every submission that has not started executing until [`Self::resume`]
    pub fn pause(&self) {
        self.state.pause();
    }

    pub fn resume(&self) {
        self.state.resume();
    }

    /// Simulates device loss. Pending submissions never signal and every call afterwards fails
    pub fn lose_device(&self) {
        self.state.lose();
    }

    pub fn is_lost(&self) -> bool {
        self.state.is_lost()
    }

    /// Current contents of a buffer
    pub fn read_buffer(&self, buffer: &HeadlessBuffer) -> Vec<u8> {
        buffer.read(0, buffer.len()).unwrap_or_default()
    }

    /// Tightly packed contents of one subresource
    pub fn read_texture(
        &self,
        texture: &HeadlessTexture,
        mip_level: u32,
        array_layer: u32,
    ) -> Option<Vec<u8>> {
        let desc = texture.desc();
        if mip_level >= desc.mip_levels || array_layer >= desc.array_layers {
            return None;
        }
        let subresources = lock(&texture.0.subresources);
        subresources
            .get(desc.subresource_index(mip_level, array_layer))
            .cloned()
    }

    pub fn buffer_state(&self, buffer: &HeadlessBuffer) -> ResourceState {
        *lock(&buffer.0.state)
    }

    pub fn texture_state(
        &self,
        texture: &HeadlessTexture,
        mip_level: u32,
        array_layer: u32,
    ) -> Option<ResourceState> {
        let desc = texture.desc();
        if mip_level >= desc.mip_levels || array_layer >= desc.array_layers {
            return None;
        }
        Some(lock(&texture.0.states)[desc.subresource_index(mip_level, array_layer)])
    }

    pub fn live_buffers(&self) -> usize {
        self.counters.live_buffers.load(Ordering::Acquire)
    }

    pub fn live_textures(&self) -> usize {
        self.counters.live_textures.load(Ordering::Acquire)
    }

    pub fn submission_count(&self) -> u64 {
        self.state.submitted()
    }

    /// Commands that executed against resources in the wrong state
    pub fn validation_errors(&self) -> u64 {
        self.state.validation_errors()
    }

    fn check_lost(&self) -> Result<()> {
        if self.state.is_lost() {
            Err(DagalError::DeviceLost)
        } else {
            Ok(())
        }
    }
}

impl Device for HeadlessDevice {
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type Fence = HeadlessFence;
    type CommandBuffer = HeadlessCommandBuffer;

    fn limits(&self) -> DeviceLimits {
        self.config.limits
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Buffer> {
        self.check_lost()?;
        HeadlessBuffer::new(desc.clone(), self.counters.clone())
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Self::Texture> {
        self.check_lost()?;
        HeadlessTexture::new(desc.clone(), self.counters.clone())
    }

    fn create_fence(&self, signaled: bool) -> Result<Self::Fence> {
        self.check_lost()?;
        Ok(HeadlessFence::new(signaled))
    }

    fn create_command_buffer(&self) -> Result<Self::CommandBuffer> {
        self.check_lost()?;
        Ok(HeadlessCommandBuffer::default())
    }

    fn submit(&self, cmd: &mut Self::CommandBuffer, fence: &Self::Fence) -> Result<()> {
        self.check_lost()?;
        let commands = cmd.take_commands()?;
        let sender = self.sender.as_ref().ok_or(DagalError::DeviceLost)?;
        fence.reset();
        self.state.mark_submitted();
        sender
            .send(Submission {
                commands,
                fence: fence.clone(),
            })
            .map_err(|_| DagalError::DeviceLost)
    }

    fn fence_status(&self, fence: &Self::Fence) -> Result<FenceStatus> {
        if fence.is_signaled() {
            return Ok(FenceStatus::Complete);
        }
        self.check_lost()?;
        Ok(FenceStatus::Incomplete)
    }

    fn wait_for_fence(&self, fence: &Self::Fence) -> Result<()> {
        fence.wait(self.state.lost())
    }

    fn wait_idle(&self) -> Result<()> {
        self.state.wait_idle()
    }
}
