use std::sync::Arc;

use dagal::command::CmdBuffer;
use dagal::device::Device;
use derivative::Derivative;
use tracing::{debug, trace, warn};

use crate::config::StreamingConfig;
use crate::error::Result;
use crate::staging::{MappedMemoryRange, StagingBuffer, allocate_upload_memory};
use crate::stats::StreamingStats;
use crate::token::SyncToken;

/// One rotating transfer batch
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct ResourceSet<D: Device> {
    #[derivative(Debug = "ignore")]
    fence: D::Fence,
    #[derivative(Debug = "ignore")]
    cmd: D::CommandBuffer,
    #[derivative(Debug = "ignore")]
    staging: StagingBuffer<D>,
    /// Upload buffers that must outlive this set's submission
    #[derivative(Debug = "ignore")]
    temp_buffers: Vec<D::Buffer>,
    in_flight: bool,
    /// Highest token that is retired once this set's fence signals
    high_water: SyncToken,
}

/// Owns the resource sets and hands out exactly one of them for recording at a time
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct CopyEngine<D: Device> {
    #[derivative(Debug = "ignore")]
    device: Arc<D>,
    sets: Vec<ResourceSet<D>>,
    active: usize,
    stats: Arc<StreamingStats>,
}

impl<D: Device> CopyEngine<D> {
    pub fn new(device: Arc<D>, config: &StreamingConfig, stats: Arc<StreamingStats>) -> Result<Self> {
        let config = config.validated();
        let sets = (0..config.staging_buffer_count)
            .map(|index| -> Result<ResourceSet<D>> {
                Ok(ResourceSet {
                    fence: device.create_fence(false)?,
                    cmd: device.create_command_buffer()?,
                    staging: StagingBuffer::new(device.as_ref(), config.staging_buffer_size, index)?,
                    temp_buffers: Vec::new(),
                    in_flight: false,
                    high_water: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        // the first advance lands on set 0
        let active = sets.len() - 1;
        Ok(Self {
            device,
            sets,
            active,
            stats,
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Moves on to the next set, blocking until its previous submission retired. Returns the
    /// token that submission covered
    pub fn advance(&mut self) -> Result<SyncToken> {
        self.active = (self.active + 1) % self.sets.len();
        let set = &mut self.sets[self.active];
        if set.in_flight {
            trace!("Waiting on resource set {}", self.active);
            self.device.wait_for_fence(&set.fence)?;
            set.in_flight = false;
        }
        set.staging.reset();
        set.temp_buffers.clear();
        Ok(set.high_water)
    }

    /// Recording surface of the active set, beginning a recording if needed
    pub fn cmd(&mut self) -> Result<&mut D::CommandBuffer> {
        let set = &mut self.sets[self.active];
        if !set.cmd.is_recording() {
            set.cmd.begin()?;
        }
        Ok(&mut set.cmd)
    }

    /// Staging memory out of the active set's ring, or a dedicated buffer if the ring is full
    pub fn allocate_staging(&mut self, size: u64, alignment: u64) -> Result<MappedMemoryRange<D>> {
        let set = &mut self.sets[self.active];
        if let Some(range) = set.staging.try_suballocate(size, alignment) {
            StreamingStats::bump(&self.stats.ring_allocations);
            return Ok(range);
        }
        trace!(
            "Staging ring full ({} of {} bytes), allocating {size} dedicated bytes",
            set.staging.allocated(),
            set.staging.capacity()
        );
        let range = allocate_upload_memory(self.device.as_ref(), size)?;
        set.temp_buffers.push(range.buffer.clone());
        StreamingStats::bump(&self.stats.temp_allocations);
        Ok(range)
    }

    /// Keeps `buffer` alive until the active set retires
    pub fn retain(&mut self, buffer: D::Buffer) {
        self.sets[self.active].temp_buffers.push(buffer);
    }

    /// Submits the active set if anything was recorded. Returns whether a submission happened
    pub fn flush(&mut self) -> Result<bool> {
        let set = &mut self.sets[self.active];
        if !set.cmd.is_recording() {
            return Ok(false);
        }
        set.cmd.end()?;
        self.device.submit(&mut set.cmd, &set.fence)?;
        set.in_flight = true;
        StreamingStats::bump(&self.stats.batches_submitted);
        debug!("Submitted resource set {}", self.active);
        Ok(true)
    }

    pub fn set_high_water(&mut self, token: SyncToken) {
        self.sets[self.active].high_water = token;
    }

    /// Flushes, waits for the device to go idle and releases every set's temporary buffers
    pub fn shutdown(&mut self) -> Result<()> {
        self.flush()?;
        self.device.wait_idle()?;
        for set in self.sets.iter_mut() {
            set.in_flight = false;
            set.staging.reset();
            set.temp_buffers.clear();
        }
        Ok(())
    }
}

impl<D: Device> Drop for CopyEngine<D> {
    fn drop(&mut self) {
        for (index, set) in self.sets.iter_mut().enumerate() {
            if set.in_flight {
                if let Err(e) = self.device.wait_for_fence(&set.fence) {
                    warn!("Resource set {index} did not retire before release: {e}");
                }
            }
            if !set.temp_buffers.is_empty() {
                trace!(
                    "Releasing {} temporary buffers of resource set {index}",
                    set.temp_buffers.len()
                );
            }
        }
    }
}
