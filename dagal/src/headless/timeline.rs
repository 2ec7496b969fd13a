use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{trace, warn};

use crate::headless::command::Command;
use crate::headless::resource::lock;
use crate::headless::{HeadlessBuffer, HeadlessFence, HeadlessTexture};
use crate::resource::{ChannelType, ImageFormat};
use crate::sync::{BufferBarrier, ResourceState, TextureBarrier};
use crate::traits::TextureResource;
use crate::DagalError;

pub(crate) struct Submission {
    pub commands: Vec<Command>,
    pub fence: HeadlessFence,
}

/// State shared between the device handle and its timeline thread
#[derive(Debug, Default)]
pub(crate) struct TimelineState {
    paused: Mutex<bool>,
    gate: Condvar,
    lost: AtomicBool,
    submitted: AtomicU64,
    retired: Mutex<u64>,
    retired_condvar: Condvar,
    validation_errors: AtomicU64,
}

impl TimelineState {
    pub fn pause(&self) {
        *lock(&self.paused) = true;
    }

    pub fn resume(&self) {
        *lock(&self.paused) = false;
        self.gate.notify_all();
    }

    pub fn lose(&self) {
        self.lost.store(true, Ordering::Release);
        let _paused = lock(&self.paused);
        self.gate.notify_all();
        self.retired_condvar.notify_all();
    }

    pub fn lost(&self) -> &AtomicBool {
        &self.lost
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub fn mark_submitted(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn validation_errors(&self) -> u64 {
        self.validation_errors.load(Ordering::Acquire)
    }

    fn validation_error(&self, message: &str) {
        warn!("Headless validation: {message}");
        self.validation_errors.fetch_add(1, Ordering::AcqRel);
    }

    /// Blocks while paused. Returns `false` once the device is lost
    fn pass_gate(&self) -> bool {
        let mut paused = lock(&self.paused);
        while *paused && !self.is_lost() {
            paused = self
                .gate
                .wait(paused)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        !self.is_lost()
    }

    fn retire(&self) {
        *lock(&self.retired) += 1;
        self.retired_condvar.notify_all();
    }

    pub fn wait_idle(&self) -> Result<(), DagalError> {
        let mut retired = self.retired.lock()?;
        while *retired < self.submitted() {
            if self.is_lost() {
                return Err(DagalError::DeviceLost);
            }
            retired = self
                .retired_condvar
                .wait_timeout(retired, Duration::from_millis(5))?
                .0;
        }
        if self.is_lost() {
            return Err(DagalError::DeviceLost);
        }
        Ok(())
    }
}

pub(crate) fn spawn(
    state: Arc<TimelineState>,
    receiver: crossbeam_channel::Receiver<Submission>,
    latency: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("dagal-headless-queue".to_string())
        .spawn(move || {
            trace!("Headless timeline started");
            for submission in receiver.iter() {
                if !state.pass_gate() {
                    trace!("Dropping submission of a lost device");
                    state.retire();
                    continue;
                }
                if !latency.is_zero() {
                    std::thread::sleep(latency);
                }
                trace!("Executing {} commands", submission.commands.len());
                for command in submission.commands {
                    execute(&state, command);
                }
                submission.fence.signal();
                state.retire();
            }
            trace!("Headless timeline stopped");
        })
}

fn execute(state: &TimelineState, command: Command) {
    match command {
        Command::CopyBuffer { src, dst, region } => unsafe {
            std::ptr::copy(
                src.as_ptr().add(region.src_offset as usize),
                dst.as_ptr().add(region.dst_offset as usize),
                region.size as usize,
            );
        },
        Command::CopyBufferToTexture { src, dst, region } => {
            let desc = dst.desc();
            let index = desc.subresource_index(region.mip_level, region.array_layer);
            if lock(&dst.0.states)[index] != ResourceState::COPY_DESTINATION {
                state.validation_error("copy into a texture not in COPY_DESTINATION");
            }
            let (width, height, depth) = desc.mip_extent(region.mip_level);
            let Some(info) = desc.format.surface_info(width, height) else {
                return;
            };
            let mut subresources = lock(&dst.0.subresources);
            let target = &mut subresources[index];
            for slice in 0..depth as u64 {
                for row in 0..info.num_rows {
                    let src_offset =
                        region.buffer_offset + slice * region.slice_pitch + row * region.row_pitch;
                    let dst_offset = (slice * info.num_bytes + row * info.row_bytes) as usize;
                    let bytes = unsafe {
                        std::slice::from_raw_parts(
                            src.as_ptr().add(src_offset as usize),
                            info.row_bytes as usize,
                        )
                    };
                    target[dst_offset..dst_offset + info.row_bytes as usize].copy_from_slice(bytes);
                }
            }
        }
        Command::BlitMip { texture, blit } => {
            let desc = texture.desc();
            let src_index = desc.subresource_index(blit.src_mip, blit.array_layer);
            let dst_index = desc.subresource_index(blit.dst_mip, blit.array_layer);
            {
                let states = lock(&texture.0.states);
                if states[src_index] != ResourceState::COPY_SOURCE
                    || states[dst_index] != ResourceState::COPY_DESTINATION
                {
                    state.validation_error("blit without COPY_SOURCE -> COPY_DESTINATION states");
                }
            }
            let (src_width, src_height, _) = desc.mip_extent(blit.src_mip);
            let (dst_width, dst_height, _) = desc.mip_extent(blit.dst_mip);
            let mut subresources = lock(&texture.0.subresources);
            let source = subresources[src_index].clone();
            downsample(
                desc.format,
                &source,
                (src_width, src_height),
                &mut subresources[dst_index],
                (dst_width, dst_height),
            );
        }
        Command::BufferBarriers(barriers) => {
            for barrier in barriers {
                apply_buffer_barrier(state, barrier);
            }
        }
        Command::TextureBarriers(barriers) => {
            for barrier in barriers {
                apply_texture_barrier(state, barrier);
            }
        }
    }
}

fn apply_buffer_barrier(state: &TimelineState, barrier: BufferBarrier<HeadlessBuffer>) {
    let mut current = lock(&barrier.buffer.0.state);
    if barrier.old_state != ResourceState::UNDEFINED && *current != barrier.old_state {
        state.validation_error("buffer barrier old state does not match");
    }
    *current = barrier.new_state;
}

fn apply_texture_barrier(state: &TimelineState, barrier: TextureBarrier<HeadlessTexture>) {
    let desc = barrier.texture.desc();
    let mut states = lock(&barrier.texture.0.states);
    for layer in 0..desc.array_layers {
        for mip in 0..desc.mip_levels {
            if barrier.mip_level.is_some_and(|m| m != mip) {
                continue;
            }
            let current = &mut states[desc.subresource_index(mip, layer)];
            if barrier.old_state != ResourceState::UNDEFINED && *current != barrier.old_state {
                state.validation_error("texture barrier old state does not match");
            }
            *current = barrier.new_state;
        }
    }
}

fn read_channel(ty: ChannelType, bytes: &[u8], offset: usize) -> f64 {
    match ty {
        ChannelType::U8 => bytes[offset] as f64,
        ChannelType::U16 => bytemuck::pod_read_unaligned::<u16>(&bytes[offset..offset + 2]) as f64,
        ChannelType::F32 => bytemuck::pod_read_unaligned::<f32>(&bytes[offset..offset + 4]) as f64,
    }
}

fn write_channel(ty: ChannelType, bytes: &mut [u8], offset: usize, value: f64) {
    match ty {
        ChannelType::U8 => bytes[offset] = value.round().clamp(0.0, u8::MAX as f64) as u8,
        ChannelType::U16 => {
            let value = value.round().clamp(0.0, u16::MAX as f64) as u16;
            bytes[offset..offset + 2].copy_from_slice(bytemuck::bytes_of(&value));
        }
        ChannelType::F32 => {
            bytes[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&(value as f32)));
        }
    }
}

/// 2x2 box filter, clamping at the edges of odd sized levels
pub(crate) fn downsample(
    format: ImageFormat,
    src: &[u8],
    (src_width, src_height): (u32, u32),
    dst: &mut [u8],
    (dst_width, dst_height): (u32, u32),
) {
    let (Some(channels), Some(ty)) = (format.channel_count(), format.channel_type()) else {
        return;
    };
    let channels = channels as usize;
    let pixel = channels * ty.size();
    for y in 0..dst_height {
        let rows = [(2 * y).min(src_height - 1), (2 * y + 1).min(src_height - 1)];
        for x in 0..dst_width {
            let columns = [(2 * x).min(src_width - 1), (2 * x + 1).min(src_width - 1)];
            let target = (y * dst_width + x) as usize * pixel;
            for channel in 0..channels {
                let mut sum = 0.0;
                for row in rows {
                    for column in columns {
                        let offset =
                            (row * src_width + column) as usize * pixel + channel * ty.size();
                        sum += read_channel(ty, src, offset);
                    }
                }
                write_channel(ty, dst, target + channel * ty.size(), sum / 4.0);
            }
        }
    }
}
