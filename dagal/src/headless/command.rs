use crate::command::{BufferCopy, BufferTextureCopy, CmdBuffer, MipBlit};
use crate::headless::{HeadlessBuffer, HeadlessDevice, HeadlessTexture};
use crate::sync::{BufferBarrier, TextureBarrier};
use crate::traits::TextureResource;
use crate::DagalError;

#[derive(Debug)]
pub(crate) enum Command {
    CopyBuffer {
        src: HeadlessBuffer,
        dst: HeadlessBuffer,
        region: BufferCopy,
    },
    CopyBufferToTexture {
        src: HeadlessBuffer,
        dst: HeadlessTexture,
        region: BufferTextureCopy,
    },
    BlitMip {
        texture: HeadlessTexture,
        blit: MipBlit,
    },
    BufferBarriers(Vec<BufferBarrier<HeadlessBuffer>>),
    TextureBarriers(Vec<TextureBarrier<HeadlessTexture>>),
}

/// Records commands for the headless timeline
///
/// Regions are validated while recording so the timeline only ever executes in-bounds work.
#[derive(Debug, Default)]
pub struct HeadlessCommandBuffer {
    commands: Vec<Command>,
    recording: bool,
}

impl HeadlessCommandBuffer {
    /// Number of commands recorded since the last [`CmdBuffer::begin`]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn push(&mut self, command: Command) -> Result<(), DagalError> {
        if !self.recording {
            return Err(DagalError::NotRecording);
        }
        self.commands.push(command);
        Ok(())
    }

    pub(crate) fn take_commands(&mut self) -> Result<Vec<Command>, DagalError> {
        if self.recording {
            return Err(DagalError::StillRecording);
        }
        Ok(std::mem::take(&mut self.commands))
    }
}

fn check_range(offset: u64, size: u64, len: usize) -> Result<(), DagalError> {
    match offset.checked_add(size) {
        Some(end) if end <= len as u64 => Ok(()),
        _ => Err(DagalError::OutOfBounds),
    }
}

impl CmdBuffer<HeadlessDevice> for HeadlessCommandBuffer {
    fn begin(&mut self) -> Result<(), DagalError> {
        if self.recording {
            return Err(DagalError::StillRecording);
        }
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> Result<(), DagalError> {
        if !self.recording {
            return Err(DagalError::NotRecording);
        }
        self.recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn copy_buffer(
        &mut self,
        src: &HeadlessBuffer,
        dst: &HeadlessBuffer,
        region: BufferCopy,
    ) -> Result<(), DagalError> {
        check_range(region.src_offset, region.size, src.len())?;
        check_range(region.dst_offset, region.size, dst.len())?;
        self.push(Command::CopyBuffer {
            src: src.clone(),
            dst: dst.clone(),
            region,
        })
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &HeadlessBuffer,
        dst: &HeadlessTexture,
        region: BufferTextureCopy,
    ) -> Result<(), DagalError> {
        let desc = dst.desc();
        if region.mip_level >= desc.mip_levels || region.array_layer >= desc.array_layers {
            return Err(DagalError::OutOfBounds);
        }
        let (width, height, depth) = desc.mip_extent(region.mip_level);
        let info = desc
            .format
            .surface_info(width, height)
            .ok_or(DagalError::UnsupportedFormat)?;
        if region.row_pitch < info.row_bytes
            || (depth > 1 && region.slice_pitch < region.row_pitch * info.num_rows)
        {
            return Err(DagalError::OutOfBounds);
        }
        let footprint = (depth as u64 - 1) * region.slice_pitch
            + (info.num_rows - 1) * region.row_pitch
            + info.row_bytes;
        check_range(region.buffer_offset, footprint, src.len())?;
        self.push(Command::CopyBufferToTexture {
            src: src.clone(),
            dst: dst.clone(),
            region,
        })
    }

    fn blit_mip(&mut self, texture: &HeadlessTexture, blit: MipBlit) -> Result<(), DagalError> {
        let desc = texture.desc();
        if !desc.format.supports_blit() || desc.depth > 1 {
            return Err(DagalError::UnsupportedFormat);
        }
        if blit.dst_mip != blit.src_mip + 1
            || blit.dst_mip >= desc.mip_levels
            || blit.array_layer >= desc.array_layers
        {
            return Err(DagalError::OutOfBounds);
        }
        self.push(Command::BlitMip {
            texture: texture.clone(),
            blit,
        })
    }

    fn buffer_barriers(
        &mut self,
        barriers: &[BufferBarrier<HeadlessBuffer>],
    ) -> Result<(), DagalError> {
        self.push(Command::BufferBarriers(barriers.to_vec()))
    }

    fn texture_barriers(
        &mut self,
        barriers: &[TextureBarrier<HeadlessTexture>],
    ) -> Result<(), DagalError> {
        for barrier in barriers {
            if let Some(mip) = barrier.mip_level {
                if mip >= barrier.texture.desc().mip_levels {
                    return Err(DagalError::OutOfBounds);
                }
            }
        }
        self.push(Command::TextureBarriers(barriers.to_vec()))
    }
}
