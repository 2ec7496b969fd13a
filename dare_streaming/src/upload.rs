//! Execution of a single request against the active resource set.
use dagal::command::{BufferCopy, BufferTextureCopy, CmdBuffer, MipBlit};
use dagal::device::Device;
use dagal::resource::{TextureDesc, TextureFlags};
use dagal::sync::{ResourceState, TextureBarrier};
use dagal::traits::{BufferResource, TextureResource};
use tracing::{error, trace, warn};

use crate::codec::{self, RowCopy};
use crate::copy_engine::CopyEngine;
use crate::error::Result;
use crate::image::{self, DecodedImage};
use crate::loader::LoadedTexture;
use crate::request::{BufferUpdate, TextureData, TextureLoad, TextureUpdate, UpdateRequest, UpdateSource};
use crate::stats::StreamingStats;

/// Alignment of buffer data inside staging memory
pub const BUFFER_COPY_ALIGNMENT: u64 = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UploadResult {
    Completed,
    /// The request could not be executed as described. Nothing was recorded for it
    InvalidRequest,
}

fn invalid(reason: &str) -> Result<UploadResult> {
    error!("Rejecting upload request: {reason}");
    Ok(UploadResult::InvalidRequest)
}

pub(crate) fn execute<D: Device>(
    engine: &mut CopyEngine<D>,
    stats: &StreamingStats,
    request: UpdateRequest<D>,
) -> Result<UploadResult> {
    match request {
        UpdateRequest::BufferUpdate(update) => update_buffer(engine, update),
        UpdateRequest::TextureUpdate(update) => update_texture(engine, update),
        UpdateRequest::BufferBarrier(barrier) => {
            engine.cmd()?.buffer_barriers(&[barrier])?;
            Ok(UploadResult::Completed)
        }
        UpdateRequest::TextureBarrier(barrier) => {
            if barrier
                .mip_level
                .is_some_and(|mip| mip >= barrier.texture.desc().mip_levels)
            {
                return invalid("texture barrier names a mip the texture does not have");
            }
            engine.cmd()?.texture_barriers(&[barrier])?;
            Ok(UploadResult::Completed)
        }
        UpdateRequest::TextureLoad(load) => load_texture(engine, stats, load),
    }
}

fn update_buffer<D: Device>(
    engine: &mut CopyEngine<D>,
    update: BufferUpdate<D>,
) -> Result<UploadResult> {
    let size = update.source.len();
    let fits = update
        .dst_offset
        .checked_add(size)
        .is_some_and(|end| end <= update.buffer.size());
    if update.source.is_empty() || !fits {
        return invalid("buffer update lies outside of the destination");
    }

    let (src, src_offset) = match update.source {
        UpdateSource::Host(bytes) => {
            let mut range = engine.allocate_staging(size, BUFFER_COPY_ALIGNMENT)?;
            range.as_mut_slice().copy_from_slice(&bytes);
            (range.buffer, range.offset)
        }
        UpdateSource::Mapped(range) => {
            engine.retain(range.buffer.clone());
            (range.buffer, range.offset)
        }
    };
    trace!("Copying {size} bytes to offset {}", update.dst_offset);
    engine.cmd()?.copy_buffer(
        &src,
        &update.buffer,
        BufferCopy {
            src_offset,
            dst_offset: update.dst_offset,
            size,
        },
    )?;
    Ok(UploadResult::Completed)
}

/// State a texture settles in once its upload finished
fn steady_state(desc: &TextureDesc) -> ResourceState {
    if desc.start_state.is_empty() || desc.start_state == ResourceState::COPY_DESTINATION {
        ResourceState::SHADER_RESOURCE
    } else {
        desc.start_state
    }
}

fn can_generate_mips(desc: &TextureDesc) -> bool {
    desc.format.supports_blit() && desc.depth == 1
}

fn check_image(desc: &TextureDesc, image: &DecodedImage) -> bool {
    let (Some(channels), Some(ty)) = (desc.format.channel_count(), desc.format.channel_type())
    else {
        return false;
    };
    image.width == desc.width
        && image.height == desc.height
        && image.channel == ty
        && image.color.channel_count() <= channels
}

fn update_texture<D: Device>(
    engine: &mut CopyEngine<D>,
    update: TextureUpdate<D>,
) -> Result<UploadResult> {
    let TextureUpdate {
        texture,
        data,
        current_state,
        generate_mips,
    } = update;
    let desc = texture.desc().clone();
    let limits = engine.device().limits();
    let generate_mips = generate_mips && desc.mip_levels > 1;
    if generate_mips && !can_generate_mips(&desc) {
        return invalid("mip generation needs a blittable 2D format");
    }

    // stage everything first so a rejected request records nothing
    let mut copies = Vec::new();
    let mut retained = None;
    match data {
        TextureData::Images(images) => {
            if images.len() != desc.array_layers as usize {
                return invalid("texture update needs one image per array layer");
            }
            if !images.iter().all(|image| check_image(&desc, image)) {
                return invalid("image does not match the texture it updates");
            }
            let Some(base) = codec::subresource_layout(&desc, 0, 0, &limits) else {
                return invalid("surface size of the texture format cannot be computed");
            };
            let (Some(channels), Some(channel)) =
                (desc.format.channel_count(), desc.format.channel_type())
            else {
                return invalid("texture format cannot take decoded pixels");
            };
            let alignment = codec::texture_subresource_alignment(&limits, desc.format);
            for (layer, image) in images.iter().enumerate() {
                let mut range = engine.allocate_staging(base.size(), alignment)?;
                let copied = codec::copy_rows(
                    &image.pixels,
                    range.as_mut_slice(),
                    RowCopy {
                        width: image.width,
                        rows: image.height,
                        src_row_pitch: image.row_bytes(),
                        dst_row_pitch: base.row_pitch as usize,
                        src_channels: image.color.channel_count(),
                        dst_channels: channels,
                        channel,
                    },
                );
                if !copied {
                    return invalid("decoded pixels are shorter than their dimensions");
                }
                copies.push((
                    range.buffer,
                    BufferTextureCopy {
                        buffer_offset: range.offset,
                        row_pitch: base.row_pitch,
                        slice_pitch: base.slice_pitch,
                        mip_level: 0,
                        array_layer: layer as u32,
                    },
                ));
            }
        }
        TextureData::Staged { range, layouts } => {
            for layout in &layouts {
                if layout.mip_level >= desc.mip_levels || layout.array_layer >= desc.array_layers {
                    return invalid("staged subresource lies outside of the texture");
                }
                let Some(expected) =
                    codec::subresource_layout(&desc, layout.mip_level, layout.array_layer, &limits)
                else {
                    return invalid("surface size of the texture format cannot be computed");
                };
                let in_range = layout
                    .offset
                    .checked_add(expected.size())
                    .is_some_and(|end| end <= range.size);
                if layout.row_pitch != expected.row_pitch
                    || layout.slice_pitch != expected.slice_pitch
                    || !in_range
                {
                    return invalid("staged subresource layout does not match the texture");
                }
                copies.push((
                    range.buffer.clone(),
                    BufferTextureCopy {
                        buffer_offset: range.offset + layout.offset,
                        row_pitch: layout.row_pitch,
                        slice_pitch: layout.slice_pitch,
                        mip_level: layout.mip_level,
                        array_layer: layout.array_layer,
                    },
                ));
            }
            retained = Some(range.buffer);
        }
    }
    if let Some(buffer) = retained {
        engine.retain(buffer);
    }

    let cmd = engine.cmd()?;
    if current_state != ResourceState::COPY_DESTINATION {
        cmd.texture_barriers(&[TextureBarrier::whole(
            texture.clone(),
            current_state,
            ResourceState::COPY_DESTINATION,
        )])?;
    }
    for (buffer, region) in copies {
        cmd.copy_buffer_to_texture(&buffer, &texture, region)?;
    }
    if generate_mips {
        record_mip_chain::<D>(cmd, &texture, &desc)?;
    }
    cmd.texture_barriers(&[TextureBarrier::whole(
        texture.clone(),
        ResourceState::COPY_DESTINATION,
        steady_state(&desc),
    )])?;
    Ok(UploadResult::Completed)
}

/// Fills every level past the base level, each one blitted from its predecessor
fn record_mip_chain<D: Device>(
    cmd: &mut D::CommandBuffer,
    texture: &D::Texture,
    desc: &TextureDesc,
) -> Result<()> {
    for level in 1..desc.mip_levels {
        cmd.texture_barriers(&[TextureBarrier::mip(
            texture.clone(),
            level - 1,
            ResourceState::COPY_DESTINATION,
            ResourceState::COPY_SOURCE,
        )])?;
        for layer in 0..desc.array_layers {
            cmd.blit_mip(
                texture,
                MipBlit {
                    src_mip: level - 1,
                    dst_mip: level,
                    array_layer: layer,
                },
            )?;
        }
        cmd.texture_barriers(&[TextureBarrier::mip(
            texture.clone(),
            level - 1,
            ResourceState::COPY_SOURCE,
            ResourceState::COPY_DESTINATION,
        )])?;
    }
    Ok(())
}

fn load_texture<D: Device>(
    engine: &mut CopyEngine<D>,
    stats: &StreamingStats,
    load: TextureLoad<D>,
) -> Result<UploadResult> {
    let TextureLoad { desc: load, slot } = load;
    let cube = load.source.is_cube();
    let (layers, placeholder) = match image::decode_source(&load.source) {
        Ok(layers) => (layers, false),
        Err(e) => {
            warn!(
                "Failed to load texture {:?}, substituting placeholder: {e}",
                load.source
            );
            StreamingStats::bump(&stats.placeholder_substitutions);
            (vec![image::placeholder(); if cube { 6 } else { 1 }], true)
        }
    };

    let (width, height) = (layers[0].width, layers[0].height);
    let format = layers[0].texture_format(load.srgb);
    let mip_levels = if load.generate_mipmaps && format.supports_blit() {
        codec::mip_level_count(width, height)
    } else {
        1
    };
    let desc = TextureDesc {
        name: load.name.clone(),
        format,
        width,
        height,
        depth: 1,
        array_layers: layers.len() as u32,
        mip_levels,
        flags: if cube {
            TextureFlags::CUBE
        } else {
            TextureFlags::empty()
        },
        start_state: ResourceState::SHADER_RESOURCE,
    };
    let texture = engine.device().create_texture(&desc)?;
    trace!("Created {width}x{height} {format:?} texture with {mip_levels} mips");

    let result = update_texture(
        engine,
        TextureUpdate {
            texture: texture.clone(),
            data: TextureData::Images(layers),
            current_state: ResourceState::UNDEFINED,
            generate_mips: mip_levels > 1,
        },
    )?;
    if slot.set(LoadedTexture::new(texture, placeholder)).is_err() {
        warn!("Texture load slot was filled twice");
    }
    Ok(result)
}
