//! Pitch, alignment and mip math for texture uploads.
use dagal::device::DeviceLimits;
use dagal::resource::{ChannelType, ImageFormat, TextureDesc};
use dagal::util::align;

/// Alignment of the distance between two rows in upload memory
pub fn texture_row_alignment(limits: &DeviceLimits) -> u64 {
    limits.upload_texture_row_alignment.max(1)
}

/// Alignment of a subresource's first byte in upload memory
///
/// Satisfies the device's texture alignment, the format's block size and the row alignment at
/// once.
pub fn texture_subresource_alignment(limits: &DeviceLimits, format: ImageFormat) -> u64 {
    let block_size = (format.bit_size_of_block() as u64 / 8).max(1);
    let alignment = align(limits.upload_texture_alignment.max(1), block_size);
    align(alignment, texture_row_alignment(limits))
}

/// `floor(log2(max(width, height))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

/// Splits `total` bytes into `(offset, size)` pieces of at most `chunk` bytes
pub fn chunk_ranges(total: u64, chunk: u64) -> impl Iterator<Item = (u64, u64)> {
    let chunk = chunk.max(1);
    (0..total.div_ceil(chunk)).map(move |i| {
        let offset = i * chunk;
        (offset, chunk.min(total - offset))
    })
}

/// Placement of one subresource in upload memory
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubresourceLayout {
    pub mip_level: u32,
    pub array_layer: u32,
    /// Relative to the start of the upload range
    pub offset: u64,
    pub row_pitch: u64,
    pub slice_pitch: u64,
    /// Bytes of texel data in one row
    pub row_bytes: u64,
    pub num_rows: u64,
    pub depth: u32,
}

impl SubresourceLayout {
    pub fn size(&self) -> u64 {
        self.slice_pitch * self.depth as u64
    }
}

/// Subresources touched by a texture update
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureUpdateRange {
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
    /// Lay every mip of a layer out before the next layer instead of every layer of a mip
    /// before the next mip
    pub mips_after_slice: bool,
}

impl TextureUpdateRange {
    pub fn full(desc: &TextureDesc) -> Self {
        Self {
            base_mip_level: 0,
            mip_level_count: desc.mip_levels,
            base_array_layer: 0,
            array_layer_count: desc.array_layers,
            mips_after_slice: true,
        }
    }

    pub fn base_level(desc: &TextureDesc) -> Self {
        Self {
            mip_level_count: 1,
            ..Self::full(desc)
        }
    }

    pub fn fits(&self, desc: &TextureDesc) -> bool {
        self.mip_level_count > 0
            && self.array_layer_count > 0
            && self
                .base_mip_level
                .checked_add(self.mip_level_count)
                .is_some_and(|end| end <= desc.mip_levels)
            && self
                .base_array_layer
                .checked_add(self.array_layer_count)
                .is_some_and(|end| end <= desc.array_layers)
    }
}

/// Pitches of one subresource at offset 0. `None` if the format has no computable surface
pub fn subresource_layout(
    desc: &TextureDesc,
    mip_level: u32,
    array_layer: u32,
    limits: &DeviceLimits,
) -> Option<SubresourceLayout> {
    let (width, height, depth) = desc.mip_extent(mip_level);
    let info = desc.format.surface_info(width, height)?;
    let row_pitch = align(info.row_bytes, texture_row_alignment(limits));
    let slice_pitch = align(
        row_pitch * info.num_rows,
        texture_subresource_alignment(limits, desc.format),
    );
    Some(SubresourceLayout {
        mip_level,
        array_layer,
        offset: 0,
        row_pitch,
        slice_pitch,
        row_bytes: info.row_bytes,
        num_rows: info.num_rows,
        depth,
    })
}

/// Lays every subresource of `range` out back to back. Returns the layouts and the total size
/// of upload memory needed
pub fn layout_texture_update(
    desc: &TextureDesc,
    range: &TextureUpdateRange,
    limits: &DeviceLimits,
) -> Option<(Vec<SubresourceLayout>, u64)> {
    if !range.fits(desc) {
        return None;
    }
    let alignment = texture_subresource_alignment(limits, desc.format);
    let mips = range.base_mip_level..range.base_mip_level + range.mip_level_count;
    let layers = range.base_array_layer..range.base_array_layer + range.array_layer_count;
    let order: Vec<(u32, u32)> = if range.mips_after_slice {
        layers
            .flat_map(|layer| mips.clone().map(move |mip| (mip, layer)))
            .collect()
    } else {
        mips.flat_map(|mip| layers.clone().map(move |layer| (mip, layer)))
            .collect()
    };

    let mut total = 0;
    let mut layouts = Vec::with_capacity(order.len());
    for (mip, layer) in order {
        let mut layout = subresource_layout(desc, mip, layer, limits)?;
        layout.offset = align(total, alignment);
        total = layout.offset + layout.size();
        layouts.push(layout);
    }
    Some((layouts, total))
}

fn write_one(ty: ChannelType, dst: &mut [u8]) {
    match ty {
        ChannelType::U8 => dst.copy_from_slice(&[u8::MAX]),
        ChannelType::U16 => dst.copy_from_slice(&u16::MAX.to_ne_bytes()),
        ChannelType::F32 => dst.copy_from_slice(&1.0f32.to_ne_bytes()),
    }
}

/// Row layout for [`copy_rows`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RowCopy {
    pub width: u32,
    pub rows: u32,
    pub src_row_pitch: usize,
    pub dst_row_pitch: usize,
    pub src_channels: u32,
    pub dst_channels: u32,
    pub channel: ChannelType,
}

/// Copies `rows` rows between differently pitched images
///
/// When the destination has more channels than the source the extra channels are zeroed, except
/// alpha which is filled with one. Returns `false` without copying if either side is too small.
pub fn copy_rows(src: &[u8], dst: &mut [u8], copy: RowCopy) -> bool {
    let channel = copy.channel.size();
    let src_pixel = copy.src_channels as usize * channel;
    let dst_pixel = copy.dst_channels as usize * channel;
    let width = copy.width as usize;
    let rows = copy.rows as usize;
    if rows == 0 || width == 0 {
        return true;
    }
    let src_needed = (rows - 1) * copy.src_row_pitch + width * src_pixel;
    let dst_needed = (rows - 1) * copy.dst_row_pitch + width * dst_pixel;
    if src.len() < src_needed
        || dst.len() < dst_needed
        || copy.src_row_pitch < width * src_pixel
        || copy.dst_row_pitch < width * dst_pixel
    {
        return false;
    }

    for row in 0..rows {
        let src_row = &src[row * copy.src_row_pitch..][..width * src_pixel];
        let dst_row = &mut dst[row * copy.dst_row_pitch..][..width * dst_pixel];
        if src_pixel == dst_pixel {
            dst_row.copy_from_slice(src_row);
            continue;
        }
        let shared = src_pixel.min(dst_pixel);
        for (src_px, dst_px) in src_row
            .chunks_exact(src_pixel)
            .zip(dst_row.chunks_exact_mut(dst_pixel))
        {
            dst_px[..shared].copy_from_slice(&src_px[..shared]);
            for c in copy.src_channels..copy.dst_channels {
                let at = c as usize * channel;
                let target = &mut dst_px[at..at + channel];
                if c == 3 {
                    write_one(copy.channel, target);
                } else {
                    target.fill(0);
                }
            }
        }
    }
    true
}
