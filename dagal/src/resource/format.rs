/// Pixel formats understood by the upload path
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    Undefined,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16Unorm,
    R16G16Unorm,
    R16G16B16A16Unorm,
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
    Bc1RgbaUnorm,
    Bc3RgbaUnorm,
    Bc4RUnorm,
    Bc5RgUnorm,
    Bc7RgbaUnorm,
}

/// Storage type of a single channel
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChannelType {
    U8,
    U16,
    F32,
}

impl ChannelType {
    pub fn size(&self) -> usize {
        match self {
            ChannelType::U8 => 1,
            ChannelType::U16 => 2,
            ChannelType::F32 => 4,
        }
    }
}

/// Byte footprint of one 2D surface
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceInfo {
    pub num_bytes: u64,
    pub row_bytes: u64,
    pub num_rows: u64,
}

impl ImageFormat {
    /// Bits per block. Uncompressed formats have 1x1 blocks
    pub fn bit_size_of_block(&self) -> u32 {
        use ImageFormat::*;
        match self {
            Undefined => 0,
            R8Unorm => 8,
            R8G8Unorm | R16Unorm => 16,
            R8G8B8A8Unorm | R8G8B8A8Srgb | B8G8R8A8Unorm | B8G8R8A8Srgb | R16G16Unorm
            | R32Sfloat => 32,
            R16G16B16A16Unorm | R32G32Sfloat => 64,
            R32G32B32Sfloat => 96,
            R32G32B32A32Sfloat => 128,
            Bc1RgbaUnorm | Bc4RUnorm => 64,
            Bc3RgbaUnorm | Bc5RgUnorm | Bc7RgbaUnorm => 128,
        }
    }

    pub fn is_compressed(&self) -> bool {
        use ImageFormat::*;
        matches!(
            self,
            Bc1RgbaUnorm | Bc3RgbaUnorm | Bc4RUnorm | Bc5RgUnorm | Bc7RgbaUnorm
        )
    }

    pub fn is_srgb(&self) -> bool {
        matches!(self, ImageFormat::R8G8B8A8Srgb | ImageFormat::B8G8R8A8Srgb)
    }

    pub fn block_width(&self) -> u32 {
        if self.is_compressed() {
            4
        } else {
            1
        }
    }

    pub fn block_height(&self) -> u32 {
        self.block_width()
    }

    /// Channel count of uncompressed formats
    pub fn channel_count(&self) -> Option<u32> {
        use ImageFormat::*;
        match self {
            R8Unorm | R16Unorm | R32Sfloat => Some(1),
            R8G8Unorm | R16G16Unorm | R32G32Sfloat => Some(2),
            R32G32B32Sfloat => Some(3),
            R8G8B8A8Unorm | R8G8B8A8Srgb | B8G8R8A8Unorm | B8G8R8A8Srgb | R16G16B16A16Unorm
            | R32G32B32A32Sfloat => Some(4),
            _ => None,
        }
    }

    pub fn channel_type(&self) -> Option<ChannelType> {
        use ImageFormat::*;
        match self {
            R8Unorm | R8G8Unorm | R8G8B8A8Unorm | R8G8B8A8Srgb | B8G8R8A8Unorm | B8G8R8A8Srgb => {
                Some(ChannelType::U8)
            }
            R16Unorm | R16G16Unorm | R16G16B16A16Unorm => Some(ChannelType::U16),
            R32Sfloat | R32G32Sfloat | R32G32B32Sfloat | R32G32B32A32Sfloat => {
                Some(ChannelType::F32)
            }
            _ => None,
        }
    }

    /// Whether a linear downsampling blit can read and write this format
    pub fn supports_blit(&self) -> bool {
        self.channel_type().is_some()
    }

    /// Size of a `width` x `height` surface. `None` if the format has no defined size
    pub fn surface_info(&self, width: u32, height: u32) -> Option<SurfaceInfo> {
        let bits = self.bit_size_of_block() as u64;
        if bits == 0 || width == 0 || height == 0 {
            return None;
        }
        let (row_bytes, num_rows) = if self.is_compressed() {
            let blocks_wide = (width as u64).div_ceil(self.block_width() as u64).max(1);
            let blocks_high = (height as u64).div_ceil(self.block_height() as u64).max(1);
            (blocks_wide * bits / 8, blocks_high)
        } else {
            ((width as u64 * bits).div_ceil(8), height as u64)
        };
        Some(SurfaceInfo {
            num_bytes: row_bytes * num_rows,
            row_bytes,
            num_rows,
        })
    }
}
