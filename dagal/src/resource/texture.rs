use bitflags::bitflags;

use crate::resource::ImageFormat;
use crate::sync::ResourceState;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        /// Six array layers per cube, ordered +X, -X, +Y, -Y, +Z, -Z
        const CUBE = 1 << 0;
        /// Texture is bound as a read/write storage image
        const STORAGE = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub name: Option<String>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub flags: TextureFlags,
    pub start_state: ResourceState,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            name: None,
            format: ImageFormat::Undefined,
            width: 1,
            height: 1,
            depth: 1,
            array_layers: 1,
            mip_levels: 1,
            flags: TextureFlags::empty(),
            start_state: ResourceState::UNDEFINED,
        }
    }
}

impl TextureDesc {
    /// Extent of `level` as (width, height, depth), halving each dimension down to 1
    pub fn mip_extent(&self, level: u32) -> (u32, u32, u32) {
        let shrink = |v: u32| v.checked_shr(level).unwrap_or(0).max(1);
        (shrink(self.width), shrink(self.height), shrink(self.depth))
    }

    /// Index of a subresource when layers are laid out one after another
    pub fn subresource_index(&self, mip_level: u32, array_layer: u32) -> usize {
        (array_layer * self.mip_levels + mip_level) as usize
    }

    pub fn subresource_count(&self) -> usize {
        (self.array_layers * self.mip_levels) as usize
    }
}
