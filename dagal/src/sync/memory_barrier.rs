use crate::sync::ResourceState;

/// Transitions a whole buffer between two states
#[derive(Debug, Clone)]
pub struct BufferBarrier<B> {
    pub buffer: B,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
}

/// Transitions a texture between two states
///
/// With [`Self::mip_level`] unset every mip of every layer is transitioned, otherwise only the
/// given mip across all layers.
#[derive(Debug, Clone)]
pub struct TextureBarrier<T> {
    pub texture: T,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
    pub mip_level: Option<u32>,
}

impl<T> TextureBarrier<T> {
    pub fn whole(texture: T, old_state: ResourceState, new_state: ResourceState) -> Self {
        Self {
            texture,
            old_state,
            new_state,
            mip_level: None,
        }
    }

    pub fn mip(texture: T, mip_level: u32, old_state: ResourceState, new_state: ResourceState) -> Self {
        Self {
            texture,
            old_state,
            new_state,
            mip_level: Some(mip_level),
        }
    }
}
