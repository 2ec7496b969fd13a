use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use derivative::Derivative;

use crate::resource::{BufferDesc, TextureDesc};
use crate::sync::ResourceState;
use crate::traits::{BufferResource, TextureResource};
use crate::DagalError;

/// Live allocation bookkeeping shared between a device and its resources
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub live_buffers: AtomicUsize,
    pub live_textures: AtomicUsize,
    next_id: AtomicU64,
}

impl Counters {
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Locks ignoring poison. The timeline thread must keep running even if a test thread panicked
/// while holding a resource lock
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct BufferInner {
    pub id: u64,
    pub desc: BufferDesc,
    #[derivative(Debug = "ignore")]
    memory: NonNull<u8>,
    len: usize,
    pub state: Mutex<ResourceState>,
    #[derivative(Debug = "ignore")]
    counters: Arc<Counters>,
}
unsafe impl Send for BufferInner {}
unsafe impl Sync for BufferInner {}

impl Drop for BufferInner {
    fn drop(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying headless buffer {}", self.id);

        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.memory.as_ptr(),
                self.len,
            )));
        }
        self.counters.live_buffers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Host memory standing in for a device buffer
#[derive(Debug, Clone)]
pub struct HeadlessBuffer(pub(crate) Arc<BufferInner>);

impl HeadlessBuffer {
    pub(crate) fn new(desc: BufferDesc, counters: Arc<Counters>) -> Result<Self, DagalError> {
        if desc.size == 0 {
            return Err(DagalError::AllocationError);
        }
        let len = usize::try_from(desc.size).map_err(|_| DagalError::AllocationError)?;
        let memory: Box<[u8]> = vec![0u8; len].into_boxed_slice();
        let memory =
            NonNull::new(Box::into_raw(memory) as *mut u8).ok_or(DagalError::AllocationError)?;
        let id = counters.next_id();
        counters.live_buffers.fetch_add(1, Ordering::AcqRel);

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating headless buffer {} of {} bytes", id, len);

        Ok(Self(Arc::new(BufferInner {
            id,
            desc,
            memory,
            len,
            state: Mutex::new(ResourceState::UNDEFINED),
            counters,
        })))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.0.memory.as_ptr()
    }

    /// Snapshot of `len` bytes at `offset`
    pub(crate) fn read(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        if offset.checked_add(len)? > self.0.len {
            return None;
        }
        let slice = unsafe { std::slice::from_raw_parts(self.as_ptr().add(offset), len) };
        Some(slice.to_vec())
    }
}

impl BufferResource for HeadlessBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.0.desc
    }

    fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        if self.0.desc.memory.is_host_visible() {
            Some(self.0.memory)
        } else {
            None
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct TextureInner {
    pub id: u64,
    pub desc: TextureDesc,
    /// Tightly packed bytes per subresource, see [`TextureDesc::subresource_index`]
    #[derivative(Debug = "ignore")]
    pub subresources: Mutex<Vec<Vec<u8>>>,
    pub states: Mutex<Vec<ResourceState>>,
    #[derivative(Debug = "ignore")]
    counters: Arc<Counters>,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying headless texture {}", self.id);

        self.counters.live_textures.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessTexture(pub(crate) Arc<TextureInner>);

impl HeadlessTexture {
    pub(crate) fn new(desc: TextureDesc, counters: Arc<Counters>) -> Result<Self, DagalError> {
        if desc.width == 0
            || desc.height == 0
            || desc.depth == 0
            || desc.array_layers == 0
            || desc.mip_levels == 0
        {
            return Err(DagalError::AllocationError);
        }
        let mut subresources = Vec::with_capacity(desc.subresource_count());
        for _ in 0..desc.array_layers {
            for mip in 0..desc.mip_levels {
                let (width, height, depth) = desc.mip_extent(mip);
                let info = desc
                    .format
                    .surface_info(width, height)
                    .ok_or(DagalError::UnsupportedFormat)?;
                subresources.push(vec![0u8; (info.num_bytes * depth as u64) as usize]);
            }
        }
        let id = counters.next_id();
        counters.live_textures.fetch_add(1, Ordering::AcqRel);
        let states = vec![ResourceState::UNDEFINED; desc.subresource_count()];
        Ok(Self(Arc::new(TextureInner {
            id,
            desc,
            subresources: Mutex::new(subresources),
            states: Mutex::new(states),
            counters,
        })))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }
}

impl TextureResource for HeadlessTexture {
    fn desc(&self) -> &TextureDesc {
        &self.0.desc
    }
}

#[derive(Debug)]
pub(crate) struct FenceInner {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

#[derive(Debug, Clone)]
pub struct HeadlessFence(pub(crate) Arc<FenceInner>);

impl HeadlessFence {
    pub(crate) fn new(signaled: bool) -> Self {
        Self(Arc::new(FenceInner {
            signaled: Mutex::new(signaled),
            condvar: Condvar::new(),
        }))
    }

    pub(crate) fn signal(&self) {
        *lock(&self.0.signaled) = true;
        self.0.condvar.notify_all();
    }

    pub(crate) fn reset(&self) {
        *lock(&self.0.signaled) = false;
    }

    pub(crate) fn is_signaled(&self) -> bool {
        *lock(&self.0.signaled)
    }

    /// Blocks until signaled or until `lost` flips
    pub(crate) fn wait(&self, lost: &AtomicBool) -> Result<(), DagalError> {
        let mut signaled = self.0.signaled.lock()?;
        while !*signaled {
            if lost.load(Ordering::Acquire) {
                return Err(DagalError::DeviceLost);
            }
            signaled = self
                .0
                .condvar
                .wait_timeout(signaled, Duration::from_millis(5))?
                .0;
        }
        Ok(())
    }
}
