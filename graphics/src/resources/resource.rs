//! Shared state of a cached GPU resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::backend::{GpuBackend, GpuBuffer, GpuTexture};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, TextureDescriptor};

use super::cache_access::CacheAccess;
use super::keys::{ContentKey, ResourceId, ScratchKey};

/// What kind of GPU object a resource is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// A texture with its creation descriptor.
    Texture(TextureDescriptor),
    /// A buffer with its creation descriptor.
    Buffer(BufferDescriptor),
}

/// Who owns the underlying GPU allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Allocated by this crate; freed on release.
    Owned,
    /// Allocated elsewhere; never freed by this crate.
    Wrapped,
}

#[derive(Debug, Clone)]
pub(crate) enum GpuHandle {
    Texture(GpuTexture),
    Buffer(GpuBuffer),
}

/// Key state that decides whether a resource is scratch.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResourceKeys {
    pub(crate) content_key: Option<ContentKey>,
    pub(crate) scratch_key: Option<ScratchKey>,
    pub(crate) budgeted: bool,
}

/// A resource is scratch iff it has no content key, has a scratch key, and
/// counts against the budget.
pub(crate) fn is_scratch(keys: &ResourceKeys) -> bool {
    keys.content_key.is_none() && keys.scratch_key.is_some() && keys.budgeted
}

/// Slot of a resource in the cache's resource array.
#[derive(Debug)]
pub struct CacheIndex(AtomicUsize);

impl CacheIndex {
    const UNTRACKED: usize = usize::MAX;

    fn new() -> Self {
        Self(AtomicUsize::new(Self::UNTRACKED))
    }

    /// Current slot, or `None` when the resource is not tracked.
    pub fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            Self::UNTRACKED => None,
            index => Some(index),
        }
    }

    /// Set or clear the slot.
    pub fn set(&self, index: Option<usize>) {
        self.0
            .store(index.unwrap_or(Self::UNTRACKED), Ordering::Release);
    }
}

/// A GPU resource as tracked by the [`ResourceCache`].
///
/// Resources are always held as `Arc<GpuResource>`. The cache keeps one
/// strong reference to every resource it tracks; a resource is *purgeable*
/// when that is the only one left.
///
/// [`ResourceCache`]: crate::cache::ResourceCache
pub struct GpuResource {
    id: ResourceId,
    backend: Arc<dyn GpuBackend>,
    kind: ResourceKind,
    lifecycle: Lifecycle,
    gpu_memory_size: u64,
    handle: Mutex<Option<GpuHandle>>,
    keys: RwLock<ResourceKeys>,
    timestamp: AtomicU32,
    cache_index: CacheIndex,
    mapped: AtomicBool,
}

impl GpuResource {
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        kind: ResourceKind,
        handle: GpuHandle,
        lifecycle: Lifecycle,
        budgeted: bool,
        scratch_key: Option<ScratchKey>,
    ) -> Self {
        let gpu_memory_size = match &kind {
            ResourceKind::Texture(desc) => desc.memory_size(),
            ResourceKind::Buffer(desc) => desc.size,
        };

        Self {
            id: ResourceId::next(),
            backend,
            kind,
            lifecycle,
            gpu_memory_size,
            handle: Mutex::new(Some(handle)),
            keys: RwLock::new(ResourceKeys {
                content_key: None,
                scratch_key,
                budgeted,
            }),
            timestamp: AtomicU32::new(0),
            cache_index: CacheIndex::new(),
            mapped: AtomicBool::new(false),
        }
    }

    /// Process-unique id of this resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Resource kind and descriptor.
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Debug label from the descriptor.
    pub fn label(&self) -> Option<&str> {
        match &self.kind {
            ResourceKind::Texture(desc) => desc.label.as_deref(),
            ResourceKind::Buffer(desc) => desc.label.as_deref(),
        }
    }

    /// Ownership of the GPU allocation.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether the allocation is owned outside this crate.
    pub fn is_wrapped(&self) -> bool {
        self.lifecycle == Lifecycle::Wrapped
    }

    /// Bytes charged against the cache budget.
    pub fn gpu_memory_size(&self) -> u64 {
        self.gpu_memory_size
    }

    /// Whether the resource counts against the cache budget.
    pub fn is_budgeted(&self) -> bool {
        self.keys.read().budgeted
    }

    /// The content key, if one is assigned.
    pub fn content_key(&self) -> Option<ContentKey> {
        self.keys.read().content_key.clone()
    }

    /// The shape-derived scratch key, if any.
    pub fn scratch_key(&self) -> Option<ScratchKey> {
        self.keys.read().scratch_key
    }

    /// Whether the resource is interchangeable with others of the same shape.
    pub fn is_scratch(&self) -> bool {
        is_scratch(&self.keys.read())
    }

    /// Whether the GPU allocation was released or abandoned.
    pub fn was_destroyed(&self) -> bool {
        self.handle.lock().is_none()
    }

    /// Whether the cache holds the only reference.
    pub fn is_purgeable(self: &Arc<Self>) -> bool {
        Arc::strong_count(self) == 1
    }

    /// Last recency stamp assigned by the cache.
    pub fn timestamp(&self) -> u32 {
        self.timestamp.load(Ordering::Acquire)
    }

    pub(crate) fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub(crate) fn cache_access(self: &Arc<Self>) -> CacheAccess<'_> {
        CacheAccess::new(self)
    }

    pub(crate) fn set_timestamp(&self, timestamp: u32) {
        self.timestamp.store(timestamp, Ordering::Release);
    }

    pub(crate) fn cache_index(&self) -> &CacheIndex {
        &self.cache_index
    }

    /// Replace the content key, returning the previous one.
    pub(crate) fn set_content_key(&self, key: Option<ContentKey>) -> Option<ContentKey> {
        std::mem::replace(&mut self.keys.write().content_key, key)
    }

    pub(crate) fn set_budgeted(&self, budgeted: bool) {
        self.keys.write().budgeted = budgeted;
    }

    pub(crate) fn mapped_flag(&self) -> &AtomicBool {
        &self.mapped
    }

    pub(crate) fn texture_handle(&self) -> Result<GpuTexture, GraphicsError> {
        match &*self.handle.lock() {
            Some(GpuHandle::Texture(texture)) => Ok(texture.clone()),
            Some(GpuHandle::Buffer(_)) => Err(GraphicsError::InvalidParameter(
                "resource is a buffer, not a texture".to_string(),
            )),
            None => Err(GraphicsError::ResourceDestroyed),
        }
    }

    pub(crate) fn buffer_handle(&self) -> Result<GpuBuffer, GraphicsError> {
        match &*self.handle.lock() {
            Some(GpuHandle::Buffer(buffer)) => Ok(buffer.clone()),
            Some(GpuHandle::Texture(_)) => Err(GraphicsError::InvalidParameter(
                "resource is a texture, not a buffer".to_string(),
            )),
            None => Err(GraphicsError::ResourceDestroyed),
        }
    }

    /// Normal teardown: free owned allocations, forget wrapped ones.
    pub(crate) fn release_handle(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if self.lifecycle == Lifecycle::Wrapped {
            log::trace!("GpuResource {:?}: released wrapped handle", self.id);
            return;
        }
        match handle {
            GpuHandle::Texture(texture) => self.backend.destroy_texture(texture),
            GpuHandle::Buffer(buffer) => self.backend.destroy_buffer(buffer),
        }
        log::trace!("GpuResource {:?}: released", self.id);
    }

    /// Device-lost teardown: forget the handle without touching the backend.
    pub(crate) fn abandon_handle(&self) {
        if self.handle.lock().take().is_some() {
            log::trace!("GpuResource {:?}: abandoned", self.id);
        }
    }
}

impl Drop for GpuResource {
    fn drop(&mut self) {
        // Owned allocations still present were never torn down by a cache.
        self.release_handle();
    }
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.keys.read();
        f.debug_struct("GpuResource")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("lifecycle", &self.lifecycle)
            .field("budgeted", &keys.budgeted)
            .field("content_key", &keys.content_key)
            .field("scratch_key", &keys.scratch_key)
            .field("timestamp", &self.timestamp())
            .field("cache_index", &self.cache_index.get())
            .finish()
    }
}

static_assertions::assert_impl_all!(GpuResource: Send, Sync);
