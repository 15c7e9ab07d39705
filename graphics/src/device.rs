//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources.
//! It is created by [`GraphicsInstance::create_device`] and owns the
//! [`ResourceCache`] every resource it creates is tracked in.
//!
//! [`GraphicsInstance::create_device`]: crate::GraphicsInstance::create_device

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard};

use crate::backend::{GpuBackend, GpuTexture};
use crate::cache::{PurgeReport, ResourceCache, ResourceCacheConfig, TeardownSummary};
use crate::error::GraphicsError;
use crate::resources::{
    Buffer, ContentKey, GpuHandle, GpuResource, Lifecycle, ResourceKind, ScratchKey, Texture,
};
use crate::transfer;
use crate::types::{BufferDescriptor, ColorType, PixelRect, SurfaceOrigin, TextureDescriptor};

bitflags! {
    /// Buffer mapping support of a device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        /// Buffers can be mapped for CPU access.
        const CAN_MAP = 1 << 0;
        /// Subranges of a buffer can be mapped.
        const SUBSET = 1 << 1;
    }
}

impl Default for MapFlags {
    fn default() -> Self {
        Self::CAN_MAP
    }
}

/// Capabilities of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum texture dimension.
    pub max_texture_dimension: u32,
    /// Maximum buffer size.
    pub max_buffer_size: u64,
    /// Buffer mapping support.
    pub map_flags: MapFlags,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30, // 1 GB
            map_flags: MapFlags::default(),
        }
    }
}

/// A graphics device for creating GPU resources.
///
/// Every texture and buffer the device creates is inserted into its
/// [`ResourceCache`]. Scratch and content-keyed lookups consult the cache
/// before allocating.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. The cache sits behind a mutex.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new()?;
/// let device = instance.create_device()?;
///
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     16, 16,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
/// ), true)?;
/// let buffer = device.create_buffer(&BufferDescriptor::transfer(1280), true)?;
/// ```
pub struct GraphicsDevice {
    name: String,
    backend: Arc<dyn GpuBackend>,
    capabilities: DeviceCapabilities,
    cache: Mutex<ResourceCache>,
    // Last releases that found the cache locked.
    missed: Mutex<Vec<Weak<GpuResource>>>,
    lost: AtomicBool,
}

impl GraphicsDevice {
    /// Create a device on `backend` with the given cache limits.
    pub fn new(backend: Arc<dyn GpuBackend>, cache_config: ResourceCacheConfig) -> Arc<Self> {
        let capabilities = backend.capabilities();
        log::info!(
            "GraphicsDevice: created on {} ({:?})",
            backend.name(),
            capabilities
        );
        Arc::new(Self {
            name: backend.name().to_string(),
            backend,
            capabilities,
            cache: Mutex::new(ResourceCache::new(cache_config)),
            missed: Mutex::new(Vec::new()),
            lost: AtomicBool::new(false),
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Get the GPU backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Whether [`abandon`](Self::abandon) was called.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Lock the resource cache.
    ///
    /// Textures and buffers dropped while a guard is held are settled the
    /// next time the cache is locked.
    pub fn resource_cache(&self) -> MutexGuard<'_, ResourceCache> {
        self.lock_cache()
    }

    fn lock_cache(&self) -> MutexGuard<'_, ResourceCache> {
        let mut cache = self.cache.lock();
        self.flush_missed(&mut cache);
        cache
    }

    fn flush_missed(&self, cache: &mut ResourceCache) {
        let missed = std::mem::take(&mut *self.missed.lock());
        if missed.is_empty() {
            return;
        }
        log::trace!("GraphicsDevice: settling {} missed releases", missed.len());
        for resource in missed {
            cache.defer(resource);
        }
        cache.sweep_deferred();
    }

    fn check_alive(&self) -> Result<(), GraphicsError> {
        if self.is_lost() {
            return Err(GraphicsError::DeviceLost);
        }
        Ok(())
    }

    /// Create a GPU texture and track it in the cache.
    ///
    /// Budgeted textures count against the cache limits and become scratch,
    /// reusable by shape once nobody holds them.
    ///
    /// # Errors
    ///
    /// Returns an error if the device was lost, the texture dimensions
    /// exceed device limits, or allocation fails.
    pub fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
        budgeted: bool,
    ) -> Result<Texture, GraphicsError> {
        self.check_alive()?;

        // Validate
        let max_dim = self.capabilities.max_texture_dimension;
        if descriptor.size.width > max_dim
            || descriptor.size.height > max_dim
            || descriptor.size.depth > max_dim
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }

        if descriptor.size.width == 0 || descriptor.size.height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }

        let handle = self.backend.create_texture(descriptor)?;
        let resource = Arc::new(GpuResource::new(
            Arc::clone(&self.backend),
            ResourceKind::Texture(descriptor.clone()),
            GpuHandle::Texture(handle),
            Lifecycle::Owned,
            budgeted,
            Some(ScratchKey::for_texture(descriptor)),
        ));
        self.lock_cache().insert(Arc::clone(&resource));

        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}, budgeted={}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            budgeted
        );

        self.texture_from(resource)
    }

    /// Reuse an unused budgeted texture of the same shape, or create one.
    pub fn find_or_create_scratch_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
    ) -> Result<Texture, GraphicsError> {
        self.check_alive()?;
        let key = ScratchKey::for_texture(descriptor);
        let found = self.lock_cache().find_and_ref_scratch(&key);
        match found {
            Some(resource) => self.texture_from(resource),
            None => self.create_texture(descriptor, true),
        }
    }

    /// Create a GPU buffer and track it in the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the device was lost, the buffer size exceeds
    /// device limits or is zero, or allocation fails.
    pub fn create_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
        budgeted: bool,
    ) -> Result<Buffer, GraphicsError> {
        self.check_alive()?;

        // Validate
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let handle = self.backend.create_buffer(descriptor)?;
        let resource = Arc::new(GpuResource::new(
            Arc::clone(&self.backend),
            ResourceKind::Buffer(descriptor.clone()),
            GpuHandle::Buffer(handle),
            Lifecycle::Owned,
            budgeted,
            Some(ScratchKey::for_buffer(descriptor)),
        ));
        self.lock_cache().insert(Arc::clone(&resource));

        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}, budgeted={}",
            descriptor.label,
            descriptor.size,
            budgeted
        );

        self.buffer_from(resource)
    }

    /// Reuse an unused budgeted buffer of the same shape, or create one.
    pub fn find_or_create_scratch_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
    ) -> Result<Buffer, GraphicsError> {
        self.check_alive()?;
        let key = ScratchKey::for_buffer(descriptor);
        let found = self.lock_cache().find_and_ref_scratch(&key);
        match found {
            Some(resource) => self.buffer_from(resource),
            None => self.create_buffer(descriptor, true),
        }
    }

    /// Find the texture holding `key`.
    pub fn find_texture_by_content_key(self: &Arc<Self>, key: &ContentKey) -> Option<Texture> {
        let found = self.lock_cache().find_and_ref_content(key)?;
        Texture::from_resource(found, Arc::downgrade(self))
    }

    /// Find the buffer holding `key`.
    pub fn find_buffer_by_content_key(self: &Arc<Self>, key: &ContentKey) -> Option<Buffer> {
        let found = self.lock_cache().find_and_ref_content(key)?;
        Buffer::from_resource(found, Arc::downgrade(self))
    }

    /// Give a resource a content key. See [`ResourceCache::assign_content_key`].
    pub fn assign_content_key(&self, resource: &Arc<GpuResource>, key: ContentKey) -> bool {
        self.lock_cache().assign_content_key(resource, key)
    }

    /// Track a texture allocated outside this crate.
    ///
    /// Wrapped textures are never budgeted and their allocation is never
    /// freed here. Dropping the last [`Texture`] forgets the handle.
    pub fn wrap_backend_texture(
        self: &Arc<Self>,
        handle: GpuTexture,
        descriptor: &TextureDescriptor,
    ) -> Result<Texture, GraphicsError> {
        self.check_alive()?;
        let resource = Arc::new(GpuResource::new(
            Arc::clone(&self.backend),
            ResourceKind::Texture(descriptor.clone()),
            GpuHandle::Texture(handle),
            Lifecycle::Wrapped,
            false,
            None,
        ));
        self.lock_cache().insert(Arc::clone(&resource));
        log::trace!("GraphicsDevice: wrapped texture {:?}", descriptor.label);
        self.texture_from(resource)
    }

    /// Copy rows of pixels from `buffer` into `rect` of `texture`.
    ///
    /// Reads `rect.height` rows of `rect.width` pixels starting `offset`
    /// bytes into the buffer, advancing `row_bytes` per row. Returns `false`
    /// without touching the texture if the transfer is not possible; the
    /// reason is logged.
    pub fn transfer_pixels(
        &self,
        texture: &Texture,
        rect: PixelRect,
        color_type: ColorType,
        buffer: &Buffer,
        offset: u64,
        row_bytes: u64,
    ) -> bool {
        match self.try_transfer_pixels(texture, rect, color_type, buffer, offset, row_bytes) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("GraphicsDevice: transfer_pixels rejected: {}", e);
                false
            }
        }
    }

    fn try_transfer_pixels(
        &self,
        texture: &Texture,
        rect: PixelRect,
        color_type: ColorType,
        buffer: &Buffer,
        offset: u64,
        row_bytes: u64,
    ) -> Result<(), GraphicsError> {
        self.check_alive()?;
        if !self.capabilities.map_flags.contains(MapFlags::CAN_MAP) {
            return Err(GraphicsError::FeatureNotSupported(
                "device cannot map transfer buffers".to_string(),
            ));
        }

        let region = transfer::plan_upload(texture, rect, color_type, buffer, offset, row_bytes)?;
        let src = buffer.buffer_handle()?;
        let dst = texture.texture_handle()?;
        self.backend
            .copy_buffer_to_texture(&src, &dst, texture.format(), &region)?;

        log::trace!(
            "GraphicsDevice: transferred {:?} from buffer {:?} (offset={}, row_bytes={})",
            rect,
            buffer.id(),
            offset,
            row_bytes
        );
        Ok(())
    }

    /// Read `rect` of `texture` into `out`, top row first.
    ///
    /// With [`SurfaceOrigin::BottomLeft`] row `y` of the rectangle is the
    /// texture's physical row `height - 1 - y`. Each output row is
    /// `row_bytes` apart; bytes past the pixel data of a row are left as
    /// they were. Returns `false` on failure; the reason is logged.
    pub fn read_pixels(
        &self,
        texture: &Texture,
        origin: SurfaceOrigin,
        rect: PixelRect,
        color_type: ColorType,
        out: &mut [u8],
        row_bytes: u64,
    ) -> bool {
        match self.try_read_pixels(texture, origin, rect, color_type, out, row_bytes) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("GraphicsDevice: read_pixels failed: {}", e);
                false
            }
        }
    }

    fn try_read_pixels(
        &self,
        texture: &Texture,
        origin: SurfaceOrigin,
        rect: PixelRect,
        color_type: ColorType,
        out: &mut [u8],
        row_bytes: u64,
    ) -> Result<(), GraphicsError> {
        self.check_alive()?;
        let physical =
            transfer::plan_readback(texture, origin, rect, color_type, out.len(), row_bytes)?;
        let handle = texture.texture_handle()?;
        let data = self
            .backend
            .read_texture(&handle, texture.format(), physical)?;

        let row_len = rect.width as usize * color_type.bytes_per_pixel() as usize;
        let height = rect.height as usize;
        if data.len() != row_len * height {
            return Err(GraphicsError::Internal(format!(
                "backend returned {} bytes for {}x{} read",
                data.len(),
                rect.width,
                rect.height
            )));
        }
        transfer::place_rows(&data, row_len, height, origin, out, row_bytes as usize);
        Ok(())
    }

    /// Evict unused resources until within budget.
    pub fn purge_as_needed(&self) -> PurgeReport {
        self.lock_cache().purge_as_needed()
    }

    /// Tear down every unused resource.
    pub fn purge_all_unreferenced(&self) -> PurgeReport {
        self.lock_cache().purge_all_unreferenced()
    }

    /// Free every tracked resource.
    pub fn release_all(&self) -> TeardownSummary {
        self.lock_cache().release_all()
    }

    /// Treat the device as lost.
    ///
    /// All tracked resources are abandoned without backend calls, and every
    /// later creation fails with [`GraphicsError::DeviceLost`].
    pub fn abandon(&self) -> TeardownSummary {
        self.lost.store(true, Ordering::Release);
        log::warn!("GraphicsDevice: {} abandoned", self.name);
        self.lock_cache().abandon_all()
    }

    pub(crate) fn notify_ref_zeroed(&self, resource: &Arc<GpuResource>) {
        match self.cache.try_lock() {
            Some(mut cache) => {
                self.flush_missed(&mut cache);
                cache.notify_ref_zeroed(resource);
            }
            None => {
                self.missed.lock().push(Arc::downgrade(resource));
                log::trace!(
                    "GraphicsDevice: cache busy, {:?} recorded for the next cache access",
                    resource.id()
                );
            }
        }
    }

    fn texture_from(self: &Arc<Self>, resource: Arc<GpuResource>) -> Result<Texture, GraphicsError> {
        Texture::from_resource(resource, Arc::downgrade(self)).ok_or_else(|| {
            GraphicsError::Internal("cached resource is not a texture".to_string())
        })
    }

    fn buffer_from(self: &Arc<Self>, resource: Arc<GpuResource>) -> Result<Buffer, GraphicsError> {
        Buffer::from_resource(resource, Arc::downgrade(self))
            .ok_or_else(|| GraphicsError::Internal("cached resource is not a buffer".to_string()))
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("lost", &self.is_lost())
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::resources::KeyDomain;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    fn create_test_device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(backend.clone(), ResourceCacheConfig::default());
        (backend, device)
    }

    fn rgba_desc() -> TextureDescriptor {
        TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
        )
    }

    #[test]
    fn test_device_capabilities() {
        let (_, device) = create_test_device();
        let caps = device.capabilities();
        assert!(caps.max_texture_dimension >= 4096);
        assert!(caps.max_buffer_size >= 1 << 20);
        assert!(caps.map_flags.contains(MapFlags::CAN_MAP));
        assert_eq!(device.name(), "Dummy Backend");
    }

    #[test]
    fn test_create_texture_tracks_in_cache() {
        let (_, device) = create_test_device();
        let texture = device.create_texture(&rgba_desc(), true).unwrap();
        assert!(texture.is_scratch());
        assert_eq!(device.resource_cache().resource_count(), 1);
        assert_eq!(device.resource_cache().budgeted_bytes(), 16 * 16 * 4);
    }

    #[test]
    fn test_create_texture_zero_size_fails() {
        let (_, device) = create_test_device();
        let desc = TextureDescriptor::new_2d(0, 0, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST);
        assert!(device.create_texture(&desc, true).is_err());
    }

    #[test]
    fn test_create_buffer_zero_size_fails() {
        let (_, device) = create_test_device();
        let desc = BufferDescriptor::new(0, BufferUsage::VERTEX);
        assert!(device.create_buffer(&desc, true).is_err());
    }

    #[test]
    fn test_scratch_texture_reused_after_drop() {
        let (backend, device) = create_test_device();
        let texture = device.find_or_create_scratch_texture(&rgba_desc()).unwrap();
        let id = texture.id();
        drop(texture);
        assert_eq!(device.resource_cache().resource_count(), 1);

        let again = device.find_or_create_scratch_texture(&rgba_desc()).unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(backend.live_texture_count(), 1);

        // In use, so a second request allocates.
        let other = device.find_or_create_scratch_texture(&rgba_desc()).unwrap();
        assert_ne!(other.id(), id);
    }

    #[test]
    fn test_unbudgeted_texture_released_on_last_drop() {
        let (backend, device) = create_test_device();
        let texture = device.create_texture(&rgba_desc(), false).unwrap();
        let clone = texture.clone();
        drop(texture);
        assert_eq!(device.resource_cache().resource_count(), 1);
        drop(clone);
        assert_eq!(device.resource_cache().resource_count(), 0);
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_release_while_cache_locked_is_settled_later() {
        let (backend, device) = create_test_device();
        let texture = device.create_texture(&rgba_desc(), false).unwrap();
        let guard = device.resource_cache();
        drop(texture);
        assert_eq!(guard.resource_count(), 1);
        drop(guard);

        assert_eq!(device.resource_cache().resource_count(), 0);
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_content_key_lookup() {
        let (_, device) = create_test_device();
        let key = ContentKey::new(KeyDomain::generate(), &[42]);
        let texture = device.create_texture(&rgba_desc(), true).unwrap();
        assert!(device.assign_content_key(texture.resource(), key.clone()));
        let id = texture.id();
        drop(texture);

        let found = device.find_texture_by_content_key(&key).unwrap();
        assert_eq!(found.id(), id);
        assert!(device.find_buffer_by_content_key(&key).is_none());
    }

    #[test]
    fn test_wrapped_texture_never_freed() {
        let (backend, device) = create_test_device();
        let handle = backend.create_texture(&rgba_desc()).unwrap();
        let texture = device.wrap_backend_texture(handle, &rgba_desc()).unwrap();
        assert!(texture.is_wrapped());
        assert!(!texture.is_budgeted());
        drop(texture);
        assert_eq!(device.resource_cache().resource_count(), 0);
        assert_eq!(backend.live_texture_count(), 1);
        assert_eq!(backend.destroy_call_count(), 0);
    }

    #[test]
    fn test_abandon_blocks_creation() {
        let (backend, device) = create_test_device();
        let texture = device.create_texture(&rgba_desc(), true).unwrap();
        let summary = device.abandon();
        assert_eq!(summary.deferred, 1);
        assert!(device.is_lost());
        assert!(texture.was_destroyed());
        assert_eq!(
            device.create_texture(&rgba_desc(), true).unwrap_err(),
            GraphicsError::DeviceLost
        );
        drop(texture);
        assert_eq!(backend.destroy_call_count(), 0);
    }

    #[test]
    fn test_release_all() {
        let (backend, device) = create_test_device();
        device.create_texture(&rgba_desc(), true).unwrap();
        device
            .create_buffer(&BufferDescriptor::transfer(64), true)
            .unwrap();
        let summary = device.release_all();
        assert_eq!(summary.destroyed, 2);
        assert_eq!(backend.live_texture_count(), 0);
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_transfer_requires_map_support() {
        let backend = Arc::new(DummyBackend::with_capabilities(DeviceCapabilities {
            map_flags: MapFlags::empty(),
            ..Default::default()
        }));
        let device = GraphicsDevice::new(backend, ResourceCacheConfig::default());
        let texture = device.create_texture(&rgba_desc(), true).unwrap();
        let buffer = device
            .create_buffer(&BufferDescriptor::transfer(16 * 16 * 4), true)
            .unwrap();
        assert!(!device.transfer_pixels(
            &texture,
            PixelRect::from_size(16, 16),
            ColorType::Rgba8888,
            &buffer,
            0,
            64,
        ));
    }
}
