//! GPU texture resource.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::device::GraphicsDevice;
use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

use super::resource::{GpuResource, ResourceKind};

/// A GPU texture resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`] or found in the
/// cache, and are cheap to clone. When the last clone is dropped the cache is
/// notified; budgeted textures stay resident for reuse until evicted.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     16, 16,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
/// ), true)?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
#[derive(Clone)]
pub struct Texture {
    resource: Arc<GpuResource>,
    descriptor: TextureDescriptor,
    device: Weak<GraphicsDevice>,
}

impl Texture {
    /// Wrap a cached resource, or `None` if it is not a texture.
    pub(crate) fn from_resource(
        resource: Arc<GpuResource>,
        device: Weak<GraphicsDevice>,
    ) -> Option<Self> {
        let ResourceKind::Texture(descriptor) = resource.kind() else {
            return None;
        };
        let descriptor = descriptor.clone();
        Some(Self {
            resource,
            descriptor,
            device,
        })
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.device.upgrade()
    }

    /// The shared resource state.
    pub fn resource(&self) -> &Arc<GpuResource> {
        &self.resource
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the texture usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }
}

impl Deref for Texture {
    type Target = GpuResource;

    fn deref(&self) -> &GpuResource {
        &self.resource
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        super::notify_last_holder(&self.resource, &self.device);
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.resource.id())
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::resources::resource::Lifecycle;
    use crate::resources::resource::tests::texture_resource;

    #[test]
    fn test_texture_accessors() {
        let backend = Arc::new(DummyBackend::new());
        let resource = texture_resource(&backend, Lifecycle::Owned, true);
        let texture = Texture::from_resource(resource, Weak::new()).unwrap();
        assert_eq!(texture.width(), 16);
        assert_eq!(texture.height(), 16);
        assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
        assert!(texture.usage().contains(TextureUsage::COPY_DST));
        assert!(texture.device().is_none());
        assert!(format!("{:?}", texture).contains("Texture"));
    }
}
