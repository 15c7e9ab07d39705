//! GPU buffer resource and CPU mapping.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use crate::device::{GraphicsDevice, MapFlags};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferUsage};

use super::resource::{GpuResource, ResourceKind};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] or found in the
/// cache, and are cheap to clone.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::transfer(1280), true)?;
/// let mut mapping = buffer.map()?;
/// mapping.copy_from_slice(&pixels);
/// mapping.unmap()?;
/// ```
#[derive(Clone)]
pub struct Buffer {
    resource: Arc<GpuResource>,
    descriptor: BufferDescriptor,
    device: Weak<GraphicsDevice>,
}

impl Buffer {
    /// Wrap a cached resource, or `None` if it is not a buffer.
    pub(crate) fn from_resource(
        resource: Arc<GpuResource>,
        device: Weak<GraphicsDevice>,
    ) -> Option<Self> {
        let ResourceKind::Buffer(descriptor) = resource.kind() else {
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

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Whether a [`BufferMapping`] is currently outstanding.
    pub fn is_mapped(&self) -> bool {
        self.resource.mapped_flag().load(Ordering::Acquire)
    }

    /// Map the whole buffer for CPU writes.
    ///
    /// The mapping starts with the buffer's current contents. Changes reach
    /// the GPU when the mapping is unmapped or dropped.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot map buffers, the buffer lacks
    /// [`BufferUsage::MAP_WRITE`], it is already mapped, or its allocation is
    /// gone.
    pub fn map(&self) -> Result<BufferMapping<'_>, GraphicsError> {
        let backend = self.resource.backend();
        if !backend.capabilities().map_flags.contains(MapFlags::CAN_MAP) {
            return Err(GraphicsError::FeatureNotSupported(
                "device cannot map buffers".to_string(),
            ));
        }
        if !self.usage().contains(BufferUsage::MAP_WRITE) {
            return Err(GraphicsError::InvalidParameter(
                "buffer was not created with MAP_WRITE".to_string(),
            ));
        }

        let handle = self.resource.buffer_handle()?;
        if self
            .resource
            .mapped_flag()
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GraphicsError::InvalidParameter(
                "buffer is already mapped".to_string(),
            ));
        }

        match backend.read_buffer(&handle, 0, self.size()) {
            Ok(data) => {
                log::trace!("Buffer {:?}: mapped {} bytes", self.resource.id(), data.len());
                Ok(BufferMapping {
                    buffer: self,
                    data,
                    flushed: false,
                })
            }
            Err(e) => {
                self.resource.mapped_flag().store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}

impl Deref for Buffer {
    type Target = GpuResource;

    fn deref(&self) -> &GpuResource {
        &self.resource
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        super::notify_last_holder(&self.resource, &self.device);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.resource.id())
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

/// CPU view of a mapped [`Buffer`].
///
/// Dereferences to the buffer's bytes. Call [`unmap`](Self::unmap) to write
/// the contents back and observe errors; dropping the mapping writes back
/// too but only logs failures.
pub struct BufferMapping<'a> {
    buffer: &'a Buffer,
    data: Vec<u8>,
    flushed: bool,
}

impl BufferMapping<'_> {
    /// Write the mapped bytes back to the buffer and end the mapping.
    pub fn unmap(mut self) -> Result<(), GraphicsError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<(), GraphicsError> {
        self.flushed = true;
        let resource = &self.buffer.resource;
        let result = resource
            .buffer_handle()
            .and_then(|handle| resource.backend().write_buffer(&handle, 0, &self.data));
        resource.mapped_flag().store(false, Ordering::Release);
        log::trace!("Buffer {:?}: unmapped", resource.id());
        result
    }
}

impl Deref for BufferMapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for BufferMapping<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for BufferMapping<'_> {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush buffer mapping on drop: {}", e);
        }
    }
}
