//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`GpuResource`] - shared, cache-tracked state of any GPU allocation
//! - [`Texture`] - GPU texture/image
//! - [`Buffer`] - GPU memory buffer, mappable for pixel transfers
//! - [`ContentKey`] / [`ScratchKey`] - the two ways the cache finds a resource
//!
//! Resources are reference-counted with [`Arc`] and can be shared across threads.
//! The [`ResourceCache`] keeps one reference to each resource it tracks; typed
//! holders keep a weak reference back to their parent device.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`ResourceCache`]: crate::cache::ResourceCache
//! [`Arc`]: std::sync::Arc

mod buffer;
mod cache_access;
mod keys;
mod resource;
mod texture;

use std::sync::{Arc, Weak};

use crate::device::GraphicsDevice;

pub use buffer::{Buffer, BufferMapping};
pub use cache_access::Teardown;
pub use keys::{ContentKey, KeyDomain, ResourceId, ScratchKey};
pub use resource::{CacheIndex, GpuResource, Lifecycle, ResourceKind};
pub use texture::Texture;

pub(crate) use resource::GpuHandle;

#[cfg(test)]
pub(crate) use resource::tests::texture_resource;

/// Tell the device's cache when a typed holder is the last one outside it.
fn notify_last_holder(resource: &Arc<GpuResource>, device: &Weak<GraphicsDevice>) {
    // One reference for the cache, one for the holder being dropped.
    if Arc::strong_count(resource) != 2 || resource.cache_index().get().is_none() {
        return;
    }
    if let Some(device) = device.upgrade() {
        device.notify_ref_zeroed(resource);
    }
}
