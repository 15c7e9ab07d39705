//! # RedLilium GPU Resources
//!
//! GPU resource lifetime management and pixel transfers for RedLilium.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ResourceCache`] - Budgeted cache of GPU resources with LRU eviction,
//!   scratch/content-key reuse, and release vs. abandon teardown
//! - [`GraphicsDevice`] - Creates textures and buffers through the cache and
//!   runs the pixel transfer protocol ([`GraphicsDevice::transfer_pixels`],
//!   [`GraphicsDevice::read_pixels`])
//! - [`GpuBackend`] - Trait for backend implementations: wgpu, and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_gpu_resources::*;
//!
//! let instance = GraphicsInstance::new()?;
//! let device = instance.create_device()?;
//!
//! let texture = device.create_texture(&TextureDescriptor::new_2d(
//!     16, 16, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
//! ), true)?;
//! let buffer = device.create_buffer(&BufferDescriptor::transfer(16 * 16 * 4), true)?;
//!
//! let mut mapping = buffer.map()?;
//! mapping.copy_from_slice(&pixels);
//! mapping.unmap()?;
//!
//! assert!(device.transfer_pixels(
//!     &texture, PixelRect::from_size(16, 16), ColorType::Rgba8888, &buffer, 0, 64,
//! ));
//! ```

pub mod backend;
pub mod cache;
pub mod device;
pub mod error;
pub mod instance;
pub mod resources;
pub mod transfer;
pub mod types;

// Re-export main types for convenience
pub use backend::{BackendType, DummyBackend, GpuBackend, GpuBuffer, GpuTexture};
pub use cache::{
    CacheStats, PurgeReport, ResourceCache, ResourceCacheConfig, TeardownMode, TeardownSummary,
};
pub use device::{DeviceCapabilities, GraphicsDevice, MapFlags};
pub use error::GraphicsError;
pub use instance::{GraphicsInstance, InstanceParameters};
pub use resources::{
    Buffer, BufferMapping, ContentKey, GpuResource, KeyDomain, Lifecycle, ResourceId,
    ResourceKind, ScratchKey, Teardown, Texture,
};
pub use types::{
    BufferDescriptor, BufferUsage, ColorType, Extent3d, PixelRect, SurfaceOrigin,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("RedLilium GPU Resources v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert!(backend.name() == "Dummy Backend");
    }
}
