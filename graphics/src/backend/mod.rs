//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction for GPU backends,
//! allowing the resource cache and the transfer protocol to work with
//! different GPU APIs.
//!
//! # Available Backends
//!
//! - `dummy` (always available): CPU-memory backend for testing and development
//! - `wgpu-backend`: Cross-platform backend using wgpu
//!
//! # Architecture
//!
//! Each backend implements the [`GpuBackend`] trait, which provides:
//! - Resource creation and destruction (buffers, textures)
//! - Buffer writes and reads used by the mapping protocol
//! - Buffer-to-texture copies and texture readback

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod dummy;

use std::sync::Arc;

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::transfer::BufferTextureCopyRegion;
use crate::types::{BufferDescriptor, PixelRect, TextureDescriptor, TextureFormat};

pub use dummy::DummyBackend;

/// Handle to a GPU buffer allocation.
#[derive(Clone)]
pub enum GpuBuffer {
    /// Dummy backend allocation (CPU memory owned by the backend).
    Dummy {
        /// Allocation id within the owning [`DummyBackend`].
        id: u64,
    },
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        /// The wgpu buffer. Its size is rounded up to the copy alignment.
        buffer: Arc<wgpu::Buffer>,
        /// Size requested by the descriptor.
        size: u64,
    },
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => f.debug_struct("GpuBuffer::Dummy").field("id", id).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { buffer, size } => f
                .debug_struct("GpuBuffer::Wgpu")
                .field("buffer", buffer)
                .field("size", size)
                .finish(),
        }
    }
}

/// Handle to a GPU texture allocation.
#[derive(Clone)]
pub enum GpuTexture {
    /// Dummy backend allocation (CPU memory owned by the backend).
    Dummy {
        /// Allocation id within the owning [`DummyBackend`].
        id: u64,
    },
    /// wgpu backend texture
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        /// The wgpu texture.
        texture: Arc<wgpu::Texture>,
        /// Default view of the texture.
        view: Arc<wgpu::TextureView>,
    },
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id } => f
                .debug_struct("GpuTexture::Dummy")
                .field("id", id)
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { texture, view } => f
                .debug_struct("GpuTexture::Wgpu")
                .field("texture", texture)
                .field("view", view)
                .finish(),
        }
    }
}

/// GPU backend trait for abstracting different GPU APIs.
///
/// All methods are called from the thread that owns the device. Copies and
/// reads complete before returning, so a read issued after a copy observes
/// the copied data.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Capabilities of the underlying device.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Create a texture resource.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError>;

    /// Return a buffer allocation to the driver.
    fn destroy_buffer(&self, buffer: GpuBuffer);

    /// Return a texture allocation to the driver.
    fn destroy_texture(&self, texture: GpuTexture);

    /// Write data to a buffer.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Read data from a buffer.
    ///
    /// This is a blocking operation that waits for the GPU to finish.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64)
    -> Result<Vec<u8>, GraphicsError>;

    /// Copy rows of pixels from a buffer into a physical rectangle of a
    /// texture. Pixels outside the rectangle are left untouched.
    fn copy_buffer_to_texture(
        &self,
        src: &GpuBuffer,
        dst: &GpuTexture,
        format: TextureFormat,
        region: &BufferTextureCopyRegion,
    ) -> Result<(), GraphicsError>;

    /// Read a physical rectangle of a texture as tightly packed rows, first
    /// physical row first.
    fn read_texture(
        &self,
        src: &GpuTexture,
        format: TextureFormat,
        rect: PixelRect,
    ) -> Result<Vec<u8>, GraphicsError>;
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Use the best available backend, falling back to the dummy backend.
    #[default]
    Auto,
    /// CPU-memory dummy backend.
    Dummy,
    /// wgpu backend. Fails if no adapter is available.
    Wgpu,
}

/// Selects and creates the requested backend.
pub fn create_backend(backend_type: BackendType) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match backend_type {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(DummyBackend::new()))
        }
        BackendType::Wgpu => create_wgpu_backend(),
        BackendType::Auto => match create_wgpu_backend() {
            Ok(backend) => Ok(backend),
            Err(e) => {
                log::warn!("Failed to create wgpu backend: {}", e);
                log::info!("Using dummy backend");
                Ok(Arc::new(DummyBackend::new()))
            }
        },
    }
}

#[cfg(feature = "wgpu-backend")]
fn create_wgpu_backend() -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    let backend = wgpu_backend::WgpuBackend::new()?;
    log::info!("Using wgpu backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "wgpu-backend"))]
fn create_wgpu_backend() -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    Err(GraphicsError::FeatureNotSupported(
        "wgpu backend not compiled in".to_string(),
    ))
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}
