//! Common utilities for GPU integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across different backend implementations.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_gpu_resources::{
    BackendType, Buffer, BufferDescriptor, GraphicsDevice, GraphicsInstance, InstanceParameters,
    ResourceCacheConfig, SurfaceOrigin, Texture, TextureDescriptor, TextureFormat, TextureUsage,
};

pub const TEXTURE_WIDTH: u32 = 16;
pub const TEXTURE_HEIGHT: u32 = 16;
/// Buffer rows are wider than the texture so every row carries padding.
pub const BUFFER_WIDTH: u32 = 20;
pub const BUFFER_HEIGHT: u32 = 16;
pub const BYTES_PER_PIXEL: u64 = 4;
pub const ROW_BYTES: u64 = BUFFER_WIDTH as u64 * BYTES_PER_PIXEL;
pub const BUFFER_SIZE: u64 = ROW_BYTES * BUFFER_HEIGHT as u64;

/// Fill value for readback destinations, to detect untouched bytes.
pub const CANARY: u32 = 0xCDCD_CDCD;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (CPU memory).
    Dummy,
    /// wgpu backend on whatever adapter is present.
    Wgpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            // Dummy backend is always available
            Backend::Dummy => true,
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu => true,
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::Wgpu => false,
        }
    }

    /// Convert to InstanceParameters for creating a GraphicsInstance.
    pub fn to_instance_parameters(self) -> InstanceParameters {
        match self {
            Backend::Dummy => InstanceParameters::new().with_backend(BackendType::Dummy),
            Backend::Wgpu => InstanceParameters::new().with_backend(BackendType::Wgpu),
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context holding an instance and a device on one backend.
pub struct TestContext {
    pub backend: Backend,
    instance: Arc<GraphicsInstance>,
    pub device: Arc<GraphicsDevice>,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not available (not compiled in, or
    /// no adapter on this machine).
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_cache_config(backend, ResourceCacheConfig::default())
    }

    /// Like [`new`](Self::new) with custom cache limits.
    pub fn with_cache_config(backend: Backend, config: ResourceCacheConfig) -> Option<Self> {
        init_logging();
        if !backend.is_available() {
            return None;
        }

        let params = backend.to_instance_parameters().with_cache_config(config);
        let instance = GraphicsInstance::with_parameters(params).ok()?;
        let device = instance.create_device().ok()?;

        Some(Self {
            backend,
            instance,
            device,
        })
    }

    /// Create the 16x16 test texture.
    pub fn create_texture(&self, format: TextureFormat, render_target: bool) -> Texture {
        let mut usage = TextureUsage::COPY_DST | TextureUsage::COPY_SRC;
        usage |= if render_target {
            TextureUsage::RENDER_ATTACHMENT
        } else {
            TextureUsage::TEXTURE_BINDING
        };
        self.device
            .create_texture(
                &TextureDescriptor::new_2d(TEXTURE_WIDTH, TEXTURE_HEIGHT, format, usage)
                    .with_label("transfer target"),
                false,
            )
            .expect("Failed to create texture")
    }

    /// Create a mappable transfer buffer.
    pub fn create_transfer_buffer(&self, size: u64) -> Buffer {
        self.device
            .create_buffer(
                &BufferDescriptor::transfer(size).with_label("transfer buffer"),
                false,
            )
            .expect("Failed to create transfer buffer")
    }
}

/// Copy `pixels` into `buffer` through a mapping.
pub fn upload(buffer: &Buffer, pixels: &[u32]) {
    let mut mapping = buffer.map().expect("Failed to map buffer");
    mapping.copy_from_slice(bytemuck::cast_slice(pixels));
    mapping.unmap().expect("Failed to unmap buffer");
}

/// Pack a color so its bytes in memory are `r, g, b, a`.
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from_le_bytes([r, g, b, a])
}

/// Write a red-green gradient over a rectangle of a `buffer_width`-wide
/// pixel array. Red grows left to right, green top to bottom.
pub fn fill_transfer_data(
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    buffer_width: u32,
    data: &mut [u32],
) {
    for j in top..top + height {
        for i in left..left + width {
            let red = (256.0 * ((i - left) as f32 / width as f32)) as u32;
            let green = (256.0 * ((j - top) as f32 / height as f32)) as u32;
            data[(i + j * buffer_width) as usize] = pack_rgba(
                (red - (red >> 8)) as u8,
                (green - (green >> 8)) as u8,
                0xff,
                0xff,
            );
        }
    }
}

/// Compare the `width` x `height` corner of `src` with `dst`.
///
/// For a bottom-left origin, source row `j` must match destination row
/// `buffer_height - 1 - j`.
pub fn does_full_buffer_contain_correct_values(
    src: &[u32],
    dst: &[u32],
    width: u32,
    height: u32,
    buffer_width: u32,
    buffer_height: u32,
    origin: SurfaceOrigin,
) -> bool {
    let row = |r: u32| (r * buffer_width) as usize;
    (0..height).all(|j| {
        let dst_row = match origin {
            SurfaceOrigin::TopLeft => j,
            SurfaceOrigin::BottomLeft => buffer_height - 1 - j,
        };
        let src_start = row(j);
        let dst_start = row(dst_row);
        src[src_start..src_start + width as usize] == dst[dst_start..dst_start + width as usize]
    })
}

/// Whether every pixel past `width` in each of `height` rows still holds the canary.
pub fn row_padding_untouched(dst: &[u32], width: u32, height: u32, buffer_width: u32) -> bool {
    (0..height).all(|j| {
        let start = (j * buffer_width) as usize;
        dst[start + width as usize..start + buffer_width as usize]
            .iter()
            .all(|&p| p == CANARY)
    })
}
