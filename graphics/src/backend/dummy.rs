//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. Buffers and textures live in CPU
//! memory owned by the backend, so copies and readback behave like a real
//! device without requiring GPU hardware. Every driver-side destruction is
//! counted, which lets tests observe that the abandon path never reaches the
//! backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::transfer::BufferTextureCopyRegion;
use crate::types::{BufferDescriptor, PixelRect, TextureDescriptor, TextureFormat};

use super::{GpuBackend, GpuBuffer, GpuTexture};

/// Texture storage: physical rows, top-down.
#[derive(Debug)]
struct DummyTexture {
    width: u32,
    height: u32,
    block_size: u32,
    data: Vec<u8>,
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    capabilities: DeviceCapabilities,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    textures: Mutex<HashMap<u64, DummyTexture>>,
    destroy_calls: AtomicUsize,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    /// Create a dummy backend reporting the given capabilities.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            textures: Mutex::new(HashMap::new()),
            destroy_calls: AtomicUsize::new(0),
        }
    }

    /// Number of buffer allocations that have not been destroyed.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Number of texture allocations that have not been destroyed.
    pub fn live_texture_count(&self) -> usize {
        self.textures.lock().len()
    }

    /// Number of times a resource was returned to the driver.
    pub fn destroy_call_count(&self) -> usize {
        self.destroy_calls.load(Ordering::Acquire)
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "wgpu-backend")]
fn foreign_handle() -> GraphicsError {
    GraphicsError::InvalidParameter("handle does not belong to the dummy backend".to_string())
}

fn buffer_id(buffer: &GpuBuffer) -> Result<u64, GraphicsError> {
    match buffer {
        GpuBuffer::Dummy { id } => Ok(*id),
        #[cfg(feature = "wgpu-backend")]
        GpuBuffer::Wgpu { .. } => Err(foreign_handle()),
    }
}

fn texture_id(texture: &GpuTexture) -> Result<u64, GraphicsError> {
    match texture {
        GpuTexture::Dummy { id } => Ok(*id),
        #[cfg(feature = "wgpu-backend")]
        GpuTexture::Wgpu { .. } => Err(foreign_handle()),
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let id = self.allocate_id();
        self.buffers
            .lock()
            .insert(id, vec![0u8; descriptor.size as usize]);
        Ok(GpuBuffer::Dummy { id })
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        let block_size = descriptor.format.block_size();
        let len = descriptor.size.width as usize * descriptor.size.height as usize * block_size as usize;
        let id = self.allocate_id();
        self.textures.lock().insert(
            id,
            DummyTexture {
                width: descriptor.size.width,
                height: descriptor.size.height,
                block_size,
                data: vec![0u8; len],
            },
        );
        Ok(GpuTexture::Dummy { id })
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        if let Ok(id) = buffer_id(&buffer) {
            log::trace!("DummyBackend: destroying buffer {}", id);
            self.buffers.lock().remove(&id);
            self.destroy_calls.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        if let Ok(id) = texture_id(&texture) {
            log::trace!("DummyBackend: destroying texture {}", id);
            self.textures.lock().remove(&id);
            self.destroy_calls.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: write_buffer offset={} len={}",
            offset,
            data.len()
        );
        let id = buffer_id(buffer)?;
        let mut buffers = self.buffers.lock();
        let storage = buffers.get_mut(&id).ok_or(GraphicsError::ResourceDestroyed)?;
        let start = offset as usize;
        let Some(end) = start.checked_add(data.len()).filter(|&end| end <= storage.len()) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {} overruns buffer of {}",
                data.len(),
                offset,
                storage.len()
            )));
        };
        storage[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        log::trace!("DummyBackend: read_buffer offset={} size={}", offset, size);
        let id = buffer_id(buffer)?;
        let buffers = self.buffers.lock();
        let storage = buffers.get(&id).ok_or(GraphicsError::ResourceDestroyed)?;
        let start = offset as usize;
        start
            .checked_add(size as usize)
            .and_then(|end| storage.get(start..end))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| GraphicsError::InvalidParameter("read past end of buffer".to_string()))
    }

    fn copy_buffer_to_texture(
        &self,
        src: &GpuBuffer,
        dst: &GpuTexture,
        _format: TextureFormat,
        region: &BufferTextureCopyRegion,
    ) -> Result<(), GraphicsError> {
        let src_id = buffer_id(src)?;
        let dst_id = texture_id(dst)?;

        // Lock order: buffers before textures.
        let buffers = self.buffers.lock();
        let mut textures = self.textures.lock();
        let source = buffers.get(&src_id).ok_or(GraphicsError::ResourceDestroyed)?;
        let texture = textures
            .get_mut(&dst_id)
            .ok_or(GraphicsError::ResourceDestroyed)?;

        let rect = region.texture_rect;
        if !rect.fits_within(texture.width, texture.height) {
            return Err(GraphicsError::InvalidParameter(format!(
                "copy rectangle {rect:?} outside texture"
            )));
        }

        let block = texture.block_size as usize;
        let row_len = rect.width as usize * block;
        let layout = region.buffer_layout;
        let fits = layout
            .required_len(row_len as u64, rect.height)
            .is_some_and(|required| required <= source.len() as u64);
        if !fits {
            return Err(GraphicsError::InvalidParameter(
                "copy reads past end of buffer".to_string(),
            ));
        }

        log::trace!(
            "DummyBackend: copy_buffer_to_texture {:?} offset={} stride={}",
            rect,
            layout.offset,
            layout.bytes_per_row
        );

        let tex_stride = texture.width as usize * block;
        for row in 0..rect.height as usize {
            let src_start = layout.offset as usize + row * layout.bytes_per_row as usize;
            let dst_start = (rect.y as usize + row) * tex_stride + rect.x as usize * block;
            texture.data[dst_start..dst_start + row_len]
                .copy_from_slice(&source[src_start..src_start + row_len]);
        }
        Ok(())
    }

    fn read_texture(
        &self,
        src: &GpuTexture,
        _format: TextureFormat,
        rect: PixelRect,
    ) -> Result<Vec<u8>, GraphicsError> {
        let id = texture_id(src)?;
        let textures = self.textures.lock();
        let texture = textures.get(&id).ok_or(GraphicsError::ResourceDestroyed)?;
        if !rect.fits_within(texture.width, texture.height) {
            return Err(GraphicsError::InvalidParameter(format!(
                "read rectangle {rect:?} outside texture"
            )));
        }

        let block = texture.block_size as usize;
        let row_len = rect.width as usize * block;
        let tex_stride = texture.width as usize * block;
        let mut pixels = Vec::with_capacity(row_len * rect.height as usize);
        for row in 0..rect.height as usize {
            let start = (rect.y as usize + row) * tex_stride + rect.x as usize * block;
            pixels.extend_from_slice(&texture.data[start..start + row_len]);
        }
        Ok(pixels)
    }
}

// Ensure DummyBackend is Send + Sync
static_assertions::assert_impl_all!(DummyBackend: Send, Sync);
