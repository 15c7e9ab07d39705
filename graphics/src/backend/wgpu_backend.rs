//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12, and WebGPU.
//!
//! Buffer mapping is emulated with queue writes and staging readback, so
//! buffers never carry wgpu's `MAP_*` usages and can always act as copy
//! sources.

use std::sync::Arc;
use std::time::Duration;

use crate::device::{DeviceCapabilities, MapFlags};
use crate::error::GraphicsError;
use crate::transfer::BufferTextureCopyRegion;
use crate::types::{
    BufferDescriptor, BufferUsage, PixelRect, TextureDescriptor, TextureFormat, TextureUsage,
};

use super::{GpuBackend, GpuBuffer, GpuTexture};

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend.
    pub fn new() -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("No compatible GPU adapter: {e}"))
        })?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("RedLilium Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e| GraphicsError::InitializationFailed(format!("Device creation failed: {e}")))?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) {
        let idx = self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(idx),
            timeout: Some(WAIT_TIMEOUT),
        });
    }

    /// Map a `MAP_READ` staging buffer and copy its contents out.
    fn map_staging(&self, staging: &wgpu::Buffer) -> Result<Vec<u8>, GraphicsError> {
        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GraphicsError::Internal(format!("buffer map failed: {e}"))),
            Err(_) => return Err(GraphicsError::DeviceLost),
        }

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    fn create_staging(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn wgpu_buffer(buffer: &GpuBuffer) -> Result<&Arc<wgpu::Buffer>, GraphicsError> {
    match buffer {
        GpuBuffer::Wgpu { buffer, .. } => Ok(buffer),
        GpuBuffer::Dummy { .. } => Err(GraphicsError::InvalidParameter(
            "handle does not belong to the wgpu backend".to_string(),
        )),
    }
}

fn wgpu_texture(texture: &GpuTexture) -> Result<&Arc<wgpu::Texture>, GraphicsError> {
    match texture {
        GpuTexture::Wgpu { texture, .. } => Ok(texture),
        GpuTexture::Dummy { .. } => Err(GraphicsError::InvalidParameter(
            "handle does not belong to the wgpu backend".to_string(),
        )),
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let limits = self.device.limits();
        DeviceCapabilities {
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_buffer_size: limits.max_buffer_size,
            map_flags: MapFlags::CAN_MAP | MapFlags::SUBSET,
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: align_to(descriptor.size.max(1), wgpu::COPY_BUFFER_ALIGNMENT),
            usage: convert_buffer_usage(descriptor.usage),
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu {
            buffer: Arc::new(buffer),
            size: descriptor.size,
        })
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        let format = convert_texture_format(descriptor.format);
        let usage = convert_texture_usage(descriptor.usage);

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth_or_array_layers: descriptor.size.depth,
            },
            mip_level_count: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(GpuTexture::Wgpu {
            texture: Arc::new(texture),
            view: Arc::new(view),
        })
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        if let GpuBuffer::Wgpu { buffer, .. } = buffer {
            buffer.destroy();
        }
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        if let GpuTexture::Wgpu { texture, .. } = texture {
            texture.destroy();
        }
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let wgpu_buffer = wgpu_buffer(buffer)?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer write offset {offset} is not 4-byte aligned"
            )));
        }

        // Queue writes must cover whole 4-byte words.
        let padded_len = align_to(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT) as usize;
        if offset
            .checked_add(padded_len as u64)
            .is_none_or(|end| end > wgpu_buffer.size())
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {offset} overruns buffer",
                data.len()
            )));
        }
        if padded_len == data.len() {
            self.queue.write_buffer(wgpu_buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len, 0);
            self.queue.write_buffer(wgpu_buffer, offset, &padded);
        }
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let wgpu_buffer = wgpu_buffer(buffer)?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer read offset {offset} is not 4-byte aligned"
            )));
        }
        let copy_size = align_to(size, wgpu::COPY_BUFFER_ALIGNMENT);
        if offset
            .checked_add(copy_size)
            .is_none_or(|end| end > wgpu_buffer.size())
        {
            return Err(GraphicsError::InvalidParameter(
                "read past end of buffer".to_string(),
            ));
        }
        if copy_size == 0 {
            return Ok(Vec::new());
        }

        let staging = self.create_staging(
            "Read Staging Buffer",
            copy_size,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Read Buffer Encoder"),
            });
        encoder.copy_buffer_to_buffer(wgpu_buffer, offset, &staging, 0, copy_size);
        self.submit_and_wait(encoder);

        let mut data = self.map_staging(&staging)?;
        data.truncate(size as usize);
        Ok(data)
    }

    fn copy_buffer_to_texture(
        &self,
        src: &GpuBuffer,
        dst: &GpuTexture,
        format: TextureFormat,
        region: &BufferTextureCopyRegion,
    ) -> Result<(), GraphicsError> {
        let src_buffer = wgpu_buffer(src)?;
        let dst_texture = wgpu_texture(dst)?;

        let block_size = u64::from(format.block_size());
        let rect = region.texture_rect;
        let layout = region.buffer_layout;
        let row_len = u64::from(rect.width) * block_size;
        let row_alignment = u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Transfer Pixels Encoder"),
            });

        // wgpu requires 256-byte aligned rows. Unaligned strides are first
        // repacked row by row into an aligned scratch buffer.
        let repacked;
        let (source, offset, bytes_per_row) =
            if layout.bytes_per_row % row_alignment == 0 && layout.offset % block_size == 0 {
                (src_buffer.as_ref(), layout.offset, layout.bytes_per_row)
            } else {
                let align = wgpu::COPY_BUFFER_ALIGNMENT;
                if row_len % align != 0 || layout.bytes_per_row % align != 0 || layout.offset % align != 0 {
                    return Err(GraphicsError::FeatureNotSupported(format!(
                        "unaligned transfer (offset {}, stride {}, row {row_len})",
                        layout.offset, layout.bytes_per_row
                    )));
                }

                let aligned_row = align_to(row_len, row_alignment);
                repacked = self.create_staging(
                    "Transfer Repack Buffer",
                    aligned_row * u64::from(rect.height),
                    wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                );
                for row in 0..u64::from(rect.height) {
                    encoder.copy_buffer_to_buffer(
                        src_buffer,
                        layout.offset + row * layout.bytes_per_row,
                        &repacked,
                        row * aligned_row,
                        row_len,
                    );
                }
                (&repacked, 0, aligned_row)
            };

        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: source,
                layout: wgpu::TexelCopyBufferLayout {
                    offset,
                    bytes_per_row: Some(bytes_per_row as u32),
                    rows_per_image: None,
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: dst_texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );

        self.submit_and_wait(encoder);
        Ok(())
    }

    fn read_texture(
        &self,
        src: &GpuTexture,
        format: TextureFormat,
        rect: PixelRect,
    ) -> Result<Vec<u8>, GraphicsError> {
        let src_texture = wgpu_texture(src)?;

        let row_len = u64::from(rect.width) * u64::from(format.block_size());
        let aligned_row = align_to(row_len, u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT));
        let staging = self.create_staging(
            "Readback Staging Buffer",
            aligned_row * u64::from(rect.height),
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Read Pixels Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: src_texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_row as u32),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.submit_and_wait(encoder);

        let padded = self.map_staging(&staging)?;
        let row_len = row_len as usize;
        let mut pixels = Vec::with_capacity(row_len * rect.height as usize);
        for row in padded.chunks(aligned_row as usize).take(rect.height as usize) {
            pixels.extend_from_slice(&row[..row_len]);
        }
        Ok(pixels)
    }
}

// Mapping is emulated, so MAP_READ/MAP_WRITE never reach wgpu.
fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= wgpu::BufferUsages::STORAGE;
    }

    result
}

fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        // 8-bit formats
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::R8Uint => wgpu::TextureFormat::R8Uint,

        // 16-bit formats
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,

        // 32-bit formats
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,

        // 64-bit formats
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,

        // 128-bit formats
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,

        // Depth/stencil formats
        TextureFormat::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        result |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }

    result
}
