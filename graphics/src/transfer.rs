//! Pixel transfer protocol.
//!
//! Moves a rectangle of CPU pixel data into a texture through a mapped
//! transfer buffer, and reads rectangles back for verification:
//!
//! 1. Map a [`Buffer`] created with [`BufferUsage::TRANSFER_SRC`], write the
//!    pixels, unmap.
//! 2. [`GraphicsDevice::transfer_pixels`] copies `height` rows of `width`
//!    pixels starting at a byte offset, advancing `row_bytes` per row, into
//!    the texture at `(x, y)`.
//! 3. [`GraphicsDevice::read_pixels`] reads a rectangle back top-down,
//!    honouring the surface origin.
//!
//! Row strides may exceed the pixel width. Bytes past `width * bpp` in a row
//! are never read on upload and never written on readback.
//!
//! [`Buffer`]: crate::resources::Buffer
//! [`BufferUsage::TRANSFER_SRC`]: crate::types::BufferUsage::TRANSFER_SRC
//! [`GraphicsDevice::transfer_pixels`]: crate::GraphicsDevice::transfer_pixels
//! [`GraphicsDevice::read_pixels`]: crate::GraphicsDevice::read_pixels

use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::types::{BufferUsage, ColorType, PixelRect, SurfaceOrigin, TextureUsage};

/// Layout of pixel rows inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferTextureLayout {
    /// Offset in bytes from the start of the buffer to the first pixel.
    pub offset: u64,
    /// Distance in bytes between the starts of consecutive rows.
    pub bytes_per_row: u64,
}

impl BufferTextureLayout {
    /// Create a new buffer texture layout.
    pub fn new(offset: u64, bytes_per_row: u64) -> Self {
        Self {
            offset,
            bytes_per_row,
        }
    }

    /// Bytes of buffer needed to hold `height` rows of `row_len` bytes, or
    /// `None` if that does not fit in a `u64`.
    pub fn required_len(&self, row_len: u64, height: u32) -> Option<u64> {
        if height == 0 {
            return Some(self.offset);
        }
        u64::from(height - 1)
            .checked_mul(self.bytes_per_row)?
            .checked_add(row_len)?
            .checked_add(self.offset)
    }

    fn checked_required_len(&self, row_len: u64, height: u32) -> Result<u64, GraphicsError> {
        self.required_len(row_len, height).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "offset {} with row stride {} overflows for {height} rows",
                self.offset, self.bytes_per_row
            ))
        })
    }
}

/// Buffer to texture copy region.
///
/// `texture_rect` is in physical (top-down) texture rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTextureCopyRegion {
    /// Layout of data in the buffer.
    pub buffer_layout: BufferTextureLayout,
    /// Destination rectangle in the texture.
    pub texture_rect: PixelRect,
}

impl BufferTextureCopyRegion {
    /// Create a new buffer-texture copy region.
    pub fn new(buffer_layout: BufferTextureLayout, texture_rect: PixelRect) -> Self {
        Self {
            buffer_layout,
            texture_rect,
        }
    }
}

/// Check that `color_type` can be moved byte-for-byte into `texture`.
fn check_color_type(texture: &Texture, color_type: ColorType) -> Result<(), GraphicsError> {
    let format = texture.format();
    if format.color_type() != Some(color_type) {
        return Err(GraphicsError::FeatureNotSupported(format!(
            "color type {color_type:?} cannot be transferred to {format:?}"
        )));
    }
    Ok(())
}

fn check_rect(texture: &Texture, rect: &PixelRect) -> Result<(), GraphicsError> {
    if rect.is_empty() || !rect.fits_within(texture.width(), texture.height()) {
        return Err(GraphicsError::InvalidParameter(format!(
            "rectangle {rect:?} outside {}x{} texture",
            texture.width(),
            texture.height()
        )));
    }
    Ok(())
}

fn check_row_bytes(rect: &PixelRect, color_type: ColorType, row_bytes: u64) -> Result<u64, GraphicsError> {
    let row_len = u64::from(rect.width) * u64::from(color_type.bytes_per_pixel());
    if row_bytes < row_len {
        return Err(GraphicsError::InvalidParameter(format!(
            "row stride {row_bytes} shorter than row of {row_len} bytes"
        )));
    }
    Ok(row_len)
}

/// Validate an upload and build the backend copy region.
pub(crate) fn plan_upload(
    texture: &Texture,
    rect: PixelRect,
    color_type: ColorType,
    buffer: &Buffer,
    offset: u64,
    row_bytes: u64,
) -> Result<BufferTextureCopyRegion, GraphicsError> {
    check_color_type(texture, color_type)?;
    check_rect(texture, &rect)?;

    if !texture.usage().contains(TextureUsage::COPY_DST) {
        return Err(GraphicsError::FeatureNotSupported(
            "texture was not created with COPY_DST".to_string(),
        ));
    }
    if !buffer.usage().contains(BufferUsage::COPY_SRC) {
        return Err(GraphicsError::FeatureNotSupported(
            "buffer was not created with COPY_SRC".to_string(),
        ));
    }
    if buffer.is_mapped() {
        return Err(GraphicsError::InvalidParameter(
            "buffer is still mapped".to_string(),
        ));
    }

    let row_len = check_row_bytes(&rect, color_type, row_bytes)?;
    let layout = BufferTextureLayout::new(offset, row_bytes);
    let required = layout.checked_required_len(row_len, rect.height)?;
    if required > buffer.size() {
        return Err(GraphicsError::InvalidParameter(format!(
            "transfer needs {required} bytes but buffer holds {}",
            buffer.size()
        )));
    }

    Ok(BufferTextureCopyRegion::new(layout, rect))
}

/// Validate a readback and return the physical rectangle to read.
pub(crate) fn plan_readback(
    texture: &Texture,
    origin: SurfaceOrigin,
    rect: PixelRect,
    color_type: ColorType,
    out_len: usize,
    row_bytes: u64,
) -> Result<PixelRect, GraphicsError> {
    check_color_type(texture, color_type)?;
    check_rect(texture, &rect)?;

    if !texture.usage().contains(TextureUsage::COPY_SRC) {
        return Err(GraphicsError::FeatureNotSupported(
            "texture was not created with COPY_SRC".to_string(),
        ));
    }

    let row_len = check_row_bytes(&rect, color_type, row_bytes)?;
    let required =
        BufferTextureLayout::new(0, row_bytes).checked_required_len(row_len, rect.height)?;
    if required > out_len as u64 {
        return Err(GraphicsError::InvalidParameter(format!(
            "readback needs {required} bytes but output holds {out_len}"
        )));
    }

    Ok(rect.to_physical(origin, texture.height()))
}

/// Copy tightly packed physical rows into `out` in logical top-down order.
///
/// `physical` holds `height` rows of `row_len` bytes, first physical row
/// first. For a bottom-left origin the row order is reversed so that logical
/// row 0 of the rectangle lands at the start of `out`. Bytes of `out` past
/// `row_len` within each stride are left as they were.
pub(crate) fn place_rows(
    physical: &[u8],
    row_len: usize,
    height: usize,
    origin: SurfaceOrigin,
    out: &mut [u8],
    row_bytes: usize,
) {
    for logical in 0..height {
        let source_row = match origin {
            SurfaceOrigin::TopLeft => logical,
            SurfaceOrigin::BottomLeft => height - 1 - logical,
        };
        let src = &physical[source_row * row_len..(source_row + 1) * row_len];
        let dst_start = logical * row_bytes;
        out[dst_start..dst_start + row_len].copy_from_slice(src);
    }
}
