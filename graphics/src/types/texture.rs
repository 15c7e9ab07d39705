//! Texture formats, CPU color types and texture descriptors.

use super::Extent3d;
use bitflags::bitflags;

/// Pixel format of a texture.
///
/// Only formats with a [`ColorType`] can take part in pixel transfers; the
/// rest exist so the cache can track render targets and depth buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    R8Uint,
    R16Float,
    Rg8Unorm,
    R32Float,
    #[default]
    Rgba8Unorm,
    /// Same bytes as [`Rgba8Unorm`](Self::Rgba8Unorm), sampled as sRGB.
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth16Unorm,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TextureFormat {
    /// Depth or depth-stencil.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm | Self::Depth24PlusStencil8 | Self::Depth32Float
        )
    }

    /// sRGB-encoded color.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }

    /// Bytes per texel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm | Self::R8Uint => 1,
            Self::R16Float | Self::Rg8Unorm | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// The CPU-side color type whose bytes map 1:1 onto this format.
    ///
    /// Returns `None` for formats that cannot be filled from a mapped
    /// transfer buffer (depth/stencil and packed formats without a matching
    /// color type).
    pub fn color_type(&self) -> Option<ColorType> {
        match self {
            Self::R8Unorm => Some(ColorType::Alpha8),
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb => Some(ColorType::Rgba8888),
            Self::Bgra8Unorm | Self::Bgra8UnormSrgb => Some(ColorType::Bgra8888),
            Self::Rgba16Float => Some(ColorType::RgbaF16),
            Self::Rgba32Float => Some(ColorType::RgbaF32),
            _ => None,
        }
    }
}

/// Channel layout of CPU-side pixel data.
///
/// Transfers copy bytes verbatim, so a color type is only accepted for a
/// texture whose format reports the same type from
/// [`TextureFormat::color_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorType {
    /// Single 8-bit channel.
    Alpha8,
    /// 8-bit channels in R, G, B, A byte order.
    Rgba8888,
    /// 8-bit channels in B, G, R, A byte order.
    Bgra8888,
    /// 16-bit float channels in R, G, B, A order.
    RgbaF16,
    /// 32-bit float channels in R, G, B, A order.
    RgbaF32,
}

impl ColorType {
    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Alpha8 => 1,
            Self::Rgba8888 | Self::Bgra8888 => 4,
            Self::RgbaF16 => 8,
            Self::RgbaF32 => 16,
        }
    }
}

bitflags! {
    /// Texture usages. Uploads need `COPY_DST`, readback needs `COPY_SRC`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const STORAGE_BINDING = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Shape of a texture to create. Everything except the label goes into the
/// texture's scratch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub size: Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Single-sampled 2D texture without mips.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Bytes of GPU memory this texture occupies, including its mip chain
    /// and all samples.
    pub fn memory_size(&self) -> u64 {
        let block = u64::from(self.format.block_size());
        let layers = u64::from(self.size.depth.max(1));
        let samples = u64::from(self.sample_count.max(1));

        let mut width = u64::from(self.size.width);
        let mut height = u64::from(self.size.height);
        let mut total = 0u64;
        for _ in 0..self.mip_level_count.max(1) {
            total += width * height * block;
            width = (width / 2).max(1);
            height = (height / 2).max(1);
        }
        total * layers * samples
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            mip_level_count: 1,
            sample_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_type_matches_format() {
        assert_eq!(
            TextureFormat::Rgba8UnormSrgb.color_type(),
            Some(ColorType::Rgba8888)
        );
        assert_eq!(
            TextureFormat::Bgra8Unorm.color_type(),
            Some(ColorType::Bgra8888)
        );
        assert_eq!(TextureFormat::Depth32Float.color_type(), None);
    }

    #[test]
    fn test_color_type_size_matches_block_size() {
        for format in [
            TextureFormat::R8Unorm,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float,
        ] {
            let color_type = format.color_type().unwrap();
            assert_eq!(color_type.bytes_per_pixel(), format.block_size());
        }
    }

    #[test]
    fn test_memory_size_with_mips() {
        let desc = TextureDescriptor::new_2d(
            4,
            4,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        )
        .with_mip_levels(3);
        // 4x4 + 2x2 + 1x1 pixels
        assert_eq!(desc.memory_size(), (16 + 4 + 1) * 4);
    }

    #[test]
    fn test_memory_size_multisampled() {
        let desc = TextureDescriptor::new_2d(
            8,
            8,
            TextureFormat::Bgra8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        )
        .with_sample_count(4);
        assert_eq!(desc.memory_size(), 8 * 8 * 4 * 4);
    }
}
