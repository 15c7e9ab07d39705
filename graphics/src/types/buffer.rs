//! Buffer descriptors.

use bitflags::bitflags;

bitflags! {
    /// What a buffer may be used for. The cache treats buffers with different
    /// usages as different scratch shapes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        /// Source of buffer-to-texture copies.
        const COPY_SRC = 1 << 4;
        /// Destination of writes and copies.
        const COPY_DST = 1 << 5;
        /// Readable through a CPU mapping.
        const MAP_READ = 1 << 6;
        /// Writable through [`Buffer::map`](crate::Buffer::map).
        const MAP_WRITE = 1 << 7;

        /// Mappable staging memory that feeds texture uploads.
        const TRANSFER_SRC = Self::MAP_WRITE.bits() | Self::COPY_SRC.bits();
    }
}

/// Shape of a buffer to create. The label is for debugging only and never
/// part of the scratch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// A [`BufferUsage::TRANSFER_SRC`] buffer of `size` bytes.
    pub fn transfer(size: u64) -> Self {
        Self::new(size, BufferUsage::TRANSFER_SRC)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
