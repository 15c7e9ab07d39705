//! Resource identity and cache keys.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage};

/// Process-unique resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Namespace for content keys, so unrelated clients never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDomain(u32);

impl KeyDomain {
    /// Allocate a fresh domain.
    pub fn generate() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Client-assigned key identifying what a resource contains.
///
/// Two resources with equal content keys are interchangeable. A resource
/// holding a content key is never treated as scratch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    domain: KeyDomain,
    data: Vec<u32>,
}

impl ContentKey {
    /// Create a content key from a domain and key words.
    pub fn new(domain: KeyDomain, data: &[u32]) -> Self {
        Self {
            domain,
            data: data.to_vec(),
        }
    }

    /// The key's domain.
    pub fn domain(&self) -> KeyDomain {
        self.domain
    }

    /// The key words.
    pub fn data(&self) -> &[u32] {
        &self.data
    }
}

/// Key derived from a resource's GPU shape.
///
/// Resources with equal scratch keys can stand in for each other when their
/// contents don't matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScratchKey {
    /// Texture shape.
    Texture {
        format: TextureFormat,
        width: u32,
        height: u32,
        depth: u32,
        mip_levels: u32,
        sample_count: u32,
        usage: TextureUsage,
    },
    /// Buffer shape.
    Buffer { size: u64, usage: BufferUsage },
}

impl ScratchKey {
    /// Scratch key for a texture descriptor. Labels are ignored.
    pub fn for_texture(descriptor: &TextureDescriptor) -> Self {
        Self::Texture {
            format: descriptor.format,
            width: descriptor.size.width,
            height: descriptor.size.height,
            depth: descriptor.size.depth,
            mip_levels: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            usage: descriptor.usage,
        }
    }

    /// Scratch key for a buffer descriptor. Labels are ignored.
    pub fn for_buffer(descriptor: &BufferDescriptor) -> Self {
        Self::Buffer {
            size: descriptor.size,
            usage: descriptor.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_key_ignores_label() {
        let a = TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        );
        let b = a.clone().with_label("named");
        assert_eq!(ScratchKey::for_texture(&a), ScratchKey::for_texture(&b));

        let c = a.clone().with_mip_levels(2);
        assert_ne!(ScratchKey::for_texture(&a), ScratchKey::for_texture(&c));
    }

    #[test]
    fn test_content_key_domains_differ() {
        let d1 = KeyDomain::generate();
        let d2 = KeyDomain::generate();
        assert_ne!(d1, d2);
        assert_ne!(ContentKey::new(d1, &[7]), ContentKey::new(d2, &[7]));
        assert_eq!(ContentKey::new(d1, &[7, 8]), ContentKey::new(d1, &[7, 8]));
    }

    #[test]
    fn test_resource_ids_unique() {
        assert_ne!(ResourceId::next(), ResourceId::next());
    }
}
