use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_gpu_resources::{
    BackendType, BufferDescriptor, ContentKey, GraphicsDevice, GraphicsInstance,
    InstanceParameters, KeyDomain, ResourceCacheConfig, TextureDescriptor, TextureFormat,
    TextureUsage,
};
use std::sync::Arc;

fn dummy_device(config: ResourceCacheConfig) -> Arc<GraphicsDevice> {
    let instance = GraphicsInstance::with_parameters(
        InstanceParameters::new()
            .with_backend(BackendType::Dummy)
            .with_cache_config(config),
    )
    .unwrap();
    instance.create_device().unwrap()
}

fn desc_64() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        64,
        64,
        TextureFormat::Rgba8Unorm,
        TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
    )
}

// ---------------------------------------------------------------------------
// Creation and reuse
// ---------------------------------------------------------------------------

fn bench_create_texture(c: &mut Criterion) {
    let device = dummy_device(ResourceCacheConfig::default());

    c.bench_function("cache_create_unbudgeted_texture_64x64", |b| {
        b.iter(|| {
            black_box(device.create_texture(&desc_64(), false).unwrap());
        });
    });
}

fn bench_scratch_reuse(c: &mut Criterion) {
    let device = dummy_device(ResourceCacheConfig::default());
    // Warm the cache with a spread of shapes.
    for size in [64u64, 128, 256, 512, 1024, 2048] {
        drop(
            device
                .find_or_create_scratch_buffer(&BufferDescriptor::transfer(size))
                .unwrap(),
        );
    }

    c.bench_function("cache_scratch_buffer_reuse", |b| {
        b.iter(|| {
            black_box(
                device
                    .find_or_create_scratch_buffer(&BufferDescriptor::transfer(512))
                    .unwrap(),
            );
        });
    });
}

fn bench_content_key_lookup(c: &mut Criterion) {
    let device = dummy_device(ResourceCacheConfig::default());
    let domain = KeyDomain::generate();
    let keys: Vec<_> = (0..256u32)
        .map(|i| ContentKey::new(domain, &[i, i.wrapping_mul(31)]))
        .collect();
    for key in &keys {
        let texture = device.create_texture(&desc_64(), true).unwrap();
        device.assign_content_key(texture.resource(), key.clone());
    }

    c.bench_function("cache_content_key_lookup_256", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(device.find_texture_by_content_key(&keys[i]));
        });
    });
}

// ---------------------------------------------------------------------------
// Eviction
// ---------------------------------------------------------------------------

fn bench_purge_to_budget(c: &mut Criterion) {
    c.bench_function("cache_purge_1024_to_half", |b| {
        b.iter_with_setup(
            || {
                let device = dummy_device(ResourceCacheConfig::default());
                for _ in 0..1024 {
                    drop(device.create_texture(&desc_64(), true).unwrap());
                }
                device
            },
            |device| {
                black_box(device.resource_cache().set_limits(512, u64::MAX));
            },
        );
    });
}

criterion_group!(
    benches,
    bench_create_texture,
    bench_scratch_reuse,
    bench_content_key_lookup,
    bench_purge_to_budget,
);
criterion_main!(benches);
