//! Resource cache integration tests.
//!
//! Drives the cache through [`GraphicsDevice`] the way a renderer would:
//! textures are created, dropped, found again by key, evicted under a small
//! budget, and finally released or abandoned.

mod common;

use rstest::rstest;

use common::{Backend, TestContext};
use redlilium_gpu_resources::{
    BufferDescriptor, ContentKey, KeyDomain, ResourceCacheConfig, TeardownMode,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// 16x16 RGBA8, 1 KiB.
fn small_desc() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        16,
        16,
        TextureFormat::Rgba8Unorm,
        TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
    )
}

const SMALL_BYTES: u64 = 16 * 16 * 4;

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_budget_evicts_least_recently_used(#[case] backend: Backend) {
    let config = ResourceCacheConfig::default().with_max_bytes(3 * SMALL_BYTES);
    let Some(ctx) = TestContext::with_cache_config(backend, config) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = &ctx.device;

    let first = device.create_texture(&small_desc(), true).unwrap();
    let second = device.create_texture(&small_desc(), true).unwrap();
    let third = device.create_texture(&small_desc(), true).unwrap();
    let ids = [first.id(), second.id(), third.id()];
    drop(first);
    drop(second);
    drop(third);

    // Touch the oldest so the second becomes least recently used.
    let domain = KeyDomain::generate();
    let key = ContentKey::new(domain, &[0]);
    {
        let cache = device.resource_cache();
        let oldest = cache.iter().find(|r| r.id() == ids[0]).cloned().unwrap();
        drop(cache);
        assert!(device.assign_content_key(&oldest, key.clone()));
    }
    assert!(device.find_texture_by_content_key(&key).is_some());

    // A fourth texture pushes the cache over budget.
    let _fourth = device.create_texture(&small_desc(), true).unwrap();
    let cache = device.resource_cache();
    assert!(cache.budgeted_bytes() <= 3 * SMALL_BYTES);
    let remaining: Vec<_> = cache.iter().map(|r| r.id()).collect();
    assert!(remaining.contains(&ids[0]));
    assert!(!remaining.contains(&ids[1]));
    assert!(remaining.contains(&ids[2]));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_in_use_resources_are_never_evicted(#[case] backend: Backend) {
    let config = ResourceCacheConfig::default().with_max_bytes(SMALL_BYTES);
    let Some(ctx) = TestContext::with_cache_config(backend, config) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = &ctx.device;

    let held: Vec<_> = (0..3)
        .map(|_| device.create_texture(&small_desc(), true).unwrap())
        .collect();
    assert!(held.iter().all(|t| !t.was_destroyed()));
    assert!(device.resource_cache().is_over_budget());

    drop(held);
    let report = device.purge_as_needed();
    assert_eq!(report.purged_count, 2);
    assert!(report.within_budget());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_scratch_reuse_by_shape(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = &ctx.device;

    let buffer = device
        .find_or_create_scratch_buffer(&BufferDescriptor::transfer(256))
        .unwrap();
    let id = buffer.id();
    drop(buffer);

    let again = device
        .find_or_create_scratch_buffer(&BufferDescriptor::transfer(256).with_label("other label"))
        .unwrap();
    assert_eq!(again.id(), id);

    let different = device
        .find_or_create_scratch_buffer(&BufferDescriptor::transfer(512))
        .unwrap();
    assert_ne!(different.id(), id);
    assert_eq!(device.resource_cache().resource_count(), 2);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_scratch_invariant_across_operations(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = &ctx.device;
    let check = || {
        device.resource_cache().iter().all(|r| {
            r.is_scratch()
                == (r.content_key().is_none() && r.scratch_key().is_some() && r.is_budgeted())
        })
    };

    let budgeted = device.create_texture(&small_desc(), true).unwrap();
    let unbudgeted = device.create_texture(&small_desc(), false).unwrap();
    assert!(check());
    assert!(budgeted.is_scratch());
    assert!(!unbudgeted.is_scratch());

    let key = ContentKey::new(KeyDomain::generate(), &[1, 2, 3]);
    device.assign_content_key(budgeted.resource(), key);
    assert!(check());
    assert!(!budgeted.is_scratch());

    device.resource_cache().make_budgeted(unbudgeted.resource());
    assert!(check());
    assert!(unbudgeted.is_scratch());

    device.resource_cache().remove_content_key(budgeted.resource());
    assert!(check());
    assert!(budgeted.is_scratch());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_abandon_then_release_all(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let device = &ctx.device;

    let held = device.create_texture(&small_desc(), true).unwrap();
    drop(device.create_texture(&small_desc(), true).unwrap());

    let summary = device.abandon();
    assert_eq!(summary.destroyed, 1);
    assert_eq!(summary.deferred, 1);
    assert!(held.was_destroyed());
    assert_eq!(device.resource_cache().mode(), TeardownMode::Abandon);

    let summary = device.release_all();
    assert_eq!(summary.destroyed + summary.deferred, 0);
    assert!(device.create_texture(&small_desc(), true).is_err());
}
