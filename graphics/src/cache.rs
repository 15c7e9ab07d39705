//! Budgeted cache of GPU resources.
//!
//! The [`ResourceCache`] tracks every resource a device creates. It keeps
//! one strong reference per resource, so a resource nobody else holds is
//! *purgeable*: it stays resident for reuse by key, and is the first to go
//! when the cache is over budget.
//!
//! Resources are found again in two ways:
//! - by [`ContentKey`], when the client cares what the resource contains;
//! - by [`ScratchKey`], when any unused resource of the right shape will do.
//!
//! Teardown comes in two flavours. [`ResourceCache::release_all`] frees GPU
//! allocations normally. [`ResourceCache::abandon_all`] is for a lost device:
//! handles are dropped without calling the backend, and the cache stays in
//! abandon mode from then on.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use crate::resources::{ContentKey, GpuResource, ScratchKey, Teardown};

/// Default maximum number of budgeted resources.
pub const DEFAULT_MAX_RESOURCE_COUNT: usize = 8192;

/// Default maximum bytes of budgeted resources (96 MiB).
pub const DEFAULT_MAX_RESOURCE_BYTES: u64 = 96 * 1024 * 1024;

/// Resource cache limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceCacheConfig {
    /// Maximum number of budgeted resources.
    pub max_count: usize,
    /// Maximum total size of budgeted resources in bytes.
    pub max_bytes: u64,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_RESOURCE_COUNT,
            max_bytes: DEFAULT_MAX_RESOURCE_BYTES,
        }
    }
}

impl ResourceCacheConfig {
    /// Set the maximum resource count.
    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    /// Set the maximum budgeted bytes.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// How tracked resources are torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TeardownMode {
    /// Free GPU allocations through the backend.
    #[default]
    Release,
    /// The device is gone; drop handles without touching the backend.
    Abandon,
}

/// Result of a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeReport {
    /// Resources torn down.
    pub purged_count: usize,
    /// Budgeted bytes freed.
    pub purged_bytes: u64,
    /// Bytes still above the cap because nothing else could be evicted.
    pub over_budget_bytes: u64,
    /// Resources still above the count cap.
    pub over_budget_count: usize,
}

impl PurgeReport {
    /// Whether the cache ended within its limits.
    pub fn within_budget(&self) -> bool {
        self.over_budget_bytes == 0 && self.over_budget_count == 0
    }
}

/// Result of a bulk teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownSummary {
    /// Resources the cache held exclusively.
    pub destroyed: usize,
    /// Resources still held elsewhere; they live on without an allocation.
    pub deferred: usize,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub resource_count: usize,
    pub budgeted_count: usize,
    pub budgeted_bytes: u64,
    pub total_bytes: u64,
    pub purgeable_count: usize,
    pub max_count: usize,
    pub max_bytes: u64,
}

/// Tracks GPU resources, enforces the budget and tears resources down.
///
/// All operations are infallible: lookups that miss return `None`, and a
/// budget that cannot be met is reported and logged rather than failed.
pub struct ResourceCache {
    config: ResourceCacheConfig,
    resources: Vec<Arc<GpuResource>>,
    content_map: HashMap<ContentKey, Weak<GpuResource>>,
    // Only resources that are currently scratch.
    scratch_map: HashMap<ScratchKey, Vec<Weak<GpuResource>>>,
    pinned: HashSet<ContentKey>,
    // Unreusable resources still referenced when they became unreusable.
    deferred: Vec<Weak<GpuResource>>,
    timestamp: u32,
    budgeted_count: usize,
    budgeted_bytes: u64,
    total_bytes: u64,
    mode: TeardownMode,
}

impl ResourceCache {
    /// Create an empty cache.
    pub fn new(config: ResourceCacheConfig) -> Self {
        Self {
            config,
            resources: Vec::new(),
            content_map: HashMap::new(),
            scratch_map: HashMap::new(),
            pinned: HashSet::new(),
            deferred: Vec::new(),
            timestamp: 0,
            budgeted_count: 0,
            budgeted_bytes: 0,
            total_bytes: 0,
            mode: TeardownMode::Release,
        }
    }

    /// Current limits.
    pub fn config(&self) -> ResourceCacheConfig {
        self.config
    }

    /// Current teardown mode.
    pub fn mode(&self) -> TeardownMode {
        self.mode
    }

    /// Change the limits and purge down to them.
    pub fn set_limits(&mut self, max_count: usize, max_bytes: u64) -> PurgeReport {
        self.config = ResourceCacheConfig {
            max_count,
            max_bytes,
        };
        self.purge_as_needed()
    }

    /// Number of tracked resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Number of tracked budgeted resources.
    pub fn budgeted_count(&self) -> usize {
        self.budgeted_count
    }

    /// Bytes of tracked budgeted resources.
    pub fn budgeted_bytes(&self) -> u64 {
        self.budgeted_bytes
    }

    /// Bytes of all tracked resources.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of tracked resources nobody else holds.
    pub fn purgeable_count(&self) -> usize {
        self.resources.iter().filter(|r| r.is_purgeable()).count()
    }

    /// Whether either limit is exceeded.
    pub fn is_over_budget(&self) -> bool {
        self.budgeted_bytes > self.config.max_bytes || self.budgeted_count > self.config.max_count
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resource_count: self.resources.len(),
            budgeted_count: self.budgeted_count,
            budgeted_bytes: self.budgeted_bytes,
            total_bytes: self.total_bytes,
            purgeable_count: self.purgeable_count(),
            max_count: self.config.max_count,
            max_bytes: self.config.max_bytes,
        }
    }

    /// Tracked resources in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<GpuResource>> {
        self.resources.iter()
    }

    /// Whether `resource` is tracked by this cache.
    pub fn contains(&self, resource: &Arc<GpuResource>) -> bool {
        self.tracked_index(resource).is_some()
    }

    /// Start tracking a resource, then purge if over budget.
    ///
    /// After [`abandon_all`](Self::abandon_all) the resource is abandoned
    /// immediately instead.
    pub fn insert(&mut self, resource: Arc<GpuResource>) -> PurgeReport {
        if self.mode == TeardownMode::Abandon {
            log::warn!(
                "ResourceCache: device lost, abandoning new resource {:?}",
                resource.id()
            );
            resource.cache_access().abandon();
            return PurgeReport::default();
        }
        if self.contains(&resource) {
            log::warn!("ResourceCache: resource {:?} inserted twice", resource.id());
            return PurgeReport::default();
        }

        let timestamp = self.next_timestamp();
        {
            let access = resource.cache_access();
            access.set_timestamp(timestamp);
            access.access_cache_index().set(Some(self.resources.len()));
        }

        self.total_bytes += resource.gpu_memory_size();
        if resource.is_budgeted() {
            self.budgeted_count += 1;
            self.budgeted_bytes += resource.gpu_memory_size();
        }

        self.resources.push(Arc::clone(&resource));
        if let Some(key) = resource.content_key() {
            self.bind_content_key(&resource, key);
        }
        self.index_scratch(&resource);

        log::trace!(
            "ResourceCache: inserted {:?} ({} bytes, budgeted={}, timestamp={})",
            resource.id(),
            resource.gpu_memory_size(),
            resource.is_budgeted(),
            timestamp
        );

        drop(resource);
        self.purge_as_needed()
    }

    /// Look up by content key first, then by scratch key.
    pub fn find_and_ref(
        &mut self,
        content_key: Option<&ContentKey>,
        scratch_key: Option<&ScratchKey>,
    ) -> Option<Arc<GpuResource>> {
        if let Some(found) = content_key.and_then(|key| self.find_and_ref_content(key)) {
            return Some(found);
        }
        scratch_key.and_then(|key| self.find_and_ref_scratch(key))
    }

    /// Find the resource holding `key`, whether or not it is in use.
    pub fn find_and_ref_content(&mut self, key: &ContentKey) -> Option<Arc<GpuResource>> {
        let found = self.content_map.get(key)?.upgrade()?;
        self.touch(&found);
        Some(found)
    }

    /// Find an unused scratch resource with the given shape.
    pub fn find_and_ref_scratch(&mut self, key: &ScratchKey) -> Option<Arc<GpuResource>> {
        let found = self
            .scratch_map
            .get(key)?
            .iter()
            .find(|weak| weak.strong_count() == 1)?
            .upgrade()?;
        self.touch(&found);
        log::trace!("ResourceCache: scratch hit {:?}", found.id());
        Some(found)
    }

    /// Called while the last holder outside the cache is letting go.
    ///
    /// Budgeted and content-keyed resources stay resident for reuse. Anything
    /// else can never be found again and is torn down now.
    pub fn notify_ref_zeroed(&mut self, resource: &Arc<GpuResource>) {
        let Some(index) = self.tracked_index(resource) else {
            return;
        };
        if Self::is_reusable(resource) {
            return;
        }
        self.teardown_at(index);
        log::trace!("ResourceCache: released unreusable {:?}", resource.id());
    }

    /// Evict unreferenced, unpinned resources, oldest first, until within
    /// budget or nothing more can go.
    pub fn purge_as_needed(&mut self) -> PurgeReport {
        self.purge(false)
    }

    /// Like [`purge_as_needed`](Self::purge_as_needed) but ignores pins.
    pub fn force_purge_as_needed(&mut self) -> PurgeReport {
        self.purge(true)
    }

    /// Tear down every unreferenced, unpinned resource.
    pub fn purge_all_unreferenced(&mut self) -> PurgeReport {
        let mut report = PurgeReport::default();
        let mut index = self.resources.len();
        while index > 0 {
            index -= 1;
            let resource = &self.resources[index];
            if resource.is_purgeable() && !self.is_pinned(resource) {
                if resource.is_budgeted() {
                    report.purged_bytes += resource.gpu_memory_size();
                }
                report.purged_count += 1;
                self.teardown_at(index);
            }
        }
        if report.purged_count > 0 {
            log::debug!(
                "ResourceCache: purged {} unreferenced resources ({} bytes)",
                report.purged_count,
                report.purged_bytes
            );
        }
        report
    }

    /// Tear down everything. Takes the abandon path once
    /// [`abandon_all`](Self::abandon_all) has run.
    pub fn release_all(&mut self) -> TeardownSummary {
        self.teardown_all()
    }

    /// Tear down everything without calling the backend, and abandon any
    /// resource inserted later.
    pub fn abandon_all(&mut self) -> TeardownSummary {
        self.mode = TeardownMode::Abandon;
        self.teardown_all()
    }

    /// Give `resource` a content key.
    ///
    /// A scratch resource stops being scratch. Another resource holding the
    /// same key loses it, and is torn down if it then cannot be reused.
    /// Returns `false` if the resource is not tracked.
    pub fn assign_content_key(&mut self, resource: &Arc<GpuResource>, key: ContentKey) -> bool {
        if !self.contains(resource) {
            return false;
        }
        self.bind_content_key(resource, key);
        true
    }

    /// Remove the content key from `resource`. It may become scratch again.
    pub fn remove_content_key(&mut self, resource: &Arc<GpuResource>) -> bool {
        if !self.contains(resource) {
            return false;
        }
        if let Some(key) = resource.set_content_key(None) {
            self.unmap_content_key(&key, resource);
        }
        self.index_scratch(resource);
        self.release_if_unreusable(Arc::clone(resource));
        true
    }

    /// Start counting `resource` against the budget. Wrapped resources are
    /// never budgeted.
    pub fn make_budgeted(&mut self, resource: &Arc<GpuResource>) -> bool {
        if !self.contains(resource) || resource.is_wrapped() {
            return false;
        }
        if !resource.is_budgeted() {
            resource.set_budgeted(true);
            self.budgeted_count += 1;
            self.budgeted_bytes += resource.gpu_memory_size();
            self.index_scratch(resource);
            self.purge_as_needed();
        }
        true
    }

    /// Stop counting `resource` against the budget.
    pub fn make_unbudgeted(&mut self, resource: &Arc<GpuResource>) -> bool {
        if !self.contains(resource) {
            return false;
        }
        if resource.is_budgeted() {
            self.unindex_scratch(resource);
            resource.set_budgeted(false);
            self.budgeted_count -= 1;
            self.budgeted_bytes -= resource.gpu_memory_size();
            self.release_if_unreusable(Arc::clone(resource));
        }
        true
    }

    /// Keep the resource holding `key` resident through normal purges.
    ///
    /// The pin follows the key when it moves to another resource and is
    /// dropped once no resource holds it. Returns `false` if nothing holds
    /// `key`.
    pub fn pin_content(&mut self, key: &ContentKey) -> bool {
        if !self.content_map.get(key).is_some_and(|weak| weak.strong_count() > 0) {
            return false;
        }
        self.pinned.insert(key.clone());
        true
    }

    /// Undo [`pin_content`](Self::pin_content).
    pub fn unpin_content(&mut self, key: &ContentKey) {
        self.pinned.remove(key);
    }

    fn purge(&mut self, ignore_pins: bool) -> PurgeReport {
        let mut report = PurgeReport {
            purged_count: self.sweep_deferred(),
            ..PurgeReport::default()
        };
        while self.is_over_budget() {
            let Some(index) = self.oldest_candidate(ignore_pins) else {
                break;
            };
            report.purged_count += 1;
            report.purged_bytes += self.resources[index].gpu_memory_size();
            self.teardown_at(index);
        }

        if report.purged_count > 0 {
            log::debug!(
                "ResourceCache: evicted {} resources ({} bytes), now {} bytes in {} resources",
                report.purged_count,
                report.purged_bytes,
                self.budgeted_bytes,
                self.budgeted_count
            );
        }
        if self.is_over_budget() {
            report.over_budget_bytes = self.budgeted_bytes.saturating_sub(self.config.max_bytes);
            report.over_budget_count = self.budgeted_count.saturating_sub(self.config.max_count);
            log::warn!(
                "ResourceCache: over budget by {} bytes / {} resources, nothing left to evict",
                report.over_budget_bytes,
                report.over_budget_count
            );
        }
        report
    }

    /// Whether anything could find `resource` again after its holders leave.
    fn is_reusable(resource: &Arc<GpuResource>) -> bool {
        !resource.cache_access().is_wrapped()
            && (resource.is_budgeted() || resource.content_key().is_some())
    }

    /// Tear down a tracked resource nothing can reuse. If it is still held
    /// elsewhere it is remembered and checked again by the next purge.
    ///
    /// `resource` is one extra reference on top of the cache's own.
    fn release_if_unreusable(&mut self, resource: Arc<GpuResource>) -> bool {
        if Self::is_reusable(&resource) {
            return false;
        }
        let Some(index) = self.tracked_index(&resource) else {
            return false;
        };
        if Arc::strong_count(&resource) == 2 {
            drop(resource);
            self.teardown_at(index);
            return true;
        }
        let weak = Arc::downgrade(&resource);
        if !self.deferred.iter().any(|w| Weak::ptr_eq(w, &weak)) {
            self.deferred.push(weak);
        }
        false
    }

    /// Queue a resource whose last outside holder left without the cache
    /// being told.
    pub(crate) fn defer(&mut self, resource: Weak<GpuResource>) {
        if !self.deferred.iter().any(|w| Weak::ptr_eq(w, &resource)) {
            self.deferred.push(resource);
        }
    }

    /// Re-check deferred resources, tearing down the ones now unreferenced.
    pub(crate) fn sweep_deferred(&mut self) -> usize {
        let mut released = 0;
        for weak in std::mem::take(&mut self.deferred) {
            if let Some(resource) = weak.upgrade() {
                if self.release_if_unreusable(resource) {
                    released += 1;
                }
            }
        }
        if released > 0 {
            log::trace!("ResourceCache: released {} deferred resources", released);
        }
        released
    }

    fn oldest_candidate(&self, ignore_pins: bool) -> Option<usize> {
        self.resources
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                let access = r.cache_access();
                r.is_budgeted() && access.is_purgeable() && (ignore_pins || !self.is_pinned(r))
            })
            .min_by_key(|(_, r)| r.cache_access().timestamp())
            .map(|(index, _)| index)
    }

    fn is_pinned(&self, resource: &GpuResource) -> bool {
        !self.pinned.is_empty()
            && resource
                .content_key()
                .is_some_and(|key| self.pinned.contains(&key))
    }

    fn teardown_all(&mut self) -> TeardownSummary {
        let mut summary = TeardownSummary::default();
        while let Some(last) = self.resources.len().checked_sub(1) {
            match self.teardown_at(last) {
                Teardown::Destroyed => summary.destroyed += 1,
                Teardown::Deferred => summary.deferred += 1,
            }
        }
        self.content_map.clear();
        self.scratch_map.clear();
        self.pinned.clear();
        self.deferred.clear();
        debug_assert_eq!(self.budgeted_bytes, 0);
        debug_assert_eq!(self.total_bytes, 0);

        log::debug!(
            "ResourceCache: {:?} all ({} destroyed, {} deferred)",
            self.mode,
            summary.destroyed,
            summary.deferred
        );
        summary
    }

    fn teardown_at(&mut self, index: usize) -> Teardown {
        let resource = self.untrack_at(index);
        match self.mode {
            TeardownMode::Release => resource.cache_access().release(),
            TeardownMode::Abandon => resource.cache_access().abandon(),
        }
    }

    fn untrack_at(&mut self, index: usize) -> Arc<GpuResource> {
        let resource = self.resources.swap_remove(index);
        if let Some(moved) = self.resources.get(index) {
            moved.cache_access().access_cache_index().set(Some(index));
        }
        resource.cache_access().access_cache_index().set(None);

        self.total_bytes -= resource.gpu_memory_size();
        if resource.is_budgeted() {
            self.budgeted_count -= 1;
            self.budgeted_bytes -= resource.gpu_memory_size();
        }
        if let Some(key) = resource.content_key() {
            self.unmap_content_key(&key, &resource);
        }
        self.unindex_scratch(&resource);
        resource
    }

    fn tracked_index(&self, resource: &Arc<GpuResource>) -> Option<usize> {
        let index = resource.cache_access().access_cache_index().get()?;
        self.resources
            .get(index)
            .is_some_and(|tracked| Arc::ptr_eq(tracked, resource))
            .then_some(index)
    }

    fn bind_content_key(&mut self, resource: &Arc<GpuResource>, key: ContentKey) {
        let previous = self.content_map.get(&key).and_then(Weak::upgrade);
        if let Some(previous) = previous {
            if Arc::ptr_eq(&previous, resource) {
                return;
            }
            previous.set_content_key(None);
            self.index_scratch(&previous);
            self.release_if_unreusable(previous);
        }

        self.unindex_scratch(resource);
        if let Some(old) = resource.set_content_key(Some(key.clone())) {
            self.unmap_content_key(&old, resource);
        }
        self.content_map.insert(key, Arc::downgrade(resource));
    }

    fn unmap_content_key(&mut self, key: &ContentKey, resource: &Arc<GpuResource>) {
        let owned = self
            .content_map
            .get(key)
            .is_some_and(|weak| Weak::as_ptr(weak) == Arc::as_ptr(resource));
        if owned {
            self.content_map.remove(key);
            self.pinned.remove(key);
        }
    }

    fn index_scratch(&mut self, resource: &Arc<GpuResource>) {
        if !resource.cache_access().is_scratch() {
            return;
        }
        let Some(key) = resource.scratch_key() else {
            return;
        };
        let entries = self.scratch_map.entry(key).or_default();
        if !entries
            .iter()
            .any(|weak| Weak::as_ptr(weak) == Arc::as_ptr(resource))
        {
            entries.push(Arc::downgrade(resource));
        }
    }

    fn unindex_scratch(&mut self, resource: &Arc<GpuResource>) {
        let Some(key) = resource.scratch_key() else {
            return;
        };
        if let Some(entries) = self.scratch_map.get_mut(&key) {
            entries.retain(|weak| Weak::as_ptr(weak) != Arc::as_ptr(resource));
            if entries.is_empty() {
                self.scratch_map.remove(&key);
            }
        }
    }

    fn touch(&mut self, resource: &Arc<GpuResource>) {
        let timestamp = self.next_timestamp();
        resource.cache_access().set_timestamp(timestamp);
    }

    fn next_timestamp(&mut self) -> u32 {
        if self.timestamp == u32::MAX {
            self.renumber_timestamps();
        }
        let timestamp = self.timestamp;
        self.timestamp += 1;
        timestamp
    }

    // Compacts timestamps to 0..n, keeping relative order.
    fn renumber_timestamps(&mut self) {
        let mut order: Vec<&Arc<GpuResource>> = self.resources.iter().collect();
        order.sort_by_key(|r| r.timestamp());
        for (timestamp, resource) in order.iter().enumerate() {
            resource.cache_access().set_timestamp(timestamp as u32);
        }
        self.timestamp = order.len() as u32;
        log::debug!(
            "ResourceCache: timestamps wrapped, renumbered {} resources",
            order.len()
        );
    }

    #[cfg(test)]
    fn set_timestamp_counter(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            self.release_all();
        }
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("resources", &self.resources.len())
            .field("budgeted_count", &self.budgeted_count)
            .field("budgeted_bytes", &self.budgeted_bytes)
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceCache: Send, Sync);
