//! Privileged view of a resource used by the resource cache.
//!
//! Everything that mutates cache bookkeeping on a resource (timestamps, the
//! cache slot, teardown) goes through a [`CacheAccess`]. The gate can only be
//! obtained inside this crate, so clients of [`GpuResource`] can observe
//! but never drive these transitions.

use std::sync::Arc;

use super::resource::{CacheIndex, GpuResource};

/// Outcome of tearing a resource down through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Teardown {
    /// The cache held the only reference; the object goes away with it.
    Destroyed,
    /// Other holders remain; the object lives until the last one drops it.
    Deferred,
}

/// Capability token over a single resource, scoped to a borrow of it.
pub(crate) struct CacheAccess<'a> {
    resource: &'a Arc<GpuResource>,
}

impl<'a> CacheAccess<'a> {
    pub(super) fn new(resource: &'a Arc<GpuResource>) -> Self {
        Self { resource }
    }

    pub(crate) fn is_scratch(&self) -> bool {
        self.resource.is_scratch()
    }

    pub(crate) fn is_wrapped(&self) -> bool {
        self.resource.is_wrapped()
    }

    pub(crate) fn is_purgeable(&self) -> bool {
        self.resource.is_purgeable()
    }

    /// Run the normal release hook.
    pub(crate) fn release(self) -> Teardown {
        let outcome = self.outcome();
        self.resource.release_handle();
        outcome
    }

    /// Run the device-lost hook. The backend is never called.
    pub(crate) fn abandon(self) -> Teardown {
        let outcome = self.outcome();
        self.resource.abandon_handle();
        outcome
    }

    pub(crate) fn timestamp(&self) -> u32 {
        self.resource.timestamp()
    }

    pub(crate) fn set_timestamp(&self, timestamp: u32) {
        self.resource.set_timestamp(timestamp);
    }

    pub(crate) fn access_cache_index(&self) -> &'a CacheIndex {
        self.resource.cache_index()
    }

    fn outcome(&self) -> Teardown {
        if self.is_purgeable() {
            Teardown::Destroyed
        } else {
            Teardown::Deferred
        }
    }
}
