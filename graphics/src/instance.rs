//! Graphics instance.
//!
//! The [`GraphicsInstance`] is the top-level entry point for the graphics system.
//! It selects a GPU backend and manages the [`GraphicsDevice`]s created on it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{self, BackendType, GpuBackend};
use crate::cache::ResourceCacheConfig;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// Parameters for creating a [`GraphicsInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceParameters {
    /// Backend to use.
    pub backend: BackendType,
    /// Cache limits for every device created by the instance.
    pub cache: ResourceCacheConfig,
}

impl InstanceParameters {
    /// Create parameters with defaults: automatic backend, default cache limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Set the cache limits.
    pub fn with_cache_config(mut self, cache: ResourceCacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// The graphics instance manages devices.
///
/// # Thread Safety
///
/// `GraphicsInstance` is `Send + Sync` and can be safely shared across threads.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::with_parameters(
///     InstanceParameters::new().with_backend(BackendType::Dummy),
/// )?;
/// let device = instance.create_device()?;
/// ```
pub struct GraphicsInstance {
    parameters: InstanceParameters,
    /// Devices created by this instance.
    devices: RwLock<Vec<Arc<GraphicsDevice>>>,
    /// GPU backend for this instance.
    backend: Arc<dyn GpuBackend>,
}

impl GraphicsInstance {
    /// Create a new graphics instance with default parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the graphics system cannot be initialized.
    pub fn new() -> Result<Arc<Self>, GraphicsError> {
        Self::with_parameters(InstanceParameters::default())
    }

    /// Create a new graphics instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested backend cannot be created.
    pub fn with_parameters(parameters: InstanceParameters) -> Result<Arc<Self>, GraphicsError> {
        log::info!("Creating GraphicsInstance with {:?}", parameters);

        let backend = backend::create_backend(parameters.backend)?;
        log::info!("Using GPU backend: {}", backend.name());

        Ok(Arc::new(Self {
            parameters,
            devices: RwLock::new(Vec::new()),
            backend,
        }))
    }

    /// Get the parameters the instance was created with.
    pub fn parameters(&self) -> &InstanceParameters {
        &self.parameters
    }

    /// Get the GPU backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Create a graphics device on the instance's backend.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for backends that create a
    /// device per call.
    pub fn create_device(&self) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        let device = GraphicsDevice::new(Arc::clone(&self.backend), self.parameters.cache);

        // Track the device
        self.devices.write().push(Arc::clone(&device));

        Ok(device)
    }

    /// Get all devices created by this instance.
    pub fn devices(&self) -> Vec<Arc<GraphicsDevice>> {
        self.devices.read().clone()
    }

    /// Get the number of devices created by this instance.
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}

impl std::fmt::Debug for GraphicsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsInstance")
            .field("backend", &self.backend.name())
            .field("parameters", &self.parameters)
            .field("device_count", &self.device_count())
            .finish()
    }
}

// Ensure GraphicsInstance is Send + Sync
static_assertions::assert_impl_all!(GraphicsInstance: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_instance() -> Arc<GraphicsInstance> {
        GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap()
    }

    #[test]
    fn test_instance_creation() {
        let instance = dummy_instance();
        assert_eq!(instance.device_count(), 0);
        assert_eq!(instance.backend().name(), "Dummy Backend");
    }

    #[test]
    fn test_create_device() {
        let instance = dummy_instance();
        let device = instance.create_device().unwrap();
        assert_eq!(device.name(), "Dummy Backend");
        assert_eq!(instance.device_count(), 1);
    }

    #[test]
    fn test_create_multiple_devices() {
        let instance = dummy_instance();
        let _device1 = instance.create_device().unwrap();
        let _device2 = instance.create_device().unwrap();
        assert_eq!(instance.device_count(), 2);
    }

    #[test]
    fn test_cache_config_reaches_device() {
        let config = ResourceCacheConfig::default()
            .with_max_count(4)
            .with_max_bytes(1024);
        let instance = GraphicsInstance::with_parameters(
            InstanceParameters::new()
                .with_backend(BackendType::Dummy)
                .with_cache_config(config),
        )
        .unwrap();
        let device = instance.create_device().unwrap();
        assert_eq!(device.resource_cache().config(), config);
    }

    #[test]
    fn test_default_parameters() {
        let params = InstanceParameters::default();
        assert_eq!(params.backend, BackendType::Auto);
        assert_eq!(params.cache.max_count, 8192);
        assert_eq!(params.cache.max_bytes, 96 * 1024 * 1024);
    }
}
