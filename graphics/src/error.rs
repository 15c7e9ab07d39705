//! Error type shared by the device, the backends and resource mapping.
//!
//! Cache operations never fail (misses are `None`), and pixel transfers report
//! `bool`. Everything that allocates, maps or talks to a backend returns
//! `Result<_, GraphicsError>`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// No backend could be brought up (no adapter, device request refused).
    InitializationFailed(String),
    /// The backend refused to allocate a texture or buffer.
    ResourceCreationFailed(String),
    /// The device lacks something the call needs, e.g. buffer mapping.
    FeatureNotSupported(String),
    OutOfMemory,
    /// [`GraphicsDevice::abandon`](crate::GraphicsDevice::abandon) was called.
    DeviceLost,
    /// Bad descriptor, rectangle, stride or usage.
    InvalidParameter(String),
    /// The resource's allocation was released or abandoned by its cache.
    ResourceDestroyed,
    /// A backend returned something inconsistent.
    Internal(String),
}

impl GraphicsError {
    /// Whether retrying on the same device is pointless.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost)
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "backend init failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "allocation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "unsupported: {msg}"),
            Self::OutOfMemory => f.write_str("out of GPU memory"),
            Self::DeviceLost => f.write_str("device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid argument: {msg}"),
            Self::ResourceDestroyed => f.write_str("resource allocation no longer exists"),
            Self::Internal(msg) => write!(f, "backend inconsistency: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = GraphicsError::InvalidParameter("row_bytes 60 < 64".to_string());
        assert_eq!(err.to_string(), "invalid argument: row_bytes 60 < 64");
        assert_eq!(
            GraphicsError::ResourceDestroyed.to_string(),
            "resource allocation no longer exists"
        );
    }

    #[test]
    fn test_device_lost_classification() {
        assert!(GraphicsError::DeviceLost.is_device_lost());
        assert!(!GraphicsError::OutOfMemory.is_device_lost());
    }
}
