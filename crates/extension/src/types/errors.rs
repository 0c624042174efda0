//! Error types for the extension runtime.

use breakwise_auth::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("background context is not running")]
    BackgroundStopped,

    #[error("surface is not authenticated")]
    NotAuthenticated,

    #[error("surface is closed")]
    SurfaceClosed,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ExtensionResult<T> = Result<T, ExtensionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ExtensionError::BackgroundStopped.to_string(),
            "background context is not running"
        );
        let backend = ExtensionError::from(BackendError::Unreachable("timeout".into()));
        assert_eq!(backend.to_string(), "backend unreachable: timeout");
    }
}
