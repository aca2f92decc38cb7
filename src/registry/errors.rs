use thiserror::Error;

/// Service registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry unavailable for {capability}: {message}")]
    Unavailable { capability: String, message: String },

    #[error("Registry lookup for {capability} timed out after {timeout_ms}ms")]
    Timeout { capability: String, timeout_ms: u64 },

    #[error("No live endpoint for capability {capability}")]
    NoLiveEndpoint { capability: String },

    #[error("Discovery backend error: {message}")]
    Backend { message: String },
}

impl RegistryError {
    pub fn unavailable(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
