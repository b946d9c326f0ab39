//! Node startup errors.

use saga::SagaError;
use thiserror::Error;

/// Errors that stop the node from starting or serving.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Failed to install the metrics recorder: {0}")]
    Metrics(String),

    #[error("Failed to install the tracing subscriber: {0}")]
    Tracing(String),

    #[error("Failed to start services: {0}")]
    Services(#[from] SagaError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_the_address() {
        let err = NodeError::Bind {
            addr: "0.0.0.0:3000".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("Failed to bind 0.0.0.0:3000"));
    }

    #[test]
    fn test_saga_error_converts() {
        let err: NodeError = SagaError::InvalidApiKey.into();
        assert!(matches!(err, NodeError::Services(SagaError::InvalidApiKey)));
    }
}
