use thiserror::Error;

/// Failure taxonomy shared by every crate in the workspace.
///
/// `Config` and `DimensionMismatch` describe states the system cannot
/// reconcile on its own; callers surface them and never retry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Index build failed: {0}")]
    Build(String),

    #[error("index dimension {index_dim} does not match provider dimension {provider_dim}; rebuild required")]
    DimensionMismatch { index_dim: usize, provider_dim: usize },

    #[error("Provider unreachable: {0}")]
    Connection(String),

    #[error("Index is empty: run the rebuild command before querying")]
    EmptyIndex,

    #[error("Index storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self { Self::Config(msg.into()) }

    pub fn build(msg: impl Into<String>) -> Self { Self::Build(msg.into()) }

    pub fn connection(msg: impl Into<String>) -> Self { Self::Connection(msg.into()) }

    /// Collapse a backend error chain into a `Storage` error.
    pub fn storage(err: anyhow::Error) -> Self { Self::Storage(format!("{err:#}")) }

    /// True for conditions that must be surfaced as-is and never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::DimensionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_names_both_dimensions() {
        let err = Error::DimensionMismatch { index_dim: 1536, provider_dim: 384 };
        let msg = err.to_string();
        assert!(msg.contains("index dimension 1536"));
        assert!(msg.contains("provider dimension 384"));
        assert!(msg.contains("rebuild required"));
        assert!(err.is_fatal());
    }

    #[test]
    fn connection_errors_are_not_fatal() {
        assert!(!Error::connection("timeout").is_fatal());
        assert!(Error::config("overlap").is_fatal());
    }
}
