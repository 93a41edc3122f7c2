//! Error types shared between data loaders and the connector.

/// Errors a data loader implementation may return from its lifecycle and
/// notification calls.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// An I/O error while fetching or writing data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The loader rejected the request
    #[error("Loader rejected the request: {0}")]
    Rejected(String),

    /// The loader's data source is unavailable
    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for Results using LoaderError.
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;

/// Errors from the filesystem-connector capabilities exposed to a loader.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The session's command channel is absent or already released
    #[error("Session command channel is closed")]
    ChannelClosed,

    /// The session was created without an upstream write callback
    #[error("Session has no upstream write callback")]
    NoWriteCallback,

    /// An I/O error from the storage engine or the upstream writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using ConnectorError.
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_error_display() {
        let error = LoaderError::Rejected("unknown package".to_string());
        assert_eq!(error.to_string(), "Loader rejected the request: unknown package");

        let error = LoaderError::Unavailable("origin timed out".to_string());
        assert_eq!(error.to_string(), "Data source unavailable: origin timed out");
    }

    #[test]
    fn test_connector_error_display() {
        assert_eq!(
            ConnectorError::ChannelClosed.to_string(),
            "Session command channel is closed"
        );
        assert_eq!(
            ConnectorError::NoWriteCallback.to_string(),
            "Session has no upstream write callback"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let error: LoaderError = io.into();
        assert!(matches!(error, LoaderError::Io(_)));
    }
}
