//! Error types for the connector service.

use dataloader_core::{LoaderError, SessionId};

/// Errors from the session registry and its boundary operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No session exists with the given id
    #[error("No session with id {0}")]
    NotFound(SessionId),

    /// A session with this id already exists
    #[error("Session {0} already exists")]
    DuplicateSession(SessionId),

    /// The loader factory failed; session creation was rolled back
    #[error("Failed to construct data loader for {id}: {source}")]
    BackendConstructionFailed {
        /// The session being created
        id: SessionId,
        /// The factory failure
        #[source]
        source: LoaderError,
    },

    /// A loader lifecycle or notification call faulted
    #[error("Data loader call {operation} failed for {id}: {reason}")]
    BackendCallFailed {
        /// The session whose loader faulted
        id: SessionId,
        /// The loader operation that faulted
        operation: &'static str,
        /// Failure description (error or cleared panic message)
        reason: String,
    },

    /// Service setup failed (wake channel allocation)
    #[error("Service setup failed: {0}")]
    Setup(#[from] std::io::Error),
}

/// Convenience type alias for Results using ServiceError.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let error = ServiceError::NotFound(SessionId::new(3));
        assert_eq!(error.to_string(), "No session with id session-3");

        let error = ServiceError::DuplicateSession(SessionId::new(3));
        assert_eq!(error.to_string(), "Session session-3 already exists");

        let error = ServiceError::BackendConstructionFailed {
            id: SessionId::new(9),
            source: LoaderError::Rejected("bad arguments".to_string()),
        };
        assert!(error.to_string().contains("session-9"));
        assert!(error.to_string().contains("bad arguments"));

        let error = ServiceError::BackendCallFailed {
            id: SessionId::new(1),
            operation: "on_start",
            reason: "origin offline".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Data loader call on_start failed for session-1: origin offline"
        );
    }
}
