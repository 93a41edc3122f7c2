//! Configuration for the data loader service.

use std::time::Duration;

/// Tuning knobs for a [`DataLoaderService`](crate::DataLoaderService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Coarse timeout for the blocking poll in each notification looper.
    /// Registration and shutdown wake the poll explicitly, so this only
    /// bounds how long an idle looper sleeps.
    /// Default: 60 seconds
    pub poll_timeout: Duration,

    /// Maximum number of notification records drained from a kernel channel
    /// per read. A handler keeps draining batches of this size until the
    /// channel runs dry.
    /// Default: 256
    pub batch_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(60),
            batch_capacity: 256,
        }
    }
}

impl ServiceConfig {
    /// Create a ServiceConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the looper poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the drain batch capacity (clamped to at least one record)
    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_secs(60));
        assert_eq!(config.batch_capacity, 256);
    }

    #[test]
    fn test_builders() {
        let config = ServiceConfig::new()
            .with_poll_timeout(Duration::from_millis(100))
            .with_batch_capacity(0);
        assert_eq!(config.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.batch_capacity, 1);
    }
}
