//! Status codes delivered to the supervising service.
//!
//! The numeric values are part of the boundary contract with the supervisor
//! and must not change. The closed enum makes invalid codes unrepresentable
//! inside the service; `TryFrom<i32>` covers the marshalling edge where a
//! raw integer arrives from outside.

/// Session status reported to a [`StatusListener`](crate::StatusListener).
///
/// The first six values track the session lifecycle and image preparation;
/// the last three form the connection-health signal a data loader may raise
/// on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DataLoaderStatus {
    /// Session created; loader constructed
    Created = 0,
    /// Session torn down (or creation aborted)
    Destroyed = 1,
    /// Loader started; notification channels are being watched
    Started = 2,
    /// Loader stopped; notification channels unregistered
    Stopped = 3,
    /// Image preparation finished successfully
    ImageReady = 4,
    /// Image preparation failed
    ImageNotReady = 5,
    /// Loader reports a slow connection to its data source
    SlowConnection = 6,
    /// Loader reports no connection to its data source
    NoConnection = 7,
    /// Loader reports a healthy connection
    ConnectionOk = 8,
}

impl DataLoaderStatus {
    /// The raw wire value of this status.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for DataLoaderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataLoaderStatus::Created => "created",
            DataLoaderStatus::Destroyed => "destroyed",
            DataLoaderStatus::Started => "started",
            DataLoaderStatus::Stopped => "stopped",
            DataLoaderStatus::ImageReady => "image-ready",
            DataLoaderStatus::ImageNotReady => "image-not-ready",
            DataLoaderStatus::SlowConnection => "slow-connection",
            DataLoaderStatus::NoConnection => "no-connection",
            DataLoaderStatus::ConnectionOk => "connection-ok",
        };
        f.write_str(name)
    }
}

/// A status code outside the defined range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("status code {0} is outside the valid range")]
pub struct InvalidStatus(pub i32);

impl TryFrom<i32> for DataLoaderStatus {
    type Error = InvalidStatus;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DataLoaderStatus::Created),
            1 => Ok(DataLoaderStatus::Destroyed),
            2 => Ok(DataLoaderStatus::Started),
            3 => Ok(DataLoaderStatus::Stopped),
            4 => Ok(DataLoaderStatus::ImageReady),
            5 => Ok(DataLoaderStatus::ImageNotReady),
            6 => Ok(DataLoaderStatus::SlowConnection),
            7 => Ok(DataLoaderStatus::NoConnection),
            8 => Ok(DataLoaderStatus::ConnectionOk),
            other => Err(InvalidStatus(other)),
        }
    }
}
