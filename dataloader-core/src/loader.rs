//! The data loader contract and its collaborator seams.
//!
//! A loader is constructed once per session by an injected
//! [`DataLoaderFactory`] and answers lifecycle and notification calls from
//! the connector. The factory receives the session's connector and reporter
//! handles so the loader can write fetched data back into the filesystem and
//! raise status on its own.

use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::sync::Arc;

use crate::error::{ConnectorResult, LoaderResult};
use crate::params::{DataLoaderParams, InstallationFile};
use crate::records::{DataBlock, FileId, ReadInfo};
use crate::status::DataLoaderStatus;
use crate::types::SessionId;

/// A pluggable data-loading backend bound to one session.
///
/// Construction doubles as the create call; every other lifecycle stage has
/// its own method. All calls may fail; the connector logs and converts
/// failures, it never tears down the session on its own except when
/// construction or start fail.
pub trait DataLoader: Send {
    /// The session is starting; notification channels are about to be watched.
    fn on_start(&mut self) -> LoaderResult<()>;

    /// The session is stopping; notification channels are no longer watched.
    fn on_stop(&mut self) -> LoaderResult<()>;

    /// The session is being destroyed. Called at most once, after a stop.
    fn on_destroy(&mut self) -> LoaderResult<()>;

    /// Prepare the filesystem image: create `added` files, drop `removed`.
    fn on_prepare_image(
        &mut self,
        added: &[InstallationFile],
        removed: &[String],
    ) -> LoaderResult<()>;

    /// A batch of pending-read notifications from the command channel.
    ///
    /// Record order within the batch is kernel delivery order.
    fn on_pending_reads(&mut self, reads: &[ReadInfo]) -> LoaderResult<()>;

    /// A batch of page-read notifications from the log channel.
    fn on_page_reads(&mut self, reads: &[ReadInfo]) -> LoaderResult<()>;
}

/// Constructs a loader for a new session.
///
/// A `None` loader is not a thing: construction failure must be an `Err`,
/// which aborts session creation.
pub type DataLoaderFactory = Arc<
    dyn Fn(
            &DataLoaderParams,
            Arc<dyn FilesystemConnector>,
            Arc<dyn StatusReporter>,
        ) -> LoaderResult<Box<dyn DataLoader>>
        + Send
        + Sync,
>;

/// Filesystem-side capabilities a session exposes to its loader.
pub trait FilesystemConnector: Send + Sync {
    /// Forward a write request upstream to the caller's write callback.
    fn write_data(
        &self,
        name: &str,
        offset_bytes: u64,
        length_bytes: u64,
        source: BorrowedFd<'_>,
    ) -> ConnectorResult<()>;

    /// Open a file inside the incremental filesystem for block writes.
    fn open_for_write(&self, file: FileId) -> ConnectorResult<OwnedFd>;

    /// Write a batch of blocks; returns the number of blocks written.
    fn write_blocks(&self, blocks: &[DataBlock<'_>]) -> ConnectorResult<usize>;

    /// Fetch the raw per-file metadata stored by the filesystem.
    fn raw_metadata(&self, file: FileId) -> ConnectorResult<Vec<u8>>;
}

/// Status-raising capability a session exposes to its loader.
pub trait StatusReporter: Send + Sync {
    /// Report a status for this session. Best-effort, at most once per call;
    /// returns false when no listener is attached.
    fn report_status(&self, status: DataLoaderStatus) -> bool;
}

/// Listener the supervising service registers to observe session status.
pub trait StatusListener: Send + Sync {
    /// One status transition for one session.
    fn on_status_changed(&self, session: SessionId, status: DataLoaderStatus);
}

/// The incremental filesystem's block storage engine.
///
/// External collaborator; injected at service construction. Block-level
/// operations take the session's command descriptor to address the right
/// filesystem instance.
pub trait StorageEngine: Send + Sync {
    /// Open `file` for writing through the given command descriptor.
    fn open_for_write(&self, cmd: BorrowedFd<'_>, file: FileId) -> io::Result<OwnedFd>;

    /// Write a batch of blocks; returns the number of blocks written.
    fn write_blocks(&self, blocks: &[DataBlock<'_>]) -> io::Result<usize>;

    /// Read the raw metadata recorded for `file`.
    fn raw_metadata(&self, cmd: BorrowedFd<'_>, file: FileId) -> io::Result<Vec<u8>>;
}

/// Upstream sink for [`FilesystemConnector::write_data`] forwarding.
///
/// Provided per session by the caller; sessions without one reject
/// `write_data` with [`ConnectorError::NoWriteCallback`](crate::ConnectorError::NoWriteCallback).
pub trait DataWriter: Send + Sync {
    /// Write `length_bytes` starting at `offset_bytes` of the named file,
    /// reading the payload from `source`.
    fn write_data(
        &self,
        name: &str,
        offset_bytes: u64,
        length_bytes: u64,
        source: BorrowedFd<'_>,
    ) -> io::Result<()>;
}
