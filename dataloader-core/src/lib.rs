//! # incfs-dataloader-core
//!
//! Shared vocabulary for the incremental-fs data loader service: session
//! identifiers, status codes, kernel notification records, the immutable
//! per-session parameter bundle, and the traits a data loader implementation
//! and its collaborators plug into.
//!
//! This crate is deliberately leaf-level. The event loops, the session
//! registry, and the status reporting live in `incfs-dataloader-connector`.

pub mod error;
pub mod loader;
pub mod params;
pub mod records;
pub mod status;
pub mod types;

pub use error::{ConnectorError, ConnectorResult, LoaderError, LoaderResult};
pub use loader::{
    DataLoader, DataLoaderFactory, DataWriter, FilesystemConnector, StatusListener,
    StatusReporter, StorageEngine,
};
pub use params::{DataLoaderParams, InstallationFile, LoaderKind, NamedFd};
pub use records::{BlockKind, Compression, DataBlock, FileId, ReadInfo};
pub use status::{DataLoaderStatus, InvalidStatus};
pub use types::SessionId;
