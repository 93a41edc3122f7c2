//! # incfs-dataloader-connector
//!
//! Bridges an incremental filesystem's kernel notification channels to a
//! pluggable data loader. A [`DataLoaderService`] owns a registry of
//! sessions and two notification loopers; each session binds a loader
//! instance to a pair of kernel descriptors delivering read-miss
//! (pending-read) and page-access (page-read) telemetry, and reports every
//! lifecycle transition to a supervising status listener.
//!
//! The loader implementation itself, the block storage engine, and the
//! upstream write sink are external collaborators plugged in through the
//! traits in `incfs-dataloader-core`.

mod channel;
mod config;
mod error;
mod looper;
mod report;
mod session;
mod service;

pub use channel::NotificationChannels;
pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use service::DataLoaderService;
