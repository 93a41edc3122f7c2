//! One data loader session.
//!
//! A session exclusively owns its loader instance and notification
//! descriptors, holds a weak reference to the supervising status listener,
//! and acts as the loader's filesystem connector and status reporter. The
//! registry serializes lifecycle calls; notification handlers run on the
//! looper threads and synchronize with lifecycle calls through the loader
//! lock.

use std::os::fd::{BorrowedFd, OwnedFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use dataloader_core::{
    ConnectorError, ConnectorResult, DataBlock, DataLoader, DataLoaderFactory, DataLoaderParams,
    DataLoaderStatus, DataWriter, FileId, FilesystemConnector, InstallationFile, LoaderError,
    ReadInfo, SessionId, StatusListener, StatusReporter, StorageEngine,
};

use crate::channel::{self, ChannelKind, NotificationChannels};
use crate::error::ServiceError;
use crate::report;

/// Lifecycle of a session.
///
/// Strictly Created -> Started <-> Stopped -> Destroyed; descriptors are
/// watched by the loopers only while Started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleState {
    Created,
    Started,
    Stopped,
    Destroyed,
}

pub(crate) struct Session {
    id: SessionId,
    params: DataLoaderParams,
    channels: NotificationChannels,
    writer: Option<Arc<dyn DataWriter>>,
    storage: Arc<dyn StorageEngine>,
    listener: Weak<dyn StatusListener>,
    loader: Mutex<Option<Box<dyn DataLoader>>>,
    state: Mutex<LifecycleState>,
    shutdown: Arc<AtomicBool>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        params: DataLoaderParams,
        channels: NotificationChannels,
        writer: Option<Arc<dyn DataWriter>>,
        storage: Arc<dyn StorageEngine>,
        listener: Weak<dyn StatusListener>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            params,
            channels,
            writer,
            storage,
            listener,
            loader: Mutex::new(None),
            state: Mutex::new(LifecycleState::Created),
            shutdown,
        }
    }

    pub(crate) fn listener(&self) -> Weak<dyn StatusListener> {
        Weak::clone(&self.listener)
    }

    pub(crate) fn channel_raw_fd(&self, kind: ChannelKind) -> Option<RawFd> {
        self.channels.raw_fd(kind)
    }

    pub(crate) fn channel_fd(&self, kind: ChannelKind) -> Option<BorrowedFd<'_>> {
        self.channels.fd(kind)
    }

    /// Construct the loader via the injected factory, handing it this
    /// session as connector and reporter. A factory panic is contained and
    /// surfaces as a construction failure.
    pub(crate) fn create_loader(
        self: &Arc<Self>,
        factory: &DataLoaderFactory,
    ) -> Result<(), ServiceError> {
        let connector: Arc<dyn FilesystemConnector> = Arc::<Self>::clone(self);
        let reporter: Arc<dyn StatusReporter> = Arc::<Self>::clone(self);
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| factory(&self.params, connector, reporter)));
        match outcome {
            Ok(Ok(loader)) => {
                *self.loader.lock() = Some(loader);
                Ok(())
            }
            Ok(Err(source)) => Err(ServiceError::BackendConstructionFailed {
                id: self.id,
                source,
            }),
            Err(payload) => Err(ServiceError::BackendConstructionFailed {
                id: self.id,
                source: LoaderError::Rejected(panic_reason(payload)),
            }),
        }
    }

    /// Run the loader's start call and enter the Started state.
    ///
    /// Starting an already-running session is a no-op success.
    pub(crate) fn begin_start(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        if *state == LifecycleState::Started {
            return Ok(());
        }
        self.dispatch("on_start", |loader| loader.on_start())?;
        *state = LifecycleState::Started;
        Ok(())
    }

    /// Leave the Started state. The loader's stop call runs only when the
    /// session was actually running, so repeated stops reach it once.
    pub(crate) fn finish_stop(&self) {
        let mut state = self.state.lock();
        if *state == LifecycleState::Started {
            if let Err(e) = self.dispatch("on_stop", |loader| loader.on_stop()) {
                tracing::warn!("Ignoring stop failure for {}: {}", self.id, e);
            }
        }
        if *state != LifecycleState::Destroyed {
            *state = LifecycleState::Stopped;
        }
    }

    /// Run the loader's destroy call and release the loader instance.
    ///
    /// Dropping the loader breaks the session<->loader reference cycle.
    pub(crate) fn finish_destroy(&self) {
        let loader = self.loader.lock().take();
        let mut loader = loader.expect("session has no data loader");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| loader.on_destroy()));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Ignoring destroy failure for {}: {}", self.id, e),
            Err(payload) => tracing::warn!(
                "Ignoring destroy panic for {}: {}",
                self.id,
                panic_reason(payload)
            ),
        }
        *self.state.lock() = LifecycleState::Destroyed;
    }

    /// Forward the image-preparation request to the loader.
    pub(crate) fn prepare_image(
        &self,
        added: &[InstallationFile],
        removed: &[String],
    ) -> Result<(), ServiceError> {
        self.dispatch("on_prepare_image", |loader| {
            loader.on_prepare_image(added, removed)
        })
    }

    /// A watched descriptor became readable. Drains the channel in bounded
    /// batches until it runs dry, forwarding each batch to the loader.
    ///
    /// Returns whether the looper should keep watching the descriptor. A
    /// destroy can race this handler through a stale poll snapshot; once the
    /// loader is gone the handler just asks to be unwatched.
    pub(crate) fn on_channel_ready(
        &self,
        kind: ChannelKind,
        capacity: usize,
        scratch: &mut Vec<ReadInfo>,
    ) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        let Some(fd) = self.channel_fd(kind) else {
            return false;
        };
        loop {
            channel::drain(fd, capacity, scratch);
            if scratch.is_empty() {
                return true;
            }
            let result = match kind {
                ChannelKind::PendingReads => self
                    .try_dispatch("on_pending_reads", |loader| loader.on_pending_reads(scratch)),
                ChannelKind::PageReads => {
                    self.try_dispatch("on_page_reads", |loader| loader.on_page_reads(scratch))
                }
            };
            let Some(result) = result else {
                tracing::debug!("Dropping notification watch for destroyed {}", self.id);
                return false;
            };
            if let Err(e) = result {
                tracing::warn!("Notification delivery failed: {}", e);
            }
        }
    }

    /// Run one loader call under the loader lock.
    ///
    /// Lifecycle callers only reach this while the loader slot is occupied;
    /// an empty slot here is a broken invariant and panics.
    fn dispatch<F>(&self, operation: &'static str, f: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut dyn DataLoader) -> Result<(), LoaderError>,
    {
        self.try_dispatch(operation, f)
            .expect("session has no data loader")
    }

    /// Run one loader call under the loader lock, or yield `None` when the
    /// loader has already been released by a destroy.
    ///
    /// A panic *inside* the loader call is contained and cleared, surfacing
    /// as [`ServiceError::BackendCallFailed`].
    fn try_dispatch<F>(&self, operation: &'static str, f: F) -> Option<Result<(), ServiceError>>
    where
        F: FnOnce(&mut dyn DataLoader) -> Result<(), LoaderError>,
    {
        let mut slot = self.loader.lock();
        let loader = slot.as_mut()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut **loader)));
        Some(match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServiceError::BackendCallFailed {
                id: self.id,
                operation,
                reason: e.to_string(),
            }),
            Err(payload) => Err(ServiceError::BackendCallFailed {
                id: self.id,
                operation,
                reason: panic_reason(payload),
            }),
        })
    }
}

impl FilesystemConnector for Session {
    fn write_data(
        &self,
        name: &str,
        offset_bytes: u64,
        length_bytes: u64,
        source: BorrowedFd<'_>,
    ) -> ConnectorResult<()> {
        let writer = self.writer.as_ref().ok_or(ConnectorError::NoWriteCallback)?;
        writer.write_data(name, offset_bytes, length_bytes, source)?;
        Ok(())
    }

    fn open_for_write(&self, file: FileId) -> ConnectorResult<OwnedFd> {
        let cmd = self
            .channel_fd(ChannelKind::PendingReads)
            .ok_or(ConnectorError::ChannelClosed)?;
        Ok(self.storage.open_for_write(cmd, file)?)
    }

    fn write_blocks(&self, blocks: &[DataBlock<'_>]) -> ConnectorResult<usize> {
        Ok(self.storage.write_blocks(blocks)?)
    }

    fn raw_metadata(&self, file: FileId) -> ConnectorResult<Vec<u8>> {
        let cmd = self
            .channel_fd(ChannelKind::PendingReads)
            .ok_or(ConnectorError::ChannelClosed)?;
        Ok(self.storage.raw_metadata(cmd, file)?)
    }
}

impl StatusReporter for Session {
    fn report_status(&self, status: DataLoaderStatus) -> bool {
        report::report_status(&self.listener, self.id, status)
    }
}

fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "data loader panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    use nix::fcntl::OFlag;
    use nix::unistd::{pipe2, write};

    use dataloader_core::{DataLoaderFactory, LoaderKind, LoaderResult};

    struct CountingLoader {
        deliveries: Arc<AtomicUsize>,
    }

    impl DataLoader for CountingLoader {
        fn on_start(&mut self) -> LoaderResult<()> {
            Ok(())
        }

        fn on_stop(&mut self) -> LoaderResult<()> {
            Ok(())
        }

        fn on_destroy(&mut self) -> LoaderResult<()> {
            Ok(())
        }

        fn on_prepare_image(
            &mut self,
            _added: &[InstallationFile],
            _removed: &[String],
        ) -> LoaderResult<()> {
            Ok(())
        }

        fn on_pending_reads(&mut self, _reads: &[ReadInfo]) -> LoaderResult<()> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_page_reads(&mut self, _reads: &[ReadInfo]) -> LoaderResult<()> {
            Ok(())
        }
    }

    struct NullStorage;

    impl StorageEngine for NullStorage {
        fn open_for_write(
            &self,
            _cmd: BorrowedFd<'_>,
            _file: FileId,
        ) -> io::Result<OwnedFd> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no storage"))
        }

        fn write_blocks(&self, _blocks: &[DataBlock<'_>]) -> io::Result<usize> {
            Ok(0)
        }

        fn raw_metadata(&self, _cmd: BorrowedFd<'_>, _file: FileId) -> io::Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    struct NullListener;

    impl StatusListener for NullListener {
        fn on_status_changed(&self, _session: SessionId, _status: DataLoaderStatus) {}
    }

    fn counting_factory(deliveries: Arc<AtomicUsize>) -> DataLoaderFactory {
        Arc::new(move |_params, _connector, _reporter| {
            Ok(Box::new(CountingLoader {
                deliveries: Arc::clone(&deliveries),
            }))
        })
    }

    fn session_with_cmd(
        cmd: OwnedFd,
        listener: &Arc<dyn StatusListener>,
        deliveries: Arc<AtomicUsize>,
    ) -> Arc<Session> {
        let session = Arc::new(Session::new(
            SessionId::new(1),
            DataLoaderParams::new(LoaderKind::Streaming, "pkg", "pkg.Loader", "", Vec::new()),
            NotificationChannels::new(Some(cmd), None),
            None,
            Arc::new(NullStorage),
            Arc::downgrade(listener),
            Arc::new(AtomicBool::new(false)),
        ));
        session
            .create_loader(&counting_factory(deliveries))
            .expect("loader construction");
        session
    }

    fn record() -> ReadInfo {
        ReadInfo {
            file_id: FileId::new([1; 16]),
            timestamp_us: 10,
            block_index: 0,
            serial_no: 1,
        }
    }

    // A stale poll snapshot can deliver readiness after the session was
    // destroyed; the handler must ask to be unwatched, not bring down the
    // looper thread.
    #[test]
    fn test_channel_ready_after_destroy_stops_watching() {
        let listener: Arc<dyn StatusListener> = Arc::new(NullListener);
        let deliveries = Arc::new(AtomicUsize::new(0));
        let (rx, tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let session = session_with_cmd(rx, &listener, Arc::clone(&deliveries));
        assert_eq!(write(&tx, &record().to_wire()).unwrap(), ReadInfo::WIRE_SIZE);

        session.finish_destroy();

        let mut scratch = Vec::new();
        assert!(!session.on_channel_ready(ChannelKind::PendingReads, 256, &mut scratch));
        assert_eq!(deliveries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_channel_ready_delivers_while_loader_present() {
        let listener: Arc<dyn StatusListener> = Arc::new(NullListener);
        let deliveries = Arc::new(AtomicUsize::new(0));
        let (rx, tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let session = session_with_cmd(rx, &listener, Arc::clone(&deliveries));
        assert_eq!(write(&tx, &record().to_wire()).unwrap(), ReadInfo::WIRE_SIZE);

        let mut scratch = Vec::new();
        assert!(session.on_channel_ready(ChannelKind::PendingReads, 256, &mut scratch));
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    }
}
