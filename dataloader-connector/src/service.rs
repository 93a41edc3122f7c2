//! The data loader service: session registry plus notification loopers.
//!
//! An explicit context object replaces process globals so independent
//! services can coexist (and be tested) in one process. The registry mutex
//! covers only map mutations and loader construction; looper registration
//! and removal always happen outside it, because the looper threads call
//! straight back into sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use dataloader_core::{
    DataLoaderFactory, DataLoaderParams, DataLoaderStatus, DataWriter, InstallationFile,
    SessionId, StatusListener, StorageEngine,
};

use crate::channel::{ChannelKind, NotificationChannels};
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::looper::Looper;
use crate::report::{report_status, StatusGuard};
use crate::session::Session;

/// Routes kernel notifications to per-session data loaders and lifecycle
/// calls from the supervising service to the right session.
///
/// All methods are callable from arbitrary threads. Lifecycle calls for one
/// session are serialized; different sessions proceed concurrently.
pub struct DataLoaderService {
    config: ServiceConfig,
    factory: DataLoaderFactory,
    storage: Arc<dyn StorageEngine>,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    cmd_looper: Arc<Looper>,
    log_looper: Arc<Looper>,
    shutdown: Arc<AtomicBool>,
}

impl DataLoaderService {
    /// Create a service with the default configuration.
    pub fn new(factory: DataLoaderFactory, storage: Arc<dyn StorageEngine>) -> Result<Self> {
        Self::with_config(ServiceConfig::default(), factory, storage)
    }

    /// Create a service with a custom configuration.
    pub fn with_config(
        config: ServiceConfig,
        factory: DataLoaderFactory,
        storage: Arc<dyn StorageEngine>,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let cmd_looper = Arc::new(
            Looper::new(
                ChannelKind::PendingReads,
                config.poll_timeout,
                config.batch_capacity,
                Arc::clone(&shutdown),
            )
            .map_err(ServiceError::Setup)?,
        );
        let log_looper = Arc::new(
            Looper::new(
                ChannelKind::PageReads,
                config.poll_timeout,
                config.batch_capacity,
                Arc::clone(&shutdown),
            )
            .map_err(ServiceError::Setup)?,
        );
        Ok(Self {
            config,
            factory,
            storage,
            sessions: Mutex::new(HashMap::new()),
            cmd_looper,
            log_looper,
            shutdown,
        })
    }

    /// Create a session: insert it into the registry and construct its
    /// loader. On any failure the registry is rolled back and the listener
    /// hears DESTROYED; on success it hears CREATED.
    pub fn on_create(
        &self,
        id: SessionId,
        channels: NotificationChannels,
        writer: Option<Arc<dyn DataWriter>>,
        params: DataLoaderParams,
        listener: &Arc<dyn StatusListener>,
    ) -> Result<()> {
        let mut guard =
            StatusGuard::armed(id, DataLoaderStatus::Destroyed, Arc::downgrade(listener));

        let session = Arc::new(Session::new(
            id,
            params,
            channels,
            writer,
            Arc::clone(&self.storage),
            Arc::downgrade(listener),
            Arc::clone(&self.shutdown),
        ));

        {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(&id) {
                tracing::error!("Refusing to create {}: id already in use", id);
                return Err(ServiceError::DuplicateSession(id));
            }
            sessions.insert(id, Arc::clone(&session));
            if let Err(e) = session.create_loader(&self.factory) {
                sessions.remove(&id);
                tracing::error!("Rolled back creation of {}: {}", id, e);
                return Err(e);
            }
        }

        guard.disarm();
        report_status(&session.listener(), id, DataLoaderStatus::Created);
        Ok(())
    }

    /// Start a session's loader and register its descriptors with the
    /// loopers. A failed start leaves the session in place and reports
    /// STOPPED; an unknown id reports nothing.
    pub fn on_start(&self, id: SessionId) -> Result<()> {
        let mut guard = StatusGuard::disarmed(id, DataLoaderStatus::Stopped);

        let session = {
            let sessions = self.sessions.lock();
            let session = sessions
                .get(&id)
                .ok_or(ServiceError::NotFound(id))?
                .clone();
            guard.arm(session.listener());
            session.begin_start()?;
            session
        };

        // Register descriptors outside the registry lock; the looper threads
        // call back into sessions and must never contend with it.
        if let Some(fd) = session.channel_raw_fd(ChannelKind::PendingReads) {
            self.cmd_looper.ensure_running();
            self.cmd_looper.watch(fd, Arc::clone(&session));
        }
        if let Some(fd) = session.channel_raw_fd(ChannelKind::PageReads) {
            self.log_looper.ensure_running();
            self.log_looper.watch(fd, Arc::clone(&session));
        }

        guard.disarm();
        report_status(&session.listener(), id, DataLoaderStatus::Started);
        Ok(())
    }

    /// Stop a session: unregister its descriptors, then stop the loader.
    /// Idempotent; always reports STOPPED once the session is found.
    pub fn on_stop(&self, id: SessionId) -> Result<()> {
        let mut guard = StatusGuard::disarmed(id, DataLoaderStatus::Stopped);

        let session = {
            let sessions = self.sessions.lock();
            sessions
                .get(&id)
                .ok_or(ServiceError::NotFound(id))?
                .clone()
        };
        guard.arm(session.listener());

        if let Some(fd) = session.channel_raw_fd(ChannelKind::PendingReads) {
            self.cmd_looper.unwatch(fd);
        }
        if let Some(fd) = session.channel_raw_fd(ChannelKind::PageReads) {
            self.log_looper.unwatch(fd);
        }

        session.finish_stop();
        Ok(())
    }

    /// Destroy a session: force a stop, remove it from the registry, run the
    /// loader's destroy call, and release the loader. Reports DESTROYED.
    pub fn on_destroy(&self, id: SessionId) -> Result<()> {
        // Destruction always carries stop semantics first.
        let _ = self.on_stop(id);

        let mut guard = StatusGuard::disarmed(id, DataLoaderStatus::Destroyed);

        let session = {
            let mut sessions = self.sessions.lock();
            sessions.remove(&id).ok_or(ServiceError::NotFound(id))?
        };
        guard.arm(session.listener());

        session.finish_destroy();
        Ok(())
    }

    /// Forward an image-preparation request to the session's loader and
    /// report IMAGE_READY or IMAGE_NOT_READY. The session survives either
    /// outcome.
    pub fn on_prepare_image(
        &self,
        id: SessionId,
        added: &[InstallationFile],
        removed: &[String],
    ) -> Result<()> {
        let session = {
            let sessions = self.sessions.lock();
            sessions
                .get(&id)
                .ok_or(ServiceError::NotFound(id))?
                .clone()
        };

        // Image preparation can be long-running; dispatch outside the
        // registry lock. The loader lock still serializes it per session.
        let result = session.prepare_image(added, removed);

        let status = if result.is_ok() {
            DataLoaderStatus::ImageReady
        } else {
            DataLoaderStatus::ImageNotReady
        };
        report_status(&session.listener(), id, status);
        result
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// The configuration this service runs with.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Stop both loopers and join their threads. Sessions stay registered
    /// but no further notifications are delivered. Called automatically on
    /// drop.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cmd_looper.join();
        self.log_looper.join();
    }
}

impl Drop for DataLoaderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
