//! Notification loopers.
//!
//! One looper per channel kind, each on its own lazily-spawned thread,
//! multiplexing a blocking poll over the descriptors of all running
//! sessions. Keeping the two loops independent keeps pending-read and
//! page-read latencies independent of each other.
//!
//! Registration is safe while the loop is polling: a self-pipe wakes the
//! poll so a freshly-watched descriptor is observed promptly. The looper
//! holds only non-owning raw-descriptor keys; the `Arc<Session>` in the
//! table keeps the descriptor alive for the duration of a poll pass.

use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::{pipe2, read, write};
use parking_lot::Mutex;

use dataloader_core::ReadInfo;

use crate::channel::ChannelKind;
use crate::session::Session;

pub(crate) struct Looper {
    kind: ChannelKind,
    poll_timeout: PollTimeout,
    batch_capacity: usize,
    watches: Mutex<HashMap<RawFd, Arc<Session>>>,
    wake_rx: OwnedFd,
    wake_tx: OwnedFd,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Looper {
    pub(crate) fn new(
        kind: ChannelKind,
        poll_timeout: Duration,
        batch_capacity: usize,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let (wake_rx, wake_tx) = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
        let timeout_ms = i32::try_from(poll_timeout.as_millis()).unwrap_or(i32::MAX);
        let poll_timeout = PollTimeout::try_from(timeout_ms).unwrap_or(PollTimeout::MAX);
        Ok(Self {
            kind,
            poll_timeout,
            batch_capacity,
            watches: Mutex::new(HashMap::new()),
            wake_rx,
            wake_tx,
            shutdown,
            thread: Mutex::new(None),
        })
    }

    /// Spawn the looper thread if it is not running yet.
    pub(crate) fn ensure_running(self: &Arc<Self>) {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return;
        }
        let looper = Arc::clone(self);
        let name = format!("incfs-{}-looper", self.kind.as_str());
        match std::thread::Builder::new().name(name).spawn(move || looper.run()) {
            Ok(handle) => *slot = Some(handle),
            Err(e) => tracing::error!(
                "Failed to spawn {} notification looper: {}",
                self.kind.as_str(),
                e
            ),
        }
    }

    /// Start watching a session's descriptor and wake the poll so it is
    /// picked up immediately. Idempotent per descriptor.
    pub(crate) fn watch(&self, fd: RawFd, session: Arc<Session>) {
        self.watches.lock().insert(fd, session);
        self.wake();
    }

    /// Stop watching a descriptor. Returns whether it was being watched.
    pub(crate) fn unwatch(&self, fd: RawFd) -> bool {
        let removed = self.watches.lock().remove(&fd).is_some();
        if removed {
            self.wake();
        }
        removed
    }

    /// Wake the blocking poll. Errors (a full pipe already wakes) are ignored.
    pub(crate) fn wake(&self) {
        let _ = write(&self.wake_tx, &[1u8]);
    }

    /// Wake the looper and join its thread, if one was ever spawned.
    pub(crate) fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            self.wake();
            if handle.join().is_err() {
                tracing::error!("{} notification looper thread panicked", self.kind.as_str());
            }
        }
    }

    fn run(&self) {
        tracing::debug!("{} notification looper started", self.kind.as_str());
        let mut scratch = Vec::with_capacity(self.batch_capacity);
        while !self.shutdown.load(Ordering::Acquire) {
            self.poll_once(&mut scratch);
        }
        tracing::debug!("{} notification looper stopped", self.kind.as_str());
    }

    fn poll_once(&self, scratch: &mut Vec<ReadInfo>) {
        // Snapshot the table; the Arcs keep the descriptors alive while the
        // borrowed poll entries reference them.
        let watches: Vec<(RawFd, Arc<Session>)> = self
            .watches
            .lock()
            .iter()
            .map(|(fd, session)| (*fd, Arc::clone(session)))
            .collect();

        let mut fds = Vec::with_capacity(watches.len() + 1);
        fds.push(PollFd::new(self.wake_rx.as_fd(), PollFlags::POLLIN));
        let mut active = Vec::with_capacity(watches.len());
        for (raw, session) in &watches {
            if let Some(fd) = session.channel_fd(self.kind) {
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
                active.push((*raw, session));
            }
        }

        match poll(&mut fds, self.poll_timeout) {
            Ok(0) | Err(Errno::EINTR) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("{} looper poll failed: {}", self.kind.as_str(), e);
                return;
            }
        }

        if fds[0]
            .revents()
            .unwrap_or_else(PollFlags::empty)
            .contains(PollFlags::POLLIN)
        {
            self.drain_wake();
        }

        let mut dead = Vec::new();
        for (pfd, (raw, session)) in fds[1..].iter().zip(active.iter()) {
            let revents = pfd.revents().unwrap_or_else(PollFlags::empty);
            if revents.is_empty() {
                continue;
            }
            let keep = session.on_channel_ready(self.kind, self.batch_capacity, scratch);
            let hangup = revents
                .intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL);
            if !keep || hangup {
                dead.push(*raw);
            }
        }
        drop(fds);

        if !dead.is_empty() {
            let mut watches = self.watches.lock();
            for fd in dead {
                if watches.remove(&fd).is_some() {
                    tracing::debug!(
                        "{} looper dropped descriptor {} from the watch table",
                        self.kind.as_str(),
                        fd
                    );
                }
            }
        }
    }

    fn drain_wake(&self) {
        let mut buf = [0u8; 16];
        while matches!(read(self.wake_rx.as_raw_fd(), &mut buf), Ok(n) if n > 0) {}
    }
}
