//! Status delivery to the supervising listener.
//!
//! Delivery is at-most-once and best-effort: no retries, no queueing. Call
//! sites wrap each lifecycle operation in a [`StatusGuard`] that fires a
//! fallback status on scope exit unless explicitly disarmed, so every
//! create/start/stop/destroy yields exactly one report on every path.

use std::sync::Weak;

use dataloader_core::{DataLoaderStatus, SessionId, StatusListener};

/// Deliver one status to the listener, if it is still alive.
///
/// Logs and returns false when the listener has gone away.
pub(crate) fn report_status(
    listener: &Weak<dyn StatusListener>,
    session: SessionId,
    status: DataLoaderStatus,
) -> bool {
    let Some(listener) = listener.upgrade() else {
        tracing::error!("No listener to report to for {}, status={}", session, status);
        return false;
    };
    listener.on_status_changed(session, status);
    tracing::debug!("Reported status for {}: {}", session, status);
    true
}

/// Reports a fallback status when dropped, unless disarmed.
///
/// Created disarmed when the listener is not known yet; armed with the
/// session's listener once the session has been looked up. The success path
/// disarms the guard and reports its own status explicitly.
pub(crate) struct StatusGuard {
    session: SessionId,
    fallback: DataLoaderStatus,
    listener: Option<Weak<dyn StatusListener>>,
}

impl StatusGuard {
    /// A guard that reports nothing until armed.
    pub(crate) fn disarmed(session: SessionId, fallback: DataLoaderStatus) -> Self {
        Self {
            session,
            fallback,
            listener: None,
        }
    }

    /// A guard armed from the start.
    pub(crate) fn armed(
        session: SessionId,
        fallback: DataLoaderStatus,
        listener: Weak<dyn StatusListener>,
    ) -> Self {
        Self {
            session,
            fallback,
            listener: Some(listener),
        }
    }

    /// Arm (or re-target) the guard with the session's listener.
    pub(crate) fn arm(&mut self, listener: Weak<dyn StatusListener>) {
        self.listener = Some(listener);
    }

    /// Disarm the guard; nothing is reported on drop.
    pub(crate) fn disarm(&mut self) {
        self.listener = None;
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            report_status(&listener, self.session, self.fallback);
        }
    }
}
