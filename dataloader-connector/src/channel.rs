//! Kernel notification channels and the bounded drain.
//!
//! Each session carries up to two descriptors: the command channel delivers
//! pending-read (read-miss) records, the log channel page-read records. The
//! drain never blocks: a zero-timeout poll gates a single bounded read, and
//! the caller loops until a drain yields nothing.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::read;

use dataloader_core::ReadInfo;

/// Which notification channel a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelKind {
    /// Command channel: pending-read records
    PendingReads,
    /// Log channel: page-read records
    PageReads,
}

impl ChannelKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ChannelKind::PendingReads => "cmd",
            ChannelKind::PageReads => "log",
        }
    }
}

/// The notification descriptors of one session.
///
/// Either descriptor may be absent; a session with neither simply never
/// receives notifications. Ownership transfers in at session creation and
/// the descriptors are closed exactly once, when the session is dropped.
#[derive(Debug, Default)]
pub struct NotificationChannels {
    cmd: Option<OwnedFd>,
    logs: Option<OwnedFd>,
}

impl NotificationChannels {
    /// Bundle the command and log descriptors, taking ownership.
    pub fn new(cmd: Option<OwnedFd>, logs: Option<OwnedFd>) -> Self {
        Self { cmd, logs }
    }

    pub(crate) fn fd(&self, kind: ChannelKind) -> Option<BorrowedFd<'_>> {
        match kind {
            ChannelKind::PendingReads => self.cmd.as_ref().map(|fd| fd.as_fd()),
            ChannelKind::PageReads => self.logs.as_ref().map(|fd| fd.as_fd()),
        }
    }

    pub(crate) fn raw_fd(&self, kind: ChannelKind) -> Option<RawFd> {
        self.fd(kind).map(|fd| fd.as_raw_fd())
    }
}

/// Drain one bounded batch of records from a notification descriptor.
///
/// Returns at most `capacity` records in kernel delivery order. Anything
/// that prevents a read (no data, EOF, a poll or read error) leaves `out`
/// empty; transient conditions are indistinguishable from an idle channel,
/// so real errors are only logged.
pub(crate) fn drain(fd: BorrowedFd<'_>, capacity: usize, out: &mut Vec<ReadInfo>) {
    out.clear();

    let mut probe = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut probe, PollTimeout::ZERO) {
        Ok(n) if n > 0 => {}
        Ok(_) => return,
        Err(Errno::EINTR) => return,
        Err(e) => {
            tracing::warn!("notification channel poll failed, treating as no data: {}", e);
            return;
        }
    }

    let mut buf = vec![0u8; capacity * ReadInfo::WIRE_SIZE];
    match read(fd.as_raw_fd(), &mut buf) {
        Ok(0) => {}
        Ok(n) => {
            let mut chunks = buf[..n].chunks_exact(ReadInfo::WIRE_SIZE);
            for chunk in chunks.by_ref() {
                let raw: &[u8; ReadInfo::WIRE_SIZE] =
                    chunk.try_into().expect("chunk is exactly one record");
                out.push(ReadInfo::from_wire(raw));
            }
            let stray = chunks.remainder().len();
            if stray != 0 {
                tracing::warn!(
                    "notification channel delivered a truncated record, dropping {} stray bytes",
                    stray
                );
            }
        }
        Err(Errno::EAGAIN) | Err(Errno::EINTR) => {}
        Err(e) => {
            tracing::warn!("notification channel read failed, treating as no data: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataloader_core::FileId;
    use nix::fcntl::OFlag;
    use nix::unistd::{pipe2, write};

    fn record(serial: u32) -> ReadInfo {
        ReadInfo {
            file_id: FileId::new([serial as u8; 16]),
            timestamp_us: 1000 + u64::from(serial),
            block_index: serial * 4,
            serial_no: serial,
        }
    }

    fn push(fd: &OwnedFd, records: &[ReadInfo]) {
        for r in records {
            assert_eq!(write(fd, &r.to_wire()).unwrap(), ReadInfo::WIRE_SIZE);
        }
    }

    #[test]
    fn test_drain_empty_channel() {
        let (rx, _tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let mut out = Vec::new();
        drain(rx.as_fd(), 256, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_drain_preserves_order() {
        let (rx, tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let records: Vec<_> = (1..=3).map(record).collect();
        push(&tx, &records);

        let mut out = Vec::new();
        drain(rx.as_fd(), 256, &mut out);
        assert_eq!(out, records);

        drain(rx.as_fd(), 256, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_drain_respects_batch_capacity() {
        let (rx, tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let records: Vec<_> = (1..=5).map(record).collect();
        push(&tx, &records);

        // Successive bounded drains see every record exactly once.
        let mut seen = Vec::new();
        let mut out = Vec::new();
        loop {
            drain(rx.as_fd(), 2, &mut out);
            if out.is_empty() {
                break;
            }
            assert!(out.len() <= 2);
            seen.extend_from_slice(&out);
        }
        assert_eq!(seen, records);
    }

    // A short read that splits a record keeps the whole records and drops
    // the stray tail bytes.
    #[test]
    fn test_drain_drops_truncated_tail() {
        let (rx, tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let full = record(1);
        let mut bytes = full.to_wire().to_vec();
        bytes.extend_from_slice(&[0xee; 5]);
        assert_eq!(write(&tx, &bytes).unwrap(), bytes.len());

        let mut out = Vec::new();
        drain(rx.as_fd(), 256, &mut out);
        assert_eq!(out, vec![full]);
    }

    // A closed peer is indistinguishable from an idle channel: the drain
    // reports no data rather than an error (best-effort fallback).
    #[test]
    fn test_drain_closed_channel_is_no_data() {
        let (rx, tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        drop(tx);
        let mut out = vec![record(9)];
        drain(rx.as_fd(), 256, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_channels_lookup() {
        let (rx, _tx) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let raw = rx.as_raw_fd();
        let channels = NotificationChannels::new(Some(rx), None);
        assert_eq!(channels.raw_fd(ChannelKind::PendingReads), Some(raw));
        assert_eq!(channels.raw_fd(ChannelKind::PageReads), None);
    }
}
