//! Snapshots of the event log: the point-in-time handle produced by the state machine, its
//! encoding, and the durable sinks it is persisted to.

use std::io;

use crate::typ::LogId;
use crate::typ::StoredMembership;
use crate::Event;

pub mod codec;
mod file_store;

pub use file_store::FileSnapshotSink;
pub use file_store::FileSnapshotStore;
pub use file_store::StoredSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("event of {0} bytes does not fit in a snapshot frame")]
    EventTooLarge(usize),

    #[error("not an event snapshot, magic: {0:?}")]
    BadMagic([u8; 4]),

    #[error("event {index} in snapshot is malformed: {source}")]
    MalformedEvent {
        index: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot has trailing bytes after {count} events")]
    TrailingBytes { count: u64 },

    #[error("snapshot meta is malformed: {0}")]
    MalformedMeta(#[source] serde_json::Error),
}

/// A writable destination for one snapshot.
///
/// A sink is finished exactly once: [`close`](Self::close) makes the written snapshot durable and
/// visible, [`cancel`](Self::cancel) discards whatever was written so far.
pub trait SnapshotSink: io::Write {
    fn cancel(self) -> io::Result<()>;

    fn close(self) -> io::Result<()>;
}

/// Run `write` against `sink`, then close it.
///
/// A failed write cancels the sink instead. The write error is returned even if cancelling fails
/// too; the cancel error is only logged.
pub(crate) fn write_or_cancel<S, F>(mut sink: S, write: F) -> Result<(), SnapshotError>
where
    S: SnapshotSink,
    F: FnOnce(&mut S) -> Result<(), SnapshotError>,
{
    if let Err(e) = write(&mut sink) {
        tracing::warn!(error = %e, "cancel snapshot: failed to write");

        if let Err(cancel_err) = sink.cancel() {
            tracing::warn!(error = %cancel_err, "failed to cancel snapshot sink");
        }
        return Err(e);
    }

    sink.close()?;
    Ok(())
}

/// A point-in-time copy of the event log, taken by [`EventFsm::snapshot`].
///
/// The copy is owned, so encoding it never blocks entries being applied meanwhile.
///
/// [`EventFsm::snapshot`]: crate::fsm::EventFsm::snapshot
#[derive(Debug, Clone, Default)]
pub struct EventSnapshot {
    last_applied: Option<LogId>,
    last_membership: StoredMembership,
    events: Vec<Event>,
}

impl EventSnapshot {
    pub(crate) fn new(last_applied: Option<LogId>, last_membership: StoredMembership, events: Vec<Event>) -> Self {
        Self {
            last_applied,
            last_membership,
            events,
        }
    }

    pub fn last_applied(&self) -> Option<LogId> {
        self.last_applied
    }

    pub fn last_membership(&self) -> &StoredMembership {
        &self.last_membership
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Encode the events into `sink` and finalize it.
    ///
    /// If anything fails while writing, the sink is cancelled so that no partial snapshot is
    /// left behind, and the write error is returned.
    pub fn persist<S: SnapshotSink>(&self, sink: S) -> Result<(), SnapshotError> {
        write_or_cancel(sink, |sink| codec::encode(sink, &self.events))
    }

    /// Drop the copied events. Calling it again is a no-op.
    pub fn release(&mut self) {
        self.events = Vec::new();
    }
}
