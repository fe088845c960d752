//! The replicated state machine: an append-only, in-memory log of events.

use std::io::Read;
use std::sync::Mutex;
use std::sync::MutexGuard;

use openraft::EntryPayload;

use crate::snapshot::codec;
use crate::snapshot::EventSnapshot;
use crate::snapshot::SnapshotError;
use crate::typ::Entry;
use crate::typ::LogId;
use crate::typ::SnapshotMeta;
use crate::typ::StoredMembership;
use crate::Event;
use crate::EventResponse;

#[derive(Debug, Default)]
struct EventLog {
    last_applied: Option<LogId>,
    last_membership: StoredMembership,
    events: Vec<Event>,
}

/// Applies committed entries in log order and keeps the resulting event log.
///
/// Every replica applying the same entries ends up with the same event log. `apply`, `snapshot`
/// and `restore` are serialized by one lock, so a snapshot always sees a prefix of the applied
/// events.
#[derive(Debug, Default)]
pub struct EventFsm {
    log: Mutex<EventLog>,
}

impl EventFsm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of committed entries, returning one response per entry.
    ///
    /// An entry whose payload is not a valid event is skipped with a warning: it has already
    /// been committed by the cluster, so it still counts as applied.
    pub fn apply<I>(&self, entries: I) -> Vec<EventResponse>
    where I: IntoIterator<Item = Entry> {
        let mut log = self.lock();
        let mut res = Vec::new();

        for entry in entries {
            tracing::debug!(%entry.log_id, "apply to event log");

            log.last_applied = Some(entry.log_id);

            match entry.payload {
                EntryPayload::Blank => res.push(EventResponse::skipped()),
                EntryPayload::Normal(ref data) => match data.decode() {
                    Ok(event) => {
                        let position = log.events.len() as u64;
                        log.events.push(event);
                        res.push(EventResponse::appended(position));
                    }
                    Err(e) => {
                        tracing::warn!(%entry.log_id, error = %e, "skip entry that is not a valid event");
                        res.push(EventResponse::skipped());
                    }
                },
                EntryPayload::Membership(ref mem) => {
                    log.last_membership = StoredMembership::new(Some(entry.log_id), mem.clone());
                    res.push(EventResponse::skipped());
                }
            }
        }

        res
    }

    /// Take a point-in-time copy of the applied state.
    pub fn snapshot(&self) -> EventSnapshot {
        let log = self.lock();
        EventSnapshot::new(log.last_applied, log.last_membership.clone(), log.events.clone())
    }

    /// Replace the whole state with the snapshot read from `source`.
    ///
    /// The snapshot is decoded completely before anything is replaced: on error the current
    /// state is left untouched.
    pub fn restore<R: Read>(&self, source: R, meta: &SnapshotMeta) -> Result<(), SnapshotError> {
        let events = codec::decode(source)?;

        let mut log = self.lock();
        *log = EventLog {
            last_applied: meta.last_log_id,
            last_membership: meta.last_membership.clone(),
            events,
        };

        tracing::info!(last_applied = ?meta.last_log_id, events = log.events.len(), "event log restored");
        Ok(())
    }

    pub fn applied_state(&self) -> (Option<LogId>, StoredMembership) {
        let log = self.lock();
        (log.last_applied, log.last_membership.clone())
    }

    /// A copy of all applied events, in log order.
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, EventLog> {
        // A panic never leaves the log half-updated: every mutation is a single push or swap.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
