//! Storage handed to the consensus engine: the raft log in rocksdb and the event state machine
//! backed by on-disk snapshots.

use std::io::Cursor;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use openraft::storage::RaftStateMachine;
use openraft::OptionalSend;
use openraft::RaftSnapshotBuilder;
use openraft::StorageIOError;
use tokio::sync::RwLock;

use crate::fsm::EventFsm;
use crate::snapshot::FileSnapshotStore;
use crate::snapshot::SnapshotError;
use crate::snapshot::StoredSnapshot;
use crate::typ::Entry;
use crate::typ::LogId;
use crate::typ::Snapshot;
use crate::typ::SnapshotMeta;
use crate::typ::StorageError;
use crate::typ::StoredMembership;
use crate::EventResponse;
use crate::TypeConfig;

mod log_store;

pub use log_store::LogStore;

/// The state machine as seen by the consensus engine.
///
/// Entries go to the shared [`EventFsm`]; snapshots are written to and read back from a
/// [`FileSnapshotStore`], so the latest one survives a restart.
#[derive(Debug)]
pub struct StateMachineStore {
    fsm: Arc<EventFsm>,

    snapshots: FileSnapshotStore,

    snapshot_idx: AtomicU64,

    /// The last built or installed snapshot.
    current_snapshot: RwLock<Option<StoredSnapshot>>,
}

impl StateMachineStore {
    /// Create the store, restoring `fsm` from the latest snapshot on disk if there is one.
    ///
    /// An unreadable snapshot is an error: the node has no consistent state to start from.
    pub fn open(fsm: Arc<EventFsm>, snapshots: FileSnapshotStore) -> Result<Self, SnapshotError> {
        let current = snapshots.latest()?;

        if let Some(snapshot) = &current {
            tracing::info!(snapshot_id = %snapshot.meta.snapshot_id, "restore from snapshot");
            fsm.restore(&snapshot.data[..], &snapshot.meta)?;
        }

        Ok(Self {
            fsm,
            snapshots,
            snapshot_idx: AtomicU64::new(0),
            current_snapshot: RwLock::new(current),
        })
    }

    pub fn fsm(&self) -> &Arc<EventFsm> {
        &self.fsm
    }
}

impl RaftSnapshotBuilder<TypeConfig> for Arc<StateMachineStore> {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn build_snapshot(&mut self) -> Result<Snapshot, StorageError> {
        let mut snap = self.fsm.snapshot();

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;

        let snapshot_id = if let Some(last) = snap.last_applied() {
            format!("{}-{}-{}", last.leader_id, last.index, snapshot_idx)
        } else {
            format!("--{}", snapshot_idx)
        };

        let meta = SnapshotMeta {
            last_log_id: snap.last_applied(),
            last_membership: snap.last_membership().clone(),
            snapshot_id,
        };

        let write_err = |e: SnapshotError| StorageIOError::write_snapshot(Some(meta.signature()), &e);

        let sink = self.snapshots.create(&meta).map_err(write_err)?;
        snap.persist(sink).map_err(write_err)?;
        snap.release();

        let stored =
            self.snapshots.load(&meta).map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;

        tracing::info!(snapshot_id = %meta.snapshot_id, size = stored.data.len(), "snapshot built");

        let data = stored.data.clone();
        {
            let mut current_snapshot = self.current_snapshot.write().await;
            *current_snapshot = Some(stored);
        }

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStateMachine<TypeConfig> for Arc<StateMachineStore> {
    type SnapshotBuilder = Self;

    async fn applied_state(&mut self) -> Result<(Option<LogId>, StoredMembership), StorageError> {
        Ok(self.fsm.applied_state())
    }

    #[tracing::instrument(level = "trace", skip(self, entries))]
    async fn apply<I>(&mut self, entries: I) -> Result<Vec<EventResponse>, StorageError>
    where
        I: IntoIterator<Item = Entry> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        Ok(self.fsm.apply(entries))
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn begin_receiving_snapshot(&mut self) -> Result<Box<Cursor<Vec<u8>>>, StorageError> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    #[tracing::instrument(level = "trace", skip(self, snapshot))]
    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError> {
        tracing::info!(
            { snapshot_size = snapshot.get_ref().len() },
            "decoding snapshot for installation"
        );

        let new_snapshot = StoredSnapshot {
            meta: meta.clone(),
            data: snapshot.into_inner(),
        };

        self.fsm
            .restore(&new_snapshot.data[..], meta)
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;

        self.snapshots
            .save(meta, &new_snapshot.data)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;

        let mut current_snapshot = self.current_snapshot.write().await;
        *current_snapshot = Some(new_snapshot);
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot>, StorageError> {
        match &*self.current_snapshot.read().await {
            Some(snapshot) => Ok(Some(Snapshot {
                meta: snapshot.meta.clone(),
                snapshot: Box::new(Cursor::new(snapshot.data.clone())),
            })),
            None => Ok(None),
        }
    }
}
