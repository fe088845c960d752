//! The raft log, the vote and the committed log id, kept in rocksdb under `<data_dir>/raft`.
//!
//! Log entries are keyed by their index in big endian, so that iterating the `logs` column family
//! visits them in log order. Everything else is a JSON value in the `meta` column family.

use std::io;
use std::ops::RangeBounds;
use std::path::Path;
use std::sync::Arc;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use meta::StoreMeta;
use openraft::storage::LogState;
use openraft::AnyError;
use openraft::ErrorSubject;
use openraft::ErrorVerb;
use openraft::StorageIOError;
use openraft::Vote;
use rocksdb::ColumnFamily;
use rocksdb::ColumnFamilyDescriptor;
use rocksdb::Direction;
use rocksdb::IteratorMode;
use rocksdb::Options;
use rocksdb::DB;

use crate::typ::Entry;
use crate::typ::LogId;
use crate::typ::StorageError;
use crate::NodeId;
use crate::TypeConfig;

const CF_META: &str = "meta";
const CF_LOGS: &str = "logs";

#[derive(Debug, Clone)]
pub struct LogStore {
    db: Arc<DB>,
}

impl LogStore {
    /// Open the log at `path`, creating an empty one if there is none.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let mut db_opts = Options::default();
        db_opts.create_missing_column_families(true);
        db_opts.create_if_missing(true);

        let meta = ColumnFamilyDescriptor::new(CF_META, Options::default());
        let logs = ColumnFamilyDescriptor::new(CF_LOGS, Options::default());

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), vec![meta, logs]).map_err(io::Error::other)?;

        tracing::info!(path = %path.as_ref().display(), "raft log opened");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        let cf = self.db.cf_handle(name).ok_or_else(|| {
            StorageIOError::new(
                ErrorSubject::Store,
                ErrorVerb::Read,
                AnyError::error(format!("column family `{}` not found", name)),
            )
        })?;
        Ok(cf)
    }

    /// Get a store metadata.
    ///
    /// It returns `None` if the store does not have such a metadata stored.
    fn get_meta<M: StoreMeta>(&self) -> Result<Option<M::Value>, StorageError> {
        let bytes = self.db.get_cf(self.cf(CF_META)?, M::KEY).map_err(M::read_err)?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let t = serde_json::from_slice(&bytes).map_err(M::read_err)?;
        Ok(Some(t))
    }

    fn put_meta<M: StoreMeta>(&self, value: &M::Value) -> Result<(), StorageError> {
        let json_value = serde_json::to_vec(value).map_err(M::write_err)?;

        self.db.put_cf(self.cf(CF_META)?, M::KEY, json_value).map_err(M::write_err)?;
        Ok(())
    }

    fn try_get_log_entries<RB: RangeBounds<u64>>(&self, range: RB) -> Result<Vec<Entry>, StorageError> {
        let start = match range.start_bound() {
            std::ops::Bound::Included(x) => id_to_bin(*x),
            std::ops::Bound::Excluded(x) => id_to_bin(*x + 1),
            std::ops::Bound::Unbounded => id_to_bin(0),
        };

        let mut res = Vec::new();

        let it = self.db.iterator_cf(self.cf(CF_LOGS)?, IteratorMode::From(&start[..], Direction::Forward));
        for item in it {
            let (key, val) = item.map_err(|e| StorageIOError::read_logs(&e))?;

            let index = bin_to_id(&key)?;
            if !range.contains(&index) {
                break;
            }

            let entry: Entry = serde_json::from_slice(&val).map_err(|e| StorageIOError::read_logs(&e))?;
            res.push(entry);
        }
        Ok(res)
    }

    fn get_log_state(&self) -> Result<LogState<TypeConfig>, StorageError> {
        let last = self.db.iterator_cf(self.cf(CF_LOGS)?, IteratorMode::End).next();

        let last_log_id = match last {
            None => None,
            Some(item) => {
                let (_key, val) = item.map_err(|e| StorageIOError::read_logs(&e))?;
                let entry: Entry = serde_json::from_slice(&val).map_err(|e| StorageIOError::read_logs(&e))?;
                Some(entry.log_id)
            }
        };

        let last_purged_log_id = self.get_meta::<meta::LastPurged>()?;

        Ok(LogState {
            last_purged_log_id,
            last_log_id: last_log_id.or(last_purged_log_id),
        })
    }

    fn append<I>(&self, entries: I) -> Result<(), StorageError>
    where I: IntoIterator<Item = Entry> {
        let cf = self.cf(CF_LOGS)?;

        for entry in entries {
            let value = serde_json::to_vec(&entry).map_err(|e| StorageIOError::write_logs(&e))?;
            self.db.put_cf(cf, id_to_bin(entry.log_id.index), value).map_err(|e| StorageIOError::write_logs(&e))?;
        }

        self.db.flush_wal(true).map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    fn truncate(&self, log_id: LogId) -> Result<(), StorageError> {
        tracing::debug!("delete_log: [{:?}, +oo)", log_id);

        let from = id_to_bin(log_id.index);
        let to = id_to_bin(u64::MAX);
        self.db.delete_range_cf(self.cf(CF_LOGS)?, from, to).map_err(|e| StorageIOError::write_logs(&e))?;

        self.db.flush_wal(true).map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    fn purge(&self, log_id: LogId) -> Result<(), StorageError> {
        tracing::debug!("delete_log: (-oo, {:?}]", log_id);

        // Logs at and before the last purged log id are ignored once it is saved, so the range
        // delete does not have to be atomic with it.
        self.put_meta::<meta::LastPurged>(&log_id)?;

        let from = id_to_bin(0);
        let to = id_to_bin(log_id.index + 1);
        self.db.delete_range_cf(self.cf(CF_LOGS)?, from, to).map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }

    fn save_vote(&self, vote: &Vote<NodeId>) -> Result<(), StorageError> {
        self.put_meta::<meta::Vote>(vote)?;
        self.db.flush_wal(true).map_err(|e| StorageIOError::write_vote(&e))?;
        Ok(())
    }
}

mod impl_log_store {
    use std::fmt::Debug;
    use std::ops::RangeBounds;

    use openraft::storage::LogFlushed;
    use openraft::storage::LogState;
    use openraft::storage::RaftLogStorage;
    use openraft::OptionalSend;
    use openraft::RaftLogReader;
    use openraft::Vote;

    use super::meta;
    use super::LogStore;
    use crate::typ::Entry;
    use crate::typ::LogId;
    use crate::typ::StorageError;
    use crate::NodeId;
    use crate::TypeConfig;

    impl RaftLogReader<TypeConfig> for LogStore {
        async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
            &mut self,
            range: RB,
        ) -> Result<Vec<Entry>, StorageError> {
            LogStore::try_get_log_entries(self, range)
        }
    }

    impl RaftLogStorage<TypeConfig> for LogStore {
        type LogReader = Self;

        async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError> {
            LogStore::get_log_state(self)
        }

        async fn save_committed(&mut self, committed: Option<LogId>) -> Result<(), StorageError> {
            self.put_meta::<meta::Committed>(&committed)
        }

        async fn read_committed(&mut self) -> Result<Option<LogId>, StorageError> {
            Ok(self.get_meta::<meta::Committed>()?.flatten())
        }

        #[tracing::instrument(level = "trace", skip(self))]
        async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError> {
            LogStore::save_vote(self, vote)
        }

        async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError> {
            self.get_meta::<meta::Vote>()
        }

        #[tracing::instrument(level = "trace", skip(self, entries, callback))]
        async fn append<I>(&mut self, entries: I, callback: LogFlushed<TypeConfig>) -> Result<(), StorageError>
        where
            I: IntoIterator<Item = Entry> + OptionalSend,
            I::IntoIter: OptionalSend,
        {
            // If there is an error, the callback is dropped.
            LogStore::append(self, entries)?;
            callback.log_io_completed(Ok(()));
            Ok(())
        }

        #[tracing::instrument(level = "debug", skip(self))]
        async fn truncate(&mut self, log_id: LogId) -> Result<(), StorageError> {
            LogStore::truncate(self, log_id)
        }

        #[tracing::instrument(level = "debug", skip(self))]
        async fn purge(&mut self, log_id: LogId) -> Result<(), StorageError> {
            LogStore::purge(self, log_id)
        }

        async fn get_log_reader(&mut self) -> Self::LogReader {
            self.clone()
        }
    }
}

/// Metadata of the raft log.
///
/// Besides the logs, raft has to keep a few values across restarts. This mod defines their keys
/// and value types.
mod meta {
    use openraft::AnyError;
    use openraft::ErrorSubject;
    use openraft::ErrorVerb;
    use openraft::StorageIOError;

    use crate::typ::LogId;
    use crate::NodeId;

    pub(crate) trait StoreMeta {
        /// The key in the `meta` column family.
        const KEY: &'static str;

        type Value: serde::Serialize + serde::de::DeserializeOwned;

        /// The subject embedded into the returned storage error.
        fn subject() -> ErrorSubject<NodeId>;

        fn read_err(e: impl std::error::Error + 'static) -> StorageIOError<NodeId> {
            StorageIOError::new(Self::subject(), ErrorVerb::Read, AnyError::new(&e))
        }

        fn write_err(e: impl std::error::Error + 'static) -> StorageIOError<NodeId> {
            StorageIOError::new(Self::subject(), ErrorVerb::Write, AnyError::new(&e))
        }
    }

    pub(crate) struct LastPurged {}
    pub(crate) struct Vote {}
    pub(crate) struct Committed {}

    impl StoreMeta for LastPurged {
        const KEY: &'static str = "last_purged_log_id";
        type Value = LogId;

        fn subject() -> ErrorSubject<NodeId> {
            ErrorSubject::Store
        }
    }

    impl StoreMeta for Vote {
        const KEY: &'static str = "vote";
        type Value = openraft::Vote<NodeId>;

        fn subject() -> ErrorSubject<NodeId> {
            ErrorSubject::Vote
        }
    }

    impl StoreMeta for Committed {
        const KEY: &'static str = "committed";
        type Value = Option<LogId>;

        fn subject() -> ErrorSubject<NodeId> {
            ErrorSubject::Store
        }
    }
}

/// Big endian keeps the keys sorted by index.
fn id_to_bin(id: u64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, id);
    buf
}

fn bin_to_id(buf: &[u8]) -> Result<u64, StorageError> {
    if buf.len() != 8 {
        let e = io::Error::new(io::ErrorKind::InvalidData, format!("log key of {} bytes", buf.len()));
        return Err(StorageIOError::read_logs(&e).into());
    }
    Ok(BigEndian::read_u64(buf))
}

#[cfg(test)]
mod tests {
    use openraft::CommittedLeaderId;
    use openraft::EntryPayload;

    use super::*;

    fn log_id(index: u64) -> LogId {
        LogId::new(CommittedLeaderId::new(1, 0), index)
    }

    fn blank(index: u64) -> Entry {
        Entry {
            log_id: log_id(index),
            payload: EntryPayload::Blank,
        }
    }

    fn indexes(entries: &[Entry]) -> Vec<u64> {
        entries.iter().map(|e| e.log_id.index).collect()
    }

    #[test]
    fn test_truncate_and_purge() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LogStore::open(dir.path())?;
        store.append((1..=10).map(blank))?;

        store.truncate(log_id(8))?;
        assert_eq!(vec![1, 2, 3, 4, 5, 6, 7], indexes(&store.try_get_log_entries(..)?));

        store.purge(log_id(3))?;
        assert_eq!(vec![4, 5, 6, 7], indexes(&store.try_get_log_entries(..)?));
        assert_eq!(vec![5, 6], indexes(&store.try_get_log_entries(5..7)?));

        let state = store.get_log_state()?;
        assert_eq!(Some(log_id(3)), state.last_purged_log_id);
        assert_eq!(Some(log_id(7)), state.last_log_id);
        Ok(())
    }

    #[test]
    fn test_log_state_after_purging_everything() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LogStore::open(dir.path())?;
        store.append((1..=3).map(blank))?;
        store.purge(log_id(3))?;

        let state = store.get_log_state()?;
        assert_eq!(Some(log_id(3)), state.last_purged_log_id);
        assert_eq!(Some(log_id(3)), state.last_log_id);
        Ok(())
    }

    #[test]
    fn test_empty_log() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LogStore::open(dir.path())?;

        let state = store.get_log_state()?;
        assert_eq!(None, state.last_purged_log_id);
        assert_eq!(None, state.last_log_id);
        assert!(store.get_meta::<meta::Vote>()?.is_none());
        assert!(store.get_meta::<meta::Committed>()?.is_none());
        Ok(())
    }

    #[test]
    fn test_survives_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let vote = Vote::new_committed(2, 7);

        {
            let store = LogStore::open(dir.path())?;
            store.append((1..=5).map(blank))?;
            store.purge(log_id(1))?;
            store.save_vote(&vote)?;
            store.put_meta::<meta::Committed>(&Some(log_id(4)))?;
        }

        let store = LogStore::open(dir.path())?;
        assert_eq!(vec![2, 3, 4, 5], indexes(&store.try_get_log_entries(..)?));
        assert_eq!(Some(vote), store.get_meta::<meta::Vote>()?);
        assert_eq!(Some(Some(log_id(4))), store.get_meta::<meta::Committed>()?);

        let state = store.get_log_state()?;
        assert_eq!(Some(log_id(1)), state.last_purged_log_id);
        assert_eq!(Some(log_id(5)), state.last_log_id);
        Ok(())
    }

    #[test]
    fn test_keys_sort_by_index() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LogStore::open(dir.path())?;

        // 256 sorts before 1 in little endian.
        store.append([blank(256), blank(1), blank(2)])?;
        assert_eq!(vec![1, 2, 256], indexes(&store.try_get_log_entries(..)?));
        assert_eq!(vec![2], indexes(&store.try_get_log_entries(2..256)?));
        assert_eq!(Some(log_id(256)), store.get_log_state()?.last_log_id);

        assert_eq!(256, bin_to_id(&id_to_bin(256))?);
        assert!(bin_to_id(&[1, 2, 3]).is_err());
        Ok(())
    }
}
