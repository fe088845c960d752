use std::fs;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use crate::snapshot::write_or_cancel;
use crate::snapshot::SnapshotError;
use crate::snapshot::SnapshotSink;
use crate::typ::SnapshotMeta;

const META_FILE: &str = "meta.json";
const STATE_FILE: &str = "state.bin";
const TMP_SUFFIX: &str = ".tmp";

/// A snapshot read back from disk.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub meta: SnapshotMeta,

    /// The encoded event log.
    pub data: Vec<u8>,
}

/// Keeps snapshots as directories under one parent directory:
///
/// ```text
/// <dir>/<last index:020>-<snapshot id>/meta.json
///                                     /state.bin
/// ```
///
/// A snapshot is written into a `.tmp` directory first and renamed into place on close, so a
/// directory without the suffix is always complete. Only the newest `retain` snapshots are kept.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    retain: usize,
}

impl FileSnapshotStore {
    /// Open the store at `dir`, creating it if needed and removing unfinished snapshots left by a
    /// previous process.
    pub fn open(dir: impl AsRef<Path>, retain: usize) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let store = Self { dir, retain };

        for name in store.dir_names()? {
            if name.ends_with(TMP_SUFFIX) {
                tracing::info!(dir = %store.dir.join(&name).display(), "remove unfinished snapshot");
                fs::remove_dir_all(store.dir.join(&name))?;
            }
        }

        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start writing a snapshot described by `meta`.
    ///
    /// Nothing is visible to [`latest`](Self::latest) until the returned sink is closed.
    pub fn create(&self, meta: &SnapshotMeta) -> Result<FileSnapshotSink, SnapshotError> {
        let name = dir_name(meta);
        let tmp = self.dir.join(format!("{}{}", name, TMP_SUFFIX));

        if tmp.exists() {
            fs::remove_dir_all(&tmp)?;
        }
        fs::create_dir_all(&tmp)?;

        let mut meta_file = File::create(tmp.join(META_FILE))?;
        serde_json::to_writer(&mut meta_file, meta)?;
        meta_file.sync_all()?;

        let state = BufWriter::new(File::create(tmp.join(STATE_FILE))?);

        Ok(FileSnapshotSink {
            store: self.clone(),
            tmp,
            dest: self.dir.join(name),
            state,
        })
    }

    /// Write an already encoded snapshot.
    pub fn save(&self, meta: &SnapshotMeta, data: &[u8]) -> Result<(), SnapshotError> {
        let sink = self.create(meta)?;
        write_or_cancel(sink, |sink| Ok(sink.write_all(data)?))
    }

    /// The most recent complete snapshot, if any.
    pub fn latest(&self) -> Result<Option<StoredSnapshot>, SnapshotError> {
        let names = self.snapshot_names()?;

        let Some(name) = names.last() else {
            return Ok(None);
        };

        let snapshot = self.read(&self.dir.join(name))?;
        Ok(Some(snapshot))
    }

    /// Read back the complete snapshot described by `meta`.
    pub fn load(&self, meta: &SnapshotMeta) -> Result<StoredSnapshot, SnapshotError> {
        self.read(&self.dir.join(dir_name(meta)))
    }

    /// Names of complete snapshots, oldest first.
    pub fn snapshot_names(&self) -> io::Result<Vec<String>> {
        let mut names = self.dir_names()?.into_iter().filter(|name| !name.ends_with(TMP_SUFFIX)).collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &Path) -> Result<StoredSnapshot, SnapshotError> {
        let meta_file = File::open(path.join(META_FILE))?;
        let meta: SnapshotMeta = serde_json::from_reader(io::BufReader::new(meta_file)).map_err(SnapshotError::MalformedMeta)?;

        let data = fs::read(path.join(STATE_FILE))?;

        Ok(StoredSnapshot { meta, data })
    }

    /// Remove all but the newest `retain` snapshots.
    fn reap(&self) -> io::Result<()> {
        let names = self.snapshot_names()?;
        let excess = names.len().saturating_sub(self.retain);

        for name in &names[..excess] {
            tracing::debug!(snapshot = %name, "reap old snapshot");
            fs::remove_dir_all(self.dir.join(name))?;
        }
        Ok(())
    }

    fn dir_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// A snapshot being written by [`FileSnapshotStore::create`].
pub struct FileSnapshotSink {
    store: FileSnapshotStore,
    tmp: PathBuf,
    dest: PathBuf,
    state: BufWriter<File>,
}

impl Write for FileSnapshotSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.flush()
    }
}

impl SnapshotSink for FileSnapshotSink {
    fn cancel(self) -> io::Result<()> {
        drop(self.state);
        fs::remove_dir_all(&self.tmp)
    }

    fn close(self) -> io::Result<()> {
        let file = self.state.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        if self.dest.exists() {
            fs::remove_dir_all(&self.dest)?;
        }
        fs::rename(&self.tmp, &self.dest)?;

        tracing::info!(snapshot = %self.dest.display(), "snapshot saved");

        // The snapshot is in place; old ones are left for the next close if they can not be removed.
        if let Err(e) = self.store.reap() {
            tracing::warn!(error = %e, dir = %self.store.dir.display(), "failed to remove old snapshots");
        }
        Ok(())
    }
}

fn dir_name(meta: &SnapshotMeta) -> String {
    let index = meta.last_log_id.map(|x| x.index).unwrap_or_default();

    let id = meta
        .snapshot_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>();

    format!("{:020}-{}", index, id)
}
