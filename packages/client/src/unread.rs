//! Durable storage for per-room unread counts.
//!
//! Counts are written after every change so that other client processes
//! sharing the same file observe a consistent value.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use tokio::{runtime::Handle, sync::watch};

use crate::error::ClientError;

/// Room id → unread count
pub type UnreadCounts = BTreeMap<i64, u32>;

pub trait UnreadStorage: Send + Sync {
    /// Read the persisted counts; a missing store is empty
    fn load(&self) -> Result<UnreadCounts, ClientError>;

    /// Replace the persisted counts
    fn save(&self, counts: &UnreadCounts) -> Result<(), ClientError>;
}

/// Unread counts kept only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryUnreadStorage {
    counts: Mutex<UnreadCounts>,
}

impl MemoryUnreadStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(counts: UnreadCounts) -> Self {
        Self {
            counts: Mutex::new(counts),
        }
    }
}

impl UnreadStorage for MemoryUnreadStorage {
    fn load(&self) -> Result<UnreadCounts, ClientError> {
        let counts = self
            .counts
            .lock()
            .map_err(|_| ClientError::Storage("unread counts lock poisoned".to_string()))?;
        Ok(counts.clone())
    }

    fn save(&self, counts: &UnreadCounts) -> Result<(), ClientError> {
        let mut stored = self
            .counts
            .lock()
            .map_err(|_| ClientError::Storage("unread counts lock poisoned".to_string()))?;
        *stored = counts.clone();
        Ok(())
    }
}

/// Unread counts stored as a JSON object in a file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so readers never see a half-written document. Inside a tokio
/// runtime `save` only records the counts; a writer task flushes the latest
/// ones with `tokio::fs`, so callers on the runtime never block on disk.
#[derive(Debug)]
pub struct FileUnreadStorage {
    path: PathBuf,
    writer: OnceLock<Writer>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    seq: u64,
    counts: UnreadCounts,
}

#[derive(Debug)]
struct Writer {
    latest: watch::Sender<Snapshot>,
    written: watch::Receiver<u64>,
}

impl Writer {
    fn spawn(runtime: &Handle, path: PathBuf) -> Self {
        let (latest, latest_rx) = watch::channel(Snapshot::default());
        let (written_tx, written) = watch::channel(0);
        runtime.spawn(write_loop(path, latest_rx, written_tx));
        Self { latest, written }
    }
}

/// Writes only the newest snapshot; intermediate ones are skipped.
async fn write_loop(
    path: PathBuf,
    mut latest: watch::Receiver<Snapshot>,
    written: watch::Sender<u64>,
) {
    while latest.changed().await.is_ok() {
        let snapshot = latest.borrow_and_update().clone();
        if let Err(e) = write_file(&path, &snapshot.counts).await {
            tracing::warn!("Failed to persist unread counts: {}", e);
        }
        written.send_replace(snapshot.seq);
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn encode(counts: &UnreadCounts) -> Result<String, ClientError> {
    serde_json::to_string(counts)
        .map_err(|e| ClientError::Storage(format!("failed to encode unread counts: {}", e)))
}

fn write_error(path: &Path, e: std::io::Error) -> ClientError {
    ClientError::Storage(format!("failed to write {}: {}", path.display(), e))
}

async fn write_file(path: &Path, counts: &UnreadCounts) -> Result<(), ClientError> {
    let json = encode(counts)?;
    let temp = temp_path(path);
    tokio::fs::write(&temp, json)
        .await
        .map_err(|e| write_error(path, e))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| write_error(path, e))
}

impl FileUnreadStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every count saved so far has reached the file
    pub async fn flush(&self) {
        let Some(writer) = self.writer.get() else {
            return;
        };
        let target = writer.latest.borrow().seq;
        let mut written = writer.written.clone();
        let _ = written.wait_for(|seq| *seq >= target).await;
    }
}

impl UnreadStorage for FileUnreadStorage {
    fn load(&self) -> Result<UnreadCounts, ClientError> {
        if let Some(writer) = self.writer.get() {
            return Ok(writer.latest.borrow().counts.clone());
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(UnreadCounts::new()),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        serde_json::from_str(&raw).map_err(|e| {
            ClientError::Storage(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, counts: &UnreadCounts) -> Result<(), ClientError> {
        let Ok(runtime) = Handle::try_current() else {
            let temp = temp_path(&self.path);
            return fs::write(&temp, encode(counts)?)
                .and_then(|_| fs::rename(&temp, &self.path))
                .map_err(|e| write_error(&self.path, e));
        };
        let writer = self
            .writer
            .get_or_init(|| Writer::spawn(&runtime, self.path.clone()));
        writer.latest.send_modify(|snapshot| {
            snapshot.seq += 1;
            snapshot.counts = counts.clone();
        });
        Ok(())
    }
}
