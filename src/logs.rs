//! Append-only check logs and their compressed archives.
//!
//! Live segments live at `<base>/<check id>.log`, archives at
//! `<base>/<check id>-<generation>.gz.b64`. Archives are written once with
//! `create_new` and never reopened for writing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

pub const SEGMENT_EXT: &str = ".log";
pub const ARCHIVE_EXT: &str = ".gz.b64";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive {0} already exists")]
    ArchiveExists(String),

    #[error("archive is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("archive content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogFile {
    Segment(String),
    Archive(String),
}

impl LogFile {
    fn from_file_name(name: &str) -> Option<Self> {
        if let Some(id) = name.strip_suffix(ARCHIVE_EXT) {
            return Some(LogFile::Archive(id.to_string()));
        }
        name.strip_suffix(SEGMENT_EXT)
            .map(|id| LogFile::Segment(id.to_string()))
    }
}

#[derive(Clone)]
pub struct LogStore {
    base_dir: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl LogStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn segment_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}{SEGMENT_EXT}"))
    }

    pub fn archive_path(&self, archive_id: &str) -> PathBuf {
        self.base_dir.join(format!("{archive_id}{ARCHIVE_EXT}"))
    }

    /// Exclusive access to one check's segment. Held by appends and by the
    /// rotator across read, archive and truncate.
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().await;
            locks.entry(id.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Drops the lock entry for `id` once nobody holds or waits on it.
    /// Call after releasing the guard returned by [`LogStore::lock`].
    pub async fn release(&self, id: &str) {
        let mut locks = self.locks.lock().await;
        if locks.get(id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            locks.remove(id);
        }
    }

    /// Appends one line to the check's segment, creating it if absent.
    pub async fn append(&self, id: &str, line: &str) -> Result<(), LogError> {
        let guard = self.lock(id).await;
        let result = self.append_locked(id, line).await;
        drop(guard);
        self.release(id).await;
        result
    }

    async fn append_locked(&self, id: &str, line: &str) -> Result<(), LogError> {
        fs::create_dir_all(&self.base_dir).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment_path(id))
            .await?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn list(&self, include_archives: bool) -> Result<Vec<LogFile>, LogError> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(file) = name.to_str().and_then(LogFile::from_file_name) else {
                continue;
            };
            if matches!(file, LogFile::Archive(_)) && !include_archives {
                continue;
            }
            files.push(file);
        }
        files.sort();
        Ok(files)
    }

    pub async fn list_segments(&self) -> Result<Vec<String>, LogError> {
        Ok(self
            .list(false)
            .await?
            .into_iter()
            .filter_map(|file| match file {
                LogFile::Segment(id) => Some(id),
                LogFile::Archive(_) => None,
            })
            .collect())
    }

    pub async fn read_segment(&self, id: &str) -> Result<String, LogError> {
        Ok(fs::read_to_string(self.segment_path(id)).await?)
    }

    /// Writes `content` gzipped and base64 encoded as a new archive and syncs
    /// it to disk. Fails if the archive already exists. A write that fails
    /// part way removes the archive so the next cycle can retry the name.
    pub async fn write_archive(&self, archive_id: &str, content: &str) -> Result<(), LogError> {
        let encoded = encode_archive(content)?;
        let path = self.archive_path(archive_id);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LogError::ArchiveExists(archive_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let written = match file.write_all(encoded.as_bytes()).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => Ok(()),
            Err(e) => Err(discard_partial(&path, e).await),
        }
    }

    /// Copies a segment into a new archive. Returns the number of bytes archived.
    pub async fn compress(&self, id: &str, archive_id: &str) -> Result<usize, LogError> {
        let content = self.read_segment(id).await?;
        self.write_archive(archive_id, &content).await?;
        Ok(content.len())
    }

    pub async fn decompress(&self, archive_id: &str) -> Result<String, LogError> {
        let encoded = fs::read_to_string(self.archive_path(archive_id)).await?;
        decode_archive(&encoded)
    }

    /// Empties a segment in place so later appends keep the same path.
    pub async fn truncate(&self, id: &str) -> Result<(), LogError> {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(self.segment_path(id))
            .await?;
        file.set_len(0).await?;
        file.sync_all().await?;
        Ok(())
    }
}

async fn discard_partial(path: &Path, cause: std::io::Error) -> LogError {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Could not remove partial archive");
    }
    LogError::Io(cause)
}

fn encode_archive(content: &str) -> Result<String, LogError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

fn decode_archive(encoded: &str) -> Result<String, LogError> {
    let compressed = STANDARD.decode(encoded.trim())?;
    let mut raw = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut raw)?;
    Ok(String::from_utf8(raw)?)
}
