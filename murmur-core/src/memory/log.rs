//! JSON-lines memory log

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, SeekFrom};
use tokio::sync::Mutex;

use super::{MemoryLog, MemoryRecord};
use crate::error::{MurmurError, Result};

/// Append-only memory log stored as one JSON object per line.
///
/// Every append is written with a single `write_all` under the writer lock and
/// synchronized to disk before it returns, so records are never interleaved
/// and a crash after a successful append cannot lose it.
pub struct JsonlMemoryLog {
    path: PathBuf,
    writer: Mutex<File>,
}

impl std::fmt::Debug for JsonlMemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlMemoryLog")
            .field("path", &self.path)
            .finish()
    }
}

impl JsonlMemoryLog {
    /// Open (or create) the log at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails when the storage path cannot be created or opened for append;
    /// callers treat this as a fatal startup error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MurmurError::MemoryLog(format!(
                    "Failed to create memory log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                MurmurError::MemoryLog(format!(
                    "Failed to open memory log {}: {}",
                    path.display(),
                    e
                ))
            })?;

        terminate_torn_tail(&path, &mut file).await.map_err(|e| {
            MurmurError::MemoryLog(format!(
                "Failed to repair memory log {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), "Opened memory log");

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every well-formed line, skipping blanks and corrupt entries
    async fn read_records(&self) -> Result<Vec<MemoryRecord>> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no,
                        error = %e,
                        "Skipping malformed memory record"
                    );
                }
            }
        }

        Ok(records)
    }
}

/// Close off a partial last line left by a crash mid-append, so the next
/// record starts on its own line.
async fn terminate_torn_tail(path: &Path, writer: &mut File) -> std::io::Result<()> {
    let len = writer.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }

    let mut reader = File::open(path).await?;
    reader.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    reader.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(());
    }

    tracing::warn!(
        path = %path.display(),
        "Memory log ends in a partial record, terminating it"
    );
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    writer.sync_data().await
}

#[async_trait]
impl MemoryLog for JsonlMemoryLog {
    async fn append(&self, record: &MemoryRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
            writer.sync_data().await
        }
        .await;

        result.map_err(|e| {
            MurmurError::MemoryLog(format!(
                "Failed to append to {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn read_tail(&self, scope: &str, n: usize) -> Result<Vec<MemoryRecord>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        // Hold the writer so a concurrent append is never observed half-written
        let _writer = self.writer.lock().await;
        let records = self.read_records().await?;

        let mut tail = VecDeque::with_capacity(n);
        for record in records.into_iter().filter(|r| r.scope == scope) {
            if tail.len() == n {
                tail.pop_front();
            }
            tail.push_back(record);
        }

        Ok(tail.into())
    }

    async fn scopes(&self) -> Result<Vec<String>> {
        let _writer = self.writer.lock().await;
        let records = self.read_records().await?;

        let mut scopes: Vec<String> = Vec::new();
        for record in records {
            if !scopes.contains(&record.scope) {
                scopes.push(record.scope);
            }
        }
        Ok(scopes)
    }
}
