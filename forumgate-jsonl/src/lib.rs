//! JSONL audit store for `forumgate`. Writes one entry per line.
//! Bring your own path; the file is created on first append.

use async_trait::async_trait;
use forumgate::audit::{count_actions, page_newest_first, AuditPage, AuditQuery, AuditStore};
use forumgate::{AuditEntry, AuditError};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Append-only audit store backed by a JSON-lines file.
///
/// Appends are serialized so concurrent writers never interleave partial lines. Reads parse
/// the whole file; lines that fail to parse are skipped with a warning.
#[derive(Clone, Debug)]
pub struct JsonlAuditStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonlAuditStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuditError::Read(e.to_string())),
        };
        let mut entries = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    target: "forumgate::audit",
                    path = %self.path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed audit line"
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(&entry).map_err(|e| AuditError::Write(e.to_string()))? + "\n";
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditError::Write(e.to_string()))?;
        file.write_all(line.as_bytes()).await.map_err(|e| AuditError::Write(e.to_string()))?;
        file.flush().await.map_err(|e| AuditError::Write(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        Ok(page_newest_first(self.load().await?, query))
    }

    async fn count_by_action(&self) -> Result<BTreeMap<String, u64>, AuditError> {
        Ok(count_actions(self.load().await?.iter()))
    }
}
