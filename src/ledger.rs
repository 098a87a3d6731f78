//! Record of which templates each recipient has been sent.
//!
//! The dispatch engine calls [`SentRecorder::mark_sent`] once per successful
//! recipient when the request names a template key. Recorder failures are
//! logged by the engine and never affect the dispatch result.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::credentials::enforce_private_file_permissions;

/// Addresses mapped to the template keys they have received.
pub type SentMap = BTreeMap<String, BTreeSet<String>>;

/// Side-write target for "template X was sent to recipient Y".
#[async_trait]
pub trait SentRecorder: Send + Sync {
    /// Record that `template_key` was delivered to `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    async fn mark_sent(&self, address: &str, template_key: &str) -> anyhow::Result<()>;
}

/// In-memory recorder for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    sent: Mutex<SentMap>,
}

impl MemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub async fn snapshot(&self) -> SentMap {
        self.sent.lock().await.clone()
    }

    /// Whether `template_key` has been recorded for `address`.
    pub async fn was_sent(&self, address: &str, template_key: &str) -> bool {
        self.sent
            .lock()
            .await
            .get(address)
            .is_some_and(|keys| keys.contains(template_key))
    }
}

#[async_trait]
impl SentRecorder for MemoryLedger {
    async fn mark_sent(&self, address: &str, template_key: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .await
            .entry(address.to_owned())
            .or_default()
            .insert(template_key.to_owned());
        Ok(())
    }
}

/// JSON file recorder (`sent.json` in the runtime directory).
///
/// Each write rewrites the whole file through a temp file and rename. The
/// file lists recipient addresses, so it is kept owner-only (0600). The
/// mutex serializes writers within one process.
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileLedger {
    /// Ledger stored at `path`. The file is created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current ledger contents. A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or malformed.
    pub async fn load(&self) -> anyhow::Result<SentMap> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("invalid sent ledger {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SentMap::new()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to read sent ledger {}", self.path.display())),
        }
    }

    async fn store(&self, sent: &SentMap) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(sent).context("failed to serialize ledger")?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        enforce_private_file_permissions(&tmp_path)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SentRecorder for JsonFileLedger {
    async fn mark_sent(&self, address: &str, template_key: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut sent = self.load().await?;
        let inserted = sent
            .entry(address.to_owned())
            .or_default()
            .insert(template_key.to_owned());
        if inserted {
            self.store(&sent).await?;
        }
        Ok(())
    }
}
