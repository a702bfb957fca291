//! Channel backup export on channel lifecycle events
//!
//! Each (reason, channel point) pair triggers at most one successful export
//! for the process lifetime. A failed export releases its pair so the next
//! event for it retries. Failures are logged and never reach ingestion.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::node::{NodeRpc, RpcError};

pub const BACKUP_FILE_NAME: &str = "channel.backup";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup export failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Backup write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination of exported multi-channel backups.
#[async_trait]
pub trait BackupSink: Send + Sync {
    async fn store(&self, blob: &[u8]) -> Result<(), BackupError>;
}

/// Writes `<dir>/channel.backup` atomically (temp file + rename).
pub struct FileBackupSink {
    dir: PathBuf,
}

impl FileBackupSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE_NAME)
    }
}

#[async_trait]
impl BackupSink for FileBackupSink {
    async fn store(&self, blob: &[u8]) -> Result<(), BackupError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!("{}.tmp", BACKUP_FILE_NAME));
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, self.path()).await?;
        Ok(())
    }
}

pub struct BackupThrottle {
    node: Arc<dyn NodeRpc>,
    sink: Option<Arc<dyn BackupSink>>,
    seen: Mutex<HashSet<(String, String)>>,
}

impl BackupThrottle {
    pub fn new(node: Arc<dyn NodeRpc>, sink: Option<Arc<dyn BackupSink>>) -> Self {
        Self {
            node,
            sink,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Claim the (reason, point) pair; true only for the first claim.
    pub fn claim(&self, reason: &str, channel_point: &str) -> bool {
        self.seen
            .lock()
            .insert((reason.to_string(), channel_point.to_string()))
    }

    fn release(&self, reason: &str, channel_point: &str) {
        self.seen
            .lock()
            .remove(&(reason.to_string(), channel_point.to_string()));
    }

    /// Export once per pair. Returns true when an export was written.
    pub async fn trigger(&self, reason: &str, channel_point: &str) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        if !self.claim(reason, channel_point) {
            log::debug!("Backup for {} {} already exported", reason, channel_point);
            return false;
        }

        match self.export(sink.as_ref()).await {
            Ok(bytes) => {
                log::info!(
                    "💾 Channel backup exported ({} bytes) after {} {}",
                    bytes,
                    reason,
                    channel_point
                );
                true
            }
            Err(e) => {
                log::error!("❌ Channel backup after {} {} failed: {}", reason, channel_point, e);
                self.release(reason, channel_point);
                false
            }
        }
    }

    async fn export(&self, sink: &dyn BackupSink) -> Result<usize, BackupError> {
        let blob = self.node.export_channel_backup().await?;
        sink.store(&blob).await?;
        Ok(blob.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::fake::FakeNode;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_export_once_per_reason_and_point() {
        let dir = tempfile::tempdir().unwrap();
        let node = Arc::new(FakeNode::new("own"));
        let sink = Arc::new(FileBackupSink::new(dir.path().join("scb")));
        let throttle = BackupThrottle::new(node.clone(), Some(sink.clone()));

        assert!(throttle.trigger("open", "aa:0").await);
        assert!(!throttle.trigger("open", "aa:0").await);
        assert!(throttle.trigger("close", "aa:0").await);
        assert!(throttle.trigger("open", "bb:1").await);

        assert_eq!(node.calls.export_channel_backup.load(Ordering::SeqCst), 3);
        let written = std::fs::read(sink.path()).unwrap();
        assert_eq!(written, b"fake-multi-chan-backup");
    }

    #[tokio::test]
    async fn test_failed_export_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let node = Arc::new(FakeNode::new("own"));
        let sink = Arc::new(FileBackupSink::new(dir.path().join("scb")));
        let throttle = BackupThrottle::new(node.clone(), Some(sink.clone()));

        node.fail_backup_export.store(true, Ordering::SeqCst);
        assert!(!throttle.trigger("open", "aa:0").await);
        assert!(!sink.path().exists());

        node.fail_backup_export.store(false, Ordering::SeqCst);
        assert!(throttle.trigger("open", "aa:0").await);
        assert!(!throttle.trigger("open", "aa:0").await);
        assert_eq!(node.calls.export_channel_backup.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_sink_disables_export() {
        let node = Arc::new(FakeNode::new("own"));
        let throttle = BackupThrottle::new(node.clone(), None);

        assert!(!throttle.trigger("open", "aa:0").await);
        assert_eq!(node.calls.export_channel_backup.load(Ordering::SeqCst), 0);
    }
}
