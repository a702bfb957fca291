//! Event ingestion and the idempotent event log
//!
//! Five independent workers turn node activity into rows of the
//! `notifications` table, merge two-sided self-payments into rebalance rows,
//! and fan every stored row out to live subscribers.
//!
//! - `events` - event model and construction from node records
//! - `store` - UPSERT, reconciliation, cursors, retention
//! - `broadcast` - bounded non-blocking fan-out
//! - `workers` - the five ingestion loops
//! - `backup` - throttled channel backup export
//! - `backoff` - fixed retry delay

pub mod backoff;
pub mod backup;
pub mod broadcast;
pub mod events;
pub mod store;
mod workers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, StoreError};
use crate::node::NodeRpc;
use crate::NowFn;

pub use backup::{BackupSink, BackupThrottle, FileBackupSink};
pub use broadcast::{Broadcaster, Subscription};
pub use events::{Direction, EventKind, EventRecord, NewEvent};
pub use store::EventStore;
pub use workers::WorkerError;

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub payments_poll_interval: Duration,
    pub forwards_poll_interval: Duration,
    /// Fixed delay before a failed or ended worker session is retried
    pub retry_backoff: Duration,
    /// Per-subscriber channel capacity
    pub subscriber_buffer: usize,
    pub retention: chrono::Duration,
    pub cleanup_interval: Duration,
    pub payment_page_size: u64,
    pub forward_page_size: u32,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            payments_poll_interval: Duration::from_secs(30),
            forwards_poll_interval: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(5),
            subscriber_buffer: 64,
            retention: chrono::Duration::days(180),
            cleanup_interval: Duration::from_secs(3600),
            payment_page_size: 1_000,
            forward_page_size: 50_000,
        }
    }
}

/// State shared by all workers.
pub(crate) struct Shared {
    pub(crate) node: Arc<dyn NodeRpc>,
    pub(crate) store: Arc<EventStore>,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) backup: BackupThrottle,
    pub(crate) config: NotifierConfig,
    pub(crate) now: NowFn,
}

impl Shared {
    /// Store `event` and fan the stored row out.
    pub(crate) fn ingest(&self, event: &NewEvent) -> Result<Option<EventRecord>, StoreError> {
        let stored = self.store.upsert_event(event)?;
        if let Some(record) = &stored {
            self.broadcaster.publish(record);
        }
        Ok(stored)
    }

    /// Attempt the rebalance merge for `payment_hash`, fanning out the result.
    pub(crate) fn reconcile(&self, payment_hash: &str) -> Result<Option<EventRecord>, StoreError> {
        let merged = self.store.reconcile_rebalance(payment_hash)?;
        if let Some(record) = &merged {
            self.broadcaster.publish(record);
        }
        Ok(merged)
    }
}

pub struct Notifier {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl Notifier {
    pub fn new(
        node: Arc<dyn NodeRpc>,
        db: Database,
        config: NotifierConfig,
        backup_sink: Option<Arc<dyn BackupSink>>,
        now: NowFn,
    ) -> Self {
        let store = Arc::new(EventStore::new(
            db,
            config.retention,
            config.cleanup_interval,
            now.clone(),
        ));

        Self {
            shared: Arc::new(Shared {
                backup: BackupThrottle::new(node.clone(), backup_sink),
                broadcaster: Broadcaster::new(config.subscriber_buffer),
                node,
                store,
                config,
                now,
            }),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the five workers. Later calls are ignored.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("⚠️  Notifier already started");
            return Vec::new();
        }

        log::info!("🔔 Starting notifier workers");
        let shared = &self.shared;
        let cancel = &self.cancel;
        vec![
            tokio::spawn(workers::invoices(shared.clone(), cancel.clone())),
            tokio::spawn(workers::payments(shared.clone(), cancel.clone())),
            tokio::spawn(workers::transactions(shared.clone(), cancel.clone())),
            tokio::spawn(workers::channels(shared.clone(), cancel.clone())),
            tokio::spawn(workers::forwards(shared.clone(), cancel.clone())),
        ]
    }

    /// Signal every worker to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.broadcaster.subscribe()
    }

    pub fn unsubscribe(&self, id: u64) {
        self.shared.broadcaster.unsubscribe(id);
    }

    /// Most recent events first.
    pub fn list(&self, limit: usize) -> Result<Vec<EventRecord>, StoreError> {
        self.shared.store.list(limit)
    }

    pub fn event_store(&self) -> Arc<EventStore> {
        self.shared.store.clone()
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
