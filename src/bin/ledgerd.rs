//! Ledger daemon
//!
//! Runs the five notifier ingestion workers and the daily report scheduler
//! against one LND node until CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin ledgerd
//!
//! Environment variables:
//!   LEDGER_DB_PATH - SQLite database path (default: /var/lib/lnledger/lnledger.db)
//!   LEDGER_TIMEZONE - Zone of daily report dates (default: UTC)
//!   LND_REST_URL - LND REST endpoint (default: https://127.0.0.1:8080)
//!   NOTIFIER_ENABLED - Start the ingestion workers (default: true)
//!   CHANNEL_BACKUP_DIR - Channel backup export directory (default: unset, disabled)
//!   RUST_LOG - Logging level (default: info)

use dotenv::dotenv;
use log::{error, info, warn};
use lnledger::config::LedgerConfig;
use lnledger::db::Database;
use lnledger::metrics::MetricsAggregator;
use lnledger::node::lnd_rest::LndRestClient;
use lnledger::node::NodeRpc;
use lnledger::notifier::{BackupSink, FileBackupSink, Notifier};
use lnledger::reports::{scheduler::daily_report_task, ReportService, ReportStore};
use lnledger::system_clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = LedgerConfig::from_env()?;

    info!("🚀 Lightning ledger daemon");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Node: {}", config.lnd_rest_url);
    info!("   ├─ Timezone: {}", config.timezone);
    info!("   ├─ Payments poll: {}ms", config.payments_poll_interval_ms);
    info!("   ├─ Forwards poll: {}ms", config.forwards_poll_interval_ms);
    info!("   ├─ Retention: {} days", config.retention_days);
    info!(
        "   └─ Daily report at {:02}:{:02}",
        config.daily_report_hour, config.daily_report_minute
    );

    let node: Arc<dyn NodeRpc> = Arc::new(LndRestClient::new(&config.lnd())?);
    info!("✅ LND REST client ready");

    let db = match Database::open(&config.db_path) {
        Ok(db) => Some(db),
        Err(e) => {
            error!("❌ Failed to open database {}: {}", config.db_path, e);
            warn!("⚠️  Ingestion and daily reports are DISABLED");
            None
        }
    };

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    let notifier = match &db {
        Some(db) if config.notifier_enabled => {
            let backup_sink = config.channel_backup_dir.as_ref().map(|dir| {
                info!("💾 Channel backups → {}", dir.display());
                Arc::new(FileBackupSink::new(dir)) as Arc<dyn BackupSink>
            });
            let notifier = Notifier::new(
                node.clone(),
                db.clone(),
                config.notifier(),
                backup_sink,
                system_clock(),
            );
            handles.extend(notifier.start());
            Some(notifier)
        }
        Some(_) => {
            info!("⚠️  Notifier is DISABLED (set NOTIFIER_ENABLED=true to activate)");
            None
        }
        None => None,
    };

    if let Some(db) = &db {
        let aggregator = Arc::new(MetricsAggregator::new(node.clone(), config.aggregator()));
        let service = Arc::new(
            ReportService::new(
                aggregator,
                Some(ReportStore::new(db.clone())),
                notifier.as_ref().map(|n| n.event_store()),
                config.reports(),
                system_clock(),
            )
            .with_cancellation(cancel.child_token()),
        );
        handles.push(tokio::spawn(daily_report_task(service, cancel.clone())));
    }

    info!("✅ {} background tasks running", handles.len());
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    cancel.cancel();
    if let Some(notifier) = &notifier {
        notifier.shutdown();
    }

    // Give tasks time to finish
    let drain = join_tasks(handles);
    if tokio::time::timeout(tokio::time::Duration::from_secs(2), drain)
        .await
        .is_err()
    {
        warn!("⚠️  Some tasks did not stop within the grace period");
    }

    info!("✅ Ledger daemon stopped");
    Ok(())
}

async fn join_tasks(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!("❌ Task ended abnormally: {}", e);
        }
    }
}
