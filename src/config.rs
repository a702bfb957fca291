//! Ledger configuration from environment variables
//!
//! Every interval, TTL, page size and retention window used by the engine is
//! read here once and handed to constructors as plain structs, so tests can
//! build the same subsystems with millisecond intervals.

use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::metrics::AggregatorConfig;
use crate::node::lnd_rest::LndRestConfig;
use crate::notifier::NotifierConfig;
use crate::reports::ReportConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the ledger daemon and CLI
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Zone used for calendar days ("yesterday", daily rows)
    pub timezone: Tz,

    pub lnd_rest_url: String,
    pub lnd_macaroon_path: PathBuf,
    pub lnd_tls_cert_path: PathBuf,
    pub rpc_timeout_secs: u64,

    /// Master enable flag for the ingestion workers
    pub notifier_enabled: bool,
    pub payments_poll_interval_ms: u64,
    pub forwards_poll_interval_ms: u64,
    pub retry_backoff_ms: u64,
    pub subscriber_buffer: usize,
    pub retention_days: i64,
    pub cleanup_interval_ms: u64,

    pub live_cache_ttl_secs: u64,
    pub forward_page_size: u32,
    pub payment_page_size: u64,
    pub max_reverse_pages: usize,
    pub rebalance_memo_match: bool,
    pub rebalance_memo_marker: String,

    /// Local wall-clock time the daily report for "yesterday" is produced
    pub daily_report_hour: u32,
    pub daily_report_minute: u32,

    /// Directory receiving channel.backup exports; None disables the export
    pub channel_backup_dir: Option<PathBuf>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl LedgerConfig {
    /// Load configuration from environment variables
    ///
    /// Unparsable numbers and booleans fall back to their defaults. An unknown
    /// `LEDGER_TIMEZONE` is rejected, since every daily row depends on it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let tz_name = env::var("LEDGER_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
        let timezone = tz_name
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "LEDGER_TIMEZONE".to_string(),
                message: e.to_string(),
            })?;

        let daily_report_hour: u32 = env_or("DAILY_REPORT_HOUR", 0);
        let daily_report_minute: u32 = env_or("DAILY_REPORT_MINUTE", 5);
        if daily_report_hour > 23 || daily_report_minute > 59 {
            return Err(ConfigError::InvalidValue {
                key: "DAILY_REPORT_HOUR/DAILY_REPORT_MINUTE".to_string(),
                message: format!("{}:{} is not a wall-clock time", daily_report_hour, daily_report_minute),
            });
        }

        Ok(Self {
            db_path: env::var("LEDGER_DB_PATH")
                .unwrap_or_else(|_| "/var/lib/lnledger/lnledger.db".to_string()),
            timezone,

            lnd_rest_url: env::var("LND_REST_URL")
                .unwrap_or_else(|_| "https://127.0.0.1:8080".to_string()),
            lnd_macaroon_path: env::var("LND_MACAROON_PATH")
                .unwrap_or_else(|_| "/data/lnd/data/chain/bitcoin/mainnet/readonly.macaroon".to_string())
                .into(),
            lnd_tls_cert_path: env::var("LND_TLS_CERT_PATH")
                .unwrap_or_else(|_| "/data/lnd/tls.cert".to_string())
                .into(),
            rpc_timeout_secs: env_or("RPC_TIMEOUT_SECS", 30),

            notifier_enabled: env_or("NOTIFIER_ENABLED", true),
            payments_poll_interval_ms: env_or("PAYMENTS_POLL_INTERVAL_MS", 30_000),
            forwards_poll_interval_ms: env_or("FORWARDS_POLL_INTERVAL_MS", 60_000),
            retry_backoff_ms: env_or("RETRY_BACKOFF_MS", 5_000),
            subscriber_buffer: env_or("SUBSCRIBER_BUFFER", 64),
            retention_days: env_or("RETENTION_DAYS", 180),
            cleanup_interval_ms: env_or("CLEANUP_INTERVAL_MS", 3_600_000),

            live_cache_ttl_secs: env_or("LIVE_CACHE_TTL_SECS", 60),
            forward_page_size: env_or("FORWARD_PAGE_SIZE", 50_000),
            payment_page_size: env_or("PAYMENT_PAGE_SIZE", 1_000),
            max_reverse_pages: env_or("MAX_REVERSE_PAGES", 500),
            rebalance_memo_match: env_or("REBALANCE_MEMO_MATCH", false),
            rebalance_memo_marker: env::var("REBALANCE_MEMO_MARKER")
                .unwrap_or_else(|_| "rebalance".to_string()),

            daily_report_hour,
            daily_report_minute,

            channel_backup_dir: env::var("CHANNEL_BACKUP_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn lnd(&self) -> LndRestConfig {
        LndRestConfig {
            base_url: self.lnd_rest_url.clone(),
            macaroon_path: self.lnd_macaroon_path.clone(),
            tls_cert_path: self.lnd_tls_cert_path.clone(),
            timeout: Duration::from_secs(self.rpc_timeout_secs),
        }
    }

    pub fn notifier(&self) -> NotifierConfig {
        NotifierConfig {
            payments_poll_interval: Duration::from_millis(self.payments_poll_interval_ms),
            forwards_poll_interval: Duration::from_millis(self.forwards_poll_interval_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            subscriber_buffer: self.subscriber_buffer,
            retention: chrono::Duration::days(self.retention_days),
            cleanup_interval: Duration::from_millis(self.cleanup_interval_ms),
            payment_page_size: self.payment_page_size,
            forward_page_size: self.forward_page_size,
        }
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            forward_page_size: self.forward_page_size,
            payment_page_size: self.payment_page_size,
            max_reverse_pages: self.max_reverse_pages,
            memo_marker: self.rebalance_memo_marker.clone(),
        }
    }

    pub fn reports(&self) -> ReportConfig {
        ReportConfig {
            timezone: self.timezone,
            live_cache_ttl: Duration::from_secs(self.live_cache_ttl_secs),
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
            memo_match: self.rebalance_memo_match,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            daily_run_at: (self.daily_report_hour, self.daily_report_minute),
        }
    }
}
