//! Lightning node financial event ingestion and reporting
//!
//! - `notifier` - always-on ingestion workers feeding a deduplicated event log
//! - `metrics` - windowed routing profitability from the node's history
//! - `reports` - daily snapshots, live "today so far" queries and range reads
//! - `timerange` - calendar-window arithmetic shared by all of the above
//! - `node` - the node RPC collaborator (LND REST) and its records

pub mod config;
pub mod db;
pub mod metrics;
pub mod node;
pub mod notifier;
pub mod reports;
pub mod sqlite_pragma;
pub mod timerange;

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Injectable wall clock.
pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> NowFn {
    Arc::new(Utc::now)
}

/// Clock frozen at `at`, for tests.
pub fn fixed_clock(at: DateTime<Utc>) -> NowFn {
    Arc::new(move || at)
}
