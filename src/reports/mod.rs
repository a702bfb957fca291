//! Daily snapshots, live queries and range reads
//!
//! `run_daily` materialises one row per local calendar day. `live` answers
//! "today so far" (or a trailing-hours window) from the node, cached for a
//! short TTL per lookback. Range and summary reads only touch stored rows.
//!
//! - `store` - the `reports_daily` table
//! - `scheduler` - produces yesterday's row once a day

pub mod scheduler;
pub mod store;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, StoreError};
use crate::metrics::{Metrics, MetricsAggregator, MetricsError, RebalanceTotals};
use crate::notifier::{EventStore, NotifierConfig};
use crate::timerange::{
    dates_range, day_range, lookback_range, resolve_range_window, today_so_far,
    validate_custom_range, yesterday, DateWindow, RangeError, RangeKey, TimeRange,
};
use crate::NowFn;

pub use store::{DailyReport, ReportStore};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Metrics unavailable: {0}")]
    Metrics(MetricsError),

    #[error("Report storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid range: {0}")]
    Range(#[from] RangeError),

    #[error("Report storage is unavailable")]
    StorageUnavailable,

    #[error("Node did not answer before the deadline")]
    Timeout,
}

impl From<MetricsError> for ReportError {
    fn from(e: MetricsError) -> Self {
        match e {
            MetricsError::DeadlineExceeded => ReportError::Timeout,
            other => ReportError::Metrics(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub timezone: Tz,
    pub live_cache_ttl: Duration,
    /// Deadline for each node round (metrics computation, balance fetch)
    pub rpc_timeout: Duration,
    pub memo_match: bool,
    pub retry_backoff: Duration,
    /// Local (hour, minute) at which the scheduler reports yesterday
    pub daily_run_at: (u32, u32),
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            live_cache_ttl: Duration::from_secs(60),
            rpc_timeout: Duration::from_secs(30),
            memo_match: false,
            retry_backoff: Duration::from_secs(5),
            daily_run_at: (0, 5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReport {
    pub range: TimeRange,
    pub lookback_hours: Option<u32>,
    pub metrics: Metrics,
}

struct LiveCacheEntry {
    lookback_hours: Option<u32>,
    report: LiveReport,
    computed_at: DateTime<Utc>,
}

impl LiveCacheEntry {
    /// Fresh while younger than `ttl`; a clock that moved backwards counts as stale.
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        (now - self.computed_at).to_std().is_ok_and(|age| age < ttl)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeReport {
    pub window: DateWindow,
    pub reports: Vec<DailyReport>,
}

/// Per-field totals of a set of daily rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryTotals {
    pub forward_fee_revenue_msat: i64,
    pub forward_fee_revenue_sat: f64,
    pub rebalance_fee_cost_msat: i64,
    pub rebalance_fee_cost_sat: f64,
    pub net_routing_profit_msat: i64,
    pub net_routing_profit_sat: f64,
    pub forward_count: i64,
    pub rebalance_count: i64,
    pub routed_volume_msat: i64,
    pub routed_volume_sat: f64,
}

/// Per-field arithmetic means over the matched days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryAverages {
    pub forward_fee_revenue_msat: f64,
    pub forward_fee_revenue_sat: f64,
    pub rebalance_fee_cost_msat: f64,
    pub rebalance_fee_cost_sat: f64,
    pub net_routing_profit_msat: f64,
    pub net_routing_profit_sat: f64,
    pub forward_count: f64,
    pub rebalance_count: f64,
    pub routed_volume_msat: f64,
    pub routed_volume_sat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub window: DateWindow,
    pub days: usize,
    pub totals: SummaryTotals,
    pub averages: SummaryAverages,
}

impl Summary {
    /// Totals and means of `reports`; zero days yield zero means.
    pub fn from_reports(window: DateWindow, reports: &[DailyReport]) -> Self {
        let mut totals = SummaryTotals::default();
        for report in reports {
            let m = &report.metrics;
            totals.forward_fee_revenue_msat += m.forward_fee_revenue_msat;
            totals.forward_fee_revenue_sat += m.forward_fee_revenue_sat;
            totals.rebalance_fee_cost_msat += m.rebalance_fee_cost_msat;
            totals.rebalance_fee_cost_sat += m.rebalance_fee_cost_sat;
            totals.net_routing_profit_msat += m.net_routing_profit_msat;
            totals.net_routing_profit_sat += m.net_routing_profit_sat;
            totals.forward_count += m.forward_count;
            totals.rebalance_count += m.rebalance_count;
            totals.routed_volume_msat += m.routed_volume_msat;
            totals.routed_volume_sat += m.routed_volume_sat;
        }

        let days = reports.len();
        let averages = if days == 0 {
            SummaryAverages::default()
        } else {
            let n = days as f64;
            SummaryAverages {
                forward_fee_revenue_msat: totals.forward_fee_revenue_msat as f64 / n,
                forward_fee_revenue_sat: totals.forward_fee_revenue_sat / n,
                rebalance_fee_cost_msat: totals.rebalance_fee_cost_msat as f64 / n,
                rebalance_fee_cost_sat: totals.rebalance_fee_cost_sat / n,
                net_routing_profit_msat: totals.net_routing_profit_msat as f64 / n,
                net_routing_profit_sat: totals.net_routing_profit_sat / n,
                forward_count: totals.forward_count as f64 / n,
                rebalance_count: totals.rebalance_count as f64 / n,
                routed_volume_msat: totals.routed_volume_msat as f64 / n,
                routed_volume_sat: totals.routed_volume_sat / n,
            }
        };

        Self {
            window,
            days,
            totals,
            averages,
        }
    }
}

/// Storage handles for a report service that does not own the notifier.
///
/// No database leaves both handles empty. Reconciled rebalance rows are only
/// authoritative while ingestion runs, so the event store is attached only
/// when `notifier` is given.
pub fn report_sources(
    db: Option<Database>,
    notifier: Option<NotifierConfig>,
    now: NowFn,
) -> (Option<ReportStore>, Option<Arc<EventStore>>) {
    let Some(db) = db else {
        return (None, None);
    };
    let events = notifier.map(|config| {
        Arc::new(EventStore::new(
            db.clone(),
            config.retention,
            config.cleanup_interval,
            now,
        ))
    });
    (Some(ReportStore::new(db)), events)
}

pub struct ReportService {
    aggregator: Arc<MetricsAggregator>,
    reports: Option<ReportStore>,
    events: Option<Arc<EventStore>>,
    config: ReportConfig,
    now: NowFn,
    cancel: CancellationToken,
    live_cache: Mutex<Option<LiveCacheEntry>>,
}

impl ReportService {
    /// `reports` None means storage failed to open: reads and daily runs
    /// report `StorageUnavailable`, live queries still work.
    pub fn new(
        aggregator: Arc<MetricsAggregator>,
        reports: Option<ReportStore>,
        events: Option<Arc<EventStore>>,
        config: ReportConfig,
        now: NowFn,
    ) -> Self {
        Self {
            aggregator,
            reports,
            events,
            config,
            now,
            cancel: CancellationToken::new(),
            live_cache: Mutex::new(None),
        }
    }

    /// Abort in-flight aggregations when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now)()
    }

    fn store(&self) -> Result<&ReportStore, ReportError> {
        self.reports.as_ref().ok_or(ReportError::StorageUnavailable)
    }

    /// Compute and UPSERT the row for local calendar day `date`.
    ///
    /// For yesterday the reconciled rebalance rows are authoritative and a
    /// balance snapshot is attached when the node provides one in time.
    pub async fn run_daily(&self, date: NaiveDate) -> Result<DailyReport, ReportError> {
        let store = self.store()?;
        let zone = self.config.timezone;
        let range = day_range(date, zone)?;
        let is_yesterday = date == yesterday(self.now(), zone);

        let override_totals = match (&self.events, is_yesterday) {
            (Some(events), true) => Some(events.rebalance_totals(&range)?),
            _ => None,
        };

        let mut metrics = self
            .aggregator
            .compute_metrics_within(
                &range,
                self.config.memo_match,
                override_totals,
                self.config.rpc_timeout,
                &self.cancel,
            )
            .await?;

        if is_yesterday {
            let balances =
                tokio::time::timeout(self.config.rpc_timeout, self.aggregator.node().balances()).await;
            match balances {
                Ok(Ok(snapshot)) => metrics = metrics.with_balances(snapshot),
                Ok(Err(e)) => log::warn!("⚠️  Balance snapshot for {} omitted: {}", date, e),
                Err(_) => log::warn!("⚠️  Balance snapshot for {} omitted: deadline exceeded", date),
            }
        }

        store.upsert_daily(date, &metrics)?;
        log::info!(
            "📅 Daily report {}: {} forwards, {} rebalances, net {} msat",
            date,
            metrics.forward_count,
            metrics.rebalance_count,
            metrics.net_routing_profit_msat
        );

        store
            .get(date)?
            .ok_or_else(|| StoreError::Corrupt(format!("report {} missing after upsert", date)).into())
    }

    /// Metrics for today so far, or for the trailing `lookback_hours`.
    pub async fn live(&self, lookback_hours: Option<u32>) -> Result<LiveReport, ReportError> {
        let lookback_hours = lookback_hours.filter(|h| *h > 0);
        let now = self.now();

        {
            let cache = self.live_cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.lookback_hours == lookback_hours && entry.is_fresh(now, self.config.live_cache_ttl) {
                    return Ok(entry.report.clone());
                }
            }
        }

        let zone = self.config.timezone;
        let range = match lookback_hours {
            Some(hours) => lookback_range(now, zone, hours)?,
            None => today_so_far(now, zone)?,
        };

        let metrics = self
            .aggregator
            .compute_metrics_within(
                &range,
                self.config.memo_match,
                None,
                self.config.rpc_timeout,
                &self.cancel,
            )
            .await?;

        let report = LiveReport {
            range,
            lookback_hours,
            metrics,
        };
        *self.live_cache.lock() = Some(LiveCacheEntry {
            lookback_hours,
            report: report.clone(),
            computed_at: now,
        });

        Ok(report)
    }

    pub fn range(&self, key: RangeKey) -> Result<RangeReport, ReportError> {
        let window = resolve_range_window(self.now(), self.config.timezone, key);
        self.read_window(window)
    }

    pub fn summary(&self, key: RangeKey) -> Result<Summary, ReportError> {
        let report = self.range(key)?;
        Ok(Summary::from_reports(report.window, &report.reports))
    }

    pub fn custom_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeReport, ReportError> {
        let window = validate_custom_range(start, end)?;
        self.read_window(window)
    }

    pub fn custom_summary(&self, start: NaiveDate, end: NaiveDate) -> Result<Summary, ReportError> {
        let report = self.custom_range(start, end)?;
        Ok(Summary::from_reports(report.window, &report.reports))
    }

    fn read_window(&self, window: DateWindow) -> Result<RangeReport, ReportError> {
        let reports = self.store()?.list(window)?;
        Ok(RangeReport { window, reports })
    }

    /// Produce rows for every day from `start` through `end`.
    ///
    /// Rebalance cost per day comes from reconciled event rows when there are
    /// any, else from one reverse payment scan bucketed by day.
    pub async fn backfill(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyReport>, ReportError> {
        validate_custom_range(start, end)?;
        let store = self.store()?;
        let zone = self.config.timezone;

        let whole = dates_range(start, end, zone)?;
        let buckets = self
            .aggregator
            .rebalance_by_day(&whole, zone, self.config.memo_match, &self.cancel)
            .await?;

        let mut produced = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            let range = day_range(date, zone)?;
            let override_totals = self.reconciled_or(&range, buckets.get(&date).copied())?;

            let metrics = self
                .aggregator
                .compute_metrics_within(
                    &range,
                    self.config.memo_match,
                    Some(override_totals),
                    self.config.rpc_timeout,
                    &self.cancel,
                )
                .await?;

            store.upsert_daily(date, &metrics)?;
            if let Some(report) = store.get(date)? {
                produced.push(report);
            }
        }

        log::info!("📅 Backfilled {} daily reports ({} → {})", produced.len(), start, end);
        Ok(produced)
    }

    fn reconciled_or(
        &self,
        range: &TimeRange,
        heuristic: Option<RebalanceTotals>,
    ) -> Result<RebalanceTotals, ReportError> {
        if let Some(events) = &self.events {
            let reconciled = events.rebalance_totals(range)?;
            if reconciled.count > 0 {
                return Ok(reconciled);
            }
        }
        Ok(heuristic.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::fixed_clock;
    use crate::metrics::AggregatorConfig;
    use crate::node::fake::FakeNode;
    use crate::node::{BalanceSnapshot, ForwardingEvent, HtlcAttempt, HtlcStatus, Payment, PaymentStatus};
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const OWN: &str = "own";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn ns(d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0)
            .unwrap()
            .timestamp_nanos_opt()
            .unwrap()
    }

    fn forward(ts_ns: i64, fee_msat: i64) -> ForwardingEvent {
        ForwardingEvent {
            timestamp_ns: ts_ns,
            fee_msat,
            amt_out_msat: fee_msat * 1000,
            ..Default::default()
        }
    }

    fn self_payment(index: u64, created_ns: i64, fee_msat: i64) -> Payment {
        Payment {
            payment_hash: format!("hash{}", index),
            payment_index: index,
            status: PaymentStatus::Succeeded,
            value_sat: 50_000,
            value_msat: 0,
            fee_sat: 0,
            fee_msat,
            creation_time_ns: created_ns,
            payment_request: String::new(),
            htlcs: vec![HtlcAttempt {
                status: HtlcStatus::Succeeded,
                hop_pubkeys: vec!["peer".to_string(), OWN.to_string()],
                resolve_time_ns: created_ns,
            }],
        }
    }

    struct Harness {
        node: Arc<FakeNode>,
        service: ReportService,
        _dir: TempDir,
    }

    fn harness(config: ReportConfig, with_storage: bool, with_events: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        let node = Arc::new(FakeNode::new(OWN));
        node.set_balances(Some(BalanceSnapshot {
            onchain_confirmed_sat: 20_000,
            onchain_unconfirmed_sat: 0,
            lightning_local_sat: 80_000,
        }));

        let aggregator = Arc::new(MetricsAggregator::new(node.clone(), AggregatorConfig::default()));
        let events = with_events.then(|| {
            Arc::new(EventStore::new(
                db.clone(),
                chrono::Duration::days(180),
                Duration::from_secs(3600),
                fixed_clock(now()),
            ))
        });
        let reports = with_storage.then(|| ReportStore::new(db));

        Harness {
            node,
            service: ReportService::new(aggregator, reports, events, config, fixed_clock(now())),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_run_daily_twice_is_idempotent() {
        let h = harness(ReportConfig::default(), true, true);
        h.node.add_forward(forward(ns(14, 3), 1_500));
        h.node.add_forward(forward(ns(14, 9), 2_000));

        let first = h.service.run_daily(date(14)).await.unwrap();
        let second = h.service.run_daily(date(14)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.metrics.forward_fee_revenue_msat, 3_500);
        assert_eq!(first.metrics.forward_fee_revenue_sat, 3.5);
        assert_eq!(first.metrics.total_balance_sat, Some(100_000));
        assert_eq!(h.service.custom_range(date(1), date(31)).unwrap().reports.len(), 1);
    }

    #[tokio::test]
    async fn test_yesterday_uses_reconciled_override() {
        let h = harness(ReportConfig::default(), true, true);
        h.node.add_payment(self_payment(1, ns(14, 5), 4_000));

        let report = h.service.run_daily(date(14)).await.unwrap();

        // No reconciled rows yet: the override is zero and payments are not scanned
        assert_eq!(report.metrics.rebalance_count, 0);
        assert_eq!(h.node.calls.list_payments.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_older_day_uses_heuristic_without_balances() {
        let h = harness(ReportConfig::default(), true, true);
        h.node.add_payment(self_payment(1, ns(10, 5), 4_000));

        let report = h.service.run_daily(date(10)).await.unwrap();

        assert_eq!(report.metrics.rebalance_fee_cost_msat, 4_000);
        assert_eq!(report.metrics.net_routing_profit_msat, -4_000);
        assert!(report.metrics.total_balance_sat.is_none());
        assert_eq!(h.node.calls.balances.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_balance_failure_and_timeout_are_omitted() {
        let config = ReportConfig {
            rpc_timeout: Duration::from_millis(100),
            ..ReportConfig::default()
        };
        let h = harness(config, true, true);

        h.node.set_balances(None);
        let failed = h.service.run_daily(date(14)).await.unwrap();
        assert!(failed.metrics.onchain_balance_sat.is_none());

        h.node.set_balances(Some(BalanceSnapshot::default()));
        h.node.set_balances_delay(Some(Duration::from_secs(5)));
        let timed_out = h.service.run_daily(date(14)).await.unwrap();
        assert!(timed_out.metrics.onchain_balance_sat.is_none());
        assert_eq!(h.node.calls.balances.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_live_cache_hits_within_ttl() {
        let h = harness(ReportConfig::default(), true, true);
        h.node.add_forward(forward(ns(15, 9), 1_000));

        let first = h.service.live(None).await.unwrap();
        let second = h.service.live(None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.metrics.forward_fee_revenue_msat, 1_000);
        assert_eq!(h.node.calls.forwarding_history.load(Ordering::SeqCst), 1);

        let trailing = h.service.live(Some(6)).await.unwrap();
        assert_eq!(trailing.lookback_hours, Some(6));
        assert_eq!(h.node.calls.forwarding_history.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_live_cache_expires_on_injected_clock() {
        let node = Arc::new(FakeNode::new(OWN));
        let clock = Arc::new(Mutex::new(now()));
        let now_fn: NowFn = {
            let clock = clock.clone();
            Arc::new(move || *clock.lock())
        };
        let service = ReportService::new(
            Arc::new(MetricsAggregator::new(node.clone(), AggregatorConfig::default())),
            None,
            None,
            ReportConfig {
                live_cache_ttl: Duration::from_secs(60),
                ..ReportConfig::default()
            },
            now_fn,
        );

        service.live(Some(2)).await.unwrap();
        *clock.lock() += chrono::Duration::seconds(59);
        service.live(Some(2)).await.unwrap();
        assert_eq!(node.calls.forwarding_history.load(Ordering::SeqCst), 1);

        *clock.lock() += chrono::Duration::seconds(1);
        let refreshed = service.live(Some(2)).await.unwrap();
        assert_eq!(node.calls.forwarding_history.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.range.end_utc, now() + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_live_lookback_out_of_range_is_an_error() {
        let h = harness(ReportConfig::default(), true, true);

        let result = h.service.live(Some(u32::MAX)).await;

        assert!(matches!(
            result,
            Err(ReportError::Range(RangeError::LookbackTooLong(u32::MAX)))
        ));
        assert_eq!(h.node.calls.forwarding_history.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_live_failure_is_unavailable_not_zero() {
        let h = harness(ReportConfig::default(), true, true);
        h.node.fail_forwarding.store(true, Ordering::SeqCst);

        let result = h.service.live(None).await;
        assert!(matches!(result, Err(ReportError::Metrics(MetricsError::Rpc(_)))));
    }

    #[tokio::test]
    async fn test_missing_storage() {
        let h = harness(ReportConfig::default(), false, false);

        assert!(matches!(
            h.service.run_daily(date(14)).await,
            Err(ReportError::StorageUnavailable)
        ));
        assert!(matches!(
            h.service.range(RangeKey::Month),
            Err(ReportError::StorageUnavailable)
        ));
        assert!(h.service.live(None).await.is_ok());
    }

    fn sourced_service(node: &Arc<FakeNode>, db: Option<Database>, notifier: Option<NotifierConfig>) -> ReportService {
        let (reports, events) = report_sources(db, notifier, fixed_clock(now()));
        ReportService::new(
            Arc::new(MetricsAggregator::new(node.clone(), AggregatorConfig::default())),
            reports,
            events,
            ReportConfig::default(),
            fixed_clock(now()),
        )
    }

    #[tokio::test]
    async fn test_sources_without_database_still_answer_live() {
        let node = Arc::new(FakeNode::new(OWN));
        node.add_forward(forward(ns(15, 9), 700));
        let service = sourced_service(&node, None, Some(NotifierConfig::default()));

        let live = service.live(None).await.unwrap();
        assert_eq!(live.metrics.forward_fee_revenue_msat, 700);
        assert!(matches!(service.range(RangeKey::Month), Err(ReportError::StorageUnavailable)));
        assert!(matches!(
            service.run_daily(date(14)).await,
            Err(ReportError::StorageUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_sources_follow_notifier_flag_for_yesterday() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        let node = Arc::new(FakeNode::new(OWN));
        node.add_payment(self_payment(1, ns(14, 5), 4_000));

        // Ingestion off: the route heuristic prices yesterday's rebalances
        let disabled = sourced_service(&node, Some(db.clone()), None);
        let heuristic = disabled.run_daily(date(14)).await.unwrap();
        assert_eq!(heuristic.metrics.rebalance_count, 1);
        assert_eq!(heuristic.metrics.rebalance_fee_cost_msat, 4_000);

        // Ingestion on: reconciled rows are authoritative, none exist yet
        let enabled = sourced_service(&node, Some(db), Some(NotifierConfig::default()));
        let reconciled = enabled.run_daily(date(14)).await.unwrap();
        assert_eq!(reconciled.metrics.rebalance_count, 0);
    }

    #[tokio::test]
    async fn test_summary_means() {
        let h = harness(ReportConfig::default(), true, true);
        h.node.add_forward(forward(ns(13, 1), 1_000));
        h.node.add_forward(forward(ns(14, 1), 2_000));
        h.node.add_forward(forward(ns(14, 2), 1_000));
        h.service.run_daily(date(13)).await.unwrap();
        h.service.run_daily(date(14)).await.unwrap();

        let summary = h.service.summary(RangeKey::Month).unwrap();
        assert_eq!(summary.days, 2);
        assert_eq!(summary.totals.forward_fee_revenue_msat, 4_000);
        assert_eq!(summary.totals.forward_count, 3);
        assert_eq!(summary.averages.forward_fee_revenue_msat, 2_000.0);
        assert_eq!(summary.averages.forward_count, 1.5);

        let empty = h.service.custom_summary(date(1), date(5)).unwrap();
        assert_eq!(empty.days, 0);
        assert_eq!(empty.averages, SummaryAverages::default());
    }

    #[tokio::test]
    async fn test_custom_range_validation() {
        let h = harness(ReportConfig::default(), true, true);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();

        assert!(matches!(
            h.service.custom_range(start, end),
            Err(ReportError::Range(RangeError::EndBeforeStart { .. }))
        ));
    }

    #[tokio::test]
    async fn test_backfill_buckets_rebalances_per_day() {
        let h = harness(ReportConfig::default(), true, true);
        h.node.add_forward(forward(ns(11, 4), 3_000));
        h.node.add_payment(self_payment(1, ns(11, 6), 1_000));
        h.node.add_payment(self_payment(2, ns(12, 6), 2_000));
        h.node.add_payment(self_payment(3, ns(12, 7), 500));

        let produced = h.service.backfill(date(11), date(13)).await.unwrap();

        assert_eq!(produced.len(), 3);
        assert_eq!(produced[0].metrics.net_routing_profit_msat, 2_000);
        assert_eq!(produced[1].metrics.rebalance_count, 2);
        assert_eq!(produced[1].metrics.rebalance_fee_cost_msat, 2_500);
        assert_eq!(produced[2].metrics, Metrics::default());
    }
}
