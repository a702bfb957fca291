//! Window aggregation over the node's forwarding and payment history
//!
//! Forwarding revenue always comes from the node. Rebalance cost comes from
//! an override when the caller has one (reconciled rows from the event store),
//! otherwise from a heuristic scan of successful payments: a payment is a
//! rebalance when its final hop is this node, or (with memo matching on) when
//! its decoded invoice memo contains the rebalance marker. Anything the
//! heuristic can't decide counts as not-a-rebalance.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{ForwardTotals, Metrics, MetricsError, RebalanceTotals};
use crate::node::{
    ForwardingQuery, NodeRpc, Payment, PaymentQuery, PaymentStatus, PaymentStatusFilter,
};
use crate::timerange::TimeRange;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub forward_page_size: u32,
    pub payment_page_size: u64,
    /// Upper bound on reverse payment pages scanned by `rebalance_by_day`
    pub max_reverse_pages: usize,
    pub memo_marker: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            forward_page_size: 50_000,
            payment_page_size: 1_000,
            max_reverse_pages: 500,
            memo_marker: "rebalance".to_string(),
        }
    }
}

/// Decoded memo per raw payment request; None when decoding failed.
type DecodeCache = HashMap<String, Option<String>>;

pub struct MetricsAggregator {
    node: Arc<dyn NodeRpc>,
    config: AggregatorConfig,
    own_pubkey: OnceCell<String>,
}

impl MetricsAggregator {
    pub fn new(node: Arc<dyn NodeRpc>, config: AggregatorConfig) -> Self {
        Self {
            node,
            config,
            own_pubkey: OnceCell::new(),
        }
    }

    pub fn node(&self) -> &Arc<dyn NodeRpc> {
        &self.node
    }

    /// Forwarding totals plus rebalance cost for `range`.
    ///
    /// `override_totals` replaces the heuristic payment scan entirely.
    pub async fn compute_metrics(
        &self,
        range: &TimeRange,
        memo_match: bool,
        override_totals: Option<RebalanceTotals>,
        cancel: &CancellationToken,
    ) -> Result<Metrics, MetricsError> {
        let forwards = self.forward_totals(range, cancel).await?;
        let rebalances = match override_totals {
            Some(totals) => totals,
            None => self.rebalance_totals(range, memo_match, cancel).await?,
        };

        log::debug!(
            "📊 Metrics {} → {}: {} forwards ({} msat), {} rebalances ({} msat)",
            range.start_utc,
            range.end_utc,
            forwards.count,
            forwards.fee_msat,
            rebalances.count,
            rebalances.fee_msat
        );

        Ok(Metrics::from_totals(forwards, rebalances))
    }

    /// `compute_metrics` bounded by `deadline`.
    pub async fn compute_metrics_within(
        &self,
        range: &TimeRange,
        memo_match: bool,
        override_totals: Option<RebalanceTotals>,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Metrics, MetricsError> {
        tokio::time::timeout(
            deadline,
            self.compute_metrics(range, memo_match, override_totals, cancel),
        )
        .await
        .map_err(|_| MetricsError::DeadlineExceeded)?
    }

    /// Page through forwarding history for `range`.
    ///
    /// Stops on a short page or when the node stops advancing the offset.
    pub async fn forward_totals(
        &self,
        range: &TimeRange,
        cancel: &CancellationToken,
    ) -> Result<ForwardTotals, MetricsError> {
        let page_size = self.config.forward_page_size.max(1);
        let mut totals = ForwardTotals::default();
        let mut offset = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(MetricsError::Cancelled);
            }

            let page = self
                .node
                .forwarding_history(ForwardingQuery {
                    start_time: range.start_unix(),
                    end_time: range.end_unix(),
                    index_offset: offset,
                    max_events: page_size,
                })
                .await?;

            for event in &page.events {
                totals.fee_msat += event.fee_msat_normalized();
                totals.volume_msat += event.volume_msat_normalized();
                totals.count += 1;
            }

            if (page.events.len() as u32) < page_size {
                break;
            }
            if page.last_offset_index <= offset {
                log::warn!(
                    "⚠️  Forwarding history offset stuck at {}, stopping pagination",
                    offset
                );
                break;
            }
            offset = page.last_offset_index;
        }

        Ok(totals)
    }

    /// Heuristic rebalance totals over successful payments created in `range`.
    pub async fn rebalance_totals(
        &self,
        range: &TimeRange,
        memo_match: bool,
        cancel: &CancellationToken,
    ) -> Result<RebalanceTotals, MetricsError> {
        let own_pubkey = self.own_pubkey().await?;
        let page_size = self.config.payment_page_size.max(1);
        let mut cache = DecodeCache::new();
        let mut totals = RebalanceTotals::default();
        let mut offset = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(MetricsError::Cancelled);
            }

            let page = self
                .node
                .list_payments(PaymentQuery {
                    start_time: Some(range.start_unix()),
                    end_time: Some(range.end_unix()),
                    index_offset: offset,
                    max_payments: page_size,
                    reversed: false,
                    status: PaymentStatusFilter::Succeeded,
                })
                .await?;

            for payment in &page.payments {
                if payment.creation_time_ns <= 0 || !range.contains_unix_ns(payment.creation_time_ns) {
                    continue;
                }
                if self.is_rebalance(payment, own_pubkey, memo_match, &mut cache).await {
                    totals.add(payment.fee_msat_normalized());
                }
            }

            if (page.payments.len() as u64) < page_size {
                break;
            }
            if page.last_index_offset <= offset {
                log::warn!("⚠️  Payment index offset stuck at {}, stopping pagination", offset);
                break;
            }
            offset = page.last_index_offset;
        }

        Ok(totals)
    }

    /// Heuristic rebalance totals bucketed per local calendar day.
    ///
    /// Scans payments newest-first and stops once a page reaches back before
    /// `range`, or after `max_reverse_pages` pages.
    pub async fn rebalance_by_day(
        &self,
        range: &TimeRange,
        zone: Tz,
        memo_match: bool,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<NaiveDate, RebalanceTotals>, MetricsError> {
        let own_pubkey = self.own_pubkey().await?;
        let page_size = self.config.payment_page_size.max(1);
        let mut cache = DecodeCache::new();
        let mut buckets: BTreeMap<NaiveDate, RebalanceTotals> = BTreeMap::new();
        let mut offset = 0u64;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(MetricsError::Cancelled);
            }
            if pages >= self.config.max_reverse_pages {
                log::warn!(
                    "⚠️  Reverse payment scan hit the {} page limit before reaching {}",
                    self.config.max_reverse_pages,
                    range.start_utc
                );
                break;
            }
            pages += 1;

            let page = self
                .node
                .list_payments(PaymentQuery {
                    start_time: None,
                    end_time: None,
                    index_offset: offset,
                    max_payments: page_size,
                    reversed: true,
                    status: PaymentStatusFilter::Succeeded,
                })
                .await?;

            let mut crossed_start = false;
            for payment in &page.payments {
                if payment.creation_time_ns <= 0 {
                    continue;
                }
                let created = DateTime::from_timestamp_nanos(payment.creation_time_ns);
                if created < range.start_utc {
                    crossed_start = true;
                    continue;
                }
                if created >= range.end_utc {
                    continue;
                }
                if self.is_rebalance(payment, own_pubkey, memo_match, &mut cache).await {
                    let day = created.with_timezone(&zone).date_naive();
                    buckets.entry(day).or_default().add(payment.fee_msat_normalized());
                }
            }

            if crossed_start || (page.payments.len() as u64) < page_size {
                break;
            }
            let next = page.first_index_offset;
            if next == 0 || (offset != 0 && next >= offset) {
                log::warn!("⚠️  Reverse payment offset stuck at {}, stopping scan", offset);
                break;
            }
            offset = next;
        }

        log::debug!(
            "📊 Reverse scan: {} pages, {} days with rebalances",
            pages,
            buckets.len()
        );

        Ok(buckets)
    }

    /// Node identity, fetched once for the aggregator's lifetime.
    async fn own_pubkey(&self) -> Result<&str, MetricsError> {
        let pubkey = self
            .own_pubkey
            .get_or_try_init(|| async {
                self.node
                    .get_info()
                    .await
                    .map(|info| info.identity_pubkey)
            })
            .await?;
        Ok(pubkey.as_str())
    }

    async fn is_rebalance(
        &self,
        payment: &Payment,
        own_pubkey: &str,
        memo_match: bool,
        cache: &mut DecodeCache,
    ) -> bool {
        if payment.status != PaymentStatus::Succeeded {
            return false;
        }
        if payment.final_hop_pubkey() == Some(own_pubkey) {
            return true;
        }
        if !memo_match || payment.payment_request.is_empty() {
            return false;
        }

        let memo = match cache.get(&payment.payment_request) {
            Some(memo) => memo.clone(),
            None => {
                let decoded = match self.node.decode_pay_req(&payment.payment_request).await {
                    Ok(pay_req) => Some(pay_req.description),
                    Err(e) => {
                        log::debug!("Failed to decode payment request: {}", e);
                        None
                    }
                };
                cache.insert(payment.payment_request.clone(), decoded.clone());
                decoded
            }
        };

        memo.map_or(false, |memo| self.memo_matches(&memo))
    }

    fn memo_matches(&self, memo: &str) -> bool {
        let marker = self.config.memo_marker.trim().to_lowercase();
        !marker.is_empty() && memo.to_lowercase().contains(&marker)
    }
}
