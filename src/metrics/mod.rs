//! Routing profitability metrics
//!
//! Totals are accumulated in msat; every exposed metric carries the exact msat
//! value plus a derived (possibly fractional) sat value.
//!
//! - `aggregator` - paginates the node for one window and sums totals

pub mod aggregator;

use serde::{Deserialize, Serialize};

use crate::node::{BalanceSnapshot, RpcError};

pub use aggregator::{AggregatorConfig, MetricsAggregator};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Node RPC failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Aggregation cancelled")]
    Cancelled,

    #[error("Aggregation exceeded its deadline")]
    DeadlineExceeded,
}

/// Sat value of a metric: the msat field scaled when set, else the sat field.
pub fn metric_sats(msat: i64, sat: i64) -> f64 {
    if msat != 0 {
        msat as f64 / 1000.0
    } else {
        sat as f64
    }
}

fn msat_to_sats(msat: i64) -> f64 {
    metric_sats(msat, 0)
}

/// Fee and count of rebalance payments in a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceTotals {
    pub fee_msat: i64,
    pub count: i64,
}

impl RebalanceTotals {
    pub fn add(&mut self, fee_msat: i64) {
        self.fee_msat += fee_msat;
        self.count += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTotals {
    pub fee_msat: i64,
    pub volume_msat: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
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

    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_balance_sat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lightning_balance_sat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_balance_sat: Option<i64>,
}

impl Metrics {
    pub fn from_totals(forwards: ForwardTotals, rebalances: RebalanceTotals) -> Self {
        let net_msat = forwards.fee_msat - rebalances.fee_msat;
        Self {
            forward_fee_revenue_msat: forwards.fee_msat,
            forward_fee_revenue_sat: msat_to_sats(forwards.fee_msat),
            rebalance_fee_cost_msat: rebalances.fee_msat,
            rebalance_fee_cost_sat: msat_to_sats(rebalances.fee_msat),
            net_routing_profit_msat: net_msat,
            net_routing_profit_sat: msat_to_sats(net_msat),
            forward_count: forwards.count,
            rebalance_count: rebalances.count,
            routed_volume_msat: forwards.volume_msat,
            routed_volume_sat: msat_to_sats(forwards.volume_msat),
            onchain_balance_sat: None,
            lightning_balance_sat: None,
            total_balance_sat: None,
        }
    }

    pub fn with_balances(mut self, balances: BalanceSnapshot) -> Self {
        let onchain = balances.onchain_sat();
        self.onchain_balance_sat = Some(onchain);
        self.lightning_balance_sat = Some(balances.lightning_local_sat);
        self.total_balance_sat = Some(onchain + balances.lightning_local_sat);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_sats() {
        assert_eq!(metric_sats(1500, 0), 1.5);
        assert_eq!(metric_sats(0, 2), 2.0);
        assert_eq!(metric_sats(2500, 7), 2.5);
        assert_eq!(metric_sats(0, 0), 0.0);
    }

    #[test]
    fn test_metrics_from_totals() {
        let forwards = ForwardTotals {
            fee_msat: 12_345,
            volume_msat: 1_000_000_500,
            count: 4,
        };
        let rebalances = RebalanceTotals {
            fee_msat: 2_000,
            count: 1,
        };

        let metrics = Metrics::from_totals(forwards, rebalances);
        assert_eq!(metrics.net_routing_profit_msat, 10_345);
        assert_eq!(metrics.net_routing_profit_sat, 10.345);
        assert_eq!(metrics.forward_fee_revenue_sat, 12.345);
        assert_eq!(metrics.routed_volume_sat, 1_000_000.5);
        assert_eq!(metrics.rebalance_count, 1);
        assert!(metrics.total_balance_sat.is_none());
    }

    #[test]
    fn test_negative_profit_and_balances() {
        let metrics = Metrics::from_totals(
            ForwardTotals::default(),
            RebalanceTotals {
                fee_msat: 1_500,
                count: 2,
            },
        )
        .with_balances(BalanceSnapshot {
            onchain_confirmed_sat: 10_000,
            onchain_unconfirmed_sat: 500,
            lightning_local_sat: 90_000,
        });

        assert_eq!(metrics.net_routing_profit_msat, -1_500);
        assert_eq!(metrics.net_routing_profit_sat, -1.5);
        assert_eq!(metrics.onchain_balance_sat, Some(10_500));
        assert_eq!(metrics.total_balance_sat, Some(100_500));
    }
}
