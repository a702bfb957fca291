//! Durable per-day report rows (`reports_daily`)

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{Database, StoreError};
use crate::metrics::Metrics;
use crate::timerange::DateWindow;

const DATE_FORMAT: &str = "%Y-%m-%d";

const REPORT_COLUMNS: &str = "report_date, forward_fee_revenue_msat, forward_fee_revenue_sat, \
     rebalance_fee_cost_msat, rebalance_fee_cost_sat, net_routing_profit_msat, \
     net_routing_profit_sat, forward_count, rebalance_count, routed_volume_msat, \
     routed_volume_sat, onchain_balance_sat, lightning_balance_sat, total_balance_sat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub report_date: NaiveDate,
    #[serde(flatten)]
    pub metrics: Metrics,
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<DailyReport> {
    let raw_date: String = row.get(0)?;
    let report_date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    Ok(DailyReport {
        report_date,
        metrics: Metrics {
            forward_fee_revenue_msat: row.get(1)?,
            forward_fee_revenue_sat: row.get(2)?,
            rebalance_fee_cost_msat: row.get(3)?,
            rebalance_fee_cost_sat: row.get(4)?,
            net_routing_profit_msat: row.get(5)?,
            net_routing_profit_sat: row.get(6)?,
            forward_count: row.get(7)?,
            rebalance_count: row.get(8)?,
            routed_volume_msat: row.get(9)?,
            routed_volume_sat: row.get(10)?,
            onchain_balance_sat: row.get(11)?,
            lightning_balance_sat: row.get(12)?,
            total_balance_sat: row.get(13)?,
        },
    })
}

#[derive(Clone)]
pub struct ReportStore {
    db: Database,
}

impl ReportStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or overwrite the row for `date`.
    ///
    /// Balance columns keep their stored value when `metrics` carries none.
    pub fn upsert_daily(&self, date: NaiveDate, metrics: &Metrics) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO reports_daily ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                     ON CONFLICT(report_date) DO UPDATE SET
                        forward_fee_revenue_msat = excluded.forward_fee_revenue_msat,
                        forward_fee_revenue_sat = excluded.forward_fee_revenue_sat,
                        rebalance_fee_cost_msat = excluded.rebalance_fee_cost_msat,
                        rebalance_fee_cost_sat = excluded.rebalance_fee_cost_sat,
                        net_routing_profit_msat = excluded.net_routing_profit_msat,
                        net_routing_profit_sat = excluded.net_routing_profit_sat,
                        forward_count = excluded.forward_count,
                        rebalance_count = excluded.rebalance_count,
                        routed_volume_msat = excluded.routed_volume_msat,
                        routed_volume_sat = excluded.routed_volume_sat,
                        onchain_balance_sat = COALESCE(excluded.onchain_balance_sat, reports_daily.onchain_balance_sat),
                        lightning_balance_sat = COALESCE(excluded.lightning_balance_sat, reports_daily.lightning_balance_sat),
                        total_balance_sat = COALESCE(excluded.total_balance_sat, reports_daily.total_balance_sat)",
                    REPORT_COLUMNS
                ),
                params![
                    date.format(DATE_FORMAT).to_string(),
                    metrics.forward_fee_revenue_msat,
                    metrics.forward_fee_revenue_sat,
                    metrics.rebalance_fee_cost_msat,
                    metrics.rebalance_fee_cost_sat,
                    metrics.net_routing_profit_msat,
                    metrics.net_routing_profit_sat,
                    metrics.forward_count,
                    metrics.rebalance_count,
                    metrics.routed_volume_msat,
                    metrics.routed_volume_sat,
                    metrics.onchain_balance_sat,
                    metrics.lightning_balance_sat,
                    metrics.total_balance_sat,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, date: NaiveDate) -> Result<Option<DailyReport>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM reports_daily WHERE report_date = ?1", REPORT_COLUMNS),
                    params![date.format(DATE_FORMAT).to_string()],
                    row_to_report,
                )
                .optional()?)
        })
    }

    /// Rows inside `window`, oldest first.
    pub fn list(&self, window: DateWindow) -> Result<Vec<DailyReport>, StoreError> {
        self.db.with_conn(|conn| {
            let reports = match window {
                DateWindow::Bounded { start, end } => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM reports_daily WHERE report_date >= ?1 AND report_date <= ?2 ORDER BY report_date ASC",
                        REPORT_COLUMNS
                    ))?;
                    let rows = stmt.query_map(
                        params![
                            start.format(DATE_FORMAT).to_string(),
                            end.format(DATE_FORMAT).to_string()
                        ],
                        row_to_report,
                    )?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                DateWindow::Unbounded => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM reports_daily ORDER BY report_date ASC",
                        REPORT_COLUMNS
                    ))?;
                    let rows = stmt.query_map([], row_to_report)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(reports)
        })
    }
}
