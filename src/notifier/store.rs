//! Idempotent event store and upstream cursors
//!
//! Writes are single-row UPSERTs keyed by `event_key`. Rows already merged into
//! a rebalance are never overwritten by a replayed payment leg, and a replayed
//! invoice leg of a merged hash is not re-inserted, so at-least-once delivery
//! from the workers materialises each event exactly once.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;

use super::events::{action, status, Direction, EventKind, EventRecord, NewEvent};
use crate::db::{Database, StoreError};
use crate::metrics::RebalanceTotals;
use crate::timerange::TimeRange;
use crate::NowFn;

pub const CURSOR_INVOICE_SETTLE_INDEX: &str = "invoice_settle_index";
pub const CURSOR_PAYMENTS_INDEX: &str = "payments_index";
pub const CURSOR_FORWARDS_OFFSET: &str = "forwards_offset";

const EVENT_COLUMNS: &str = "id, event_key, occurred_at, type, action, direction, status, \
     amount_sat, fee_sat, fee_msat, peer_pubkey, peer_alias, channel_id, channel_point, \
     txid, payment_hash, memo, created_at";

impl ToSql for EventKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EventKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Direction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Direction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        event_key: row.get(1)?,
        occurred_at: millis_to_utc(row.get(2)?),
        kind: row.get(3)?,
        action: row.get(4)?,
        direction: row.get(5)?,
        status: row.get(6)?,
        amount_sat: row.get(7)?,
        fee_sat: row.get(8)?,
        fee_msat: row.get(9)?,
        peer_pubkey: row.get(10)?,
        peer_alias: row.get(11)?,
        channel_id: row.get(12)?,
        channel_point: row.get(13)?,
        txid: row.get(14)?,
        payment_hash: row.get(15)?,
        memo: row.get(16)?,
        created_at: millis_to_utc(row.get(17)?),
    })
}

fn select_by_key(conn: &Connection, event_key: &str) -> rusqlite::Result<EventRecord> {
    conn.query_row(
        &format!("SELECT {} FROM notifications WHERE event_key = ?1", EVENT_COLUMNS),
        params![event_key],
        row_to_record,
    )
}

pub struct EventStore {
    db: Database,
    retention: chrono::Duration,
    cleanup_interval: Duration,
    last_cleanup: Mutex<Option<DateTime<Utc>>>,
    now: NowFn,
}

impl EventStore {
    pub fn new(
        db: Database,
        retention: chrono::Duration,
        cleanup_interval: Duration,
        now: NowFn,
    ) -> Self {
        Self {
            db,
            retention,
            cleanup_interval,
            last_cleanup: Mutex::new(None),
            now,
        }
    }

    /// Insert or update by `event_key` and return the stored row.
    ///
    /// Returns None when the event is the invoice leg of an already merged
    /// rebalance. A stored rebalance row is returned unchanged.
    pub fn upsert_event(&self, event: &NewEvent) -> Result<Option<EventRecord>, StoreError> {
        let now_ms = (self.now)().timestamp_millis();

        let stored = self.db.with_conn(|conn| {
            if is_invoice_leg(event) {
                if let Some(hash) = &event.payment_hash {
                    let merged: Option<i64> = conn
                        .query_row(
                            "SELECT id FROM notifications WHERE payment_hash = ?1 AND type = 'rebalance' LIMIT 1",
                            params![hash],
                            |row| row.get(0),
                        )
                        .optional()?;
                    if merged.is_some() {
                        log::debug!("Invoice {} already merged into a rebalance, skipping", hash);
                        return Ok(None);
                    }
                }
            }

            conn.execute(
                "INSERT INTO notifications (
                    event_key, occurred_at, type, action, direction, status,
                    amount_sat, fee_sat, fee_msat, peer_pubkey, peer_alias,
                    channel_id, channel_point, txid, payment_hash, memo, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                ON CONFLICT(event_key) DO UPDATE SET
                    occurred_at = excluded.occurred_at,
                    type = excluded.type,
                    action = excluded.action,
                    direction = excluded.direction,
                    status = excluded.status,
                    amount_sat = excluded.amount_sat,
                    fee_sat = excluded.fee_sat,
                    fee_msat = excluded.fee_msat,
                    peer_pubkey = COALESCE(excluded.peer_pubkey, notifications.peer_pubkey),
                    peer_alias = COALESCE(excluded.peer_alias, notifications.peer_alias),
                    channel_id = COALESCE(excluded.channel_id, notifications.channel_id),
                    channel_point = COALESCE(excluded.channel_point, notifications.channel_point),
                    txid = COALESCE(excluded.txid, notifications.txid),
                    payment_hash = COALESCE(excluded.payment_hash, notifications.payment_hash),
                    memo = COALESCE(excluded.memo, notifications.memo)
                WHERE notifications.type != 'rebalance'",
                params![
                    event.event_key,
                    event.occurred_at.timestamp_millis(),
                    event.kind,
                    event.action,
                    event.direction,
                    event.status,
                    event.amount_sat,
                    event.fee_sat,
                    event.fee_msat,
                    event.peer_pubkey,
                    event.peer_alias,
                    event.channel_id,
                    event.channel_point,
                    event.txid,
                    event.payment_hash,
                    event.memo,
                    now_ms,
                ],
            )?;

            Ok(Some(select_by_key(conn, &event.event_key)?))
        })?;

        if let Err(e) = self.maybe_cleanup() {
            log::warn!("⚠️  Retention cleanup failed: {}", e);
        }

        Ok(stored)
    }

    /// Merge the sent-payment and received-invoice legs of `payment_hash`.
    ///
    /// One IMMEDIATE transaction: the payment row is rewritten into a rebalance
    /// and the invoice row is deleted. Returns the merged row, or None (after a
    /// committed no-op) when either leg is missing.
    pub fn reconcile_rebalance(&self, payment_hash: &str) -> Result<Option<EventRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let payment_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM notifications
                     WHERE payment_hash = ?1 AND type = 'lightning' AND action = ?2 AND status = ?3
                     ORDER BY occurred_at DESC, id DESC LIMIT 1",
                    params![payment_hash, action::SENT, status::SUCCEEDED],
                    |row| row.get(0),
                )
                .optional()?;

            let invoice: Option<(i64, i64, Option<String>, i64)> = tx
                .query_row(
                    "SELECT id, amount_sat, memo, occurred_at FROM notifications
                     WHERE payment_hash = ?1 AND type = 'lightning' AND action = ?2
                     ORDER BY occurred_at DESC, id DESC LIMIT 1",
                    params![payment_hash, action::RECEIVED],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            let (payment_id, (invoice_id, amount_sat, memo, occurred_at)) = match (payment_id, invoice) {
                (Some(payment_id), Some(invoice)) => (payment_id, invoice),
                _ => {
                    tx.commit()?;
                    return Ok(None);
                }
            };

            tx.execute(
                "UPDATE notifications SET
                    type = ?1, action = ?2, direction = ?3, status = ?4,
                    amount_sat = ?5, memo = ?6, occurred_at = ?7
                 WHERE id = ?8",
                params![
                    EventKind::Rebalance,
                    action::REBALANCED,
                    Direction::Neutral,
                    status::SUCCEEDED,
                    amount_sat,
                    memo,
                    occurred_at,
                    payment_id,
                ],
            )?;
            tx.execute("DELETE FROM notifications WHERE id = ?1", params![invoice_id])?;

            let merged = tx.query_row(
                &format!("SELECT {} FROM notifications WHERE id = ?1", EVENT_COLUMNS),
                params![payment_id],
                row_to_record,
            )?;
            tx.commit()?;

            log::info!(
                "🔁 Rebalance reconciled: {} ({} sat, fee {} msat)",
                payment_hash,
                merged.amount_sat,
                merged.fee_msat
            );
            Ok(Some(merged))
        })
    }

    /// Most recent events first.
    pub fn list(&self, limit: usize) -> Result<Vec<EventRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM notifications ORDER BY occurred_at DESC, id DESC LIMIT ?1",
                EVENT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_record)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn get(&self, event_key: &str) -> Result<Option<EventRecord>, StoreError> {
        self.db
            .with_conn(|conn| Ok(select_by_key(conn, event_key).optional()?))
    }

    /// Reconciled rebalance fee and count with `occurred_at` inside `range`.
    pub fn rebalance_totals(&self, range: &TimeRange) -> Result<RebalanceTotals, StoreError> {
        self.db.with_conn(|conn| {
            let (fee_msat, count) = conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN fee_msat != 0 THEN fee_msat ELSE fee_sat * 1000 END), 0),
                    COUNT(*)
                 FROM notifications
                 WHERE type = 'rebalance' AND occurred_at >= ?1 AND occurred_at < ?2",
                params![
                    range.start_utc.timestamp_millis(),
                    range.end_utc.timestamp_millis()
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(RebalanceTotals { fee_msat, count })
        })
    }

    pub fn get_cursor(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM notification_cursors WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Numeric cursor, 0 when never written.
    pub fn cursor_u64(&self, key: &str) -> Result<u64, StoreError> {
        match self.get_cursor(key)? {
            None => Ok(0),
            Some(value) => value
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("cursor {} = {:?}", key, value))),
        }
    }

    /// Move a numeric cursor forward; a lower value leaves it untouched.
    pub fn advance_cursor(&self, key: &str, value: u64) -> Result<(), StoreError> {
        let now_ms = (self.now)().timestamp_millis();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_cursors (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                 WHERE CAST(excluded.value AS INTEGER) > CAST(notification_cursors.value AS INTEGER)",
                params![key, value.to_string(), now_ms],
            )?;
            Ok(())
        })
    }

    /// Delete expired rows if the cleanup interval has elapsed.
    pub fn maybe_cleanup(&self) -> Result<usize, StoreError> {
        let now = (self.now)();
        {
            let mut last = self.last_cleanup.lock();
            if let Some(previous) = *last {
                let elapsed = (now - previous).to_std().unwrap_or_default();
                if elapsed < self.cleanup_interval {
                    return Ok(0);
                }
            }
            *last = Some(now);
        }
        self.cleanup_expired(now)
    }

    /// Delete rows that occurred before `now - retention`.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = (now - self.retention).timestamp_millis();
        let deleted = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM notifications WHERE occurred_at < ?1",
                params![cutoff],
            )?)
        })?;
        if deleted > 0 {
            log::info!("🧹 Retention cleanup removed {} events", deleted);
        }
        Ok(deleted)
    }
}

fn is_invoice_leg(event: &NewEvent) -> bool {
    event.kind == EventKind::Lightning && event.action == action::RECEIVED
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TestClock(Arc<Mutex<DateTime<Utc>>>);

    impl TestClock {
        fn new(at: DateTime<Utc>) -> Self {
            Self(Arc::new(Mutex::new(at)))
        }

        fn now_fn(&self) -> NowFn {
            let inner = self.0.clone();
            Arc::new(move || *inner.lock())
        }

        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock();
            *now = *now + by;
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn create_test_store(clock: &TestClock) -> (EventStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("events.db")).unwrap();
        let store = EventStore::new(
            db,
            chrono::Duration::days(30),
            Duration::from_secs(3600),
            clock.now_fn(),
        );
        (store, dir)
    }

    fn sent_payment(hash: &str, fee_msat: i64, when: DateTime<Utc>) -> NewEvent {
        NewEvent {
            event_key: format!("payment:{}", hash),
            occurred_at: when,
            kind: EventKind::Lightning,
            action: action::SENT.to_string(),
            direction: Direction::Out,
            status: status::SUCCEEDED.to_string(),
            amount_sat: 100_123,
            fee_sat: fee_msat / 1000,
            fee_msat,
            peer_pubkey: Some("own".to_string()),
            peer_alias: None,
            channel_id: None,
            channel_point: None,
            txid: None,
            payment_hash: Some(hash.to_string()),
            memo: None,
        }
    }

    fn settled_invoice(hash: &str, amount_sat: i64, memo: &str, when: DateTime<Utc>) -> NewEvent {
        NewEvent {
            event_key: format!("invoice:{}", hash),
            occurred_at: when,
            kind: EventKind::Lightning,
            action: action::RECEIVED.to_string(),
            direction: Direction::In,
            status: status::SETTLED.to_string(),
            amount_sat,
            fee_sat: 0,
            fee_msat: 0,
            peer_pubkey: None,
            peer_alias: None,
            channel_id: None,
            channel_point: None,
            txid: None,
            payment_hash: Some(hash.to_string()),
            memo: Some(memo.to_string()),
        }
    }

    fn count_rows(store: &EventStore) -> i64 {
        store
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_upsert_is_idempotent_and_updates_in_place() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        let mut event = sent_payment("h1", 1_000, at(15, 10));
        let first = store.upsert_event(&event).unwrap().unwrap();
        clock.advance(chrono::Duration::minutes(5));
        let second = store.upsert_event(&event).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(count_rows(&store), 1);

        event.status = status::FAILED.to_string();
        let updated = store.upsert_event(&event).unwrap().unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.status, status::FAILED);
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(count_rows(&store), 1);
    }

    #[test]
    fn test_upsert_keeps_enrichment_when_replayed_without_it() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        let mut event = sent_payment("h1", 1_000, at(15, 10));
        event.peer_alias = Some("bob".to_string());
        store.upsert_event(&event).unwrap();

        event.peer_alias = None;
        let stored = store.upsert_event(&event).unwrap().unwrap();
        assert_eq!(stored.peer_alias.as_deref(), Some("bob"));
    }

    fn assert_merged(store: &EventStore, merged: &EventRecord) {
        assert_eq!(merged.kind, EventKind::Rebalance);
        assert_eq!(merged.action, action::REBALANCED);
        assert_eq!(merged.direction, Direction::Neutral);
        assert_eq!(merged.amount_sat, 100_000);
        assert_eq!(merged.fee_msat, 1_500);
        assert_eq!(merged.memo.as_deref(), Some("circular"));
        assert_eq!(merged.occurred_at, at(15, 10) + chrono::Duration::seconds(3));
        assert_eq!(merged.event_key, "payment:h1");
        assert_eq!(count_rows(store), 1);
        assert!(store.get("invoice:h1").unwrap().is_none());
    }

    #[test]
    fn test_reconcile_payment_then_invoice() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        store.upsert_event(&sent_payment("h1", 1_500, at(15, 10))).unwrap();
        assert!(store.reconcile_rebalance("h1").unwrap().is_none());

        store
            .upsert_event(&settled_invoice("h1", 100_000, "circular", at(15, 10) + chrono::Duration::seconds(3)))
            .unwrap();
        let merged = store.reconcile_rebalance("h1").unwrap().unwrap();
        assert_merged(&store, &merged);

        // A second attempt from the other path is a no-op
        assert!(store.reconcile_rebalance("h1").unwrap().is_none());
        assert_eq!(count_rows(&store), 1);
    }

    #[test]
    fn test_reconcile_invoice_then_payment() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        store
            .upsert_event(&settled_invoice("h1", 100_000, "circular", at(15, 10) + chrono::Duration::seconds(3)))
            .unwrap();
        assert!(store.reconcile_rebalance("h1").unwrap().is_none());

        store.upsert_event(&sent_payment("h1", 1_500, at(15, 10))).unwrap();
        let merged = store.reconcile_rebalance("h1").unwrap().unwrap();
        assert_merged(&store, &merged);
    }

    #[test]
    fn test_concurrent_reconcile_merges_once() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);
        store.upsert_event(&sent_payment("h1", 1_500, at(15, 10))).unwrap();
        store
            .upsert_event(&settled_invoice("h1", 100_000, "circular", at(15, 10) + chrono::Duration::seconds(3)))
            .unwrap();

        let store = Arc::new(store);
        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.reconcile_rebalance("h1").unwrap())
            })
            .collect();
        let merged: Vec<EventRecord> = attempts
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(merged.len(), 1);
        assert_merged(&store, &merged[0]);
    }

    #[test]
    fn test_replayed_legs_do_not_resurrect_merged_rows() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        let payment = sent_payment("h1", 1_500, at(15, 10));
        let invoice = settled_invoice("h1", 100_000, "circular", at(15, 10) + chrono::Duration::seconds(3));
        store.upsert_event(&payment).unwrap();
        store.upsert_event(&invoice).unwrap();
        let merged = store.reconcile_rebalance("h1").unwrap().unwrap();

        assert!(store.upsert_event(&invoice).unwrap().is_none());
        let replayed = store.upsert_event(&payment).unwrap().unwrap();
        assert_eq!(replayed, merged);
        assert_eq!(count_rows(&store), 1);
    }

    #[test]
    fn test_failed_payment_is_not_reconciled() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        let mut payment = sent_payment("h1", 1_500, at(15, 10));
        payment.status = status::FAILED.to_string();
        store.upsert_event(&payment).unwrap();
        store
            .upsert_event(&settled_invoice("h1", 100_000, "x", at(15, 10)))
            .unwrap();

        assert!(store.reconcile_rebalance("h1").unwrap().is_none());
        assert_eq!(count_rows(&store), 2);
    }

    #[test]
    fn test_rebalance_totals_in_range() {
        let clock = TestClock::new(at(16, 12));
        let (store, _dir) = create_test_store(&clock);

        for (hash, fee, hour) in [("a", 1_500, 1), ("b", 2_000, 23)] {
            store.upsert_event(&sent_payment(hash, fee, at(15, hour))).unwrap();
            store
                .upsert_event(&settled_invoice(hash, 50_000, "", at(15, hour)))
                .unwrap();
            store.reconcile_rebalance(hash).unwrap();
        }
        // Next day
        store.upsert_event(&sent_payment("c", 9_000, at(16, 1))).unwrap();
        store.upsert_event(&settled_invoice("c", 1, "", at(16, 1))).unwrap();
        store.reconcile_rebalance("c").unwrap();

        let day = crate::timerange::day_range(at(15, 0).date_naive(), chrono_tz::Tz::UTC).unwrap();
        assert_eq!(
            store.rebalance_totals(&day).unwrap(),
            RebalanceTotals { fee_msat: 3_500, count: 2 }
        );
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        assert_eq!(store.cursor_u64(CURSOR_PAYMENTS_INDEX).unwrap(), 0);
        store.advance_cursor(CURSOR_PAYMENTS_INDEX, 10).unwrap();
        store.advance_cursor(CURSOR_PAYMENTS_INDEX, 7).unwrap();
        assert_eq!(store.cursor_u64(CURSOR_PAYMENTS_INDEX).unwrap(), 10);
        store.advance_cursor(CURSOR_PAYMENTS_INDEX, 12).unwrap();
        assert_eq!(store.get_cursor(CURSOR_PAYMENTS_INDEX).unwrap().as_deref(), Some("12"));
    }

    #[test]
    fn test_retention_cleanup_is_interval_gated() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        // First write runs the cleanup pass; the row is 30 minutes short of expiry
        let old = Utc.with_ymd_and_hms(2024, 2, 14, 12, 30, 0).unwrap();
        store.upsert_event(&sent_payment("old", 0, old)).unwrap();
        clock.advance(chrono::Duration::minutes(45));

        // Expired now, but still inside the cleanup interval
        store.upsert_event(&sent_payment("fresh", 0, at(15, 0))).unwrap();
        assert!(store.get("payment:old").unwrap().is_some());

        clock.advance(chrono::Duration::minutes(30));
        store.upsert_event(&sent_payment("later", 0, at(15, 1))).unwrap();
        assert!(store.get("payment:old").unwrap().is_none());
        assert_eq!(count_rows(&store), 2);
    }

    #[test]
    fn test_list_orders_newest_first() {
        let clock = TestClock::new(at(15, 12));
        let (store, _dir) = create_test_store(&clock);

        store.upsert_event(&sent_payment("a", 0, at(15, 1))).unwrap();
        store.upsert_event(&sent_payment("b", 0, at(15, 3))).unwrap();
        store.upsert_event(&sent_payment("c", 0, at(15, 2))).unwrap();

        let keys: Vec<String> = store.list(2).unwrap().into_iter().map(|r| r.event_key).collect();
        assert_eq!(keys, vec!["payment:b", "payment:c"]);
    }
}
