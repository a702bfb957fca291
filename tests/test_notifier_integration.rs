//! Integration tests for the notifier ingestion workers
//!
//! Each test runs the real workers against a scripted FakeNode with
//! millisecond intervals and an on-disk SQLite database.

#[cfg(test)]
mod notifier_integration_tests {
    use chrono::{DateTime, TimeZone, Utc};
    use lnledger::db::Database;
    use lnledger::fixed_clock;
    use lnledger::node::fake::FakeNode;
    use lnledger::node::{
        ChannelEvent, ForwardingEvent, HtlcAttempt, HtlcStatus, Invoice, InvoiceState,
        OnchainTransaction, OpenChannel, Payment, PaymentStatus, PendingChannel, PendingChannels,
    };
    use lnledger::notifier::store::{CURSOR_FORWARDS_OFFSET, CURSOR_INVOICE_SETTLE_INDEX, CURSOR_PAYMENTS_INDEX};
    use lnledger::notifier::{BackupSink, EventKind, FileBackupSink, Notifier, NotifierConfig};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const OWN: &str = "own_pubkey";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, h, m, s).unwrap()
    }

    fn test_config(subscriber_buffer: usize) -> NotifierConfig {
        NotifierConfig {
            payments_poll_interval: Duration::from_millis(20),
            forwards_poll_interval: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(20),
            subscriber_buffer,
            retention: chrono::Duration::days(180),
            cleanup_interval: Duration::from_secs(3600),
            payment_page_size: 2,
            forward_page_size: 2,
        }
    }

    struct Harness {
        node: Arc<FakeNode>,
        notifier: Notifier,
        _dir: TempDir,
    }

    fn create_harness(subscriber_buffer: usize, backup_sink: Option<Arc<dyn BackupSink>>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        let node = Arc::new(FakeNode::new(OWN));
        let notifier = Notifier::new(
            node.clone(),
            db,
            test_config(subscriber_buffer),
            backup_sink,
            fixed_clock(now()),
        );
        Harness {
            node,
            notifier,
            _dir: dir,
        }
    }

    async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn payment(index: u64, hash: &str, status: PaymentStatus, final_hop: &str) -> Payment {
        Payment {
            payment_hash: hash.to_string(),
            payment_index: index,
            status,
            value_sat: 100_250,
            value_msat: 0,
            fee_sat: 1,
            fee_msat: 1_500,
            creation_time_ns: at(10, 0, 0).timestamp_nanos_opt().unwrap(),
            payment_request: String::new(),
            htlcs: vec![HtlcAttempt {
                status: HtlcStatus::Succeeded,
                hop_pubkeys: vec!["peer".to_string(), final_hop.to_string()],
                resolve_time_ns: 0,
            }],
        }
    }

    fn settled_invoice(hash: &str, settle_index: u64) -> Invoice {
        Invoice {
            payment_hash: hash.to_string(),
            memo: "circular rebalance".to_string(),
            state: InvoiceState::Settled,
            amt_paid_sat: 100_000,
            amt_paid_msat: 100_000_000,
            creation_date: at(9, 59, 0).timestamp(),
            settle_date: at(10, 0, 5).timestamp(),
            settle_index,
        }
    }

    fn transaction(n: u32) -> OnchainTransaction {
        OnchainTransaction {
            tx_hash: format!("tx{:02}", n),
            amount_sat: 10_000 + i64::from(n),
            num_confirmations: 1,
            time_stamp: at(8, n, 0).timestamp(),
            total_fees_sat: 0,
            label: String::new(),
        }
    }

    fn row_count(h: &Harness) -> usize {
        h.notifier.list(1_000).unwrap().len()
    }

    fn assert_single_rebalance(h: &Harness) {
        let rows = h.notifier.list(100).unwrap();
        assert_eq!(rows.len(), 1, "expected only the merged row: {:?}", rows);
        let merged = &rows[0];
        assert_eq!(merged.kind, EventKind::Rebalance);
        assert_eq!(merged.action, "rebalanced");
        assert_eq!(merged.amount_sat, 100_000);
        assert_eq!(merged.fee_msat, 1_500);
        assert_eq!(merged.memo.as_deref(), Some("circular rebalance"));
        assert_eq!(merged.occurred_at, at(10, 0, 5));
    }

    #[tokio::test]
    async fn test_rebalance_merged_when_payment_arrives_first() {
        let h = create_harness(64, None);
        h.node.add_payment(payment(1, "hash_a", PaymentStatus::Succeeded, OWN));
        let handles = h.notifier.start();

        let store = h.notifier.event_store();
        wait_until("payment row", || store.get("payment:hash_a").unwrap().is_some()).await;

        h.node.push_invoice(settled_invoice("hash_a", 1));
        wait_until("rebalance merge", || {
            store
                .get("payment:hash_a")
                .unwrap()
                .is_some_and(|r| r.kind == EventKind::Rebalance)
        })
        .await;

        assert_single_rebalance(&h);
        assert_eq!(store.cursor_u64(CURSOR_INVOICE_SETTLE_INDEX).unwrap(), 1);

        h.notifier.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_rebalance_merged_when_invoice_arrives_first() {
        let h = create_harness(64, None);
        h.node.push_invoice(settled_invoice("hash_b", 1));
        let _handles = h.notifier.start();

        let store = h.notifier.event_store();
        wait_until("invoice row", || store.get("invoice:hash_b").unwrap().is_some()).await;

        h.node.add_payment(payment(1, "hash_b", PaymentStatus::Succeeded, OWN));
        wait_until("rebalance merge", || store.get("invoice:hash_b").unwrap().is_none()).await;

        assert_single_rebalance(&h);
        // Later polls replay nothing that resurrects either leg
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_single_rebalance(&h);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_block_ingestion() {
        let h = create_harness(4, None);
        let mut stalled = h.notifier.subscribe();
        let _handles = h.notifier.start();

        for n in 0..4 {
            h.node.push_transaction(transaction(n));
        }
        wait_until("first batch stored", || row_count(&h) == 4).await;

        let mut healthy = h.notifier.subscribe();
        for n in 4..8 {
            h.node.push_transaction(transaction(n));
            let received = tokio::time::timeout(Duration::from_secs(5), healthy.events.recv())
                .await
                .expect("healthy subscriber starved")
                .expect("subscription closed");
            assert_eq!(received.event_key, format!("onchain:tx{:02}", n));
        }

        assert_eq!(row_count(&h), 8);
        let mut buffered = Vec::new();
        while let Ok(event) = stalled.events.try_recv() {
            buffered.push(event.event_key);
        }
        assert_eq!(buffered, vec!["onchain:tx00", "onchain:tx01", "onchain:tx02", "onchain:tx03"]);

        h.notifier.unsubscribe(stalled.id);
    }

    #[tokio::test]
    async fn test_payment_cursor_waits_for_in_flight_payment() {
        let h = create_harness(64, None);
        h.node.add_payment(payment(1, "p1", PaymentStatus::Succeeded, "merchant"));
        h.node.add_payment(payment(2, "p2", PaymentStatus::InFlight, "merchant"));
        h.node.add_payment(payment(3, "p3", PaymentStatus::Failed, "merchant"));
        let _handles = h.notifier.start();

        let store = h.notifier.event_store();
        wait_until("final payments stored", || {
            store.get("payment:p1").unwrap().is_some() && store.get("payment:p3").unwrap().is_some()
        })
        .await;
        wait_until("cursor persisted", || store.cursor_u64(CURSOR_PAYMENTS_INDEX).unwrap() == 1).await;
        assert!(store.get("payment:p2").unwrap().is_none());

        h.node.add_payment(payment(2, "p2", PaymentStatus::Succeeded, "merchant"));
        wait_until("resolved payment stored", || store.get("payment:p2").unwrap().is_some()).await;
        wait_until("cursor advanced", || store.cursor_u64(CURSOR_PAYMENTS_INDEX).unwrap() == 3).await;

        let failed = store.get("payment:p3").unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        assert_eq!(row_count(&h), 3);
    }

    #[tokio::test]
    async fn test_forwards_ingested_once_with_cursor() {
        let h = create_harness(64, None);
        for n in 1..=3u64 {
            h.node.add_forward(ForwardingEvent {
                timestamp_ns: at(6, n as u32, 0).timestamp_nanos_opt().unwrap(),
                chan_id_in: 11,
                chan_id_out: 22,
                amt_out_msat: 5_000_000,
                fee_msat: 1_250,
                incoming_htlc_id: Some(n),
                outgoing_htlc_id: Some(n + 100),
                ..Default::default()
            });
        }
        let _handles = h.notifier.start();

        let store = h.notifier.event_store();
        wait_until("forward cursor", || store.cursor_u64(CURSOR_FORWARDS_OFFSET).unwrap() == 3).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let rows = h.notifier.list(10).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.kind == EventKind::Forward && r.fee_msat == 1_250));
        assert!(store.get("forward:1:101:1710396060000000000").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_channel_events_enriched_and_backup_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn BackupSink> = Arc::new(FileBackupSink::new(dir.path()));
        let h = create_harness(64, Some(sink));

        h.node.set_alias("peer_pk", "Peer Alias");
        h.node.set_pending_channels(PendingChannels {
            pending_open: vec![PendingChannel {
                channel_point: "fundtx:1".to_string(),
                remote_pubkey: "peer_pk".to_string(),
                capacity_sat: 2_000_000,
            }],
        });
        h.node.push_channel_event(ChannelEvent::PendingOpen {
            txid: "fundtx".to_string(),
            output_index: 1,
        });
        let open = ChannelEvent::Open(OpenChannel {
            channel_point: "fundtx:1".to_string(),
            chan_id: 777,
            remote_pubkey: "peer_pk".to_string(),
            capacity_sat: 2_000_000,
        });
        h.node.push_channel_event(open.clone());
        h.node.push_channel_event(ChannelEvent::Other("active".to_string()));
        let _handles = h.notifier.start();

        let store = h.notifier.event_store();
        wait_until("channel rows", || {
            store.get("channel:pending:fundtx:1").unwrap().is_some()
                && store.get("channel:open:fundtx:1").unwrap().is_some()
        })
        .await;

        let pending = store.get("channel:pending:fundtx:1").unwrap().unwrap();
        assert_eq!(pending.amount_sat, 2_000_000);
        assert_eq!(pending.peer_alias.as_deref(), Some("Peer Alias"));
        let opened = store.get("channel:open:fundtx:1").unwrap().unwrap();
        assert_eq!(opened.channel_id.as_deref(), Some("777"));

        // Replayed open for the same point: no second export
        h.node.push_channel_event(open);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(h.node.calls.export_channel_backup.load(Ordering::SeqCst), 2);
        assert!(dir.path().join("channel.backup").exists());
        assert_eq!(row_count(&h), 2);
    }

    #[tokio::test]
    async fn test_invoice_stream_resumes_from_settle_cursor() {
        let h = create_harness(64, None);
        h.node.push_invoice(settled_invoice("inv1", 1));
        let _handles = h.notifier.start();

        let store = h.notifier.event_store();
        wait_until("first invoice", || store.cursor_u64(CURSOR_INVOICE_SETTLE_INDEX).unwrap() == 1).await;

        h.node.disconnect_invoices();
        wait_until("resubscribe", || h.node.calls.subscribe_invoices.load(Ordering::SeqCst) >= 2).await;
        wait_until("resume index", || h.node.last_invoice_subscribe_index() == Some(1)).await;

        h.node.push_invoice(settled_invoice("inv2", 2));
        wait_until("second invoice", || store.get("invoice:inv2").unwrap().is_some()).await;
        assert_eq!(row_count(&h), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_workers() {
        let h = create_harness(64, None);
        let handles = h.notifier.start();
        assert_eq!(handles.len(), 5);
        assert!(h.notifier.start().is_empty());

        h.notifier.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("worker did not stop")
                .unwrap();
        }
    }
}
