//! Scripted in-memory node for tests
//!
//! Pages are cut from in-memory lists the same way the node cuts them (index
//! offsets, time bounds, page size), subscriptions are backed by channels the
//! test pushes into, and every query bumps a counter so tests can assert on
//! upstream traffic (cache hits, memoisation).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::types::*;
use super::{EventStream, NodeRpc, RpcError, RpcResult};

#[derive(Default)]
pub struct CallCounts {
    pub forwarding_history: AtomicUsize,
    pub list_payments: AtomicUsize,
    pub decode_pay_req: AtomicUsize,
    pub get_info: AtomicUsize,
    pub balances: AtomicUsize,
    pub node_alias: AtomicUsize,
    pub pending_channels: AtomicUsize,
    pub export_channel_backup: AtomicUsize,
    pub subscribe_invoices: AtomicUsize,
}

#[derive(Default)]
struct FakeState {
    forwarding_events: Vec<ForwardingEvent>,
    payments: Vec<Payment>,
    pay_reqs: HashMap<String, PayReq>,
    aliases: HashMap<String, String>,
    pending: PendingChannels,
    balances: Option<BalanceSnapshot>,

    invoices: Vec<Invoice>,
    invoice_tx: Option<mpsc::Sender<RpcResult<Invoice>>>,
    last_invoice_subscribe_index: Option<u64>,

    pending_transactions: Vec<OnchainTransaction>,
    transaction_tx: Option<mpsc::Sender<RpcResult<OnchainTransaction>>>,

    pending_channel_events: Vec<ChannelEvent>,
    channel_tx: Option<mpsc::Sender<RpcResult<ChannelEvent>>>,
}

pub struct FakeNode {
    identity_pubkey: String,
    state: Mutex<FakeState>,
    pub calls: CallCounts,
    /// Forwarding pages never advance their offset (pagination non-progress)
    pub freeze_forward_offset: AtomicBool,
    pub fail_forwarding: AtomicBool,
    pub fail_backup_export: AtomicBool,
    balances_delay: Mutex<Option<Duration>>,
}

impl FakeNode {
    pub fn new(identity_pubkey: &str) -> Self {
        Self {
            identity_pubkey: identity_pubkey.to_string(),
            state: Mutex::new(FakeState::default()),
            calls: CallCounts::default(),
            freeze_forward_offset: AtomicBool::new(false),
            fail_forwarding: AtomicBool::new(false),
            fail_backup_export: AtomicBool::new(false),
            balances_delay: Mutex::new(None),
        }
    }

    pub fn add_forward(&self, event: ForwardingEvent) {
        let mut state = self.state.lock();
        state.forwarding_events.push(event);
        state.forwarding_events.sort_by_key(|e| e.timestamp_ns);
    }

    pub fn add_payment(&self, payment: Payment) {
        let mut state = self.state.lock();
        state.payments.retain(|p| p.payment_index != payment.payment_index);
        state.payments.push(payment);
        state.payments.sort_by_key(|p| p.payment_index);
    }

    pub fn add_pay_req(&self, raw: &str, pay_req: PayReq) {
        self.state.lock().pay_reqs.insert(raw.to_string(), pay_req);
    }

    pub fn set_alias(&self, pubkey: &str, alias: &str) {
        self.state
            .lock()
            .aliases
            .insert(pubkey.to_string(), alias.to_string());
    }

    pub fn set_pending_channels(&self, pending: PendingChannels) {
        self.state.lock().pending = pending;
    }

    pub fn set_balances(&self, balances: Option<BalanceSnapshot>) {
        self.state.lock().balances = balances;
    }

    pub fn set_balances_delay(&self, delay: Option<Duration>) {
        *self.balances_delay.lock() = delay;
    }

    /// Record a settled invoice; delivered live if subscribed, and replayed to
    /// later subscriptions whose settle index is below it.
    pub fn push_invoice(&self, invoice: Invoice) {
        let mut state = self.state.lock();
        state.invoices.push(invoice.clone());
        if let Some(tx) = &state.invoice_tx {
            let _ = tx.try_send(Ok(invoice));
        }
    }

    pub fn push_transaction(&self, tx_item: OnchainTransaction) {
        let mut state = self.state.lock();
        let live = state.transaction_tx.clone().filter(|tx| !tx.is_closed());
        match live {
            Some(tx) => {
                let _ = tx.try_send(Ok(tx_item));
            }
            None => state.pending_transactions.push(tx_item),
        }
    }

    pub fn push_channel_event(&self, event: ChannelEvent) {
        let mut state = self.state.lock();
        let live = state.channel_tx.clone().filter(|tx| !tx.is_closed());
        match live {
            Some(tx) => {
                let _ = tx.try_send(Ok(event));
            }
            None => state.pending_channel_events.push(event),
        }
    }

    /// Drop the live invoice stream, as if the node disconnected.
    pub fn disconnect_invoices(&self) {
        self.state.lock().invoice_tx = None;
    }

    pub fn last_invoice_subscribe_index(&self) -> Option<u64> {
        self.state.lock().last_invoice_subscribe_index
    }
}

fn ns_to_secs(ns: i64) -> i64 {
    ns / 1_000_000_000
}

#[async_trait]
impl NodeRpc for FakeNode {
    async fn forwarding_history(&self, query: ForwardingQuery) -> RpcResult<ForwardingPage> {
        self.calls.forwarding_history.fetch_add(1, Ordering::SeqCst);
        if self.fail_forwarding.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("forwarding history unavailable".to_string()));
        }

        let state = self.state.lock();
        let in_window: Vec<&ForwardingEvent> = state
            .forwarding_events
            .iter()
            .filter(|e| {
                let secs = ns_to_secs(e.timestamp_ns);
                secs >= query.start_time && secs < query.end_time
            })
            .collect();

        let events: Vec<ForwardingEvent> = in_window
            .iter()
            .skip(query.index_offset as usize)
            .take(query.max_events as usize)
            .map(|e| (*e).clone())
            .collect();

        let last_offset_index = if self.freeze_forward_offset.load(Ordering::SeqCst) {
            query.index_offset
        } else {
            query.index_offset + events.len() as u32
        };

        Ok(ForwardingPage {
            events,
            last_offset_index,
        })
    }

    async fn list_payments(&self, query: PaymentQuery) -> RpcResult<PaymentPage> {
        self.calls.list_payments.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock();
        let matches = |p: &&Payment| {
            let secs = ns_to_secs(p.creation_time_ns);
            query.start_time.map_or(true, |s| secs >= s)
                && query.end_time.map_or(true, |e| secs <= e)
                && query.status.accepts(p.status)
        };

        let mut page: Vec<Payment> = if query.reversed {
            let mut older: Vec<Payment> = state
                .payments
                .iter()
                .filter(|p| query.index_offset == 0 || p.payment_index < query.index_offset)
                .filter(matches)
                .rev()
                .take(query.max_payments as usize)
                .cloned()
                .collect();
            older.reverse();
            older
        } else {
            state
                .payments
                .iter()
                .filter(|p| p.payment_index > query.index_offset)
                .filter(matches)
                .take(query.max_payments as usize)
                .cloned()
                .collect()
        };
        page.sort_by_key(|p| p.payment_index);

        Ok(PaymentPage {
            first_index_offset: page.first().map(|p| p.payment_index).unwrap_or(0),
            last_index_offset: page.last().map(|p| p.payment_index).unwrap_or(0),
            payments: page,
        })
    }

    async fn subscribe_invoices(&self, settle_index: u64) -> RpcResult<EventStream<Invoice>> {
        self.calls.subscribe_invoices.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(256);
        let mut state = self.state.lock();
        for invoice in state.invoices.iter().filter(|i| i.settle_index > settle_index) {
            let _ = tx.try_send(Ok(invoice.clone()));
        }
        state.invoice_tx = Some(tx);
        state.last_invoice_subscribe_index = Some(settle_index);
        Ok(rx)
    }

    async fn subscribe_transactions(&self) -> RpcResult<EventStream<OnchainTransaction>> {
        let (tx, rx) = mpsc::channel(256);
        let mut state = self.state.lock();
        for item in state.pending_transactions.drain(..) {
            let _ = tx.try_send(Ok(item));
        }
        state.transaction_tx = Some(tx);
        Ok(rx)
    }

    async fn subscribe_channel_events(&self) -> RpcResult<EventStream<ChannelEvent>> {
        let (tx, rx) = mpsc::channel(256);
        let mut state = self.state.lock();
        for event in state.pending_channel_events.drain(..) {
            let _ = tx.try_send(Ok(event));
        }
        state.channel_tx = Some(tx);
        Ok(rx)
    }

    async fn pending_channels(&self) -> RpcResult<PendingChannels> {
        self.calls.pending_channels.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().pending.clone())
    }

    async fn node_alias(&self, pubkey: &str) -> RpcResult<Option<String>> {
        self.calls.node_alias.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().aliases.get(pubkey).cloned())
    }

    async fn decode_pay_req(&self, pay_req: &str) -> RpcResult<PayReq> {
        self.calls.decode_pay_req.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .pay_reqs
            .get(pay_req)
            .cloned()
            .ok_or_else(|| RpcError::Status {
                status: 500,
                message: "invalid payment request".to_string(),
            })
    }

    async fn get_info(&self) -> RpcResult<NodeInfo> {
        self.calls.get_info.fetch_add(1, Ordering::SeqCst);
        Ok(NodeInfo {
            identity_pubkey: self.identity_pubkey.clone(),
            alias: "fake-node".to_string(),
        })
    }

    async fn balances(&self) -> RpcResult<BalanceSnapshot> {
        self.calls.balances.fetch_add(1, Ordering::SeqCst);
        let delay = *self.balances_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .balances
            .ok_or_else(|| RpcError::Transport("wallet locked".to_string()))
    }

    async fn export_channel_backup(&self) -> RpcResult<Vec<u8>> {
        self.calls.export_channel_backup.fetch_add(1, Ordering::SeqCst);
        if self.fail_backup_export.load(Ordering::SeqCst) {
            return Err(RpcError::Status {
                status: 500,
                message: "backup export unavailable".to_string(),
            });
        }
        Ok(b"fake-multi-chan-backup".to_vec())
    }
}
