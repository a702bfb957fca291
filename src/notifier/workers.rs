//! The five ingestion workers
//!
//! Push sources (invoices, on-chain transactions, channel events) run a
//! session per upstream subscription and reconnect after the fixed backoff
//! whenever it ends or fails. Poll sources (payments, forwards) page from
//! their persisted cursor on a fixed interval. A cursor is only persisted
//! after the events it covers are stored.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::backoff::{sleep_or_cancel, FixedBackoff};
use super::events::NewEvent;
use super::store::{CURSOR_FORWARDS_OFFSET, CURSOR_INVOICE_SETTLE_INDEX, CURSOR_PAYMENTS_INDEX};
use super::Shared;
use crate::db::StoreError;
use crate::node::{
    ChannelEvent, ForwardingQuery, Invoice, PaymentQuery, PaymentStatus, PaymentStatusFilter,
    RpcError,
};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run stream sessions until cancelled; each session returns the number of
/// items it handled before the stream ended.
async fn supervise<F, Fut>(name: &'static str, retry: Duration, cancel: CancellationToken, mut session: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<usize, WorkerError>>,
{
    log::info!("🚀 [{}] worker started", name);
    let mut backoff = FixedBackoff::new(name, retry);

    while !cancel.is_cancelled() {
        match session().await {
            Ok(_) if cancel.is_cancelled() => break,
            Ok(handled) => {
                if handled > 0 {
                    backoff.reset();
                }
                log::warn!("🔌 [{}] stream ended after {} events, reconnecting", name, handled);
            }
            Err(e) => log::error!("❌ [{}] {}", name, e),
        }
        if !backoff.wait(&cancel).await {
            break;
        }
    }

    log::info!("🛑 [{}] worker stopped", name);
}

/// Run `poll` every `interval` until cancelled, backing off after failures.
async fn poll_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    retry: Duration,
    cancel: CancellationToken,
    mut poll: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<usize, WorkerError>>,
{
    log::info!("🚀 [{}] worker started (interval: {}ms)", name, interval.as_millis());
    let mut backoff = FixedBackoff::new(name, retry);

    while !cancel.is_cancelled() {
        match poll().await {
            Ok(ingested) => {
                backoff.reset();
                if ingested > 0 {
                    log::info!("📥 [{}] ingested {} events", name, ingested);
                }
                if !sleep_or_cancel(interval, &cancel).await {
                    break;
                }
            }
            Err(e) => {
                log::error!("❌ [{}] poll failed: {}", name, e);
                if !backoff.wait(&cancel).await {
                    break;
                }
            }
        }
    }

    log::info!("🛑 [{}] worker stopped", name);
}

pub(crate) async fn invoices(shared: Arc<Shared>, cancel: CancellationToken) {
    let retry = shared.config.retry_backoff;
    supervise("invoices", retry, cancel.clone(), || {
        invoice_session(shared.clone(), cancel.clone())
    })
    .await
}

pub(crate) async fn payments(shared: Arc<Shared>, cancel: CancellationToken) {
    let interval = shared.config.payments_poll_interval;
    let retry = shared.config.retry_backoff;
    poll_loop("payments", interval, retry, cancel.clone(), || {
        poll_payments(shared.clone(), cancel.clone())
    })
    .await
}

pub(crate) async fn transactions(shared: Arc<Shared>, cancel: CancellationToken) {
    let retry = shared.config.retry_backoff;
    supervise("onchain", retry, cancel.clone(), || {
        transaction_session(shared.clone(), cancel.clone())
    })
    .await
}

pub(crate) async fn channels(shared: Arc<Shared>, cancel: CancellationToken) {
    let retry = shared.config.retry_backoff;
    supervise("channels", retry, cancel.clone(), || {
        channel_session(shared.clone(), cancel.clone())
    })
    .await
}

pub(crate) async fn forwards(shared: Arc<Shared>, cancel: CancellationToken) {
    let interval = shared.config.forwards_poll_interval;
    let retry = shared.config.retry_backoff;
    poll_loop("forwards", interval, retry, cancel.clone(), || {
        poll_forwards(shared.clone(), cancel.clone())
    })
    .await
}

async fn invoice_session(shared: Arc<Shared>, cancel: CancellationToken) -> Result<usize, WorkerError> {
    let settle_index = shared.store.cursor_u64(CURSOR_INVOICE_SETTLE_INDEX)?;
    let mut stream = shared.node.subscribe_invoices(settle_index).await?;
    log::info!("📡 [invoices] subscribed from settle index {}", settle_index);

    let mut handled = 0;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(handled),
            next = stream.recv() => next,
        };
        let Some(item) = next else {
            return Ok(handled);
        };
        if handle_invoice(&shared, &item?)? {
            handled += 1;
        }
    }
}

fn handle_invoice(shared: &Shared, invoice: &Invoice) -> Result<bool, WorkerError> {
    let Some(event) = NewEvent::from_invoice(invoice) else {
        log::debug!("Skipping invoice {} in state {:?}", invoice.payment_hash, invoice.state);
        return Ok(false);
    };

    shared.ingest(&event)?;
    if invoice.settle_index > 0 {
        shared
            .store
            .advance_cursor(CURSOR_INVOICE_SETTLE_INDEX, invoice.settle_index)?;
    }
    if let Some(hash) = &event.payment_hash {
        shared.reconcile(hash)?;
    }
    Ok(true)
}

/// One payment poll: page forward from the cursor, store final payments, and
/// move the cursor to the highest index seen but never past an in-flight one.
async fn poll_payments(shared: Arc<Shared>, cancel: CancellationToken) -> Result<usize, WorkerError> {
    let cursor = shared.store.cursor_u64(CURSOR_PAYMENTS_INDEX)?;
    let page_size = shared.config.payment_page_size.max(1);

    let mut offset = cursor;
    let mut max_seen = cursor;
    let mut lowest_in_flight: Option<u64> = None;
    let mut ingested = 0;

    while !cancel.is_cancelled() {
        let page = shared
            .node
            .list_payments(PaymentQuery {
                start_time: None,
                end_time: None,
                index_offset: offset,
                max_payments: page_size,
                reversed: false,
                status: PaymentStatusFilter::All,
            })
            .await?;

        for payment in &page.payments {
            let index = payment.payment_index;
            max_seen = max_seen.max(index);

            if !payment.status.is_final() {
                lowest_in_flight = Some(lowest_in_flight.map_or(index, |low| low.min(index)));
                continue;
            }
            let Some(event) = NewEvent::from_payment(payment) else {
                log::debug!("Skipping malformed payment at index {}", index);
                continue;
            };

            shared.ingest(&event)?;
            ingested += 1;
            if payment.status == PaymentStatus::Succeeded {
                if let Some(hash) = &event.payment_hash {
                    shared.reconcile(hash)?;
                }
            }
        }

        if (page.payments.len() as u64) < page_size || page.last_index_offset <= offset {
            break;
        }
        offset = page.last_index_offset;
    }

    let next = match lowest_in_flight {
        Some(index) => max_seen.min(index.saturating_sub(1)),
        None => max_seen,
    };
    if next > cursor {
        shared.store.advance_cursor(CURSOR_PAYMENTS_INDEX, next)?;
    }

    Ok(ingested)
}

async fn transaction_session(shared: Arc<Shared>, cancel: CancellationToken) -> Result<usize, WorkerError> {
    let mut stream = shared.node.subscribe_transactions().await?;
    log::info!("📡 [onchain] subscribed to wallet transactions");

    let mut handled = 0;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(handled),
            next = stream.recv() => next,
        };
        let Some(item) = next else {
            return Ok(handled);
        };
        let tx = item?;
        match NewEvent::from_transaction(&tx, (shared.now)()) {
            Some(event) => {
                shared.ingest(&event)?;
                handled += 1;
            }
            None => log::debug!("Skipping transaction without hash"),
        }
    }
}

async fn channel_session(shared: Arc<Shared>, cancel: CancellationToken) -> Result<usize, WorkerError> {
    let mut stream = shared.node.subscribe_channel_events().await?;
    log::info!("📡 [channels] subscribed to channel events");

    let mut handled = 0;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(handled),
            next = stream.recv() => next,
        };
        let Some(item) = next else {
            return Ok(handled);
        };
        if handle_channel_event(&shared, item?).await? {
            handled += 1;
        }
    }
}

async fn handle_channel_event(shared: &Shared, update: ChannelEvent) -> Result<bool, WorkerError> {
    let now = (shared.now)();

    let (event, reason) = match &update {
        ChannelEvent::Open(channel) => (NewEvent::from_channel_open(channel, now), "open"),
        ChannelEvent::Closed(channel) => (NewEvent::from_channel_close(channel, now), "close"),
        ChannelEvent::PendingOpen { txid, output_index } => {
            let point = format!("{}:{}", txid, output_index);
            let pending = match shared.node.pending_channels().await {
                Ok(snapshot) => snapshot.find(&point, txid).cloned(),
                Err(e) => {
                    log::warn!("⚠️  Pending channel lookup for {} failed: {}", point, e);
                    None
                }
            };
            (
                NewEvent::from_pending_open(txid, *output_index, pending.as_ref(), now),
                "pending_open",
            )
        }
        ChannelEvent::Other(kind) => {
            log::debug!("Ignoring channel update {}", kind);
            return Ok(false);
        }
    };

    let Some(mut event) = event else {
        log::debug!("Skipping channel update without channel point");
        return Ok(false);
    };

    enrich_alias(shared, &mut event).await;
    shared.ingest(&event)?;

    if let Some(point) = &event.channel_point {
        shared.backup.trigger(reason, point).await;
    }
    Ok(true)
}

async fn enrich_alias(shared: &Shared, event: &mut NewEvent) {
    if event.peer_alias.is_some() {
        return;
    }
    let Some(pubkey) = event.peer_pubkey.as_deref() else {
        return;
    };
    match shared.node.node_alias(pubkey).await {
        Ok(alias) => event.peer_alias = alias.filter(|a| !a.is_empty()),
        Err(e) => log::debug!("Alias lookup for {} failed: {}", pubkey, e),
    }
}

async fn poll_forwards(shared: Arc<Shared>, cancel: CancellationToken) -> Result<usize, WorkerError> {
    let stored = shared.store.cursor_u64(CURSOR_FORWARDS_OFFSET)?;
    let mut offset = u32::try_from(stored).unwrap_or(u32::MAX);
    let page_size = shared.config.forward_page_size.max(1);
    let end_time = (shared.now)().timestamp() + 1;
    let mut ingested = 0;

    while !cancel.is_cancelled() {
        let page = shared
            .node
            .forwarding_history(ForwardingQuery {
                start_time: 0,
                end_time,
                index_offset: offset,
                max_events: page_size,
            })
            .await?;

        for forward in &page.events {
            match NewEvent::from_forward(forward) {
                Some(event) => {
                    shared.ingest(&event)?;
                    ingested += 1;
                }
                None => log::debug!("Skipping forwarding event without timestamp"),
            }
        }

        let advanced = page.last_offset_index > offset;
        if advanced {
            shared
                .store
                .advance_cursor(CURSOR_FORWARDS_OFFSET, u64::from(page.last_offset_index))?;
            offset = page.last_offset_index;
        }
        if (page.events.len() as u32) < page_size || !advanced {
            break;
        }
    }

    Ok(ingested)
}
