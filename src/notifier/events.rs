//! Canonical ledger events and their construction from node records
//!
//! Every source maps to a deterministic `event_key`, so replaying an upstream
//! record always lands on the same row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::node::{
    msat_or_sat, ClosedChannel, ForwardingEvent, Invoice, InvoiceState, OnchainTransaction,
    OpenChannel, Payment, PaymentStatus, PendingChannel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Lightning,
    Onchain,
    Channel,
    Forward,
    Rebalance,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Lightning => "lightning",
            EventKind::Onchain => "onchain",
            EventKind::Channel => "channel",
            EventKind::Forward => "forward",
            EventKind::Rebalance => "rebalance",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lightning" => Ok(EventKind::Lightning),
            "onchain" => Ok(EventKind::Onchain),
            "channel" => Ok(EventKind::Channel),
            "forward" => Ok(EventKind::Forward),
            "rebalance" => Ok(EventKind::Rebalance),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Neutral,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Neutral => "neutral",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "neutral" => Ok(Direction::Neutral),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

pub mod action {
    pub const RECEIVED: &str = "received";
    pub const SENT: &str = "sent";
    pub const OPENED: &str = "opened";
    pub const OPENING: &str = "opening";
    pub const CLOSED: &str = "closed";
    pub const FORWARDED: &str = "forwarded";
    pub const REBALANCED: &str = "rebalanced";
}

pub mod status {
    pub const SETTLED: &str = "settled";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
    pub const CONFIRMED: &str = "confirmed";
    pub const PENDING: &str = "pending";
    pub const OPEN: &str = "open";
    pub const CLOSED: &str = "closed";
}

/// Event as produced by an ingestion worker, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvent {
    pub event_key: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub action: String,
    pub direction: Direction,
    pub status: String,
    pub amount_sat: i64,
    pub fee_sat: i64,
    pub fee_msat: i64,
    pub peer_pubkey: Option<String>,
    pub peer_alias: Option<String>,
    pub channel_id: Option<String>,
    pub channel_point: Option<String>,
    pub txid: Option<String>,
    pub payment_hash: Option<String>,
    pub memo: Option<String>,
}

/// Stored canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub event_key: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub action: String,
    pub direction: Direction,
    pub status: String,
    pub amount_sat: i64,
    pub fee_sat: i64,
    pub fee_msat: i64,
    pub peer_pubkey: Option<String>,
    pub peer_alias: Option<String>,
    pub channel_id: Option<String>,
    pub channel_point: Option<String>,
    pub txid: Option<String>,
    pub payment_hash: Option<String>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn from_unix_secs(secs: i64) -> Option<DateTime<Utc>> {
    (secs > 0).then(|| DateTime::from_timestamp(secs, 0)).flatten()
}

impl NewEvent {
    fn bare(
        event_key: String,
        occurred_at: DateTime<Utc>,
        kind: EventKind,
        action: &str,
        direction: Direction,
        status: &str,
    ) -> Self {
        Self {
            event_key,
            occurred_at,
            kind,
            action: action.to_string(),
            direction,
            status: status.to_string(),
            amount_sat: 0,
            fee_sat: 0,
            fee_msat: 0,
            peer_pubkey: None,
            peer_alias: None,
            channel_id: None,
            channel_point: None,
            txid: None,
            payment_hash: None,
            memo: None,
        }
    }

    /// Settled invoice; None for unsettled or hash-less invoices.
    pub fn from_invoice(invoice: &Invoice) -> Option<Self> {
        if invoice.state != InvoiceState::Settled {
            return None;
        }
        let hash = non_empty(&invoice.payment_hash)?;
        let occurred_at =
            from_unix_secs(invoice.settle_date).or_else(|| from_unix_secs(invoice.creation_date))?;

        let mut event = Self::bare(
            format!("invoice:{}", hash),
            occurred_at,
            EventKind::Lightning,
            action::RECEIVED,
            Direction::In,
            status::SETTLED,
        );
        event.amount_sat = msat_or_sat(invoice.amt_paid_msat, invoice.amt_paid_sat) / 1000;
        event.payment_hash = Some(hash);
        event.memo = non_empty(&invoice.memo);
        Some(event)
    }

    /// Completed or failed payment; None while still in flight.
    pub fn from_payment(payment: &Payment) -> Option<Self> {
        let status = match payment.status {
            PaymentStatus::Succeeded => status::SUCCEEDED,
            PaymentStatus::Failed => status::FAILED,
            PaymentStatus::InFlight | PaymentStatus::Unknown => return None,
        };
        let hash = non_empty(&payment.payment_hash)?;
        let occurred_at = (payment.creation_time_ns > 0)
            .then(|| DateTime::from_timestamp_nanos(payment.creation_time_ns))?;

        let fee_msat = payment.fee_msat_normalized();
        let mut event = Self::bare(
            format!("payment:{}", hash),
            occurred_at,
            EventKind::Lightning,
            action::SENT,
            Direction::Out,
            status,
        );
        event.amount_sat = msat_or_sat(payment.value_msat, payment.value_sat) / 1000;
        event.fee_sat = fee_msat / 1000;
        event.fee_msat = fee_msat;
        event.peer_pubkey = payment.final_hop_pubkey().map(str::to_string);
        event.payment_hash = Some(hash);
        Some(event)
    }

    /// Wallet transaction; direction from the sign of the net amount.
    pub fn from_transaction(tx: &OnchainTransaction, now: DateTime<Utc>) -> Option<Self> {
        let txid = non_empty(&tx.tx_hash)?;
        let (action, direction) = if tx.amount_sat < 0 {
            (action::SENT, Direction::Out)
        } else {
            (action::RECEIVED, Direction::In)
        };
        let status = if tx.num_confirmations > 0 {
            status::CONFIRMED
        } else {
            status::PENDING
        };

        let mut event = Self::bare(
            format!("onchain:{}", txid),
            from_unix_secs(tx.time_stamp).unwrap_or(now),
            EventKind::Onchain,
            action,
            direction,
            status,
        );
        event.amount_sat = tx.amount_sat.abs();
        event.fee_sat = tx.total_fees_sat;
        event.fee_msat = tx.total_fees_sat.saturating_mul(1000);
        event.txid = Some(txid);
        event.memo = non_empty(&tx.label);
        Some(event)
    }

    pub fn from_channel_open(channel: &OpenChannel, now: DateTime<Utc>) -> Option<Self> {
        let point = non_empty(&channel.channel_point)?;
        let mut event = Self::bare(
            format!("channel:open:{}", point),
            now,
            EventKind::Channel,
            action::OPENED,
            Direction::Neutral,
            status::OPEN,
        );
        event.amount_sat = channel.capacity_sat;
        event.peer_pubkey = non_empty(&channel.remote_pubkey);
        event.channel_id = (channel.chan_id != 0).then(|| channel.chan_id.to_string());
        event.txid = point.split(':').next().map(str::to_string);
        event.channel_point = Some(point);
        Some(event)
    }

    pub fn from_channel_close(channel: &ClosedChannel, now: DateTime<Utc>) -> Option<Self> {
        let point = non_empty(&channel.channel_point)?;
        let mut event = Self::bare(
            format!("channel:close:{}", point),
            now,
            EventKind::Channel,
            action::CLOSED,
            Direction::Neutral,
            status::CLOSED,
        );
        event.amount_sat = channel.settled_balance_sat;
        event.peer_pubkey = non_empty(&channel.remote_pubkey);
        event.channel_id = (channel.chan_id != 0).then(|| channel.chan_id.to_string());
        event.txid = non_empty(&channel.closing_tx_hash);
        event.memo = non_empty(&channel.close_type);
        event.channel_point = Some(point);
        Some(event)
    }

    /// Funding broadcast, enriched from the pending-channel snapshot when found.
    pub fn from_pending_open(
        txid: &str,
        output_index: u32,
        pending: Option<&PendingChannel>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let txid = non_empty(txid)?;
        let point = pending
            .and_then(|p| non_empty(&p.channel_point))
            .unwrap_or_else(|| format!("{}:{}", txid, output_index));

        let mut event = Self::bare(
            format!("channel:pending:{}", point),
            now,
            EventKind::Channel,
            action::OPENING,
            Direction::Neutral,
            status::PENDING,
        );
        if let Some(pending) = pending {
            event.amount_sat = pending.capacity_sat;
            event.peer_pubkey = non_empty(&pending.remote_pubkey);
        }
        event.txid = Some(txid);
        event.channel_point = Some(point);
        Some(event)
    }

    /// One forwarded HTLC pair; None for events without a timestamp.
    pub fn from_forward(forward: &ForwardingEvent) -> Option<Self> {
        if forward.timestamp_ns <= 0 {
            return None;
        }
        let fee_msat = forward.fee_msat_normalized();
        let mut event = Self::bare(
            format!(
                "forward:{}:{}:{}",
                forward.incoming_htlc_id.unwrap_or(0),
                forward.outgoing_htlc_id.unwrap_or(0),
                forward.timestamp_ns
            ),
            DateTime::from_timestamp_nanos(forward.timestamp_ns),
            EventKind::Forward,
            action::FORWARDED,
            Direction::Neutral,
            status::SETTLED,
        );
        event.amount_sat = forward.volume_msat_normalized() / 1000;
        event.fee_sat = fee_msat / 1000;
        event.fee_msat = fee_msat;
        event.channel_id = Some(forward.chan_id_out.to_string());
        event.peer_alias = forward.peer_alias_out.clone().filter(|a| !a.is_empty());
        event.memo = forward
            .peer_alias_in
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(|alias| format!("from {}", alias));
        Some(event)
    }
}
