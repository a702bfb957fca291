//! Domain records returned by the node collaborator
//!
//! Amount fields mirror what the node reports: every msat field may be zero
//! when the node only filled the sat field, so consumers normalise with
//! [`msat_or_sat`].

use serde::{Deserialize, Serialize};

/// Prefer an exact msat value, else scale the sat value by 1000.
pub fn msat_or_sat(msat: i64, sat: i64) -> i64 {
    if msat != 0 {
        msat
    } else {
        sat.saturating_mul(1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingQuery {
    pub start_time: i64,
    pub end_time: i64,
    pub index_offset: u32,
    pub max_events: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardingEvent {
    pub timestamp_ns: i64,
    pub chan_id_in: u64,
    pub chan_id_out: u64,
    pub amt_in_sat: i64,
    pub amt_out_sat: i64,
    pub amt_in_msat: i64,
    pub amt_out_msat: i64,
    pub fee_sat: i64,
    pub fee_msat: i64,
    pub incoming_htlc_id: Option<u64>,
    pub outgoing_htlc_id: Option<u64>,
    pub peer_alias_in: Option<String>,
    pub peer_alias_out: Option<String>,
}

impl ForwardingEvent {
    pub fn fee_msat_normalized(&self) -> i64 {
        msat_or_sat(self.fee_msat, self.fee_sat)
    }

    pub fn volume_msat_normalized(&self) -> i64 {
        msat_or_sat(self.amt_out_msat, self.amt_out_sat)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardingPage {
    pub events: Vec<ForwardingEvent>,
    pub last_offset_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unknown,
    InFlight,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    /// In-flight and unknown payments are not yet final.
    pub fn is_final(self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Failed)
    }
}

/// Status filter of a payment listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentStatusFilter {
    #[default]
    All,
    Succeeded,
    Failed,
}

impl PaymentStatusFilter {
    pub fn accepts(self, status: PaymentStatus) -> bool {
        match self {
            PaymentStatusFilter::All => true,
            PaymentStatusFilter::Succeeded => status == PaymentStatus::Succeeded,
            PaymentStatusFilter::Failed => status == PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentQuery {
    /// Creation-time bounds in unix seconds; None leaves that side open
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub index_offset: u64,
    pub max_payments: u64,
    pub reversed: bool,
    pub status: PaymentStatusFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcStatus {
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtlcAttempt {
    pub status: HtlcStatus,
    /// Hop pubkeys in route order; the last entry is the final destination
    pub hop_pubkeys: Vec<String>,
    pub resolve_time_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_hash: String,
    pub payment_index: u64,
    pub status: PaymentStatus,
    pub value_sat: i64,
    pub value_msat: i64,
    pub fee_sat: i64,
    pub fee_msat: i64,
    pub creation_time_ns: i64,
    pub payment_request: String,
    pub htlcs: Vec<HtlcAttempt>,
}

impl Payment {
    pub fn fee_msat_normalized(&self) -> i64 {
        msat_or_sat(self.fee_msat, self.fee_sat)
    }

    /// Destination of the last successful HTLC attempt, if any.
    pub fn final_hop_pubkey(&self) -> Option<&str> {
        self.htlcs
            .iter()
            .rev()
            .find(|h| h.status == HtlcStatus::Succeeded)
            .and_then(|h| h.hop_pubkeys.last())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentPage {
    pub payments: Vec<Payment>,
    pub first_index_offset: u64,
    pub last_index_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceState {
    Open,
    Settled,
    Canceled,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Hex-encoded payment hash
    pub payment_hash: String,
    pub memo: String,
    pub state: InvoiceState,
    pub amt_paid_sat: i64,
    pub amt_paid_msat: i64,
    pub creation_date: i64,
    pub settle_date: i64,
    pub settle_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnchainTransaction {
    pub tx_hash: String,
    /// Signed net effect on the wallet, in sat
    pub amount_sat: i64,
    pub num_confirmations: i32,
    pub time_stamp: i64,
    pub total_fees_sat: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenChannel {
    pub channel_point: String,
    pub chan_id: u64,
    pub remote_pubkey: String,
    pub capacity_sat: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedChannel {
    pub channel_point: String,
    pub chan_id: u64,
    pub remote_pubkey: String,
    pub capacity_sat: i64,
    pub settled_balance_sat: i64,
    pub closing_tx_hash: String,
    pub close_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelEvent {
    Open(OpenChannel),
    Closed(ClosedChannel),
    /// Funding broadcast; only the outpoint is known at this stage
    PendingOpen { txid: String, output_index: u32 },
    /// Active/inactive/fully-resolved updates carry nothing the ledger records
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChannel {
    pub channel_point: String,
    pub remote_pubkey: String,
    pub capacity_sat: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChannels {
    pub pending_open: Vec<PendingChannel>,
}

impl PendingChannels {
    /// Match by full channel point, falling back to a txid prefix match.
    pub fn find(&self, channel_point: &str, txid: &str) -> Option<&PendingChannel> {
        if !channel_point.is_empty() {
            if let Some(found) = self
                .pending_open
                .iter()
                .find(|c| c.channel_point == channel_point)
            {
                return Some(found);
            }
        }
        if txid.is_empty() {
            return None;
        }
        self.pending_open
            .iter()
            .find(|c| c.channel_point.starts_with(txid))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayReq {
    pub destination: String,
    pub payment_hash: String,
    pub description: String,
    pub num_msat: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub identity_pubkey: String,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub onchain_confirmed_sat: i64,
    pub onchain_unconfirmed_sat: i64,
    pub lightning_local_sat: i64,
}

impl BalanceSnapshot {
    pub fn onchain_sat(&self) -> i64 {
        self.onchain_confirmed_sat + self.onchain_unconfirmed_sat
    }
}
