//! LND REST implementation of [`NodeRpc`]
//!
//! Authenticates with the hex-encoded macaroon header and pins the node's
//! self-signed TLS certificate. Unary calls share a client with a request
//! timeout; subscriptions use a second client without one, since the response
//! body of a subscription never finishes. Subscription bodies are
//! newline-delimited JSON envelopes (`{"result": ...}` or `{"error": ...}`)
//! which a spawned reader task decodes into the returned channel.
//!
//! LND's JSON encodes 64-bit integers as strings and bytes as base64; the
//! `de_*` helpers accept both string and number forms.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use super::types::*;
use super::{EventStream, NodeRpc, RpcError, RpcResult};

/// Buffered items per subscription before the reader task waits on the worker
const STREAM_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct LndRestConfig {
    pub base_url: String,
    pub macaroon_path: PathBuf,
    pub tls_cert_path: PathBuf,
    pub timeout: Duration,
}

pub struct LndRestClient {
    base_url: String,
    macaroon_hex: String,
    client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl LndRestClient {
    pub fn new(config: &LndRestConfig) -> RpcResult<Self> {
        let macaroon = std::fs::read(&config.macaroon_path).map_err(|e| {
            RpcError::Config(format!("read macaroon {}: {}", config.macaroon_path.display(), e))
        })?;
        let cert_pem = std::fs::read(&config.tls_cert_path).map_err(|e| {
            RpcError::Config(format!("read TLS cert {}: {}", config.tls_cert_path.display(), e))
        })?;
        let cert = reqwest::Certificate::from_pem(&cert_pem)
            .map_err(|e| RpcError::Config(format!("parse TLS cert: {}", e)))?;

        let client = reqwest::Client::builder()
            .add_root_certificate(cert.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| RpcError::Config(e.to_string()))?;
        let stream_client = reqwest::Client::builder()
            .add_root_certificate(cert)
            .connect_timeout(config.timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| RpcError::Config(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            macaroon_hex: hex::encode(macaroon),
            client,
            stream_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<W: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> RpcResult<W> {
        let response = self
            .client
            .get(self.url(path))
            .header("Grpc-Metadata-macaroon", &self.macaroon_hex)
            .query(query)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        decode_response(response).await
    }

    async fn post_json<W: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> RpcResult<W> {
        let response = self
            .client
            .post(self.url(path))
            .header("Grpc-Metadata-macaroon", &self.macaroon_hex)
            .json(body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        decode_response(response).await
    }

    async fn open_stream<W, T, F>(
        &self,
        path: &str,
        query: &[(&str, String)],
        convert: F,
    ) -> RpcResult<EventStream<T>>
    where
        W: DeserializeOwned + Send + 'static,
        T: Send + 'static,
        F: Fn(W) -> Option<T> + Send + 'static,
    {
        let response = self
            .stream_client
            .get(self.url(path))
            .header("Grpc-Metadata-macaroon", &self.macaroon_hex)
            .query(query)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let path = path.to_string();
        tokio::spawn(async move {
            pump_ndjson(&path, response, tx, convert).await;
        });
        Ok(rx)
    }
}

async fn check_status(response: reqwest::Response) -> RpcResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RpcError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode_response<W: DeserializeOwned>(response: reqwest::Response) -> RpcResult<W> {
    let response = check_status(response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RpcError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| RpcError::Decode(e.to_string()))
}

#[derive(Deserialize)]
struct StreamEnvelope<W> {
    result: Option<W>,
    error: Option<StreamErrorBody>,
}

#[derive(Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}

/// Drain complete lines (without the trailing newline) from `buf`.
fn take_lines(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let mut line: Vec<u8> = buf.drain(..=pos).collect();
        line.pop();
        if line.iter().any(|b| !b.is_ascii_whitespace()) {
            lines.push(line);
        }
    }
    lines
}

enum LineOutcome<T> {
    Item(T),
    Skip,
    Failed(String),
}

fn decode_line<W, T, F>(path: &str, line: &[u8], convert: &F) -> LineOutcome<T>
where
    W: DeserializeOwned,
    F: Fn(W) -> Option<T>,
{
    match serde_json::from_slice::<StreamEnvelope<W>>(line) {
        Ok(StreamEnvelope { error: Some(err), .. }) => LineOutcome::Failed(err.message),
        Ok(StreamEnvelope { result: Some(wire), .. }) => match convert(wire) {
            Some(item) => LineOutcome::Item(item),
            None => LineOutcome::Skip,
        },
        Ok(_) => LineOutcome::Skip,
        Err(e) => {
            log::debug!("Skipping malformed {} record: {}", path, e);
            LineOutcome::Skip
        }
    }
}

async fn pump_ndjson<W, T, F>(
    path: &str,
    mut response: reqwest::Response,
    tx: mpsc::Sender<RpcResult<T>>,
    convert: F,
) where
    W: DeserializeOwned,
    F: Fn(W) -> Option<T>,
{
    let mut buf = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(bytes)) => {
                buf.extend_from_slice(&bytes);
                for line in take_lines(&mut buf) {
                    match decode_line(path, &line, &convert) {
                        LineOutcome::Item(item) => {
                            if tx.send(Ok(item)).await.is_err() {
                                return;
                            }
                        }
                        LineOutcome::Skip => {}
                        LineOutcome::Failed(message) => {
                            let _ = tx.send(Err(RpcError::Stream(message))).await;
                            return;
                        }
                    }
                }
            }
            Ok(None) => {
                log::debug!("Stream {} ended by node", path);
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(RpcError::Stream(e.to_string()))).await;
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Int(i64),
    UInt(u64),
}

fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Option::<StrOrNum>::deserialize(d)? {
        None => Ok(0),
        Some(StrOrNum::Int(n)) => Ok(n),
        Some(StrOrNum::UInt(n)) => i64::try_from(n).map_err(serde::de::Error::custom),
        Some(StrOrNum::Str(s)) if s.is_empty() => Ok(0),
        Some(StrOrNum::Str(s)) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn de_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(de_opt_u64(d)?.unwrap_or(0))
}

fn de_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match Option::<StrOrNum>::deserialize(d)? {
        None => Ok(None),
        Some(StrOrNum::UInt(n)) => Ok(Some(n)),
        Some(StrOrNum::Int(n)) => u64::try_from(n).map(Some).map_err(serde::de::Error::custom),
        Some(StrOrNum::Str(s)) if s.is_empty() => Ok(None),
        Some(StrOrNum::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn bytes_to_hex(b64: &str) -> Option<String> {
    STANDARD.decode(b64).ok().map(hex::encode)
}

/// Funding txids travel in internal byte order; display order is reversed.
fn txid_from_bytes(b64: &str) -> Option<String> {
    let mut bytes = STANDARD.decode(b64).ok()?;
    bytes.reverse();
    Some(hex::encode(bytes))
}

#[derive(Deserialize)]
struct WireForwardingResponse {
    #[serde(default)]
    forwarding_events: Vec<WireForwardingEvent>,
    #[serde(default, deserialize_with = "de_u64")]
    last_offset_index: u64,
}

#[derive(Deserialize)]
struct WireForwardingEvent {
    #[serde(default, deserialize_with = "de_i64")]
    timestamp_ns: i64,
    #[serde(default, deserialize_with = "de_u64")]
    chan_id_in: u64,
    #[serde(default, deserialize_with = "de_u64")]
    chan_id_out: u64,
    #[serde(default, deserialize_with = "de_i64")]
    amt_in: i64,
    #[serde(default, deserialize_with = "de_i64")]
    amt_out: i64,
    #[serde(default, deserialize_with = "de_i64")]
    amt_in_msat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    amt_out_msat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    fee: i64,
    #[serde(default, deserialize_with = "de_i64")]
    fee_msat: i64,
    #[serde(default, deserialize_with = "de_opt_u64")]
    incoming_htlc_id: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    outgoing_htlc_id: Option<u64>,
    #[serde(default)]
    peer_alias_in: String,
    #[serde(default)]
    peer_alias_out: String,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl From<WireForwardingEvent> for ForwardingEvent {
    fn from(w: WireForwardingEvent) -> Self {
        ForwardingEvent {
            timestamp_ns: w.timestamp_ns,
            chan_id_in: w.chan_id_in,
            chan_id_out: w.chan_id_out,
            amt_in_sat: w.amt_in,
            amt_out_sat: w.amt_out,
            amt_in_msat: w.amt_in_msat,
            amt_out_msat: w.amt_out_msat,
            fee_sat: w.fee,
            fee_msat: w.fee_msat,
            incoming_htlc_id: w.incoming_htlc_id,
            outgoing_htlc_id: w.outgoing_htlc_id,
            peer_alias_in: non_empty(w.peer_alias_in),
            peer_alias_out: non_empty(w.peer_alias_out),
        }
    }
}

#[derive(Deserialize)]
struct WirePaymentsResponse {
    #[serde(default)]
    payments: Vec<WirePayment>,
    #[serde(default, deserialize_with = "de_u64")]
    first_index_offset: u64,
    #[serde(default, deserialize_with = "de_u64")]
    last_index_offset: u64,
}

#[derive(Deserialize)]
struct WirePayment {
    #[serde(default)]
    payment_hash: String,
    #[serde(default, deserialize_with = "de_u64")]
    payment_index: u64,
    #[serde(default)]
    status: String,
    #[serde(default, deserialize_with = "de_i64")]
    value_sat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    value_msat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    fee_sat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    fee_msat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    creation_time_ns: i64,
    #[serde(default)]
    payment_request: String,
    #[serde(default)]
    htlcs: Vec<WireHtlc>,
}

#[derive(Deserialize)]
struct WireHtlc {
    #[serde(default)]
    status: String,
    route: Option<WireRoute>,
    #[serde(default, deserialize_with = "de_i64")]
    resolve_time_ns: i64,
}

#[derive(Deserialize)]
struct WireRoute {
    #[serde(default)]
    hops: Vec<WireHop>,
}

#[derive(Deserialize)]
struct WireHop {
    #[serde(default)]
    pub_key: String,
}

fn payment_status(s: &str) -> PaymentStatus {
    match s {
        "SUCCEEDED" => PaymentStatus::Succeeded,
        "FAILED" => PaymentStatus::Failed,
        "IN_FLIGHT" | "INITIATED" => PaymentStatus::InFlight,
        _ => PaymentStatus::Unknown,
    }
}

fn htlc_status(s: &str) -> HtlcStatus {
    match s {
        "SUCCEEDED" => HtlcStatus::Succeeded,
        "FAILED" => HtlcStatus::Failed,
        _ => HtlcStatus::InFlight,
    }
}

impl From<WirePayment> for Payment {
    fn from(w: WirePayment) -> Self {
        Payment {
            payment_hash: w.payment_hash,
            payment_index: w.payment_index,
            status: payment_status(&w.status),
            value_sat: w.value_sat,
            value_msat: w.value_msat,
            fee_sat: w.fee_sat,
            fee_msat: w.fee_msat,
            creation_time_ns: w.creation_time_ns,
            payment_request: w.payment_request,
            htlcs: w
                .htlcs
                .into_iter()
                .map(|h| HtlcAttempt {
                    status: htlc_status(&h.status),
                    hop_pubkeys: h
                        .route
                        .map(|r| r.hops.into_iter().map(|hop| hop.pub_key).collect())
                        .unwrap_or_default(),
                    resolve_time_ns: h.resolve_time_ns,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireInvoice {
    #[serde(default)]
    r_hash: String,
    #[serde(default)]
    memo: String,
    #[serde(default)]
    state: String,
    #[serde(default, deserialize_with = "de_i64")]
    amt_paid_sat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    amt_paid_msat: i64,
    #[serde(default, deserialize_with = "de_i64")]
    creation_date: i64,
    #[serde(default, deserialize_with = "de_i64")]
    settle_date: i64,
    #[serde(default, deserialize_with = "de_u64")]
    settle_index: u64,
}

fn invoice_from_wire(w: WireInvoice) -> Option<Invoice> {
    let payment_hash = bytes_to_hex(&w.r_hash)?;
    let state = match w.state.as_str() {
        "SETTLED" => InvoiceState::Settled,
        "CANCELED" => InvoiceState::Canceled,
        "ACCEPTED" => InvoiceState::Accepted,
        _ => InvoiceState::Open,
    };
    Some(Invoice {
        payment_hash,
        memo: w.memo,
        state,
        amt_paid_sat: w.amt_paid_sat,
        amt_paid_msat: w.amt_paid_msat,
        creation_date: w.creation_date,
        settle_date: w.settle_date,
        settle_index: w.settle_index,
    })
}

#[derive(Deserialize)]
struct WireTransaction {
    #[serde(default)]
    tx_hash: String,
    #[serde(default, deserialize_with = "de_i64")]
    amount: i64,
    #[serde(default)]
    num_confirmations: i32,
    #[serde(default, deserialize_with = "de_i64")]
    time_stamp: i64,
    #[serde(default, deserialize_with = "de_i64")]
    total_fees: i64,
    #[serde(default)]
    label: String,
}

impl From<WireTransaction> for OnchainTransaction {
    fn from(w: WireTransaction) -> Self {
        OnchainTransaction {
            tx_hash: w.tx_hash,
            amount_sat: w.amount,
            num_confirmations: w.num_confirmations,
            time_stamp: w.time_stamp,
            total_fees_sat: w.total_fees,
            label: w.label,
        }
    }
}

#[derive(Deserialize)]
struct WireChannelEventUpdate {
    #[serde(default, rename = "type")]
    kind: String,
    open_channel: Option<WireOpenChannel>,
    closed_channel: Option<WireClosedChannel>,
    pending_open_channel: Option<WirePendingUpdate>,
}

#[derive(Deserialize)]
struct WireOpenChannel {
    #[serde(default)]
    channel_point: String,
    #[serde(default, deserialize_with = "de_u64")]
    chan_id: u64,
    #[serde(default)]
    remote_pubkey: String,
    #[serde(default, deserialize_with = "de_i64")]
    capacity: i64,
}

#[derive(Deserialize)]
struct WireClosedChannel {
    #[serde(default)]
    channel_point: String,
    #[serde(default, deserialize_with = "de_u64")]
    chan_id: u64,
    #[serde(default)]
    remote_pubkey: String,
    #[serde(default, deserialize_with = "de_i64")]
    capacity: i64,
    #[serde(default, deserialize_with = "de_i64")]
    settled_balance: i64,
    #[serde(default)]
    closing_tx_hash: String,
    #[serde(default)]
    close_type: String,
}

#[derive(Deserialize)]
struct WirePendingUpdate {
    #[serde(default)]
    txid: String,
    #[serde(default)]
    output_index: u32,
}

fn channel_event_from_wire(w: WireChannelEventUpdate) -> Option<ChannelEvent> {
    match w.kind.as_str() {
        "OPEN_CHANNEL" => w.open_channel.map(|c| {
            ChannelEvent::Open(OpenChannel {
                channel_point: c.channel_point,
                chan_id: c.chan_id,
                remote_pubkey: c.remote_pubkey,
                capacity_sat: c.capacity,
            })
        }),
        "CLOSED_CHANNEL" => w.closed_channel.map(|c| {
            ChannelEvent::Closed(ClosedChannel {
                channel_point: c.channel_point,
                chan_id: c.chan_id,
                remote_pubkey: c.remote_pubkey,
                capacity_sat: c.capacity,
                settled_balance_sat: c.settled_balance,
                closing_tx_hash: c.closing_tx_hash,
                close_type: c.close_type,
            })
        }),
        "PENDING_OPEN_CHANNEL" => w.pending_open_channel.map(|p| ChannelEvent::PendingOpen {
            txid: txid_from_bytes(&p.txid).unwrap_or_default(),
            output_index: p.output_index,
        }),
        other => Some(ChannelEvent::Other(other.to_string())),
    }
}

#[derive(Deserialize)]
struct WirePendingChannelsResponse {
    #[serde(default)]
    pending_open_channels: Vec<WirePendingOpen>,
}

#[derive(Deserialize)]
struct WirePendingOpen {
    channel: Option<WirePendingChannel>,
}

#[derive(Deserialize)]
struct WirePendingChannel {
    #[serde(default)]
    remote_node_pub: String,
    #[serde(default)]
    channel_point: String,
    #[serde(default, deserialize_with = "de_i64")]
    capacity: i64,
}

#[derive(Deserialize)]
struct WireNodeInfoResponse {
    node: Option<WireLightningNode>,
}

#[derive(Deserialize)]
struct WireLightningNode {
    #[serde(default)]
    alias: String,
}

#[derive(Deserialize)]
struct WirePayReq {
    #[serde(default)]
    destination: String,
    #[serde(default)]
    payment_hash: String,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "de_i64")]
    num_satoshis: i64,
    #[serde(default, deserialize_with = "de_i64")]
    num_msat: i64,
}

#[derive(Deserialize)]
struct WireGetInfo {
    #[serde(default)]
    identity_pubkey: String,
    #[serde(default)]
    alias: String,
}

#[derive(Deserialize)]
struct WireWalletBalance {
    #[serde(default, deserialize_with = "de_i64")]
    confirmed_balance: i64,
    #[serde(default, deserialize_with = "de_i64")]
    unconfirmed_balance: i64,
}

#[derive(Deserialize)]
struct WireChannelBalance {
    local_balance: Option<WireAmount>,
}

#[derive(Deserialize)]
struct WireAmount {
    #[serde(default, deserialize_with = "de_i64")]
    sat: i64,
}

#[derive(Deserialize)]
struct WireChanBackupSnapshot {
    multi_chan_backup: Option<WireMultiChanBackup>,
}

#[derive(Deserialize)]
struct WireMultiChanBackup {
    #[serde(default)]
    multi_chan_backup: String,
}

#[async_trait]
impl NodeRpc for LndRestClient {
    async fn forwarding_history(&self, query: ForwardingQuery) -> RpcResult<ForwardingPage> {
        let body = serde_json::json!({
            "start_time": query.start_time.max(0).to_string(),
            "end_time": query.end_time.max(0).to_string(),
            "index_offset": query.index_offset,
            "num_max_events": query.max_events,
            "peer_alias_lookup": true,
        });
        let wire: WireForwardingResponse = self.post_json("/v1/switch", &body).await?;
        Ok(ForwardingPage {
            events: wire.forwarding_events.into_iter().map(Into::into).collect(),
            last_offset_index: u32::try_from(wire.last_offset_index)
                .map_err(|e| RpcError::Decode(format!("last_offset_index: {}", e)))?,
        })
    }

    async fn list_payments(&self, query: PaymentQuery) -> RpcResult<PaymentPage> {
        let mut params = vec![
            ("include_incomplete", "true".to_string()),
            ("index_offset", query.index_offset.to_string()),
            ("max_payments", query.max_payments.to_string()),
            ("reversed", query.reversed.to_string()),
        ];
        if let Some(start) = query.start_time {
            params.push(("creation_date_start", start.max(0).to_string()));
        }
        if let Some(end) = query.end_time {
            params.push(("creation_date_end", end.max(0).to_string()));
        }

        let wire: WirePaymentsResponse = self.get_json("/v1/payments", &params).await?;
        Ok(PaymentPage {
            payments: wire
                .payments
                .into_iter()
                .map(Payment::from)
                .filter(|p| query.status.accepts(p.status))
                .collect(),
            first_index_offset: wire.first_index_offset,
            last_index_offset: wire.last_index_offset,
        })
    }

    async fn subscribe_invoices(&self, settle_index: u64) -> RpcResult<EventStream<Invoice>> {
        self.open_stream(
            "/v1/invoices/subscribe",
            &[("settle_index", settle_index.to_string())],
            invoice_from_wire,
        )
        .await
    }

    async fn subscribe_transactions(&self) -> RpcResult<EventStream<OnchainTransaction>> {
        self.open_stream("/v1/transactions/subscribe", &[], |w: WireTransaction| {
            Some(OnchainTransaction::from(w))
        })
        .await
    }

    async fn subscribe_channel_events(&self) -> RpcResult<EventStream<ChannelEvent>> {
        self.open_stream("/v1/channels/subscribe", &[], channel_event_from_wire)
            .await
    }

    async fn pending_channels(&self) -> RpcResult<PendingChannels> {
        let wire: WirePendingChannelsResponse = self.get_json("/v1/channels/pending", &[]).await?;
        Ok(PendingChannels {
            pending_open: wire
                .pending_open_channels
                .into_iter()
                .filter_map(|p| p.channel)
                .map(|c| PendingChannel {
                    channel_point: c.channel_point,
                    remote_pubkey: c.remote_node_pub,
                    capacity_sat: c.capacity,
                })
                .collect(),
        })
    }

    async fn node_alias(&self, pubkey: &str) -> RpcResult<Option<String>> {
        let path = format!("/v1/graph/node/{}", pubkey);
        match self
            .get_json::<WireNodeInfoResponse>(&path, &[("include_channels", "false".to_string())])
            .await
        {
            Ok(wire) => Ok(wire.node.and_then(|n| non_empty(n.alias))),
            Err(RpcError::Status { message, .. }) if message.contains("unable to find node") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn decode_pay_req(&self, pay_req: &str) -> RpcResult<PayReq> {
        let path = format!("/v1/payreq/{}", pay_req);
        let wire: WirePayReq = self.get_json(&path, &[]).await?;
        Ok(PayReq {
            destination: wire.destination,
            payment_hash: wire.payment_hash,
            description: wire.description,
            num_msat: msat_or_sat(wire.num_msat, wire.num_satoshis),
        })
    }

    async fn get_info(&self) -> RpcResult<NodeInfo> {
        let wire: WireGetInfo = self.get_json("/v1/getinfo", &[]).await?;
        Ok(NodeInfo {
            identity_pubkey: wire.identity_pubkey,
            alias: wire.alias,
        })
    }

    async fn balances(&self) -> RpcResult<BalanceSnapshot> {
        let wallet: WireWalletBalance = self.get_json("/v1/balance/blockchain", &[]).await?;
        let channels: WireChannelBalance = self.get_json("/v1/balance/channels", &[]).await?;
        Ok(BalanceSnapshot {
            onchain_confirmed_sat: wallet.confirmed_balance,
            onchain_unconfirmed_sat: wallet.unconfirmed_balance,
            lightning_local_sat: channels.local_balance.map(|b| b.sat).unwrap_or(0),
        })
    }

    async fn export_channel_backup(&self) -> RpcResult<Vec<u8>> {
        let wire: WireChanBackupSnapshot = self.get_json("/v1/channels/backup", &[]).await?;
        let blob = wire
            .multi_chan_backup
            .map(|m| m.multi_chan_backup)
            .unwrap_or_default();
        STANDARD
            .decode(blob)
            .map_err(|e| RpcError::Decode(format!("multi_chan_backup: {}", e)))
    }
}
