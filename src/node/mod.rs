//! Node-RPC collaborator
//!
//! The reporting engine never talks to the node directly; it consumes the
//! narrow [`NodeRpc`] surface below. Push subscriptions are delivered as a
//! bounded channel: the channel closing means the upstream stream ended and
//! the consuming worker should reconnect.
//!
//! - `types` - records returned by the node
//! - `lnd_rest` - LND REST implementation
//! - `fake` - scripted in-memory node for tests

pub mod lnd_rest;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use types::*;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Receiving end of a push subscription.
pub type EventStream<T> = mpsc::Receiver<RpcResult<T>>;

#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// One page of forwarding history inside `[start_time, end_time)`.
    async fn forwarding_history(&self, query: ForwardingQuery) -> RpcResult<ForwardingPage>;

    async fn list_payments(&self, query: PaymentQuery) -> RpcResult<PaymentPage>;

    /// Settled invoices with a settle index greater than `settle_index`.
    async fn subscribe_invoices(&self, settle_index: u64) -> RpcResult<EventStream<Invoice>>;

    async fn subscribe_transactions(&self) -> RpcResult<EventStream<OnchainTransaction>>;

    async fn subscribe_channel_events(&self) -> RpcResult<EventStream<ChannelEvent>>;

    async fn pending_channels(&self) -> RpcResult<PendingChannels>;

    /// Alias from the node graph; None when the node is unknown or unnamed.
    async fn node_alias(&self, pubkey: &str) -> RpcResult<Option<String>>;

    async fn decode_pay_req(&self, pay_req: &str) -> RpcResult<PayReq>;

    async fn get_info(&self) -> RpcResult<NodeInfo>;

    async fn balances(&self) -> RpcResult<BalanceSnapshot>;

    /// Encrypted multi-channel static backup blob.
    async fn export_channel_backup(&self) -> RpcResult<Vec<u8>>;
}
