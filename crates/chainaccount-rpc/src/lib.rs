//! chainaccount-rpc: Solana JSON-RPC [`Connection`](chainaccount_core::Connection).
//!
//! # Features
//! - `getAccountInfo`, `getMultipleAccounts` and `getProgramAccounts` over HTTP
//! - `accountSubscribe` / `accountUnsubscribe` over WebSocket
//! - Pubsub auto-reconnect with exponential backoff and re-subscribe
//! - Endpoint from `ANCHOR_PROVIDER_URL` or the local validator
//!
//! No retries on reads: transport failures surface to the caller unchanged.

pub mod config;
pub mod connection;
pub mod pubsub;
pub mod request;
pub mod transport;

pub use config::{ConfigError, ConnectionConfig, LOCAL_URL, PROVIDER_URL_ENV};
pub use connection::RpcConnection;
pub use pubsub::{PubsubClient, PubsubConfig};
pub use request::{JsonRpcRequest, JsonRpcResponse, RpcContext, RpcId, RpcResponseContext};
pub use transport::{HttpTransport, RpcTransport};
