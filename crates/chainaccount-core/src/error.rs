//! Error types for fetch, decode and transport operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::address::Address;

/// A JSON-RPC 2.0 error object returned by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node answered, but not with the shape we asked for.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

/// Errors raised while decoding account bytes against an IDL layout.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Type '{name}' is not defined in the IDL")]
    UnknownType { name: String },

    #[error("Unexpected end of data while decoding {context}")]
    UnexpectedEof { context: String },

    #[error("Invalid value: {reason}")]
    InvalidValue { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by account client operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Strict fetch found no account at the address.
    #[error("Account does not exist {address}")]
    NotFound { address: Address },

    /// An account exists but its discriminator belongs to another type.
    #[error("Invalid account discriminator at {address}: expected {expected}, found {found}")]
    TypeMismatch {
        address: Address,
        expected: String,
        found: String,
    },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AccountError {
    /// Returns `true` for [`AccountError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`AccountError::TypeMismatch`].
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}
