//! The `Connection` trait: everything the account clients need from RPC.
//!
//! # Thread Safety
//! Implementations must be `Send + Sync` for use across Tokio tasks.
//!
//! # Object Safety
//! The trait is object-safe and can be stored as `Arc<dyn Connection>`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::address::Address;
use crate::error::TransportError;
use crate::types::{Commitment, KeyedAccount, ProgramAccountsConfig, RawAccountInfo};

/// Handle of a registered account-change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoked with the new account state on every change notification.
pub type AccountChangeCallback = Arc<dyn Fn(RawAccountInfo) + Send + Sync>;

#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Default commitment applied when a call passes `None`.
    fn commitment(&self) -> Option<Commitment> {
        None
    }

    /// Fetch a single account; `Ok(None)` when nothing is stored there.
    async fn get_account_info(
        &self,
        address: &Address,
        commitment: Option<Commitment>,
    ) -> Result<Option<RawAccountInfo>, TransportError>;

    /// Raw batched fetch. Results come back in the order of `addresses`.
    /// Callers are responsible for respecting the node's batch ceiling.
    async fn get_multiple_accounts(
        &self,
        addresses: &[Address],
        commitment: Option<Commitment>,
    ) -> Result<Vec<Option<RawAccountInfo>>, TransportError>;

    /// All accounts owned by `program_id` that pass `config.filters`.
    async fn get_program_accounts(
        &self,
        program_id: &Address,
        config: ProgramAccountsConfig,
    ) -> Result<Vec<KeyedAccount>, TransportError>;

    /// Register `callback` for changes to the account at `address`.
    async fn on_account_change(
        &self,
        address: &Address,
        callback: AccountChangeCallback,
        commitment: Option<Commitment>,
    ) -> Result<ListenerId, TransportError>;

    /// Tear down a listener created by [`Connection::on_account_change`].
    async fn remove_account_change_listener(&self, id: ListenerId) -> Result<(), TransportError>;
}
