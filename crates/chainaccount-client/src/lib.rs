//! chainaccount-client: typed access to a program's Anchor accounts.
//!
//! # Architecture
//! ```text
//! Idl + program id + Connection
//!        │
//!        ▼
//! AccountNamespace ──► AccountClient (one per IDL account)
//!                          │  fetch / fetch_nullable / fetch_multiple
//!                          │  all / all_addresses
//!                          │  subscribe / unsubscribe
//!                          ▼
//!        batch::get_multiple_accounts   SubscriptionRegistry
//!                          │                   │
//!                          ▼                   ▼
//!                      Connection (getMultipleAccounts, accountSubscribe, ...)
//! ```
//!
//! Every fetched account is checked against the type's 8-byte discriminator
//! before decoding. Single-account fetches treat a mismatch as an error;
//! multi-account fetches and scans treat it as "not this type".

pub mod account;
pub mod batch;
pub mod namespace;
pub mod subscriptions;

pub use account::AccountClient;
pub use batch::{get_multiple_accounts, GET_MULTIPLE_ACCOUNTS_LIMIT};
pub use namespace::{camel_case, AccountNamespace};
pub use subscriptions::{AccountEvents, SubscriptionRegistry, DEFAULT_EVENT_CAPACITY};

pub use chainaccount_core::{
    AccountChange, AccountError, Address, Commitment, ProgramAccount, RpcFilter, ScanFilter,
};
