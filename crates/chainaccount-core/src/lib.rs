//! chainaccount-core: foundation types and traits for ChainAccount.
//!
//! # Overview
//!
//! ChainAccount fetches, decodes, scans and watches program-owned accounts
//! described by an Anchor IDL. The core crate defines:
//!
//! - [`Address`]: 32-byte account / program identifier (base-58 text form)
//! - [`Idl`]: the schema model: account layouts and shared user types
//! - [`account_discriminator`]: the 8-byte type prefix of every account
//! - [`AccountDecoder`]: the decoder seam, with [`AccountValue`] as output
//! - [`Connection`]: the async RPC collaborator the clients are built on
//! - [`AccountError`] / [`TransportError`] / [`DecodeError`]: error types

pub mod address;
pub mod connection;
pub mod decoder;
pub mod discriminator;
pub mod error;
pub mod idl;
pub mod types;
pub mod value;

pub use address::Address;
pub use connection::{AccountChangeCallback, Connection, ListenerId};
pub use decoder::AccountDecoder;
pub use discriminator::{account_discriminator, Discriminator, DISCRIMINATOR_SIZE};
pub use error::{AccountError, DecodeError, JsonRpcError, TransportError};
pub use idl::{Idl, IdlEnumFields, IdlEnumVariant, IdlField, IdlType, IdlTypeDef, IdlTypeDefTy};
pub use types::{
    AccountChange, Commitment, DataSlice, KeyedAccount, ProgramAccount, ProgramAccountsConfig,
    RawAccountInfo, RpcFilter, ScanFilter,
};
pub use value::AccountValue;
