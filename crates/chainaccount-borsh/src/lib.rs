//! # chainaccount-borsh
//!
//! IDL-driven Borsh decoder for Anchor accounts.
//!
//! Anchor accounts are laid out as:
//! - an 8-byte discriminator (`SHA-256("account:<Name>")[..8]`)
//! - the Borsh encoding of the account struct, fields in IDL order
//! - optional zero padding up to the allocated account size
//!
//! [`BorshAccountDecoder`] walks the IDL layout and produces
//! [`AccountValue`](chainaccount_core::AccountValue) trees, so no generated
//! Rust types are needed to read a program's accounts.

pub mod decoder;

pub use decoder::BorshAccountDecoder;
