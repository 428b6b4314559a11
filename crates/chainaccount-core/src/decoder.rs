//! The `AccountDecoder` trait: the seam between clients and binary layouts.
//!
//! Implementations turn raw account bytes into [`AccountValue`]s for a named
//! IDL account type. The trait is object-safe so decoders can be shared as
//! `Arc<dyn AccountDecoder>` across clients and listener callbacks.

use crate::discriminator::{account_discriminator, Discriminator};
use crate::error::DecodeError;
use crate::idl::IdlTypeDef;
use crate::value::AccountValue;

pub trait AccountDecoder: Send + Sync {
    /// Decode a full account (discriminator included) as `type_name`.
    fn decode(&self, type_name: &str, data: &[u8]) -> Result<AccountValue, DecodeError>;

    /// The 8-byte prefix expected for `type_name`.
    fn discriminator(&self, type_name: &str) -> Discriminator {
        account_discriminator(type_name)
    }

    /// Payload size of `def` (discriminator excluded), `None` when the
    /// layout is variable-size.
    fn size(&self, def: &IdlTypeDef) -> Option<usize>;
}
