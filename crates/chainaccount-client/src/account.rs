//! `AccountClient`: fetch, scan and watch accounts of one IDL type.

use std::sync::Arc;

use chainaccount_core::{
    address::Address,
    connection::Connection,
    decoder::AccountDecoder,
    discriminator::{self, Discriminator, DISCRIMINATOR_SIZE},
    error::{AccountError, DecodeError},
    idl::Idl,
    types::{Commitment, DataSlice, ProgramAccount, ProgramAccountsConfig, ScanFilter},
    value::AccountValue,
};

use crate::batch::{self, GET_MULTIPLE_ACCOUNTS_LIMIT};
use crate::subscriptions::{AccountEvents, SubscriptionRegistry};

/// Outcome of checking account bytes against a client's discriminator.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Decoded {
    Matched(AccountValue),
    Mismatch,
}

/// Decode `data` as `name` if it starts with `discriminator`.
///
/// A matching prefix followed by an undecodable payload is an error, not a
/// mismatch.
pub(crate) fn decode_if_matching(
    decoder: &dyn AccountDecoder,
    name: &str,
    discriminator: &Discriminator,
    data: &[u8],
) -> Result<Decoded, DecodeError> {
    if !discriminator::matches(discriminator, data) {
        return Ok(Decoded::Mismatch);
    }
    decoder.decode(name, data).map(Decoded::Matched)
}

fn type_mismatch(address: Address, expected: &Discriminator, data: &[u8]) -> AccountError {
    AccountError::TypeMismatch {
        address,
        expected: hex::encode(expected),
        found: hex::encode(&data[..data.len().min(DISCRIMINATOR_SIZE)]),
    }
}

/// Client for one account type of a program.
///
/// Built by [`AccountNamespace`](crate::AccountNamespace) for every account
/// in the IDL, or directly with [`AccountClient::new`].
#[derive(Clone)]
pub struct AccountClient {
    name: String,
    idl: Arc<Idl>,
    program_id: Address,
    connection: Arc<dyn Connection>,
    decoder: Arc<dyn AccountDecoder>,
    discriminator: Discriminator,
    size: usize,
    registry: SubscriptionRegistry,
    batch_limit: usize,
}

impl AccountClient {
    /// Client for the IDL account named `name`. Fails with
    /// [`DecodeError::UnknownType`] if the IDL declares no such account.
    pub fn new(
        idl: Arc<Idl>,
        name: &str,
        program_id: Address,
        connection: Arc<dyn Connection>,
        decoder: Arc<dyn AccountDecoder>,
    ) -> Result<Self, DecodeError> {
        let def = idl.account(name).ok_or_else(|| DecodeError::UnknownType {
            name: name.to_string(),
        })?;
        let size = DISCRIMINATOR_SIZE + decoder.size(def).unwrap_or(0);
        let discriminator = decoder.discriminator(name);

        Ok(Self {
            name: name.to_string(),
            idl,
            program_id,
            connection,
            decoder,
            discriminator,
            size,
            registry: SubscriptionRegistry::new(),
            batch_limit: GET_MULTIPLE_ACCOUNTS_LIMIT,
        })
    }

    /// Share `registry` instead of a private one.
    pub fn with_registry(mut self, registry: SubscriptionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Maximum addresses per `getMultipleAccounts` call.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// The IDL account name, as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes needed to store the account: discriminator plus payload, or
    /// just the discriminator for variable-size layouts.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn program_id(&self) -> &Address {
        &self.program_id
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    pub fn idl(&self) -> &Arc<Idl> {
        &self.idl
    }

    pub fn decoder(&self) -> &Arc<dyn AccountDecoder> {
        &self.decoder
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn decode(&self, data: &[u8]) -> Result<Decoded, DecodeError> {
        decode_if_matching(self.decoder.as_ref(), &self.name, &self.discriminator, data)
    }

    /// Fetch and decode the account at `address`.
    ///
    /// `Ok(None)` when nothing is stored there; [`AccountError::TypeMismatch`]
    /// when the stored account is of another type.
    pub async fn fetch_nullable(
        &self,
        address: &Address,
        commitment: Option<Commitment>,
    ) -> Result<Option<AccountValue>, AccountError> {
        let Some(info) = self.connection.get_account_info(address, commitment).await? else {
            return Ok(None);
        };
        match self.decode(&info.data)? {
            Decoded::Matched(value) => Ok(Some(value)),
            Decoded::Mismatch => Err(type_mismatch(*address, &self.discriminator, &info.data)),
        }
    }

    /// Like [`fetch_nullable`](Self::fetch_nullable), but a missing account
    /// is [`AccountError::NotFound`].
    pub async fn fetch(
        &self,
        address: &Address,
        commitment: Option<Commitment>,
    ) -> Result<AccountValue, AccountError> {
        self.fetch_nullable(address, commitment)
            .await?
            .ok_or(AccountError::NotFound { address: *address })
    }

    /// Fetch many accounts, batching under the RPC key limit.
    ///
    /// One entry per input address, in order. Missing accounts and accounts
    /// of another type are both `None`.
    pub async fn fetch_multiple(
        &self,
        addresses: &[Address],
        commitment: Option<Commitment>,
    ) -> Result<Vec<Option<AccountValue>>, AccountError> {
        let accounts = batch::get_multiple_accounts(
            self.connection.as_ref(),
            addresses,
            commitment,
            self.batch_limit,
        )
        .await?;

        accounts
            .into_iter()
            .map(|keyed| -> Result<Option<AccountValue>, AccountError> {
                let Some(keyed) = keyed else {
                    return Ok(None);
                };
                match self.decode(&keyed.account.data)? {
                    Decoded::Matched(value) => Ok(Some(value)),
                    Decoded::Mismatch => Ok(None),
                }
            })
            .collect()
    }

    fn scan_config(&self, filter: ScanFilter, data_slice: Option<DataSlice>) -> ProgramAccountsConfig {
        ProgramAccountsConfig {
            data_slice,
            filters: filter.into_rpc_filters(&self.discriminator),
            commitment: self.connection.commitment(),
        }
    }

    /// Every account of this type owned by the program, narrowed by
    /// `filter`. Returned accounts of another type are dropped.
    pub async fn all(&self, filter: ScanFilter) -> Result<Vec<ProgramAccount>, AccountError> {
        let config = self.scan_config(filter, None);
        let accounts = self
            .connection
            .get_program_accounts(&self.program_id, config)
            .await?;
        tracing::debug!(account = %self.name, returned = accounts.len(), "program account scan");

        let mut out = Vec::with_capacity(accounts.len());
        for keyed in accounts {
            match self.decode(&keyed.account.data)? {
                Decoded::Matched(account) => out.push(ProgramAccount {
                    address: keyed.address,
                    account,
                }),
                Decoded::Mismatch => {
                    tracing::debug!(address = %keyed.address, "dropping scanned account of another type")
                }
            }
        }
        Ok(out)
    }

    /// Addresses of every account [`all`](Self::all) would return, without
    /// transferring account data.
    pub async fn all_addresses(&self, filter: ScanFilter) -> Result<Vec<Address>, AccountError> {
        let config = self.scan_config(filter, Some(DataSlice::EMPTY));
        let accounts = self
            .connection
            .get_program_accounts(&self.program_id, config)
            .await?;
        Ok(accounts.into_iter().map(|keyed| keyed.address).collect())
    }

    /// Change stream for `address`, decoded as this type.
    ///
    /// Subscriptions are per address: if any client sharing this registry
    /// already watches `address`, its stream is returned as-is.
    pub async fn subscribe(
        &self,
        address: &Address,
        commitment: Option<Commitment>,
    ) -> Result<AccountEvents, AccountError> {
        let decoder = self.decoder.clone();
        let name = self.name.clone();
        let expected = self.discriminator;
        let owner = *address;
        let decode = move |data: &[u8]| -> Result<AccountValue, AccountError> {
            match decode_if_matching(decoder.as_ref(), &name, &expected, data)? {
                Decoded::Matched(value) => Ok(value),
                Decoded::Mismatch => Err(type_mismatch(owner, &expected, data)),
            }
        };

        let events = self
            .registry
            .subscribe(self.connection.as_ref(), *address, commitment, decode)
            .await?;
        Ok(events)
    }

    /// Stop watching `address`. Unknown addresses are logged and ignored.
    pub async fn unsubscribe(&self, address: &Address) {
        self.registry
            .unsubscribe(self.connection.as_ref(), address)
            .await
    }
}

impl std::fmt::Debug for AccountClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountClient")
            .field("name", &self.name)
            .field("program_id", &self.program_id)
            .field("size", &self.size)
            .finish()
    }
}
