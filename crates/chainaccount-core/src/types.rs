//! Account, filter and commitment types shared by connections and clients.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::address::Address;
use crate::discriminator::Discriminator;
use crate::value::AccountValue;

/// How final a read must be relative to the ledger. Passed through to the
/// node untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Processed,
    Confirmed,
    Finalized,
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processed => write!(f, "processed"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

impl std::str::FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown commitment level '{other}'")),
        }
    }
}

/// Account state as returned by the RPC layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccountInfo {
    pub data: Vec<u8>,
    pub owner: Address,
    pub lamports: u64,
    pub executable: bool,
    pub rent_epoch: u64,
}

/// An account paired with the address it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedAccount {
    pub address: Address,
    pub account: RawAccountInfo,
}

/// A decoded account owned by a program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramAccount<T = AccountValue> {
    #[serde(rename = "publicKey")]
    pub address: Address,
    pub account: T,
}

/// Restricts the returned account data to `length` bytes from `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSlice {
    pub offset: usize,
    pub length: usize,
}

impl DataSlice {
    /// Zero-length slice: existence probe, no data transferred.
    pub const EMPTY: DataSlice = DataSlice { offset: 0, length: 0 };
}

/// A server-side `getProgramAccounts` filter predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcFilter {
    /// Data at `offset` must equal `bytes`.
    Memcmp { offset: usize, bytes: Vec<u8> },
    /// Total data length must equal the given size.
    DataSize(u64),
}

impl RpcFilter {
    pub fn memcmp(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Memcmp { offset, bytes: bytes.into() }
    }

    /// Evaluate the predicate locally against account data.
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            Self::Memcmp { offset, bytes } => data
                .get(*offset..offset.saturating_add(bytes.len()))
                .map(|window| window == bytes.as_slice())
                .unwrap_or(false),
            Self::DataSize(size) => data.len() as u64 == *size,
        }
    }
}

/// Wire form: `{"memcmp":{"offset":N,"bytes":"<base58>"}}` or `{"dataSize":N}`.
impl Serialize for RpcFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Memcmp {
            offset: usize,
            bytes: String,
        }

        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Memcmp { offset, bytes } => map.serialize_entry(
                "memcmp",
                &Memcmp {
                    offset: *offset,
                    bytes: bs58::encode(bytes).into_string(),
                },
            )?,
            Self::DataSize(size) => map.serialize_entry("dataSize", size)?,
        }
        map.end()
    }
}

/// Extra narrowing for a program-wide scan, on top of the discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScanFilter {
    /// Every account of the type.
    #[default]
    None,
    /// Bytes that must immediately follow the discriminator.
    RawSuffix(Vec<u8>),
    /// Additional predicates applied after the discriminator filter.
    Predicates(Vec<RpcFilter>),
}

impl ScanFilter {
    /// Build the server-side filter list: a memcmp at offset 0 anchored on
    /// `discriminator` always comes first.
    pub fn into_rpc_filters(self, discriminator: &Discriminator) -> Vec<RpcFilter> {
        match self {
            Self::None => vec![RpcFilter::memcmp(0, discriminator.to_vec())],
            Self::RawSuffix(suffix) => {
                let mut bytes = discriminator.to_vec();
                bytes.extend_from_slice(&suffix);
                vec![RpcFilter::memcmp(0, bytes)]
            }
            Self::Predicates(extra) => {
                let mut filters = Vec::with_capacity(extra.len() + 1);
                filters.push(RpcFilter::memcmp(0, discriminator.to_vec()));
                filters.extend(extra);
                filters
            }
        }
    }
}

/// Options for a `getProgramAccounts` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramAccountsConfig {
    pub data_slice: Option<DataSlice>,
    pub filters: Vec<RpcFilter>,
    pub commitment: Option<Commitment>,
}

/// A decoded change notification for a subscribed account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountChange {
    pub address: Address,
    pub account: AccountValue,
}
