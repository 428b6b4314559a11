//! `RpcConnection`: the JSON-RPC backed [`Connection`].
//!
//! Reads go over an [`RpcTransport`] (HTTP by default); account change
//! listeners go over a lazily started [`PubsubClient`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

use chainaccount_core::{
    address::Address,
    connection::{AccountChangeCallback, Connection, ListenerId},
    error::TransportError,
    types::{Commitment, KeyedAccount, ProgramAccountsConfig, RawAccountInfo},
};

use crate::config::{ConfigError, ConnectionConfig};
use crate::pubsub::{PubsubClient, PubsubConfig};
use crate::request::{JsonRpcRequest, RpcResponseContext};
use crate::transport::{HttpTransport, RpcTransport};

/// Account as encoded in RPC responses with `encoding: "base64"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UiAccount {
    data: (String, String),
    executable: bool,
    lamports: u64,
    owner: String,
    #[serde(default)]
    rent_epoch: u64,
}

impl TryFrom<UiAccount> for RawAccountInfo {
    type Error = TransportError;

    fn try_from(ui: UiAccount) -> Result<Self, Self::Error> {
        let (encoded, encoding) = ui.data;
        if encoding != "base64" {
            return Err(TransportError::InvalidResponse(format!(
                "expected base64 account data, got '{encoding}'"
            )));
        }
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| TransportError::InvalidResponse(format!("bad base64 account data: {e}")))?;
        let owner = ui
            .owner
            .parse::<Address>()
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        Ok(RawAccountInfo {
            data,
            owner,
            lamports: ui.lamports,
            executable: ui.executable,
            rent_epoch: ui.rent_epoch,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UiKeyedAccount {
    pubkey: String,
    account: UiAccount,
}

/// JSON-RPC connection to a Solana cluster.
pub struct RpcConnection {
    transport: Arc<dyn RpcTransport>,
    config: ConnectionConfig,
    pubsub: OnceCell<PubsubClient>,
    next_id: AtomicU64,
}

impl RpcConnection {
    /// Connect over HTTP using `config`.
    pub fn new(config: ConnectionConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.url.clone(), config.request_timeout())?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Use a caller-supplied transport; `config.url` is still used to
    /// derive the pubsub endpoint.
    pub fn with_transport(transport: Arc<dyn RpcTransport>, config: ConnectionConfig) -> Self {
        Self {
            transport,
            config,
            pubsub: OnceCell::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connection to a local validator at `http://127.0.0.1:8899`.
    pub fn local() -> Result<Self, TransportError> {
        Self::new(ConnectionConfig::default())
    }

    /// Connection to the endpoint named by `ANCHOR_PROVIDER_URL`.
    pub fn from_env() -> Result<Self, TransportError> {
        let config = ConnectionConfig::from_env().map_err(|e| TransportError::Other(e.to_string()))?;
        Self::new(config)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Call `method` and deserialize the result.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .transport
            .send(JsonRpcRequest::new(id, method, params))
            .await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }

    fn read_options(&self, commitment: Option<Commitment>) -> Map<String, Value> {
        let mut opts = Map::new();
        opts.insert("encoding".into(), json!("base64"));
        if let Some(c) = commitment.or(self.config.commitment) {
            opts.insert("commitment".into(), json!(c));
        }
        opts
    }

    async fn pubsub(&self) -> Result<&PubsubClient, TransportError> {
        self.pubsub
            .get_or_try_init(|| async {
                let url = self
                    .config
                    .websocket_url()
                    .map_err(|e: ConfigError| TransportError::WebSocket(e.to_string()))?;
                Ok(PubsubClient::connect(
                    url,
                    PubsubConfig {
                        reconnect_initial: self.config.reconnect_initial(),
                        reconnect_max: self.config.reconnect_max(),
                        request_timeout: self.config.request_timeout(),
                    },
                ))
            })
            .await
    }
}

#[async_trait]
impl Connection for RpcConnection {
    fn commitment(&self) -> Option<Commitment> {
        self.config.commitment
    }

    async fn get_account_info(
        &self,
        address: &Address,
        commitment: Option<Commitment>,
    ) -> Result<Option<RawAccountInfo>, TransportError> {
        let params = vec![json!(address.to_base58()), Value::Object(self.read_options(commitment))];
        let resp: RpcResponseContext<Option<UiAccount>> =
            self.request("getAccountInfo", params).await?;
        resp.value.map(RawAccountInfo::try_from).transpose()
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Address],
        commitment: Option<Commitment>,
    ) -> Result<Vec<Option<RawAccountInfo>>, TransportError> {
        let keys: Vec<String> = addresses.iter().map(Address::to_base58).collect();
        let params = vec![json!(keys), Value::Object(self.read_options(commitment))];
        let resp: RpcResponseContext<Vec<Option<UiAccount>>> =
            self.request("getMultipleAccounts", params).await?;
        resp.value
            .into_iter()
            .map(|acc| acc.map(RawAccountInfo::try_from).transpose())
            .collect()
    }

    async fn get_program_accounts(
        &self,
        program_id: &Address,
        config: ProgramAccountsConfig,
    ) -> Result<Vec<KeyedAccount>, TransportError> {
        let mut opts = self.read_options(config.commitment);
        if let Some(slice) = config.data_slice {
            opts.insert("dataSlice".into(), json!(slice));
        }
        if !config.filters.is_empty() {
            opts.insert("filters".into(), serde_json::to_value(&config.filters)?);
        }
        let params = vec![json!(program_id.to_base58()), Value::Object(opts)];
        let accounts: Vec<UiKeyedAccount> = self.request("getProgramAccounts", params).await?;

        accounts
            .into_iter()
            .map(|keyed| {
                let address = keyed
                    .pubkey
                    .parse::<Address>()
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
                Ok(KeyedAccount {
                    address,
                    account: RawAccountInfo::try_from(keyed.account)?,
                })
            })
            .collect()
    }

    async fn on_account_change(
        &self,
        address: &Address,
        callback: AccountChangeCallback,
        commitment: Option<Commitment>,
    ) -> Result<ListenerId, TransportError> {
        let commitment = commitment.or(self.config.commitment);
        self.pubsub()
            .await?
            .account_subscribe(address, commitment, callback)
            .await
    }

    async fn remove_account_change_listener(&self, id: ListenerId) -> Result<(), TransportError> {
        self.pubsub().await?.account_unsubscribe(id).await
    }
}
