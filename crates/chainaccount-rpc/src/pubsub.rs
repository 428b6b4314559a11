//! WebSocket pubsub client for `accountSubscribe` notifications.
//!
//! A background task owns the socket. Callers talk to it over a command
//! channel; the task keeps the listener table, reconnects with backoff and
//! re-subscribes every live listener after a reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use chainaccount_core::{
    address::Address,
    connection::{AccountChangeCallback, ListenerId},
    error::TransportError,
    types::{Commitment, RawAccountInfo},
};

use crate::connection::UiAccount;
use crate::request::{JsonRpcRequest, JsonRpcResponse, RpcId};

type Reply = oneshot::Sender<Result<(), TransportError>>;

/// Reconnect and confirmation settings for the pubsub task.
#[derive(Debug, Clone)]
pub struct PubsubConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// How long `account_subscribe` waits for the node's confirmation.
    pub request_timeout: Duration,
}

impl Default for PubsubConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

enum PubsubCommand {
    Subscribe {
        listener: ListenerId,
        params: Vec<Value>,
        callback: AccountChangeCallback,
        tx: Reply,
    },
    Unsubscribe {
        listener: ListenerId,
        tx: Reply,
    },
    Close,
}

/// Handle to the background pubsub task. Dropping it closes the socket.
pub struct PubsubClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<PubsubCommand>,
    next_listener: AtomicU64,
    request_timeout: Duration,
}

impl PubsubClient {
    /// Start the background task for `url`. Must be called inside a Tokio
    /// runtime. The socket is opened asynchronously; commands sent before
    /// it is up are queued.
    pub fn connect(url: impl Into<String>, config: PubsubConfig) -> Self {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let request_timeout = config.request_timeout;
        tokio::spawn(pubsub_task(url.clone(), cmd_rx, config));
        Self {
            url,
            cmd_tx,
            next_listener: AtomicU64::new(1),
            request_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Register `callback` for changes to `address`. Resolves once the node
    /// has confirmed the subscription, or fails with
    /// [`TransportError::Timeout`] after `request_timeout`.
    ///
    /// If the wait times out or the future is dropped, the task removes the
    /// listener and cancels it on the node once the confirmation arrives.
    pub async fn account_subscribe(
        &self,
        address: &Address,
        commitment: Option<Commitment>,
        callback: AccountChangeCallback,
    ) -> Result<ListenerId, TransportError> {
        let listener = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut opts = serde_json::Map::new();
        opts.insert("encoding".into(), json!("base64"));
        if let Some(c) = commitment {
            opts.insert("commitment".into(), json!(c));
        }
        let params = vec![json!(address.to_base58()), Value::Object(opts)];

        let (tx, rx) = oneshot::channel();
        self.send(PubsubCommand::Subscribe {
            listener,
            params,
            callback,
            tx,
        })?;
        match time::timeout(self.request_timeout, rx).await {
            Ok(reply) => {
                reply.map_err(|_| TransportError::WebSocket("pubsub reply dropped".into()))??
            }
            Err(_) => {
                tracing::warn!(%address, %listener, "account subscription not confirmed in time");
                return Err(TransportError::Timeout {
                    ms: self.request_timeout.as_millis() as u64,
                });
            }
        }
        tracing::debug!(%address, %listener, "account subscription confirmed");
        Ok(listener)
    }

    /// Remove a listener. Unknown ids are logged and ignored.
    pub async fn account_unsubscribe(&self, listener: ListenerId) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.send(PubsubCommand::Unsubscribe { listener, tx })?;
        rx.await
            .map_err(|_| TransportError::WebSocket("pubsub reply dropped".into()))?
    }

    fn send(&self, cmd: PubsubCommand) -> Result<(), TransportError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| TransportError::WebSocket("pubsub task closed".into()))
    }
}

impl Drop for PubsubClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(PubsubCommand::Close);
    }
}

async fn pubsub_task(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<PubsubCommand>,
    config: PubsubConfig,
) {
    let mut state = PubsubState::default();
    let mut backoff = config.reconnect_initial;

    loop {
        tracing::info!(url = %url, "connecting pubsub WebSocket");

        let (ws_stream, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "pubsub connect failed, retrying in {backoff:?}");
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
        };
        backoff = config.reconnect_initial;
        let (mut sink, mut stream) = ws_stream.split();

        let mut connected = true;
        for frame in state.resubscribe_frames() {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                connected = false;
                break;
            }
        }

        while connected {
            let outgoing = tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(PubsubCommand::Close) => {
                        let _ = sink.close().await;
                        return;
                    }
                    Some(PubsubCommand::Subscribe { listener, params, callback, tx }) => {
                        state.subscribe(listener, params, callback, tx)
                    }
                    Some(PubsubCommand::Unsubscribe { listener, tx }) => {
                        state.unsubscribe(listener, tx)
                    }
                },
                msg = stream.next() => match msg {
                    None | Some(Ok(Message::Close(_))) => {
                        connected = false;
                        None
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "pubsub receive error");
                        connected = false;
                        None
                    }
                    Some(Ok(Message::Text(text))) => state.handle_message(text.as_str()),
                    Some(Ok(_)) => None,
                },
            };
            if let Some(frame) = outgoing {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    connected = false;
                }
            }
        }

        state.on_disconnect();
        tracing::warn!(url = %url, "pubsub disconnected, reconnecting in {backoff:?}");
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

struct Listener {
    params: Vec<Value>,
    callback: AccountChangeCallback,
    server_id: Option<u64>,
    waiter: Option<Reply>,
}

enum Pending {
    Subscribe(ListenerId),
    Unsubscribe(Option<Reply>),
}

#[derive(Debug, Deserialize)]
struct NotificationResult {
    value: Option<UiAccount>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: u64,
    result: NotificationResult,
}

/// Listener table owned by the pubsub task. Every method returns the frame
/// to write to the socket, if any.
#[derive(Default)]
struct PubsubState {
    listeners: HashMap<ListenerId, Listener>,
    by_server: HashMap<u64, ListenerId>,
    pending: HashMap<u64, Pending>,
    next_request: u64,
}

impl PubsubState {
    fn request(&mut self, method: &str, params: Vec<Value>, pending: Pending) -> String {
        self.next_request += 1;
        let id = self.next_request;
        self.pending.insert(id, pending);
        let req = JsonRpcRequest::new(id, method, params);
        serde_json::to_string(&req).unwrap_or_default()
    }

    fn subscribe(
        &mut self,
        listener: ListenerId,
        params: Vec<Value>,
        callback: AccountChangeCallback,
        tx: Reply,
    ) -> Option<String> {
        if tx.is_closed() {
            tracing::debug!(%listener, "subscriber gave up before the request was sent");
            return None;
        }
        self.listeners.insert(
            listener,
            Listener {
                params: params.clone(),
                callback,
                server_id: None,
                waiter: Some(tx),
            },
        );
        Some(self.request("accountSubscribe", params, Pending::Subscribe(listener)))
    }

    fn unsubscribe(&mut self, listener: ListenerId, tx: Reply) -> Option<String> {
        let Some(entry) = self.listeners.remove(&listener) else {
            tracing::warn!(%listener, "unsubscribe for unknown listener");
            let _ = tx.send(Ok(()));
            return None;
        };
        match entry.server_id {
            Some(server_id) => {
                self.by_server.remove(&server_id);
                Some(self.request(
                    "accountUnsubscribe",
                    vec![json!(server_id)],
                    Pending::Unsubscribe(Some(tx)),
                ))
            }
            // Not confirmed yet; the confirmation handler will cancel it.
            None => {
                let _ = tx.send(Ok(()));
                None
            }
        }
    }

    fn handle_message(&mut self, text: &str) -> Option<String> {
        let Ok(val) = serde_json::from_str::<Value>(text) else {
            tracing::debug!("failed to parse pubsub message as JSON");
            return None;
        };

        if val.get("method").and_then(Value::as_str) == Some("accountNotification") {
            self.dispatch(val.get("params").cloned().unwrap_or(Value::Null));
            return None;
        }

        let resp = serde_json::from_value::<JsonRpcResponse>(val).ok()?;
        let id = match resp.id {
            RpcId::Number(n) => n,
            _ => return None,
        };
        match self.pending.remove(&id)? {
            Pending::Subscribe(listener) => self.confirm(listener, resp),
            Pending::Unsubscribe(tx) => {
                let result = resp.into_result().map(|_| ()).map_err(TransportError::Rpc);
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "accountUnsubscribe rejected");
                }
                if let Some(tx) = tx {
                    let _ = tx.send(result);
                }
                None
            }
        }
    }

    fn confirm(&mut self, listener: ListenerId, resp: JsonRpcResponse) -> Option<String> {
        let result = resp.into_result().map_err(TransportError::Rpc).and_then(|v| {
            v.as_u64().ok_or_else(|| {
                TransportError::InvalidResponse(format!("bad subscription id: {v}"))
            })
        });

        let Some(entry) = self.listeners.get_mut(&listener) else {
            // Listener was removed before the node confirmed it.
            return match result {
                Ok(server_id) => Some(self.request(
                    "accountUnsubscribe",
                    vec![json!(server_id)],
                    Pending::Unsubscribe(None),
                )),
                Err(_) => None,
            };
        };

        match result {
            Ok(server_id) => {
                let abandoned = match entry.waiter.take() {
                    Some(tx) => tx.send(Ok(())).is_err(),
                    None => false,
                };
                if abandoned {
                    // Nobody holds this listener id, so nobody could remove it.
                    tracing::debug!(%listener, server_id, "subscriber gone; cancelling subscription");
                    self.listeners.remove(&listener);
                    return Some(self.request(
                        "accountUnsubscribe",
                        vec![json!(server_id)],
                        Pending::Unsubscribe(None),
                    ));
                }
                entry.server_id = Some(server_id);
                self.by_server.insert(server_id, listener);
            }
            Err(e) => {
                tracing::warn!(%listener, error = %e, "accountSubscribe rejected");
                if let Some(entry) = self.listeners.remove(&listener) {
                    if let Some(tx) = entry.waiter {
                        let _ = tx.send(Err(e));
                    }
                }
            }
        }
        None
    }

    fn dispatch(&self, params: Value) {
        let params: NotificationParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "malformed accountNotification");
                return;
            }
        };
        let Some(entry) = self
            .by_server
            .get(&params.subscription)
            .and_then(|l| self.listeners.get(l))
        else {
            tracing::debug!(subscription = params.subscription, "notification for unknown subscription");
            return;
        };
        let Some(account) = params.result.value else {
            tracing::debug!(subscription = params.subscription, "account closed");
            return;
        };
        match RawAccountInfo::try_from(account) {
            Ok(info) => (entry.callback)(info),
            Err(e) => tracing::warn!(error = %e, "undecodable account notification"),
        }
    }

    /// Server-side subscriptions die with the socket. In-flight
    /// unsubscribes are treated as done.
    fn on_disconnect(&mut self) {
        for (_, pending) in self.pending.drain() {
            if let Pending::Unsubscribe(Some(tx)) = pending {
                let _ = tx.send(Ok(()));
            }
        }
        self.by_server.clear();
        for entry in self.listeners.values_mut() {
            entry.server_id = None;
        }
    }

    fn resubscribe_frames(&mut self) -> Vec<String> {
        let mut ids: Vec<ListenerId> = self.listeners.keys().copied().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|listener| {
                let params = self.listeners.get(&listener)?.params.clone();
                Some(self.request("accountSubscribe", params, Pending::Subscribe(listener)))
            })
            .collect()
    }
}
