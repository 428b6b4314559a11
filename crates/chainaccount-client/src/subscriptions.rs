//! Account change subscriptions, one underlying listener per address.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, OnceCell};

use chainaccount_core::{
    address::Address,
    connection::{AccountChangeCallback, Connection, ListenerId},
    error::{AccountError, TransportError},
    types::{AccountChange, Commitment, RawAccountInfo},
    value::AccountValue,
};

/// Default buffer of each address's change channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// The change stream for one subscribed address.
///
/// Every subscriber of the same address gets a clone of the same source;
/// call [`receiver`](Self::receiver) for an independent cursor into it.
#[derive(Clone)]
pub struct AccountEvents {
    tx: Arc<broadcast::Sender<AccountChange>>,
}

impl AccountEvents {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx: Arc::new(tx) }
    }

    /// A new receiver; sees changes emitted after this call.
    pub fn receiver(&self) -> broadcast::Receiver<AccountChange> {
        self.tx.subscribe()
    }

    /// Whether `self` and `other` are the same underlying source.
    pub fn same_source(&self, other: &AccountEvents) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn emit(&self, change: AccountChange) {
        // No receivers is fine; the change is dropped.
        let _ = self.tx.send(change);
    }
}

impl std::fmt::Debug for AccountEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEvents")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

struct SubscriptionEntry {
    events: AccountEvents,
    listener: ListenerId,
}

/// Per-address slot. Filled once the listener is registered; concurrent
/// subscribers of the same address wait on the slot, not on the table.
type Slot = Arc<OnceCell<SubscriptionEntry>>;

/// Table of live account subscriptions, keyed by base-58 address.
///
/// Cheap to clone; clones share the table. A namespace hands the same
/// registry to every client it builds. The table lock is only held for map
/// lookups, so a slow registration stalls callers of that address only.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    entries: Arc<Mutex<HashMap<String, Slot>>>,
    capacity: usize,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose change channels buffer `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Return the change stream for `address`, registering a listener on
    /// `connection` if the address has none yet.
    ///
    /// Only the first registration's `decode` is used; later callers share
    /// its stream. Changes that fail to decode are logged and skipped.
    /// If registration fails, the next caller for the address retries it.
    pub async fn subscribe<D>(
        &self,
        connection: &dyn Connection,
        address: Address,
        commitment: Option<Commitment>,
        decode: D,
    ) -> Result<AccountEvents, TransportError>
    where
        D: Fn(&[u8]) -> Result<AccountValue, AccountError> + Send + Sync + 'static,
    {
        let key = address.to_base58();
        let slot = self.entries.lock().await.entry(key.clone()).or_default().clone();

        let registered = slot
            .get_or_try_init(|| async move {
                let events = AccountEvents::new(self.capacity);
                let sink = events.clone();
                let callback: AccountChangeCallback = Arc::new(move |info: RawAccountInfo| {
                    match decode(&info.data) {
                        Ok(account) => sink.emit(AccountChange { address, account }),
                        Err(e) => tracing::warn!(%address, error = %e, "skipping undecodable account change"),
                    }
                });
                let listener = connection
                    .on_account_change(&address, callback, commitment)
                    .await?;
                tracing::debug!(%address, %listener, "account listener registered");
                Ok::<_, TransportError>(SubscriptionEntry { events, listener })
            })
            .await;

        match registered {
            Ok(entry) => Ok(entry.events.clone()),
            Err(e) => {
                self.discard_empty(&key, &slot).await;
                Err(e)
            }
        }
    }

    /// Drop the subscription for `address` and remove its listener.
    ///
    /// A registration still in flight for the address is waited out first.
    /// Unknown addresses are a warning. Listener removal failures are
    /// logged, not returned; the entry is gone either way.
    pub async fn unsubscribe(&self, connection: &dyn Connection, address: &Address) {
        let slot = self.entries.lock().await.remove(&address.to_base58());
        let Some(slot) = slot else {
            tracing::warn!(%address, "no subscription to remove");
            return;
        };
        let entry = slot
            .get_or_try_init(|| async { Err::<SubscriptionEntry, ()>(()) })
            .await;
        let Ok(entry) = entry else {
            tracing::warn!(%address, "no subscription to remove");
            return;
        };
        if let Err(e) = connection.remove_account_change_listener(entry.listener).await {
            tracing::error!(%address, listener = %entry.listener, error = %e, "failed to remove account listener");
        }
    }

    pub async fn contains(&self, address: &Address) -> bool {
        self.entries
            .lock()
            .await
            .get(&address.to_base58())
            .is_some_and(|slot| slot.initialized())
    }

    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Forget a slot whose registration failed, unless another caller is
    /// already queued on it.
    async fn discard_empty(&self, key: &str, slot: &Slot) {
        let mut entries = self.entries.lock().await;
        let ours = entries.get(key).is_some_and(|s| Arc::ptr_eq(s, slot));
        // The table and this caller hold the only references.
        if ours && !slot.initialized() && Arc::strong_count(slot) == 2 {
            entries.remove(key);
        }
    }
}
