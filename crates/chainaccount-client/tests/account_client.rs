//! Account client behaviour against an in-memory `Connection`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use borsh::BorshSerialize;
use tokio::sync::broadcast::error::TryRecvError;

use chainaccount_borsh::BorshAccountDecoder;
use chainaccount_client::{AccountClient, AccountNamespace, ScanFilter, SubscriptionRegistry};
use chainaccount_core::{
    account_discriminator, AccountChangeCallback, AccountError, AccountValue, Address, Commitment,
    Connection, DataSlice, Idl, KeyedAccount, ListenerId, ProgramAccountsConfig, RawAccountInfo,
    RpcFilter, TransportError,
};

const IDL: &str = r#"{
    "version": "0.1.0",
    "name": "vaults",
    "instructions": [],
    "accounts": [
        {"name": "Vault", "type": {"kind": "struct", "fields": [
            {"name": "authority", "type": "publicKey"},
            {"name": "amount", "type": "u64"}
        ]}},
        {"name": "Counter", "type": {"kind": "struct", "fields": [
            {"name": "count", "type": "u64"}
        ]}},
        {"name": "AuditLog", "type": {"kind": "struct", "fields": [
            {"name": "entries", "type": {"vec": "string"}}
        ]}}
    ]
}"#;

const PROGRAM: Address = Address::new([9; 32]);

#[derive(BorshSerialize)]
struct Vault {
    authority: [u8; 32],
    amount: u64,
}

#[derive(BorshSerialize)]
struct Counter {
    count: u64,
}

fn account_bytes(name: &str, payload: &impl BorshSerialize) -> Vec<u8> {
    let mut data = account_discriminator(name).to_vec();
    data.extend(borsh::to_vec(payload).unwrap());
    data
}

fn vault_bytes(authority: u8, amount: u64) -> Vec<u8> {
    account_bytes("Vault", &Vault { authority: [authority; 32], amount })
}

fn raw(data: Vec<u8>) -> RawAccountInfo {
    RawAccountInfo {
        data,
        owner: PROGRAM,
        lamports: 1_000_000,
        executable: false,
        rent_epoch: 0,
    }
}

fn addr(n: u16) -> Address {
    let mut bytes = [0u8; 32];
    bytes[..2].copy_from_slice(&n.to_le_bytes());
    bytes[31] = 1;
    Address::new(bytes)
}

/// In-memory ledger. Counts batch calls, records scan configs and the
/// commitment of every call, and keeps change listeners so tests can fire
/// notifications.
#[derive(Default)]
struct MockConnection {
    accounts: Mutex<HashMap<Address, RawAccountInfo>>,
    batch_calls: Mutex<Vec<usize>>,
    scans: Mutex<Vec<ProgramAccountsConfig>>,
    commitments: Mutex<Vec<(&'static str, Option<Commitment>)>>,
    listeners: Mutex<HashMap<ListenerId, (Address, AccountChangeCallback)>>,
    removed: Mutex<Vec<ListenerId>>,
    registrations: AtomicU64,
    fail_reads: bool,
    fail_removal: bool,
    /// Registrations for this address never complete.
    stalled: Option<Address>,
}

impl MockConnection {
    fn put(&self, address: Address, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, raw(data));
    }

    fn fire(&self, address: &Address, data: Vec<u8>) {
        let callbacks: Vec<AccountChangeCallback> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|(a, _)| a == address)
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in callbacks {
            cb(raw(data.clone()));
        }
    }

    fn record(&self, method: &'static str, commitment: Option<Commitment>) {
        self.commitments.lock().unwrap().push((method, commitment));
    }

    fn read_error(&self) -> Result<(), TransportError> {
        if self.fail_reads {
            return Err(TransportError::Http("HTTP 502: bad gateway".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn commitment(&self) -> Option<Commitment> {
        Some(Commitment::Confirmed)
    }

    async fn get_account_info(
        &self,
        address: &Address,
        commitment: Option<Commitment>,
    ) -> Result<Option<RawAccountInfo>, TransportError> {
        self.record("getAccountInfo", commitment);
        self.read_error()?;
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Address],
        commitment: Option<Commitment>,
    ) -> Result<Vec<Option<RawAccountInfo>>, TransportError> {
        self.record("getMultipleAccounts", commitment);
        self.read_error()?;
        self.batch_calls.lock().unwrap().push(addresses.len());
        let accounts = self.accounts.lock().unwrap();
        Ok(addresses.iter().map(|a| accounts.get(a).cloned()).collect())
    }

    async fn get_program_accounts(
        &self,
        program_id: &Address,
        config: ProgramAccountsConfig,
    ) -> Result<Vec<KeyedAccount>, TransportError> {
        self.read_error()?;
        assert_eq!(*program_id, PROGRAM);
        self.scans.lock().unwrap().push(config.clone());

        let accounts = self.accounts.lock().unwrap();
        let mut out: Vec<KeyedAccount> = accounts
            .iter()
            .filter(|(_, info)| config.filters.iter().all(|f| f.matches(&info.data)))
            .map(|(address, info)| {
                let mut account = info.clone();
                if let Some(slice) = config.data_slice {
                    let end = (slice.offset + slice.length).min(account.data.len());
                    account.data = account.data.get(slice.offset..end).unwrap_or_default().to_vec();
                }
                KeyedAccount { address: *address, account }
            })
            .collect();
        out.sort_by_key(|k| k.address);
        Ok(out)
    }

    async fn on_account_change(
        &self,
        address: &Address,
        callback: AccountChangeCallback,
        commitment: Option<Commitment>,
    ) -> Result<ListenerId, TransportError> {
        self.record("accountSubscribe", commitment);
        if self.stalled == Some(*address) {
            std::future::pending::<()>().await;
        }
        // Let concurrent subscribers interleave.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let id = ListenerId(self.registrations.fetch_add(1, Ordering::SeqCst) + 1);
        self.listeners.lock().unwrap().insert(id, (*address, callback));
        Ok(id)
    }

    async fn remove_account_change_listener(&self, id: ListenerId) -> Result<(), TransportError> {
        self.removed.lock().unwrap().push(id);
        if self.fail_removal {
            return Err(TransportError::WebSocket("socket closed".into()));
        }
        self.listeners.lock().unwrap().remove(&id);
        Ok(())
    }
}

fn namespace(conn: Arc<MockConnection>) -> AccountNamespace {
    let idl = Arc::new(Idl::from_json(IDL).unwrap());
    let decoder = Arc::new(BorshAccountDecoder::new(idl.clone()));
    AccountNamespace::build(idl, decoder, PROGRAM, conn).unwrap()
}

fn amount(value: &AccountValue) -> u128 {
    value.field("amount").and_then(AccountValue::as_u128).unwrap()
}

// ─── Namespace ───────────────────────────────────────────────────────────────

#[test]
fn namespace_has_one_client_per_account() {
    let ns = namespace(Arc::new(MockConnection::default()));
    assert_eq!(ns.len(), 3);
    assert_eq!(ns.names().collect::<Vec<_>>(), vec!["vault", "counter", "auditLog"]);

    assert_eq!(ns["vault"].name(), "Vault");
    assert_eq!(ns["vault"].size(), 48);
    assert_eq!(ns["counter"].size(), 16);
    assert_eq!(ns["auditLog"].size(), 8);
    assert_eq!(ns["vault"].discriminator(), &[211, 8, 232, 43, 2, 152, 117, 119]);
    assert_eq!(ns["counter"].discriminator(), &[255, 176, 4, 245, 188, 253, 124, 25]);
    assert_eq!(ns["vault"].program_id(), &PROGRAM);
    assert!(ns.get("Vault").is_none());
}

#[test]
fn namespace_clients_share_schema() {
    let ns = namespace(Arc::new(MockConnection::default()));
    assert!(Arc::ptr_eq(ns["vault"].idl(), ns["counter"].idl()));
}

#[test]
fn names_that_collide_after_camel_case_keep_the_later_client() {
    let idl = Arc::new(
        Idl::from_json(
            r#"{
                "version": "0.1.0",
                "name": "feeds",
                "instructions": [],
                "accounts": [
                    {"name": "PriceFeed", "type": {"kind": "struct", "fields": []}},
                    {"name": "price_feed", "type": {"kind": "struct", "fields": [
                        {"name": "price", "type": "u64"}
                    ]}}
                ]
            }"#,
        )
        .unwrap(),
    );
    let decoder = Arc::new(BorshAccountDecoder::new(idl.clone()));
    let conn = Arc::new(MockConnection::default());
    let ns = AccountNamespace::build(idl, decoder, PROGRAM, conn).unwrap();

    assert_eq!(ns.len(), 1);
    assert_eq!(ns.names().collect::<Vec<_>>(), vec!["priceFeed"]);
    assert_eq!(ns["priceFeed"].name(), "price_feed");
    assert_eq!(ns["priceFeed"].size(), 16);
}

#[test]
fn client_for_unknown_account_is_rejected() {
    let idl = Arc::new(Idl::from_json(IDL).unwrap());
    let decoder = Arc::new(BorshAccountDecoder::new(idl.clone()));
    let conn = Arc::new(MockConnection::default());
    assert!(AccountClient::new(idl, "Pool", PROGRAM, conn, decoder).is_err());
}

// ─── Single fetch ────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_decodes_vault() {
    let conn = Arc::new(MockConnection::default());
    let a = addr(1);
    conn.put(a, vault_bytes(7, 1_500));
    let ns = namespace(conn);

    let vault = ns["vault"].fetch(&a, None).await.unwrap();
    assert_eq!(amount(&vault), 1_500);
    assert_eq!(
        vault.field("authority").and_then(AccountValue::as_pubkey),
        Some(&Address::new([7; 32]))
    );
    assert_eq!(ns["vault"].fetch_nullable(&a, None).await.unwrap(), Some(vault));
}

#[tokio::test]
async fn missing_account_is_none_or_not_found() {
    let ns = namespace(Arc::new(MockConnection::default()));
    let a = addr(2);

    assert_eq!(ns["vault"].fetch_nullable(&a, None).await.unwrap(), None);
    let err = ns["vault"].fetch(&a, None).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, AccountError::NotFound { address } if address == a));
}

#[tokio::test]
async fn wrong_discriminator_is_strict_for_single_and_tolerant_for_many() {
    let conn = Arc::new(MockConnection::default());
    let a = addr(3);
    let mut data = vault_bytes(1, 10);
    data[0] ^= 0xff;
    conn.put(a, data);
    let ns = namespace(conn);

    let err = ns["vault"].fetch_nullable(&a, None).await.unwrap_err();
    assert!(err.is_type_mismatch());
    assert!(ns["vault"].fetch(&a, None).await.unwrap_err().is_type_mismatch());
    assert_eq!(ns["vault"].fetch_multiple(&[a], None).await.unwrap(), vec![None]);
}

#[tokio::test]
async fn account_of_another_type_is_a_mismatch() {
    let conn = Arc::new(MockConnection::default());
    let a = addr(4);
    conn.put(a, account_bytes("Counter", &Counter { count: 3 }));
    let ns = namespace(conn);

    assert!(ns["vault"].fetch(&a, None).await.unwrap_err().is_type_mismatch());
    let counter = ns["counter"].fetch(&a, None).await.unwrap();
    assert_eq!(counter.field("count").and_then(AccountValue::as_u128), Some(3));
}

#[tokio::test]
async fn short_account_data_is_a_mismatch() {
    let conn = Arc::new(MockConnection::default());
    let a = addr(5);
    conn.put(a, vec![211, 8, 232]);
    let ns = namespace(conn);
    assert!(ns["vault"].fetch_nullable(&a, None).await.unwrap_err().is_type_mismatch());
}

#[tokio::test]
async fn truncated_payload_is_a_decode_error_everywhere() {
    let conn = Arc::new(MockConnection::default());
    let a = addr(6);
    let mut data = vault_bytes(1, 10);
    data.truncate(20);
    conn.put(a, data);
    let ns = namespace(conn);

    assert!(matches!(ns["vault"].fetch(&a, None).await, Err(AccountError::Decode(_))));
    assert!(matches!(ns["vault"].fetch_multiple(&[a], None).await, Err(AccountError::Decode(_))));
}

#[tokio::test]
async fn transport_errors_pass_through() {
    let conn = Arc::new(MockConnection {
        fail_reads: true,
        ..Default::default()
    });
    let ns = namespace(conn);

    let err = ns["vault"].fetch(&addr(1), None).await.unwrap_err();
    assert!(matches!(err, AccountError::Transport(TransportError::Http(_))));
    assert_eq!(err.to_string(), "HTTP error: HTTP 502: bad gateway");

    let err = ns["vault"].all(ScanFilter::None).await.unwrap_err();
    assert!(matches!(err, AccountError::Transport(_)));
}

#[tokio::test]
async fn explicit_commitment_reaches_the_connection() {
    let conn = Arc::new(MockConnection::default());
    let a = addr(7);
    conn.put(a, vault_bytes(1, 5));
    let ns = namespace(conn.clone());
    let finalized = Some(Commitment::Finalized);

    ns["vault"].fetch(&a, finalized).await.unwrap();
    ns["vault"].fetch_nullable(&a, finalized).await.unwrap();
    ns["vault"].fetch_multiple(&[a], finalized).await.unwrap();
    ns["vault"].subscribe(&a, finalized).await.unwrap();
    ns["vault"].fetch(&a, None).await.unwrap();

    assert_eq!(
        *conn.commitments.lock().unwrap(),
        vec![
            ("getAccountInfo", finalized),
            ("getAccountInfo", finalized),
            ("getMultipleAccounts", finalized),
            ("accountSubscribe", finalized),
            ("getAccountInfo", None),
        ]
    );
}

// ─── Multi fetch ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_multiple_batches_and_keeps_order() {
    let conn = Arc::new(MockConnection::default());
    let addresses: Vec<Address> = (0..150).map(addr).collect();
    for (i, a) in addresses.iter().enumerate() {
        match i % 3 {
            0 => conn.put(*a, vault_bytes(i as u8, i as u64)),
            1 => conn.put(*a, account_bytes("Counter", &Counter { count: i as u64 })),
            _ => {}
        }
    }
    let ns = namespace(conn.clone());

    let out = ns["vault"].fetch_multiple(&addresses, None).await.unwrap();
    assert_eq!(out.len(), 150);
    for (i, entry) in out.iter().enumerate() {
        match entry {
            Some(vault) => {
                assert_eq!(i % 3, 0);
                assert_eq!(amount(vault), i as u128);
            }
            None => assert_ne!(i % 3, 0),
        }
    }

    let mut calls = conn.batch_calls.lock().unwrap().clone();
    calls.sort_unstable();
    assert_eq!(calls, vec![51, 99]);
}

#[tokio::test]
async fn fetch_multiple_respects_batch_limit_and_duplicates() {
    let conn = Arc::new(MockConnection::default());
    let a = addr(10);
    let b = addr(11);
    conn.put(a, vault_bytes(1, 100));
    let ns = namespace(conn.clone()).with_batch_limit(2);

    let out = ns["vault"].fetch_multiple(&[a, b, a, a, b], None).await.unwrap();
    let amounts: Vec<Option<u128>> = out.iter().map(|v| v.as_ref().map(amount)).collect();
    assert_eq!(amounts, vec![Some(100), None, Some(100), Some(100), None]);
    assert_eq!(conn.batch_calls.lock().unwrap().len(), 3);

    assert!(ns["vault"].fetch_multiple(&[], None).await.unwrap().is_empty());
    assert_eq!(conn.batch_calls.lock().unwrap().len(), 3);
}

// ─── Scans ───────────────────────────────────────────────────────────────────

fn scan_fixture() -> (Arc<MockConnection>, AccountNamespace) {
    let conn = Arc::new(MockConnection::default());
    conn.put(addr(1), vault_bytes(7, 1));
    conn.put(addr(2), vault_bytes(8, 2));
    conn.put(addr(3), vault_bytes(7, 3));
    conn.put(addr(4), account_bytes("Counter", &Counter { count: 4 }));
    let ns = namespace(conn.clone());
    (conn, ns)
}

#[tokio::test]
async fn all_returns_every_account_of_the_type() {
    let (conn, ns) = scan_fixture();
    let vaults = ns["vault"].all(ScanFilter::None).await.unwrap();
    let addresses: Vec<Address> = vaults.iter().map(|v| v.address).collect();
    assert_eq!(addresses, vec![addr(1), addr(2), addr(3)]);

    let scans = conn.scans.lock().unwrap();
    assert_eq!(scans[0].filters, vec![RpcFilter::memcmp(0, account_discriminator("Vault").to_vec())]);
    assert_eq!(scans[0].data_slice, None);
    assert_eq!(scans[0].commitment, Some(Commitment::Confirmed));
}

#[tokio::test]
async fn all_with_raw_suffix_narrows_after_discriminator() {
    let (_, ns) = scan_fixture();
    let vaults = ns["vault"]
        .all(ScanFilter::RawSuffix(vec![7; 32]))
        .await
        .unwrap();
    let amounts: Vec<u128> = vaults.iter().map(|v| amount(&v.account)).collect();
    assert_eq!(amounts, vec![1, 3]);
}

#[tokio::test]
async fn all_with_predicates_appends_after_discriminator() {
    let (conn, ns) = scan_fixture();
    let vaults = ns["vault"]
        .all(ScanFilter::Predicates(vec![
            RpcFilter::DataSize(48),
            RpcFilter::memcmp(40, 2u64.to_le_bytes().to_vec()),
        ]))
        .await
        .unwrap();
    assert_eq!(vaults.len(), 1);
    assert_eq!(vaults[0].address, addr(2));

    let scans = conn.scans.lock().unwrap();
    assert_eq!(scans[0].filters.len(), 3);
    assert_eq!(scans[0].filters[1], RpcFilter::DataSize(48));
}

#[tokio::test]
async fn all_addresses_requests_no_data() {
    let (conn, ns) = scan_fixture();
    let addresses = ns["counter"].all_addresses(ScanFilter::None).await.unwrap();
    assert_eq!(addresses, vec![addr(4)]);
    assert_eq!(conn.scans.lock().unwrap()[0].data_slice, Some(DataSlice::EMPTY));
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_twice_shares_one_listener() {
    let conn = Arc::new(MockConnection::default());
    let ns = namespace(conn.clone());
    let a = addr(20);

    let first = ns["vault"].subscribe(&a, None).await.unwrap();
    let second = ns["vault"].subscribe(&a, None).await.unwrap();
    assert!(first.same_source(&second));
    assert_eq!(conn.registrations.load(Ordering::SeqCst), 1);

    let mut rx = second.receiver();
    conn.fire(&a, vault_bytes(3, 77));
    let change = rx.recv().await.unwrap();
    assert_eq!(change.address, a);
    assert_eq!(amount(&change.account), 77);
}

#[tokio::test]
async fn first_subscriber_decides_the_decoding() {
    let conn = Arc::new(MockConnection::default());
    let ns = namespace(conn.clone());
    let a = addr(21);

    let vault_events = ns["vault"].subscribe(&a, None).await.unwrap();
    let counter_events = ns["counter"].subscribe(&a, None).await.unwrap();
    assert!(vault_events.same_source(&counter_events));
    assert_eq!(conn.registrations.load(Ordering::SeqCst), 1);

    // Counter data does not match the registering Vault client: skipped.
    let mut rx = counter_events.receiver();
    conn.fire(&a, account_bytes("Counter", &Counter { count: 1 }));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn concurrent_subscribes_register_once() {
    let conn = Arc::new(MockConnection::default());
    let ns = namespace(conn.clone());
    let a = addr(22);

    let (x, y, z) = tokio::join!(
        ns["vault"].subscribe(&a, None),
        ns["vault"].subscribe(&a, None),
        ns["counter"].subscribe(&a, None),
    );
    let (x, y, z) = (x.unwrap(), y.unwrap(), z.unwrap());
    assert!(x.same_source(&y) && y.same_source(&z));
    assert_eq!(conn.registrations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsubscribe_removes_entry_and_listener() {
    let conn = Arc::new(MockConnection::default());
    let ns = namespace(conn.clone());
    let a = addr(23);

    let events = ns["vault"].subscribe(&a, None).await.unwrap();
    assert!(ns.registry().contains(&a).await);

    ns["vault"].unsubscribe(&a).await;
    assert!(!ns.registry().contains(&a).await);
    assert_eq!(*conn.removed.lock().unwrap(), vec![ListenerId(1)]);

    // Second unsubscribe is a logged no-op.
    ns["counter"].unsubscribe(&a).await;
    assert_eq!(conn.removed.lock().unwrap().len(), 1);

    // A fresh subscribe gets a fresh source.
    let again = ns["vault"].subscribe(&a, None).await.unwrap();
    assert!(!again.same_source(&events));
    assert_eq!(conn.registrations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_listener_removal_still_drops_entry() {
    let conn = Arc::new(MockConnection {
        fail_removal: true,
        ..Default::default()
    });
    let ns = namespace(conn.clone());
    let a = addr(24);

    ns["vault"].subscribe(&a, None).await.unwrap();
    ns["vault"].unsubscribe(&a).await;
    assert!(ns.registry().is_empty().await);
    assert_eq!(conn.removed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn separate_registries_do_not_share_subscriptions() {
    let conn = Arc::new(MockConnection::default());
    let idl = Arc::new(Idl::from_json(IDL).unwrap());
    let decoder = Arc::new(BorshAccountDecoder::new(idl.clone()));
    let one = AccountNamespace::with_registry(
        idl.clone(),
        decoder.clone(),
        PROGRAM,
        conn.clone(),
        SubscriptionRegistry::new(),
    )
    .unwrap();
    let two = AccountNamespace::build(idl, decoder, PROGRAM, conn.clone()).unwrap();
    let a = addr(25);

    let x = one["vault"].subscribe(&a, None).await.unwrap();
    let y = two["vault"].subscribe(&a, None).await.unwrap();
    assert!(!x.same_source(&y));
    assert_eq!(conn.registrations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stalled_registration_does_not_block_other_addresses() {
    let stuck = addr(26);
    let conn = Arc::new(MockConnection {
        stalled: Some(stuck),
        ..Default::default()
    });
    let ns = namespace(conn.clone());
    let other = addr(27);

    let vault = ns["vault"].clone();
    let pending = tokio::spawn(async move { vault.subscribe(&stuck, None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let events = tokio::time::timeout(Duration::from_secs(2), ns["vault"].subscribe(&other, None))
        .await
        .expect("subscribe for another address waited on the stalled one")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), ns["counter"].unsubscribe(&addr(28)))
        .await
        .expect("unsubscribe for an unrelated address waited on the stalled one");

    assert!(ns.registry().contains(&other).await);
    assert!(!ns.registry().contains(&stuck).await);
    assert_eq!(ns.registry().len().await, 1);

    let mut rx = events.receiver();
    conn.fire(&other, vault_bytes(2, 9));
    assert_eq!(amount(&rx.recv().await.unwrap().account), 9);

    pending.abort();
}
