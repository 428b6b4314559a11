//! `AccountNamespace`: one [`AccountClient`] per IDL account.

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use chainaccount_core::{
    address::Address, connection::Connection, decoder::AccountDecoder, error::DecodeError,
    idl::Idl,
};

use crate::account::AccountClient;
use crate::subscriptions::SubscriptionRegistry;

/// The account clients of a program, keyed by camel-cased account name
/// (`AggregatorAccountData` is `aggregatorAccountData`). Iteration follows
/// IDL declaration order.
#[derive(Clone, Debug)]
pub struct AccountNamespace {
    clients: Vec<(String, AccountClient)>,
    index: HashMap<String, usize>,
    registry: SubscriptionRegistry,
}

impl AccountNamespace {
    /// Build clients for every account in `idl`, sharing a fresh
    /// subscription registry.
    pub fn build(
        idl: Arc<Idl>,
        decoder: Arc<dyn AccountDecoder>,
        program_id: Address,
        connection: Arc<dyn Connection>,
    ) -> Result<Self, DecodeError> {
        Self::with_registry(idl, decoder, program_id, connection, SubscriptionRegistry::new())
    }

    /// Like [`build`](Self::build), with a caller-supplied registry.
    pub fn with_registry(
        idl: Arc<Idl>,
        decoder: Arc<dyn AccountDecoder>,
        program_id: Address,
        connection: Arc<dyn Connection>,
        registry: SubscriptionRegistry,
    ) -> Result<Self, DecodeError> {
        let mut clients: Vec<(String, AccountClient)> = Vec::with_capacity(idl.accounts.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(idl.accounts.len());

        for def in &idl.accounts {
            let client = AccountClient::new(
                idl.clone(),
                &def.name,
                program_id,
                connection.clone(),
                decoder.clone(),
            )?
            .with_registry(registry.clone());
            let key = camel_case(&def.name);

            if let Some(&slot) = index.get(&key) {
                tracing::warn!(account = %def.name, key = %key, "duplicate account name; replacing client");
                clients[slot].1 = client;
            } else {
                index.insert(key.clone(), clients.len());
                clients.push((key, client));
            }
        }

        tracing::debug!(program = %program_id, accounts = clients.len(), "built account namespace");
        Ok(Self {
            clients,
            index,
            registry,
        })
    }

    /// Apply `limit` to every client's batched fetches.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.clients = self
            .clients
            .into_iter()
            .map(|(key, client)| (key, client.with_batch_limit(limit)))
            .collect();
        self
    }

    pub fn get(&self, name: &str) -> Option<&AccountClient> {
        self.index.get(name).map(|&i| &self.clients[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AccountClient)> {
        self.clients.iter().map(|(key, client)| (key.as_str(), client))
    }

    /// The registry shared by all clients in the namespace.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }
}

impl Index<&str> for AccountNamespace {
    type Output = AccountClient;

    fn index(&self, name: &str) -> &AccountClient {
        match self.get(name) {
            Some(client) => client,
            None => panic!("no account client named '{name}'"),
        }
    }
}

/// Lower camel case: `SbState` → `sbState`, `HTTPServer` → `httpServer`,
/// `price_feed` → `priceFeed`.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, word) in split_words(name).iter().enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '-' | ' ' | '.') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // `aB` starts a word; so does the last capital of a run (`HTTPServer`).
            if !prev.is_uppercase() || next_lower {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
