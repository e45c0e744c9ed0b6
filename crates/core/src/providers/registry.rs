use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::trading212::Trading212Client;
use super::traits::BrokerApi;
use crate::models::account::Account;

/// Registry of upstream clients, one per connected account.
///
/// Routes gateway requests to the right account's client. Tests register
/// mocks under any account id.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<Uuid, Arc<dyn BrokerApi>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Create a registry with a real Trading212 client for every account.
    pub fn from_accounts(accounts: &[Account], timeout: Duration) -> Self {
        let mut registry = Self::new();
        for account in accounts {
            registry.register(account.id, Arc::new(Trading212Client::new(account, timeout)));
        }
        registry
    }

    /// Register (or replace) the client for an account.
    pub fn register(&mut self, account_id: Uuid, client: Arc<dyn BrokerApi>) {
        self.clients.insert(account_id, client);
    }

    /// Remove an account's client. Returns whether one was registered.
    pub fn remove(&mut self, account_id: Uuid) -> bool {
        self.clients.remove(&account_id).is_some()
    }

    pub fn get(&self, account_id: Uuid) -> Option<Arc<dyn BrokerApi>> {
        self.clients.get(&account_id).cloned()
    }

    pub fn contains(&self, account_id: Uuid) -> bool {
        self.clients.contains_key(&account_id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
