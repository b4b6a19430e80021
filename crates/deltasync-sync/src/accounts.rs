//! Registered accounts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An account allowed to pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// Upstream endpoint for this account's client views, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_view_url: Option<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            client_view_url: None,
        }
    }

    pub fn with_client_view_url(mut self, url: impl Into<String>) -> Self {
        self.client_view_url = Some(url.into());
        self
    }
}

/// Lookup table of accounts by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Account>", into = "Vec<Account>")]
pub struct AccountRegistry {
    accounts: HashMap<String, Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account, replacing any account with the same id.
    pub fn insert(&mut self, account: Account) -> Option<Account> {
        self.accounts.insert(account.id.clone(), account)
    }

    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.accounts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl FromIterator<Account> for AccountRegistry {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        let mut registry = Self::new();
        for account in iter {
            registry.insert(account);
        }
        registry
    }
}

impl From<Vec<Account>> for AccountRegistry {
    fn from(accounts: Vec<Account>) -> Self {
        accounts.into_iter().collect()
    }
}

impl From<AccountRegistry> for Vec<Account> {
    fn from(registry: AccountRegistry) -> Self {
        let mut accounts: Vec<Account> = registry.accounts.into_values().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }
}
