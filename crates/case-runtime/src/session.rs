//! In-memory player sessions using DashMap for concurrent access

use crate::{cases::InventoryItem, error::GameError, STARTING_BALANCE};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-player game context.
///
/// Holds what the browser used to keep in page globals: the balance and the
/// items won so far. Lives only as long as the process.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub wallet_address: String,
    pub balance: u64,
    pub inventory: Vec<InventoryItem>,
    /// Unix millis at creation
    pub created_at: i64,
}

impl Session {
    pub fn new(wallet_address: impl Into<String>, balance: u64) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            balance,
            inventory: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add to the balance
    pub fn credit(&mut self, amount: u64) -> u64 {
        self.balance = self.balance.saturating_add(amount);
        self.balance
    }

    /// Take from the balance, leaving it untouched when it does not cover `amount`
    pub fn debit(&mut self, amount: u64) -> Result<u64, GameError> {
        if self.balance < amount {
            return Err(GameError::InsufficientBalance {
                needed: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(self.balance)
    }
}

/// Thread-safe session storage keyed by wallet address
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    starting_balance: u64,
}

impl SessionStore {
    /// Create an empty store granting the default starting balance
    pub fn new() -> Self {
        Self::with_starting_balance(STARTING_BALANCE)
    }

    pub fn with_starting_balance(starting_balance: u64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            starting_balance,
        }
    }

    /// Normalise a wallet address, rejecting blank ones
    pub fn normalize_wallet(wallet: &str) -> Result<&str, GameError> {
        let wallet = wallet.trim();
        if wallet.is_empty() {
            return Err(GameError::MissingWallet);
        }
        Ok(wallet)
    }

    /// Run `f` with mutable access to the session, creating it on first use.
    ///
    /// The shard lock is held for the duration of `f`; `f` must not touch the store.
    pub fn with_session<R>(
        &self,
        wallet: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, GameError> {
        let wallet = Self::normalize_wallet(wallet)?;
        let mut entry = self.sessions.entry(wallet.to_string()).or_insert_with(|| {
            tracing::debug!("Created session for {}", wallet);
            Session::new(wallet, self.starting_balance)
        });
        Ok(f(entry.value_mut()))
    }

    /// Snapshot of an existing session
    pub fn get(&self, wallet: &str) -> Option<Session> {
        self.sessions.get(wallet.trim()).map(|r| r.value().clone())
    }

    /// Current balance (starting balance for unseen wallets)
    pub fn balance(&self, wallet: &str) -> Result<u64, GameError> {
        self.with_session(wallet, |session| session.balance)
    }

    pub fn credit(&self, wallet: &str, amount: u64) -> Result<u64, GameError> {
        self.with_session(wallet, |session| session.credit(amount))
    }

    pub fn debit(&self, wallet: &str, amount: u64) -> Result<u64, GameError> {
        self.with_session(wallet, |session| session.debit(amount))?
    }

    pub fn starting_balance(&self) -> u64 {
        self.starting_balance
    }

    /// Get session count
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_created_on_first_access() {
        let store = SessionStore::with_starting_balance(500);
        assert!(store.get("EQwallet").is_none());

        assert_eq!(store.balance("EQwallet").unwrap(), 500);
        assert_eq!(store.len(), 1);
        assert!(store.get(" EQwallet ").is_some());
    }

    #[test]
    fn test_debit_rejects_overdraw() {
        let store = SessionStore::with_starting_balance(100);

        assert_eq!(store.debit("w", 40).unwrap(), 60);
        let err = store.debit("w", 61).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientBalance {
                needed: 61,
                available: 60
            }
        );
        assert_eq!(store.balance("w").unwrap(), 60);
        assert_eq!(store.credit("w", 15).unwrap(), 75);
    }

    #[test]
    fn test_blank_wallet_rejected() {
        let store = SessionStore::new();
        assert_eq!(store.balance("   ").unwrap_err(), GameError::MissingWallet);
        assert!(store.is_empty());
    }
}
