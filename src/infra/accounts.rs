//! In-memory account store.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::accounts::{Account, AccountStore};
use crate::util::serde::{Credits, Tier, UserId};

/// Account directory held in memory, for development and tests.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<UserId, Account>>,
}

impl InMemoryAccountStore {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, builder style.
    #[must_use]
    pub fn with_account(self, user_id: impl Into<UserId>, tier: Tier, initial_balance: Credits) -> Self {
        self.upsert(user_id, tier, initial_balance);
        self
    }

    /// Insert or replace a user.
    pub fn upsert(&self, user_id: impl Into<UserId>, tier: Tier, initial_balance: Credits) {
        self.accounts.write().insert(
            user_id.into(),
            Account {
                tier,
                initial_balance,
            },
        );
    }
}

impl AccountStore for InMemoryAccountStore {
    fn account(&self, user_id: &str) -> Option<Account> {
        self.accounts.read().get(user_id).copied()
    }
}
