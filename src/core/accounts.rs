//! Account lookups consumed at the subsystem boundary.

use serde::{Deserialize, Serialize};

use crate::util::serde::{Credits, Tier};

/// What the surrounding application knows about a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Current plan.
    pub tier: Tier,
    /// Balance before the user's first ledger entry.
    pub initial_balance: Credits,
}

/// Source of user tier and opening balance.
pub trait AccountStore: Send + Sync {
    /// Look up a user, `None` if unknown.
    fn account(&self, user_id: &str) -> Option<Account>;
}
