//! Infrastructure adapters for the job table, the ledger and accounts.

pub mod accounts;
pub mod memory;
pub mod schema;

pub use accounts::InMemoryAccountStore;
pub use memory::InMemoryStore;
