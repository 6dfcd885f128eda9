//! `depot-store` — the stock table and its ledger.
//!
//! [`InventoryStore`] serializes read-modify-write per item over a
//! [`DepotBackend`]; [`Ledger`] reads the day-partitioned history the store
//! writes. Two backends ship: [`InMemoryBackend`] for tests and ephemeral
//! deployments, [`SqliteBackend`] for durable ones.

pub mod backend;
pub mod ledger;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use backend::{DepotBackend, StockRow};
pub use ledger::Ledger;
pub use memory::InMemoryBackend;
pub use sqlite::SqliteBackend;
pub use store::{ApplyOutcome, InventoryStore, RetryPolicy, StoreOptions};
