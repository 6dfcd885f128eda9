//! Read access to the day-partitioned ledger.
//!
//! Appends happen inside [`InventoryStore::apply`] as part of the atomic
//! commit; this type covers the browsing side: which days exist, and what
//! was committed on one of them.
//!
//! [`InventoryStore::apply`]: crate::store::InventoryStore::apply

use depot_core::{DepotError, DepotResult, LedgerRecord, PartitionKey};

use crate::backend::DepotBackend;

/// Ledger reader over a [`DepotBackend`].
#[derive(Debug)]
pub struct Ledger<B> {
    backend: B,
}

impl<B> Ledger<B>
where
    B: DepotBackend,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// All partitions with at least one record, oldest first.
    pub async fn partitions(&self) -> DepotResult<Vec<PartitionKey>> {
        Ok(self.backend.list_partitions().await?)
    }

    /// Records of one partition in append order.
    pub async fn records_on(&self, key: PartitionKey) -> DepotResult<Vec<LedgerRecord>> {
        self.backend
            .records_for(key)
            .await?
            .ok_or_else(|| DepotError::not_found(format!("ledger partition '{key}'")))
    }

    /// Records for an exact-match `YYYY-MM-DD` key.
    ///
    /// A key that does not parse can never name a partition, so it reports
    /// the same not-found as a well-formed key with no records.
    pub async fn find_records(&self, date: &str) -> DepotResult<Vec<LedgerRecord>> {
        let key = date
            .parse::<PartitionKey>()
            .map_err(|_| DepotError::not_found(format!("ledger partition '{date}'")))?;
        self.records_on(key).await
    }
}
