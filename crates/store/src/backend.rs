//! Storage seam for stock rows and ledger partitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use depot_core::{BackendError, ItemTag, LedgerRecord, PartitionKey};

/// One stock row as the backend holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct StockRow {
    pub item: String,
    pub amount: i64,
    pub tag: ItemTag,
}

/// Storage behind the depot: a keyed stock table plus day-partitioned,
/// append-only ledger logs.
///
/// Implementations must make `commit_movement` atomic: the stock upsert and
/// the ledger append land together or not at all. The store layer relies on
/// this to retry failed applies without double-appending.
///
/// All errors are reported as [`BackendError`]; driver types never cross this
/// boundary.
#[async_trait::async_trait]
pub trait DepotBackend: Send + Sync {
    /// Load one stock row, or `None` when the item has no row.
    async fn fetch_stock(&self, item: &str) -> Result<Option<StockRow>, BackendError>;

    /// Persist a committed movement: upsert the row to `new_amount` and
    /// append `record` to `partition`, as one atomic unit.
    ///
    /// A row created by this call starts with the empty tag; an existing
    /// row's tag is left untouched.
    async fn commit_movement(
        &self,
        item: &str,
        new_amount: i64,
        partition: PartitionKey,
        record: &LedgerRecord,
    ) -> Result<(), BackendError>;

    /// Delete the row if its amount is still exactly zero.
    ///
    /// Returns whether a row was deleted. A missing row is not an error.
    async fn remove_if_zero(&self, item: &str) -> Result<bool, BackendError>;

    /// All stock rows as a name → amount map, ordered by name.
    async fn snapshot_stock(&self) -> Result<BTreeMap<String, i64>, BackendError>;

    /// The tag of one row, or `None` when the item has no row.
    async fn fetch_tag(&self, item: &str) -> Result<Option<ItemTag>, BackendError>;

    /// Replace the tag of an existing row. Returns `false` when the row is
    /// absent (the tag is not created implicitly).
    async fn store_tag(&self, item: &str, tag: &ItemTag) -> Result<bool, BackendError>;

    /// Insert a row only when the item does not exist yet. Returns whether a
    /// row was inserted. Used for catalogue seeding.
    async fn insert_if_absent(
        &self,
        item: &str,
        amount: i64,
        tag: &ItemTag,
    ) -> Result<bool, BackendError>;

    /// Sorted list of ledger partitions that have at least one record.
    async fn list_partitions(&self) -> Result<Vec<PartitionKey>, BackendError>;

    /// Records of one partition in append order, or `None` when the
    /// partition has never been written.
    async fn records_for(
        &self,
        partition: PartitionKey,
    ) -> Result<Option<Vec<LedgerRecord>>, BackendError>;
}

#[async_trait::async_trait]
impl<B> DepotBackend for Arc<B>
where
    B: DepotBackend + ?Sized,
{
    async fn fetch_stock(&self, item: &str) -> Result<Option<StockRow>, BackendError> {
        (**self).fetch_stock(item).await
    }

    async fn commit_movement(
        &self,
        item: &str,
        new_amount: i64,
        partition: PartitionKey,
        record: &LedgerRecord,
    ) -> Result<(), BackendError> {
        (**self).commit_movement(item, new_amount, partition, record).await
    }

    async fn remove_if_zero(&self, item: &str) -> Result<bool, BackendError> {
        (**self).remove_if_zero(item).await
    }

    async fn snapshot_stock(&self) -> Result<BTreeMap<String, i64>, BackendError> {
        (**self).snapshot_stock().await
    }

    async fn fetch_tag(&self, item: &str) -> Result<Option<ItemTag>, BackendError> {
        (**self).fetch_tag(item).await
    }

    async fn store_tag(&self, item: &str, tag: &ItemTag) -> Result<bool, BackendError> {
        (**self).store_tag(item, tag).await
    }

    async fn insert_if_absent(
        &self,
        item: &str,
        amount: i64,
        tag: &ItemTag,
    ) -> Result<bool, BackendError> {
        (**self).insert_if_absent(item, amount, tag).await
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionKey>, BackendError> {
        (**self).list_partitions().await
    }

    async fn records_for(
        &self,
        partition: PartitionKey,
    ) -> Result<Option<Vec<LedgerRecord>>, BackendError> {
        (**self).records_for(partition).await
    }
}
