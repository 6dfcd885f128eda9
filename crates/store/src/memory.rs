//! In-memory backend.

use std::collections::BTreeMap;
use std::sync::RwLock;

use depot_core::{BackendError, ItemTag, LedgerRecord, PartitionKey};

use crate::backend::{DepotBackend, StockRow};

#[derive(Debug, Clone, Default)]
struct Row {
    amount: i64,
    tag: ItemTag,
}

#[derive(Debug, Default)]
struct DepotState {
    stock: BTreeMap<String, Row>,
    ledger: BTreeMap<PartitionKey, Vec<LedgerRecord>>,
}

/// In-memory depot backend.
///
/// The default backend for tests and single-process deployments that do not
/// need durability. All mutation happens under one write lock, which is what
/// makes `commit_movement` atomic here.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<DepotState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, DepotState>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::unavailable("state lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, DepotState>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::unavailable("state lock poisoned"))
    }
}

#[async_trait::async_trait]
impl DepotBackend for InMemoryBackend {
    async fn fetch_stock(&self, item: &str) -> Result<Option<StockRow>, BackendError> {
        let state = self.read()?;
        Ok(state.stock.get(item).map(|row| StockRow {
            item: item.to_string(),
            amount: row.amount,
            tag: row.tag.clone(),
        }))
    }

    async fn commit_movement(
        &self,
        item: &str,
        new_amount: i64,
        partition: PartitionKey,
        record: &LedgerRecord,
    ) -> Result<(), BackendError> {
        let mut state = self.write()?;
        state.stock.entry(item.to_string()).or_default().amount = new_amount;
        state.ledger.entry(partition).or_default().push(record.clone());
        Ok(())
    }

    async fn remove_if_zero(&self, item: &str) -> Result<bool, BackendError> {
        let mut state = self.write()?;
        match state.stock.get(item) {
            Some(row) if row.amount == 0 => {
                state.stock.remove(item);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn snapshot_stock(&self) -> Result<BTreeMap<String, i64>, BackendError> {
        let state = self.read()?;
        Ok(state
            .stock
            .iter()
            .map(|(item, row)| (item.clone(), row.amount))
            .collect())
    }

    async fn fetch_tag(&self, item: &str) -> Result<Option<ItemTag>, BackendError> {
        let state = self.read()?;
        Ok(state.stock.get(item).map(|row| row.tag.clone()))
    }

    async fn store_tag(&self, item: &str, tag: &ItemTag) -> Result<bool, BackendError> {
        let mut state = self.write()?;
        match state.stock.get_mut(item) {
            Some(row) => {
                row.tag = tag.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_if_absent(
        &self,
        item: &str,
        amount: i64,
        tag: &ItemTag,
    ) -> Result<bool, BackendError> {
        let mut state = self.write()?;
        if state.stock.contains_key(item) {
            return Ok(false);
        }
        state.stock.insert(
            item.to_string(),
            Row {
                amount,
                tag: tag.clone(),
            },
        );
        Ok(true)
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionKey>, BackendError> {
        let state = self.read()?;
        Ok(state.ledger.keys().copied().collect())
    }

    async fn records_for(
        &self,
        partition: PartitionKey,
    ) -> Result<Option<Vec<LedgerRecord>>, BackendError> {
        let state = self.read()?;
        Ok(state.ledger.get(&partition).cloned())
    }
}
