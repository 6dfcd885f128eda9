//! The inventory store: serialized read-modify-write over a backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use depot_core::{
    DepotError, DepotResult, ItemTag, LedgerRecord, MovementKind, PartitionKey, RecordId,
    StockMovement, should_auto_remove,
};

use crate::backend::DepotBackend;

/// Retry policy for transient backend faults.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    /// Delay before the second attempt; doubles per retry, capped at 5s.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Store tuning knobs.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Global flag gating zero-stock auto-removal.
    pub remove_on_zero: bool,
    /// UTC offset applied when resolving the ledger day at append time.
    pub utc_offset_minutes: i32,
    pub retry: RetryPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            remove_on_zero: true,
            utc_offset_minutes: 0,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Id of the ledger record the commit appended.
    pub record_id: RecordId,
    pub new_amount: i64,
    /// Whether auto-removal deleted the row after the commit.
    pub removed: bool,
}

/// Concurrency-safe stock table over a [`DepotBackend`].
///
/// Read-modify-write is serialized per item through a lock map: concurrent
/// applies on the same item queue up, applies on different items proceed in
/// parallel. Each apply runs read → arithmetic → atomic commit (stock upsert
/// plus ledger append) → auto-removal check.
///
/// Transient backend faults are retried inside the item lock up to
/// [`RetryPolicy::attempts`]; because the commit is atomic, a retried apply
/// can never leave a ledger record without its stock update or vice versa.
/// Validation and insufficient-stock failures are never retried.
///
/// The lock map grows with the item universe and entries are never dropped;
/// depots hold tens of items, not millions.
#[derive(Debug)]
pub struct InventoryStore<B> {
    backend: B,
    options: StoreOptions,
    item_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<B> InventoryStore<B>
where
    B: DepotBackend,
{
    pub fn new(backend: B, options: StoreOptions) -> Self {
        Self {
            backend,
            options,
            item_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a validated movement.
    ///
    /// On success exactly one ledger record exists for this call, appended to
    /// the partition of the current day. `Out` beyond the current amount
    /// fails with [`DepotError::InsufficientStock`] and leaves both the row
    /// and the ledger untouched.
    pub async fn apply(&self, movement: StockMovement) -> DepotResult<ApplyOutcome> {
        let lock = self.item_lock(movement.item()).await;
        let _serialized = lock.lock().await;

        let mut delay = self.options.retry.backoff;
        let mut attempt = 1;
        loop {
            match self.apply_once(&movement).await {
                Err(err) if err.is_transient() && attempt < self.options.retry.attempts => {
                    tracing::warn!(
                        item = movement.item(),
                        attempt,
                        error = %err,
                        "transient backend fault during apply, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(5));
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Current name → amount mapping; empty when the depot holds nothing.
    pub async fn get_inventory(&self) -> DepotResult<BTreeMap<String, i64>> {
        Ok(self.backend.snapshot_stock().await?)
    }

    /// Tag of an existing item.
    pub async fn get_tag(&self, item: &str) -> DepotResult<ItemTag> {
        self.backend
            .fetch_tag(item)
            .await?
            .ok_or_else(|| DepotError::not_found(format!("item '{item}'")))
    }

    /// Replace the tag of an existing item.
    pub async fn set_tag(&self, item: &str, tag: ItemTag) -> DepotResult<()> {
        if self.backend.store_tag(item, &tag).await? {
            Ok(())
        } else {
            Err(DepotError::not_found(format!("item '{item}'")))
        }
    }

    /// Seed a row unless the item already exists. Returns whether a row was
    /// created.
    pub async fn seed_item(&self, item: &str, amount: i64, tag: ItemTag) -> DepotResult<bool> {
        Ok(self.backend.insert_if_absent(item, amount, &tag).await?)
    }

    async fn apply_once(&self, movement: &StockMovement) -> DepotResult<ApplyOutcome> {
        let existing = self.backend.fetch_stock(movement.item()).await?;
        let current = existing.as_ref().map(|row| row.amount).unwrap_or(0);
        let tag = existing.map(|row| row.tag).unwrap_or_default();

        let new_amount = match movement.kind() {
            MovementKind::In => current + movement.quantity(),
            MovementKind::Out => {
                if current < movement.quantity() {
                    return Err(DepotError::insufficient_stock(
                        movement.item(),
                        current,
                        movement.quantity(),
                    ));
                }
                current - movement.quantity()
            }
            MovementKind::Set => movement.quantity(),
            MovementKind::Auto => {
                // StockMovement::new normalizes Auto away; reject rather
                // than guess if one ever slips through deserialization.
                return Err(DepotError::validation(
                    "auto movements must be normalized before apply",
                ));
            }
        };

        let partition = PartitionKey::today(self.options.utc_offset_minutes);
        let record = LedgerRecord::from_movement(movement);
        self.backend
            .commit_movement(movement.item(), new_amount, partition, &record)
            .await?;

        let removed = if should_auto_remove(&tag, new_amount, self.options.remove_on_zero) {
            match self.backend.remove_if_zero(movement.item()).await {
                Ok(removed) => removed,
                Err(err) => {
                    // The commit already stands; a failed removal just leaves
                    // the row at zero until the next apply.
                    tracing::warn!(
                        item = movement.item(),
                        error = %err,
                        "auto-removal failed, row left at zero"
                    );
                    false
                }
            }
        } else {
            false
        };

        Ok(ApplyOutcome {
            record_id: record.id,
            new_amount,
            removed,
        })
    }

    async fn item_lock(&self, item: &str) -> Arc<Mutex<()>> {
        let mut locks = self.item_locks.lock().await;
        locks.entry(item.to_string()).or_default().clone()
    }
}
