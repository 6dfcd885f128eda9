//! The shared process context: every handler works through this.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use depot_core::{DepotResult, ItemTag, LedgerRecord, MovementKind, PartitionKey, StockMovement};
use depot_realtime::{
    BroadcastOutcome, ConnectionBroadcaster, DeviceToken, FrameSink, MovementDeriver, MovementSink,
    SinkError, SubscriberId,
};
use depot_status::{DeviceStatusSource, HttpProber, StatusCache, StatusSnapshot};
use depot_store::{
    ApplyOutcome, DepotBackend, InMemoryBackend, InventoryStore, Ledger, SqliteBackend,
};

use crate::config::{BackendConfig, DepotConfig};
use crate::orders::{self, OrderLine, OrderReport};

type DynBackend = Arc<dyn DepotBackend>;

/// Routes derived movements into the inventory store.
struct StoreMovementSink {
    store: Arc<InventoryStore<DynBackend>>,
}

#[async_trait::async_trait]
impl MovementSink for StoreMovementSink {
    async fn submit(&self, movement: StockMovement) -> DepotResult<()> {
        self.store.apply(movement).await.map(|_| ())
    }
}

/// Lets the status cache read the device-online flag off the broadcaster.
struct BroadcasterStatusSource {
    broadcaster: Arc<ConnectionBroadcaster>,
}

#[async_trait::async_trait]
impl DeviceStatusSource for BroadcasterStatusSource {
    async fn device_online(&self) -> bool {
        self.broadcaster.device_online().await
    }
}

/// What one accepted device frame did.
#[derive(Debug)]
pub struct DeviceFrameOutcome {
    pub broadcast: BroadcastOutcome,
    /// Movements the frame derived and committed.
    pub derived: usize,
}

/// Owns the wired-together depot: store, ledger, broadcaster, deriver,
/// status cache. Built once at startup from [`DepotConfig`] and shared
/// behind an `Arc` by every handler.
pub struct DepotContext {
    store: Arc<InventoryStore<DynBackend>>,
    ledger: Ledger<DynBackend>,
    broadcaster: Arc<ConnectionBroadcaster>,
    deriver: MovementDeriver<StoreMovementSink>,
    statuses: StatusCache<HttpProber, BroadcasterStatusSource>,
    sqlite: Option<SqliteBackend>,
}

impl DepotContext {
    pub async fn init(config: DepotConfig) -> anyhow::Result<Self> {
        let (backend, sqlite): (DynBackend, Option<SqliteBackend>) = match &config.backend {
            BackendConfig::Memory => (Arc::new(InMemoryBackend::new()), None),
            BackendConfig::Sqlite { path } => {
                let sqlite = SqliteBackend::open(path)
                    .await
                    .with_context(|| format!("opening sqlite backend at {path}"))?;
                (Arc::new(sqlite.clone()), Some(sqlite))
            }
        };

        let store = Arc::new(InventoryStore::new(backend.clone(), config.store_options()));
        for entry in &config.catalogue {
            let seeded = store
                .seed_item(&entry.name, entry.amount, entry.tag.clone().unwrap_or_default())
                .await
                .with_context(|| format!("seeding catalogue item '{}'", entry.name))?;
            if seeded {
                tracing::info!(item = %entry.name, amount = entry.amount, "catalogue item seeded");
            }
        }

        let broadcaster = Arc::new(ConnectionBroadcaster::default());
        let deriver = MovementDeriver::new(
            config.device_slots.clone(),
            StoreMovementSink {
                store: store.clone(),
            },
        );
        let statuses = StatusCache::new(
            config.services.clone(),
            config.device_service_name.clone(),
            HttpProber::new(config.probe_timeout()),
            BroadcasterStatusSource {
                broadcaster: broadcaster.clone(),
            },
            config.status_ttl(),
        );

        Ok(Self {
            store,
            ledger: Ledger::new(backend),
            broadcaster,
            deriver,
            statuses,
            sqlite,
        })
    }

    /// Validate and apply one stock movement.
    pub async fn apply_movement(
        &self,
        kind: MovementKind,
        item: &str,
        quantity: i64,
        source: &str,
    ) -> DepotResult<ApplyOutcome> {
        let movement = StockMovement::new(kind, item, quantity, source)?;
        self.store.apply(movement).await
    }

    pub async fn get_inventory(&self) -> DepotResult<BTreeMap<String, i64>> {
        self.store.get_inventory().await
    }

    pub async fn get_tag(&self, item: &str) -> DepotResult<ItemTag> {
        self.store.get_tag(item).await
    }

    pub async fn set_tag(&self, item: &str, tag: ItemTag) -> DepotResult<()> {
        self.store.set_tag(item, tag).await
    }

    pub async fn list_partitions(&self) -> DepotResult<Vec<PartitionKey>> {
        self.ledger.partitions().await
    }

    pub async fn find_records(&self, date: &str) -> DepotResult<Vec<LedgerRecord>> {
        self.ledger.find_records(date).await
    }

    pub async fn register_subscriber(
        &self,
        sink: Arc<dyn FrameSink>,
    ) -> Result<SubscriberId, SinkError> {
        self.broadcaster.register_subscriber(sink).await
    }

    pub async fn unregister_subscriber(&self, id: SubscriberId) {
        self.broadcaster.unregister_subscriber(id).await;
    }

    pub async fn device_connect(&self) -> DeviceToken {
        self.broadcaster.device_connect().await
    }

    /// Relay one device frame to subscribers, then derive movements from it.
    ///
    /// `None` means the token was superseded; the frame went nowhere.
    pub async fn device_frame(
        &self,
        token: DeviceToken,
        raw: &str,
    ) -> Option<DeviceFrameOutcome> {
        let broadcast = self.broadcaster.device_frame(token, raw).await?;
        let derived = self.deriver.ingest(raw).await;
        Some(DeviceFrameOutcome { broadcast, derived })
    }

    pub async fn device_disconnect(&self, token: DeviceToken) {
        self.broadcaster.device_disconnect(token).await;
    }

    pub async fn get_statuses(&self) -> Vec<StatusSnapshot> {
        self.statuses.get_statuses().await
    }

    pub async fn apply_order(&self, lines: &[OrderLine], source: &str) -> OrderReport {
        orders::apply_order(self.store.as_ref(), lines, source).await
    }

    pub fn store(&self) -> &Arc<InventoryStore<DynBackend>> {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger<DynBackend> {
        &self.ledger
    }

    pub fn broadcaster(&self) -> &Arc<ConnectionBroadcaster> {
        &self.broadcaster
    }

    /// Release backend resources. Memory backends have none.
    pub async fn shutdown(self) {
        if let Some(sqlite) = self.sqlite {
            sqlite.close().await;
            tracing::info!("sqlite backend closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogueItem;
    use depot_core::DepotError;
    use depot_status::ServiceTarget;

    fn config_with_slot() -> DepotConfig {
        DepotConfig {
            catalogue: vec![CatalogueItem {
                name: "widget".to_string(),
                amount: 5,
                tag: None,
            }],
            device_slots: std::collections::HashMap::from([(
                "0".to_string(),
                "widget".to_string(),
            )]),
            ..DepotConfig::default()
        }
    }

    #[tokio::test]
    async fn init_seeds_the_catalogue() {
        let context = DepotContext::init(config_with_slot()).await.unwrap();
        let inventory = context.get_inventory().await.unwrap();
        assert_eq!(inventory["widget"], 5);
    }

    #[tokio::test]
    async fn apply_movement_rejects_invalid_input_before_the_store() {
        let context = DepotContext::init(DepotConfig::default()).await.unwrap();
        let err = context
            .apply_movement(MovementKind::In, "widget", 0, "app")
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::Validation(_)));
        assert!(context.get_inventory().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_device_tokens_neither_relay_nor_derive() {
        let context = DepotContext::init(config_with_slot()).await.unwrap();

        let stale = context.device_connect().await;
        let live = context.device_connect().await;

        assert!(context
            .device_frame(stale, r#"{"0": 9, "final": true}"#)
            .await
            .is_none());
        assert_eq!(context.get_inventory().await.unwrap()["widget"], 5);

        // The live connection derives In(9) on top of the seeded 5.
        let outcome = context
            .device_frame(live, r#"{"0": 9, "final": true}"#)
            .await
            .unwrap();
        assert_eq!(outcome.derived, 1);
        assert_eq!(context.get_inventory().await.unwrap()["widget"], 14);
    }

    #[tokio::test]
    async fn the_device_status_entry_follows_the_connection() {
        let mut config = DepotConfig::default();
        config.services = vec![ServiceTarget::new("esp", "device")];
        config.device_service_name = Some("esp".to_string());
        config.status_ttl_secs = 0;
        let context = DepotContext::init(config).await.unwrap();

        assert!(!context.get_statuses().await[0].online);
        let token = context.device_connect().await;
        assert!(context.get_statuses().await[0].online);
        context.device_disconnect(token).await;
        assert!(!context.get_statuses().await[0].online);
    }
}
