//! Order ingestion: one outbound movement per line.

use depot_core::{DepotError, MovementKind, StockMovement};
use depot_store::{DepotBackend, InventoryStore};
use serde::Deserialize;

/// Well-known source label for movements coming from order ingestion.
pub const ORDER_SOURCE: &str = "order";

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLine {
    pub item: String,
    pub quantity: i64,
}

/// What happened to each line of one order.
#[derive(Debug, Default)]
pub struct OrderReport {
    pub applied: usize,
    pub failures: Vec<OrderFailure>,
}

impl OrderReport {
    pub fn fully_applied(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct OrderFailure {
    pub item: String,
    pub error: DepotError,
}

/// Apply one Out movement per line. A failed line is logged and collected;
/// the remaining lines still run.
pub async fn apply_order<B>(
    store: &InventoryStore<B>,
    lines: &[OrderLine],
    source: &str,
) -> OrderReport
where
    B: DepotBackend,
{
    let mut report = OrderReport::default();
    for line in lines {
        let result =
            match StockMovement::new(MovementKind::Out, line.item.clone(), line.quantity, source) {
                Ok(movement) => store.apply(movement).await.map(|_| ()),
                Err(err) => Err(err),
            };
        match result {
            Ok(()) => report.applied += 1,
            Err(error) => {
                tracing::warn!(item = %line.item, error = %error, "order line failed");
                report.failures.push(OrderFailure {
                    item: line.item.clone(),
                    error,
                });
            }
        }
    }
    report
}
