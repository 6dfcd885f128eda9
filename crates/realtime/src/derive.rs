//! Turns raw device frames into stock movements.
//!
//! The device reports shelf readings as flat JSON objects keyed by slot
//! number, with a `final` flag marking settled measurements. Only final
//! frames produce movements: each configured slot is diffed against the
//! previous final frame and the delta becomes an automatic movement with
//! source [`DEVICE_SOURCE`].
//!
//! The baseline advances once per distinct final frame, even when some
//! submissions fail. A frame the device resends therefore never applies
//! the successful movements twice.

use std::collections::HashMap;

use depot_core::{DepotResult, MovementKind, StockMovement};
use tokio::sync::Mutex;

/// Source label stamped on every derived movement.
pub const DEVICE_SOURCE: &str = "device";

/// Destination for derived movements, normally the inventory store.
#[async_trait::async_trait]
pub trait MovementSink: Send + Sync {
    async fn submit(&self, movement: StockMovement) -> DepotResult<()>;
}

#[async_trait::async_trait]
impl<S> MovementSink for std::sync::Arc<S>
where
    S: MovementSink + ?Sized,
{
    async fn submit(&self, movement: StockMovement) -> DepotResult<()> {
        (**self).submit(movement).await
    }
}

#[derive(Debug, serde::Deserialize)]
struct DeviceFrame {
    #[serde(rename = "final", default)]
    is_final: bool,
    #[serde(flatten)]
    readings: HashMap<String, serde_json::Value>,
}

/// Stateful frame-to-movement translator for one device connection stream.
pub struct MovementDeriver<S> {
    slot_map: HashMap<String, String>,
    sink: S,
    baseline: Mutex<Option<HashMap<String, serde_json::Value>>>,
}

impl<S: MovementSink> MovementDeriver<S> {
    /// `slot_map` maps device slot keys to item names. Slots without a
    /// mapping are relayed but never derive movements.
    pub fn new(slot_map: HashMap<String, String>, sink: S) -> Self {
        Self {
            slot_map,
            sink,
            baseline: Mutex::new(None),
        }
    }

    /// Feed one raw device frame. Returns how many movements reached the
    /// sink; anything undecipherable or non-final counts as zero.
    pub async fn ingest(&self, raw: &str) -> usize {
        let frame: DeviceFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "unparseable device frame ignored");
                return 0;
            }
        };
        if !frame.is_final {
            return 0;
        }

        let mut baseline = self.baseline.lock().await;
        if baseline.as_ref() == Some(&frame.readings) {
            tracing::debug!("repeated final frame ignored");
            return 0;
        }

        let mut submitted = 0;
        for (slot, item) in &self.slot_map {
            let Some(new_value) = frame.readings.get(slot).and_then(|v| v.as_i64()) else {
                if frame.readings.contains_key(slot) {
                    tracing::warn!(slot, item, "non-integer reading skipped");
                }
                continue;
            };
            let old_value = baseline
                .as_ref()
                .and_then(|prev| prev.get(slot))
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            let delta = new_value - old_value;
            if delta == 0 {
                tracing::debug!(slot, item, "unchanged reading produces no movement");
                continue;
            }

            let movement =
                match StockMovement::new(MovementKind::Auto, item.clone(), delta, DEVICE_SOURCE) {
                    Ok(movement) => movement,
                    Err(err) => {
                        tracing::warn!(item, error = %err, "derived movement rejected");
                        continue;
                    }
                };
            match self.sink.submit(movement).await {
                Ok(()) => submitted += 1,
                Err(err) => {
                    tracing::warn!(item, error = %err, "derived movement failed to apply");
                }
            }
        }

        *baseline = Some(frame.readings);
        submitted
    }

    /// Forget the baseline; the next final frame diffs against zero again.
    pub async fn reset(&self) {
        *self.baseline.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::DepotError;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CollectingSink {
        movements: StdMutex<Vec<StockMovement>>,
        reject_item: Option<String>,
    }

    impl CollectingSink {
        fn rejecting(item: &str) -> Self {
            Self {
                movements: StdMutex::new(Vec::new()),
                reject_item: Some(item.to_string()),
            }
        }

        fn collected(&self) -> Vec<StockMovement> {
            self.movements.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl MovementSink for CollectingSink {
        async fn submit(&self, movement: StockMovement) -> DepotResult<()> {
            if self.reject_item.as_deref() == Some(movement.item()) {
                return Err(DepotError::validation("rejected by test sink"));
            }
            self.movements.lock().unwrap().push(movement);
            Ok(())
        }
    }

    fn deriver(sink: std::sync::Arc<CollectingSink>) -> MovementDeriver<std::sync::Arc<CollectingSink>> {
        let slots = HashMap::from([
            ("0".to_string(), "widget".to_string()),
            ("1".to_string(), "gadget".to_string()),
        ]);
        MovementDeriver::new(slots, sink)
    }

    #[tokio::test]
    async fn non_final_frames_derive_nothing() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        assert_eq!(deriver.ingest(r#"{"0": 4, "1": 2}"#).await, 0);
        assert_eq!(deriver.ingest(r#"{"0": 4, "final": false}"#).await, 0);
        assert!(sink.collected().is_empty());
    }

    #[tokio::test]
    async fn first_final_frame_diffs_against_zero() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        assert_eq!(deriver.ingest(r#"{"0": 4, "1": 2, "final": true}"#).await, 2);

        let mut moved: Vec<(String, MovementKind, i64)> = sink
            .collected()
            .iter()
            .map(|m| (m.item().to_string(), m.kind(), m.quantity()))
            .collect();
        moved.sort();
        assert_eq!(
            moved,
            vec![
                ("gadget".to_string(), MovementKind::In, 2),
                ("widget".to_string(), MovementKind::In, 4),
            ]
        );
        for movement in sink.collected() {
            assert_eq!(movement.source(), DEVICE_SOURCE);
        }
    }

    #[tokio::test]
    async fn deltas_follow_the_previous_final_frame() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        deriver.ingest(r#"{"0": 4, "final": true}"#).await;
        assert_eq!(deriver.ingest(r#"{"0": 1, "final": true}"#).await, 1);

        let last = sink.collected().pop().unwrap();
        assert_eq!(last.item(), "widget");
        assert_eq!(last.kind(), MovementKind::Out);
        assert_eq!(last.quantity(), 3);
    }

    #[tokio::test]
    async fn repeated_final_frame_is_a_no_op() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        assert_eq!(deriver.ingest(r#"{"0": 4, "final": true}"#).await, 1);
        assert_eq!(deriver.ingest(r#"{"0": 4, "final": true}"#).await, 0);
        assert_eq!(sink.collected().len(), 1);
    }

    #[tokio::test]
    async fn unchanged_slots_produce_no_movement() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        deriver.ingest(r#"{"0": 4, "1": 2, "final": true}"#).await;
        assert_eq!(deriver.ingest(r#"{"0": 4, "1": 5, "final": true}"#).await, 1);

        let last = sink.collected().pop().unwrap();
        assert_eq!(last.item(), "gadget");
        assert_eq!(last.quantity(), 3);
    }

    #[tokio::test]
    async fn unmapped_and_missing_slots_are_ignored() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        // Slot 9 has no mapping; slot 1 is mapped but absent from the frame.
        assert_eq!(deriver.ingest(r#"{"0": 4, "9": 7, "final": true}"#).await, 1);
        assert_eq!(sink.collected().len(), 1);
        assert_eq!(sink.collected()[0].item(), "widget");
    }

    #[tokio::test]
    async fn junk_frames_leave_the_baseline_alone() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        deriver.ingest(r#"{"0": 4, "final": true}"#).await;
        assert_eq!(deriver.ingest("not json at all").await, 0);
        // Still diffs against the pre-junk baseline.
        assert_eq!(deriver.ingest(r#"{"0": 4, "final": true}"#).await, 0);
        assert_eq!(sink.collected().len(), 1);
    }

    #[tokio::test]
    async fn non_integer_readings_are_skipped() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        assert_eq!(
            deriver
                .ingest(r#"{"0": "soggy", "1": 3, "final": true}"#)
                .await,
            1
        );
        assert_eq!(sink.collected()[0].item(), "gadget");
    }

    #[tokio::test]
    async fn one_failing_item_does_not_block_the_rest() {
        let sink = std::sync::Arc::new(CollectingSink::rejecting("widget"));
        let deriver = deriver(sink.clone());

        assert_eq!(deriver.ingest(r#"{"0": 4, "1": 2, "final": true}"#).await, 1);
        assert_eq!(sink.collected().len(), 1);
        assert_eq!(sink.collected()[0].item(), "gadget");

        // The baseline advanced despite the failure, so the resent frame
        // does not re-apply the gadget movement.
        assert_eq!(deriver.ingest(r#"{"0": 4, "1": 2, "final": true}"#).await, 0);
        assert_eq!(sink.collected().len(), 1);
    }

    #[tokio::test]
    async fn reset_makes_the_next_frame_diff_from_zero() {
        let sink = std::sync::Arc::new(CollectingSink::default());
        let deriver = deriver(sink.clone());

        deriver.ingest(r#"{"0": 4, "final": true}"#).await;
        deriver.reset().await;
        assert_eq!(deriver.ingest(r#"{"0": 4, "final": true}"#).await, 1);
        assert_eq!(sink.collected().len(), 2);
        assert_eq!(sink.collected()[1].quantity(), 4);
    }
}
