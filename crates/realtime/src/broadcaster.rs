//! Subscriber fan-out and the single device slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A subscriber send failed; the connection is treated as gone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("subscriber send failed: {0}")]
pub struct SinkError(pub String);

/// Write half of a subscriber connection.
///
/// Implemented by whatever transport carries frames to the browser; the
/// broadcaster only needs to push text and learn about dead peers through
/// the error.
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one text frame.
    async fn send_text(&self, frame: &str) -> Result<(), SinkError>;
}

/// Identifier of a registered subscriber.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl core::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Proof of device-slot ownership, handed out by [`ConnectionBroadcaster::device_connect`].
///
/// The slot is single-owner with last-connect-wins: a newer connect makes
/// every older token stale, and stale frames or disconnects are ignored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceToken(u64);

/// Result of one fan-out round.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers the frame reached.
    pub delivered: usize,
    /// Subscribers removed because their send failed or timed out.
    pub dropped: Vec<SubscriberId>,
}

#[derive(Default)]
struct BroadcastState {
    subscribers: HashMap<SubscriberId, Arc<dyn FrameSink>>,
    device_online: bool,
    device_generation: u64,
}

/// Fan-out hub for browser subscribers plus the single device connection.
///
/// All shared state sits behind one mutex. A broadcast takes a snapshot of
/// the subscriber set, releases the lock, sends to every sink concurrently
/// (each bounded by the send timeout), then removes the failures. One slow
/// or dead subscriber therefore never blocks the others, and every drop is
/// observable: logged, counted, and listed in the returned outcome.
pub struct ConnectionBroadcaster {
    state: Mutex<BroadcastState>,
    send_timeout: Duration,
    drops: AtomicU64,
}

impl ConnectionBroadcaster {
    pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(send_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BroadcastState::default()),
            send_timeout,
            drops: AtomicU64::new(0),
        }
    }

    /// Add a subscriber.
    ///
    /// The current device-online flag is sent as the subscriber's first
    /// frame before it joins the set; when that send fails the subscriber
    /// is never added. A device transition inside that window is caught by
    /// the next status broadcast.
    pub async fn register_subscriber(
        &self,
        sink: Arc<dyn FrameSink>,
    ) -> Result<SubscriberId, SinkError> {
        let online = self.state.lock().await.device_online;
        self.send_bounded(&sink, &status_frame(online)).await?;

        let id = SubscriberId::new();
        self.state.lock().await.subscribers.insert(id, sink);
        tracing::debug!(subscriber = %id, "subscriber registered");
        Ok(id)
    }

    /// Remove a subscriber. Unknown ids are a no-op.
    pub async fn unregister_subscriber(&self, id: SubscriberId) {
        if self.state.lock().await.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = %id, "subscriber unregistered");
        }
    }

    /// Claim the device slot, superseding any previous owner, and announce
    /// the device as online.
    pub async fn device_connect(&self) -> DeviceToken {
        let token = {
            let mut state = self.state.lock().await;
            state.device_generation += 1;
            state.device_online = true;
            DeviceToken(state.device_generation)
        };
        tracing::info!("device connected");
        self.broadcast(&status_frame(true)).await;
        token
    }

    /// Release the device slot and announce the device as offline.
    ///
    /// A stale token means the slot already belongs to a newer connection;
    /// nothing happens.
    pub async fn device_disconnect(&self, token: DeviceToken) {
        {
            let mut state = self.state.lock().await;
            if state.device_generation != token.0 {
                tracing::debug!("stale device disconnect ignored");
                return;
            }
            state.device_online = false;
        }
        tracing::info!("device disconnected");
        self.broadcast(&status_frame(false)).await;
    }

    /// Relay one raw device frame verbatim to every subscriber.
    ///
    /// Returns `None` for a stale token; the frame must then be discarded
    /// by the caller as well.
    pub async fn device_frame(&self, token: DeviceToken, raw: &str) -> Option<BroadcastOutcome> {
        if self.state.lock().await.device_generation != token.0 {
            tracing::debug!("frame from superseded device connection dropped");
            return None;
        }
        Some(self.broadcast(raw).await)
    }

    /// Fan one text frame out to every subscriber.
    pub async fn broadcast(&self, frame: &str) -> BroadcastOutcome {
        let snapshot: Vec<(SubscriberId, Arc<dyn FrameSink>)> = {
            let state = self.state.lock().await;
            state
                .subscribers
                .iter()
                .map(|(id, sink)| (*id, sink.clone()))
                .collect()
        };
        if snapshot.is_empty() {
            return BroadcastOutcome::default();
        }

        let sends = snapshot.into_iter().map(|(id, sink)| async move {
            let result = self.send_bounded(&sink, frame).await;
            (id, result)
        });
        let results = futures::future::join_all(sends).await;

        let mut outcome = BroadcastOutcome::default();
        for (id, result) in results {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        subscriber = %id,
                        error = %err,
                        "dropping subscriber after failed send"
                    );
                    outcome.dropped.push(id);
                }
            }
        }

        if !outcome.dropped.is_empty() {
            let mut state = self.state.lock().await;
            for id in &outcome.dropped {
                state.subscribers.remove(id);
            }
            self.drops
                .fetch_add(outcome.dropped.len() as u64, Ordering::Relaxed);
        }
        outcome
    }

    /// Whether the device slot is currently online.
    pub async fn device_online(&self) -> bool {
        self.state.lock().await.device_online
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    /// Total subscribers dropped over the broadcaster's lifetime.
    pub fn dropped_total(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    async fn send_bounded(&self, sink: &Arc<dyn FrameSink>, frame: &str) -> Result<(), SinkError> {
        match tokio::time::timeout(self.send_timeout, sink.send_text(frame)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError(format!(
                "send timed out after {:?}",
                self.send_timeout
            ))),
        }
    }
}

impl Default for ConnectionBroadcaster {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEND_TIMEOUT)
    }
}

/// The `{"type":"status","esp":<bool>}` frame announcing device liveness.
pub fn status_frame(online: bool) -> String {
    serde_json::json!({ "type": "status", "esp": online }).to_string()
}
