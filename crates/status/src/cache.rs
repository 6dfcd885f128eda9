//! TTL cache over service liveness probes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::probe::{DeviceStatusSource, ServiceProbe};

/// One configured service to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub name: String,
    pub target: String,
}

impl ServiceTarget {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
        }
    }
}

/// Liveness of one service at the time of the last probe round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub name: String,
    pub target: String,
    pub online: bool,
}

struct CachedRound {
    at: Instant,
    snapshots: Vec<StatusSnapshot>,
}

/// Answers status queries from a cached probe round no older than the TTL.
///
/// The cache entry sits behind one async mutex held across the probe round.
/// Every caller checks freshness after acquiring the lock, so N callers
/// arriving on an expired entry queue up and all but the first find the
/// entry the first one just refreshed. One TTL expiry costs exactly one
/// probe round no matter how many callers race it.
///
/// The entry named by `device_service` is answered from the device-online
/// flag instead of the network; the device speaks to us, we never probe it.
pub struct StatusCache<P, D> {
    services: Vec<ServiceTarget>,
    device_service: Option<String>,
    prober: P,
    device: D,
    ttl: Duration,
    cached: Mutex<Option<CachedRound>>,
}

impl<P, D> StatusCache<P, D>
where
    P: ServiceProbe,
    D: DeviceStatusSource,
{
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

    pub fn new(
        services: Vec<ServiceTarget>,
        device_service: Option<String>,
        prober: P,
        device: D,
        ttl: Duration,
    ) -> Self {
        Self {
            services,
            device_service,
            prober,
            device,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Current liveness of every configured service, in configuration order.
    pub async fn get_statuses(&self) -> Vec<StatusSnapshot> {
        let mut cached = self.cached.lock().await;
        if let Some(round) = cached.as_ref() {
            if round.at.elapsed() < self.ttl {
                return round.snapshots.clone();
            }
        }

        let snapshots = self.probe_round().await;
        *cached = Some(CachedRound {
            at: Instant::now(),
            snapshots: snapshots.clone(),
        });
        snapshots
    }

    async fn probe_round(&self) -> Vec<StatusSnapshot> {
        tracing::debug!(services = self.services.len(), "running status probe round");
        let probes = self.services.iter().map(|service| async move {
            let online = if self.device_service.as_deref() == Some(service.name.as_str()) {
                self.device.device_online().await
            } else {
                self.prober.is_online(&service.target).await
            };
            StatusSnapshot {
                name: service.name.clone(),
                target: service.target.clone(),
                online,
            }
        });
        futures::future::join_all(probes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProber {
        calls: AtomicUsize,
    }

    impl CountingProber {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ServiceProbe for CountingProber {
        async fn is_online(&self, _target: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[derive(Default)]
    struct FlagDevice {
        online: AtomicBool,
    }

    #[async_trait::async_trait]
    impl DeviceStatusSource for FlagDevice {
        async fn device_online(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    fn two_services() -> Vec<ServiceTarget> {
        vec![
            ServiceTarget::new("db", "http://127.0.0.1:9001/health"),
            ServiceTarget::new("bot", "http://127.0.0.1:9002/health"),
        ]
    }

    #[tokio::test]
    async fn fresh_cache_answers_without_probing() {
        let prober = Arc::new(CountingProber::default());
        let cache = StatusCache::new(
            two_services(),
            None,
            prober.clone(),
            Arc::new(FlagDevice::default()),
            Duration::from_secs(10),
        );

        let first = cache.get_statuses().await;
        assert_eq!(prober.calls(), 2);

        let second = cache.get_statuses().await;
        assert_eq!(prober.calls(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_ttl_probes_again() {
        let prober = Arc::new(CountingProber::default());
        let cache = StatusCache::new(
            two_services(),
            None,
            prober.clone(),
            Arc::new(FlagDevice::default()),
            Duration::from_secs(10),
        );

        cache.get_statuses().await;
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.get_statuses().await;
        assert_eq!(prober.calls(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_misses_collapse_into_one_round() {
        let prober = Arc::new(CountingProber::default());
        let cache = Arc::new(StatusCache::new(
            two_services(),
            None,
            prober.clone(),
            Arc::new(FlagDevice::default()),
            Duration::from_secs(10),
        ));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_statuses().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().len(), 2);
        }

        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn device_entry_reads_the_flag_not_the_network() {
        let prober = Arc::new(CountingProber::default());
        let device = Arc::new(FlagDevice::default());
        let mut services = two_services();
        services.push(ServiceTarget::new("esp", "device"));

        let cache = StatusCache::new(
            services,
            Some("esp".to_string()),
            prober.clone(),
            device.clone(),
            Duration::from_secs(10),
        );

        let round = cache.get_statuses().await;
        assert_eq!(prober.calls(), 2);
        assert_eq!(round[2].name, "esp");
        assert!(!round[2].online);

        device.online.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(11)).await;
        let round = cache.get_statuses().await;
        assert!(round[2].online);
    }

    #[tokio::test]
    async fn snapshots_keep_configuration_order() {
        let cache = StatusCache::new(
            two_services(),
            None,
            Arc::new(CountingProber::default()),
            Arc::new(FlagDevice::default()),
            Duration::from_secs(10),
        );

        let round = cache.get_statuses().await;
        let names: Vec<&str> = round.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["db", "bot"]);
        assert_eq!(round[0].target, "http://127.0.0.1:9001/health");
    }
}
