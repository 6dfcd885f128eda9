//! Liveness probes for the configured external services.

use std::time::Duration;

/// Answers whether one probe target is reachable and healthy.
#[async_trait::async_trait]
pub trait ServiceProbe: Send + Sync {
    /// A probe never fails; anything that is not a healthy response
    /// reads as offline.
    async fn is_online(&self, target: &str) -> bool;
}

#[async_trait::async_trait]
impl<P> ServiceProbe for std::sync::Arc<P>
where
    P: ServiceProbe + ?Sized,
{
    async fn is_online(&self, target: &str) -> bool {
        (**self).is_online(target).await
    }
}

/// Where the device-online flag lives, normally the connection broadcaster.
#[async_trait::async_trait]
pub trait DeviceStatusSource: Send + Sync {
    async fn device_online(&self) -> bool;
}

#[async_trait::async_trait]
impl<D> DeviceStatusSource for std::sync::Arc<D>
where
    D: DeviceStatusSource + ?Sized,
{
    async fn device_online(&self) -> bool {
        (**self).device_online().await
    }
}

/// HTTP GET prober with a per-request deadline.
///
/// Online means the target answered with a non-error status (below 400)
/// within the deadline. Network failures and timeouts read as offline.
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait::async_trait]
impl ServiceProbe for HttpProber {
    async fn is_online(&self, target: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.client.get(target).send()).await {
            Ok(Ok(response)) => response.status().as_u16() < 400,
            Ok(Err(err)) => {
                tracing::debug!(url = target, error = %err, "probe request failed");
                false
            }
            Err(_) => {
                tracing::debug!(url = target, deadline = ?self.timeout, "probe timed out");
                false
            }
        }
    }
}
