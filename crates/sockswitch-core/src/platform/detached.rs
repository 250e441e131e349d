//! Detached platform: accepts every configuration and only remembers it.
//!
//! Used when the host proxy settings are managed elsewhere (a browser
//! launched with the printed proxy URL, a PAC file, ...).

use super::{PlatformError, ProxyConfig, ProxyPlatform};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Default)]
pub struct DetachedPlatform {
    applied: Mutex<Option<ProxyConfig>>,
    apply_count: AtomicU64,
}

impl DetachedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted configuration
    pub fn applied(&self) -> Option<ProxyConfig> {
        self.applied.lock().ok().and_then(|c| c.clone())
    }

    /// Number of accepted apply calls
    pub fn apply_count(&self) -> u64 {
        self.apply_count.load(Ordering::Relaxed)
    }
}

impl ProxyPlatform for DetachedPlatform {
    fn name(&self) -> &str {
        "detached"
    }

    async fn apply(&self, config: &ProxyConfig) -> Result<(), PlatformError> {
        match config.server() {
            Some(server) => info!("Proxy set to {} (detached, not applied to host)", server.url()),
            None => info!("Proxy set to direct (detached, not applied to host)"),
        }

        let mut applied = self
            .applied
            .lock()
            .map_err(|_| PlatformError::new("detached platform state poisoned"))?;
        *applied = Some(config.clone());
        self.apply_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_last_config() {
        let platform = DetachedPlatform::new();
        assert!(platform.applied().is_none());

        platform.apply(&ProxyConfig::socks5("h", 1080, &[])).await.unwrap();
        platform.apply(&ProxyConfig::direct()).await.unwrap();

        assert_eq!(platform.applied(), Some(ProxyConfig::Direct));
        assert_eq!(platform.apply_count(), 2);
    }
}
