//! Host Platform Proxy Settings
//!
//! The controller never touches the network stack itself. It builds a
//! `ProxyConfig` and hands it to a `ProxyPlatform`, which reports
//! whether the host accepted it.
//!
//! # Wire shape
//!
//! ```text
//! { "mode": "fixed_servers",
//!   "rules": { "singleProxy": { "scheme": "socks5", "host": "10.0.0.5", "port": 1080 },
//!              "bypassList": ["localhost", "127.0.0.1", "::1", "<local>"] } }
//!
//! { "mode": "direct" }
//! ```

mod detached;
mod gsettings;

pub use detached::DetachedPlatform;
pub use gsettings::GSettingsPlatform;

use crate::config::PlatformKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Addresses that always bypass the proxy
pub const DEFAULT_BYPASS: &[&str] = &["localhost", "127.0.0.1", "::1", LOCAL_NETWORK];

/// Platform shorthand for "hosts without a dot" (local network)
pub const LOCAL_NETWORK: &str = "<local>";

/// Proxy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Socks5,
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Socks5 => write!(f, "socks5"),
        }
    }
}

/// Single upstream proxy server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyServer {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyServer {
    /// `socks5://host:port`
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, crate::state::format_target(&self.host, self.port))
    }
}

/// Routing rules for fixed-server mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRules {
    pub single_proxy: ProxyServer,
    pub bypass_list: Vec<String>,
}

/// Configuration handed to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProxyConfig {
    /// Route through one fixed proxy
    FixedServers { rules: ProxyRules },
    /// No proxy
    Direct,
}

impl ProxyConfig {
    /// SOCKS5 config with the default bypass list plus `extra_bypass`
    pub fn socks5(host: &str, port: u16, extra_bypass: &[String]) -> Self {
        let mut bypass_list: Vec<String> = DEFAULT_BYPASS.iter().map(|s| s.to_string()).collect();
        for entry in extra_bypass {
            if !bypass_list.contains(entry) {
                bypass_list.push(entry.clone());
            }
        }

        ProxyConfig::FixedServers {
            rules: ProxyRules {
                single_proxy: ProxyServer {
                    scheme: ProxyScheme::Socks5,
                    host: host.to_string(),
                    port,
                },
                bypass_list,
            },
        }
    }

    pub fn direct() -> Self {
        ProxyConfig::Direct
    }

    /// Upstream server, if any
    pub fn server(&self) -> Option<&ProxyServer> {
        match self {
            ProxyConfig::FixedServers { rules } => Some(&rules.single_proxy),
            ProxyConfig::Direct => None,
        }
    }
}

/// Something that can apply proxy settings on the host
pub trait ProxyPlatform: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Apply `config`. No retries; an error carries the host's message.
    fn apply(&self, config: &ProxyConfig) -> impl Future<Output = Result<(), PlatformError>> + Send;
}

/// Backend chosen at runtime from configuration
pub enum HostPlatform {
    Detached(DetachedPlatform),
    GSettings(GSettingsPlatform),
}

impl HostPlatform {
    pub fn from_kind(kind: PlatformKind) -> Self {
        match kind {
            PlatformKind::Detached => HostPlatform::Detached(DetachedPlatform::new()),
            PlatformKind::GSettings => {
                if !GSettingsPlatform::is_available() {
                    tracing::warn!("gsettings requested but desktop does not look GNOME-based");
                }
                HostPlatform::GSettings(GSettingsPlatform::new())
            }
        }
    }
}

impl ProxyPlatform for HostPlatform {
    fn name(&self) -> &str {
        match self {
            HostPlatform::Detached(p) => p.name(),
            HostPlatform::GSettings(p) => p.name(),
        }
    }

    async fn apply(&self, config: &ProxyConfig) -> Result<(), PlatformError> {
        match self {
            HostPlatform::Detached(p) => p.apply(config).await,
            HostPlatform::GSettings(p) => p.apply(config).await,
        }
    }
}

/// Platform-reported failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PlatformError {
    pub message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: if message.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                message
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_config_shape() {
        let config = ProxyConfig::socks5("10.0.0.5", 1080, &[]);
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["mode"], "fixed_servers");
        assert_eq!(json["rules"]["singleProxy"]["scheme"], "socks5");
        assert_eq!(json["rules"]["singleProxy"]["host"], "10.0.0.5");
        assert_eq!(json["rules"]["singleProxy"]["port"], 1080);
        assert_eq!(
            json["rules"]["bypassList"],
            serde_json::json!(["localhost", "127.0.0.1", "::1", "<local>"])
        );
    }

    #[test]
    fn test_direct_shape() {
        let json = serde_json::to_value(ProxyConfig::direct()).unwrap();
        assert_eq!(json, serde_json::json!({ "mode": "direct" }));
    }

    #[test]
    fn test_extra_bypass_dedup() {
        let extra = vec!["*.corp".to_string(), "localhost".to_string()];
        let config = ProxyConfig::socks5("h", 1, &extra);

        let ProxyConfig::FixedServers { rules } = config else {
            panic!("expected fixed servers");
        };
        assert_eq!(rules.bypass_list.len(), DEFAULT_BYPASS.len() + 1);
        assert_eq!(rules.bypass_list.last().map(String::as_str), Some("*.corp"));
    }

    #[test]
    fn test_proxy_url() {
        let config = ProxyConfig::socks5("::1", 9999, &[]);
        assert_eq!(config.server().unwrap().url(), "socks5://[::1]:9999");
        assert!(ProxyConfig::direct().server().is_none());
    }

    #[tokio::test]
    async fn test_host_platform_dispatch() {
        let platform = HostPlatform::from_kind(PlatformKind::Detached);
        assert_eq!(platform.name(), "detached");

        platform.apply(&ProxyConfig::direct()).await.unwrap();
        let HostPlatform::Detached(inner) = &platform else {
            panic!("expected detached platform");
        };
        assert_eq!(inner.apply_count(), 1);
    }

    #[test]
    fn test_platform_error_message() {
        assert_eq!(PlatformError::new("port in use").to_string(), "port in use");
        assert_eq!(PlatformError::new("  ").to_string(), "Unknown error");
    }
}
