//! GNOME desktop proxy via `gsettings`
//!
//! Sets `org.gnome.system.proxy` to manual mode with a SOCKS host, or
//! back to `none` for direct. The HTTP, HTTPS and FTP proxies are
//! emptied so only the SOCKS endpoint is used. A failed write restores
//! every key already written. Applies to every GNOME-based desktop
//! (GNOME, Unity, Cinnamon, MATE, Budgie, Pantheon) and to browsers
//! that follow the system proxy.

use super::{LOCAL_NETWORK, PlatformError, ProxyConfig, ProxyPlatform};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

const PROXY_SCHEMA: &str = "org.gnome.system.proxy";
const SOCKS_SCHEMA: &str = "org.gnome.system.proxy.socks";

/// Protocol schemas emptied when the SOCKS proxy is set
const CLEARED_PROTOCOLS: &[&str] = &["http", "https", "ftp"];

/// Desktops known to honour the GNOME proxy schema
const GNOME_DESKTOPS: &[&str] = &[
    "GNOME",
    "Unity",
    "Cinnamon",
    "X-Cinnamon",
    "MATE",
    "Budgie",
    "Pantheon",
];

pub struct GSettingsPlatform {
    program: String,
}

impl GSettingsPlatform {
    pub fn new() -> Self {
        Self::with_program("gsettings")
    }

    /// Use a different `gsettings` binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Does the current session look like a GNOME-based desktop?
    pub fn is_available() -> bool {
        let desktop = std::env::var("XDG_CURRENT_DESKTOP").unwrap_or_default();
        desktop.split(':').any(|d| GNOME_DESKTOPS.contains(&d))
    }

    async fn run(&self, args: &[&str]) -> Result<String, PlatformError> {
        debug!("{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| PlatformError::new(format!("Failed to run {}: {}", self.program, e)))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() {
            format!("{} {} exited with {}", self.program, args.join(" "), output.status)
        } else {
            stderr.trim().to_string()
        };
        Err(PlatformError::new(message))
    }

    async fn get(&self, schema: &str, key: &str) -> Result<String, PlatformError> {
        self.run(&["get", schema, key]).await
    }

    async fn set(&self, setting: &Setting) -> Result<(), PlatformError> {
        self.run(&["set", setting.schema.as_str(), setting.key, setting.value.as_str()])
            .await
            .map(|_| ())
            .inspect_err(|e| warn!("gsettings rejected {}.{}: {}", setting.schema, setting.key, e))
    }

    /// Write every setting, or none of them.
    ///
    /// Current values are read first; if any write fails, the keys
    /// already written are put back.
    async fn write_all(&self, settings: &[Setting]) -> Result<(), PlatformError> {
        let mut previous = Vec::with_capacity(settings.len());
        for setting in settings {
            let value = self.get(&setting.schema, setting.key).await?;
            previous.push(Setting {
                value,
                ..setting.clone()
            });
        }

        for (written, setting) in settings.iter().enumerate() {
            if let Err(e) = self.set(setting).await {
                self.restore(&previous[..written]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn restore(&self, previous: &[Setting]) {
        warn!("GSettings: restoring {} proxy setting(s)", previous.len());
        for setting in previous.iter().rev() {
            if let Err(e) = self.set(setting).await {
                error!("Failed to restore {}.{}: {}", setting.schema, setting.key, e);
            }
        }
    }
}

impl Default for GSettingsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyPlatform for GSettingsPlatform {
    fn name(&self) -> &str {
        "gsettings"
    }

    async fn apply(&self, config: &ProxyConfig) -> Result<(), PlatformError> {
        match config.server() {
            Some(server) => {
                info!("GSettings: setting SOCKS5 proxy to {}:{}", server.host, server.port)
            }
            None => info!("GSettings: clearing proxy settings"),
        }
        self.write_all(&settings_for(config)).await
    }
}

/// One `gsettings set` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
struct Setting {
    schema: String,
    key: &'static str,
    value: String,
}

impl Setting {
    fn new(schema: &str, key: &'static str, value: impl Into<String>) -> Self {
        Self {
            schema: schema.to_string(),
            key,
            value: value.into(),
        }
    }
}

/// Keys to write, in order. Mode goes last.
fn settings_for(config: &ProxyConfig) -> Vec<Setting> {
    let ProxyConfig::FixedServers { rules } = config else {
        return vec![Setting::new(PROXY_SCHEMA, "mode", "none")];
    };

    let server = &rules.single_proxy;
    let mut settings = vec![
        Setting::new(SOCKS_SCHEMA, "host", server.host.as_str()),
        Setting::new(SOCKS_SCHEMA, "port", server.port.to_string()),
    ];

    // Other protocols would otherwise keep their own proxy in manual mode
    for protocol in CLEARED_PROTOCOLS {
        let schema = format!("{}.{}", PROXY_SCHEMA, protocol);
        settings.push(Setting::new(&schema, "host", ""));
        settings.push(Setting::new(&schema, "port", "0"));
    }

    settings.push(Setting::new(PROXY_SCHEMA, "use-same-proxy", "false"));
    settings.push(Setting::new(
        PROXY_SCHEMA,
        "ignore-hosts",
        ignore_hosts(&rules.bypass_list),
    ));
    settings.push(Setting::new(PROXY_SCHEMA, "mode", "manual"));
    settings
}

/// Render a bypass list as a GVariant string array.
///
/// GNOME has no equivalent of the local-network shorthand, so it is dropped.
fn ignore_hosts(bypass: &[String]) -> String {
    let entries: Vec<String> = bypass
        .iter()
        .filter(|h| h.as_str() != LOCAL_NETWORK)
        .map(|h| format!("'{}'", h.replace('\'', "")))
        .collect();
    format!("[{}]", entries.join(", "))
}
