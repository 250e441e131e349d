//! Persisted Proxy State
//!
//! The single record describing what the controller last committed.
//! Field names match the flat key-value layout used on disk and on the
//! wire (`isConnected`, `host`, `port`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Proxy connection record
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyState {
    /// Whether the platform accepted our proxy configuration
    pub is_connected: bool,
    /// Proxy host of the last successful connect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Proxy port of the last successful connect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Stored verbatim, kept across disconnect
    pub username: String,
    /// Stored verbatim, kept across disconnect
    pub password: String,
    /// Human-readable failure of the last operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last write time (ms since Unix epoch)
    pub timestamp: u64,
}

impl ProxyState {
    /// `host:port` of the committed target, if any
    pub fn target(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some(format_target(host, port)),
            _ => None,
        }
    }

    /// Stored credentials, if both halves are present
    pub fn credentials(&self) -> Option<Credentials> {
        if self.username.is_empty() || self.password.is_empty() {
            return None;
        }
        Some(Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

// Keep secrets out of logs.
impl fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyState")
            .field("is_connected", &self.is_connected)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("error", &self.error)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Username/password pair handed to the platform on a proxy challenge
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "<redacted>" }
}

/// Format a target, bracketing bare IPv6 literals
pub fn format_target(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
