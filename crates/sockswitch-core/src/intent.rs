//! Connection Intent
//!
//! What the control surface asks for. Never stored as-is: a connect
//! intent is validated into a `ProxyTarget` first.

use crate::state::Credentials;
use serde::{Deserialize, Serialize};

/// Lowest valid proxy port
pub const MIN_PORT: u32 = 1;
/// Highest valid proxy port
pub const MAX_PORT: u32 = 65535;

/// Port as supplied by the caller: a number, or whatever was typed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortInput {
    Number(i64),
    Text(String),
}

impl PortInput {
    /// Parse into a port in `[1, 65535]`
    pub fn parse(&self) -> Result<u16, ValidationError> {
        let value = match self {
            PortInput::Number(n) => *n,
            PortInput::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::MissingPort);
                }
                trimmed
                    .parse::<i64>()
                    .map_err(|_| ValidationError::NonNumericPort(trimmed.to_string()))?
            }
        };

        if value < MIN_PORT as i64 || value > MAX_PORT as i64 {
            return Err(ValidationError::PortOutOfRange(value));
        }
        Ok(value as u16)
    }
}

impl From<u16> for PortInput {
    fn from(port: u16) -> Self {
        PortInput::Number(port as i64)
    }
}

impl From<&str> for PortInput {
    fn from(port: &str) -> Self {
        PortInput::Text(port.to_string())
    }
}

/// User intent: connect to a proxy, or go direct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIntent {
    /// `true` to connect, `false` to disconnect
    #[serde(rename = "isConnected", default)]
    pub connect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionIntent {
    /// Intent to connect to `host:port` without credentials
    pub fn connect(host: impl Into<String>, port: u16) -> Self {
        Self::connect_raw(host, PortInput::from(port))
    }

    /// Same as `connect`, with the port exactly as the user supplied it
    pub fn connect_raw(host: impl Into<String>, port: PortInput) -> Self {
        Self {
            connect: true,
            host: Some(host.into()),
            port: Some(port),
            username: None,
            password: None,
        }
    }

    /// Intent to revert to direct connectivity
    pub fn disconnect() -> Self {
        Self::default()
    }

    /// Attach credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Validate a connect intent into a target
    pub fn validate(&self) -> Result<ProxyTarget, ValidationError> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(ValidationError::MissingHost)?;

        let port = self
            .port
            .as_ref()
            .ok_or(ValidationError::MissingPort)?
            .parse()?;

        Ok(ProxyTarget {
            host: host.to_string(),
            port,
            credentials: Credentials {
                username: self.username.clone().unwrap_or_default(),
                password: self.password.clone().unwrap_or_default(),
            },
        })
    }
}

/// A validated connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
    /// May be empty; empty credentials are never offered to a challenge
    pub credentials: Credentials,
}

/// Validation errors (raised before any platform call)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid host or port: host is required")]
    MissingHost,

    #[error("Invalid host or port: port is required")]
    MissingPort,

    #[error("Invalid host or port: port '{0}' is not a number")]
    NonNumericPort(String),

    #[error("Invalid host or port: port must be between 1 and 65535 (got {0})")]
    PortOutOfRange(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_intent() {
        let intent = ConnectionIntent::connect(" 10.0.0.5 ", 1080).with_credentials("alice", "pw");
        let target = intent.validate().unwrap();

        assert_eq!(target.host, "10.0.0.5");
        assert_eq!(target.port, 1080);
        assert_eq!(target.credentials.username, "alice");
        assert_eq!(target.credentials.password, "pw");
    }

    #[test]
    fn test_port_bounds() {
        assert_eq!(PortInput::Number(1).parse(), Ok(1));
        assert_eq!(PortInput::Number(65535).parse(), Ok(65535));
        assert_eq!(PortInput::Number(0).parse(), Err(ValidationError::PortOutOfRange(0)));
        assert_eq!(
            PortInput::Number(65536).parse(),
            Err(ValidationError::PortOutOfRange(65536))
        );
        assert_eq!(PortInput::Number(-1).parse(), Err(ValidationError::PortOutOfRange(-1)));
    }

    #[test]
    fn test_text_port() {
        assert_eq!(PortInput::from(" 9999 ").parse(), Ok(9999));
        assert_eq!(PortInput::from("").parse(), Err(ValidationError::MissingPort));
        assert!(matches!(
            PortInput::from("abc").parse(),
            Err(ValidationError::NonNumericPort(_))
        ));
        assert!(matches!(
            PortInput::from("80x").parse(),
            Err(ValidationError::NonNumericPort(_))
        ));
    }

    #[test]
    fn test_missing_host() {
        let intent = ConnectionIntent::connect("   ", 1080);
        assert_eq!(intent.validate(), Err(ValidationError::MissingHost));

        let intent = ConnectionIntent {
            connect: true,
            port: Some(PortInput::Number(1080)),
            ..Default::default()
        };
        assert_eq!(intent.validate(), Err(ValidationError::MissingHost));
    }

    #[test]
    fn test_wire_format() {
        let intent: ConnectionIntent = serde_json::from_str(
            r#"{"isConnected":true,"host":"h","port":"1080","username":"u","password":"p"}"#,
        )
        .unwrap();

        assert!(intent.connect);
        assert_eq!(intent.port, Some(PortInput::Text("1080".into())));

        let numeric: ConnectionIntent =
            serde_json::from_str(r#"{"isConnected":true,"host":"h","port":1080}"#).unwrap();
        assert_eq!(numeric.port, Some(PortInput::Number(1080)));

        let off: ConnectionIntent = serde_json::from_str(r#"{"isConnected":false}"#).unwrap();
        assert_eq!(off, ConnectionIntent::disconnect());
    }
}
