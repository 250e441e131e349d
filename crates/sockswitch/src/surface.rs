//! Control surface: turns user input into intents and state into text.

use crate::cli::ConnectArgs;
use sockswitch_core::{ConnectionIntent, FailureReason, PortInput, ProxyState, StatusReply, Status};
use std::fmt;

/// Rendered connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub connected: bool,
    /// `To: host:port`, only while connected
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl StatusView {
    pub fn from_state(state: &ProxyState) -> Self {
        let detail = state.is_connected.then(|| {
            let host = state.host.as_deref().unwrap_or("?");
            let port = state
                .port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            format!("To: {}:{}", host, port)
        });

        Self {
            connected: state.is_connected,
            detail,
            error: state.error.clone(),
        }
    }

    pub fn headline(&self) -> &'static str {
        if self.connected { "Connected" } else { "Disconnected" }
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status: {}", self.headline())?;
        if let Some(detail) = &self.detail {
            write!(f, "\n{}", detail)?;
        }
        if let Some(error) = &self.error {
            write!(f, "\nError: {}", error)?;
        }
        Ok(())
    }
}

/// Build a connect intent, filling gaps from the saved state
pub fn connect_intent(args: &ConnectArgs, saved: &ProxyState, default_port: u16) -> ConnectionIntent {
    let host = args
        .host
        .as_deref()
        .map(str::trim)
        .map(str::to_string)
        .or_else(|| saved.host.clone());

    let port = match &args.port {
        Some(port) => PortInput::Text(port.trim().to_string()),
        None => saved.port.unwrap_or(default_port).into(),
    };

    let username = args
        .username
        .as_deref()
        .map(str::trim)
        .map(str::to_string)
        .or_else(|| non_empty(&saved.username));
    let password = args
        .password
        .as_deref()
        .map(str::trim)
        .map(str::to_string)
        .or_else(|| non_empty(&saved.password));

    ConnectionIntent {
        connect: true,
        host,
        port: Some(port),
        username,
        password,
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// One-line summary of a failed reply
pub fn failure_message(reply: &StatusReply) -> Option<&'static str> {
    if reply.status == Status::Success {
        return None;
    }
    Some(match reply.reason {
        Some(FailureReason::Validation) => "Invalid host or port",
        Some(FailureReason::Malformed) => "Request was not understood",
        Some(FailureReason::Platform) | None => "Failed to apply proxy settings",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved() -> ProxyState {
        ProxyState {
            is_connected: false,
            host: Some("10.0.0.5".into()),
            port: Some(1080),
            username: "alice".into(),
            password: "pw".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_connected_view() {
        let mut state = saved();
        state.is_connected = true;

        let view = StatusView::from_state(&state);
        assert_eq!(view.headline(), "Connected");
        assert_eq!(view.to_string(), "Status: Connected\nTo: 10.0.0.5:1080");
    }

    #[test]
    fn test_disconnected_view_with_error() {
        let mut state = saved();
        state.error = Some("port in use".into());

        let view = StatusView::from_state(&state);
        assert!(view.detail.is_none());
        assert_eq!(view.to_string(), "Status: Disconnected\nError: port in use");
    }

    #[test]
    fn test_connected_without_target() {
        let state = ProxyState {
            is_connected: true,
            ..Default::default()
        };
        assert_eq!(StatusView::from_state(&state).detail.as_deref(), Some("To: ?:?"));
    }

    #[test]
    fn test_intent_prefills_from_saved() {
        let intent = connect_intent(&ConnectArgs::default(), &saved(), 9999);

        assert!(intent.connect);
        assert_eq!(intent.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(intent.port, Some(PortInput::Number(1080)));
        assert_eq!(intent.username.as_deref(), Some("alice"));
        assert_eq!(intent.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_intent_args_win() {
        let args = ConnectArgs {
            host: Some(" proxy.local ".into()),
            port: Some("2080".into()),
            username: Some("bob".into()),
            password: None,
        };
        let intent = connect_intent(&args, &ProxyState::default(), 9999);

        assert_eq!(intent.host.as_deref(), Some("proxy.local"));
        assert_eq!(intent.port, Some(PortInput::Text("2080".into())));
        assert_eq!(intent.username.as_deref(), Some("bob"));
        assert!(intent.password.is_none());
    }

    #[test]
    fn test_intent_default_port() {
        let intent = connect_intent(&ConnectArgs::default(), &ProxyState::default(), 9999);

        assert!(intent.host.is_none());
        assert_eq!(intent.port, Some(PortInput::Number(9999)));
    }

    #[test]
    fn test_failure_message() {
        assert!(failure_message(&StatusReply::success()).is_none());
        assert_eq!(
            failure_message(&StatusReply::error(FailureReason::Validation)),
            Some("Invalid host or port")
        );
    }
}
