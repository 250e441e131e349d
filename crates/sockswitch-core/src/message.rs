//! Control Message Protocol
//!
//! JSON messages exchanged between a control surface (or the platform's
//! auth callback) and the controller. Every request gets exactly one
//! response; nothing a caller sends can make the controller fail.
//!
//! | Request        | Response                                   |
//! |----------------|--------------------------------------------|
//! | `UPDATE_PROXY` | `{"status":"success"\|"error","reason"?}`   |
//! | `GET_STATUS`   | full `ProxyState`                          |
//! | `CLEAR_ERROR`  | `{"status":"success"}`                     |
//! | `CLEAR_SAVED`  | `{"status":"success"}`                     |
//! | `AUTH_REQUIRED`| `{"authCredentials":{..}}` or `{}`         |

use crate::auth::{AuthChallenge, AuthResponse};
use crate::controller::{Ack, AckReason, ProxyController};
use crate::intent::ConnectionIntent;
use crate::platform::ProxyPlatform;
use crate::state::ProxyState;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Incoming message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Connect or disconnect
    UpdateProxy { data: ConnectionIntent },
    /// Read the persisted record
    GetStatus,
    /// Drop the recorded error
    ClearError,
    /// Forget saved target and credentials
    ClearSaved,
    /// Platform credential challenge
    AuthRequired {
        #[serde(default)]
        details: AuthChallenge,
    },
}

impl Request {
    /// Parse one JSON message
    pub fn parse(input: &str) -> Result<Self, MessageError> {
        serde_json::from_str(input).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    /// Protocol name of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Request::UpdateProxy { .. } => "UPDATE_PROXY",
            Request::GetStatus => "GET_STATUS",
            Request::ClearError => "CLEAR_ERROR",
            Request::ClearSaved => "CLEAR_SAVED",
            Request::AuthRequired { .. } => "AUTH_REQUIRED",
        }
    }
}

/// Outcome of a state-changing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Why a request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Validation,
    Platform,
    /// Message could not be parsed
    Malformed,
}

impl From<AckReason> for FailureReason {
    fn from(reason: AckReason) -> Self {
        match reason {
            AckReason::Validation => FailureReason::Validation,
            AckReason::Platform => FailureReason::Platform,
        }
    }
}

/// `{"status": ..., "reason": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl StatusReply {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            reason: None,
        }
    }

    pub fn error(reason: FailureReason) -> Self {
        Self {
            status: Status::Error,
            reason: Some(reason),
        }
    }
}

impl From<Ack> for StatusReply {
    fn from(ack: Ack) -> Self {
        match (ack.ok, ack.reason) {
            (true, _) => StatusReply::success(),
            (false, Some(reason)) => StatusReply::error(reason.into()),
            (false, None) => StatusReply::error(FailureReason::Platform),
        }
    }
}

/// Outgoing reply to a `Request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Status(StatusReply),
    State(ProxyState),
    Auth(AuthResponse),
}

impl Response {
    pub fn malformed() -> Self {
        Response::Status(StatusReply::error(FailureReason::Malformed))
    }

    pub fn into_status(self) -> Option<StatusReply> {
        match self {
            Response::Status(reply) => Some(reply),
            _ => None,
        }
    }

    pub fn into_state(self) -> Option<ProxyState> {
        match self {
            Response::State(state) => Some(state),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"status":"error"}"#.to_string())
    }
}

/// Unsolicited notification pushed to a control surface
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    StateChanged { state: ProxyState },
}

impl Event {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Route a request to the controller
pub async fn dispatch<P: ProxyPlatform>(controller: &ProxyController<P>, request: Request) -> Response {
    debug!("Handling {}", request.kind());

    match request {
        Request::UpdateProxy { data } => {
            Response::Status(controller.apply_intent(data).await.into())
        }
        Request::GetStatus => Response::State(controller.get_status().await),
        Request::ClearError => {
            controller.clear_error().await;
            Response::Status(StatusReply::success())
        }
        Request::ClearSaved => {
            controller.clear_saved().await;
            Response::Status(StatusReply::success())
        }
        Request::AuthRequired { details } => {
            Response::Auth(controller.resolve_auth_challenge(&details).await.into())
        }
    }
}

/// Parse and dispatch one raw message
pub async fn handle_raw<P: ProxyPlatform>(controller: &ProxyController<P>, input: &str) -> Response {
    match Request::parse(input) {
        Ok(request) => dispatch(controller, request).await,
        Err(e) => {
            warn!("{}", e);
            Response::malformed()
        }
    }
}

/// Protocol errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed message: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DetachedPlatform;
    use crate::store::StateStore;
    use serde_json::{Value, json};

    fn controller() -> ProxyController<DetachedPlatform> {
        ProxyController::new(DetachedPlatform::new(), StateStore::in_memory())
    }

    async fn send(ctl: &ProxyController<DetachedPlatform>, message: Value) -> Value {
        let reply = handle_raw(ctl, &message.to_string()).await;
        serde_json::from_str(&reply.to_json()).unwrap()
    }

    #[test]
    fn test_parse_requests() {
        let req = Request::parse(r#"{"type":"GET_STATUS"}"#).unwrap();
        assert_eq!(req.kind(), "GET_STATUS");

        let req = Request::parse(
            r#"{"type":"UPDATE_PROXY","data":{"isConnected":true,"host":"h","port":"1080"}}"#,
        )
        .unwrap();
        let Request::UpdateProxy { data } = req else {
            panic!("expected UPDATE_PROXY");
        };
        assert!(data.connect);

        let req = Request::parse(r#"{"type":"AUTH_REQUIRED"}"#).unwrap();
        assert_eq!(req.kind(), "AUTH_REQUIRED");

        assert!(Request::parse(r#"{"type":"REBOOT"}"#).is_err());
        assert!(Request::parse("not json").is_err());
    }

    #[tokio::test]
    async fn test_update_proxy_roundtrip() {
        let ctl = controller();

        let reply = send(
            &ctl,
            json!({
                "type": "UPDATE_PROXY",
                "data": { "isConnected": true, "host": "10.0.0.5", "port": "1080",
                          "username": "alice", "password": "pw" }
            }),
        )
        .await;
        assert_eq!(reply, json!({ "status": "success" }));

        let status = send(&ctl, json!({ "type": "GET_STATUS" })).await;
        assert_eq!(status["isConnected"], true);
        assert_eq!(status["host"], "10.0.0.5");
        assert_eq!(status["port"], 1080);
        assert_eq!(status["username"], "alice");
        assert!(status.get("error").is_none());

        let auth = send(&ctl, json!({ "type": "AUTH_REQUIRED", "details": { "isProxy": true } })).await;
        assert_eq!(
            auth,
            json!({ "authCredentials": { "username": "alice", "password": "pw" } })
        );
    }

    #[tokio::test]
    async fn test_validation_reply() {
        let ctl = controller();

        let reply = send(
            &ctl,
            json!({ "type": "UPDATE_PROXY", "data": { "isConnected": true, "host": "h", "port": 0 } }),
        )
        .await;
        assert_eq!(reply, json!({ "status": "error", "reason": "validation" }));

        let status = send(&ctl, json!({ "type": "GET_STATUS" })).await;
        assert!(status["error"].is_string());

        let reply = send(&ctl, json!({ "type": "CLEAR_ERROR" })).await;
        assert_eq!(reply, json!({ "status": "success" }));

        let status = send(&ctl, json!({ "type": "GET_STATUS" })).await;
        assert!(status.get("error").is_none());
    }

    #[tokio::test]
    async fn test_disconnect_and_site_challenge() {
        let ctl = controller();

        let reply = send(&ctl, json!({ "type": "UPDATE_PROXY", "data": { "isConnected": false } })).await;
        assert_eq!(reply, json!({ "status": "success" }));

        let auth = send(&ctl, json!({ "type": "AUTH_REQUIRED", "details": { "isProxy": false } })).await;
        assert_eq!(auth, json!({}));
    }

    #[tokio::test]
    async fn test_malformed_message() {
        let ctl = controller();

        let reply = send(&ctl, json!({ "type": "UPDATE_PROXY" })).await;
        assert_eq!(reply, json!({ "status": "error", "reason": "malformed" }));
    }

    #[test]
    fn test_state_changed_event() {
        let event = Event::StateChanged {
            state: ProxyState::default(),
        };
        let json: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(json["type"], "STATE_CHANGED");
        assert_eq!(json["state"]["isConnected"], false);
    }
}
