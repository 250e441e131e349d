//! Proxy Authentication Responder
//!
//! Answers the platform's "credentials required" callback from the
//! persisted record. Only reads the store; never waits on the
//! controller's write gate, so a challenge arriving while a connect is
//! in flight is answered from the previous record.
//!
//! There is no error path: anything short of a proxy challenge with a
//! connected record and complete credentials resolves to "no
//! credentials", and the platform falls back to its default handling.

use crate::state::{Credentials, ProxyState};
use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Credential request delivered by the platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// Challenge came from the proxy, not from a site
    #[serde(default)]
    pub is_proxy: bool,
    /// `host:port` that issued the challenge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl AuthChallenge {
    pub fn proxy() -> Self {
        Self {
            is_proxy: true,
            ..Default::default()
        }
    }

    pub fn site() -> Self {
        Self::default()
    }
}

/// Answer to an `AuthChallenge`; serializes to `{}` for pass-through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_credentials: Option<Credentials>,
}

impl From<Option<Credentials>> for AuthResponse {
    fn from(auth_credentials: Option<Credentials>) -> Self {
        Self { auth_credentials }
    }
}

/// Credentials `state` offers for `challenge`, if any
pub fn credentials_for(state: &ProxyState, challenge: &AuthChallenge) -> Option<Credentials> {
    if !state.is_connected || !challenge.is_proxy {
        return None;
    }
    state.credentials()
}

/// Cloneable read-only handle for answering challenges
#[derive(Clone)]
pub struct AuthResponder {
    store: Arc<StateStore>,
}

impl AuthResponder {
    pub(crate) fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Resolve a challenge against the current record
    pub async fn resolve(&self, challenge: &AuthChallenge) -> Option<Credentials> {
        let state = self.store.snapshot().await;
        let credentials = credentials_for(&state, challenge);

        if credentials.is_some() {
            debug!("Providing SOCKS5 credentials for {:?}", challenge.challenger);
        } else {
            debug!(
                "No credentials for challenge (proxy: {}, connected: {})",
                challenge.is_proxy, state.is_connected
            );
        }
        credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(username: &str, password: &str) -> ProxyState {
        ProxyState {
            is_connected: true,
            host: Some("10.0.0.5".into()),
            port: Some(1080),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_proxy_challenge_when_connected() {
        let creds = credentials_for(&connected("alice", "pw"), &AuthChallenge::proxy()).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "pw");
    }

    #[test]
    fn test_disconnected_never_answers() {
        let mut state = connected("alice", "pw");
        state.is_connected = false;

        assert!(credentials_for(&state, &AuthChallenge::proxy()).is_none());
        assert!(credentials_for(&state, &AuthChallenge::site()).is_none());
    }

    #[test]
    fn test_site_challenge_passes_through() {
        assert!(credentials_for(&connected("alice", "pw"), &AuthChallenge::site()).is_none());
    }

    #[test]
    fn test_incomplete_credentials() {
        assert!(credentials_for(&connected("", "pw"), &AuthChallenge::proxy()).is_none());
        assert!(credentials_for(&connected("alice", ""), &AuthChallenge::proxy()).is_none());
    }

    #[test]
    fn test_response_wire_format() {
        let empty = serde_json::to_value(AuthResponse::default()).unwrap();
        assert_eq!(empty, serde_json::json!({}));

        let filled = serde_json::to_value(AuthResponse::from(Some(Credentials {
            username: "alice".into(),
            password: "pw".into(),
        })))
        .unwrap();
        assert_eq!(
            filled,
            serde_json::json!({ "authCredentials": { "username": "alice", "password": "pw" } })
        );
    }

    #[tokio::test]
    async fn test_responder_reads_store() {
        let store = Arc::new(StateStore::in_memory());
        let responder = AuthResponder::new(store.clone());
        assert!(responder.resolve(&AuthChallenge::proxy()).await.is_none());

        store
            .commit(|s| {
                s.is_connected = true;
                s.username = "alice".into();
                s.password = "pw".into();
            })
            .await;

        let creds = responder.resolve(&AuthChallenge::proxy()).await.unwrap();
        assert_eq!(creds.username, "alice");
    }
}
