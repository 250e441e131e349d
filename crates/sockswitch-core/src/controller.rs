//! Proxy Controller
//!
//! Turns connection intents into platform proxy settings and keeps the
//! persisted `ProxyState` in step with what the platform accepted.
//!
//! # Usage
//!
//! ```rust,ignore
//! let controller = ProxyController::new(DetachedPlatform::new(), StateStore::in_memory());
//!
//! let ack = controller
//!     .apply_intent(ConnectionIntent::connect("10.0.0.5", 1080).with_credentials("alice", "pw"))
//!     .await;
//! assert!(ack.ok);
//!
//! // Platform callback when the proxy asks for credentials
//! let creds = controller.resolve_auth_challenge(&AuthChallenge::proxy()).await;
//! ```
//!
//! # States
//!
//! ```text
//!                 connect ok
//!  Disconnected ─────────────▶ Connected ──┐ connect ok (new target)
//!       ▲                          │  ◀────┘
//!       └──────── disconnect ──────┘
//! ```
//!
//! Failures never change the connection state on their own: they are
//! recorded in `error` and the last committed target stays in place.
//! Disconnect is the exception, it always lands in Disconnected.

use crate::auth::{AuthChallenge, AuthResponder};
use crate::intent::{ConnectionIntent, ProxyTarget, ValidationError};
use crate::platform::{PlatformError, ProxyConfig, ProxyPlatform};
use crate::state::{Credentials, ProxyState};
use crate::store::{StateChange, StateStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

/// Why an intent was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckReason {
    /// Host or port rejected before any platform call
    Validation,
    /// Platform refused the configuration
    Platform,
}

/// Acknowledgment returned for every intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
    pub reason: Option<AckReason>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true, reason: None }
    }

    pub fn rejected(reason: AckReason) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

/// Controller errors (recorded, never propagated to callers)
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControllerError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    PlatformApply(PlatformError),

    #[error("Failed to disable proxy: {0}")]
    PlatformRevert(PlatformError),
}

impl ControllerError {
    pub fn reason(&self) -> AckReason {
        match self {
            ControllerError::Validation(_) => AckReason::Validation,
            ControllerError::PlatformApply(_) | ControllerError::PlatformRevert(_) => {
                AckReason::Platform
            }
        }
    }
}

/// Proxy Controller
///
/// Owns the state store. Writes are serialized through `write_gate`,
/// held across the platform call; reads go straight to the store.
pub struct ProxyController<P: ProxyPlatform> {
    /// Host proxy settings
    platform: P,
    /// Persisted record
    store: Arc<StateStore>,
    /// One writer at a time
    write_gate: Mutex<()>,
    /// Appended to the default bypass list
    extra_bypass: Vec<String>,
}

impl<P: ProxyPlatform> ProxyController<P> {
    pub fn new(platform: P, store: StateStore) -> Self {
        Self {
            platform,
            store: Arc::new(store),
            write_gate: Mutex::new(()),
            extra_bypass: Vec::new(),
        }
    }

    /// Additional bypass entries for every connect
    pub fn with_extra_bypass(mut self, extra_bypass: Vec<String>) -> Self {
        self.extra_bypass = extra_bypass;
        self
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Apply a connect or disconnect intent
    pub async fn apply_intent(&self, intent: ConnectionIntent) -> Ack {
        let _writer = self.write_gate.lock().await;

        if intent.connect {
            self.connect(&intent).await
        } else {
            self.disconnect().await
        }
    }

    async fn connect(&self, intent: &ConnectionIntent) -> Ack {
        let target = match intent.validate() {
            Ok(target) => target,
            Err(e) => return self.fail(ControllerError::Validation(e)).await,
        };

        let config = ProxyConfig::socks5(&target.host, target.port, &self.extra_bypass);
        debug!("Applying {:?} via {}", config, self.platform.name());

        if let Err(e) = self.platform.apply(&config).await {
            return self.fail(ControllerError::PlatformApply(e)).await;
        }

        info!("Proxy enabled: {}:{}", target.host, target.port);
        let ProxyTarget {
            host,
            port,
            credentials,
        } = target;

        self.store
            .commit(|s| {
                s.is_connected = true;
                s.host = Some(host);
                s.port = Some(port);
                s.username = credentials.username;
                s.password = credentials.password;
                s.error = None;
            })
            .await;

        Ack::ok()
    }

    async fn disconnect(&self) -> Ack {
        let result = self.platform.apply(&ProxyConfig::direct()).await;

        // Local state follows the request even if the platform refused.
        let error = match result {
            Ok(()) => {
                info!("Proxy disabled");
                None
            }
            Err(e) => {
                let err = ControllerError::PlatformRevert(e);
                error!("{}", err);
                Some(err.to_string())
            }
        };

        self.store
            .commit(|s| {
                s.is_connected = false;
                s.error = error;
            })
            .await;

        Ack::ok()
    }

    /// Record `err` and build the matching rejection
    async fn fail(&self, err: ControllerError) -> Ack {
        warn!("Connect rejected: {}", err);
        let message = err.to_string();
        self.store.commit(|s| s.error = Some(message)).await;
        Ack::rejected(err.reason())
    }

    /// Snapshot of the persisted record
    pub async fn get_status(&self) -> ProxyState {
        self.store.snapshot().await
    }

    /// Drop the recorded error, nothing else
    pub async fn clear_error(&self) {
        let _writer = self.write_gate.lock().await;
        self.store.commit(|s| s.error = None).await;
    }

    /// Forget the saved target and credentials (and any error).
    ///
    /// The connection flag is left alone: the platform is not touched.
    pub async fn clear_saved(&self) {
        let _writer = self.write_gate.lock().await;
        info!("Clearing saved proxy settings");
        self.store
            .commit(|s| {
                s.host = None;
                s.port = None;
                s.username.clear();
                s.password.clear();
                s.error = None;
            })
            .await;
    }

    /// Answer a platform credential challenge
    pub async fn resolve_auth_challenge(&self, challenge: &AuthChallenge) -> Option<Credentials> {
        self.auth_responder().resolve(challenge).await
    }

    /// Handle for answering challenges without borrowing the controller
    pub fn auth_responder(&self) -> AuthResponder {
        AuthResponder::new(self.store.clone())
    }

    /// Subscribe to persisted-state changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.store.subscribe()
    }
}
