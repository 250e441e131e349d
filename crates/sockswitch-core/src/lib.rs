//! sockswitch core - SOCKS5 proxy controller
//!
//! Decides which proxy configuration should be active, applies it
//! through the host platform, persists the result, and answers the
//! platform's proxy credential challenges.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐ Request  ┌──────────────────────────────────────────┐
//! │ Control Surface│─────────▶│             ProxyController              │
//! │  (CLI / popup) │◀─────────│                                          │
//! └───────▲────────┘ Response │  validate ─▶ ProxyPlatform ─▶ StateStore │
//!         │                   │               (apply/revert)   │         │
//!         │ StateChange       └────────────────────────────────│─────────┘
//!         └────────────────────────────────────────────────────┤
//!                                                              │ snapshot
//! ┌────────────────┐ AuthChallenge ┌───────────────┐           │
//! │ Host platform  │──────────────▶│ AuthResponder │◀──────────┘
//! │ (network stack)│◀──────────────│               │
//! └────────────────┘  Credentials? └───────────────┘
//! ```
//!
//! # Guarantees
//!
//! - One writer at a time; the platform call happens inside the write
//! - Readers never wait for a writer and never see a half-written record
//! - Every request is answered; failures end up in `ProxyState::error`
//! - Credentials are only offered to proxy challenges while connected

mod auth;
mod config;
mod controller;
mod intent;
mod message;
mod platform;
mod state;
mod store;

pub use auth::{AuthChallenge, AuthResponder, AuthResponse, credentials_for};
pub use config::{ConfigError, DEFAULT_PROXY_PORT, PlatformKind, SwitchConfig};
pub use controller::{Ack, AckReason, ControllerError, ProxyController};
pub use intent::{ConnectionIntent, PortInput, ProxyTarget, ValidationError};
pub use message::{
    Event, FailureReason, MessageError, Request, Response, Status, StatusReply, dispatch,
    handle_raw,
};
pub use platform::{
    DEFAULT_BYPASS, DetachedPlatform, GSettingsPlatform, HostPlatform, LOCAL_NETWORK,
    PlatformError, ProxyConfig, ProxyPlatform, ProxyRules, ProxyScheme, ProxyServer,
};
pub use state::{Credentials, ProxyState};
pub use store::{JsonFileBackend, MemoryBackend, StateBackend, StateChange, StateStore, StoreError};
