//! State Store
//!
//! Holds the one `ProxyState` record, persists it through a
//! `StateBackend`, and broadcasts every committed change.
//!
//! # Consistency
//!
//! ```text
//! writer:  commit gate ─▶ clone ─▶ mutate ─▶ save (blocking pool) ─▶ swap (write lock) ─▶ broadcast
//! reader:  read lock ─▶ clone
//! ```
//!
//! Readers either see the previous record or the new one, never a mix.
//! The write lock is only held for the swap, never across disk I/O.
//! Only the crate writes; callers get snapshots and change events.

use crate::state::{ProxyState, now_millis};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock, broadcast};
use tracing::{debug, error, info, warn};

/// Change notifications buffered per subscriber
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Persistence for the flat state record
pub trait StateBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Load the record; `None` if nothing was ever written
    fn load(&self) -> Result<Option<ProxyState>, StoreError>;

    /// Replace the stored record
    fn save(&self, state: &ProxyState) -> Result<(), StoreError>;
}

/// Volatile backend, lost on exit
#[derive(Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<ProxyState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record
    pub fn with_state(state: ProxyState) -> Self {
        Self {
            saved: Mutex::new(Some(state)),
        }
    }
}

impl StateBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> Result<Option<ProxyState>, StoreError> {
        let saved = self.saved.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(saved.clone())
    }

    fn save(&self, state: &ProxyState) -> Result<(), StoreError> {
        let mut saved = self.saved.lock().map_err(|_| StoreError::Poisoned)?;
        *saved = Some(state.clone());
        Ok(())
    }
}

/// JSON file backend
///
/// Writes go to a sibling temp file and are renamed into place, so a
/// crash mid-write leaves the previous record intact.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateBackend for JsonFileBackend {
    fn name(&self) -> &str {
        "json-file"
    }

    fn load(&self) -> Result<Option<ProxyState>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn save(&self, state: &ProxyState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// A committed change, as seen by subscribers
#[derive(Debug, Clone)]
pub struct StateChange {
    pub previous: ProxyState,
    pub current: ProxyState,
}

impl StateChange {
    pub fn connection_changed(&self) -> bool {
        self.previous.is_connected != self.current.is_connected
    }
}

/// Single-writer record store
pub struct StateStore {
    backend: Arc<dyn StateBackend>,
    state: RwLock<ProxyState>,
    commit_gate: AsyncMutex<()>,
    changes: broadcast::Sender<StateChange>,
}

impl StateStore {
    /// Open a store, loading whatever the backend holds
    pub fn open(backend: Box<dyn StateBackend>) -> Result<Self, StoreError> {
        let state = backend.load()?.unwrap_or_default();
        info!(
            "Opened {} state store (connected: {})",
            backend.name(),
            state.is_connected
        );

        Ok(Self::from_parts(backend, state))
    }

    /// Open a store, starting empty if the stored record is unreadable
    pub fn open_or_reset(backend: Box<dyn StateBackend>) -> Self {
        match backend.load() {
            Ok(state) => Self::from_parts(backend, state.unwrap_or_default()),
            Err(e) => {
                warn!("Discarding unreadable {} state: {}", backend.name(), e);
                Self::from_parts(backend, ProxyState::default())
            }
        }
    }

    /// Memory-backed store starting from the default record
    pub fn in_memory() -> Self {
        Self::from_parts(Box::new(MemoryBackend::new()), ProxyState::default())
    }

    fn from_parts(backend: Box<dyn StateBackend>, state: ProxyState) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend: Arc::from(backend),
            state: RwLock::new(state),
            commit_gate: AsyncMutex::new(()),
            changes,
        }
    }

    /// Copy of the current record
    pub async fn snapshot(&self) -> ProxyState {
        self.state.read().await.clone()
    }

    /// Subscribe to committed changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Apply `mutate` to a copy of the record and commit it.
    ///
    /// A no-op mutation is not written and not broadcast. Backend
    /// failures are logged; the in-memory record is committed anyway.
    pub(crate) async fn commit<F>(&self, mutate: F) -> ProxyState
    where
        F: FnOnce(&mut ProxyState),
    {
        let _commit = self.commit_gate.lock().await;

        let current = self.snapshot().await;
        let mut next = current.clone();
        mutate(&mut next);
        if next == current {
            return next;
        }
        next.timestamp = now_millis().max(current.timestamp);

        self.persist(&next).await;

        let previous = std::mem::replace(&mut *self.state.write().await, next.clone());

        debug!("State committed: {:?}", next);
        // No subscribers is fine
        let _ = self.changes.send(StateChange {
            previous,
            current: next.clone(),
        });

        next
    }

    /// Save on the blocking pool, outside the record lock
    async fn persist(&self, state: &ProxyState) {
        let backend = Arc::clone(&self.backend);
        let record = state.clone();

        match tokio::task::spawn_blocking(move || backend.save(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to persist proxy state to {}: {}", self.backend.name(), e)
            }
            Err(e) => error!("State save task failed: {}", e),
        }
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt state record: {0}")]
    Corrupt(String),

    #[error("State lock poisoned")]
    Poisoned,
}
