//! API key lifecycle: resolution, validation, persistence and invalidation.
//!
//! The key is never cached between calls. Every [`KeyManager::resolve`]
//! re-reads its sources so a rotated key is picked up on the next request.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{Result, StudioError};
use crate::storage::KeyValueStore;

/// Storage slot holding the user-entered key.
pub const CREDENTIAL_SLOT: &str = "_sv_api_key_";

/// An opaque API key. `Debug` prints only a fingerprint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() { None } else { Some(Self(value)) }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 8 hex chars of the sha256 digest, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

/// Reversible obfuscation for the persisted copy. This is not encryption:
/// anyone with access to the store can recover the key.
pub fn encode_for_storage(credential: &Credential) -> String {
    base64::engine::general_purpose::STANDARD.encode(credential.expose().as_bytes())
}

pub fn decode_from_storage(raw: &str) -> Option<Credential> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .ok()?;
    let text = String::from_utf8(bytes).ok()?;
    Credential::new(text)
}

/// Round trip that tells whether a candidate key works.
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    async fn probe(&self, candidate: &Credential) -> bool;
}

/// Host-provided key picker. The host gives no synchronous confirmation
/// that a selection happened.
#[async_trait]
pub trait HostKeySelector: Send + Sync {
    async fn has_selected_key(&self) -> bool;

    async fn open_select_key(&self) -> Result<()>;

    /// The key the host currently injects, if any.
    async fn selected_key(&self) -> Option<Credential>;
}

/// Host integration backed by a dotenv-format file the host writes the
/// selected key into, plus an optional command that opens its picker.
#[derive(Debug, Clone)]
pub struct EnvFileHost {
    path: PathBuf,
    var_name: String,
    select_command: Option<String>,
}

impl EnvFileHost {
    pub fn new(path: PathBuf, select_command: Option<String>) -> Self {
        Self {
            path,
            var_name: "API_KEY".to_string(),
            select_command,
        }
    }

    fn read_key(&self) -> Option<Credential> {
        let iter = dotenvy::from_path_iter(&self.path).ok()?;
        iter.filter_map(|item| item.ok())
            .find(|(name, _)| name == &self.var_name)
            .and_then(|(_, value)| Credential::new(value))
    }
}

#[async_trait]
impl HostKeySelector for EnvFileHost {
    async fn has_selected_key(&self) -> bool {
        self.read_key().is_some()
    }

    async fn open_select_key(&self) -> Result<()> {
        let Some(command) = self.select_command.as_deref() else {
            return Err(StudioError::InvalidInput(
                "host key selection is not available".into(),
            ));
        };
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| StudioError::InvalidInput("empty host select command".into()))?;
        // Launch and return; the picker reports nothing back.
        tokio::process::Command::new(program)
            .args(parts)
            .spawn()
            .map_err(|err| StudioError::Unknown(format!("failed to open key picker: {err}")))?;
        Ok(())
    }

    async fn selected_key(&self) -> Option<Credential> {
        self.read_key()
    }
}

/// Where the active key comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    Local,
    Host,
}

/// Owns key resolution and the ready/offline state.
pub struct KeyManager {
    store: Arc<dyn KeyValueStore>,
    env_credential: Option<Credential>,
    host: Option<Arc<dyn HostKeySelector>>,
    probe: Arc<dyn CredentialProbe>,
    // Set by invalidate(): suppresses non-persisted sources until a new key is activated.
    invalidated: AtomicBool,
    // Optimistic readiness after a host selection.
    host_activated: AtomicBool,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyValueStore>, probe: Arc<dyn CredentialProbe>) -> Self {
        Self {
            store,
            env_credential: None,
            host: None,
            probe,
            invalidated: AtomicBool::new(false),
            host_activated: AtomicBool::new(false),
        }
    }

    pub fn with_env_credential(mut self, credential: Option<Credential>) -> Self {
        self.env_credential = credential;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostKeySelector>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn mode(&self) -> KeyMode {
        if self.host.is_some() {
            KeyMode::Host
        } else {
            KeyMode::Local
        }
    }

    /// Persisted key, then injected key, then nothing. In host mode the
    /// host is re-queried instead.
    pub async fn resolve(&self) -> Option<Credential> {
        let suppressed = self.invalidated.load(Ordering::SeqCst);

        if let Some(host) = &self.host {
            if suppressed || !host.has_selected_key().await {
                return None;
            }
            return host.selected_key().await;
        }

        if let Some(stored) = self.read_persisted().await {
            return Some(stored);
        }
        if suppressed {
            return None;
        }
        self.env_credential.clone()
    }

    async fn read_persisted(&self) -> Option<Credential> {
        let raw = match self.store.get(CREDENTIAL_SLOT).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("failed to read saved API key: {err:#}");
                return None;
            }
        };
        match decode_from_storage(&raw) {
            Some(credential) => Some(credential),
            None => {
                warn!("saved API key is corrupt, removing it");
                if let Err(err) = self.store.remove(CREDENTIAL_SLOT).await {
                    warn!("failed to remove corrupt API key: {err:#}");
                }
                None
            }
        }
    }

    pub async fn is_ready(&self) -> bool {
        if let Some(host) = &self.host {
            if self.invalidated.load(Ordering::SeqCst) {
                return false;
            }
            return self.host_activated.load(Ordering::SeqCst) || host.has_selected_key().await;
        }
        self.resolve().await.is_some()
    }

    /// Validates a candidate without persisting or activating it.
    pub async fn test_credential(&self, candidate: &Credential) -> bool {
        let ok = self.probe.probe(candidate).await;
        info!(key = %candidate.fingerprint(), valid = ok, "API key tested");
        ok
    }

    /// Encodes and stores the key, then marks the manager ready. Refused in
    /// host mode, where a stored key would never be read.
    pub async fn save(&self, candidate: &Credential) -> Result<()> {
        self.ensure_local()?;
        self.store
            .put(CREDENTIAL_SLOT, &encode_for_storage(candidate))
            .await?;
        self.invalidated.store(false, Ordering::SeqCst);
        info!(key = %candidate.fingerprint(), "API key saved, engine ready");
        Ok(())
    }

    /// Test, then save on success. Nothing is stored when the probe fails.
    pub async fn submit(&self, raw: &str) -> Result<()> {
        self.ensure_local()?;
        let candidate = Credential::new(raw)
            .ok_or_else(|| StudioError::InvalidInput("API key must not be empty".into()))?;
        if !self.test_credential(&candidate).await {
            return Err(StudioError::InvalidCredential);
        }
        self.save(&candidate).await
    }

    fn ensure_local(&self) -> Result<()> {
        match self.mode() {
            KeyMode::Local => Ok(()),
            KeyMode::Host => Err(StudioError::InvalidInput(
                "the API key is managed by the host; use key selection instead".into(),
            )),
        }
    }

    /// Opens the host picker and optimistically treats the engine as ready.
    /// A later auth failure flips it back through [`KeyManager::invalidate`],
    /// and a request that finds no key flips it back through
    /// [`KeyManager::reconcile_missing`].
    pub async fn activate_host(&self) -> Result<()> {
        let host = self.host.as_ref().ok_or_else(|| {
            StudioError::InvalidInput("host key selection is not available".into())
        })?;
        host.open_select_key().await?;
        self.invalidated.store(false, Ordering::SeqCst);
        self.host_activated.store(true, Ordering::SeqCst);
        info!("host key selection opened, assuming a key is available");
        Ok(())
    }

    /// Called when a request resolved no key. Drops the optimistic host
    /// readiness so the engine reports offline again.
    pub async fn reconcile_missing(&self) {
        if self.host_activated.swap(false, Ordering::SeqCst) {
            warn!("host selection produced no API key, engine offline");
        }
    }

    /// Invalidates only when `used` is still the active key. A key saved
    /// while the failing request was in flight survives.
    pub async fn invalidate_if_current(&self, used: &Credential) {
        match self.resolve().await {
            Some(current) if &current != used => {
                info!(
                    failed = %used.fingerprint(),
                    active = %current.fingerprint(),
                    "auth failure for a replaced key, keeping the active one"
                );
            }
            _ => self.invalidate().await,
        }
    }

    /// Clears the persisted key and goes offline. Safe to call repeatedly.
    pub async fn invalidate(&self) {
        if let Err(err) = self.store.remove(CREDENTIAL_SLOT).await {
            warn!("failed to clear saved API key: {err:#}");
        }
        self.host_activated.store(false, Ordering::SeqCst);
        let was_valid = !self.invalidated.swap(true, Ordering::SeqCst);
        if was_valid {
            warn!("API key invalidated, engine offline");
        }
    }
}
