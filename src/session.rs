//! Session state: per-session newest-first result lists and the single
//! in-flight slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::credential::KeyManager;
use crate::data_url::DataUrl;
use crate::error::{Result, StudioError};
use crate::presets::StudioStyle;
use crate::transform::Transformer;

/// One completed run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResult {
    pub original_url: String,
    pub result_url: String,
    pub style: StudioStyle,
    /// Milliseconds since the epoch; unique within a session.
    pub timestamp: i64,
}

/// Entries kept per session; the oldest are dropped past this.
pub const MAX_RESULTS_PER_SESSION: usize = 20;

/// Live sessions kept at once; the least recently used is dropped past this.
pub const MAX_SESSIONS: usize = 64;

const MAX_SESSION_ID_LEN: usize = 64;

/// Results held in memory only, newest first.
#[derive(Debug)]
pub struct ResultHistory {
    entries: RwLock<Vec<TransformationResult>>,
    limit: usize,
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::with_limit(MAX_RESULTS_PER_SESSION)
    }
}

impl ResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            limit: limit.max(1),
        }
    }

    /// Prepends a result stamped with the current time, bumped past the
    /// newest entry so timestamps stay unique and ordered.
    pub async fn record(
        &self,
        original: &DataUrl,
        result: &DataUrl,
        style: StudioStyle,
    ) -> TransformationResult {
        let mut entries = self.entries.write().await;
        let now = Utc::now().timestamp_millis();
        let timestamp = match entries.first() {
            Some(newest) if newest.timestamp >= now => newest.timestamp + 1,
            _ => now,
        };
        let entry = TransformationResult {
            original_url: original.to_string(),
            result_url: result.to_string(),
            style,
            timestamp,
        };
        entries.insert(0, entry.clone());
        entries.truncate(self.limit);
        entry
    }

    pub async fn list(&self) -> Vec<TransformationResult> {
        self.entries.read().await.clone()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Result lists keyed by a client-chosen session id. A page load picks a
/// fresh id, so its results go away with the page.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    // Least recently used first.
    sessions: Mutex<Vec<(String, Arc<ResultHistory>)>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session's list, creating it when unknown.
    pub async fn open(&self, id: &str) -> Result<Arc<ResultHistory>> {
        validate_session_id(id)?;
        let mut sessions = self.sessions.lock().await;
        let history = match sessions.iter().position(|(known, _)| known == id) {
            Some(idx) => sessions.remove(idx).1,
            None => Arc::new(ResultHistory::new()),
        };
        sessions.push((id.to_string(), history.clone()));
        if sessions.len() > MAX_SESSIONS {
            let (evicted, _) = sessions.remove(0);
            debug!(session = %evicted, "session evicted");
        }
        Ok(history)
    }

    /// Drops the session and its results. Unknown ids are ignored.
    pub async fn discard(&self, id: &str) -> Result<()> {
        validate_session_id(id)?;
        self.sessions.lock().await.retain(|(known, _)| known != id);
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

fn validate_session_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StudioError::InvalidInput("invalid session id".into()))
    }
}

/// Releases the in-flight slot on drop.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| StudioError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Ties the key manager, the transformation client and the result list together.
pub struct Studio {
    transformer: Transformer,
    sessions: SessionRegistry,
    in_flight: AtomicBool,
}

impl Studio {
    pub fn new(transformer: Transformer) -> Self {
        Self {
            transformer,
            sessions: SessionRegistry::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        self.transformer.keys()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs one transformation and records it in `history`. Fails with
    /// [`StudioError::Busy`] while another is outstanding; prior results are
    /// untouched on failure.
    pub async fn generate(
        &self,
        history: &ResultHistory,
        image: &DataUrl,
        style: StudioStyle,
    ) -> Result<TransformationResult> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let preset = style.preset();
        let output = self.transformer.transform(image, preset.prompt).await?;
        let entry = history.record(image, &output, style).await;
        info!(style = ?style, timestamp = entry.timestamp, "result recorded");
        Ok(entry)
    }
}
