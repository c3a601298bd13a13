//! Persisted conversation state.
//!
//! Storage is an injected key/value interface so the conversation layer can
//! run against memory in tests and against disk in a real client.
//! [`SessionStore`] layers the session and settings bookkeeping on top.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::messages::truncate_text;
use crate::model::{AppSettings, ChatSession, Sender, DEFAULT_SESSION_TITLE};

/// Key prefix for persisted sessions.
pub const SESSION_KEY_PREFIX: &str = "session_";

/// Key for persisted settings.
pub const SETTINGS_KEY: &str = "ai-helper-settings";

const TITLE_CHARS: usize = 50;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Backend(String),
}

/// Key/value storage for JSON documents.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or replace a value.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Delete a value. Fails with `NotFound` if the key is absent.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List keys starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory storage implementation.
///
/// Suitable for tests; data is lost when the process exits.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.entries.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Directory-backed storage: one `<key>.json` file per entry.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::Backend(format!("invalid key: {:?}", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Session and settings bookkeeping over a [`Storage`] backend.
pub struct SessionStore<S: Storage> {
    storage: S,
}

impl<S: Storage> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Persist a session, naming it after its first user message if it still
    /// has the default title, and stamping its last activity.
    pub async fn save_session(&self, session: &mut ChatSession) -> Result<(), StorageError> {
        if session.title == DEFAULT_SESSION_TITLE {
            if let Some(first) = session.messages.iter().find(|m| m.sender == Sender::User) {
                session.title = truncate_text(&first.content, TITLE_CHARS);
            }
        }
        session.last_activity = Utc::now();

        let key = session_key(&session.id);
        self.storage.set(&key, serde_json::to_value(&*session)?).await?;
        debug!(%key, messages = session.messages.len(), "session saved");
        Ok(())
    }

    /// Load all saved sessions, most recently active first.
    ///
    /// Entries that no longer decode are skipped.
    pub async fn load_sessions(&self) -> Result<Vec<ChatSession>, StorageError> {
        let mut sessions = Vec::new();
        for key in self.storage.list_keys(SESSION_KEY_PREFIX).await? {
            let Some(value) = self.storage.get(&key).await? else {
                continue;
            };
            match serde_json::from_value::<ChatSession>(value) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(%key, error = %e, "failed to load session"),
            }
        }
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    /// Delete a saved session. A session that was never saved is not an error.
    pub async fn delete_session(&self, id: &str) -> Result<(), StorageError> {
        match self.storage.delete(&session_key(id)).await {
            Err(StorageError::NotFound(key)) => {
                debug!(%key, "session was never saved");
                Ok(())
            }
            result => result,
        }
    }

    /// Delete every saved session and return how many were removed.
    pub async fn delete_all_sessions(&self) -> Result<usize, StorageError> {
        let keys = self.storage.list_keys(SESSION_KEY_PREFIX).await?;
        for key in &keys {
            self.storage.delete(key).await?;
        }
        debug!(count = keys.len(), "all sessions deleted");
        Ok(keys.len())
    }

    /// Load settings, falling back to defaults when absent or undecodable.
    pub async fn load_settings(&self) -> Result<AppSettings, StorageError> {
        let Some(value) = self.storage.get(SETTINGS_KEY).await? else {
            return Ok(AppSettings::default());
        };
        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(error = %e, "stored settings are invalid, using defaults");
            AppSettings::default()
        }))
    }

    pub async fn save_settings(&self, settings: &AppSettings) -> Result<(), StorageError> {
        self.storage
            .set(SETTINGS_KEY, serde_json::to_value(settings)?)
            .await
    }
}

fn session_key(id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, id)
}
