//! Remote settings source and local settings storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use breakwise_auth::{BackendError, Session, UserId};
use tokio::fs;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::entities::UserSettings;
use crate::types::ExtensionResult;

/// Where the authoritative copy of a user's settings lives.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn fetch_settings(&self, session: &Session) -> Result<UserSettings, BackendError>;
}

/// The extension's local copy. Only the sync dispatcher writes to it.
#[async_trait]
pub trait SettingsStorage: Send + Sync {
    async fn read(&self) -> ExtensionResult<Option<UserSettings>>;
    async fn write(&self, settings: &UserSettings) -> ExtensionResult<()>;
}

/// Backend settings table kept in memory.
#[derive(Clone)]
pub struct InMemorySettingsSource {
    rows: Arc<RwLock<HashMap<UserId, UserSettings>>>,
    fetches: Arc<AtomicUsize>,
    reachable: Arc<AtomicBool>,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for InMemorySettingsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySettingsSource {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            fetches: Arc::new(AtomicUsize::new(0)),
            reachable: Arc::new(AtomicBool::new(true)),
            paused: Arc::new(paused),
        }
    }

    pub async fn upsert(&self, settings: UserSettings) {
        self.rows
            .write()
            .await
            .insert(settings.user_id.clone(), settings);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Hold every fetch that starts from now on until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }
}

#[async_trait]
impl SettingsSource for InMemorySettingsSource {
    async fn fetch_settings(&self, session: &Session) -> Result<UserSettings, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let mut paused = self.paused.subscribe();
        let _ = paused.wait_for(|paused| !*paused).await;

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("settings backend offline".into()));
        }

        let rows = self.rows.read().await;
        Ok(rows
            .get(session.user_id())
            .cloned()
            .unwrap_or_else(|| UserSettings::defaults_for(session.user_id())))
    }
}

#[derive(Default, Clone)]
pub struct MemorySettingsStorage {
    current: Arc<RwLock<Option<UserSettings>>>,
    writes: Arc<AtomicUsize>,
}

impl MemorySettingsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsStorage for MemorySettingsStorage {
    async fn read(&self) -> ExtensionResult<Option<UserSettings>> {
        Ok(self.current.read().await.clone())
    }

    async fn write(&self, settings: &UserSettings) -> ExtensionResult<()> {
        *self.current.write().await = Some(settings.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Settings persisted as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileSettingsStorage {
    path: PathBuf,
}

impl FileSettingsStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStorage for FileSettingsStorage {
    async fn read(&self) -> ExtensionResult<Option<UserSettings>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, settings: &UserSettings) -> ExtensionResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Readers see either the old document or the new one.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(settings)?).await?;
        fs::rename(&staging, &self.path).await?;
        debug!(path = %self.path.display(), "settings written");
        Ok(())
    }
}
