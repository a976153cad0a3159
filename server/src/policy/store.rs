//! Policy store with hot reload.
//!
//! Holds the current policy behind a `RwLock<Arc<Policy>>`. Readers clone the
//! `Arc` and keep using that snapshot; a reload only swaps the pointer after
//! the new document validated, so an invalid file never replaces a good one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{Policy, PolicyError};

/// Shared, swappable policy.
pub struct PolicyStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<Policy>>,
    /// Modification time of the file the current policy came from.
    loaded_mtime: RwLock<Option<SystemTime>>,
}

impl PolicyStore {
    /// Load and validate the policy file. Fails on any invalid content.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let path = path.into();
        let (policy, mtime) = read_policy(&path).await?;
        info!(
            path = %path.display(),
            version = policy.version(),
            "Policy loaded"
        );
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(policy)),
            loaded_mtime: RwLock::new(mtime),
        })
    }

    /// Wrap an already-built policy (no file backing, reload unavailable).
    pub fn from_policy(policy: Policy) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(policy)),
            loaded_mtime: RwLock::new(None),
        }
    }

    /// Snapshot of the active policy.
    pub async fn current(&self) -> Arc<Policy> {
        Arc::clone(&*self.current.read().await)
    }

    /// Re-read the backing file and swap it in if valid. Returns the new version.
    pub async fn reload(&self) -> Result<u32, PolicyError> {
        let path = self.path.as_deref().ok_or(PolicyError::NoSource)?;
        let (policy, mtime) = read_policy(path).await?;
        let version = policy.version();

        *self.current.write().await = Arc::new(policy);
        *self.loaded_mtime.write().await = mtime;

        info!(path = %path.display(), version, "Policy reloaded");
        Ok(version)
    }

    /// Reload only when the file's modification time changed.
    pub async fn reload_if_changed(&self) -> Result<bool, PolicyError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };

        let mtime = modified_at(path).await?;
        if mtime.is_some() && mtime == *self.loaded_mtime.read().await {
            return Ok(false);
        }

        self.reload().await?;
        Ok(true)
    }

    /// Spawn a task polling the backing file for changes.
    ///
    /// Invalid edits are logged and the previous policy stays active.
    pub fn spawn_watcher(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the file was just loaded.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = self.reload_if_changed().await {
                    error!(error = %e, "Policy reload failed, keeping previous policy");
                }
            }
        })
    }
}

async fn modified_at(path: &Path) -> Result<Option<SystemTime>, PolicyError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(metadata.modified().ok())
}

async fn read_policy(path: &Path) -> Result<(Policy, Option<SystemTime>), PolicyError> {
    let mtime = modified_at(path).await?;
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok((Policy::from_json(&raw)?, mtime))
}
