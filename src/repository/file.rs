//! Filesystem HAR repository

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{har, validate_name, InteractionRepository};
use crate::message::Interaction;
use crate::{RecorderError, Result};

/// Cassette file extension
pub const CASSETTE_EXTENSION: &str = "har";

/// Stores each cassette as a HAR file below a root directory
#[derive(Debug)]
pub struct HarFileRepository {
    root: PathBuf,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    write_seq: AtomicU64,
}

impl HarFileRepository {
    /// Create a repository rooted at `root`; the directory is created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
            write_seq: AtomicU64::new(0),
        }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Physical path of a cassette
    ///
    /// # Errors
    ///
    /// Returns error if the name is not a valid cassette name
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;

        let suffix = format!(".{CASSETTE_EXTENSION}");
        if name.to_ascii_lowercase().ends_with(&suffix) {
            Ok(self.root.join(name))
        } else {
            Ok(self.root.join(format!("{name}{suffix}")))
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drop our handle and forget the lock once no other caller holds it
    fn release(&self, path: &Path, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(path, |_, held| Arc::strong_count(held) == 1);
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()))
    }

    /// Write to a temporary sibling, then rename over `path`
    async fn write_replacing(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path(path);
        let written = match tokio::fs::write(&temp, data).await {
            Ok(()) => tokio::fs::rename(&temp, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tokio::fs::remove_file(&temp).await.ok();
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl InteractionRepository for HarFileRepository {
    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn load(&self, name: &str) -> Result<Interaction> {
        let path = self.path_for(name)?;
        let lock = self.lock_for(&path);
        let read = {
            let _guard = lock.lock().await;
            tokio::fs::read(&path).await
        };
        self.release(&path, lock);

        let data = match read {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cassette file at {}", path.display());
                return Err(RecorderError::StorageMissing {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let interaction = har::parse(name, &data).map_err(|e| {
            warn!("Unreadable cassette file {}: {}", path.display(), e);
            e
        })?;

        info!(
            "Loaded cassette '{}': {} interactions",
            name,
            interaction.len()
        );
        Ok(interaction)
    }

    async fn store(&self, interaction: &Interaction) -> Result<()> {
        let path = self.path_for(interaction.name())?;
        let data = har::render(interaction)?;

        let lock = self.lock_for(&path);
        let written = {
            let _guard = lock.lock().await;
            self.write_replacing(&path, &data).await
        };
        self.release(&path, lock);
        written?;

        debug!(
            "Stored cassette '{}' at {} ({} interactions, {} bytes)",
            interaction.name(),
            path.display(),
            interaction.len(),
            data.len()
        );
        Ok(())
    }
}
