//! JSON file snapshot store

use std::fmt::Debug;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::debug;

use crate::domain::storage::SnapshotStore;
use crate::domain::DomainError;

/// Stores one snapshot as a pretty-printed JSON document
///
/// Saves go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous document intact. Concurrent saves to
/// the same path must be serialized by the caller.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    /// Creates a store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());

        self.path
            .with_file_name(format!("{}.{}.tmp", file_name, std::process::id()))
    }
}

impl<T> Debug for JsonFileStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl<T> SnapshotStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Option<T>, DomainError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(DomainError::persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            DomainError::persistence(format!("Corrupt snapshot {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, snapshot: &T) -> Result<(), DomainError> {
        let data = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        fs::write(&temp_path, &data).await?;

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(DomainError::persistence(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            )));
        }

        debug!(path = %self.path.display(), bytes = data.len(), "Snapshot written");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
