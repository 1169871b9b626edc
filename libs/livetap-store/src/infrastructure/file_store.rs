//! File-backed cursor store
//!
//! The cursor is kept as a small JSON document. Saves go to a sibling temp
//! file that is then renamed over the target, so a crash mid-write leaves
//! either the previous cursor or the new one, never a torn file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use livetap_domain::{
    ingestion::{Cursor, StoreError},
    ports::CursorStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// On-disk layout of the cursor file
#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    cursor: Cursor,
    #[serde(with = "livetap_domain::timestamp")]
    saved_at: DateTime<Utc>,
}

/// CursorStore persisting to a JSON file
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl FileCursorStore {
    /// Create a store for `path`; the file does not need to exist yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut temp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "cursor".into());
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        info!(path = %path.display(), "Initializing FileCursorStore");
        Self { path, temp_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> impl std::future::Future<Output = Result<Cursor, StoreError>> + Send {
        let path = self.path.clone();

        async move {
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("No cursor file yet, starting from the beginning");
                    return Ok(Cursor::Beginning);
                }
                Err(err) => {
                    return Err(StoreError::io(format!(
                        "failed to read '{}': {}",
                        path.display(),
                        err
                    )))
                }
            };

            let file: CursorFile = serde_json::from_slice(&raw).map_err(|err| {
                StoreError::corrupt(format!("'{}': {}", path.display(), err))
            })?;
            debug!(cursor = %file.cursor, saved_at = %file.saved_at, "Loaded cursor file");
            Ok(file.cursor)
        }
    }

    #[instrument(skip(self, cursor), fields(path = %self.path.display(), cursor = %cursor))]
    fn save(&self, cursor: &Cursor) -> impl std::future::Future<Output = Result<(), StoreError>> + Send {
        let path = self.path.clone();
        let temp_path = self.temp_path.clone();
        let file = CursorFile {
            cursor: cursor.clone(),
            saved_at: Utc::now(),
        };

        async move {
            let body = serde_json::to_vec_pretty(&file)
                .map_err(|err| StoreError::io(format!("failed to encode cursor: {}", err)))?;

            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    StoreError::io(format!("failed to create '{}': {}", parent.display(), err))
                })?;
            }

            tokio::fs::write(&temp_path, &body).await.map_err(|err| {
                StoreError::io(format!("failed to write '{}': {}", temp_path.display(), err))
            })?;
            tokio::fs::rename(&temp_path, &path).await.map_err(|err| {
                StoreError::io(format!(
                    "failed to replace '{}': {}",
                    path.display(),
                    err
                ))
            })?;

            debug!("Cursor saved");
            Ok(())
        }
    }
}
