use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read/write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cached universe at {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Disk-backed cache of the last known universe per game, keyed by game
/// id. Blobs are the raw payload exactly as received, pretty-printed, so
/// they round-trip through the same parser used for live responses.
#[derive(Debug, Clone)]
pub struct UniverseStore {
    dir: PathBuf,
}

impl UniverseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, game_id: &str) -> PathBuf {
        self.dir.join(format!("{game_id}.json"))
    }

    /// `Ok(None)` when no snapshot was ever persisted for this game.
    pub async fn load(&self, game_id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(game_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let raw = serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        debug!(game_id, path = %path.display(), "universe_loaded");
        Ok(Some(raw))
    }

    pub async fn save(&self, game_id: &str, raw: &Value) -> Result<(), StoreError> {
        let path = self.path_for(game_id);
        let text = serde_json::to_string_pretty(raw).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        write_text_atomic(&path, &text)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(game_id, path = %path.display(), "universe_saved");
        Ok(())
    }
}

async fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = temp_path_for(path);
    tokio::fs::write(&tmp_path, text).await?;
    replace_file(&tmp_path, path).await
}

async fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(final_path).await {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = tokio::fs::remove_file(tmp_path).await;
            return Err(error);
        }
    }

    if let Err(error) = tokio::fs::rename(tmp_path, final_path).await {
        let _ = tokio::fs::remove_file(tmp_path).await;
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("universe.tmp");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}
