use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::SessionError;
use crate::types::Turn;

/// Persists finalized transcript turns across sessions. Only the transcript
/// log is stored; credentials and connection state never touch disk.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn persist(&self, turns: &[Turn]) -> Result<(), SessionError>;

    async fn load(&self) -> Result<Vec<Turn>, SessionError>;
}

/// Stores the transcript as a JSON array on disk. The file is rewritten
/// whole on every persist; a missing file loads as an empty history.
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn persist(&self, turns: &[Turn]) -> Result<(), SessionError> {
        let encoded = serde_json::to_string_pretty(turns)
            .map_err(|err| SessionError::Persistence(err.to_string()))?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|err| SessionError::Persistence(err.to_string()))?;
        tracing::debug!(path = %self.path.display(), turns = turns.len(), "transcript persisted");
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Turn>, SessionError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(SessionError::Persistence(err.to_string())),
        };
        serde_json::from_str(&raw).map_err(|err| SessionError::Persistence(err.to_string()))
    }
}
