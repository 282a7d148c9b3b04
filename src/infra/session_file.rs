//! Session secret persisted between command invocations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::InfraError;

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored secret, or `None` when no session was saved.
    pub async fn load(&self) -> Result<Option<String>, InfraError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let secret = contents.trim();
                Ok((!secret.is_empty()).then(|| secret.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn store(&self, secret: &str) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, secret).await?;
        debug!(path = %self.path.display(), "session secret stored");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), InfraError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
