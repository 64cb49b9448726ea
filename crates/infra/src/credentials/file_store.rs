//! Credential persistence as one JSON file per user.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use icalsync_core::CredentialStore;
use icalsync_domain::{Result, StoredCredential, SyncError};
use tracing::debug;
use uuid::Uuid;

use crate::errors::InfraError;

/// Stores `<directory>/<escaped user id>.json`, readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    directory: PathBuf,
}

impl FileCredentialStore {
    /// The directory is created on first save.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    /// Storage root.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Ids are escaped so they cannot leave the storage directory.
    fn path_for(&self, user_id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", urlencoding::encode(user_id)))
    }
}

fn storage_error(err: std::io::Error) -> SyncError {
    InfraError::from(err).into()
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, user_id: &str) -> Result<Option<StoredCredential>> {
        let path = self.path_for(user_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error(err)),
        };

        let credential = serde_json::from_str(&contents).map_err(|err| {
            SyncError::Storage(format!("corrupt credential file {}: {err}", path.display()))
        })?;
        Ok(Some(credential))
    }

    async fn save(&self, user_id: &str, credential: &StoredCredential) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await.map_err(storage_error)?;

        let path = self.path_for(user_id);
        let temp = self.directory.join(format!(".{}.tmp", Uuid::new_v4().simple()));
        let json = serde_json::to_vec_pretty(credential)
            .map_err(|err| SyncError::from(InfraError::from(err)))?;

        tokio::fs::write(&temp, json).await.map_err(storage_error)?;
        restrict_permissions(&temp).await?;
        if let Err(err) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(storage_error(err));
        }

        debug!(user_id, path = %path.display(), "credential saved");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(user_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(err)),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(storage_error)
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
