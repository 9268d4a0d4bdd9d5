use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::credential::{Credential, CredentialSource};
use crate::error::StoreError;

const CREDENTIAL_FILE: &str = "credentials.json";

/// Persistent key-value slot holding the API key. Values pass through untouched;
/// an empty stored value reads back as "nothing stored".
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self) -> Result<Option<Credential>, StoreError>;
    async fn set(&self, secret: &str) -> Result<(), StoreError>;
}

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    #[serde(rename = "apiKey")]
    api_key: String,
}

/// JSON file under the data directory: `{"apiKey": "..."}`.
///
/// Writes are serialized through a lock and land via temp+rename, so a reader
/// never observes a half-written file.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(CREDENTIAL_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self) -> Result<Option<Credential>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredCredential = serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Unavailable(format!(
                "{} is not a credential file: {e}",
                self.path.display()
            ))
        })?;
        if stored.api_key.is_empty() {
            return Ok(None);
        }
        Ok(Some(Credential::new(stored.api_key, CredentialSource::LocalStore)))
    }

    async fn set(&self, secret: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec(&StoredCredential {
            api_key: secret.to_string(),
        })
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        atomic_write(&self.path, &body).await?;
        tracing::info!(path = %self.path.display(), "credential stored");
        Ok(())
    }
}

/// Write to a pid-suffixed temp file, restrict permissions, then rename over the target.
async fn atomic_write(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    tokio::fs::write(&tmp_path, content).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// In-process store for embedders and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(secret.into())),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self) -> Result<Option<Credential>, StoreError> {
        let value = self.value.lock().await;
        Ok(value
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| Credential::new(s, CredentialSource::LocalStore)))
    }

    async fn set(&self, secret: &str) -> Result<(), StoreError> {
        *self.value.lock().await = Some(secret.to_string());
        Ok(())
    }
}
