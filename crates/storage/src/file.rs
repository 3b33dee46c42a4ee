//! File-backed store
//!
//! One file per key under a root directory. File names are the hex encoding
//! of the key, so arbitrary `/`-separated keys map onto a flat directory
//! without any escaping rules.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

const ENTRY_EXTENSION: &str = "entry";

/// Longest key a [`FileStore`] accepts, in bytes
///
/// Hex doubles the key and the temp file adds `.entry.tmp.<uuid>`; 100 bytes
/// keeps that under the usual 255-byte file name limit.
pub const MAX_KEY_LEN: usize = 100;

/// Filesystem implementation of [`Store`]
///
/// Writes go to a uniquely named temp file that is fsynced and then renamed
/// over the target, so a reader (or a restarted process) sees either the old
/// value or the new one, never a torn write.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| StoreError::Io {
                key: root.display().to_string(),
                source,
            })?;
        Ok(Self { root })
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }
        if key.len() > MAX_KEY_LEN {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: format!("key is longer than {MAX_KEY_LEN} bytes"),
            });
        }
        Ok(self
            .root
            .join(format!("{}.{ENTRY_EXTENSION}", hex::encode(key))))
    }

    fn decode_file_name(name: &str) -> Option<String> {
        let stem = name.strip_suffix(ENTRY_EXTENSION)?.strip_suffix('.')?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// Write `data` to `path` via temp file + fsync + rename
async fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_file_name(format!(
        "{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(ENTRY_EXTENSION),
        Uuid::new_v4()
    ));

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&temp_path, perms).await?;
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    // Persist the rename itself.
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            tokio::fs::File::open(parent).await?.sync_all().await?;
        }
    }

    Ok(())
}

#[async_trait]
impl Store for FileStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let path = self.entry_path(key)?;
        atomic_write(&path, &value)
            .await
            .map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.entry_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let dir_err = |source| StoreError::Io {
            key: self.root.display().to_string(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(dir_err)?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_err)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            match Self::decode_file_name(name) {
                Some(key) if key.starts_with(prefix) => keys.push(key),
                Some(_) => {}
                None => {
                    tracing::trace!(file = %name, "Skipping non-entry file in store directory");
                }
            }
        }
        Ok(keys)
    }
}
