use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use flow_core::storage::{KvStore, StoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

/// File-backed store implementing the shared `KvStore` contract.
/// Each key maps to one file under `root`; writes go through a temp file
/// in the same directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }
}

#[async_trait]
impl KvStore for FileStore {
    #[instrument(skip_all, fields(key))]
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(storage_err)?;
        let path = self.path_for(key);
        write_atomic(&path, value)
    }

    #[instrument(skip_all, fields(key))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key);
        let mut file = File::open(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                storage_err(err)
            }
        })?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(storage_err)?;
        Ok(buf)
    }

    #[instrument(skip_all, fields(key))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(bytes).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

/// Keys may contain `/` and other path-hostile characters.
fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use flow_core::storage::KvStore;

    use super::*;

    #[tokio::test]
    async fn round_trip_persists_bytes_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());

        let key = "workspace/tasks";
        store.put(key, b"[1,2,3]").await.expect("put");
        assert_eq!(store.get(key).await.expect("get"), b"[1,2,3]");

        let on_disk = fs::read(store.path_for(key)).expect("read file");
        assert_eq!(on_disk, b"[1,2,3]");
        assert!(store.path_for(key).starts_with(store.root()));
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("nested"));
        store.put("k", b"first").await.expect("put");
        store.put("k", b"second").await.expect("put again");
        assert_eq!(store.get("k").await.expect("get"), b"second");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let key = "k";
        store.put(key, b"v").await.expect("put");
        store.delete(key).await.expect("delete");
        store.delete(key).await.expect("delete again");

        let err = store.get(key).await.expect_err("should be missing");
        assert_eq!(
            err,
            StoreError::NotFound {
                key: "k".to_string()
            }
        );
    }

    #[test]
    fn sanitized_keys_have_no_separators() {
        assert!(!sanitize_key("a/b/../c").contains('/'));
    }
}
