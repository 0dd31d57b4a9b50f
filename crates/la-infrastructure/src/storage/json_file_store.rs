//! Durable key-value store backed by a single JSON file.
//!
//! Every mutation takes an exclusive lock file, reads the current object,
//! applies the change and writes it back through a temporary file and an
//! atomic rename, so a reader in another process sees either the old or the
//! new object and never a torn one.

use async_trait::async_trait;
use fs2::FileExt;
use la_core::error::{LaError, Result};
use la_core::store::{KeyValueStore, StoreItems};
use serde_json::Value as JsonValue;
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Errors that can occur during file store operations.
#[derive(Debug)]
pub enum FileStoreError {
    /// File I/O error.
    IoError(std::io::Error),
    /// JSON parse or serialization error.
    JsonError(serde_json::Error),
    /// The file holds JSON that is not an object.
    NotAnObject(PathBuf),
    /// File locking error.
    LockError(String),
}

impl std::fmt::Display for FileStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStoreError::IoError(e) => write!(f, "I/O error: {}", e),
            FileStoreError::JsonError(e) => write!(f, "JSON error: {}", e),
            FileStoreError::NotAnObject(path) => {
                write!(f, "Store file is not a JSON object: {}", path.display())
            }
            FileStoreError::LockError(e) => write!(f, "Lock error: {}", e),
        }
    }
}

impl std::error::Error for FileStoreError {}

impl From<std::io::Error> for FileStoreError {
    fn from(e: std::io::Error) -> Self {
        FileStoreError::IoError(e)
    }
}

impl From<serde_json::Error> for FileStoreError {
    fn from(e: serde_json::Error) -> Self {
        FileStoreError::JsonError(e)
    }
}

impl From<FileStoreError> for LaError {
    fn from(e: FileStoreError) -> Self {
        LaError::storage(e.to_string())
    }
}

/// A [`KeyValueStore`] persisted to one JSON file.
///
/// Cheap to clone; clones share the same path. Blocking file work runs on the
/// tokio blocking pool.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store handle. The file is created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the whole object. A missing or empty file is an empty object.
    fn load(&self) -> std::result::Result<StoreItems, FileStoreError> {
        if !self.path.exists() {
            return Ok(StoreItems::new());
        }

        let content = fs::read_to_string(&self.path)?;

        if content.trim().is_empty() {
            return Ok(StoreItems::new());
        }

        match serde_json::from_str::<JsonValue>(&content)? {
            JsonValue::Object(map) => Ok(map),
            _ => Err(FileStoreError::NotAnObject(self.path.clone())),
        }
    }

    /// Writes the whole object via a uniquely named tmp file + fsync + rename.
    fn save(&self, data: &StoreItems) -> std::result::Result<(), FileStoreError> {
        let parent = self.parent_dir()?;
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }

        let json_string = serde_json::to_string_pretty(data)?;

        let mut tmp_file = NamedTempFile::new_in(parent)?;
        tmp_file.write_all(json_string.as_bytes())?;
        tmp_file.as_file().sync_all()?;
        tmp_file
            .persist(&self.path)
            .map_err(|e| FileStoreError::IoError(e.error))?;

        Ok(())
    }

    /// Locked read-modify-write.
    fn update<F>(&self, f: F) -> std::result::Result<(), FileStoreError>
    where
        F: FnOnce(&mut StoreItems),
    {
        let _lock = FileLock::acquire(&self.path)?;
        let mut data = self.load()?;
        f(&mut data);
        self.save(&data)
    }

    fn parent_dir(&self) -> std::result::Result<&Path, FileStoreError> {
        self.path.parent().ok_or_else(|| {
            FileStoreError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        })
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(JsonFileStore) -> std::result::Result<T, FileStoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| LaError::internal(format!("Failed to join store task: {}", e)))?
            .map_err(LaError::from)
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreItems> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.run_blocking(move |store| {
            let mut data = store.load()?;
            Ok(keys
                .into_iter()
                .filter_map(|k| data.remove(&k).map(|v| (k, v)))
                .collect())
        })
        .await
    }

    async fn set(&self, items: StoreItems) -> Result<()> {
        tracing::debug!(
            "[JsonFileStore] set {:?} in {}",
            items.keys().collect::<Vec<_>>(),
            self.path.display()
        );
        self.run_blocking(move |store| store.update(|data| data.extend(items)))
            .await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        tracing::debug!("[JsonFileStore] remove {:?} in {}", keys, self.path.display());
        self.run_blocking(move |store| {
            store.update(|data| {
                for key in &keys {
                    data.remove(key);
                }
            })
        })
        .await
    }
}

/// Exclusive lock on `<store>.lock`, held until dropped.
///
/// The lock file is never removed: a waiter blocked on it must end up holding
/// the same inode the next writer will open.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> std::result::Result<Self, FileStoreError> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        file.lock_exclusive()
            .map_err(|e| FileStoreError::LockError(format!("Failed to acquire lock: {}", e)))?;

        Ok(FileLock { _file: file })
    }
}
