//! Board store backed by JSON files in a directory.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Stores each board as `<key>.json` under a base directory.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open a store in `base_path`, creating the directory if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        fs::create_dir_all(&base_path)
            .map_err(|e| StorageError::Io(format!("Failed to create storage directory: {}", e)))?;
        Ok(Self { base_path })
    }

    /// Store in the platform data directory, e.g. `~/.local/share/boardsite/boards/`.
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
        Self::new(base.join("boardsite").join("boards"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn board_path(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.json", safe_key))
    }
}

impl Storage for FileStorage {
    fn put(&self, key: &str, data: String) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.board_path(key);
        Box::pin(async move {
            // Atomic replace.
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, data).map_err(|e| StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
            fs::rename(&tmp, &path)
                .map_err(|e| StorageError::Io(format!("Failed to replace {}: {}", path.display(), e)))
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, StorageResult<String>> {
        let path = self.board_path(key);
        let key = key.to_string();
        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(key));
            }
            fs::read_to_string(&path).map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.board_path(key);
        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path)
                    .map_err(|e| StorageError::Io(format!("Failed to delete {}: {}", path.display(), e)))?;
            }
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            let entries =
                fs::read_dir(&base).map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;
            let mut keys: Vec<String> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn exists(&self, key: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.board_path(key);
        Box::pin(async move { Ok(path.exists()) })
    }
}
