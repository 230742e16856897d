//! Periodic saving of the local board.

use super::{Storage, StorageError, StorageResult};
use crate::board::Board;
use crate::geometry::HitboxParams;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default auto-save interval in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Key under which the offline board is kept.
pub const OFFLINE_BOARD_KEY: &str = "offline";

/// Saves a board whenever its revision moved and the interval elapsed.
pub struct AutoSaveManager<S: Storage> {
    storage: Arc<S>,
    interval: Duration,
    /// Hitbox parameters applied when boards are restored.
    hitbox: HitboxParams,
    key: String,
    last_save: Option<Instant>,
    saved_revision: Option<u64>,
    revision: u64,
}

impl<S: Storage> AutoSaveManager<S> {
    pub fn new(storage: Arc<S>, hitbox: HitboxParams) -> Self {
        Self {
            storage,
            interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
            hitbox,
            key: OFFLINE_BOARD_KEY.to_string(),
            last_save: None,
            saved_revision: None,
            revision: 0,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Save under `key` instead of the offline key.
    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record the board's current revision.
    pub fn note_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// Whether the noted revision has not been saved yet.
    pub fn is_dirty(&self) -> bool {
        self.saved_revision != Some(self.revision)
    }

    pub fn should_save(&self) -> bool {
        self.is_dirty() && self.last_save.is_none_or(|last| last.elapsed() >= self.interval)
    }

    /// Save if dirty and the interval elapsed. Returns whether it saved.
    pub async fn maybe_save(&mut self, board: &Board) -> StorageResult<bool> {
        if !self.should_save() {
            return Ok(false);
        }
        self.save(board).await?;
        Ok(true)
    }

    /// Save immediately.
    pub async fn save(&mut self, board: &Board) -> StorageResult<()> {
        let data = board.serialize()?;
        self.storage.put(&self.key, data).await?;
        log::debug!("Saved board {} at revision {}", self.key, self.revision);
        self.last_save = Some(Instant::now());
        self.saved_revision = Some(self.revision);
        Ok(())
    }

    /// Load the board stored under `key` and make it the save target.
    pub async fn load(&mut self, key: &str) -> StorageResult<Board> {
        let data = self.storage.get(key).await?;
        let board = Board::deserialize(&data, &self.hitbox)?;
        self.key = key.to_string();
        self.last_save = Some(Instant::now());
        self.saved_revision = Some(self.revision);
        Ok(board)
    }

    /// Restore the board under the current key.
    ///
    /// Returns `None` when nothing is stored or the stored board is unreadable.
    pub async fn load_last(&mut self) -> Option<Board> {
        let key = self.key.clone();
        match self.load(&key).await {
            Ok(board) => Some(board),
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                log::warn!("Discarding stored board {}: {}", key, e);
                None
            }
        }
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.storage.delete(key).await
    }

    pub async fn list_boards(&self) -> StorageResult<Vec<String>> {
        self.storage.list().await
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}
