//! Local persistence of boards.
//!
//! Backends store serialized boards under string keys; [`AutoSaveManager`]
//! turns boards into versioned JSON and back.

mod autosave;
mod file;
mod memory;

pub use autosave::{AutoSaveManager, DEFAULT_AUTOSAVE_INTERVAL_SECS, OFFLINE_BOARD_KEY};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::board::BoardError;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Board not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    /// The stored board was written by an incompatible version.
    #[error("Version error: {0}")]
    Version(String),
    #[error("Storage error: {0}")]
    Other(String),
}

impl From<BoardError> for StorageError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::MissingVersion | BoardError::UnknownVersion(_) => StorageError::Version(err.to_string()),
            BoardError::Serialization(msg) => StorageError::Serialization(msg),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future returned by storage backends.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key-value store for serialized boards.
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, replacing any previous value.
    fn put(&self, key: &str, data: String) -> BoxFuture<'_, StorageResult<()>>;

    fn get(&self, key: &str) -> BoxFuture<'_, StorageResult<String>>;

    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// All stored keys.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    fn exists(&self, key: &str) -> BoxFuture<'_, StorageResult<bool>>;
}

/// Minimal executor for storage futures in tests.
#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
