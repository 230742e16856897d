//! Boardsite Core Library
//!
//! Document model, drawing input, undo history and session sync for the
//! Boardsite collaborative whiteboard.

pub mod board;
pub mod config;
pub mod geometry;
pub mod history;
pub mod input;
pub mod page;
pub mod session;
pub mod storage;
pub mod stroke;
pub mod whiteboard;

pub use board::{Board, BoardError, BOARD_VERSION};
pub use config::{ClientConfig, ConfigError, SamplingConfig};
pub use geometry::{Hitbox, HitboxParams, SmoothingParams, compute_hitboxes, smooth_polyline};
pub use history::{Action, BoardAction, History, MAX_UNDO_HISTORY, RemoteOp};
pub use input::{DrawInput, Gesture, MouseButton, PointerKind, PreviewSegment, Tool};
pub use page::{Background, BackgroundStyle, Page, PageMeta, PageMetaPatch, PageSize};
pub use session::{BoardSession, ConnectionState, SessionError, SessionEvent, User};
pub use storage::{AutoSaveManager, FileStorage, MemoryStorage, Storage, StorageError};
pub use stroke::{PageId, Stroke, StrokeId, StrokeKind, StrokeRef, StrokeStyle};
pub use whiteboard::{Notification, NotificationLevel, Whiteboard};
