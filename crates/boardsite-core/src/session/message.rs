//! Wire types of the board API and socket protocol.

use crate::page::{Page, PageMeta};
use crate::stroke::{PageId, Stroke, StrokeKind, StrokeRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Socket message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "stroke")]
    Stroke,
    #[serde(rename = "userconn")]
    UserConnected,
    #[serde(rename = "userdisc")]
    UserDisconnected,
    #[serde(rename = "pagesync")]
    PageSync,
    #[serde(rename = "pageupdate")]
    PageUpdate,
}

/// Socket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub sender: String,
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
}

/// A session participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub color: String,
}

/// Users of a session keyed by id.
pub type ConnectedUsers = HashMap<String, User>;

/// Delete instruction for one stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeDelete {
    pub id: String,
    pub page_id: PageId,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: StrokeKind,
}

impl StrokeDelete {
    pub fn new(stroke: &StrokeRef, user_id: &str) -> Self {
        Self {
            id: stroke.id.clone(),
            page_id: stroke.page_id.clone(),
            user_id: user_id.to_string(),
            kind: StrokeKind::Eraser,
        }
    }
}

/// One page of a sync snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSyncEntry {
    pub page_id: PageId,
    #[serde(default)]
    pub meta: PageMeta,
    /// `None` when the server omitted the stroke list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strokes: Option<Vec<Stroke>>,
}

impl PageSyncEntry {
    /// Snapshot entry carrying the page's strokes sorted by id.
    pub fn from_page(page: &Page) -> Self {
        Self {
            page_id: page.page_id.clone(),
            meta: page.meta.clone(),
            strokes: Some(page.sorted_strokes().into_iter().cloned().collect()),
        }
    }

    /// Build the page. Strokes routed elsewhere or malformed are dropped.
    pub fn into_page(self) -> Page {
        let mut page = Page::with_id(self.page_id, self.meta);
        for stroke in self.strokes.into_iter().flatten() {
            if stroke.page_id == page.page_id && stroke.is_valid() {
                page.insert_stroke(stroke);
            } else {
                log::debug!("Dropping stroke {:?} from page {} snapshot", stroke.id, page.page_id);
            }
        }
        page
    }
}

/// Full board snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageSync {
    #[serde(default)]
    pub page_rank: Vec<PageId>,
    #[serde(default)]
    pub pages: HashMap<PageId, PageSyncEntry>,
}

/// Incremental page change pushed over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    pub page_id: PageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
    #[serde(default)]
    pub clear: bool,
}

/// Body of `POST pages`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPages {
    pub page_id: Vec<PageId>,
    pub index: Vec<usize>,
    pub meta: HashMap<PageId, PageMeta>,
}

/// Body of `PUT pages?update=meta`.
#[derive(Debug, Clone, Serialize)]
pub struct MetaUpdate {
    pub meta: HashMap<PageId, PageMeta>,
}

/// Body of `PUT pages?update=clear` and `PUT pages?update=delete`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageIds {
    pub page_id: Vec<PageId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAttachment {
    pub attach_id: String,
}

/// Stroke message content split into additions and deletions.
///
/// Items without a page, an id or valid geometry are dropped.
pub fn split_stroke_content(content: Vec<serde_json::Value>) -> (Vec<Stroke>, Vec<StrokeRef>) {
    let mut added = Vec::new();
    let mut erased = Vec::new();
    for item in content {
        let is_delete = item.get("type").and_then(|t| t.as_str()) == Some("eraser");
        if is_delete {
            match serde_json::from_value::<StrokeRef>(item) {
                Ok(r) if !r.id.is_empty() && !r.page_id.is_empty() => erased.push(r),
                _ => log::debug!("Dropping malformed delete instruction"),
            }
            continue;
        }
        match serde_json::from_value::<Stroke>(item) {
            Ok(stroke) if stroke.is_valid() => added.push(stroke),
            Ok(stroke) => log::debug!("Dropping invalid stroke {:?}", stroke.id),
            Err(e) => log::debug!("Dropping undecodable stroke: {}", e),
        }
    }
    (added, erased)
}
