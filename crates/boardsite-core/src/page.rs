//! Pages: an ordered sheet of the board holding strokes and metadata.

use crate::stroke::{PageId, Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Length of generated page ids.
const PAGE_ID_LEN: usize = 8;

/// Page dimensions in page units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// A4 portrait at the board's default resolution.
    pub const A4_PORTRAIT: PageSize = PageSize {
        width: 620.0,
        height: 877.0,
    };

    /// A4 landscape at the board's default resolution.
    pub const A4_LANDSCAPE: PageSize = PageSize {
        width: 877.0,
        height: 620.0,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4_PORTRAIT
    }
}

/// Background pattern of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundStyle {
    #[default]
    Blank,
    Checkered,
    Ruled,
    /// A page of an attached document.
    Doc,
}

/// Page background. `Doc` backgrounds reference an attachment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    pub style: BackgroundStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_page_num: Option<u32>,
}

impl Background {
    /// A plain pattern background.
    pub fn pattern(style: BackgroundStyle) -> Self {
        Self {
            style,
            attach_id: None,
            document_page_num: None,
        }
    }

    /// A background showing page `page_num` of attachment `attach_id`.
    pub fn document(attach_id: impl Into<String>, page_num: u32) -> Self {
        Self {
            style: BackgroundStyle::Doc,
            attach_id: Some(attach_id.into()),
            document_page_num: Some(page_num),
        }
    }

    /// `Doc` requires an attachment reference and a page number.
    pub fn is_consistent(&self) -> bool {
        match self.style {
            BackgroundStyle::Doc => {
                self.attach_id.as_deref().is_some_and(|id| !id.is_empty()) && self.document_page_num.is_some()
            }
            _ => true,
        }
    }
}

/// Page metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PageMeta {
    pub size: PageSize,
    pub background: Background,
}

/// Partial metadata update. Missing fields keep their current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PageMetaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<PageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
}

impl PageMeta {
    /// Merge `patch` into a copy of this metadata.
    ///
    /// An inconsistent background in the result is replaced by the current one.
    pub fn merged(&self, patch: &PageMetaPatch) -> PageMeta {
        let mut meta = self.clone();
        if let Some(size) = patch.size {
            meta.size = size;
        }
        if let Some(background) = &patch.background {
            meta.background = background.clone();
        }
        self.normalized(meta)
    }

    /// Keep `next` but fall back to this background if `next`'s is inconsistent.
    pub fn normalized(&self, mut next: PageMeta) -> PageMeta {
        if !next.background.is_consistent() {
            log::warn!(
                "Rejecting {:?} background without attachment reference",
                next.background.style
            );
            next.background = self.background.clone();
        }
        next
    }
}

/// A page of the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page_id: PageId,
    #[serde(default)]
    pub strokes: HashMap<StrokeId, Stroke>,
    #[serde(default)]
    pub meta: PageMeta,
}

impl Page {
    /// Create an empty page with a fresh id.
    pub fn new(meta: PageMeta) -> Self {
        Self::with_id(generate_page_id(), meta)
    }

    /// Create an empty page with a known id.
    pub fn with_id(page_id: impl Into<PageId>, meta: PageMeta) -> Self {
        Self {
            page_id: page_id.into(),
            strokes: HashMap::new(),
            meta,
        }
    }

    /// Insert or replace a stroke, returning the replaced version.
    pub fn insert_stroke(&mut self, stroke: Stroke) -> Option<Stroke> {
        self.strokes.insert(stroke.id.clone(), stroke)
    }

    pub fn remove_stroke(&mut self, id: &str) -> Option<Stroke> {
        self.strokes.remove(id)
    }

    /// Remove every stroke, returning them sorted by id.
    pub fn clear(&mut self) -> Vec<Stroke> {
        let mut removed: Vec<Stroke> = self.strokes.drain().map(|(_, s)| s).collect();
        removed.sort_by(|a, b| a.id.cmp(&b.id));
        removed
    }

    /// Strokes ordered by id.
    pub fn sorted_strokes(&self) -> Vec<&Stroke> {
        let mut strokes: Vec<&Stroke> = self.strokes.values().collect();
        strokes.sort_by(|a, b| a.id.cmp(&b.id));
        strokes
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// Generate a short page id.
pub fn generate_page_id() -> PageId {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(PAGE_ID_LEN);
    id
}
