//! Board document: ordered pages and their strokes.

use crate::geometry::{Hitbox, HitboxParams};
use crate::page::{Page, PageMeta, PageMetaPatch};
use crate::stroke::{PageId, Stroke, StrokeRef};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Version tag written into serialized boards.
pub const BOARD_VERSION: &str = "1.0";

/// Errors from board (de)serialization.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Serialized board has no version")]
    MissingVersion,
    #[error("Unsupported board version: {0}")]
    UnknownVersion(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BoardError {
    fn from(err: serde_json::Error) -> Self {
        BoardError::Serialization(err.to_string())
    }
}

/// The whiteboard document.
///
/// Every id in `page_rank` has an entry in `page_collection` and no id
/// appears twice. `current_page_index` always points into `page_rank`
/// unless the board is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Page display order.
    page_rank: Vec<PageId>,
    /// All pages, keyed by id.
    page_collection: HashMap<PageId, Page>,
    /// Index of the page in view.
    #[serde(default)]
    current_page_index: usize,
}

#[derive(Serialize)]
struct VersionedBoard<'a> {
    version: &'a str,
    #[serde(flatten)]
    board: &'a Board,
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty page. The page is not inserted.
    pub fn create_page(meta: PageMeta) -> Page {
        Page::new(meta)
    }

    pub fn page_rank(&self) -> &[PageId] {
        &self.page_rank
    }

    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.page_collection.get(page_id)
    }

    pub fn page_mut(&mut self, page_id: &str) -> Option<&mut Page> {
        self.page_collection.get_mut(page_id)
    }

    pub fn page_index(&self, page_id: &str) -> Option<usize> {
        self.page_rank.iter().position(|id| id == page_id)
    }

    /// Pages in display order.
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.page_rank.iter().filter_map(|id| self.page_collection.get(id))
    }

    pub fn page_count(&self) -> usize {
        self.page_rank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page_rank.is_empty()
    }

    pub fn current_page_index(&self) -> usize {
        self.current_page_index
    }

    pub fn current_page_id(&self) -> Option<&PageId> {
        self.page_rank.get(self.current_page_index)
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.current_page_id().and_then(|id| self.page_collection.get(id))
    }

    /// Move the view to `index`, clamped to the page range.
    pub fn set_current_page_index(&mut self, index: usize) {
        self.current_page_index = index.min(self.page_rank.len().saturating_sub(1));
    }

    /// Total strokes over all pages.
    pub fn stroke_count(&self) -> usize {
        self.page_collection.values().map(|p| p.strokes.len()).sum()
    }

    /// Insert a page at `index` (clamped), returning the actual index.
    ///
    /// A page whose id is already ranked is replaced and moved.
    pub fn add_page(&mut self, page: Page, index: usize) -> usize {
        if let Some(existing) = self.page_index(&page.page_id) {
            self.page_rank.remove(existing);
        }
        let index = index.min(self.page_rank.len());
        self.page_rank.insert(index, page.page_id.clone());
        self.page_collection.insert(page.page_id.clone(), page);
        index
    }

    /// Insert pages in order, each at its paired index.
    pub fn add_pages(&mut self, pages: impl IntoIterator<Item = (Page, usize)>) -> Vec<usize> {
        pages
            .into_iter()
            .map(|(page, index)| self.add_page(page, index))
            .collect()
    }

    /// Replace the content of an already ranked page.
    pub fn replace_page(&mut self, page: Page) -> bool {
        match self.page_collection.get_mut(&page.page_id) {
            Some(slot) => {
                *slot = page;
                true
            }
            None => false,
        }
    }

    /// Remove a page, returning it with its former index.
    pub fn delete_page(&mut self, page_id: &str) -> Option<(Page, usize)> {
        let index = self.page_index(page_id)?;
        self.page_rank.remove(index);
        let page = self.page_collection.remove(page_id)?;
        self.set_current_page_index(self.current_page_index);
        Some((page, index))
    }

    /// Remove all strokes from a page.
    pub fn clear_page(&mut self, page_id: &str) -> Option<Vec<Stroke>> {
        self.page_collection.get_mut(page_id).map(Page::clear)
    }

    /// Merge a metadata patch into a page, returning the previous metadata.
    pub fn update_page_meta(&mut self, page_id: &str, patch: &PageMetaPatch) -> Option<PageMeta> {
        let page = self.page_collection.get_mut(page_id)?;
        let next = page.meta.merged(patch);
        Some(std::mem::replace(&mut page.meta, next))
    }

    /// Replace a page's metadata, returning the previous metadata.
    pub fn set_page_meta(&mut self, page_id: &str, meta: PageMeta) -> Option<PageMeta> {
        let page = self.page_collection.get_mut(page_id)?;
        let next = page.meta.normalized(meta);
        Some(std::mem::replace(&mut page.meta, next))
    }

    /// Route strokes to their pages, returning any versions they replaced.
    ///
    /// Strokes that target a missing page or lack valid geometry are skipped.
    pub fn add_strokes(&mut self, strokes: impl IntoIterator<Item = Stroke>) -> Vec<Stroke> {
        let mut replaced = Vec::new();
        for stroke in strokes {
            if !stroke.is_valid() {
                log::debug!("Skipping invalid stroke {:?}", stroke.id);
                continue;
            }
            match self.page_collection.get_mut(&stroke.page_id) {
                Some(page) => replaced.extend(page.insert_stroke(stroke)),
                None => log::debug!("Skipping stroke {} for unknown page {}", stroke.id, stroke.page_id),
            }
        }
        replaced
    }

    /// Remove the referenced strokes, returning the ones that existed.
    pub fn erase_strokes<'a>(&mut self, refs: impl IntoIterator<Item = &'a StrokeRef>) -> Vec<Stroke> {
        refs.into_iter()
            .filter_map(|r| self.page_collection.get_mut(&r.page_id)?.remove_stroke(&r.id))
            .collect()
    }

    /// Reorder pages. Unknown and duplicate ids are dropped, and pages
    /// missing from `rank` keep their relative order at the end.
    pub fn set_page_rank(&mut self, rank: Vec<PageId>) {
        let mut seen = HashSet::new();
        let mut next: Vec<PageId> = rank
            .into_iter()
            .filter(|id| self.page_collection.contains_key(id) && seen.insert(id.clone()))
            .collect();
        next.extend(self.page_rank.iter().filter(|id| !seen.contains(*id)).cloned());
        self.page_rank = next;
        self.set_current_page_index(self.current_page_index);
    }

    /// Replace the whole board with a remote snapshot.
    ///
    /// A snapshot page without strokes keeps the local strokes of the page
    /// with the same id. Ranked ids without a page are dropped.
    pub fn sync_pages(&mut self, rank: Vec<PageId>, mut pages: HashMap<PageId, Page>, keep_local: &HashSet<PageId>) {
        for id in keep_local {
            if let (Some(page), Some(local)) = (pages.get_mut(id), self.page_collection.remove(id)) {
                page.strokes = local.strokes;
            }
        }

        let mut seen = HashSet::new();
        self.page_rank = rank
            .into_iter()
            .filter(|id| pages.contains_key(id) && seen.insert(id.clone()))
            .collect();
        pages.retain(|id, _| seen.contains(id));
        self.page_collection = pages;
        self.set_current_page_index(self.current_page_index);
    }

    /// Strokes on `page_id` whose hitbox intersects `hitbox`.
    ///
    /// Missing stroke hitboxes are computed with `params` first.
    pub fn strokes_hit(&mut self, page_id: &str, hitbox: &Hitbox, params: &HitboxParams) -> Vec<StrokeRef> {
        let Some(page) = self.page_collection.get_mut(page_id) else {
            return Vec::new();
        };
        let mut hits: Vec<StrokeRef> = page
            .strokes
            .values_mut()
            .filter_map(|stroke| {
                if stroke.hitboxes.is_none() {
                    stroke.calculate_hitboxes(params);
                }
                stroke.intersects(hitbox).then(|| stroke.reference())
            })
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits
    }

    /// Recompute every stroke hitbox.
    pub fn refresh_hitboxes(&mut self, params: &HitboxParams) {
        for stroke in self.page_collection.values_mut().flat_map(|p| p.strokes.values_mut()) {
            stroke.calculate_hitboxes(params);
        }
    }

    /// Serialize to versioned JSON.
    pub fn serialize(&self) -> Result<String, BoardError> {
        let versioned = VersionedBoard {
            version: BOARD_VERSION,
            board: self,
        };
        Ok(serde_json::to_string(&versioned)?)
    }

    /// Deserialize versioned JSON and rebuild hitboxes.
    pub fn deserialize(json: &str, params: &HitboxParams) -> Result<Board, BoardError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        match value.get("version").and_then(|v| v.as_str()) {
            None => return Err(BoardError::MissingVersion),
            Some(BOARD_VERSION) => {}
            Some(other) => return Err(BoardError::UnknownVersion(other.to_string())),
        }

        let mut board: Board = serde_json::from_value(value)?;
        let rank = std::mem::take(&mut board.page_rank);
        let pages = std::mem::take(&mut board.page_collection);
        board.sync_pages(rank, pages, &HashSet::new());
        for page in board.page_collection.values_mut() {
            page.strokes.retain(|id, stroke| {
                let valid = stroke.is_valid();
                if !valid {
                    log::debug!("Dropping stored stroke {} with invalid geometry", id);
                }
                valid
            });
        }
        board.refresh_hitboxes(params);
        Ok(board)
    }
}
