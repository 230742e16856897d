//! Undo/redo log of board actions.
//!
//! Each action knows how to apply and revert itself on the local board, and
//! which remote operations mirror those changes for a connected session.

use crate::board::Board;
use crate::page::{Page, PageMeta};
use crate::stroke::{PageId, Stroke, StrokeRef};

/// Default maximum number of undo entries.
pub const MAX_UNDO_HISTORY: usize = 50;

/// A change to send to the session backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    SendStrokes(Vec<Stroke>),
    EraseStrokes(Vec<StrokeRef>),
    AddPages { pages: Vec<Page>, indices: Vec<usize> },
    DeletePages(Vec<PageId>),
    UpdatePages { pages: Vec<(PageId, PageMeta)>, clear: bool },
}

/// A board mutation with the data needed to revert it.
///
/// Captured fields are filled in when the action is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardAction {
    AddPages {
        pages: Vec<(Page, usize)>,
    },
    DeletePages {
        page_ids: Vec<PageId>,
        removed: Vec<(Page, usize)>,
    },
    ClearPages {
        page_ids: Vec<PageId>,
        cleared: Vec<Stroke>,
        metas: Vec<(PageId, PageMeta)>,
    },
    AddStrokes {
        strokes: Vec<Stroke>,
        replaced: Vec<Stroke>,
    },
    EraseStrokes {
        strokes: Vec<StrokeRef>,
        erased: Vec<Stroke>,
    },
    SetPageMeta {
        updates: Vec<(PageId, PageMeta)>,
        previous: Vec<(PageId, PageMeta)>,
    },
}

impl BoardAction {
    pub fn add_pages(pages: Vec<(Page, usize)>) -> Self {
        BoardAction::AddPages { pages }
    }

    pub fn delete_pages(page_ids: Vec<PageId>) -> Self {
        BoardAction::DeletePages {
            page_ids,
            removed: Vec::new(),
        }
    }

    pub fn clear_pages(page_ids: Vec<PageId>) -> Self {
        BoardAction::ClearPages {
            page_ids,
            cleared: Vec::new(),
            metas: Vec::new(),
        }
    }

    pub fn add_strokes(strokes: Vec<Stroke>) -> Self {
        BoardAction::AddStrokes {
            strokes,
            replaced: Vec::new(),
        }
    }

    pub fn erase_strokes(strokes: Vec<StrokeRef>) -> Self {
        BoardAction::EraseStrokes {
            strokes,
            erased: Vec::new(),
        }
    }

    pub fn set_page_meta(updates: Vec<(PageId, PageMeta)>) -> Self {
        BoardAction::SetPageMeta {
            updates,
            previous: Vec::new(),
        }
    }

    /// Perform the change on the board and capture what it overwrote.
    pub fn apply(&mut self, board: &mut Board) {
        match self {
            BoardAction::AddPages { pages } => {
                for (page, index) in pages.iter_mut() {
                    *index = board.add_page(page.clone(), *index);
                }
            }
            BoardAction::DeletePages { page_ids, removed } => {
                *removed = page_ids.iter().filter_map(|id| board.delete_page(id)).collect();
            }
            BoardAction::ClearPages {
                page_ids,
                cleared,
                metas,
            } => {
                cleared.clear();
                metas.clear();
                for id in page_ids.iter() {
                    if let Some(strokes) = board.clear_page(id) {
                        cleared.extend(strokes);
                    }
                    if let Some(page) = board.page(id) {
                        metas.push((id.clone(), page.meta.clone()));
                    }
                }
            }
            BoardAction::AddStrokes { strokes, replaced } => {
                *replaced = board.add_strokes(strokes.iter().cloned());
            }
            BoardAction::EraseStrokes { strokes, erased } => {
                *erased = board.erase_strokes(strokes.iter());
            }
            BoardAction::SetPageMeta { updates, previous } => {
                *previous = updates
                    .iter()
                    .filter_map(|(id, meta)| Some((id.clone(), board.set_page_meta(id, meta.clone())?)))
                    .collect();
            }
        }
    }

    /// Undo the change using the data captured by [`apply`](Self::apply).
    pub fn revert(&self, board: &mut Board) {
        match self {
            BoardAction::AddPages { pages } => {
                for (page, _) in pages.iter().rev() {
                    board.delete_page(&page.page_id);
                }
            }
            BoardAction::DeletePages { removed, .. } => {
                for (page, index) in removed.iter().rev() {
                    board.add_page(page.clone(), *index);
                }
            }
            BoardAction::ClearPages { cleared, .. } => {
                board.add_strokes(cleared.iter().cloned());
            }
            BoardAction::AddStrokes { strokes, replaced } => {
                let refs: Vec<StrokeRef> = strokes.iter().map(Stroke::reference).collect();
                board.erase_strokes(&refs);
                board.add_strokes(replaced.iter().cloned());
            }
            BoardAction::EraseStrokes { erased, .. } => {
                board.add_strokes(erased.iter().cloned());
            }
            BoardAction::SetPageMeta { previous, .. } => {
                for (id, meta) in previous.iter().rev() {
                    board.set_page_meta(id, meta.clone());
                }
            }
        }
    }

    /// Remote operations mirroring [`apply`](Self::apply).
    pub fn remote_apply(&self) -> Vec<RemoteOp> {
        match self {
            BoardAction::AddPages { pages } => {
                let (pages, indices) = pages.iter().cloned().unzip();
                vec![RemoteOp::AddPages { pages, indices }]
            }
            BoardAction::DeletePages { removed, .. } => {
                vec![RemoteOp::DeletePages(
                    removed.iter().map(|(page, _)| page.page_id.clone()).collect(),
                )]
            }
            BoardAction::ClearPages { metas, .. } => vec![RemoteOp::UpdatePages {
                pages: metas.clone(),
                clear: true,
            }],
            BoardAction::AddStrokes { strokes, .. } => vec![RemoteOp::SendStrokes(strokes.clone())],
            BoardAction::EraseStrokes { erased, .. } => {
                vec![RemoteOp::EraseStrokes(erased.iter().map(Stroke::reference).collect())]
            }
            BoardAction::SetPageMeta { updates, .. } => vec![RemoteOp::UpdatePages {
                pages: updates.clone(),
                clear: false,
            }],
        }
    }

    /// Remote operations mirroring [`revert`](Self::revert).
    pub fn remote_undo(&self) -> Vec<RemoteOp> {
        match self {
            BoardAction::AddPages { pages } => vec![RemoteOp::DeletePages(
                pages.iter().map(|(page, _)| page.page_id.clone()).collect(),
            )],
            BoardAction::DeletePages { removed, .. } => {
                let (pages, indices) = removed.iter().rev().cloned().unzip();
                vec![RemoteOp::AddPages { pages, indices }]
            }
            BoardAction::ClearPages { cleared, .. } => vec![RemoteOp::SendStrokes(cleared.clone())],
            BoardAction::AddStrokes { strokes, replaced } => {
                let mut ops = vec![RemoteOp::EraseStrokes(strokes.iter().map(Stroke::reference).collect())];
                if !replaced.is_empty() {
                    ops.push(RemoteOp::SendStrokes(replaced.clone()));
                }
                ops
            }
            BoardAction::EraseStrokes { erased, .. } => vec![RemoteOp::SendStrokes(erased.clone())],
            BoardAction::SetPageMeta { previous, .. } => vec![RemoteOp::UpdatePages {
                pages: previous.clone(),
                clear: false,
            }],
        }
    }
}

/// An entry of the undo log.
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: BoardAction,
    /// Non-redoable actions are dropped by undo without being reverted.
    pub redoable: bool,
    /// Whether the action was recorded while a session was connected.
    pub synced: bool,
}

impl Action {
    pub fn new(kind: BoardAction) -> Self {
        Self {
            kind,
            redoable: true,
            synced: false,
        }
    }

    pub fn redoable(mut self, redoable: bool) -> Self {
        self.redoable = redoable;
        self
    }

    pub fn synced(mut self, synced: bool) -> Self {
        self.synced = synced;
        self
    }
}

/// Undo and redo stacks.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<Action>,
    redo_stack: Vec<Action>,
    max_len: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_UNDO_HISTORY)
    }
}

impl History {
    pub fn new(max_len: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    /// Apply a new action, push it and clear the redo stack.
    ///
    /// Returns the remote operations to dispatch if the action is synced.
    pub fn record(&mut self, board: &mut Board, mut action: Action) -> Vec<RemoteOp> {
        action.kind.apply(board);
        let ops = if action.synced {
            action.kind.remote_apply()
        } else {
            Vec::new()
        };

        self.undo_stack.push(action);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_len {
            self.undo_stack.remove(0);
        }
        ops
    }

    /// Revert the most recent action.
    ///
    /// Returns `None` if there is nothing to undo.
    pub fn undo(&mut self, board: &mut Board) -> Option<Vec<RemoteOp>> {
        let action = self.undo_stack.pop()?;
        if !action.redoable {
            log::debug!("Discarding non-redoable action");
            return Some(Vec::new());
        }

        action.kind.revert(board);
        let ops = if action.synced {
            action.kind.remote_undo()
        } else {
            Vec::new()
        };
        self.redo_stack.push(action);
        Some(ops)
    }

    /// Re-apply the most recently undone action.
    pub fn redo(&mut self, board: &mut Board) -> Option<Vec<RemoteOp>> {
        let mut action = self.redo_stack.pop()?;
        action.kind.apply(board);
        let ops = if action.synced {
            action.kind.remote_apply()
        } else {
            Vec::new()
        };
        self.undo_stack.push(action);
        Some(ops)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Background, BackgroundStyle};
    use crate::stroke::{StrokeKind, StrokeStyle};

    fn stroke(id: &str, page_id: &str) -> Stroke {
        let mut s = Stroke::new(StrokeKind::Pen, page_id, StrokeStyle::default(), vec![0.0, 0.0, 5.0, 5.0]);
        s.id = id.to_string();
        s
    }

    fn board_with_page(id: &str) -> Board {
        let mut board = Board::new();
        board.add_page(Page::with_id(id, PageMeta::default()), 0);
        board
    }

    fn stroke_ids(board: &Board, page_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = board.page(page_id).unwrap().strokes.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_record_then_undo_restores() {
        let mut board = board_with_page("p");
        let mut history = History::default();

        history.record(&mut board, Action::new(BoardAction::add_strokes(vec![stroke("s1", "p")])));
        assert_eq!(stroke_ids(&board, "p"), vec!["s1"]);

        history.undo(&mut board).unwrap();
        assert!(stroke_ids(&board, "p").is_empty());
        assert!(history.can_redo());

        history.redo(&mut board).unwrap();
        assert_eq!(stroke_ids(&board, "p"), vec!["s1"]);
    }

    #[test]
    fn test_new_action_clears_redo() {
        let mut board = board_with_page("p");
        let mut history = History::default();
        history.record(&mut board, Action::new(BoardAction::add_strokes(vec![stroke("s1", "p")])));
        history.undo(&mut board);
        assert_eq!(history.redo_len(), 1);

        history.record(&mut board, Action::new(BoardAction::add_strokes(vec![stroke("s2", "p")])));
        assert_eq!(history.redo_len(), 0);
        assert!(history.redo(&mut board).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut board = board_with_page("p");
        let mut history = History::new(3);
        for i in 0..5 {
            history.record(
                &mut board,
                Action::new(BoardAction::add_strokes(vec![stroke(&format!("s{i}"), "p")])),
            );
        }
        assert_eq!(history.undo_len(), 3);
    }

    #[test]
    fn test_empty_undo_redo() {
        let mut board = Board::new();
        let mut history = History::default();
        assert!(history.undo(&mut board).is_none());
        assert!(history.redo(&mut board).is_none());
    }

    #[test]
    fn test_non_redoable_action_is_discarded() {
        let mut board = board_with_page("p");
        let mut history = History::default();
        history.record(
            &mut board,
            Action::new(BoardAction::delete_pages(vec!["p".into()])).redoable(false),
        );
        assert!(board.is_empty());

        assert_eq!(history.undo(&mut board), Some(Vec::new()));
        assert!(board.is_empty());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_delete_pages_undo_restores_order() {
        let mut board = Board::new();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            board.add_page(Page::with_id(*id, PageMeta::default()), i);
        }
        board.add_strokes(vec![stroke("s1", "b")]);
        let mut history = History::default();
        history.record(
            &mut board,
            Action::new(BoardAction::delete_pages(vec!["b".into(), "d".into()])),
        );
        assert_eq!(board.page_rank(), ["a", "c"]);

        history.undo(&mut board);
        assert_eq!(board.page_rank(), ["a", "b", "c", "d"]);
        assert_eq!(stroke_ids(&board, "b"), vec!["s1"]);
    }

    #[test]
    fn test_clear_pages_undo() {
        let mut board = board_with_page("p");
        board.add_strokes(vec![stroke("s1", "p"), stroke("s2", "p")]);
        let mut history = History::default();
        history.record(&mut board, Action::new(BoardAction::clear_pages(vec!["p".into()])));
        assert!(stroke_ids(&board, "p").is_empty());

        history.undo(&mut board);
        assert_eq!(stroke_ids(&board, "p"), vec!["s1", "s2"]);
    }

    #[test]
    fn test_update_stroke_undo_restores_previous_version() {
        let mut board = board_with_page("p");
        board.add_strokes(vec![stroke("s1", "p")]);
        let mut moved = stroke("s1", "p");
        moved.points = vec![100.0, 100.0, 200.0, 200.0];

        let mut history = History::default();
        history.record(&mut board, Action::new(BoardAction::add_strokes(vec![moved])));
        history.undo(&mut board);
        assert_eq!(board.page("p").unwrap().strokes["s1"].points, vec![0.0, 0.0, 5.0, 5.0]);
    }

    #[test]
    fn test_set_meta_undo() {
        let mut board = board_with_page("p");
        let mut meta = PageMeta::default();
        meta.background = Background::pattern(BackgroundStyle::Ruled);

        let mut history = History::default();
        history.record(
            &mut board,
            Action::new(BoardAction::set_page_meta(vec![("p".into(), meta)])),
        );
        assert_eq!(board.page("p").unwrap().meta.background.style, BackgroundStyle::Ruled);

        history.undo(&mut board);
        assert_eq!(board.page("p").unwrap().meta.background.style, BackgroundStyle::Blank);
    }

    #[test]
    fn test_remote_ops_only_when_synced() {
        let mut board = board_with_page("p");
        let mut history = History::default();
        let ops = history.record(&mut board, Action::new(BoardAction::add_strokes(vec![stroke("s1", "p")])));
        assert!(ops.is_empty());

        let ops = history.record(
            &mut board,
            Action::new(BoardAction::add_strokes(vec![stroke("s2", "p")])).synced(true),
        );
        assert!(matches!(ops.as_slice(), [RemoteOp::SendStrokes(s)] if s[0].id == "s2"));

        let ops = history.undo(&mut board).unwrap();
        assert!(matches!(ops.as_slice(), [RemoteOp::EraseStrokes(r)] if r[0].id == "s2"));
    }

    #[test]
    fn test_remote_mapping_for_pages() {
        let mut board = Board::new();
        let mut action = BoardAction::add_pages(vec![(Page::with_id("a", PageMeta::default()), 5)]);
        action.apply(&mut board);
        assert!(matches!(
            action.remote_apply().as_slice(),
            [RemoteOp::AddPages { indices, .. }] if indices == &vec![0]
        ));
        assert_eq!(action.remote_undo(), vec![RemoteOp::DeletePages(vec!["a".into()])]);

        let mut clear = BoardAction::clear_pages(vec!["a".into()]);
        clear.apply(&mut board);
        assert!(matches!(
            clear.remote_apply().as_slice(),
            [RemoteOp::UpdatePages { clear: true, pages }] if pages[0].0 == "a"
        ));
    }
}
