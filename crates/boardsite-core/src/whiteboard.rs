//! Whiteboard controller.
//!
//! Ties the board, its undo log, pointer input and an optional session
//! together. Every local change is applied to the board first and then
//! mirrored to the session if one is connected; remote failures surface as
//! notifications and never roll the local change back.

use crate::board::Board;
use crate::config::ClientConfig;
use crate::history::{Action, BoardAction, History, RemoteOp};
use crate::input::{DrawInput, Gesture, MouseButton, PointerKind, PreviewSegment, Tool};
use crate::page::{Background, BackgroundStyle, Page, PageMeta, PageMetaPatch};
use crate::session::{self, BoardSession, SessionError, SessionEvent, SessionResult, User};
use crate::stroke::{PageId, Stroke, StrokeRef};
use kurbo::{Point, Rect};
use std::collections::VecDeque;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// The whiteboard client.
pub struct Whiteboard {
    config: ClientConfig,
    board: Board,
    history: History,
    input: DrawInput,
    user: User,
    session: Option<BoardSession>,
    /// Remote operations waiting to be dispatched.
    outbox: VecDeque<RemoteOp>,
    notifications: Vec<Notification>,
    selection: Vec<StrokeRef>,
    /// Incremented on every board change.
    revision: u64,
}

impl Whiteboard {
    /// A whiteboard with a single empty page.
    pub fn new(config: ClientConfig, user: User) -> Self {
        let mut board = Board::new();
        board.add_page(Board::create_page(config.default_page.clone()), 0);
        Self::with_board(config, user, board)
    }

    pub fn with_board(config: ClientConfig, user: User, board: Board) -> Self {
        Self {
            history: History::new(config.max_history),
            input: DrawInput::new(&config),
            config,
            board,
            user,
            session: None,
            outbox: VecDeque::new(),
            notifications: Vec::new(),
            selection: Vec::new(),
            revision: 0,
        }
    }

    /// Use `session` for the next connect instead of building one from the config.
    pub fn attach_session(&mut self, session: BoardSession) {
        self.session = Some(session);
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn session(&self) -> Option<&BoardSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut BoardSession> {
        self.session.as_mut()
    }

    pub fn is_online(&self) -> bool {
        self.session.as_ref().is_some_and(BoardSession::is_connected)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn selection(&self) -> &[StrokeRef] {
        &self.selection
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.input.tool = tool;
    }

    pub fn tool(&self) -> &Tool {
        &self.input.tool
    }

    /// Drain pending notifications.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotificationLevel::Info => log::info!("{}", message),
            NotificationLevel::Warning => log::warn!("{}", message),
            NotificationLevel::Error => log::error!("{}", message),
        }
        self.notifications.push(Notification { level, message });
    }

    // --- Session lifecycle ---

    fn take_session(&mut self) -> SessionResult<BoardSession> {
        match self.session.take() {
            Some(session) => Ok(session),
            None => BoardSession::new(&self.config, self.user.clone()),
        }
    }

    /// Join `session_id`, replacing the local board with the session's pages.
    pub fn connect(&mut self, session_id: &str, is_new_user: bool) -> SessionResult<()> {
        let mut session = match self.take_session() {
            Ok(session) => session,
            Err(e) => {
                self.notify(NotificationLevel::Error, format!("Cannot reach session: {}", e));
                return Err(e);
            }
        };
        session.set_id(session_id);
        let result = session.join(&mut self.board, is_new_user);
        self.session = Some(session);

        match &result {
            Ok(()) => {
                self.history.clear();
                self.outbox.clear();
                self.selection.clear();
                self.revision += 1;
                self.notify(NotificationLevel::Info, format!("Joined session {}", session_id));
            }
            Err(e) => self.notify(NotificationLevel::Error, format!("Failed to join session: {}", e)),
        }
        result
    }

    /// Create a session and join it. With `copy_offline` the local board
    /// becomes the session's initial content.
    pub fn create_session(&mut self, copy_offline: bool) -> SessionResult<String> {
        let mut session = self.take_session()?;
        let created = create_remote(&mut session, &self.board, copy_offline);
        self.session = Some(session);

        let sid = match created {
            Ok(sid) => sid,
            Err(e) => {
                self.notify(NotificationLevel::Error, format!("Failed to create session: {}", e));
                return Err(e);
            }
        };
        self.connect(&sid, !copy_offline)?;
        Ok(sid)
    }

    /// Leave the session. The board keeps its content.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.disconnect();
            self.outbox.clear();
            self.notify(NotificationLevel::Info, "Disconnected from session");
        }
    }

    /// Apply incoming session traffic. Returns whether the board changed.
    pub fn poll(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let events = session.poll_events();
        let mut changed = false;
        for event in events {
            changed |= self.apply_session_event(event);
        }
        if changed {
            self.revision += 1;
        }
        changed
    }

    fn apply_session_event(&mut self, event: SessionEvent) -> bool {
        let stroke_params = self.config.stroke_hitbox;
        match event {
            SessionEvent::Strokes { added, erased, .. } => {
                let added: Vec<Stroke> = added
                    .into_iter()
                    .filter(Stroke::is_valid)
                    .map(|mut stroke| {
                        stroke.calculate_hitboxes(&stroke_params);
                        stroke
                    })
                    .collect();
                self.board.add_strokes(added);
                self.board.erase_strokes(&erased);
                true
            }
            SessionEvent::UserConnected(user) => {
                self.notify(NotificationLevel::Info, format!("{} joined", user.alias));
                false
            }
            SessionEvent::UserDisconnected(user) => {
                self.notify(NotificationLevel::Info, format!("{} left", user.alias));
                false
            }
            SessionEvent::PageSync(sync) => {
                session::apply_page_sync(&mut self.board, sync);
                self.board.refresh_hitboxes(&stroke_params);
                true
            }
            SessionEvent::PageUpdate(updates) => {
                session::apply_page_updates(&mut self.board, updates);
                true
            }
            SessionEvent::Closed { reason } => {
                self.outbox.clear();
                let message = match reason {
                    Some(reason) => format!("Connection lost: {}", reason),
                    None => "Connection closed".to_string(),
                };
                self.notify(NotificationLevel::Error, message);
                false
            }
        }
    }

    // --- Recorded board changes ---

    fn record(&mut self, kind: BoardAction, redoable: bool) {
        let action = Action::new(kind).redoable(redoable).synced(self.is_online());
        let ops = self.history.record(&mut self.board, action);
        self.revision += 1;
        self.outbox.extend(ops);
        self.flush_remote();
    }

    fn flush_remote(&mut self) {
        while let Some(op) = self.outbox.pop_front() {
            let result = match &self.session {
                Some(session) if session.is_connected() => session.dispatch(&op),
                _ => {
                    log::debug!("Dropping remote operation while offline");
                    continue;
                }
            };
            if let Err(e) = result {
                self.notify(NotificationLevel::Error, format!("Sync failed: {}", e));
            }
        }
    }

    fn existing_pages(&self, page_ids: &[PageId]) -> Vec<PageId> {
        page_ids
            .iter()
            .filter(|id| self.board.page(id).is_some())
            .cloned()
            .collect()
    }

    /// Insert a new page at `index` and show it.
    pub fn add_page(&mut self, index: usize) -> PageId {
        let page = Board::create_page(self.config.default_page.clone());
        let page_id = page.page_id.clone();
        self.record(BoardAction::add_pages(vec![(page, index)]), true);
        if let Some(index) = self.board.page_index(&page_id) {
            self.board.set_current_page_index(index);
        }
        page_id
    }

    /// Insert a new page after the one in view.
    pub fn add_page_after_current(&mut self) -> PageId {
        let index = if self.board.is_empty() {
            0
        } else {
            self.board.current_page_index() + 1
        };
        self.add_page(index)
    }

    /// Remove all strokes from the given pages.
    pub fn clear_pages(&mut self, page_ids: &[PageId]) {
        let verified = self.existing_pages(page_ids);
        if verified.is_empty() {
            return;
        }
        self.record(BoardAction::clear_pages(verified), true);
    }

    pub fn clear_current_page(&mut self) {
        if let Some(id) = self.board.current_page_id().cloned() {
            self.clear_pages(&[id]);
        }
    }

    pub fn delete_pages(&mut self, page_ids: &[PageId], redoable: bool) {
        let verified = self.existing_pages(page_ids);
        if verified.is_empty() {
            return;
        }
        self.record(BoardAction::delete_pages(verified), redoable);
    }

    pub fn delete_current_page(&mut self) {
        if let Some(id) = self.board.current_page_id().cloned() {
            self.delete_pages(&[id], true);
        }
    }

    pub fn delete_all_pages(&mut self, redoable: bool) {
        let all = self.board.page_rank().to_vec();
        self.delete_pages(&all, redoable);
    }

    /// Commit strokes, replacing strokes with the same id.
    ///
    /// With `is_update` only strokes that already exist are taken.
    pub fn add_strokes(&mut self, strokes: Vec<Stroke>, is_update: bool) {
        let params = self.config.stroke_hitbox;
        let mut strokes: Vec<Stroke> = strokes
            .into_iter()
            .filter(|s| s.is_valid())
            .filter(|s| {
                self.board
                    .page(&s.page_id)
                    .is_some_and(|page| !is_update || page.strokes.contains_key(&s.id))
            })
            .map(|mut s| {
                s.calculate_hitboxes(&params);
                s
            })
            .collect();
        if strokes.is_empty() {
            return;
        }
        strokes.sort_by(|a, b| a.id.cmp(&b.id));
        self.record(BoardAction::add_strokes(strokes), true);
    }

    pub fn erase_strokes(&mut self, strokes: Vec<StrokeRef>) {
        if strokes.is_empty() {
            return;
        }
        self.selection.retain(|s| !strokes.contains(s));
        self.record(BoardAction::erase_strokes(strokes), true);
    }

    /// Merge `patch` into a page's metadata.
    pub fn set_page_meta(&mut self, page_id: &str, patch: &PageMetaPatch) {
        let Some(page) = self.board.page(page_id) else {
            return;
        };
        let meta = page.meta.merged(patch);
        if meta == page.meta {
            return;
        }
        self.record(BoardAction::set_page_meta(vec![(page_id.to_string(), meta)]), true);
    }

    /// Change the pattern of the page in view.
    ///
    /// Document pages keep their background, and `Doc` can only be set
    /// through [`import_document`](Self::import_document).
    pub fn set_page_background(&mut self, style: BackgroundStyle) -> bool {
        let Some(page) = self.board.current_page() else {
            return false;
        };
        if page.meta.background.style == BackgroundStyle::Doc || style == BackgroundStyle::Doc {
            self.notify(NotificationLevel::Warning, "Cannot change the background of a document page");
            return false;
        }
        let page_id = page.page_id.clone();
        self.set_page_meta(&page_id, &PageMetaPatch {
            size: None,
            background: Some(Background::pattern(style)),
        });
        true
    }

    /// Upload a document and add one page per document page after the page in view.
    pub fn import_document(&mut self, file_name: &str, data: Vec<u8>, page_count: u32) -> SessionResult<()> {
        let session = self.session.as_ref().ok_or(SessionError::NotConnected)?;
        let attach_id = match session.add_attachment(file_name, data) {
            Ok(id) => id,
            Err(e) => {
                self.notify(NotificationLevel::Error, format!("Upload failed: {}", e));
                return Err(e);
            }
        };

        let start = if self.board.is_empty() {
            0
        } else {
            self.board.current_page_index() + 1
        };
        let pages: Vec<(Page, usize)> = (0..page_count)
            .map(|n| {
                let meta = PageMeta {
                    size: self.config.default_page.size,
                    background: Background::document(attach_id.clone(), n),
                };
                (Board::create_page(meta), start + n as usize)
            })
            .collect();
        if !pages.is_empty() {
            self.record(BoardAction::add_pages(pages), true);
        }
        Ok(())
    }

    /// Undo the last change. Returns whether anything was undone.
    pub fn undo(&mut self) -> bool {
        let Some(ops) = self.history.undo(&mut self.board) else {
            return false;
        };
        self.revision += 1;
        if self.is_online() {
            self.outbox.extend(ops);
            self.flush_remote();
        }
        true
    }

    /// Redo the last undone change. Returns whether anything was redone.
    pub fn redo(&mut self) -> bool {
        let Some(ops) = self.history.redo(&mut self.board) else {
            return false;
        };
        self.revision += 1;
        if self.is_online() {
            self.outbox.extend(ops);
            self.flush_remote();
        }
        true
    }

    /// Show the page at `index`, clamped to the page range.
    pub fn jump_to_page(&mut self, index: usize) {
        self.board.set_current_page_index(index);
    }

    pub fn next_page(&mut self) {
        self.jump_to_page(self.board.current_page_index() + 1);
    }

    pub fn previous_page(&mut self) {
        self.jump_to_page(self.board.current_page_index().saturating_sub(1));
    }

    // --- Pointer input ---

    /// Start a gesture on the page in view.
    pub fn pointer_down(&mut self, pos: Point, pointer: PointerKind, button: MouseButton) {
        if let Some(page_id) = self.board.current_page_id().cloned() {
            self.input.pointer_down(page_id, pos, pointer, button);
        }
    }

    pub fn pointer_move(&mut self, pos: Point) -> Option<PreviewSegment> {
        self.input.pointer_move(pos)
    }

    pub fn pointer_up(&mut self, pos: Option<Point>) {
        if let Some(gesture) = self.input.pointer_up(pos) {
            self.handle_gesture(gesture);
        }
    }

    pub fn pointer_leave(&mut self, pos: Option<Point>) {
        if let Some(gesture) = self.input.pointer_leave(pos) {
            self.handle_gesture(gesture);
        }
    }

    fn handle_gesture(&mut self, gesture: Gesture) {
        match gesture {
            Gesture::Stroke(stroke) => self.add_strokes(vec![stroke], false),
            Gesture::Erase { page_id, hitbox } => {
                let params = self.config.stroke_hitbox;
                let hits = self.board.strokes_hit(&page_id, &hitbox, &params);
                self.erase_strokes(hits);
            }
            Gesture::Select { page_id, bounds } => self.select(&page_id, bounds),
        }
    }

    fn select(&mut self, page_id: &str, bounds: Rect) {
        let Some(page) = self.board.page(page_id) else {
            return;
        };
        let mut selection: Vec<StrokeRef> = page
            .strokes
            .values()
            .filter(|stroke| {
                stroke.hitboxes.as_ref().is_some_and(|hitbox| {
                    hitbox
                        .iter()
                        .any(|&(x, y)| bounds.contains(Point::new(x as f64, y as f64)))
                })
            })
            .map(Stroke::reference)
            .collect();
        selection.sort_by(|a, b| a.id.cmp(&b.id));
        self.selection = selection;
    }
}

fn create_remote(session: &mut BoardSession, board: &Board, copy_offline: bool) -> SessionResult<String> {
    let sid = session.create()?;
    if copy_offline {
        session.register_user()?;
        session.push_sync(board)?;
    }
    Ok(sid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SocketEvent;
    use crate::session::testing::{Shared, fake_session};
    use crate::stroke::{StrokeKind, StrokeStyle};
    use serde_json::{Value, json};

    fn offline() -> Whiteboard {
        Whiteboard::new(ClientConfig::default(), User::default())
    }

    fn online(state: &Shared) -> Whiteboard {
        let mut wb = offline();
        wb.attach_session(fake_session(state));
        wb.connect("sess1", true).unwrap();
        wb
    }

    fn current_page(wb: &Whiteboard) -> PageId {
        wb.board().current_page_id().unwrap().clone()
    }

    fn draw_line(wb: &mut Whiteboard, from: Point, to: Point) {
        wb.pointer_down(from, PointerKind::Mouse, MouseButton::Left);
        wb.pointer_move(to);
        wb.pointer_up(Some(to));
    }

    fn sent(state: &Shared) -> Vec<Value> {
        state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    #[test]
    fn test_new_board_has_one_page() {
        let wb = offline();
        assert_eq!(wb.board().page_count(), 1);
        assert!(!wb.is_online());
    }

    #[test]
    fn test_draw_and_undo_offline() {
        let mut wb = offline();
        let page = current_page(&wb);
        draw_line(&mut wb, Point::new(10.0, 10.0), Point::new(100.0, 10.0));

        let strokes = &wb.board().page(&page).unwrap().strokes;
        assert_eq!(strokes.len(), 1);
        let stroke = strokes.values().next().unwrap();
        assert!(stroke.hitboxes.as_ref().is_some_and(|h| h.contains(&(50, 10))));

        assert!(wb.undo());
        assert!(wb.board().page(&page).unwrap().is_empty());
        assert!(wb.redo());
        assert_eq!(wb.board().page(&page).unwrap().strokes.len(), 1);
        assert!(!wb.redo());
    }

    #[test]
    fn test_right_drag_erases_crossed_stroke() {
        let mut wb = offline();
        let page = current_page(&wb);
        draw_line(&mut wb, Point::new(10.0, 50.0), Point::new(100.0, 50.0));
        draw_line(&mut wb, Point::new(10.0, 300.0), Point::new(100.0, 300.0));

        wb.pointer_down(Point::new(50.0, 20.0), PointerKind::Mouse, MouseButton::Right);
        wb.pointer_move(Point::new(50.0, 80.0));
        wb.pointer_up(Some(Point::new(50.0, 80.0)));

        let strokes = &wb.board().page(&page).unwrap().strokes;
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes.values().next().unwrap().points[1], 300.0);
    }

    #[test]
    fn test_pages_add_delete_undo() {
        let mut wb = offline();
        let first = current_page(&wb);
        let second = wb.add_page_after_current();
        assert_eq!(wb.board().page_rank(), [first.clone(), second.clone()]);
        assert_eq!(wb.board().current_page_index(), 1);

        wb.delete_current_page();
        assert_eq!(wb.board().page_rank(), [first.clone()]);
        wb.undo();
        assert_eq!(wb.board().page_rank(), [first, second]);
    }

    #[test]
    fn test_delete_all_pages_is_not_undoable() {
        let mut wb = offline();
        wb.add_page(1);
        wb.delete_all_pages(false);
        assert!(wb.board().is_empty());
        assert!(wb.undo());
        assert!(wb.board().is_empty());
    }

    #[test]
    fn test_doc_background_is_protected() {
        let mut wb = offline();
        assert!(!wb.set_page_background(BackgroundStyle::Doc));
        assert!(wb.set_page_background(BackgroundStyle::Ruled));
        assert_eq!(
            wb.board().current_page().unwrap().meta.background.style,
            BackgroundStyle::Ruled
        );

        let notes = wb.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Warning);
    }

    #[test]
    fn test_connect_replaces_board_and_clears_history() {
        let state = Shared::default();
        let mut wb = offline();
        draw_line(&mut wb, Point::ZERO, Point::new(40.0, 40.0));
        wb.attach_session(fake_session(&state));
        wb.connect("sess1", true).unwrap();

        assert!(wb.is_online());
        assert!(wb.board().is_empty());
        assert!(!wb.history().can_undo());
    }

    #[test]
    fn test_connect_failure_notifies() {
        let state = Shared::default();
        state.lock().unwrap().fail_sync = true;
        let mut wb = offline();
        wb.attach_session(fake_session(&state));

        assert!(wb.connect("sess1", true).is_err());
        assert!(!wb.is_online());
        let notes = wb.take_notifications();
        assert!(notes.iter().any(|n| n.level == NotificationLevel::Error));
    }

    #[test]
    fn test_online_stroke_and_undo_are_broadcast() {
        let state = Shared::default();
        let mut wb = online(&state);
        let page = wb.add_page(0);
        let stroke = Stroke::new(StrokeKind::Pen, page, StrokeStyle::default(), vec![0.0, 0.0, 9.0, 9.0]);
        let id = stroke.id.clone();
        wb.add_strokes(vec![stroke], false);
        wb.undo();

        let sent = sent(&state);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["content"][0]["id"], Value::String(id.clone()));
        assert_eq!(sent[1]["content"][0]["type"], "eraser");
        assert_eq!(sent[1]["content"][0]["id"], Value::String(id));

        let requests = state.lock().unwrap().requests.clone();
        assert!(requests.iter().any(|r| r.starts_with("POST pages")));
    }

    #[test]
    fn test_offline_actions_are_not_replayed_remotely() {
        let state = Shared::default();
        let mut wb = offline();
        let page = current_page(&wb);
        wb.add_strokes(vec![Stroke::new(
            StrokeKind::Pen,
            page,
            StrokeStyle::default(),
            vec![0.0, 0.0, 9.0, 9.0],
        )], false);
        wb.attach_session(fake_session(&state));
        wb.connect("sess1", true).unwrap();
        assert!(!wb.undo());
        assert!(sent(&state).is_empty());
    }

    #[test]
    fn test_remote_strokes_bypass_history() {
        let state = Shared::default();
        let mut wb = online(&state);
        let page = wb.add_page(0);
        let undo_len = wb.history().undo_len();

        let msg = json!({"type": "stroke", "sender": "user2", "content": [
            {"id": "r1", "pageId": page, "type": "pen", "points": [0, 0, 30, 0]}
        ]});
        state
            .lock()
            .unwrap()
            .inbound
            .push_back(SocketEvent::Message(msg.to_string()));

        assert!(wb.poll());
        let stroke = &wb.board().page(&page).unwrap().strokes["r1"];
        assert!(stroke.hitboxes.is_some());
        assert_eq!(wb.history().undo_len(), undo_len);
    }

    #[test]
    fn test_remote_stroke_with_huge_coordinates_is_dropped() {
        let state = Shared::default();
        let mut wb = online(&state);
        let page = wb.add_page(0);

        let msg = json!({"type": "stroke", "sender": "user2", "content": [
            {"id": "r1", "pageId": page, "type": "pen", "points": [-1e300, 0, 1e300, 0]},
            {"id": "r2", "pageId": page, "type": "pen", "points": [0, 0, 1e10, 0]},
            {"id": "r3", "pageId": page, "type": "pen", "points": [0, 0, 30, 0]}
        ]});
        state
            .lock()
            .unwrap()
            .inbound
            .push_back(SocketEvent::Message(msg.to_string()));

        wb.poll();
        let strokes = &wb.board().page(&page).unwrap().strokes;
        assert_eq!(strokes.len(), 1);
        assert!(strokes.contains_key("r3"));
    }

    #[test]
    fn test_connect_to_other_session_moves_socket() {
        let state = Shared::default();
        let mut wb = online(&state);
        wb.connect("sess2", false).unwrap();

        assert!(wb.is_online());
        assert_eq!(wb.session().and_then(BoardSession::id), Some("sess2"));
        let requests = state.lock().unwrap().requests.clone();
        let last_connect = requests.iter().rev().find(|r| r.starts_with("CONNECT")).unwrap();
        assert!(last_connect.ends_with("/b/sess2/users/user1/socket"));

        let page = wb.add_page(0);
        wb.add_strokes(
            vec![Stroke::new(StrokeKind::Pen, page, StrokeStyle::default(), vec![0.0, 0.0, 9.0, 9.0])],
            false,
        );
        assert_eq!(sent(&state).len(), 1);
    }

    #[test]
    fn test_connection_loss_is_reported() {
        let state = Shared::default();
        let mut wb = online(&state);
        wb.take_notifications();
        state.lock().unwrap().inbound.push_back(SocketEvent::Error {
            message: "reset by peer".to_string(),
        });

        wb.poll();
        assert!(!wb.is_online());
        let notes = wb.take_notifications();
        assert_eq!(notes[0].message, "Connection lost: reset by peer");
    }

    #[test]
    fn test_create_session_copies_offline_board() {
        let state = Shared::default();
        let mut wb = offline();
        let page = current_page(&wb);
        wb.attach_session(fake_session(&state));

        let sid = wb.create_session(true).unwrap();
        assert_eq!(sid, "sess1");
        let requests = state.lock().unwrap().requests.clone();
        assert_eq!(requests[0], "POST create");
        assert_eq!(requests[1], "POST users");
        assert_eq!(requests[2], format!("POST sync [\"{}\"]", page));
        assert!(!requests.iter().skip(3).any(|r| r == "POST users"));
    }

    #[test]
    fn test_update_only_touches_existing_strokes() {
        let mut wb = offline();
        let page = current_page(&wb);
        let mut first = Stroke::new(StrokeKind::Pen, page.clone(), StrokeStyle::default(), vec![0.0, 0.0, 9.0, 9.0]);
        first.id = "a".to_string();
        wb.add_strokes(vec![first.clone()], false);

        let moved = Stroke {
            points: vec![5.0, 5.0, 20.0, 20.0],
            ..first
        };
        let mut unknown = moved.clone();
        unknown.id = "b".to_string();
        wb.add_strokes(vec![moved, unknown], true);

        let strokes = &wb.board().page(&page).unwrap().strokes;
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes["a"].points, vec![5.0, 5.0, 20.0, 20.0]);

        wb.undo();
        assert_eq!(wb.board().page(&page).unwrap().strokes["a"].points, vec![0.0, 0.0, 9.0, 9.0]);
    }

    #[test]
    fn test_select_rectangle() {
        let mut wb = offline();
        draw_line(&mut wb, Point::new(10.0, 10.0), Point::new(40.0, 10.0));
        draw_line(&mut wb, Point::new(300.0, 300.0), Point::new(340.0, 300.0));
        wb.set_tool(Tool {
            kind: StrokeKind::Select,
            style: StrokeStyle::default(),
        });
        wb.pointer_down(Point::ZERO, PointerKind::Mouse, MouseButton::Left);
        wb.pointer_up(Some(Point::new(100.0, 100.0)));
        assert_eq!(wb.selection().len(), 1);
    }

    #[test]
    fn test_import_document_adds_doc_pages() {
        let state = Shared::default();
        let mut wb = online(&state);
        wb.add_page(0);
        wb.import_document("slides.pdf", vec![1, 2, 3], 2).unwrap();

        assert_eq!(wb.board().page_count(), 3);
        let backgrounds: Vec<Background> = wb
            .board()
            .pages()
            .skip(1)
            .map(|p| p.meta.background.clone())
            .collect();
        assert_eq!(backgrounds[0], Background::document("att1", 0));
        assert_eq!(backgrounds[1], Background::document("att1", 1));
    }
}
