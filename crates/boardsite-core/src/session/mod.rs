//! Board session: the connection of a local board to a shared session.
//!
//! A session owns the HTTP API used for page-level changes and the socket
//! that carries stroke traffic and server pushes. Both sit behind traits so
//! they can be replaced in tests.

pub mod api;
pub mod message;
pub mod socket;

pub use api::{HttpApi, SessionApi};
pub use message::{ConnectedUsers, Message, MessageType, PageSync, PageSyncEntry, PageUpdate, User};
pub use socket::{ConnectionState, NativeWebSocket, SocketEvent, Transport};

use crate::board::Board;
use crate::config::ClientConfig;
use crate::history::RemoteOp;
use crate::page::{Page, PageMeta};
use crate::stroke::{PageId, Stroke, StrokeRef};
use message::{StrokeDelete, split_stroke_content};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Pause between socket polls while waiting for the handshake.
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Not connected to a session")]
    NotConnected,
    #[error("User is not registered in the session")]
    NotRegistered,
    #[error("User {0} is not known to the session")]
    UnknownUser(String),
    #[error("Socket error: {0}")]
    Socket(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Events surfaced to the board owner by [`BoardSession::poll_events`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Strokes added or erased by another user.
    Strokes {
        sender: String,
        added: Vec<Stroke>,
        erased: Vec<StrokeRef>,
    },
    UserConnected(User),
    UserDisconnected(User),
    /// Full page state pushed by the server.
    PageSync(PageSync),
    /// Metadata or clear pushes for individual pages.
    PageUpdate(Vec<PageUpdate>),
    /// The socket closed. The session is reset.
    Closed { reason: Option<String> },
}

/// A connection to a shared board session.
pub struct BoardSession {
    id: Option<String>,
    api_url: Url,
    user: User,
    users: ConnectedUsers,
    api: Box<dyn SessionApi>,
    socket: Box<dyn Transport>,
    socket_timeout: Duration,
    /// Socket events read while waiting for the handshake.
    pending: VecDeque<SocketEvent>,
}

impl BoardSession {
    /// Session using the HTTP API and native socket configured in `config`.
    pub fn new(config: &ClientConfig, user: User) -> SessionResult<Self> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| SessionError::Network(format!("Invalid API URL {}: {}", config.api_url, e)))?;
        let api = HttpApi::new(&api_url, Duration::from_millis(config.request_timeout_ms))?;
        Ok(Self::with_backends(
            api_url,
            user,
            Box::new(api),
            Box::new(NativeWebSocket::new()),
            Duration::from_millis(config.socket_timeout_ms),
        ))
    }

    pub fn with_backends(
        api_url: Url,
        user: User,
        api: Box<dyn SessionApi>,
        socket: Box<dyn Transport>,
        socket_timeout: Duration,
    ) -> Self {
        Self {
            id: None,
            api_url,
            user,
            users: ConnectedUsers::new(),
            api,
            socket,
            socket_timeout,
            pending: VecDeque::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Select the session to join.
    ///
    /// Switching to a different session closes the socket and drops the
    /// registration of the previous one.
    pub fn set_id(&mut self, session_id: impl Into<String>) {
        let sid = session_id.into();
        if let Some(current) = self.id.as_deref().filter(|current| *current != sid) {
            log::info!("Leaving session {} for {}", current, sid);
            self.reset();
        }
        self.api.set_session_id(Some(sid.clone()));
        self.id = Some(sid);
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.id.as_deref()
    }

    pub fn users(&self) -> &ConnectedUsers {
        &self.users
    }

    /// Joined and the socket is open.
    pub fn is_connected(&self) -> bool {
        self.id.is_some() && self.user.id.is_some() && self.socket.is_open()
    }

    /// Create a new session on the server and select it.
    pub fn create(&mut self) -> SessionResult<String> {
        let sid = self.api.post_session()?;
        log::info!("Created session {}", sid);
        self.set_id(sid.clone());
        Ok(sid)
    }

    /// Register the local user in the selected session.
    pub fn register_user(&mut self) -> SessionResult<()> {
        if self.id.is_none() {
            return Err(SessionError::NotConnected);
        }
        let registered = self.api.post_user(&self.user)?;
        log::info!("Registered as user {:?}", registered.id);
        self.api.set_user_id(registered.id.clone());
        self.user = registered;
        Ok(())
    }

    /// Open the socket for `session_id` and wait for the handshake.
    pub fn create_socket(&mut self, session_id: &str) -> SessionResult<()> {
        let uid = self.user.id.clone().ok_or(SessionError::NotRegistered)?;
        let url = socket::socket_url(&self.api_url, session_id, &uid)?;
        self.socket.connect(&url)?;

        let deadline = Instant::now() + self.socket_timeout;
        loop {
            for event in self.socket.poll_events() {
                match event {
                    SocketEvent::Connected => {}
                    SocketEvent::Error { message } => {
                        self.socket.disconnect();
                        return Err(SessionError::Socket(message));
                    }
                    SocketEvent::Disconnected => {
                        self.socket.disconnect();
                        return Err(SessionError::Socket("socket closed during handshake".to_string()));
                    }
                    SocketEvent::Message(text) => self.pending.push_back(SocketEvent::Message(text)),
                }
            }
            if self.socket.is_open() {
                log::info!("Socket open for session {}", session_id);
                return Ok(());
            }
            if Instant::now() >= deadline {
                self.socket.disconnect();
                return Err(SessionError::Network("socket handshake timed out".to_string()));
            }
            std::thread::sleep(CONNECT_POLL_INTERVAL);
        }
    }

    /// Join the selected session and replace `board` with its content.
    ///
    /// Any failure leaves the session disconnected and unregistered.
    pub fn join(&mut self, board: &mut Board, is_new_user: bool) -> SessionResult<()> {
        let result = self.try_join(board, is_new_user);
        if let Err(e) = &result {
            log::warn!("Failed to join session: {}", e);
            self.reset();
        }
        result
    }

    fn try_join(&mut self, board: &mut Board, is_new_user: bool) -> SessionResult<()> {
        let sid = self.id.clone().ok_or(SessionError::NotConnected)?;
        if is_new_user || self.user.id.is_none() {
            self.register_user()?;
        }
        if !self.socket.is_open() {
            self.create_socket(&sid)?;
        }

        let users = self.api.get_users()?;
        let uid = self.user.id.clone().ok_or(SessionError::NotRegistered)?;
        if !users.contains_key(&uid) {
            return Err(SessionError::UnknownUser(uid));
        }
        self.users = users;

        let sync = self.api.get_pages_sync()?;
        apply_page_sync(board, sync);
        log::info!("Joined session {} with {} pages", sid, board.page_count());
        Ok(())
    }

    /// Close the socket and forget the session.
    pub fn disconnect(&mut self) {
        self.socket.disconnect();
        self.reset();
    }

    fn reset(&mut self) {
        if self.socket.state() != ConnectionState::Disconnected {
            self.socket.disconnect();
        }
        self.id = None;
        self.user.id = None;
        self.users.clear();
        self.pending.clear();
        self.api.set_session_id(None);
        self.api.set_user_id(None);
    }

    fn send<T: Serialize>(&self, kind: MessageType, content: Vec<T>) -> SessionResult<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let message = Message {
            kind,
            sender: self.user.id.clone().unwrap_or_default(),
            content,
        };
        let text = serde_json::to_string(&message).map_err(|e| SessionError::Decode(e.to_string()))?;
        self.socket.send(&text)
    }

    /// Broadcast strokes. Strokes without an id or page are dropped.
    pub fn send_strokes(&self, strokes: &[Stroke]) -> SessionResult<()> {
        let uid = self.user.id.clone();
        let content: Vec<Stroke> = strokes
            .iter()
            .filter(|s| s.has_identity())
            .map(|s| Stroke {
                user_id: uid.clone(),
                hitboxes: None,
                ..s.clone()
            })
            .collect();
        if content.len() < strokes.len() {
            log::debug!("Dropped {} strokes without id or page", strokes.len() - content.len());
        }
        if content.is_empty() {
            return Ok(());
        }
        self.send(MessageType::Stroke, content)
    }

    /// Broadcast delete instructions for strokes.
    pub fn erase_strokes(&self, strokes: &[StrokeRef]) -> SessionResult<()> {
        let uid = self.user.id.clone().unwrap_or_default();
        let content: Vec<StrokeDelete> = strokes
            .iter()
            .filter(|s| !s.id.is_empty() && !s.page_id.is_empty())
            .map(|s| StrokeDelete::new(s, &uid))
            .collect();
        if content.is_empty() {
            return Ok(());
        }
        self.send(MessageType::Stroke, content)
    }

    /// Track a user that joined the session. Users without an id are ignored.
    pub fn user_connect(&mut self, user: User) {
        if let Some(id) = user.id.clone() {
            log::info!("User {} ({}) connected", user.alias, id);
            self.users.insert(id, user);
        }
    }

    pub fn user_disconnect(&mut self, user: &User) {
        if let Some(id) = &user.id {
            log::info!("User {} ({}) disconnected", user.alias, id);
            self.users.remove(id);
        }
    }

    /// Change the local user's alias or color.
    pub fn update_user(&mut self, alias: Option<String>, color: Option<String>) -> SessionResult<()> {
        if let Some(alias) = alias {
            self.user.alias = alias;
        }
        if let Some(color) = color {
            self.user.color = color;
        }
        if self.user.id.is_some() {
            self.api.put_user(&self.user)?;
        }
        Ok(())
    }

    fn require_session(&self) -> SessionResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    pub fn add_pages(&self, pages: &[Page], indices: &[usize]) -> SessionResult<()> {
        self.require_session()?;
        let pages: Vec<(PageId, PageMeta)> = pages.iter().map(|p| (p.page_id.clone(), p.meta.clone())).collect();
        self.api.post_pages(&pages, indices)
    }

    pub fn delete_pages(&self, page_ids: &[PageId]) -> SessionResult<()> {
        self.require_session()?;
        self.api.delete_pages(page_ids)
    }

    /// Push page metadata, or clear the pages' strokes when `clear` is set.
    pub fn update_pages(&self, pages: &[(PageId, PageMeta)], clear: bool) -> SessionResult<()> {
        self.require_session()?;
        if clear {
            let ids: Vec<PageId> = pages.iter().map(|(id, _)| id.clone()).collect();
            self.api.clear_pages(&ids)
        } else {
            let meta: HashMap<PageId, PageMeta> = pages.iter().cloned().collect();
            self.api.update_pages_meta(&meta)
        }
    }

    /// Upload the whole board, replacing the session content.
    pub fn push_sync(&self, board: &Board) -> SessionResult<()> {
        if self.id.is_none() {
            return Err(SessionError::NotConnected);
        }
        let sync = PageSync {
            page_rank: board.page_rank().to_vec(),
            pages: board
                .pages()
                .map(|p| (p.page_id.clone(), PageSyncEntry::from_page(p)))
                .collect(),
        };
        self.api.post_pages_sync(&sync)
    }

    /// Reload one page from the server.
    pub fn refresh_page(&self, board: &mut Board, page_id: &str) -> SessionResult<()> {
        self.require_session()?;
        let page = self.api.get_page(page_id)?.into_page();
        if !board.replace_page(page) {
            log::debug!("Refreshed page {} is not on the board", page_id);
        }
        Ok(())
    }

    /// Reload the page order from the server.
    pub fn refresh_rank(&self, board: &mut Board) -> SessionResult<()> {
        self.require_session()?;
        board.set_page_rank(self.api.get_page_rank()?);
        Ok(())
    }

    pub fn add_attachment(&self, file_name: &str, data: Vec<u8>) -> SessionResult<String> {
        self.require_session()?;
        self.api.post_attachment(file_name, data)
    }

    pub fn get_attachment(&self, attach_id: &str) -> SessionResult<Vec<u8>> {
        self.require_session()?;
        self.api.get_attachment(attach_id)
    }

    /// Public URL of an attachment of the current session.
    pub fn attachment_url(&self, attach_id: &str) -> SessionResult<Url> {
        let sid = self.id.as_deref().ok_or(SessionError::NotConnected)?;
        self.api_url
            .join(&format!("b/{}/attachments/{}", sid, attach_id))
            .map_err(|e| SessionError::Network(e.to_string()))
    }

    /// Send the remote counterpart of a local board change.
    pub fn dispatch(&self, op: &RemoteOp) -> SessionResult<()> {
        match op {
            RemoteOp::SendStrokes(strokes) => self.send_strokes(strokes),
            RemoteOp::EraseStrokes(refs) => self.erase_strokes(refs),
            RemoteOp::AddPages { pages, indices } => self.add_pages(pages, indices),
            RemoteOp::DeletePages(ids) => self.delete_pages(ids),
            RemoteOp::UpdatePages { pages, clear } => self.update_pages(pages, *clear),
        }
    }

    /// Drain socket traffic into session events.
    ///
    /// User presence is tracked here; stroke echoes of the local user are
    /// dropped.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut raw: Vec<SocketEvent> = self.pending.drain(..).collect();
        raw.extend(self.socket.poll_events());

        let mut events = Vec::new();
        for event in raw {
            match event {
                SocketEvent::Message(text) => events.extend(self.handle_message(&text)),
                SocketEvent::Connected => {}
                SocketEvent::Disconnected => {
                    if self.id.is_some() {
                        self.reset();
                        events.push(SessionEvent::Closed { reason: None });
                    }
                }
                SocketEvent::Error { message } => {
                    self.reset();
                    events.push(SessionEvent::Closed { reason: Some(message) });
                }
            }
        }
        events
    }

    fn handle_message(&mut self, text: &str) -> Option<SessionEvent> {
        let message: Message<serde_json::Value> = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Dropping unparsable socket message: {}", e);
                return None;
            }
        };
        log::debug!("Received {:?} message from {}", message.kind, message.sender);

        match message.kind {
            MessageType::Stroke => {
                if self.user.id.as_deref() == Some(message.sender.as_str()) {
                    return None;
                }
                let (added, erased) = split_stroke_content(message.content);
                (!added.is_empty() || !erased.is_empty()).then_some(SessionEvent::Strokes {
                    sender: message.sender,
                    added,
                    erased,
                })
            }
            MessageType::UserConnected => {
                let user: User = decode_first(message.content)?;
                if user.id.is_none() {
                    return None;
                }
                self.user_connect(user.clone());
                Some(SessionEvent::UserConnected(user))
            }
            MessageType::UserDisconnected => {
                let user: User = decode_first(message.content)?;
                self.user_disconnect(&user);
                Some(SessionEvent::UserDisconnected(user))
            }
            MessageType::PageSync => decode_first(message.content).map(SessionEvent::PageSync),
            MessageType::PageUpdate => {
                let updates: Vec<PageUpdate> = message
                    .content
                    .into_iter()
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect();
                (!updates.is_empty()).then_some(SessionEvent::PageUpdate(updates))
            }
        }
    }
}

fn decode_first<T: serde::de::DeserializeOwned>(content: Vec<serde_json::Value>) -> Option<T> {
    let first = content.into_iter().next()?;
    match serde_json::from_value(first) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Dropping malformed message content: {}", e);
            None
        }
    }
}

/// Replace the board with a snapshot.
///
/// Pages whose stroke list was omitted keep the local strokes of the same id.
pub fn apply_page_sync(board: &mut Board, sync: PageSync) {
    let keep_local: HashSet<PageId> = sync
        .pages
        .iter()
        .filter(|(_, entry)| entry.strokes.is_none())
        .map(|(id, _)| id.clone())
        .collect();
    let pages: HashMap<PageId, Page> = sync
        .pages
        .into_iter()
        .map(|(id, entry)| (id.clone(), Page { page_id: id, ..entry.into_page() }))
        .collect();
    board.sync_pages(sync.page_rank, pages, &keep_local);
}

/// Apply page pushes from the server to the board.
pub fn apply_page_updates(board: &mut Board, updates: Vec<PageUpdate>) {
    for update in updates {
        if let Some(meta) = update.meta {
            board.set_page_meta(&update.page_id, meta);
        }
        if update.clear {
            board.clear_page(&update.page_id);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory API and transport for session tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    /// Everything the fakes were asked to do.
    #[derive(Debug, Default)]
    pub struct Recorded {
        pub requests: Vec<String>,
        pub sent: Vec<String>,
        pub inbound: VecDeque<SocketEvent>,
        pub users: ConnectedUsers,
        pub sync: PageSync,
        pub fail_sync: bool,
        pub refuse_socket: bool,
    }

    pub type Shared = Arc<Mutex<Recorded>>;

    pub struct FakeApi {
        pub state: Shared,
        pub user_id: Option<String>,
    }

    impl FakeApi {
        fn log(&self, line: impl Into<String>) {
            self.state.lock().unwrap().requests.push(line.into());
        }
    }

    impl SessionApi for FakeApi {
        fn set_session_id(&mut self, _session_id: Option<String>) {}

        fn set_user_id(&mut self, user_id: Option<String>) {
            self.user_id = user_id;
        }

        fn post_session(&self) -> SessionResult<String> {
            self.log("POST create");
            Ok("sess1".to_string())
        }

        fn post_user(&mut self, user: &User) -> SessionResult<User> {
            self.log("POST users");
            let registered = User {
                id: Some("user1".to_string()),
                ..user.clone()
            };
            self.state
                .lock()
                .unwrap()
                .users
                .insert("user1".to_string(), registered.clone());
            Ok(registered)
        }

        fn put_user(&self, user: &User) -> SessionResult<()> {
            self.log(format!("PUT user {}", user.alias));
            Ok(())
        }

        fn get_users(&self) -> SessionResult<ConnectedUsers> {
            self.log("GET users");
            Ok(self.state.lock().unwrap().users.clone())
        }

        fn get_page_rank(&self) -> SessionResult<Vec<PageId>> {
            Ok(self.state.lock().unwrap().sync.page_rank.clone())
        }

        fn get_page(&self, page_id: &str) -> SessionResult<PageSyncEntry> {
            self.state
                .lock()
                .unwrap()
                .sync
                .pages
                .get(page_id)
                .cloned()
                .ok_or(SessionError::Status {
                    status: 404,
                    body: "page not found".to_string(),
                })
        }

        fn post_pages(&self, pages: &[(PageId, PageMeta)], indices: &[usize]) -> SessionResult<()> {
            let ids: Vec<&str> = pages.iter().map(|(id, _)| id.as_str()).collect();
            self.log(format!("POST pages {:?} at {:?}", ids, indices));
            Ok(())
        }

        fn update_pages_meta(&self, meta: &HashMap<PageId, PageMeta>) -> SessionResult<()> {
            let mut ids: Vec<&String> = meta.keys().collect();
            ids.sort();
            self.log(format!("PUT meta {:?}", ids));
            Ok(())
        }

        fn clear_pages(&self, page_ids: &[PageId]) -> SessionResult<()> {
            self.log(format!("PUT clear {:?}", page_ids));
            Ok(())
        }

        fn delete_pages(&self, page_ids: &[PageId]) -> SessionResult<()> {
            self.log(format!("PUT delete {:?}", page_ids));
            Ok(())
        }

        fn get_pages_sync(&self) -> SessionResult<PageSync> {
            self.log("GET sync");
            let state = self.state.lock().unwrap();
            if state.fail_sync {
                return Err(SessionError::Network("request timed out".to_string()));
            }
            Ok(state.sync.clone())
        }

        fn post_pages_sync(&self, sync: &PageSync) -> SessionResult<()> {
            self.log(format!("POST sync {:?}", sync.page_rank));
            Ok(())
        }

        fn post_attachment(&self, file_name: &str, _data: Vec<u8>) -> SessionResult<String> {
            self.log(format!("POST attachment {}", file_name));
            Ok("att1".to_string())
        }

        fn get_attachment(&self, _attach_id: &str) -> SessionResult<Vec<u8>> {
            Ok(b"%PDF".to_vec())
        }
    }

    pub struct FakeTransport {
        pub state: Shared,
        pub conn: ConnectionState,
    }

    impl Transport for FakeTransport {
        fn connect(&mut self, url: &Url) -> SessionResult<()> {
            let mut state = self.state.lock().unwrap();
            state.requests.push(format!("CONNECT {}", url));
            if state.refuse_socket {
                state.inbound.push_back(SocketEvent::Error {
                    message: "refused".to_string(),
                });
            } else {
                state.inbound.push_back(SocketEvent::Connected);
            }
            self.conn = ConnectionState::Connecting;
            Ok(())
        }

        fn disconnect(&mut self) {
            self.conn = ConnectionState::Disconnected;
        }

        fn send(&self, text: &str) -> SessionResult<()> {
            if self.conn != ConnectionState::Connected {
                return Err(SessionError::NotConnected);
            }
            self.state.lock().unwrap().sent.push(text.to_string());
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<SocketEvent> {
            let events: Vec<SocketEvent> = self.state.lock().unwrap().inbound.drain(..).collect();
            for event in &events {
                match event {
                    SocketEvent::Connected => self.conn = ConnectionState::Connected,
                    SocketEvent::Disconnected | SocketEvent::Error { .. } => {
                        self.conn = ConnectionState::Disconnected
                    }
                    SocketEvent::Message(_) => {}
                }
            }
            events
        }

        fn state(&self) -> ConnectionState {
            self.conn
        }
    }

    /// A session wired to fakes sharing `state`.
    pub fn fake_session(state: &Shared) -> BoardSession {
        BoardSession::with_backends(
            Url::parse("http://localhost:8000/").unwrap(),
            User {
                id: None,
                alias: "ann".to_string(),
                color: "#ff0000".to_string(),
            },
            Box::new(FakeApi {
                state: state.clone(),
                user_id: None,
            }),
            Box::new(FakeTransport {
                state: state.clone(),
                conn: ConnectionState::Disconnected,
            }),
            Duration::from_millis(200),
        )
    }

    /// A session that already joined `sess1` as `user1`.
    pub fn joined_session(state: &Shared, board: &mut Board) -> BoardSession {
        let mut session = fake_session(state);
        session.set_id("sess1");
        session.join(board, true).unwrap();
        session
    }
}
