//! Board socket transport.
//!
//! The native client runs the socket on a background thread and exchanges
//! raw text frames with the session over channels.

use super::{SessionError, SessionResult};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Read timeout of the socket thread between command checks.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Socket connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Handshake finished.
    Connected,
    /// The socket closed, cleanly or not.
    Disconnected,
    /// A text frame arrived.
    Message(String),
    Error { message: String },
}

/// A message-oriented duplex connection to the board backend.
pub trait Transport: Send {
    /// Start connecting. Completion is reported through [`poll_events`](Self::poll_events).
    fn connect(&mut self, url: &Url) -> SessionResult<()>;

    fn disconnect(&mut self);

    /// Queue a text frame.
    fn send(&self, text: &str) -> SessionResult<()>;

    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<SocketEvent>;

    fn state(&self) -> ConnectionState;

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

enum SocketCommand {
    Send(String),
    Close,
}

/// WebSocket transport for native platforms.
pub struct NativeWebSocket {
    state: ConnectionState,
    cmd_tx: Option<Sender<SocketCommand>>,
    event_rx: Option<Receiver<SocketEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }
}

impl Default for NativeWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Transport for NativeWebSocket {
    fn connect(&mut self, url: &Url) -> SessionResult<()> {
        if self.cmd_tx.is_some() {
            return Err(SessionError::Socket("Socket already open".to_string()));
        }
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(SessionError::Socket(format!("Invalid socket URL scheme: {}", url.scheme())));
        }

        self.state = ConnectionState::Connecting;
        let (cmd_tx, cmd_rx) = channel::<SocketCommand>();
        let (event_tx, event_rx) = channel::<SocketEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || {
            log::info!("Socket thread: connecting to {}", url);
            let (mut socket, response) = match connect(url.as_str()) {
                Ok(pair) => pair,
                Err(e) => {
                    log::error!("Socket connection failed: {}", e);
                    let _ = event_tx.send(SocketEvent::Error {
                        message: format!("Connection failed: {}", e),
                    });
                    return;
                }
            };
            log::info!("Socket connected, status: {}", response.status());
            let _ = event_tx.send(SocketEvent::Connected);

            match socket.get_mut() {
                tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
                    let _ = tcp.set_read_timeout(Some(READ_POLL_INTERVAL));
                    let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                }
                #[allow(unreachable_patterns)]
                _ => log::debug!("Non-plain stream, using default timeouts"),
            }

            loop {
                match cmd_rx.try_recv() {
                    Ok(SocketCommand::Send(text)) => {
                        log::debug!("Socket sending: {}", &text[..text.len().min(100)]);
                        if let Err(e) = socket.send(Message::Text(text)) {
                            log::error!("Socket send error: {}", e);
                            let _ = event_tx.send(SocketEvent::Error {
                                message: format!("Send failed: {}", e),
                            });
                            break;
                        }
                    }
                    Ok(SocketCommand::Close) | Err(TryRecvError::Disconnected) => {
                        let _ = socket.close(None);
                        break;
                    }
                    Err(TryRecvError::Empty) => {}
                }

                match socket.read() {
                    Ok(Message::Text(text)) => {
                        let _ = event_tx.send(SocketEvent::Message(text));
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = socket.send(Message::Pong(data));
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("Socket received close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        log::error!("Socket read error: {}", e);
                        let _ = event_tx.send(SocketEvent::Error {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }

            log::info!("Socket thread exiting");
            let _ = event_tx.send(SocketEvent::Disconnected);
        });

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(SocketCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    fn send(&self, text: &str) -> SessionResult<()> {
        match &self.cmd_tx {
            Some(tx) if self.state == ConnectionState::Connected => tx
                .send(SocketCommand::Send(text.to_string()))
                .map_err(|e| SessionError::Socket(format!("Send failed: {}", e))),
            _ => Err(SessionError::NotConnected),
        }
    }

    fn poll_events(&mut self) -> Vec<SocketEvent> {
        let mut events = Vec::new();
        let mut closed = false;
        if let Some(rx) = &self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    SocketEvent::Connected => self.state = ConnectionState::Connected,
                    SocketEvent::Disconnected | SocketEvent::Error { .. } => {
                        self.state = ConnectionState::Disconnected;
                        closed = true;
                    }
                    SocketEvent::Message(_) => {}
                }
                events.push(event);
            }
        }
        if closed {
            self.cmd_tx = None;
            self.event_rx = None;
            self._thread = None;
        }
        events
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

/// Socket URL for a user of a session, derived from the API base URL.
pub fn socket_url(api_url: &Url, session_id: &str, user_id: &str) -> SessionResult<Url> {
    let mut url = api_url
        .join(&format!("b/{}/users/{}/socket", session_id, user_id))
        .map_err(|e| SessionError::Socket(format!("Invalid socket URL: {}", e)))?;
    let scheme = if api_url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| SessionError::Socket(format!("Cannot use scheme {} for {}", scheme, url)))?;
    Ok(url)
}
