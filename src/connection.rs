//! Push-channel connection management.
//!
//! DESIGN
//! ======
//! A connection is a spawned socket task plus a [`ConnectionHandle`] held in
//! `AppState`. The task owns the websocket; the handle only holds a command
//! sender and a status watch. Everything the task observes (open, decoded
//! events, transport errors, closure) is posted to the controller's input
//! channel tagged with the connection id, so stale connections can be told
//! apart from the current one.
//!
//! Reconnection is not decided here. The task reports the close code and the
//! controller applies [`suppresses_reconnect`] and the authentication check.
//!
//! ERROR HANDLING
//! ==============
//! Nothing in this module returns errors to callers at runtime. A failed
//! handshake is reported as a closure with [`CLOSE_ABNORMAL`], undecodable
//! messages are logged and dropped, and transport errors are logged before
//! the resulting closure is reported.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use crate::controller::Input;
use crate::error::ClientError;
use crate::event::{InboundEvent, OutboundEvent};

/// Endpoint path of the push channel on the forum host.
pub const WS_PATH: &str = "/ws";
/// Query parameter carrying the session credential on the handshake.
pub const TOKEN_PARAM: &str = "ls_token";

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_NO_STATUS: u16 = 1005;
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Sender side of the controller input channel, as seen by socket tasks.
pub type EventSink = mpsc::UnboundedSender<Input>;

/// Whether a close code marks an intentional shutdown.
#[must_use]
pub fn suppresses_reconnect(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
}

/// Build the push-channel URL for `base_url`, attaching `token` as a query
/// credential.
///
/// # Errors
///
/// Returns [`ClientError::InvalidBaseUrl`] unless `base_url` is an absolute
/// `http` or `https` URL.
pub fn ws_url(base_url: &str, token: &str) -> Result<String, ClientError> {
    let invalid = || ClientError::InvalidBaseUrl(base_url.to_owned());
    let mut url = reqwest::Url::parse(base_url.trim_end_matches('/')).map_err(|_| invalid())?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|()| invalid())?;
    url.set_path(WS_PATH);
    url.set_query(None);
    url.query_pairs_mut().append_pair(TOKEN_PARAM, token);

    Ok(url.into())
}

// =============================================================================
// STATUS AND EVENTS
// =============================================================================

/// Lifecycle of one push-channel connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Closed,
    Connecting,
    Open,
}

/// Something a socket task observed, tagged with its connection id.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionEvent {
    pub id: u64,
    pub kind: ConnectionEventKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEventKind {
    /// The handshake completed.
    Opened,
    /// A message decoded into an event.
    Event(InboundEvent),
    /// A transport error. Informational only; a `Closed` always follows.
    Error(String),
    /// The connection ended. Terminal for this id.
    Closed { code: u16, reason: String },
}

// =============================================================================
// HANDLE
// =============================================================================

/// Instruction from a handle to its socket task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketCommand {
    /// Send one text message.
    Send(String),
    /// Close the socket with [`CLOSE_NORMAL`].
    Close,
}

/// Controller-side handle to a live connection.
///
/// Dropping the handle has the same effect as [`ConnectionHandle::close`].
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    commands: mpsc::UnboundedSender<SocketCommand>,
    status: watch::Receiver<ConnectionStatus>,
}

/// Socket-task side of a [`ConnectionHandle`].
#[derive(Debug)]
pub struct SocketEnd {
    pub id: u64,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectionHandle {
    /// Create a handle in `Connecting` and the socket end that drives it.
    #[must_use]
    pub fn pair(id: u64) -> (Self, SocketEnd) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        (
            Self { id, commands: commands_tx, status: status_rx },
            SocketEnd { id, commands: commands_rx, status: status_tx },
        )
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Queue an event for sending.
    ///
    /// Returns `false` if the event could not be encoded or the socket task
    /// has already finished.
    pub fn send(&self, event: &OutboundEvent) -> bool {
        match event.encode() {
            Ok(text) => self.commands.send(SocketCommand::Send(text)).is_ok(),
            Err(e) => {
                warn!(id = self.id, error = %e, "ws: failed to encode outbound event");
                false
            }
        }
    }

    /// Close the connection deliberately.
    pub fn close(self) {
        let _ = self.commands.send(SocketCommand::Close);
    }
}

impl SocketEnd {
    /// Publish a new status to the handle.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    /// Wait for the next command. `None` means the handle was dropped.
    pub async fn next_command(&mut self) -> Option<SocketCommand> {
        self.commands.recv().await
    }

    /// Take the next queued command without waiting.
    #[cfg(test)]
    pub fn try_next_command(&mut self) -> Option<SocketCommand> {
        self.commands.try_recv().ok()
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

/// Seam between the controller and the transport.
pub trait Connector: Send + Sync {
    /// Start connecting to `url` and return the handle immediately.
    ///
    /// The implementation must eventually post exactly one
    /// [`ConnectionEventKind::Closed`] for `id` to `sink`.
    fn connect(&self, id: u64, url: &str, sink: EventSink) -> ConnectionHandle;
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, id: u64, url: &str, sink: EventSink) -> ConnectionHandle {
        let (handle, end) = ConnectionHandle::pair(id);
        tokio::spawn(run_socket(url.to_owned(), end, sink));
        handle
    }
}

/// Open the push channel for `token`.
///
/// Returns `None` without touching the network when the token is absent or
/// blank, and `None` when `base_url` cannot be turned into a websocket URL.
pub fn open(
    connector: &dyn Connector,
    base_url: &str,
    token: Option<&str>,
    id: u64,
    sink: EventSink,
) -> Option<ConnectionHandle> {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        warn!("ws: no session token; push channel not opened");
        return None;
    };

    let url = match ws_url(base_url, token) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "ws: push channel not opened");
            return None;
        }
    };

    info!(id, base_url, "ws: connecting");
    Some(connector.connect(id, &url, sink))
}

fn emit(sink: &EventSink, id: u64, kind: ConnectionEventKind) {
    let _ = sink.send(Input::Connection(ConnectionEvent { id, kind }));
}

/// Drive one websocket until it closes, then report the close code.
async fn run_socket(url: String, mut end: SocketEnd, sink: EventSink) {
    let id = end.id;

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            end.set_status(ConnectionStatus::Closed);
            emit(&sink, id, ConnectionEventKind::Error(e.to_string()));
            emit(&sink, id, ConnectionEventKind::Closed { code: CLOSE_ABNORMAL, reason: "handshake failed".to_owned() });
            return;
        }
    };

    end.set_status(ConnectionStatus::Open);
    emit(&sink, id, ConnectionEventKind::Opened);

    let (mut write, mut read) = stream.split();

    let (code, reason) = loop {
        tokio::select! {
            command = end.next_command() => match command {
                Some(SocketCommand::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        emit(&sink, id, ConnectionEventKind::Error(e.to_string()));
                        break (CLOSE_ABNORMAL, "send failed".to_owned());
                    }
                }
                Some(SocketCommand::Close) | None => {
                    let frame = CloseFrame { code: CloseCode::Normal, reason: String::from("client closed").into() };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    let _ = write.close().await;
                    break (CLOSE_NORMAL, "client closed".to_owned());
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match InboundEvent::decode(text.as_str()) {
                    Ok(event) => emit(&sink, id, ConnectionEventKind::Event(event)),
                    Err(e) => warn!(id, error = %e, "ws: dropped undecodable message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                }
                Some(Ok(other)) => debug!(id, kind = ?message_kind(&other), "ws: ignored non-text message"),
                Some(Err(e)) => {
                    emit(&sink, id, ConnectionEventKind::Error(e.to_string()));
                    break (CLOSE_ABNORMAL, "transport error".to_owned());
                }
                None => break (CLOSE_ABNORMAL, "stream ended".to_owned()),
            },
        }
    };

    end.set_status(ConnectionStatus::Closed);
    emit(&sink, id, ConnectionEventKind::Closed { code, reason });
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
pub mod test_helpers {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::*;

    /// [`Connector`] that never touches the network.
    ///
    /// Records every connect call and keeps the socket ends so tests can
    /// drive status and inspect commands.
    #[derive(Default)]
    pub struct FakeConnector {
        calls: Mutex<Vec<(u64, String)>>,
        ends: Mutex<Vec<SocketEnd>>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl FakeConnector {
        #[must_use]
        pub fn calls(&self) -> Vec<(u64, String)> {
            lock(&self.calls).clone()
        }

        #[must_use]
        pub fn connect_count(&self) -> usize {
            lock(&self.calls).len()
        }

        /// Remove and return the socket end for connection `id`.
        #[must_use]
        pub fn take_end(&self, id: u64) -> Option<SocketEnd> {
            let mut ends = lock(&self.ends);
            let index = ends.iter().position(|end| end.id == id)?;
            Some(ends.remove(index))
        }
    }

    impl Connector for FakeConnector {
        fn connect(&self, id: u64, url: &str, _sink: EventSink) -> ConnectionHandle {
            lock(&self.calls).push((id, url.to_owned()));
            let (handle, end) = ConnectionHandle::pair(id);
            lock(&self.ends).push(end);
            handle
        }
    }
}
