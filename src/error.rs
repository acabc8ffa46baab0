//! Crate-level error type.
//!
//! ERROR HANDLING
//! ==============
//! Only command paths return errors. Connection and dispatch failures are
//! logged where they happen and never surface here; see `connection` and
//! `dispatch`.

/// Errors returned to callers of controller commands and the REST client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No session token is available for an authenticated call.
    #[error("missing session token; pass --session-token or set FORUM_SESSION_TOKEN")]
    MissingSession,
    /// The command requires a signed-in user.
    #[error("you must be signed in to do that")]
    NotAuthenticated,
    /// A private message or typing update was issued with no conversation open.
    #[error("no conversation is open")]
    NoConversation,
    /// A comment was submitted while no post is being viewed.
    #[error("no post is being viewed")]
    NoPost,
    /// The base URL could not be used to build request or websocket URLs.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    /// An HTTP request failed at the transport level.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// An HTTP header value could not be constructed.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
    /// A response or payload was not valid JSON for the expected shape.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// A login response did not carry a session cookie.
    #[error("login response did not include a session cookie")]
    MissingSessionCookie,
    /// The controller loop has stopped and can no longer accept commands.
    #[error("client controller is no longer running")]
    ControllerGone,
}
