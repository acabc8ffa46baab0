//! Forum REST client.
//!
//! DESIGN
//! ======
//! [`ForumApi`] is the seam the controller talks to; [`HttpApi`] implements
//! it over `reqwest`. Authenticated calls take the session token explicitly
//! and present it as the `session_id` cookie, so the client itself holds no
//! session state.
//!
//! ERROR HANDLING
//! ==============
//! Non-success responses become [`ClientError::Api`] carrying the server's
//! message (see [`error_message`]). Transport failures and undecodable bodies
//! map to `Http` and `InvalidJson`. List endpoints that answer `null` for an
//! empty result decode to an empty list.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderValue, SET_COOKIE};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::types::{
    Category, Comment, NewComment, NewPost, NewPrivateMessage, NewUser, Post, PrivateMessage, TypingUpdate, User,
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";
/// Message used when an error body cannot be read or parsed.
pub const UNKNOWN_ERROR: &str = "an unknown error occurred";

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A signed-in identity and the token that authenticates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

// =============================================================================
// TRAIT
// =============================================================================

/// Forum REST operations used by the controller.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// `GET /api/me`
    async fn me(&self, session: &str) -> Result<User, ClientError>;
    /// `POST /api/login`
    async fn login(&self, identifier: &str, password: &str) -> Result<Session, ClientError>;
    /// `POST /api/register`; the new account comes back signed in.
    async fn register(&self, user: &NewUser) -> Result<Session, ClientError>;
    /// `POST /api/logout`
    async fn logout(&self, session: &str) -> Result<(), ClientError>;
    /// `GET /api/posts`
    async fn posts(&self) -> Result<Vec<Post>, ClientError>;
    /// `GET /api/posts/{id}`
    async fn post_by_id(&self, post_id: i64) -> Result<Post, ClientError>;
    /// `GET /api/categories`
    async fn categories(&self) -> Result<Vec<Category>, ClientError>;
    /// `GET /api/posts/{id}/comments`
    async fn comments(&self, post_id: i64) -> Result<Vec<Comment>, ClientError>;
    /// `GET /api/messages/{peer_id}`
    async fn messages(&self, session: &str, peer_id: i64) -> Result<Vec<PrivateMessage>, ClientError>;
    /// `GET /api/users/online`
    async fn online_users(&self, session: &str) -> Result<Vec<User>, ClientError>;
    /// `POST /api/messages`
    async fn send_message(&self, session: &str, message: &NewPrivateMessage) -> Result<PrivateMessage, ClientError>;
    /// `POST /api/typing`
    async fn send_typing(&self, session: &str, update: &TypingUpdate) -> Result<(), ClientError>;
    /// `POST /api/posts`
    async fn create_post(&self, session: &str, post: &NewPost) -> Result<Post, ClientError>;
    /// `POST /api/posts/{id}/comments`
    async fn create_comment(&self, session: &str, post_id: i64, comment: &NewComment) -> Result<Comment, ClientError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: User,
    #[serde(default)]
    session_id: Option<String>,
}

/// Registration answers with the user's fields inline next to `sessionId`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    #[serde(flatten)]
    user: User,
    #[serde(default)]
    session_id: Option<String>,
}

impl HttpApi {
    /// Build a client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] unless the base URL is an
    /// absolute `http`/`https` URL, or `Http` if the client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim_end_matches('/');
        match reqwest::Url::parse(base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ClientError::InvalidBaseUrl(config.base_url.clone())),
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, base_url: base_url.to_owned() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path))
    }

    async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch a list that the server may encode as `null` when empty.
    async fn fetch_list<T: DeserializeOwned>(request: RequestBuilder) -> Result<Vec<T>, ClientError> {
        let items: Option<Vec<T>> = Self::fetch(request).await?;
        Ok(items.unwrap_or_default())
    }

    async fn execute(request: RequestBuilder) -> Result<(), ClientError> {
        check(request.send().await?).await?;
        Ok(())
    }

    /// Send a request that opens a session and split the response into the
    /// `Set-Cookie` token and the decoded body.
    async fn open_session<T: DeserializeOwned>(request: RequestBuilder) -> Result<(Option<String>, T), ClientError> {
        let response = check(request.send().await?).await?;

        let cookie_token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_from_set_cookie);

        let bytes = response.bytes().await?;
        Ok((cookie_token, serde_json::from_slice(&bytes)?))
    }
}

/// The cookie token, falling back to the one echoed in the body.
fn session_token(cookie: Option<String>, body: Option<String>) -> Result<String, ClientError> {
    cookie
        .or(body.filter(|t| !t.is_empty()))
        .ok_or(ClientError::MissingSessionCookie)
}

/// Attach the session cookie to `request`.
fn authed(request: RequestBuilder, session: &str) -> Result<RequestBuilder, ClientError> {
    let cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={session}"))?;
    Ok(request.header(COOKIE, cookie))
}

#[async_trait]
impl ForumApi for HttpApi {
    async fn me(&self, session: &str) -> Result<User, ClientError> {
        Self::fetch(authed(self.get("/api/me"), session)?).await
    }

    async fn login(&self, identifier: &str, password: &str) -> Result<Session, ClientError> {
        let request = self.post("/api/login").json(&LoginRequest { identifier, password });
        let (cookie, body): (_, LoginResponse) = Self::open_session(request).await?;

        let token = session_token(cookie, body.session_id)?;
        debug!(user_id = body.user.id, "api: logged in");
        Ok(Session { user: body.user, token })
    }

    async fn register(&self, user: &NewUser) -> Result<Session, ClientError> {
        let request = self.post("/api/register").json(user);
        let (cookie, body): (_, RegisterResponse) = Self::open_session(request).await?;

        let token = session_token(cookie, body.session_id)?;
        debug!(user_id = body.user.id, "api: registered");
        Ok(Session { user: body.user, token })
    }

    async fn logout(&self, session: &str) -> Result<(), ClientError> {
        Self::execute(authed(self.post("/api/logout"), session)?).await
    }

    async fn posts(&self) -> Result<Vec<Post>, ClientError> {
        Self::fetch_list(self.get("/api/posts")).await
    }

    async fn post_by_id(&self, post_id: i64) -> Result<Post, ClientError> {
        Self::fetch(self.get(&format!("/api/posts/{post_id}"))).await
    }

    async fn categories(&self) -> Result<Vec<Category>, ClientError> {
        Self::fetch_list(self.get("/api/categories")).await
    }

    async fn comments(&self, post_id: i64) -> Result<Vec<Comment>, ClientError> {
        Self::fetch_list(self.get(&format!("/api/posts/{post_id}/comments"))).await
    }

    async fn messages(&self, session: &str, peer_id: i64) -> Result<Vec<PrivateMessage>, ClientError> {
        Self::fetch_list(authed(self.get(&format!("/api/messages/{peer_id}")), session)?).await
    }

    async fn online_users(&self, session: &str) -> Result<Vec<User>, ClientError> {
        Self::fetch_list(authed(self.get("/api/users/online"), session)?).await
    }

    async fn send_message(&self, session: &str, message: &NewPrivateMessage) -> Result<PrivateMessage, ClientError> {
        Self::fetch(authed(self.post("/api/messages"), session)?.json(message)).await
    }

    async fn send_typing(&self, session: &str, update: &TypingUpdate) -> Result<(), ClientError> {
        Self::execute(authed(self.post("/api/typing"), session)?.json(update)).await
    }

    async fn create_post(&self, session: &str, post: &NewPost) -> Result<Post, ClientError> {
        Self::fetch(authed(self.post("/api/posts"), session)?.json(post)).await
    }

    async fn create_comment(&self, session: &str, post_id: i64, comment: &NewComment) -> Result<Comment, ClientError> {
        let path = format!("/api/posts/{post_id}/comments");
        Self::fetch(authed(self.post(&path), session)?.json(comment)).await
    }
}

// =============================================================================
// RESPONSE HELPERS
// =============================================================================

/// Pass successful responses through; turn the rest into `ClientError::Api`.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let message = match response.text().await {
        Ok(body) => error_message(content_type.as_deref(), &body),
        Err(e) => {
            warn!(status = status.as_u16(), error = %e, "api: failed to read error body");
            UNKNOWN_ERROR.to_owned()
        }
    };

    Err(ClientError::Api { status: status.as_u16(), message })
}

/// Human-readable message for an error response body.
///
/// JSON bodies yield their `message` field, or the whole document when it has
/// none. Other bodies are returned as trimmed text.
#[must_use]
pub fn error_message(content_type: Option<&str>, body: &str) -> String {
    let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return body.trim().to_owned();
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value.get("message").and_then(serde_json::Value::as_str) {
            Some(message) => message.to_owned(),
            None => value.to_string(),
        },
        Err(_) => UNKNOWN_ERROR.to_owned(),
    }
}

/// Extract the session token from one `Set-Cookie` header value.
#[must_use]
pub fn session_from_set_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let value = value.trim();
    (name.trim() == SESSION_COOKIE && !value.is_empty()).then(|| value.to_owned())
}
