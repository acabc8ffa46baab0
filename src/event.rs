//! Push-channel envelope codec.
//!
//! Every message on the channel is a JSON envelope `{ "type", "payload" }`.
//! Inbound envelopes decode into [`InboundEvent`]; tags this client does not
//! know decode to [`InboundEvent::Unrecognized`] rather than failing, so the
//! dispatcher can log and drop them. Only a malformed envelope or a payload
//! that does not fit its tag is an error.

#[cfg(test)]
#[path = "event_test.rs"]
mod event_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Comment, NewPrivateMessage, Post, PrivateMessage, TypingIndicator, TypingUpdate, User};

pub const ONLINE_USERS: &str = "online_users";
pub const PRIVATE_MESSAGE: &str = "private_message";
pub const TYPING_INDICATOR: &str = "typing_indicator";
pub const POST_CREATED: &str = "post_created";
pub const COMMENT_CREATED: &str = "comment_created";

/// Error returned by [`InboundEvent::decode`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The text is not a JSON object with a string `type`.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The envelope tag is known but its payload has the wrong shape.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// A decoded server-to-client event.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    /// Full replacement of the online peer list.
    OnlineUsers(Vec<User>),
    PrivateMessage(PrivateMessage),
    TypingIndicator(TypingIndicator),
    PostCreated(Post),
    CommentCreated(Comment),
    /// An envelope whose tag this client does not handle.
    Unrecognized { kind: String },
}

impl InboundEvent {
    /// Decode one text message from the push channel.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] when the text is not an envelope
    /// and [`EnvelopeError::Payload`] when a known tag carries a payload of
    /// the wrong shape.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(EnvelopeError::Malformed)?;

        match raw.kind.as_str() {
            ONLINE_USERS => {
                // The server serializes an empty user list as `null`.
                let users = payload::<Option<Vec<User>>>(ONLINE_USERS, raw.payload)?;
                Ok(Self::OnlineUsers(users.unwrap_or_default()))
            }
            PRIVATE_MESSAGE => payload(PRIVATE_MESSAGE, raw.payload).map(Self::PrivateMessage),
            TYPING_INDICATOR => payload(TYPING_INDICATOR, raw.payload).map(Self::TypingIndicator),
            POST_CREATED => payload(POST_CREATED, raw.payload).map(Self::PostCreated),
            COMMENT_CREATED => payload(COMMENT_CREATED, raw.payload).map(Self::CommentCreated),
            _ => Ok(Self::Unrecognized { kind: raw.kind }),
        }
    }

    /// The wire tag this event was decoded from.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::OnlineUsers(_) => ONLINE_USERS,
            Self::PrivateMessage(_) => PRIVATE_MESSAGE,
            Self::TypingIndicator(_) => TYPING_INDICATOR,
            Self::PostCreated(_) => POST_CREATED,
            Self::CommentCreated(_) => COMMENT_CREATED,
            Self::Unrecognized { kind } => kind.as_str(),
        }
    }
}

fn payload<T>(kind: &'static str, value: Value) -> Result<T, EnvelopeError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|source| EnvelopeError::Payload { kind, source })
}

/// A client-to-server event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundEvent {
    PrivateMessage(NewPrivateMessage),
    TypingIndicator(TypingUpdate),
    /// Echo of a post already created over REST, for other clients.
    PostCreated(Post),
    /// Echo of a comment already created over REST, for other clients.
    CommentCreated(Comment),
}

impl OutboundEvent {
    /// Encode as the JSON text sent over the channel.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; the payload types are plain records so
    /// this does not happen in practice.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
