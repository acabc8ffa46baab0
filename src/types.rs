//! Domain records exchanged with the forum API and the push channel.
//!
//! DESIGN
//! ======
//! Field names follow the server's camelCase JSON. Display-only fields
//! (usernames, category names, timestamps) default when absent so partially
//! populated echoes from other clients still decode.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

/// A forum member as returned by `/api/me` and `/api/users/online`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub age: i64,
    #[serde(default)]
    pub gender: String,
    /// Whether the server currently sees a live push channel for this user.
    #[serde(default)]
    pub online: bool,
}

/// A post category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A forum post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    /// Author name, filled in by the server for display.
    #[serde(default)]
    pub username: String,
    pub title: String,
    pub content: String,
    pub category_id: i64,
    /// Category name, filled in by the server for display.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// A comment on a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
}

/// A private message between two users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: String,
}

impl PrivateMessage {
    /// Whether `user_id` is either party of this message.
    #[must_use]
    pub fn involves(&self, user_id: i64) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// The other party relative to `local_user_id`.
    ///
    /// When the local user is unknown the sender is taken as the counterpart.
    #[must_use]
    pub fn counterpart(&self, local_user_id: Option<i64>) -> i64 {
        match local_user_id {
            Some(me) if self.sender_id == me => self.receiver_id,
            _ => self.sender_id,
        }
    }
}

/// Typing state of one user towards another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    pub target_user_id: i64,
    pub is_typing: bool,
    #[serde(default)]
    pub updated_at: String,
}

/// Body of `POST /api/messages`, also the payload of an outbound
/// `private_message` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrivateMessage {
    pub receiver_id: i64,
    pub content: String,
}

/// Body of `POST /api/typing`, also the payload of an outbound
/// `typing_indicator` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub target_user_id: i64,
    pub is_typing: bool,
}

/// Body of `POST /api/posts`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category_id: i64,
}

/// Body of `POST /api/posts/{id}/comments`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub content: String,
}

/// Body of `POST /api/register`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub age: i64,
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}
