//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is owned by the controller and handed by `&mut` to the
//! dispatcher and command handlers; nothing else holds it. Rendering code
//! reads [`StateView`] snapshots published after every change, which carry
//! everything except the connection handle.
//!
//! The connection handle lives here so its lifetime is tied to the
//! authenticated session: it can only be attached while signed in, and
//! signing out closes and clears it.

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::connection::{ConnectionHandle, ConnectionStatus};
use crate::types::{Category, Comment, Post, PrivateMessage, User};

// =============================================================================
// NAVIGATION
// =============================================================================

/// Logical page the user is looking at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    #[default]
    Home,
    Categories,
    Messages,
    PostDetail,
}

/// A navigation target together with the record it opens, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    Categories,
    /// The messages page, optionally opening the conversation with a peer.
    Messages(Option<User>),
    PostDetail(Post),
}

impl Route {
    #[must_use]
    pub fn page(&self) -> Page {
        match self {
            Self::Home => Page::Home,
            Self::Categories => Page::Categories,
            Self::Messages(_) => Page::Messages,
            Self::PostDetail(_) => Page::PostDetail,
        }
    }
}

/// Latest activity in the conversation with one peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub peer_id: i64,
    pub last_message: PrivateMessage,
    /// Messages received from this peer while their conversation was not open.
    pub unread: u32,
}

// =============================================================================
// APP STATE
// =============================================================================

#[derive(Debug, Default)]
pub struct AppState {
    pub current_user: Option<User>,
    pub is_authenticated: bool,
    pub current_page: Page,
    pub online_users: Vec<User>,
    pub categories: Vec<Category>,
    /// Newest first.
    pub posts: Vec<Post>,
    pub current_post: Option<Post>,
    pub current_chat_user: Option<User>,
    /// Comments on `current_post`, oldest first.
    pub comments: Vec<Comment>,
    /// Messages exchanged with `current_chat_user`, oldest first.
    pub conversation: Vec<PrivateMessage>,
    /// Username of the open conversation's peer while they are typing.
    pub peer_typing: Option<String>,
    /// Keyed by peer id.
    pub summaries: BTreeMap<i64, ConversationSummary>,
    connection: Option<ConnectionHandle>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn local_user_id(&self) -> Option<i64> {
        self.current_user.as_ref().map(|u| u.id)
    }

    #[must_use]
    pub fn chat_peer_id(&self) -> Option<i64> {
        self.current_chat_user.as_ref().map(|u| u.id)
    }

    /// Mark `user` as the authenticated identity.
    pub fn sign_in(&mut self, user: User) {
        self.current_user = Some(user);
        self.is_authenticated = true;
    }

    /// End the authenticated session.
    ///
    /// Closes and clears the connection handle, drops the identity and every
    /// per-user view, and returns to the home page.
    pub fn sign_out(&mut self) {
        if let Some(handle) = self.connection.take() {
            handle.close();
        }
        self.current_user = None;
        self.is_authenticated = false;
        self.current_page = Page::Home;
        self.current_chat_user = None;
        self.conversation.clear();
        self.peer_typing = None;
        self.summaries.clear();
    }

    /// Store the live connection handle.
    ///
    /// Refuses (and closes `handle`) when not signed in. A previously stored
    /// handle is closed and replaced.
    pub fn attach_connection(&mut self, handle: ConnectionHandle) -> bool {
        if !self.is_authenticated {
            warn!(id = handle.id(), "state: refusing connection while signed out");
            handle.close();
            return false;
        }
        if let Some(previous) = self.connection.replace(handle) {
            previous.close();
        }
        true
    }

    #[must_use]
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// Remove the stored handle without closing it.
    pub fn take_connection(&mut self) -> Option<ConnectionHandle> {
        self.connection.take()
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<u64> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }

    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
            .as_ref()
            .map_or(ConnectionStatus::Closed, ConnectionHandle::status)
    }

    /// The open connection, if the channel is usable right now.
    #[must_use]
    pub fn open_connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref().filter(|c| c.is_open())
    }

    /// Switch pages, recording the post or chat peer the route opens.
    ///
    /// `Route::Messages(None)` keeps the current chat peer. Opening a
    /// different peer resets the conversation and typing flag; opening any
    /// peer clears their unread count.
    pub fn navigate(&mut self, route: Route) {
        self.current_page = route.page();

        match route {
            Route::Home | Route::Categories | Route::Messages(None) => {}
            Route::Messages(Some(peer)) => {
                if self.chat_peer_id() != Some(peer.id) {
                    self.conversation.clear();
                    self.peer_typing = None;
                }
                if let Some(summary) = self.summaries.get_mut(&peer.id) {
                    summary.unread = 0;
                }
                self.current_chat_user = Some(peer);
            }
            Route::PostDetail(post) => {
                if self.current_post.as_ref().map(|p| p.id) != Some(post.id) {
                    self.comments.clear();
                }
                self.current_post = Some(post);
            }
        }
    }

    /// Record `message` as the latest activity with its counterpart.
    ///
    /// Returns the peer id the summary was filed under.
    pub fn record_message(&mut self, message: &PrivateMessage) -> i64 {
        let me = self.local_user_id();
        let peer_id = message.counterpart(me);
        let is_open = self.chat_peer_id() == Some(peer_id);
        let received = me != Some(message.sender_id);

        let summary = self.summaries.entry(peer_id).or_insert_with(|| ConversationSummary {
            peer_id,
            last_message: message.clone(),
            unread: 0,
        });
        summary.last_message = message.clone();
        if received && !is_open {
            summary.unread = summary.unread.saturating_add(1);
        }
        peer_id
    }

    /// Read-only snapshot for rendering.
    #[must_use]
    pub fn view(&self) -> StateView {
        StateView {
            current_user: self.current_user.clone(),
            is_authenticated: self.is_authenticated,
            current_page: self.current_page,
            online_users: self.online_users.clone(),
            categories: self.categories.clone(),
            posts: self.posts.clone(),
            current_post: self.current_post.clone(),
            current_chat_user: self.current_chat_user.clone(),
            comments: self.comments.clone(),
            conversation: self.conversation.clone(),
            peer_typing: self.peer_typing.clone(),
            summaries: self.summaries.values().cloned().collect(),
            connection: self.connection_status(),
        }
    }
}

/// Snapshot of [`AppState`] published to rendering code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StateView {
    pub current_user: Option<User>,
    pub is_authenticated: bool,
    pub current_page: Page,
    pub online_users: Vec<User>,
    pub categories: Vec<Category>,
    pub posts: Vec<Post>,
    pub current_post: Option<Post>,
    pub current_chat_user: Option<User>,
    pub comments: Vec<Comment>,
    pub conversation: Vec<PrivateMessage>,
    pub peer_typing: Option<String>,
    /// Ordered by peer id.
    pub summaries: Vec<ConversationSummary>,
    pub connection: ConnectionStatus,
}
