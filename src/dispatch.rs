//! Inbound event routing.
//!
//! DESIGN
//! ======
//! `dispatch` is the only place push-channel events touch `AppState`. Routing
//! is an exact match on the decoded event; each arm applies its guard (open
//! conversation, viewed post, active page) and reports which regions of
//! state it changed so the caller can log and re-render selectively.
//!
//! ERROR HANDLING
//! ==============
//! Dispatch cannot fail. Events that do not apply to the current view are
//! dropped silently and unrecognized tags are logged.

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_test;

use serde::Serialize;
use tracing::{debug, info};

use crate::event::InboundEvent;
use crate::state::{AppState, Page};

/// A region of [`AppState`] that an event can change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Peers,
    Conversation,
    Summaries,
    Typing,
    Posts,
    Comments,
}

/// Apply one inbound event to `state`.
///
/// Returns the regions that changed; empty when the event did not apply.
pub fn dispatch(state: &mut AppState, event: InboundEvent) -> Vec<Region> {
    match event {
        InboundEvent::OnlineUsers(users) => {
            debug!(count = users.len(), "dispatch: online users replaced");
            state.online_users = users;
            vec![Region::Peers]
        }
        InboundEvent::PrivateMessage(message) => {
            let mut changed = Vec::with_capacity(2);
            if state.chat_peer_id().is_some_and(|peer| message.involves(peer)) {
                state.conversation.push(message.clone());
                changed.push(Region::Conversation);
            }
            let peer_id = state.record_message(&message);
            debug!(message_id = message.id, peer_id, "dispatch: private message");
            changed.push(Region::Summaries);
            changed
        }
        InboundEvent::TypingIndicator(indicator) => {
            if state.chat_peer_id() != Some(indicator.user_id) {
                return Vec::new();
            }
            state.peer_typing = indicator.is_typing.then_some(indicator.username);
            vec![Region::Typing]
        }
        InboundEvent::PostCreated(post) => {
            if state.current_page != Page::Home {
                return Vec::new();
            }
            state.posts.insert(0, post);
            vec![Region::Posts]
        }
        InboundEvent::CommentCreated(comment) => {
            if state.current_post.as_ref().map(|p| p.id) != Some(comment.post_id) {
                return Vec::new();
            }
            state.comments.push(comment);
            vec![Region::Comments]
        }
        InboundEvent::Unrecognized { kind } => {
            info!(%kind, "dispatch: unhandled message type");
            Vec::new()
        }
    }
}
