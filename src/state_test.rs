use super::test_helpers::*;
use super::*;
use crate::connection::SocketCommand;

// =============================================================
// Defaults
// =============================================================

#[test]
fn app_state_default_is_signed_out_on_home() {
    let state = AppState::new();
    assert!(!state.is_authenticated);
    assert!(state.current_user.is_none());
    assert_eq!(state.current_page, Page::Home);
    assert!(state.connection().is_none());
    assert_eq!(state.connection_status(), ConnectionStatus::Closed);
}

// =============================================================
// Connection handle invariant
// =============================================================

#[test]
fn attach_connection_refused_while_signed_out() {
    let mut state = AppState::new();
    let (handle, mut end) = ConnectionHandle::pair(1);

    assert!(!state.attach_connection(handle));
    assert!(state.connection().is_none());
    assert_eq!(end.try_next_command(), Some(SocketCommand::Close));
}

#[test]
fn attach_connection_stored_while_signed_in() {
    let mut state = signed_in_state();
    let (handle, end) = ConnectionHandle::pair(7);

    assert!(state.attach_connection(handle));
    assert_eq!(state.connection_id(), Some(7));
    assert_eq!(state.connection_status(), ConnectionStatus::Connecting);
    assert!(state.open_connection().is_none());

    end.set_status(ConnectionStatus::Open);
    assert!(state.open_connection().is_some());
}

#[test]
fn attach_connection_closes_previous_handle() {
    let mut state = signed_in_state();
    let (first, mut first_end) = ConnectionHandle::pair(1);
    let (second, _second_end) = ConnectionHandle::pair(2);

    state.attach_connection(first);
    state.attach_connection(second);

    assert_eq!(state.connection_id(), Some(2));
    assert_eq!(first_end.try_next_command(), Some(SocketCommand::Close));
}

#[test]
fn sign_out_closes_and_clears_connection() {
    let mut state = signed_in_state();
    let (handle, mut end) = ConnectionHandle::pair(3);
    state.attach_connection(handle);

    state.sign_out();

    assert!(!state.is_authenticated);
    assert!(state.current_user.is_none());
    assert!(state.connection().is_none());
    assert_eq!(end.try_next_command(), Some(SocketCommand::Close));
}

#[test]
fn sign_out_resets_per_user_views() {
    let mut state = signed_in_state();
    state.navigate(Route::Messages(Some(user(2, "bob"))));
    state.conversation.push(message(1, 2, 1, "hi"));
    state.peer_typing = Some("bob".to_owned());
    state.record_message(&message(1, 2, 1, "hi"));
    state.posts.push(post(1, "kept"));

    state.sign_out();

    assert_eq!(state.current_page, Page::Home);
    assert!(state.current_chat_user.is_none());
    assert!(state.conversation.is_empty());
    assert!(state.peer_typing.is_none());
    assert!(state.summaries.is_empty());
    assert_eq!(state.posts.len(), 1);
}

#[test]
fn take_connection_does_not_close() {
    let mut state = signed_in_state();
    let (handle, mut end) = ConnectionHandle::pair(4);
    state.attach_connection(handle);

    let taken = state.take_connection().expect("handle");
    assert_eq!(taken.id(), 4);
    assert!(state.connection().is_none());
    assert_eq!(end.try_next_command(), None);
}

// =============================================================
// Navigation
// =============================================================

#[test]
fn navigate_to_messages_with_peer_opens_conversation() {
    let mut state = signed_in_state();
    state.navigate(Route::Messages(Some(user(2, "bob"))));

    assert_eq!(state.current_page, Page::Messages);
    assert_eq!(state.chat_peer_id(), Some(2));
}

#[test]
fn navigate_to_messages_without_peer_keeps_current_peer() {
    let mut state = signed_in_state();
    state.navigate(Route::Messages(Some(user(2, "bob"))));
    state.navigate(Route::Home);
    state.navigate(Route::Messages(None));

    assert_eq!(state.chat_peer_id(), Some(2));
}

#[test]
fn switching_peer_resets_conversation_and_typing() {
    let mut state = signed_in_state();
    state.navigate(Route::Messages(Some(user(2, "bob"))));
    state.conversation.push(message(1, 2, 1, "hi"));
    state.peer_typing = Some("bob".to_owned());

    state.navigate(Route::Messages(Some(user(3, "carol"))));

    assert!(state.conversation.is_empty());
    assert!(state.peer_typing.is_none());
}

#[test]
fn reopening_same_peer_keeps_conversation() {
    let mut state = signed_in_state();
    state.navigate(Route::Messages(Some(user(2, "bob"))));
    state.conversation.push(message(1, 2, 1, "hi"));

    state.navigate(Route::Messages(Some(user(2, "bob"))));

    assert_eq!(state.conversation.len(), 1);
}

#[test]
fn opening_peer_clears_unread() {
    let mut state = signed_in_state();
    state.record_message(&message(1, 2, 1, "one"));
    state.record_message(&message(2, 2, 1, "two"));
    assert_eq!(state.summaries[&2].unread, 2);

    state.navigate(Route::Messages(Some(user(2, "bob"))));

    assert_eq!(state.summaries[&2].unread, 0);
}

#[test]
fn navigate_to_other_post_clears_comments() {
    let mut state = AppState::new();
    state.navigate(Route::PostDetail(post(1, "first")));
    state.comments.push(comment(1, 1, "nice"));

    state.navigate(Route::PostDetail(post(2, "second")));

    assert_eq!(state.current_page, Page::PostDetail);
    assert_eq!(state.current_post.as_ref().map(|p| p.id), Some(2));
    assert!(state.comments.is_empty());
}

// =============================================================
// Conversation summaries
// =============================================================

#[test]
fn record_message_files_sent_message_under_receiver() {
    let mut state = signed_in_state();
    let peer = state.record_message(&message(1, 1, 5, "to carol"));

    assert_eq!(peer, 5);
    let summary = &state.summaries[&5];
    assert_eq!(summary.last_message.content, "to carol");
    assert_eq!(summary.unread, 0);
}

#[test]
fn record_message_does_not_count_open_conversation_as_unread() {
    let mut state = signed_in_state();
    state.navigate(Route::Messages(Some(user(2, "bob"))));

    state.record_message(&message(1, 2, 1, "hello"));

    assert_eq!(state.summaries[&2].unread, 0);
}

// =============================================================
// StateView
// =============================================================

#[test]
fn view_reflects_state_and_connection_status() {
    let mut state = signed_in_state();
    let (handle, end) = ConnectionHandle::pair(1);
    state.attach_connection(handle);
    end.set_status(ConnectionStatus::Open);
    state.posts.push(post(1, "p"));
    state.record_message(&message(1, 3, 1, "m"));

    let view = state.view();
    assert!(view.is_authenticated);
    assert_eq!(view.connection, ConnectionStatus::Open);
    assert_eq!(view.posts.len(), 1);
    assert_eq!(view.summaries.len(), 1);
    assert_eq!(view.summaries[0].peer_id, 3);
}
