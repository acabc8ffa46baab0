use super::*;

// =============================================================
// Decoding server shapes
// =============================================================

#[test]
fn user_decodes_with_missing_profile_fields() {
    let user: User = serde_json::from_value(serde_json::json!({
        "id": 7,
        "username": "alice",
        "online": true
    }))
    .expect("user should decode");
    assert_eq!(user.id, 7);
    assert_eq!(user.username, "alice");
    assert!(user.online);
    assert!(user.first_name.is_empty());
}

#[test]
fn private_message_uses_camel_case_keys() {
    let msg: PrivateMessage = serde_json::from_value(serde_json::json!({
        "id": 1,
        "senderId": 2,
        "receiverId": 3,
        "content": "hi",
        "createdAt": "2024-05-01T10:00:00Z"
    }))
    .expect("message should decode");
    assert_eq!(msg.sender_id, 2);
    assert_eq!(msg.receiver_id, 3);
    assert_eq!(msg.created_at, "2024-05-01T10:00:00Z");
    assert!(!msg.read);
}

#[test]
fn post_decodes_without_display_fields() {
    let post: Post = serde_json::from_value(serde_json::json!({
        "id": 10,
        "userId": 2,
        "title": "Hello",
        "content": "World",
        "categoryId": 1
    }))
    .expect("post should decode");
    assert_eq!(post.category_id, 1);
    assert!(post.username.is_empty());
    assert!(post.category.is_empty());
}

#[test]
fn new_private_message_serializes_receiver_id() {
    let body = NewPrivateMessage { receiver_id: 4, content: "yo".to_owned() };
    let value = serde_json::to_value(&body).expect("serialize");
    assert_eq!(value, serde_json::json!({ "receiverId": 4, "content": "yo" }));
}

#[test]
fn typing_update_serializes_camel_case() {
    let body = TypingUpdate { target_user_id: 9, is_typing: true };
    let value = serde_json::to_value(&body).expect("serialize");
    assert_eq!(value, serde_json::json!({ "targetUserId": 9, "isTyping": true }));
}

// =============================================================
// PrivateMessage helpers
// =============================================================

fn message(sender_id: i64, receiver_id: i64) -> PrivateMessage {
    PrivateMessage {
        id: 1,
        sender_id,
        receiver_id,
        sender: String::new(),
        receiver: String::new(),
        content: "x".to_owned(),
        read: false,
        created_at: String::new(),
    }
}

#[test]
fn involves_matches_either_party() {
    let msg = message(1, 2);
    assert!(msg.involves(1));
    assert!(msg.involves(2));
    assert!(!msg.involves(3));
}

#[test]
fn counterpart_is_receiver_for_sent_messages() {
    assert_eq!(message(1, 2).counterpart(Some(1)), 2);
}

#[test]
fn counterpart_is_sender_for_received_messages() {
    assert_eq!(message(5, 1).counterpart(Some(1)), 5);
}

#[test]
fn counterpart_defaults_to_sender_without_local_user() {
    assert_eq!(message(5, 1).counterpart(None), 5);
}
