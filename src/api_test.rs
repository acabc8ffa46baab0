use axum::Router;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::json;

use super::*;

// =============================================================
// error_message
// =============================================================

#[test]
fn error_message_prefers_json_message_field() {
    let body = r#"{"message":"Identifiants invalides","code":401}"#;
    assert_eq!(error_message(Some("application/json"), body), "Identifiants invalides");
}

#[test]
fn error_message_json_without_message_returns_document() {
    let body = r#"{"error":"nope"}"#;
    assert_eq!(error_message(Some("application/json; charset=utf-8"), body), r#"{"error":"nope"}"#);
}

#[test]
fn error_message_plain_text_is_trimmed() {
    assert_eq!(error_message(Some("text/plain; charset=utf-8"), "Données invalides\n"), "Données invalides");
}

#[test]
fn error_message_without_content_type_is_text() {
    assert_eq!(error_message(None, r#"{"message":"ignored"}"#), r#"{"message":"ignored"}"#);
}

#[test]
fn error_message_invalid_json_is_unknown() {
    assert_eq!(error_message(Some("application/json"), "not json"), UNKNOWN_ERROR);
}

// =============================================================
// session_from_set_cookie
// =============================================================

#[test]
fn session_cookie_extracted_from_set_cookie() {
    let header = "session_id=abc123; Path=/; Expires=Wed, 01 Jan 2031 00:00:00 GMT; SameSite=None";
    assert_eq!(session_from_set_cookie(header).as_deref(), Some("abc123"));
}

#[test]
fn other_cookies_are_ignored() {
    assert_eq!(session_from_set_cookie("theme=dark; Path=/"), None);
    assert_eq!(session_from_set_cookie("session_id=; Path=/"), None);
}

// =============================================================
// HttpApi against a local server
// =============================================================

const TOKEN: &str = "tok123";

fn user_json(id: i64, username: &str) -> serde_json::Value {
    json!({ "id": id, "username": username, "firstName": "", "lastName": "", "email": "", "age": 30, "gender": "", "online": true })
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("{SESSION_COOKIE}={TOKEN}"))
}

async fn login() -> impl IntoResponse {
    (
        [(SET_COOKIE, format!("{SESSION_COOKIE}={TOKEN}; Path=/"))],
        axum::Json(json!({ "user": user_json(1, "alice"), "sessionId": TOKEN })),
    )
}

async fn me(headers: HeaderMap) -> axum::response::Response {
    if has_session(&headers) {
        axum::Json(user_json(1, "alice")).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "Non authentifié\n").into_response()
    }
}

async fn messages(Path(peer): Path<i64>) -> axum::Json<serde_json::Value> {
    if peer == 2 {
        axum::Json(json!([{ "id": 1, "senderId": 2, "receiverId": 1, "content": "hi" }]))
    } else {
        axum::Json(serde_json::Value::Null)
    }
}

async fn register(axum::Json(body): axum::Json<serde_json::Value>) -> axum::response::Response {
    if body["username"] == "alice" {
        return (StatusCode::CONFLICT, "Nom d'utilisateur déjà utilisé\n").into_response();
    }
    let mut created = user_json(5, body["username"].as_str().unwrap_or_default());
    created["firstName"] = body["firstName"].clone();
    created["sessionId"] = json!("body-token");
    axum::Json(created).into_response()
}

async fn post_by_id(Path(id): Path<i64>) -> axum::response::Response {
    if id == 42 {
        axum::Json(json!({ "id": 42, "userId": 1, "title": "deep", "content": "not on the home page", "categoryId": 1 }))
            .into_response()
    } else {
        (StatusCode::NOT_FOUND, "Publication non trouvée\n").into_response()
    }
}

async fn create_post() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, axum::Json(json!({ "message": "title is required" })))
}

async fn serve() -> HttpApi {
    let router = Router::new()
        .route("/api/login", post(login))
        .route("/api/me", get(me))
        .route("/api/messages/{peer}", get(messages))
        .route("/api/register", post(register))
        .route("/api/posts", post(create_post))
        .route("/api/posts/{id}", get(post_by_id));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    HttpApi::new(&ClientConfig::default().with_base_url(&format!("http://{addr}/"))).unwrap()
}

#[test]
fn http_api_rejects_invalid_base_url() {
    let config = ClientConfig::default().with_base_url("ws://forum.example.test");
    assert!(matches!(HttpApi::new(&config), Err(ClientError::InvalidBaseUrl(_))));
}

#[tokio::test]
async fn login_returns_user_and_cookie_token() {
    let api = serve().await;

    let session = api.login("alice", "secret").await.unwrap();

    assert_eq!(session.user.username, "alice");
    assert_eq!(session.token, TOKEN);
}

#[tokio::test]
async fn me_sends_session_cookie() {
    let api = serve().await;

    let user = api.me(TOKEN).await.unwrap();

    assert_eq!(user.id, 1);
}

#[tokio::test]
async fn unauthorized_text_body_becomes_api_error() {
    let api = serve().await;

    let err = api.me("wrong").await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 401, ref message } if message == "Non authentifié"));
}

#[tokio::test]
async fn null_list_decodes_as_empty() {
    let api = serve().await;

    assert_eq!(api.messages(TOKEN, 2).await.unwrap().len(), 1);
    assert!(api.messages(TOKEN, 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn json_error_body_uses_message_field() {
    let api = serve().await;
    let post = NewPost { title: String::new(), content: "body".to_owned(), category_id: 1 };

    let err = api.create_post(TOKEN, &post).await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 400, ref message } if message == "title is required"));
}

fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.to_owned(),
        age: 25,
        gender: "F".to_owned(),
        first_name: "Eve".to_owned(),
        last_name: "Martin".to_owned(),
        email: format!("{username}@example.test"),
        password: "secret".to_owned(),
    }
}

#[tokio::test]
async fn register_returns_inline_user_and_body_token() {
    let api = serve().await;

    let session = api.register(&new_user("eve")).await.unwrap();

    assert_eq!(session.user.id, 5);
    assert_eq!(session.user.username, "eve");
    assert_eq!(session.user.first_name, "Eve");
    assert_eq!(session.token, "body-token");
}

#[tokio::test]
async fn register_conflict_becomes_api_error() {
    let api = serve().await;

    let err = api.register(&new_user("alice")).await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 409, ref message } if message == "Nom d'utilisateur déjà utilisé"));
}

#[tokio::test]
async fn post_by_id_fetches_single_post() {
    let api = serve().await;

    let post = api.post_by_id(42).await.unwrap();
    assert_eq!(post.title, "deep");

    let err = api.post_by_id(7).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 404, .. }));
}
