use std::sync::Arc;

use argon2::Params;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use parley_api::credentials::Credentials;
use parley_api::media::{MAX_MEDIA_SIZE, MediaStore};
use parley_api::token::TokenService;
use parley_api::{AppState, AppStateInner, build_router};
use parley_db::Database;

const STATIC_TOKEN: &str = "static-test-token";

struct TestApp {
    router: Router,
    state: AppState,
    _media_dir: TempDir,
}

fn app() -> TestApp {
    let media_dir = tempfile::tempdir().unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        tokens: TokenService::new(b"integration-secret", Algorithm::HS256),
        credentials: Credentials::with_params(Params::new(4096, 2, 1, None).unwrap()).unwrap(),
        media: MediaStore::new(media_dir.path().join("media")).unwrap(),
        static_token: STATIC_TOKEN.into(),
        token_ttl: chrono::Duration::minutes(30),
    });
    TestApp {
        router: build_router(state.clone()),
        state,
        _media_dir: media_dir,
    }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn json(&self, method: Method, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, bearer: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn register(&self, username: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            "/register",
            Some(STATIC_TOKEN),
            json!({
                "name": format!("{} display", username),
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "password1",
                "role": "patient",
                "date_of_birth": "1990-04-02",
            }),
        )
        .await
    }

    async fn login(&self, identifier: &str, password: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            "/login",
            Some(STATIC_TOKEN),
            json!({ "identifier": identifier, "password": password }),
        )
        .await
    }

    /// Registers `username` and returns a fresh access token for it.
    async fn user(&self, username: &str) -> String {
        let (_, body) = self.register(username).await;
        assert_eq!(body["success"], true, "register {}: {}", username, body);
        let (_, body) = self.login(username, "password1").await;
        body["data"]["access_token"].as_str().unwrap().to_string()
    }

    async fn upload(&self, token: &str, content_type: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let boundary = "parley-test-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/messages/upload-media")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    fn count(&self, sql: &str) -> i64 {
        self.state
            .db
            .with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?))
            .unwrap()
    }
}

#[tokio::test]
async fn duplicate_registration_is_a_business_failure() {
    let app = app();

    let (status, body) = app.register("alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["date_of_birth"], "1990-04-02");
    assert!(body["data"].get("password_hash").is_none());

    let (status, body) = app.register("alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["error"], "Username or email already in use");

    assert_eq!(app.count("SELECT COUNT(*) FROM users"), 1);
}

#[tokio::test]
async fn registration_validates_input() {
    let app = app();
    let (status, body) = app
        .json(
            Method::POST,
            "/register",
            Some(STATIC_TOKEN),
            json!({
                "name": "Mallory",
                "username": "mal@lory",
                "email": "mallory@example.com",
                "password": "password1",
                "role": "patient",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .json(
            Method::POST,
            "/register",
            Some(STATIC_TOKEN),
            json!({
                "name": "Shorty",
                "username": "shorty",
                "email": "shorty@example.com",
                "password": "12345",
                "role": "patient",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.count("SELECT COUNT(*) FROM users"), 0);
}

#[tokio::test]
async fn public_endpoints_require_the_static_token() {
    let app = app();

    let body = json!({ "identifier": "alice", "password": "password1" });
    let (status, resp) = app.json(Method::POST, "/login", None, body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(resp["success"], false);

    let (status, _) = app.json(Method::POST, "/login", Some("wrong-token"), body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_bodies_get_the_envelope() {
    let app = app();
    let alice = app.user("alice").await;

    let (status, body) = app
        .json(Method::POST, "/login", Some(STATIC_TOKEN), json!({ "identifier": "alice" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"], Value::Null);
    assert!(body["error"].as_str().unwrap().contains("password"));

    let req = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::AUTHORIZATION, format!("Bearer {}", STATIC_TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Not multipart at all.
    let req = Request::builder()
        .method(Method::POST)
        .uri("/messages/upload-media")
        .header(header::AUTHORIZATION, format!("Bearer {}", alice))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn user_directory_and_public_mirrors() {
    let app = app();
    let alice = app.user("alice").await;
    app.user("bob").await;
    app.user("carol").await;

    let (status, body) = app.get("/users/search?name=ALI", &alice).await;
    assert_eq!(status, StatusCode::OK);
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["username"], "alice");
    assert!(found[0].get("password_hash").is_none());
    let bob_id = {
        let (_, body) = app.get("/users/search?name=bob", &alice).await;
        body["data"][0]["id"].as_i64().unwrap()
    };

    let (_, body) = app.get(&format!("/users/search?user_id={}", bob_id), &alice).await;
    assert_eq!(body["data"][0]["username"], "bob");

    let (_, body) = app.get("/users/search?name=display&skip=1&limit=1", &alice).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["username"], "bob");

    let (status, body) = app.get("/users/search", &alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Provide at least one search parameter (name or user_id)");

    let (status, body) = app.get("/users/search?user_id=abc", &alice).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, body) = app.get("/users/all", &alice).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    // Mirrors answer to the static token and nothing else.
    let (status, body) = app.get("/users/search/public?name=carol", STATIC_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["username"], "carol");
    let (_, body) = app.get("/users/search/public", STATIC_TOKEN).await;
    assert_eq!(body["success"], false);
    let (status, body) = app.get("/users/all/public", STATIC_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, _) = app.get("/users/all/public", &alice).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/users/all", STATIC_TOKEN).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(
        app.count("SELECT COUNT(*) FROM activity_logs WHERE action = 'Viewed all users (3 users)'"),
        1
    );
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM activity_logs WHERE action = 'Searched users name=ALI, user_id=None found 1 results'"
        ),
        1
    );
}

#[tokio::test]
async fn login_by_username_or_email() {
    let app = app();
    app.register("alice").await;

    let (status, body) = app.login("alice", "password1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["token_type"], "bearer");
    assert_eq!(body["data"]["user_profile"]["email"], "alice@example.com");
    let by_name = body["data"]["access_token"].as_str().unwrap().to_string();

    let (_, body) = app.login("alice@example.com", "password1").await;
    let by_email = body["data"]["access_token"].as_str().unwrap().to_string();

    for token in [&by_name, &by_email] {
        let (status, me) = app.get("/users/me/", token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["data"]["username"], "alice");
    }

    let (status, body) = app.get("/token/validate", &by_name).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "Token is valid");

    let (status, body) = app.login("alice", "wrong-password").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    let (status, _) = app.login("   ", "password1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.count("SELECT COUNT(*) FROM activity_logs WHERE action LIKE '%logged in.'") >= 2);
}

#[tokio::test]
async fn bad_tokens_are_unauthorized() {
    let app = app();

    let (status, body) = app.get("/users/me/", "garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let req = Request::builder().uri("/chats").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    // The static token is not an access token.
    let (status, _) = app.get("/users/me/", STATIC_TOKEN).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_update_rules() {
    let app = app();
    let alice = app.user("alice").await;
    app.user("bob").await;

    let (status, body) = app
        .json(
            Method::PUT,
            "/users/me/profile",
            Some(alice.as_str()),
            json!({ "email": "bob@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email already in use by another user");

    let (status, _) = app
        .json(
            Method::PUT,
            "/users/me/profile",
            Some(alice.as_str()),
            json!({ "new_password": "newpassword" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .json(
            Method::PUT,
            "/users/me/profile",
            Some(alice.as_str()),
            json!({
                "name": "Alice A.",
                "current_password": "password1",
                "new_password": "newpassword",
                "place_of_birth": "Lisbon",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Alice A.");
    assert_eq!(body["data"]["place_of_birth"], "Lisbon");

    let (_, body) = app.login("alice", "password1").await;
    assert_eq!(body["success"], false);
    let (_, body) = app.login("alice", "newpassword").await;
    assert_eq!(body["success"], true);

    // Tokens name the old username, which no longer resolves.
    let (status, _) = app
        .json(
            Method::PUT,
            "/users/me/profile",
            Some(alice.as_str()),
            json!({ "username": "alicia" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/users/me/", &alice).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn two_party_chat_round_trip() {
    let app = app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let carol = app.user("carol").await;

    let (_, body) = app.json(Method::POST, "/chats", Some(alice.as_str()), json!({ "username": "bob" })).await;
    assert_eq!(body["success"], true);
    let chat_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["recipient_name"], "bob display");

    let (_, body) = app.json(Method::POST, "/chats", Some(bob.as_str()), json!({ "username": "alice" })).await;
    assert_eq!(body["data"]["id"], chat_id.as_str());
    assert_eq!(app.count("SELECT COUNT(*) FROM chats"), 1);

    let (_, body) = app
        .json(
            Method::POST,
            "/messages",
            Some(alice.as_str()),
            json!({ "chat_id": chat_id, "content": "hi", "message_type": "text" }),
        )
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["read"], false);
    assert_eq!(body["data"]["sender_name"], "alice display");

    let (_, chats) = app.get("/chats", &bob).await;
    assert_eq!(chats["data"][0]["id"], chat_id.as_str());
    assert_eq!(chats["data"][0]["last_message"], "hi");
    assert_eq!(chats["data"][0]["unread"], true);

    let (_, chats) = app.get("/chats", &alice).await;
    assert_eq!(chats["data"][0]["unread"], false);

    let uri = format!("/chats/{}/messages", chat_id);
    let (_, body) = app.get(&uri, &bob).await;
    let messages = body["data"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hi");
    assert_eq!(messages[0]["read"], true);

    let (_, chats) = app.get("/chats", &bob).await;
    assert_eq!(chats["data"][0]["unread"], false);

    let (status, body) = app.get(&uri, &carol).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Chat not found or you're not a participant");

    let (status, body) = app
        .json(
            Method::POST,
            "/messages",
            Some(carol.as_str()),
            json!({ "chat_id": chat_id, "content": "me too" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    assert_eq!(app.count("SELECT COUNT(*) FROM messages"), 1);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM activity_logs WHERE action = 'Created new chat with bob'"),
        1
    );
}

#[tokio::test]
async fn unknown_or_self_recipient() {
    let app = app();
    let alice = app.user("alice").await;

    let (status, body) = app.json(Method::POST, "/chats", Some(alice.as_str()), json!({ "username": "nobody" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Recipient not found");

    let (status, _) = app.json(Method::POST, "/chats", Some(alice.as_str()), json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn media_upload_and_send() {
    let app = app();
    let alice = app.user("alice").await;
    app.user("bob").await;

    let (status, body) = app.upload(&alice, "application/pdf", b"%PDF-1.4").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(1)</script></svg>"#;
    let (status, body) = app.upload(&alice, "image/svg+xml", svg).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let too_big = vec![0u8; MAX_MEDIA_SIZE + 1];
    let (status, _) = app.upload(&alice, "image/png", &too_big).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        std::fs::read_dir(app.state.media.dir()).unwrap().count(),
        0,
        "rejected uploads write nothing"
    );

    let (status, body) = app.upload(&alice, "image/png", b"\x89PNG\r\n").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message_type"], "image");
    let media_url = body["data"]["media_url"].as_str().unwrap().to_string();
    assert!(media_url.starts_with("image_") && media_url.ends_with(".png"));

    let (_, chat) = app.json(Method::POST, "/chats", Some(alice.as_str()), json!({ "username": "bob" })).await;
    let chat_id = chat["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .json(
            Method::POST,
            "/messages",
            Some(alice.as_str()),
            json!({ "chat_id": chat_id, "content": "look", "media_url": media_url }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Reference issued for an image cannot be sent as a video.
    let (status, _) = app
        .json(
            Method::POST,
            "/messages",
            Some(alice.as_str()),
            json!({ "chat_id": chat_id, "message_type": "video", "media_url": media_url }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .json(
            Method::POST,
            "/messages",
            Some(alice.as_str()),
            json!({ "chat_id": chat_id, "message_type": "image", "media_url": media_url }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message_type"], "image");
    assert_eq!(body["data"]["media_url"], media_url.as_str());

    // Uploaded media is served statically.
    let req = Request::builder()
        .uri(format!("/media/{}", media_url))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    let served = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&served[..], b"\x89PNG\r\n");

    assert_eq!(
        app.count("SELECT COUNT(*) FROM activity_logs WHERE action = 'Uploaded image'"),
        1
    );
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}
