use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tower::Layer;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use crate::media::MAX_MEDIA_SIZE;
use crate::middleware::{require_auth, require_static_token};
use crate::state::AppState;
use crate::{auth, chats, messages, users};

/// Multipart framing on top of the largest accepted file.
const UPLOAD_BODY_LIMIT: usize = MAX_MEDIA_SIZE + 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/users/search/public", get(users::search_users_public))
        .route("/users/all/public", get(users::list_users_public))
        .route_layer(from_fn_with_state(state.clone(), require_static_token));

    let protected_routes = Router::new()
        .route("/users/me/", get(auth::me))
        .route("/users/me/profile", put(auth::update_profile))
        .route("/users/search", get(users::search_users))
        .route("/users/all", get(users::list_users))
        .route("/token/validate", get(auth::validate_token))
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/chats/{chat_id}/messages", get(messages::get_messages))
        .route("/messages", post(messages::send_message))
        .route(
            "/messages/upload-media",
            post(messages::upload_media).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    // Browsers must not sniff uploaded bytes into something executable.
    let media = SetResponseHeaderLayer::overriding(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    )
    .layer(ServeDir::new(state.media.dir()));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/media", media)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
