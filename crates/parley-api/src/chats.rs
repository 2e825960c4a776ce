use axum::{Extension, Json, extract::State};
use tracing::info;

use parley_types::api::{ApiResponse, CreateChatRequest};
use parley_types::models::ChatSummary;

use crate::audit;
use crate::error::{ApiError, blocking};
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::views;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<ChatSummary>>>, ApiError> {
    let st = state.clone();
    let user_id = user.id;
    let rows = blocking(move || Ok(st.db.list_chats_for(user_id)?)).await?;

    let chats: Vec<ChatSummary> = rows.into_iter().map(views::chat_summary).collect();
    audit::record(&state, user.id, format!("Retrieved {} chats", chats.len())).await;
    Ok(Json(ApiResponse::ok(chats)))
}

/// Returns the chat between the caller and `username`, creating it on
/// first contact. Asking twice, from either side, yields the same chat.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateChatRequest>,
) -> Result<Json<ApiResponse<ChatSummary>>, ApiError> {
    let recipient_username = req.username.trim().to_string();
    if recipient_username.is_empty() {
        return Err(ApiError::Validation("Recipient username must not be empty".into()));
    }

    let st = state.clone();
    let user_id = user.id;
    let (summary, recipient_username, created) = blocking(move || {
        let (chat, recipient, created) = st.db.create_or_get_chat(user_id, &recipient_username)?;
        let summary = st
            .db
            .chat_summary(&chat.id, user_id)?
            .ok_or_else(|| ApiError::Internal(format!("chat {} has no summary for its creator", chat.id)))?;
        Ok((summary, recipient.username, created))
    })
    .await?;

    if created {
        info!(user_id, chat_id = %summary.chat_id, "Started chat with {}", recipient_username);
        audit::record(&state, user.id, format!("Created new chat with {}", recipient_username)).await;
    }
    Ok(Json(ApiResponse::ok(views::chat_summary(summary))))
}
