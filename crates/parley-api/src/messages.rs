use axum::{
    Extension, Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use tracing::{debug, info, warn};

use parley_db::models::NewMessage;
use parley_types::api::{ApiResponse, SendMessageRequest, UploadMediaResponse};
use parley_types::models::Message;

use crate::audit;
use crate::error::{ApiError, blocking};
use crate::extract::{ApiJson, ApiPath};
use crate::media::{self, MAX_MEDIA_SIZE};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::views;

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

fn too_large() -> ApiError {
    ApiError::Validation(format!("File exceeds the {} MiB limit", MAX_MEDIA_SIZE / (1024 * 1024)))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    ApiError::Validation(format!("Malformed upload: {}", err.body_text()))
}

/// GET /chats/{chat_id}/messages. Fetching marks the other participant's
/// messages as read.
pub async fn get_messages(
    State(state): State<AppState>,
    ApiPath(chat_id): ApiPath<String>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<Message>>>, ApiError> {
    let st = state.clone();
    let cid = chat_id.clone();
    let user_id = user.id;
    let rows = blocking(move || Ok(st.db.fetch_and_mark_read(&cid, user_id)?)).await?;

    let messages: Vec<Message> = rows.into_iter().map(views::message).collect();
    audit::record(
        &state,
        user.id,
        format!("Retrieved {} messages from chat {}", messages.len(), chat_id),
    )
    .await;
    Ok(Json(ApiResponse::ok(messages)))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<Json<ApiResponse<Message>>, ApiError> {
    let kind = req.message_type;
    if kind.is_media() {
        let reference = req
            .media_url
            .as_deref()
            .ok_or_else(|| ApiError::Validation(format!("A {} message needs a media_url", kind)))?;
        if !media::reference_matches_kind(reference, kind) {
            return Err(ApiError::Validation(format!("media_url is not a valid {} reference", kind)));
        }
        if !state.media.exists(reference).await {
            return Err(ApiError::Validation("media_url does not name an uploaded file".into()));
        }
    } else {
        if req.content.trim().is_empty() {
            return Err(ApiError::Validation("Text messages need content".into()));
        }
        if req.media_url.is_some() {
            return Err(ApiError::Validation("Text messages cannot carry media".into()));
        }
    }

    let chat_id = req.chat_id.clone();
    let new = NewMessage {
        chat_id: req.chat_id,
        sender_id: user.id,
        content: req.content,
        kind,
        media_url: req.media_url,
    };

    let st = state.clone();
    let row = blocking(move || Ok(st.db.insert_message(&new)?)).await?;

    debug!(user_id = user.id, message_id = %row.id, "Message stored in chat {}", chat_id);
    audit::record(&state, user.id, format!("Sent {} to chat {}", kind, chat_id)).await;
    Ok(Json(ApiResponse::ok(views::message(row))))
}

/// POST /messages/upload-media. Reads the `file` field chunk by chunk and
/// gives up as soon as it passes [`MAX_MEDIA_SIZE`], before anything is
/// written.
pub async fn upload_media(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<UploadMediaResponse>>, ApiError> {
    let mut multipart = multipart?;
    let mut field = loop {
        match multipart.next_field().await.map_err(multipart_error)? {
            Some(field) if field.name() == Some(FILE_FIELD) => break field,
            Some(_) => continue,
            None => return Err(ApiError::Validation("Missing 'file' field".into())),
        }
    };

    let content_type = field.content_type().unwrap_or_default().to_string();
    let (kind, ext) = media::classify_content_type(&content_type).ok_or_else(|| {
        warn!(user_id = user.id, "Rejected upload with content type '{}'", content_type);
        ApiError::Validation("Only image and video files are allowed".into())
    })?;

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > MAX_MEDIA_SIZE {
            warn!(user_id = user.id, "Upload exceeded {} bytes", MAX_MEDIA_SIZE);
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }
    if bytes.is_empty() {
        return Err(ApiError::Validation("Uploaded file is empty".into()));
    }

    let media_url = state.media.save(kind, &ext, &bytes).await?;

    info!(user_id = user.id, "Uploaded {} ({} bytes) as {}", kind, bytes.len(), media_url);
    audit::record(&state, user.id, format!("Uploaded {}", kind)).await;
    Ok(Json(ApiResponse::ok(UploadMediaResponse {
        media_url,
        message_type: kind,
    })))
}
