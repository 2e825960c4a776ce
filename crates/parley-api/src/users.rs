//! User directory lookups. The bearer-authenticated routes are audited; the
//! static-token `/public` mirrors return the same data without an audit trail.

use axum::{Extension, Json, extract::State};
use tracing::debug;

use parley_types::api::{ApiResponse, SearchQuery};
use parley_types::models::UserProfile;

use crate::audit;
use crate::error::{ApiError, blocking};
use crate::extract::ApiQuery;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::views::profile_of;

async fn run_search(state: &AppState, query: SearchQuery) -> Result<Vec<UserProfile>, ApiError> {
    let name = query.name.filter(|n| !n.trim().is_empty());
    if name.is_none() && query.user_id.is_none() {
        return Err(ApiError::MissingSearchCriteria);
    }

    let st = state.clone();
    let user_id = query.user_id;
    let (skip, limit) = (query.skip, query.limit);
    let rows = blocking(move || Ok(st.db.search_users(name.as_deref(), user_id, skip, limit)?)).await?;
    Ok(rows.iter().map(profile_of).collect())
}

async fn all_profiles(state: &AppState) -> Result<Vec<UserProfile>, ApiError> {
    let st = state.clone();
    let rows = blocking(move || Ok(st.db.list_users()?)).await?;
    Ok(rows.iter().map(profile_of).collect())
}

/// GET /users/search?name=&user_id=&skip=&limit=
pub async fn search_users(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<UserProfile>>>, ApiError> {
    let filter = format!(
        "name={}, user_id={}",
        query.name.as_deref().unwrap_or("None"),
        query.user_id.map_or_else(|| "None".to_string(), |id| id.to_string())
    );
    let found = run_search(&state, query).await?;

    audit::record(
        &state,
        user.id,
        format!("Searched users {} found {} results", filter, found.len()),
    )
    .await;
    Ok(Json(ApiResponse::ok(found)))
}

pub async fn search_users_public(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<UserProfile>>>, ApiError> {
    let found = run_search(&state, query).await?;
    debug!("Public user search returned {} results", found.len());
    Ok(Json(ApiResponse::ok(found)))
}

/// GET /users/all
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<UserProfile>>>, ApiError> {
    let users = all_profiles(&state).await?;
    audit::record(&state, user.id, format!("Viewed all users ({} users)", users.len())).await;
    Ok(Json(ApiResponse::ok(users)))
}

pub async fn list_users_public(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserProfile>>>, ApiError> {
    Ok(Json(ApiResponse::ok(all_profiles(&state).await?)))
}
