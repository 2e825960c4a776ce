use axum::{Extension, Json, extract::State};
use tracing::info;

use parley_db::DbError;
use parley_db::models::{NewUser, ProfileChanges};
use parley_types::api::{
    ApiResponse, LoginRequest, LoginResponse, ProfileUpdateRequest, RegisterRequest,
};
use parley_types::models::UserProfile;

use crate::audit;
use crate::credentials::MIN_PASSWORD_LEN;
use crate::error::{ApiError, blocking, capitalize};
use crate::extract::ApiJson;
use crate::identifier::{self, Identifier};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::views::profile_of;

const DUPLICATE_ACCOUNT: &str = "Username or email already in use";

fn require_non_blank(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    require_non_blank(&req.name, "Name")?;
    require_non_blank(&req.role, "Role")?;
    identifier::check_username(&req.username).map_err(ApiError::Validation)?;
    identifier::check_email(&req.email).map_err(ApiError::Validation)?;
    check_password(&req.password)?;

    let st = state.clone();
    let user = blocking(move || {
        let password_hash = st.credentials.hash(&req.password)?;
        let new = NewUser {
            name: req.name,
            username: req.username,
            email: req.email,
            password_hash,
            role: req.role,
            disease: req.disease,
            date_of_birth: req.date_of_birth,
            place_of_birth: req.place_of_birth,
        };
        // One generic message so the response does not reveal which field clashed.
        st.db.create_user(&new).map_err(|e| match e {
            DbError::Duplicate(_) => ApiError::Duplicate(DUPLICATE_ACCOUNT.into()),
            other => other.into(),
        })
    })
    .await?;

    audit::record(&state, user.id, format!("User {} registered.", user.email)).await;
    Ok(Json(ApiResponse::ok(profile_of(&user))))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    require_non_blank(&req.identifier, "Identifier")?;
    require_non_blank(&req.password, "Password")?;

    let st = state.clone();
    let identifier = req.identifier.clone();
    let user = blocking(move || st.credentials.authenticate(&st.db, &identifier, &req.password))
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    // The subject is whichever identifier the client logged in with.
    let subject = match identifier::classify(&req.identifier) {
        Identifier::Email => &user.email,
        Identifier::Username => &user.username,
    };
    let access_token = state
        .tokens
        .issue(subject, Some(state.token_ttl))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(user_id = user.id, "User {} logged in", user.username);
    audit::record(&state, user.id, format!("User {} logged in.", subject)).await;

    Ok(Json(ApiResponse::ok(LoginResponse {
        access_token,
        token_type: "bearer".into(),
        user_profile: profile_of(&user),
    })))
}

pub async fn me(Extension(user): Extension<AuthUser>) -> Json<ApiResponse<UserProfile>> {
    Json(ApiResponse::ok(user.profile))
}

pub async fn validate_token(Extension(_user): Extension<AuthUser>) -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("Token is valid"))
}

/// PUT /users/me/profile. Absent fields stay as they are; a password change
/// needs the current password.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<ProfileUpdateRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    if let Some(name) = &req.name {
        require_non_blank(name, "Name")?;
    }
    if let Some(username) = &req.username {
        identifier::check_username(username).map_err(ApiError::Validation)?;
    }
    if let Some(email) = &req.email {
        identifier::check_email(email).map_err(ApiError::Validation)?;
    }
    if let Some(new_password) = &req.new_password {
        check_password(new_password)?;
    }

    let st = state.clone();
    let user_id = user.id;
    let updated = blocking(move || {
        let password_hash = match &req.new_password {
            Some(new_password) => {
                let current = req.current_password.as_deref().ok_or_else(|| {
                    ApiError::Validation("Current password is required to set a new password".into())
                })?;
                let stored = st.db.get_user_by_id(user_id)?.ok_or(ApiError::Unauthorized)?;
                if !st.credentials.verify(current, &stored.password_hash) {
                    return Err(ApiError::Validation("Current password is incorrect".into()));
                }
                Some(st.credentials.hash(new_password)?)
            }
            None => None,
        };

        let changes = ProfileChanges {
            name: req.name,
            username: req.username,
            email: req.email,
            password_hash,
            disease: req.disease,
            date_of_birth: req.date_of_birth,
            place_of_birth: req.place_of_birth,
        };
        st.db.update_user(user_id, &changes).map_err(|e| match e {
            DbError::Duplicate(column) => {
                ApiError::Validation(format!("{} already in use by another user", capitalize(column)))
            }
            other => other.into(),
        })
    })
    .await?;

    info!(user_id, "Profile updated for {}", updated.username);
    audit::record(&state, user_id, format!("User {} updated their profile.", updated.email)).await;
    Ok(Json(ApiResponse::ok(profile_of(&updated))))
}
