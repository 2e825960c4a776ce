use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use parley_types::models::UserProfile;

use crate::error::{ApiError, blocking};
use crate::identifier;
use crate::state::AppState;
use crate::views::profile_of;

/// The caller behind a validated bearer token, inserted as a request
/// extension by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    /// Raw token subject, username or email.
    pub subject: String,
    pub profile: UserProfile,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Gate for the public endpoints: the bearer credential must equal the
/// configured static token.
pub async fn require_static_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = bearer_token(req.headers()).unwrap_or_default().as_bytes();

    if !bool::from(presented.ct_eq(state.static_token.as_bytes())) {
        warn!("Rejected request to {} with bad static token", req.uri().path());
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}

/// Extract and validate the bearer token, then resolve its subject to a
/// user. Any failure is a 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;

    let subject = state.tokens.validate(token).map_err(|e| {
        warn!("Token rejected: {}", e);
        ApiError::Unauthorized
    })?;

    let st = state.clone();
    let lookup_subject = subject.clone();
    let user = blocking(move || Ok(identifier::lookup(&st.db, &lookup_subject)?))
        .await?
        .ok_or_else(|| {
            // Subject no longer names anyone, e.g. after a username change.
            warn!("Token subject '{}' matches no user", subject);
            ApiError::Unauthorized
        })?;

    debug!(user_id = user.id, "Authenticated {}", subject);
    req.extensions_mut().insert(AuthUser {
        id: user.id,
        subject,
        profile: profile_of(&user),
    });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_prefix_variants() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
