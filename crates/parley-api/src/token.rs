use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use parley_types::api::Claims;

/// Lifetime used when a caller does not pass one.
pub const DEFAULT_TTL_MINUTES: i64 = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature does not verify")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token has no subject claim")]
    MalformedClaims,

    #[error("token is not a decodable JWT for this service")]
    Malformed,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Parses one of the HMAC algorithm names (`HS256`, `HS384`, `HS512`).
/// Asymmetric algorithms are refused since the service signs with a shared
/// secret.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, String> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(format!("unsupported JWT algorithm '{}' (expected HS256, HS384 or HS512)", other)),
    }
}

/// Issues and validates access tokens. Secret and algorithm are fixed at
/// construction and never change afterwards.
pub struct TokenService {
    header: Header,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &[u8], algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        // Expiry is checked by hand in `validate_at` against the caller's clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            header: Header::new(algorithm),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(&self, subject: &str, ttl: Option<Duration>) -> Result<String, TokenError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl = ttl.unwrap_or_else(|| Duration::minutes(DEFAULT_TTL_MINUTES));
        let claims = Claims {
            sub: Some(subject.to_string()),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&self.header, &claims, &self.encoding).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Returns the raw subject (username or email) of a valid token.
    pub fn validate(&self, token: &str) -> Result<String, TokenError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::MissingRequiredClaim(_) => TokenError::MalformedClaims,
                _ => TokenError::Malformed,
            }
        })?;

        if now.timestamp() > data.claims.exp {
            return Err(TokenError::Expired);
        }

        match data.claims.sub {
            Some(sub) if !sub.is_empty() => Ok(sub),
            _ => Err(TokenError::MalformedClaims),
        }
    }
}
