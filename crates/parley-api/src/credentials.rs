use argon2::{
    Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

use parley_db::Database;
use parley_db::models::UserRow;

use crate::error::ApiError;
use crate::identifier;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Argon2id password hashing plus identifier/password authentication.
///
/// A dummy hash made with the same parameters is verified whenever the
/// identifier matches nobody, so unknown users cost as much as wrong
/// passwords.
pub struct Credentials {
    hasher: Argon2<'static>,
    dummy_hash: String,
}

impl Credentials {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_params(Params::default())
    }

    /// Custom cost parameters. Tests use cheap ones.
    pub fn with_params(params: Params) -> Result<Self, ApiError> {
        let hasher = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = hasher
            .hash_password(b"parley-dummy-password", &salt)
            .map_err(|e| ApiError::Internal(format!("argon2 dummy hash: {}", e)))?
            .to_string();
        Ok(Self { hasher, dummy_hash })
    }

    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(format!("argon2 hash: {}", e)))?
            .to_string())
    }

    /// Unparseable hashes count as a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .hasher
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Returns the user named by `identifier` if `password` matches.
    pub fn authenticate(
        &self,
        db: &Database,
        identifier: &str,
        password: &str,
    ) -> Result<Option<UserRow>, ApiError> {
        match identifier::lookup(db, identifier)? {
            Some(user) if self.verify(password, &user.password_hash) => Ok(Some(user)),
            Some(_) => Ok(None),
            None => {
                let _ = self.verify(password, &self.dummy_hash);
                Ok(None)
            }
        }
    }
}
