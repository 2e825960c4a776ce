use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A unique column already holds this value. Carries the column name.
    #[error("{0} already in use")]
    Duplicate(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not a participant of this chat")]
    NotAParticipant,

    /// Input rejected by a store-level rule.
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Returns the SQLite message (e.g. `UNIQUE constraint failed: users.email`)
/// when `err` is a unique or primary-key violation.
pub(crate) fn unique_violation(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            Some(msg.as_deref().unwrap_or(""))
        }
        _ => None,
    }
}
