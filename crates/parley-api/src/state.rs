use std::sync::Arc;

use chrono::Duration;

use parley_db::Database;

use crate::credentials::Credentials;
use crate::media::MediaStore;
use crate::token::TokenService;

pub type AppState = Arc<AppStateInner>;

/// Shared by every handler. Nothing in here changes after startup.
pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub credentials: Credentials,
    pub media: MediaStore,
    /// Bearer credential required on register/login.
    pub static_token: String,
    pub token_ttl: Duration,
}
