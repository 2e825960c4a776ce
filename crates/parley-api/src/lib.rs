pub mod audit;
pub mod auth;
pub mod chats;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod identifier;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod router;
pub mod state;
pub mod token;
pub mod users;
pub mod views;

pub use error::ApiError;
pub use router::build_router;
pub use state::{AppState, AppStateInner};
