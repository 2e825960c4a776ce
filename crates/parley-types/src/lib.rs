//! Wire types shared by the Parley HTTP layer and the store.
//!
//! Everything here is plain serde data. The response envelope lives in
//! [`api::ApiResponse`]; domain shapes returned inside it live in [`models`].

pub mod api;
pub mod models;
