use tracing::warn;

use crate::state::AppState;

/// Appends an activity-log entry for `user_id`. A failed write is logged and
/// otherwise ignored so auditing never fails the request it describes.
pub async fn record(state: &AppState, user_id: i64, action: String) {
    let st = state.clone();
    let result = tokio::task::spawn_blocking(move || st.db.log_activity(user_id, &action)).await;

    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(user_id, "Failed to write activity log: {}", e),
        Err(e) => warn!(user_id, "Activity log task failed: {}", e),
    }
}
