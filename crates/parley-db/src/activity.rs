use rusqlite::params;

use crate::models::{ActivityRow, now_timestamp};
use crate::{Database, Result};

impl Database {
    /// Appends an audit entry. Entries are never updated or deleted.
    pub fn log_activity(&self, user_id: i64, action: &str) -> Result<ActivityRow> {
        self.with_conn(|conn| {
            let created_at = now_timestamp();
            conn.execute(
                "INSERT INTO activity_logs (action, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![action, user_id, created_at],
            )?;
            Ok(ActivityRow {
                id: conn.last_insert_rowid(),
                action: action.to_string(),
                user_id,
                created_at,
            })
        })
    }
}
