use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::info;

use crate::error::unique_violation;
use crate::models::{NewUser, ProfileChanges, UserRow};
use crate::{Database, DbError, Result};

const USER_COLUMNS: &str = "id, name, username, email, password_hash, role, disease, \
                            date_of_birth, place_of_birth, created_at";

impl Database {
    /// Inserts a user. Fails with `Duplicate` when the username or email is
    /// taken; nothing is written in that case.
    pub fn create_user(&self, user: &NewUser) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (name, username, email, password_hash, role, disease, date_of_birth, place_of_birth)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.name,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.role,
                    user.disease,
                    user.date_of_birth,
                    user.place_of_birth,
                ],
            )
            .map_err(map_user_conflict)?;

            let id = conn.last_insert_rowid();
            info!(user_id = id, "Created user {}", user.username);
            query_user_by_id(conn, id)?.ok_or(DbError::NotFound("user"))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Users whose display name contains `name` (ASCII case-insensitive)
    /// and/or whose id is `user_id`, ordered by id. A `None` filter matches
    /// everyone.
    pub fn search_users(
        &self,
        name: Option<&str>,
        user_id: Option<i64>,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<UserRow>> {
        let pattern = name.map(|n| format!("%{}%", escape_like(n)));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users
                 WHERE (?1 IS NULL OR name LIKE ?1 ESCAPE '\\')
                   AND (?2 IS NULL OR id = ?2)
                 ORDER BY id LIMIT ?3 OFFSET ?4",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![pattern, user_id, limit, skip], row_to_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
    }

    /// Applies `changes` to user `id` in one immediate transaction.
    ///
    /// A new username or email is checked against every other user before
    /// anything is written.
    pub fn update_user(&self, id: i64, changes: &ProfileChanges) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(username) = &changes.username {
                if taken_by_other(&tx, "username", username, id)? {
                    return Err(DbError::Duplicate("username"));
                }
            }
            if let Some(email) = &changes.email {
                if taken_by_other(&tx, "email", email, id)? {
                    return Err(DbError::Duplicate("email"));
                }
            }

            let updated = tx
                .execute(
                    "UPDATE users SET
                        name = COALESCE(?2, name),
                        username = COALESCE(?3, username),
                        email = COALESCE(?4, email),
                        password_hash = COALESCE(?5, password_hash),
                        disease = COALESCE(?6, disease),
                        date_of_birth = COALESCE(?7, date_of_birth),
                        place_of_birth = COALESCE(?8, place_of_birth)
                     WHERE id = ?1",
                    params![
                        id,
                        changes.name,
                        changes.username,
                        changes.email,
                        changes.password_hash,
                        changes.disease,
                        changes.date_of_birth,
                        changes.place_of_birth,
                    ],
                )
                .map_err(map_user_conflict)?;
            if updated == 0 {
                return Err(DbError::NotFound("user"));
            }

            let row = query_user_by_id(&tx, id)?.ok_or(DbError::NotFound("user"))?;
            tx.commit()?;
            Ok(row)
        })
    }
}

/// Escapes LIKE wildcards so `name` matches literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn taken_by_other(conn: &Connection, column: &str, value: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM users WHERE {} = ?1 AND id != ?2)", column);
    Ok(conn.query_row(&sql, params![value, id], |r| r.get(0))?)
}

fn map_user_conflict(err: rusqlite::Error) -> DbError {
    match unique_violation(&err) {
        Some(msg) if msg.contains("users.email") => DbError::Duplicate("email"),
        Some(_) => DbError::Duplicate("username"),
        None => err.into(),
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    query_user(conn, "id = ?1", id)
}

pub(crate) fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    query_user(conn, "username = ?1", username)
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    value: P,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let row = conn.query_row(&sql, [value], row_to_user).optional()?;
    Ok(row)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        role: row.get(5)?,
        disease: row.get(6)?,
        date_of_birth: row.get(7)?,
        place_of_birth: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
pub(crate) fn sample_user(username: &str) -> NewUser {
    NewUser {
        name: format!("{} display", username),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "$argon2id$not-a-real-hash".to_string(),
        role: "patient".to_string(),
        disease: None,
        date_of_birth: None,
        place_of_birth: None,
    }
}
