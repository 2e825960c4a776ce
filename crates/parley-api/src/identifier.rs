use std::sync::LazyLock;

use regex::Regex;

use parley_db::models::UserRow;
use parley_db::{Database, Result};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("email pattern compiles"));

/// How a login identifier (or token subject) is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    Email,
    Username,
}

pub fn classify(value: &str) -> Identifier {
    if looks_like_email(value) {
        Identifier::Email
    } else {
        Identifier::Username
    }
}

pub fn looks_like_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Finds the user an identifier names, by email if it looks like one and by
/// username otherwise.
pub fn lookup(db: &Database, value: &str) -> Result<Option<UserRow>> {
    match classify(value) {
        Identifier::Email => db.get_user_by_email(value),
        Identifier::Username => db.get_user_by_username(value),
    }
}

/// Usernames are 3 to 32 characters and never contain `@`, which keeps them
/// disjoint from emails.
pub fn check_username(username: &str) -> std::result::Result<(), String> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err("Username must be between 3 and 32 characters".into());
    }
    if username.contains('@') {
        return Err("Username must not contain '@'".into());
    }
    if username.chars().any(char::is_whitespace) {
        return Err("Username must not contain whitespace".into());
    }
    Ok(())
}

pub fn check_email(email: &str) -> std::result::Result<(), String> {
    if looks_like_email(email) {
        Ok(())
    } else {
        Err("Invalid email address".into())
    }
}
