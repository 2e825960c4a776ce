use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use jsonwebtoken::Algorithm;

use parley_api::token::parse_algorithm;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

/// Everything the server reads from the environment, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub token_ttl_minutes: i64,
    pub static_token: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = required_secret(&lookup, "PARLEY_JWT_SECRET")?;
        let static_token = required_secret(&lookup, "PARLEY_STATIC_TOKEN")?;

        let port: u16 = var("PARLEY_PORT", "8000")
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let jwt_algorithm =
            parse_algorithm(&var("PARLEY_JWT_ALGORITHM", "HS256")).map_err(anyhow::Error::msg)?;
        let token_ttl_minutes: i64 = var("PARLEY_TOKEN_TTL_MINUTES", "30")
            .parse()
            .context("PARLEY_TOKEN_TTL_MINUTES must be a whole number of minutes")?;
        if token_ttl_minutes <= 0 {
            bail!("PARLEY_TOKEN_TTL_MINUTES must be positive");
        }

        Ok(Self {
            host: var("PARLEY_HOST", "0.0.0.0"),
            port,
            db_path: var("PARLEY_DB_PATH", "parley.db").into(),
            media_dir: var("PARLEY_MEDIA_DIR", "uploads").into(),
            jwt_secret,
            jwt_algorithm,
            token_ttl_minutes,
            static_token,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn required_secret(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    let value = lookup(key).unwrap_or_default();
    if value.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        bail!("{} is unset or still a placeholder; set it in your .env file", key);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    const SECRETS: [(&str, &str); 2] = [
        ("PARLEY_JWT_SECRET", "a-long-random-signing-secret"),
        ("PARLEY_STATIC_TOKEN", "static-bootstrap-token"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(&SECRETS).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert_eq!(config.media_dir, PathBuf::from("uploads"));
        assert_eq!(config.jwt_algorithm, Algorithm::HS256);
        assert_eq!(config.token_ttl_minutes, 30);
        assert_eq!(config.addr().unwrap().port(), 8000);
    }

    #[test]
    fn secrets_are_required_and_not_placeholders() {
        assert!(load(&[SECRETS[1]]).is_err());
        assert!(load(&[SECRETS[0]]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "dev-secret-change-me"), SECRETS[1]]).is_err());
    }

    #[test]
    fn overrides_are_validated() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("PARLEY_JWT_ALGORITHM", "HS512"));
        pairs.push(("PARLEY_TOKEN_TTL_MINUTES", "5"));
        let config = load(&pairs).unwrap();
        assert_eq!(config.jwt_algorithm, Algorithm::HS512);
        assert_eq!(config.token_ttl_minutes, 5);

        let mut bad = SECRETS.to_vec();
        bad.push(("PARLEY_JWT_ALGORITHM", "RS256"));
        assert!(load(&bad).is_err());

        let mut bad = SECRETS.to_vec();
        bad.push(("PARLEY_PORT", "eighty"));
        assert!(load(&bad).is_err());
    }
}
