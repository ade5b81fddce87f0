use std::{fmt, str::FromStr};

use anyhow::{bail, Context};
use jsonwebtoken::Algorithm;

/// Upper bound on token lifetime: one year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl_minutes: i64,
}

// Keeps the signing secret out of `?config` log lines.
impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project_name: String,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let secret = lookup("SECRET_KEY").context("SECRET_KEY must be set")?;
        if secret.trim().is_empty() {
            bail!("SECRET_KEY must not be empty");
        }

        let algorithm_name = lookup("ALGORITHM").unwrap_or_else(|| "HS256".into());
        let algorithm = Algorithm::from_str(&algorithm_name)
            .with_context(|| format!("unknown signing algorithm {algorithm_name}"))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            bail!("signing algorithm {algorithm_name} is not an HMAC algorithm");
        }

        let ttl_minutes = match lookup("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Some(v) => v
                .parse::<i64>()
                .with_context(|| format!("ACCESS_TOKEN_EXPIRE_MINUTES is not a number: {v}"))?,
            None => 60,
        };
        if ttl_minutes <= 0 {
            bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        }
        if ttl_minutes > MAX_TTL_MINUTES {
            bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be at most {MAX_TTL_MINUTES}");
        }

        let port = match lookup("APP_PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("APP_PORT is not a valid port: {v}"))?,
            None => 8080,
        };

        Ok(Self {
            project_name: lookup("PROJECT_NAME").unwrap_or_else(|| "Auth API".into()),
            database_url,
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt: JwtConfig {
                secret,
                algorithm,
                ttl_minutes,
            },
        })
    }
}
