use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::{
    errors::AuthError,
    jwt::TokenKeys,
    password::{hash_password, hash_password_blocking, verify_password},
    repo::UserStore,
    repo_types::User,
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown so both login failures cost the same.
    static ref DUMMY_HASH: Option<String> = hash_password("dummy-password-for-timing").ok();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Computes the dummy hash on the blocking pool so no login request pays for it.
pub async fn prime_dummy_hash() -> anyhow::Result<()> {
    tokio::task::spawn_blocking(|| lazy_static::initialize(&DUMMY_HASH)).await?;
    Ok(())
}

/// Checks `plain` against the stored hash, or against the dummy hash when there is none.
async fn verify_or_dummy(plain: String, stored: Option<String>) -> anyhow::Result<bool> {
    let ok = tokio::task::spawn_blocking(move || match stored {
        Some(hash) => verify_password(&plain, &hash),
        None => {
            let _ = verify_password(&plain, DUMMY_HASH.as_deref().unwrap_or(""));
            false
        }
    })
    .await?;
    Ok(ok)
}

/// Registration, login and current-user resolution over a [`UserStore`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: TokenKeys,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: TokenKeys) -> Self {
        Self { store, keys }
    }

    #[cfg(test)]
    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if !is_valid_email(email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::Validation(
                "value is not a valid email address".into(),
            ));
        }

        if self.store.find_by_email(email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        let hash = hash_password_blocking(password.to_owned()).await?;

        // A concurrent registration can still win between the lookup and the
        // insert; the store reports that as DuplicateEmail too.
        let user = self.store.create(email, &hash).await.map_err(|e| {
            warn!(email = %email, error = %e, "create user failed");
            AuthError::from(e)
        })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Returns a signed access token for valid credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let user = self.store.find_by_email(email).await?;

        let stored = user.as_ref().map(|u| u.password_hash.clone());
        let ok = verify_or_dummy(password.to_owned(), stored).await?;

        let user = match user {
            Some(u) if ok => u,
            Some(u) => {
                warn!(user_id = %u.id, "login invalid password");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                warn!(email = %email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = self.keys.issue(&user.email)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(token)
    }

    /// Verifies `token` and loads the user named by its subject.
    pub async fn resolve_current_user(&self, token: &str) -> Result<User, AuthError> {
        let email = self.keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            AuthError::Unauthorized
        })?;

        match self.store.find_by_email(&email).await? {
            Some(user) => Ok(user),
            None => {
                warn!(email = %email, "token subject no longer exists");
                Err(AuthError::Unauthorized)
            }
        }
    }
}
