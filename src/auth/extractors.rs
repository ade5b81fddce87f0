use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::auth::errors::AuthError;

/// Raw token from `Authorization: Bearer <token>`; scheme match ignores case.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::Unauthorized)?;

        let (scheme, token) = auth.split_once(' ').ok_or(AuthError::Unauthorized)?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        Ok(BearerToken(token.to_owned()))
    }
}
