use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::config::JwtConfig;

/// JWT payload: the subject email and an absolute expiry in unix seconds.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token expiry is out of range")]
    ExpiryOutOfRange,
    /// Bad signature, malformed, missing claim and expired all land here.
    #[error("invalid token")]
    Invalid,
}

/// Signing and verification keys derived once from [`JwtConfig`].
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }

    #[cfg(test)]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token with the configured TTL.
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        self.issue_for(subject, self.ttl)
    }

    pub fn issue_for(&self, subject: &str, ttl: Duration) -> Result<String, TokenError> {
        self.issue_for_at(subject, ttl, OffsetDateTime::now_utc())
    }

    #[cfg(test)]
    pub fn issue_at(&self, subject: &str, now: OffsetDateTime) -> Result<String, TokenError> {
        self.issue_for_at(subject, self.ttl, now)
    }

    pub fn issue_for_at(
        &self,
        subject: &str,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let exp = now.checked_add(ttl).ok_or(TokenError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: subject.to_owned(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(TokenError::Signing)?;
        debug!(exp = claims.exp, "jwt signed");
        Ok(token)
    }

    /// Returns the `sub` claim of a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<String, TokenError> {
        // Expiry is checked below against `now` with no leeway.
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            TokenError::Invalid
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            debug!(exp = data.claims.exp, "jwt expired");
            return Err(TokenError::Invalid);
        }
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str) -> TokenKeys {
        TokenKeys::new(&JwtConfig {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            ttl_minutes: 60,
        })
    }

    #[test]
    fn issue_and_verify_returns_subject() {
        let keys = make_keys("dev-secret");
        let token = keys.issue("a@x.com").expect("sign");
        assert_eq!(keys.verify(&token).expect("verify"), "a@x.com");
    }

    #[test]
    fn expiry_is_now_plus_ttl() {
        let keys = make_keys("dev-secret");
        let now = OffsetDateTime::now_utc();
        let token = keys.issue_at("a@x.com", now).expect("sign");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<Claims>(&token, &DecodingKey::from_secret(b"dev-secret"), &validation)
            .expect("decode");
        assert_eq!(data.claims.exp, (now + Duration::minutes(60)).unix_timestamp());
    }

    #[test]
    fn token_fails_once_ttl_has_elapsed() {
        let keys = make_keys("dev-secret");
        let issued = OffsetDateTime::now_utc();
        let token = keys.issue_at("a@x.com", issued).expect("sign");

        assert!(keys
            .verify_at(&token, issued + keys.ttl() - Duration::seconds(1))
            .is_ok());
        assert!(matches!(
            keys.verify_at(&token, issued + keys.ttl()),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            keys.verify_at(&token, issued + keys.ttl() + Duration::seconds(1)),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn explicit_ttl_overrides_configured_one() {
        let keys = make_keys("dev-secret");
        let ttl = Duration::seconds(30);
        let issued = OffsetDateTime::now_utc();
        let token = keys.issue_for_at("a@x.com", ttl, issued).expect("sign");

        assert_eq!(
            keys.verify_at(&token, issued + ttl - Duration::seconds(1))
                .expect("still valid"),
            "a@x.com"
        );
        assert!(matches!(
            keys.verify_at(&token, issued + ttl + Duration::seconds(1)),
            Err(TokenError::Invalid)
        ));

        let token = keys.issue_for("a@x.com", Duration::minutes(5)).expect("sign");
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn expiry_overflow_is_an_error_not_a_panic() {
        let keys = make_keys("dev-secret");
        assert!(matches!(
            keys.issue_for("a@x.com", Duration::MAX),
            Err(TokenError::ExpiryOutOfRange)
        ));
    }

    #[test]
    fn rejects_token_signed_with_other_key() {
        let token = make_keys("other-secret").issue("a@x.com").expect("sign");
        assert!(matches!(
            make_keys("dev-secret").verify(&token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn rejects_other_hmac_algorithm() {
        let strong = TokenKeys::new(&JwtConfig {
            secret: "dev-secret".into(),
            algorithm: Algorithm::HS512,
            ttl_minutes: 60,
        });
        let token = strong.issue("a@x.com").expect("sign");
        assert!(make_keys("dev-secret").verify(&token).is_err());
    }

    #[test]
    fn rejects_garbage_and_tampered_tokens() {
        let keys = make_keys("dev-secret");
        assert!(keys.verify("").is_err());
        assert!(keys.verify("not.a.jwt").is_err());

        let token = keys.issue("a@x.com").expect("sign");
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sub: "admin@x.com".into(),
                exp: (OffsetDateTime::now_utc() + Duration::days(1)).unix_timestamp(),
            },
            &EncodingKey::from_secret(b"attacker"),
        )
        .expect("sign forged");
        let forged_payload = forged.split('.').nth(1).expect("payload").to_owned();
        parts[1] = &forged_payload;
        assert!(keys.verify(&parts.join(".")).is_err());
    }

    #[test]
    fn rejects_token_without_subject() {
        #[derive(Serialize)]
        struct ExpOnly {
            exp: i64,
        }
        let exp = (OffsetDateTime::now_utc() + Duration::minutes(5)).unix_timestamp();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &ExpOnly { exp },
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .expect("sign");
        assert!(matches!(
            make_keys("dev-secret").verify(&token),
            Err(TokenError::Invalid)
        ));
    }
}
