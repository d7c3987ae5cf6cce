use std::{sync::Arc, time::Duration};

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::config::JwtConfig;

/// Access tokens live for exactly one hour.
pub const ACCESS_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Signing and verification keys, derived once from the process secret.
#[derive(Clone)]
pub struct JwtKeys {
    keys: Arc<Keys>,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self::from_secret(cfg.secret.as_bytes())
    }

    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
            ttl: ACCESS_TTL,
        }
    }

    pub fn issue(&self, user_id: i32) -> anyhow::Result<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(&self, user_id: i32, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)?;
        debug!(user_id, "jwt signed");
        Ok(token)
    }

    /// Signature is checked before expiry, so a tampered token is `Invalid`
    /// even when its `exp` is in the past.
    pub fn verify(&self, token: &str) -> Result<i32, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.keys.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<i32>()
            .map_err(|_| TokenError::Invalid("subject is not a user id".into()))?;
        debug!(user_id, "jwt verified");
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::from_secret(b"dev-secret")
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = keys();
        for id in [1, 42, i32::MAX] {
            let token = keys.issue(id).expect("sign");
            assert_eq!(keys.verify(&token).expect("verify"), id);
        }
    }

    #[test]
    fn expiry_is_one_hour_after_issue() {
        let keys = keys();
        let token = keys.issue(7).unwrap();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let claims = decode::<Claims>(&token, &DecodingKey::from_secret(b"dev-secret"), &validation)
            .unwrap()
            .claims;
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys();
        let two_hours_ago = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let token = keys.issue_at(7, two_hours_ago).unwrap();
        assert!(matches!(keys.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let keys = keys();
        let token = keys.issue(7).unwrap();
        let (head, sig) = token.rsplit_once('.').unwrap();
        let mut sig: Vec<char> = sig.chars().collect();
        sig[0] = if sig[0] == 'A' { 'B' } else { 'A' };
        let forged = format!("{head}.{}", sig.into_iter().collect::<String>());
        assert!(matches!(keys.verify(&forged), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn tampered_expired_token_reports_invalid_not_expired() {
        let keys = keys();
        let token = keys
            .issue_at(7, OffsetDateTime::now_utc() - TimeDuration::hours(2))
            .unwrap();
        let other = JwtKeys::from_secret(b"other-secret");
        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn garbage_is_invalid() {
        let keys = keys();
        assert!(matches!(keys.verify(""), Err(TokenError::Invalid(_))));
        assert!(matches!(keys.verify("not.a.jwt"), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn non_numeric_subject_is_invalid() {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: "admin".into(),
            iat: now.unix_timestamp() as usize,
            exp: (now + TimeDuration::hours(1)).unix_timestamp() as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .unwrap();
        assert!(matches!(keys().verify(&token), Err(TokenError::Invalid(_))));
    }
}
