//! API-key/JWT dual-auth lifecycle (spec §4.3, §6.1).
//!
//! A `Register` call issues a long-lived opaque `api_key` (one valid per
//! user; re-registering invalidates the old one) plus a short-lived JWT
//! the agent refreshes ~5 minutes before expiry. `RefreshToken` mints a
//! fresh JWT from the api_key alone.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::UserId;

use super::errors::TaskBusError;

/// JWT lifetime (spec §4.3: "expiry ~30 m").
pub const JWT_TTL_SECS: i64 = 30 * 60;
/// Refresh-ahead window (spec §4.3: agent refreshes "~5 minutes before expiry").
pub const JWT_REFRESH_SKEW_SECS: i64 = 5 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Per-user currently-valid api_key plus the JWT signing secret.
pub struct AuthRegistry {
    keys: DashMap<UserId, String>,
    /// Opaque legacy bearer token provisioned per user (spec §6.1:
    /// `Register` alone uses this). Resolved in DESIGN.md to have no
    /// expiry.
    legacy_tokens: DashMap<UserId, String>,
    jwt_secret: Vec<u8>,
}

impl AuthRegistry {
    #[must_use]
    pub fn new(jwt_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            keys: DashMap::new(),
            legacy_tokens: DashMap::new(),
            jwt_secret: jwt_secret.into(),
        }
    }

    pub fn provision_legacy_token(&self, user_id: UserId, token: impl Into<String>) {
        self.legacy_tokens.insert(user_id, token.into());
    }

    fn check_legacy_token(&self, user_id: UserId, presented: &str) -> bool {
        self.legacy_tokens
            .get(&user_id)
            .is_some_and(|t| t.as_str() == presented)
    }

    /// `Register`: atomically invalidates any prior api_key for this user
    /// and issues a new one plus a fresh JWT (spec §4.3, §6.1).
    pub fn register(
        &self,
        user_id: UserId,
        legacy_token: &str,
    ) -> Result<(String, String, i64), TaskBusError> {
        if !self.check_legacy_token(user_id, legacy_token) {
            return Err(TaskBusError::SessionInvalidated);
        }
        let api_key = Uuid::new_v4().to_string();
        self.keys.insert(user_id, api_key.clone());
        let jwt = self.mint_jwt(user_id)?;
        Ok((api_key, jwt, JWT_TTL_SECS))
    }

    fn mint_jwt(&self, user_id: UserId) -> Result<String, TaskBusError> {
        let exp = (Utc::now() + Duration::seconds(JWT_TTL_SECS)).timestamp() as usize;
        let claims = Claims {
            sub: user_id.0.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.jwt_secret))
            .map_err(|e| TaskBusError::Store(anyhow::anyhow!("jwt encode failed: {e}")))
    }

    /// `RefreshToken`: api_key must still be the live one for its user.
    pub fn refresh(&self, user_id: UserId, api_key: &str) -> Result<(String, i64), TaskBusError> {
        self.verify_api_key(user_id, api_key)?;
        Ok((self.mint_jwt(user_id)?, JWT_TTL_SECS))
    }

    /// Checked on every post-register request via `X-Agent-API-Key`
    /// (spec §6.1). A mismatch means a later `Register` superseded this
    /// key.
    pub fn verify_api_key(&self, user_id: UserId, presented: &str) -> Result<(), TaskBusError> {
        match self.keys.get(&user_id) {
            Some(current) if current.as_str() == presented => Ok(()),
            Some(_) => Err(TaskBusError::SessionInvalidated),
            None => Err(TaskBusError::NotFound),
        }
    }

    pub fn verify_jwt(&self, token: &str) -> Result<UserId, TaskBusError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.jwt_secret),
            &Validation::default(),
        )
        .map_err(|_| TaskBusError::TokenExpired)?;
        Uuid::parse_str(&data.claims.sub)
            .map(UserId)
            .map_err(|_| TaskBusError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reregistering_invalidates_prior_key() {
        let auth = AuthRegistry::new(b"test-secret".to_vec());
        let user = UserId(Uuid::new_v4());
        auth.provision_legacy_token(user, "legacy-token");

        let (k1, _, _) = auth.register(user, "legacy-token").unwrap();
        assert!(auth.verify_api_key(user, &k1).is_ok());

        let (k2, _, _) = auth.register(user, "legacy-token").unwrap();
        assert_ne!(k1, k2);
        assert!(matches!(
            auth.verify_api_key(user, &k1),
            Err(TaskBusError::SessionInvalidated)
        ));
        assert!(auth.verify_api_key(user, &k2).is_ok());
    }

    #[test]
    fn register_rejects_bad_legacy_token() {
        let auth = AuthRegistry::new(b"test-secret".to_vec());
        let user = UserId(Uuid::new_v4());
        auth.provision_legacy_token(user, "legacy-token");
        assert!(auth.register(user, "wrong").is_err());
    }
}
