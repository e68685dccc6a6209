//! Authentication handling
//!
//! Bearer tokens have the form `<user_id>.<secret>`. The secret is a random
//! uuid stored per user; verification compares it in constant time against
//! every live secret of that user.

use agentlab_core::config::{AuthConfig, AuthMode};
use agentlab_core::{Error, Result, User, UserId};
use agentlab_store::Store;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Identity every request acts as when auth is disabled. Store ids start at 1.
pub const LOCAL_USER: UserId = UserId(0);

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() { return false; }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Split a token into its user id and secret.
pub fn parse_token(token: &str) -> Option<(UserId, &str)> {
    let (user, secret) = token.split_once('.')?;
    let user = user.parse::<u64>().ok()?;
    if secret.is_empty() {
        return None;
    }
    Some((UserId(user), secret))
}

/// The token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub struct Authenticator {
    mode: AuthMode,
    store: Arc<dyn Store>,
    started_at: DateTime<Utc>,
}

impl Authenticator {
    pub fn new(config: &AuthConfig, store: Arc<dyn Store>) -> Self {
        Self { mode: config.mode.clone(), store, started_at: Utc::now() }
    }

    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Issue a new token for `user`.
    pub async fn issue(&self, user: UserId) -> Result<String> {
        let secret = uuid::Uuid::new_v4().simple().to_string();
        self.store.insert_token(user, secret.clone()).await?;
        Ok(format!("{}.{}", user, secret))
    }

    /// Resolve the caller's identity.
    pub async fn verify(&self, provided: Option<&str>) -> Result<UserId> {
        match self.mode {
            AuthMode::None => Ok(LOCAL_USER),
            AuthMode::Token => {
                let provided = provided.ok_or_else(|| Error::unauthorized("token required"))?;
                let (user, secret) =
                    parse_token(provided).ok_or_else(|| Error::unauthorized("malformed token"))?;
                let secrets = self.store.token_secrets(user).await?;
                let matched = secrets
                    .iter()
                    .fold(false, |hit, s| hit | constant_time_eq(s.as_bytes(), secret.as_bytes()));
                if !matched {
                    return Err(Error::unauthorized("invalid token"));
                }
                Ok(user)
            }
        }
    }

    /// Revoke a presented token. False when it was not live.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        match parse_token(token) {
            Some((user, secret)) => self.store.revoke_token(user, secret).await,
            None => Ok(false),
        }
    }

    /// The user record behind an identity.
    pub async fn user(&self, id: UserId) -> Result<User> {
        if id == LOCAL_USER && self.mode == AuthMode::None {
            return Ok(User {
                id,
                username: "local".to_string(),
                email: "local@localhost".to_string(),
                created_at: self.started_at,
            });
        }
        self.store.get_user(id).await?.ok_or(Error::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlab_core::NewUser;
    use agentlab_store::MemoryStore;

    async fn setup(mode: AuthMode) -> (Authenticator, UserId) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(NewUser { username: "alice".into(), email: "a@example.com".into() }, Utc::now())
            .await
            .unwrap();
        (Authenticator::new(&AuthConfig { mode }, store), user.id)
    }

    #[tokio::test]
    async fn test_token_auth() {
        let (auth, user) = setup(AuthMode::Token).await;
        let token = auth.issue(user).await.unwrap();
        assert_eq!(auth.verify(Some(&token)).await.unwrap(), user);
        assert!(auth.verify(Some("1.wrong-secret")).await.is_err());
        assert!(auth.verify(Some("garbage")).await.is_err());
        assert!(auth.verify(None).await.is_err());

        assert!(auth.revoke(&token).await.unwrap());
        assert!(auth.verify(Some(&token)).await.is_err());
        assert!(!auth.revoke(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_auth() {
        let (auth, _) = setup(AuthMode::None).await;
        assert_eq!(auth.verify(None).await.unwrap(), LOCAL_USER);
        assert_eq!(auth.verify(Some("anything")).await.unwrap(), LOCAL_USER);
        assert_eq!(auth.user(LOCAL_USER).await.unwrap().username, "local");
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("7.abc"), Some((UserId(7), "abc")));
        assert_eq!(parse_token("7."), None);
        assert_eq!(parse_token("x.abc"), None);
        assert_eq!(parse_token("nodot"), None);
    }

    #[test]
    fn test_bearer_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Bearer 1.abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("1.abc"));
        headers.insert("authorization", "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
