// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity and role resolution from bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the user id and role. Revoked tokens are
//! recorded in a [`TokenBlacklist`] until their natural expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::model::Role;

/// Issuer claim stamped on every token.
pub const TOKEN_ISSUER: &str = "starlab";

/// Verified caller identity, extracted once at the transport boundary and
/// passed explicitly into every engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    /// Identity for an anonymous guest session.
    pub fn guest() -> Self {
        Self {
            user_id: 0,
            role: Role::Guest,
        }
    }
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub user_id: i64,
    pub role: Role,
}

/// A freshly signed token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Key-value store used to blacklist revoked tokens.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Mark a token as revoked for `ttl`.
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<()>;

    /// Whether the token is currently revoked.
    async fn is_revoked(&self, token: &str) -> Result<bool>;
}

/// Process-local blacklist for tests and single-node runs.
#[derive(Default)]
pub struct MemoryBlacklist {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenBlacklist for MemoryBlacklist {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(token.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get(token) {
            Some(expires) if *expires > Instant::now() => Ok(true),
            Some(_) => {
                entries.remove(token);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

/// Issues and verifies bearer tokens.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    blacklist: Arc<dyn TokenBlacklist>,
}

impl TokenAuthority {
    /// Create an authority signing with `secret` and issuing tokens valid for `ttl`.
    pub fn new(secret: &[u8], ttl: Duration, blacklist: Arc<dyn TokenBlacklist>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
            blacklist,
        }
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for the given user and role.
    pub fn issue(&self, user_id: i64, role: Role) -> Result<IssuedToken> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            exp: now + self.ttl.as_secs() as i64,
            iat: now,
            iss: TOKEN_ISSUER.to_string(),
            user_id,
            role,
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoreError::Dependency {
                service: "token signer",
                details: e.to_string(),
            })?;

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer",
            expires_in: self.ttl.as_secs(),
        })
    }

    /// Decode and check signature and expiry, without consulting the blacklist.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| CoreError::Unauthorized(format!("invalid token: {}", e)))
    }

    /// Resolve a token into an identity.
    ///
    /// Fails with `Unauthorized` when the signature is invalid, the token has
    /// expired, or it has been revoked.
    pub async fn verify(&self, token: &str) -> Result<Identity> {
        let claims = self.decode(token)?;

        if self.blacklist.is_revoked(token).await? {
            debug!(user_id = claims.user_id, "Rejected revoked token");
            return Err(CoreError::Unauthorized("token has been revoked".to_string()));
        }

        Ok(Identity {
            user_id: claims.user_id,
            role: claims.role,
        })
    }

    /// Revoke a token until its natural expiry.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let claims = self.decode(token)?;
        let remaining = (claims.exp - Utc::now().timestamp()).max(1) as u64;
        self.blacklist
            .revoke(token, Duration::from_secs(remaining))
            .await
    }
}
