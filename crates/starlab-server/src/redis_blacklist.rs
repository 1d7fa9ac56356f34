// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis-backed token blacklist.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use starlab_core::identity::TokenBlacklist;
use starlab_core::{CoreError, Result};
use tracing::info;

/// Prefix of every blacklist key.
pub const KEY_PREFIX: &str = "starlab.blacklist.";

fn blacklist_key(token: &str) -> String {
    format!("{}{}", KEY_PREFIX, token)
}

fn redis_error(err: redis::RedisError) -> CoreError {
    CoreError::Dependency {
        service: "redis",
        details: err.to_string(),
    }
}

/// Revoked tokens stored as keys that expire with the token.
#[derive(Clone)]
pub struct RedisBlacklist {
    conn: ConnectionManager,
}

impl RedisBlacklist {
    /// Connect to Redis. The connection manager reconnects on its own afterwards.
    pub async fn connect(url: &str) -> std::result::Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl TokenBlacklist for RedisBlacklist {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(blacklist_key(token), 1, ttl.as_secs().max(1))
            .await
            .map_err(redis_error)
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(blacklist_key(token)).await.map_err(redis_error)
    }
}
