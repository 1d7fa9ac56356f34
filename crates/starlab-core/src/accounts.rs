// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Account handlers: registration, login, logout and profile.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::authz;
use crate::error::{CoreError, Result};
use crate::identity::{Identity, TokenAuthority};
use crate::model::{Role, UserRecord};
use crate::persistence::Persistence;

/// Display login for guest sessions.
pub const GUEST_LOGIN: &str = "guest";

/// Shared state for account handlers.
pub struct AccountHandlerState {
    pub persistence: Arc<dyn Persistence>,
    pub tokens: Arc<TokenAuthority>,
}

impl AccountHandlerState {
    pub fn new(persistence: Arc<dyn Persistence>, tokens: Arc<TokenAuthority>) -> Self {
        Self {
            persistence,
            tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    /// Ask for an anonymous guest token instead.
    #[serde(default)]
    pub guest: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub login: String,
    pub role: Role,
    pub expires_in: u64,
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub login: Option<String>,
    pub password: Option<String>,
}

/// Account as shown to its owner. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: i64,
    pub login: String,
    pub role: Role,
}

impl From<UserRecord> for Profile {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            login: user.login,
            role: user.role,
        }
    }
}

/// Hex-encoded SHA-256 of a password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Create a regular user account.
#[instrument(skip(state, request), fields(login = %request.login))]
pub async fn handle_register(
    state: &AccountHandlerState,
    request: RegisterRequest,
) -> Result<Profile> {
    // 1. Validate credentials are present
    let login = request.login.trim();
    if login.is_empty() {
        return Err(CoreError::validation("login", "is required"));
    }
    if request.password.is_empty() {
        return Err(CoreError::validation("password", "is required"));
    }

    // 2. Create, duplicate logins conflict
    let user = state
        .persistence
        .create_user(login, &hash_password(&request.password), Role::User)
        .await?;

    info!(user_id = user.id, "User registered");
    Ok(user.into())
}

/// Exchange credentials, or a guest request, for a bearer token.
#[instrument(skip(state, request), fields(login = %request.login, guest = request.guest))]
pub async fn handle_login(
    state: &AccountHandlerState,
    request: LoginRequest,
) -> Result<LoginResponse> {
    let (login, identity) = if request.guest {
        (GUEST_LOGIN.to_string(), Identity::guest())
    } else {
        let user = state
            .persistence
            .get_user_by_login(request.login.trim())
            .await?
            .filter(|u| u.password_hash == hash_password(&request.password));

        let Some(user) = user else {
            warn!("Rejected login");
            return Err(CoreError::Unauthorized(
                "invalid login or password".to_string(),
            ));
        };
        (
            user.login,
            Identity {
                user_id: user.id,
                role: user.role,
            },
        )
    };

    let token = state.tokens.issue(identity.user_id, identity.role)?;
    info!(user_id = identity.user_id, "Token issued");

    Ok(LoginResponse {
        login,
        role: identity.role,
        expires_in: token.expires_in,
        access_token: token.access_token,
        token_type: token.token_type,
    })
}

/// Revoke a token until it would have expired anyway.
#[instrument(skip(state, token))]
pub async fn handle_logout(state: &AccountHandlerState, token: &str) -> Result<()> {
    let identity = state.tokens.verify(token).await?;
    state.tokens.revoke(token).await?;
    info!(user_id = identity.user_id, "Token revoked");
    Ok(())
}

async fn load_user(persistence: &dyn Persistence, user_id: i64) -> Result<UserRecord> {
    persistence
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoreError::not_found("user", user_id))
}

pub async fn handle_profile(state: &AccountHandlerState, identity: &Identity) -> Result<Profile> {
    authz::require_member(identity)?;
    Ok(load_user(state.persistence.as_ref(), identity.user_id)
        .await?
        .into())
}

/// Change the caller's login and/or password.
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn handle_update_profile(
    state: &AccountHandlerState,
    identity: &Identity,
    request: UpdateProfileRequest,
) -> Result<Profile> {
    authz::require_member(identity)?;

    let login = request
        .login
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());
    let password_hash = request
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(hash_password);

    if login.is_none() && password_hash.is_none() {
        return Err(CoreError::validation(
            "login",
            "either login or password must be provided",
        ));
    }

    let user = state
        .persistence
        .update_user(identity.user_id, login, password_hash.as_deref())
        .await?;

    info!("Profile updated");
    Ok(user.into())
}
