// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity extraction at the transport boundary.
//!
//! Handlers never read headers themselves: they take one of these extractors
//! and pass the resulting [`Identity`] into the engine explicitly.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use starlab_core::dispatch::check_callback_token;
use starlab_core::{CoreError, Identity};
use tracing::debug;

use super::AppState;
use super::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";
const CALLBACK_PREFIX: &str = "Token ";

fn authorization<'a>(headers: &'a HeaderMap, prefix: &str) -> Option<&'a str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(prefix)
        .map(str::trim)
}

/// Raw bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    authorization(headers, BEARER_PREFIX).filter(|t| !t.is_empty())
}

/// Shared secret presented by the compute service as `Authorization: Token <secret>`.
pub fn callback_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(CALLBACK_PREFIX)
}

/// A verified caller. Rejects with 401 when the token is missing or invalid.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| CoreError::Unauthorized("missing bearer token".to_string()))?;
        let identity = state.tokens.verify(token).await?;
        Ok(Self(identity))
    }
}

/// A caller that may be anonymous. Invalid tokens are treated as absent.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthenticated(pub Option<Identity>);

impl FromRequestParts<AppState> for MaybeAuthenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Self(None));
        };

        match state.tokens.verify(token).await {
            Ok(identity) => Ok(Self(Some(identity))),
            Err(CoreError::Unauthorized(reason)) => {
                debug!(%reason, "Ignoring unusable token on anonymous endpoint");
                Ok(Self(None))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The raw bearer token, for endpoints that act on the token itself.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl FromRequestParts<AppState> for BearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers)
            .map(|t| Self(t.to_string()))
            .ok_or_else(|| CoreError::Unauthorized("missing bearer token".to_string()).into())
    }
}

/// The compute service, identified by the shared callback secret.
///
/// Runs before any body extractor, so a caller without the secret learns
/// nothing about payload validation.
#[derive(Debug, Clone)]
pub struct CallbackCaller(pub String);

impl FromRequestParts<AppState> for CallbackCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = callback_token(&parts.headers);
        check_callback_token(&state.callback_token, presented)?;
        Ok(Self(presented.unwrap_or_default().to_string()))
    }
}
