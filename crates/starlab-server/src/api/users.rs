// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Account endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing};
use starlab_core::accounts::{
    self, LoginRequest, LoginResponse, Profile, RegisterRequest, UpdateProfileRequest,
};

use super::AppState;
use super::auth::{Authenticated, BearerToken};
use super::error::ApiResult;
use super::extract::ApiJson;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", routing::post(register))
        .route("/login", routing::post(login))
        .route("/logout", routing::post(logout))
        .route("/profile", routing::get(profile).put(update_profile))
}

async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Profile>)> {
    let profile = accounts::handle_register(&state.accounts, request).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    Ok(Json(accounts::handle_login(&state.accounts, request).await?))
}

async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> ApiResult<StatusCode> {
    accounts::handle_logout(&state.accounts, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn profile(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> ApiResult<Json<Profile>> {
    Ok(Json(accounts::handle_profile(&state.accounts, &identity).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    Ok(Json(
        accounts::handle_update_profile(&state.accounts, &identity, request).await?,
    ))
}
