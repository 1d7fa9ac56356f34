// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Result callbacks from the compute service.

use axum::extract::State;
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use starlab_core::dispatch::{self, CalculationResult};

use super::AppState;
use super::auth::CallbackCaller;
use super::error::ApiResult;
use super::extract::ApiJson;

pub fn router() -> Router<AppState> {
    Router::new().route("/result", routing::post(ingest_result))
}

async fn ingest_result(
    State(state): State<AppState>,
    CallbackCaller(token): CallbackCaller,
    ApiJson(result): ApiJson<CalculationResult>,
) -> ApiResult<Json<Value>> {
    dispatch::ingest_result(
        state.lifecycle.persistence.as_ref(),
        &state.callback_token,
        Some(&token),
        &result,
    )
    .await?;

    Ok(Json(json!({ "status": "ok" })))
}
