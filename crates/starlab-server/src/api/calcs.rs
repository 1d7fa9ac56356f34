// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Line-item endpoints addressed by `(star_id, scope_id)`.

use axum::extract::State;
use axum::{Json, Router, routing};
use starlab_core::lifecycle::{self, DeleteCalcResponse};
use starlab_core::model::{CalcInputs, CalcRecord};

use super::AppState;
use super::auth::Authenticated;
use super::error::ApiResult;
use super::extract::{ApiJson, ApiPath};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{star_id}/{scope_id}",
        routing::put(edit_calc).delete(delete_calc),
    )
}

async fn edit_calc(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath((star_id, scope_id)): ApiPath<(i64, i64)>,
    ApiJson(inputs): ApiJson<CalcInputs>,
) -> ApiResult<Json<CalcRecord>> {
    Ok(Json(
        lifecycle::handle_edit_calc(&state.lifecycle, &identity, star_id, scope_id, inputs)
            .await?,
    ))
}

async fn delete_calc(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath((star_id, scope_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Json<DeleteCalcResponse>> {
    Ok(Json(
        lifecycle::handle_delete_calc(&state.lifecycle, &identity, star_id, scope_id).await?,
    ))
}
