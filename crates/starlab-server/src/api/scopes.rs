// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scope catalog endpoints.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::{Json, Router, routing};
use serde::{Deserialize, Serialize};
use starlab_core::model::{BasketSummary, NewScope, ScopePatch, ScopeRecord};
use starlab_core::{CoreError, catalog, lifecycle};

use super::AppState;
use super::auth::{Authenticated, MaybeAuthenticated};
use super::error::ApiResult;
use super::extract::{ApiJson, ApiPath, ApiQuery};

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";
const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", routing::get(list_scopes).post(create_scope))
        .route(
            "/{id}",
            routing::get(get_scope).put(edit_scope).delete(delete_scope),
        )
        .route("/{id}/image", routing::post(upload_image))
        .route("/{id}/basket", routing::post(add_to_basket))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScopeListResponse {
    pub scopes: Vec<ScopeRecord>,
    /// Caller's draft star, 0 when anonymous or none.
    pub star_id: i64,
    /// Line items in the caller's draft star.
    pub count: i64,
}

async fn list_scopes(
    State(state): State<AppState>,
    MaybeAuthenticated(identity): MaybeAuthenticated,
    ApiQuery(query): ApiQuery<ScopeQuery>,
) -> ApiResult<Json<ScopeListResponse>> {
    let scopes = catalog::handle_list_scopes(&state.catalog, query.search.as_deref()).await?;

    let basket = match identity {
        Some(identity) => lifecycle::handle_basket(&state.lifecycle, &identity).await?,
        None => BasketSummary::default(),
    };

    Ok(Json(ScopeListResponse {
        scopes,
        star_id: basket.star_id,
        count: basket.count,
    }))
}

async fn get_scope(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ScopeRecord>> {
    Ok(Json(catalog::handle_get_scope(&state.catalog, id).await?))
}

async fn create_scope(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiJson(scope): ApiJson<NewScope>,
) -> ApiResult<(StatusCode, Json<ScopeRecord>)> {
    let created = catalog::handle_create_scope(&state.catalog, &identity, scope).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn edit_scope(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<ScopePatch>,
) -> ApiResult<Json<ScopeRecord>> {
    Ok(Json(
        catalog::handle_edit_scope(&state.catalog, &identity, id, patch).await?,
    ))
}

async fn delete_scope(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    catalog::handle_delete_scope(&state.catalog, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn multipart_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::Validation {
        field: IMAGE_FIELD.to_string(),
        message: err.to_string(),
    }
}

async fn upload_image(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ScopeRecord>> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_IMAGE_TYPE)
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let scope = catalog::handle_upload_image(
            &state.catalog,
            &identity,
            id,
            bytes.to_vec(),
            &content_type,
        )
        .await?;
        return Ok(Json(scope));
    }

    Err(multipart_error("multipart field 'image' is required").into())
}

async fn add_to_basket(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Redirect> {
    lifecycle::handle_add_to_star(&state.lifecycle, &identity, id).await?;
    Ok(Redirect::to("/api/scopes"))
}
