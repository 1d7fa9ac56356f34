// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Star endpoints: basket, listing, detail, and lifecycle transitions.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::Redirect;
use axum::{Json, Router, routing};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use starlab_core::lifecycle::{self, EditStarRequest, FinishStarResponse, FormStarResponse};
use starlab_core::line_items::parse_calc_values;
use starlab_core::model::{
    BasketSummary, CalcEntry, StarDetail, StarFilter, StarRecord, StarStatus, StarView,
};
use starlab_core::CoreError;

use super::AppState;
use super::auth::Authenticated;
use super::error::ApiResult;
use super::extract::{ApiJson, ApiPath, ApiQuery};

/// Accepted form-date formats, e.g. `2025-Mar-01` and `2025-03-01`.
const DATE_FORMATS: &[&str] = &["%Y-%b-%d", "%Y-%m-%d"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", routing::get(list_stars))
        .route("/basket", routing::get(basket))
        .route(
            "/{id}",
            routing::get(get_star).put(edit_star).delete(delete_star),
        )
        .route("/{id}/form", routing::put(form_star))
        .route("/{id}/finish", routing::put(finish_star))
}

#[derive(Debug, Default, Deserialize)]
pub struct StarListQuery {
    pub status: Option<String>,
    pub formed_after: Option<String>,
    pub formed_before: Option<String>,
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, CoreError> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
        .ok_or_else(|| CoreError::Validation {
            field: field.to_string(),
            message: format!("'{}' is not a date like 2025-Mar-01 or 2025-03-01", raw),
        })
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn end_of_day(field: &str, date: NaiveDate) -> Result<DateTime<Utc>, CoreError> {
    date.and_hms_micro_opt(23, 59, 59, 999_999)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CoreError::Validation {
            field: field.to_string(),
            message: "date out of range".to_string(),
        })
}

impl StarListQuery {
    /// Turn the raw query into a listing filter. Bounds are inclusive whole days.
    pub fn into_filter(self) -> Result<StarFilter, CoreError> {
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<StarStatus>().map_err(|message| CoreError::Validation {
                    field: "status".to_string(),
                    message,
                })
            })
            .transpose()?;

        let formed_after = match self.formed_after.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(start_of_day(parse_date("formed_after", raw)?)),
            None => None,
        };
        let formed_before = match self.formed_before.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(end_of_day(
                "formed_before",
                parse_date("formed_before", raw)?,
            )?),
            None => None,
        };

        Ok(StarFilter {
            user_id: None,
            status,
            formed_after,
            formed_before,
        })
    }
}

async fn list_stars(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiQuery(query): ApiQuery<StarListQuery>,
) -> ApiResult<Json<Vec<StarView>>> {
    let filter = query.into_filter()?;
    Ok(Json(
        lifecycle::handle_list_stars(&state.lifecycle, &identity, filter).await?,
    ))
}

async fn basket(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> ApiResult<Json<BasketSummary>> {
    Ok(Json(
        lifecycle::handle_basket(&state.lifecycle, &identity).await?,
    ))
}

async fn get_star(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<StarDetail>> {
    Ok(Json(
        lifecycle::handle_get_star(&state.lifecycle, &identity, id).await?,
    ))
}

async fn edit_star(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<EditStarRequest>,
) -> ApiResult<Json<StarRecord>> {
    Ok(Json(
        lifecycle::handle_edit_star(&state.lifecycle, &identity, id, request).await?,
    ))
}

/// Form body: typed entries, the loose `"<scope_id>": "<mass> <texp> <dist>"`
/// mapping, or both.
#[derive(Debug, Default, Deserialize)]
pub struct FormStarBody {
    #[serde(default)]
    pub calcs: Vec<CalcEntry>,
    #[serde(default)]
    pub calc_values: BTreeMap<String, String>,
}

impl FormStarBody {
    pub fn into_entries(self) -> Vec<CalcEntry> {
        let mut entries = self.calcs;
        entries.extend(parse_calc_values(&self.calc_values));
        entries
    }
}

async fn form_star(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<FormStarBody>,
) -> ApiResult<Json<FormStarResponse>> {
    Ok(Json(
        lifecycle::handle_form_star(&state.lifecycle, &identity, id, body.into_entries()).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct FinishStarBody {
    pub status: String,
}

async fn finish_star(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<FinishStarBody>,
) -> ApiResult<Json<FinishStarResponse>> {
    Ok(Json(
        lifecycle::handle_finish_star(&state.lifecycle, &identity, id, &body.status).await?,
    ))
}

async fn delete_star(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Redirect> {
    lifecycle::handle_delete_star(&state.lifecycle, &identity, id).await?;
    Ok(Redirect::to("/api/scopes"))
}
