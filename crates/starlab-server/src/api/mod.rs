// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP routing.

pub mod auth;
pub mod calcs;
pub mod callback;
pub mod error;
pub mod extract;
pub mod scopes;
pub mod stars;
pub mod users;

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Json, Router, routing};
use serde::Serialize;
use starlab_core::TokenAuthority;
use starlab_core::accounts::AccountHandlerState;
use starlab_core::catalog::CatalogHandlerState;
use starlab_core::lifecycle::LifecycleHandlerState;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleHandlerState>,
    pub catalog: Arc<CatalogHandlerState>,
    pub accounts: Arc<AccountHandlerState>,
    pub tokens: Arc<TokenAuthority>,
    /// Secret the compute service must present on callbacks.
    pub callback_token: Arc<str>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .route("/health", routing::get(health))
        .nest("/api/scopes", scopes::router())
        .nest("/api/stars", stars::router())
        .nest("/api/calcs", calcs::router())
        .nest("/api/calculations", callback::router())
        .nest("/api/users", users::router())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &Request| {
                            let method = req.method();
                            let uri = req.uri();

                            // axum automatically adds this extension.
                            let matched_path = req
                                .extensions()
                                .get::<MatchedPath>()
                                .map(|matched_path| matched_path.as_str());

                            tracing::info_span!("request", %method, %uri, matched_path)
                        })
                        .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
                        .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
                )
                .layer(middleware::from_fn(preflight_no_content))
                .layer(cors),
        )
        .with_state(state)
}

/// Answer CORS preflight requests with 204 instead of an empty 200.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let preflight = request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = next.run(request).await;
    if preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub version: &'static str,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.lifecycle.persistence.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            false
        }
    };

    let (code, status) = if database {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
