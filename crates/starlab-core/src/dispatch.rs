// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Async dispatch gateway.
//!
//! On completion every line item of a star is sent to an external compute
//! service as a [`CalculationJob`]. The service later posts a
//! [`CalculationResult`] back, which [`ingest_result`] stores after checking
//! the shared secret.
//!
//! Dispatch is best effort: each item is sent independently, failures are
//! logged and counted, and nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::calculation::CalcOutputs;
use crate::error::{CoreError, Result};
use crate::model::{CalcRecord, ScopeRecord};
use crate::persistence::Persistence;

/// Default per-call timeout for the compute service.
pub const DEFAULT_COMPUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure sending a single job. Only ever logged.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request could not be built or delivered.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with something other than 200.
    #[error("compute service returned status {0}")]
    Status(u16),
}

/// Job descriptor posted to `{base}/calculate/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationJob {
    pub calc_id: String,
    pub star_id: String,
    pub scope_id: String,
    pub inp_dist: f64,
    pub inp_texp: f64,
    pub inp_mass: f64,
    pub scope_lambda: f64,
    pub scope_delta_lamb: f64,
    pub scope_zero_point: f64,
}

impl CalculationJob {
    pub fn new(scope: &ScopeRecord, calc: &CalcRecord) -> Self {
        Self {
            calc_id: format!("{}_{}", calc.star_id, calc.scope_id),
            star_id: calc.star_id.to_string(),
            scope_id: calc.scope_id.to_string(),
            inp_dist: calc.inp_dist,
            inp_texp: calc.inp_texp,
            inp_mass: calc.inp_mass,
            scope_lambda: scope.lambda,
            scope_delta_lamb: scope.delta_lamb,
            scope_zero_point: scope.zero_point,
        }
    }
}

/// Result posted back by the compute service.
///
/// Ids are accepted both as JSON numbers and as numeric strings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CalculationResult {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub star_id: i64,
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub scope_id: i64,
    pub res_en: f64,
    pub res_ni: f64,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id '{}'", text))),
    }
}

/// Outbound side of the compute service.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn send(&self, job: &CalculationJob) -> std::result::Result<(), DispatchError>;
}

/// [`ComputeClient`] posting JSON over HTTP.
pub struct HttpComputeClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpComputeClient {
    /// Create a client for the service at `base_url`, with a per-call timeout.
    pub fn new(base_url: &str, timeout: Duration) -> std::result::Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/calculate/", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn send(&self, job: &CalculationJob) -> std::result::Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(job)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DispatchError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Outcome of a dispatch batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Send every line item of a star to the compute service.
///
/// Items are independent: a failed send is logged and the loop moves on.
/// Only loading the line items can fail the call.
#[instrument(skip(persistence, client))]
pub async fn dispatch_star(
    persistence: &dyn Persistence,
    client: &dyn ComputeClient,
    star_id: i64,
) -> Result<DispatchReport> {
    let lines = persistence.list_star_lines(star_id).await?;
    let mut report = DispatchReport::default();

    for line in &lines {
        let job = CalculationJob::new(&line.scope, &line.calc);
        report.attempted += 1;

        match client.send(&job).await {
            Ok(()) => {
                report.sent += 1;
                debug!(calc_id = %job.calc_id, "Calculation dispatched");
            }
            Err(e) => {
                report.failed += 1;
                warn!(calc_id = %job.calc_id, error = %e, "Failed to dispatch calculation");
            }
        }
    }

    info!(
        attempted = report.attempted,
        sent = report.sent,
        failed = report.failed,
        "Dispatch batch finished"
    );
    Ok(report)
}

/// Exact match of the shared callback secret. An empty expected secret
/// accepts nobody.
pub fn check_callback_token(expected: &str, presented: Option<&str>) -> Result<()> {
    match presented {
        Some(token) if !expected.is_empty() && token == expected => Ok(()),
        _ => {
            warn!("Rejected calculation callback with invalid token");
            Err(CoreError::Unauthorized(
                "invalid callback token".to_string(),
            ))
        }
    }
}

/// Store a result posted by the compute service.
///
/// `presented` is the secret taken from the caller's `Authorization: Token`
/// header. A mismatch fails with `Unauthorized` before anything is touched.
#[instrument(
    skip(persistence, expected, presented),
    fields(star_id = result.star_id, scope_id = result.scope_id)
)]
pub async fn ingest_result(
    persistence: &dyn Persistence,
    expected: &str,
    presented: Option<&str>,
    result: &CalculationResult,
) -> Result<()> {
    // 1. Authenticate the caller
    check_callback_token(expected, presented)?;

    // 2. Store the outputs on the existing line item
    let outputs = CalcOutputs {
        res_en: result.res_en,
        res_ni: result.res_ni,
    };
    let updated = persistence
        .update_calc_results(result.star_id, result.scope_id, &outputs)
        .await?;
    if !updated {
        return Err(CoreError::database("update calc result", "calc not found"));
    }

    info!("Calculation result stored");
    Ok(())
}
