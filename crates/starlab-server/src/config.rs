// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// How completed stars get their outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationModeConfig {
    /// Compute in-process.
    Sync,
    /// Dispatch to the external compute service.
    Async,
}

/// Starlab server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Secret used to sign bearer tokens
    pub jwt_secret: String,
    /// Bearer token lifetime
    pub jwt_ttl: Duration,
    /// Redis URL for the token blacklist
    pub redis_url: String,
    /// S3-compatible endpoint for scope images
    pub s3_endpoint: String,
    /// Bucket holding scope images
    pub s3_bucket: String,
    /// Public base URL under which images are served
    pub s3_public_url: String,
    /// Calculation mode for completed stars
    pub calculation_mode: CalculationModeConfig,
    /// Base URL of the compute service
    pub compute_url: String,
    /// Per-call timeout for the compute service
    pub compute_timeout: Duration,
    /// Shared secret expected on compute callbacks
    pub callback_token: String,
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `STARLAB_DATABASE_URL`: PostgreSQL connection string
    /// - `STARLAB_JWT_SECRET`: token signing secret
    /// - `STARLAB_CALLBACK_TOKEN`: compute callback secret (async mode only)
    ///
    /// Optional (with defaults):
    /// - `STARLAB_HTTP_HOST` (0.0.0.0), `STARLAB_HTTP_PORT` (8080)
    /// - `STARLAB_JWT_TTL_SECS` (43200)
    /// - `STARLAB_REDIS_URL` (redis://127.0.0.1:6379)
    /// - `STARLAB_S3_ENDPOINT` (http://127.0.0.1:9000), `STARLAB_S3_BUCKET` (scopes),
    ///   `STARLAB_S3_PUBLIC_URL` (endpoint/bucket)
    /// - `STARLAB_CALCULATION_MODE` (async)
    /// - `STARLAB_COMPUTE_URL` (http://127.0.0.1:8000), `STARLAB_COMPUTE_TIMEOUT_SECS` (30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("STARLAB_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("STARLAB_DATABASE_URL"))?;

        let host: IpAddr = var_or("STARLAB_HTTP_HOST", "0.0.0.0")
            .parse()
            .map_err(|_| ConfigError::Invalid("STARLAB_HTTP_HOST", "must be an IP address"))?;

        let port: u16 = var_or("STARLAB_HTTP_PORT", "8080")
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("STARLAB_HTTP_PORT", "must be a valid port number")
            })?;

        let jwt_secret = std::env::var("STARLAB_JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("STARLAB_JWT_SECRET"))?;

        let jwt_ttl_secs: u64 = var_or("STARLAB_JWT_TTL_SECS", "43200")
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::Invalid(
                "STARLAB_JWT_TTL_SECS",
                "must be a positive integer",
            ))?;

        let s3_endpoint = var_or("STARLAB_S3_ENDPOINT", "http://127.0.0.1:9000");
        let s3_bucket = var_or("STARLAB_S3_BUCKET", "scopes");
        let s3_public_url = std::env::var("STARLAB_S3_PUBLIC_URL").unwrap_or_else(|_| {
            format!("{}/{}", s3_endpoint.trim_end_matches('/'), s3_bucket)
        });

        let calculation_mode = match var_or("STARLAB_CALCULATION_MODE", "async")
            .to_lowercase()
            .as_str()
        {
            "async" => CalculationModeConfig::Async,
            "sync" => CalculationModeConfig::Sync,
            _ => {
                return Err(ConfigError::Invalid(
                    "STARLAB_CALCULATION_MODE",
                    "must be 'async' or 'sync'",
                ));
            }
        };

        let compute_timeout_secs: u64 = var_or("STARLAB_COMPUTE_TIMEOUT_SECS", "30")
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::Invalid(
                "STARLAB_COMPUTE_TIMEOUT_SECS",
                "must be a positive integer",
            ))?;

        let callback_token = var_or("STARLAB_CALLBACK_TOKEN", "");
        if calculation_mode == CalculationModeConfig::Async && callback_token.is_empty() {
            return Err(ConfigError::Missing("STARLAB_CALLBACK_TOKEN"));
        }

        Ok(Self {
            database_url,
            http_addr: SocketAddr::new(host, port),
            jwt_secret,
            jwt_ttl: Duration::from_secs(jwt_ttl_secs),
            redis_url: var_or("STARLAB_REDIS_URL", "redis://127.0.0.1:6379"),
            s3_endpoint,
            s3_bucket,
            s3_public_url,
            calculation_mode,
            compute_url: var_or("STARLAB_COMPUTE_URL", "http://127.0.0.1:8000"),
            compute_timeout: Duration::from_secs(compute_timeout_secs),
            callback_token,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
