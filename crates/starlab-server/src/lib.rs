// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Starlab Server - HTTP surface for the star observation request engine.
//!
//! Wires the engine in `starlab-core` to its concrete collaborators
//! (PostgreSQL, Redis token blacklist, S3-compatible image storage, external
//! compute service) and exposes it over an axum router.

pub mod api;
pub mod config;
pub mod redis_blacklist;
pub mod s3_store;

pub use api::{AppState, router};
pub use config::{CalculationModeConfig, Config, ConfigError};
