// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for starlab-core.
//!
//! This module defines the persistence abstraction consumed by the engine and
//! two implementations: PostgreSQL for deployments and an in-memory store for
//! tests and local runs.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryPersistence;
pub use self::postgres::PostgresPersistence;

use async_trait::async_trait;

use crate::calculation::CalcOutputs;
use crate::error::CoreError;
use crate::model::{
    CalcInputs, CalcRecord, NewScope, Role, ScopeLine, ScopeRecord, StarFilter, StarRecord,
    StarStatus, UserRecord,
};

/// Name given to a lazily created draft star.
pub const NEW_STAR_NAME: &str = "New Star";

/// Constellation given to a lazily created draft star.
pub const NEW_STAR_CONSTELLATION: &str = "Unknown";

/// Persistence interface used by the engine.
///
/// Every status change goes through [`Persistence::transition_star`], a
/// compare-and-set on the star's current status, so two concurrent actors
/// cannot both pass the same lifecycle guard.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// List catalog entries ordered by id, optionally filtered by a
    /// case-insensitive substring of the name.
    async fn list_scopes(&self, search: Option<&str>) -> Result<Vec<ScopeRecord>, CoreError>;

    async fn get_scope(&self, scope_id: i64) -> Result<Option<ScopeRecord>, CoreError>;

    async fn create_scope(&self, scope: &NewScope) -> Result<ScopeRecord, CoreError>;

    /// Overwrite all mutable columns of an existing scope.
    async fn update_scope(&self, scope: &ScopeRecord) -> Result<(), CoreError>;

    /// Delete a scope. Fails with `Conflict` while line items still reference it.
    async fn delete_scope(&self, scope_id: i64) -> Result<(), CoreError>;

    async fn set_scope_image(&self, scope_id: i64, img_link: &str) -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Stars
    // ------------------------------------------------------------------

    async fn get_star(&self, star_id: i64) -> Result<Option<StarRecord>, CoreError>;

    async fn find_active_star(&self, user_id: i64) -> Result<Option<StarRecord>, CoreError>;

    /// Return the user's active star, creating it if absent. At most one
    /// active star per user exists afterwards, even under concurrent calls.
    async fn get_or_create_active_star(&self, user_id: i64) -> Result<StarRecord, CoreError>;

    /// List submitted stars (never `active` or `deleted`).
    async fn list_stars(&self, filter: &StarFilter) -> Result<Vec<StarRecord>, CoreError>;

    async fn update_star_fields(
        &self,
        star_id: i64,
        name: &str,
        constellation: &str,
    ) -> Result<(), CoreError>;

    /// Move a star to `to` only if its current status is one of `from`.
    ///
    /// Stamps `formed_at` when moving to `formed` and `finished_at` plus the
    /// moderator when moving to `completed` or `declined`. Returns false
    /// when the star was not in an expected status (or does not exist).
    async fn transition_star(
        &self,
        star_id: i64,
        from: &[StarStatus],
        to: StarStatus,
        moderator_id: Option<i64>,
    ) -> Result<bool, CoreError>;

    // ------------------------------------------------------------------
    // Calcs
    // ------------------------------------------------------------------

    async fn get_calc(&self, star_id: i64, scope_id: i64)
    -> Result<Option<CalcRecord>, CoreError>;

    async fn list_calcs(&self, star_id: i64) -> Result<Vec<CalcRecord>, CoreError>;

    /// Scopes of a star joined with their line items, ordered by scope id.
    async fn list_star_lines(&self, star_id: i64) -> Result<Vec<ScopeLine>, CoreError>;

    /// Insert a zero-valued line item. Returns false if the pair already exists.
    async fn insert_calc_if_absent(&self, star_id: i64, scope_id: i64)
    -> Result<bool, CoreError>;

    /// Overwrite inputs and reset both outputs to zero. Returns false if absent.
    async fn update_calc_inputs(
        &self,
        star_id: i64,
        scope_id: i64,
        inputs: &CalcInputs,
    ) -> Result<bool, CoreError>;

    /// Store computed outputs. Returns false if absent.
    async fn update_calc_results(
        &self,
        star_id: i64,
        scope_id: i64,
        outputs: &CalcOutputs,
    ) -> Result<bool, CoreError>;

    /// Remove a line item. Returns false if absent.
    async fn delete_calc(&self, star_id: i64, scope_id: i64) -> Result<bool, CoreError>;

    async fn count_calcs(&self, star_id: i64) -> Result<i64, CoreError>;

    /// Line items with both outputs non-zero.
    async fn count_completed_calcs(&self, star_id: i64) -> Result<i64, CoreError>;

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, CoreError>;

    async fn get_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, CoreError>;

    /// Create an account. Fails with `Conflict` if the login is taken.
    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRecord, CoreError>;

    /// Change login and/or password hash. `None` leaves the column unchanged.
    async fn update_user(
        &self,
        user_id: i64,
        login: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UserRecord, CoreError>;

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    async fn health_check(&self) -> Result<bool, CoreError>;
}
