// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for starlab-core integration tests.
//!
//! Provides TestContext with seeded accounts over either persistence backend,
//! a recording compute client, and a backend that loses finish races.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;

use starlab_core::CoreError;
use starlab_core::calculation::CalcOutputs;
use starlab_core::dispatch::{CalculationJob, ComputeClient, DispatchError};
use starlab_core::identity::Identity;
use starlab_core::lifecycle::{CalculationMode, LifecycleHandlerState};
use starlab_core::model::{
    CalcInputs, CalcRecord, NewScope, Role, ScopeLine, ScopeRecord, StarFilter, StarRecord,
    StarStatus, UserRecord,
};
use starlab_core::persistence::{MemoryPersistence, Persistence, PostgresPersistence};

#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

/// Compute client that records every job and fails for selected scopes.
#[derive(Default)]
pub struct RecordingComputeClient {
    pub jobs: Mutex<Vec<CalculationJob>>,
    failing_scopes: HashSet<String>,
}

impl RecordingComputeClient {
    pub fn failing_for(scope_ids: &[i64]) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            failing_scopes: scope_ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    pub async fn sent(&self) -> Vec<CalculationJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl ComputeClient for RecordingComputeClient {
    async fn send(&self, job: &CalculationJob) -> Result<(), DispatchError> {
        self.jobs.lock().await.push(job.clone());
        if self.failing_scopes.contains(&job.scope_id) {
            return Err(DispatchError::Status(503));
        }
        Ok(())
    }
}

/// Engine state plus three seeded identities.
pub struct TestContext {
    pub persistence: Arc<dyn Persistence>,
    pub lifecycle: LifecycleHandlerState,
    pub owner: Identity,
    pub other: Identity,
    pub moderator: Identity,
}

impl TestContext {
    /// In-memory context with the given calculation mode.
    pub async fn memory(mode: CalculationMode) -> Self {
        Self::seeded(Arc::new(MemoryPersistence::new()), mode).await
    }

    /// PostgreSQL context from TEST_DATABASE_URL.
    pub async fn postgres(mode: CalculationMode) -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&database_url).await.ok()?;
        starlab_core::migrations::run_postgres(&pool).await.ok()?;
        Some(Self::seeded(Arc::new(PostgresPersistence::new(pool)), mode).await)
    }

    /// Context over a caller-supplied backend.
    pub async fn with_persistence(
        persistence: Arc<dyn Persistence>,
        mode: CalculationMode,
    ) -> Self {
        Self::seeded(persistence, mode).await
    }

    async fn seeded(persistence: Arc<dyn Persistence>, mode: CalculationMode) -> Self {
        let suffix = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();

        let mut identities = Vec::new();
        for (name, role) in [
            ("owner", Role::User),
            ("other", Role::User),
            ("moderator", Role::Moderator),
        ] {
            let user = persistence
                .create_user(&format!("{}-{}", name, suffix), "hash", role)
                .await
                .expect("Failed to seed user");
            identities.push(Identity {
                user_id: user.id,
                role,
            });
        }

        Self {
            lifecycle: LifecycleHandlerState::new(persistence.clone(), mode),
            persistence,
            owner: identities[0],
            other: identities[1],
            moderator: identities[2],
        }
    }

    /// Create a catalog scope with fixed optics.
    pub async fn scope(&self, name: &str) -> ScopeRecord {
        self.persistence
            .create_scope(&NewScope {
                name: name.to_string(),
                status: true,
                filter: "F775W".to_string(),
                lambda: 775.0,
                delta_lamb: 150.0,
                zero_point: 2.518e-9,
                ..Default::default()
            })
            .await
            .expect("Failed to create scope")
    }
}

pub fn inputs(inp_mass: f64, inp_texp: f64, inp_dist: f64) -> CalcInputs {
    CalcInputs {
        inp_mass,
        inp_texp,
        inp_dist,
    }
}

/// In-memory backend where another moderator declines every formed star just
/// before the caller's own completion is recorded.
#[derive(Default)]
pub struct DeclineWinsPersistence {
    inner: MemoryPersistence,
}

impl DeclineWinsPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for DeclineWinsPersistence {
    async fn list_scopes(&self, search: Option<&str>) -> Result<Vec<ScopeRecord>, CoreError> {
        self.inner.list_scopes(search).await
    }

    async fn get_scope(&self, scope_id: i64) -> Result<Option<ScopeRecord>, CoreError> {
        self.inner.get_scope(scope_id).await
    }

    async fn create_scope(&self, scope: &NewScope) -> Result<ScopeRecord, CoreError> {
        self.inner.create_scope(scope).await
    }

    async fn update_scope(&self, scope: &ScopeRecord) -> Result<(), CoreError> {
        self.inner.update_scope(scope).await
    }

    async fn delete_scope(&self, scope_id: i64) -> Result<(), CoreError> {
        self.inner.delete_scope(scope_id).await
    }

    async fn set_scope_image(&self, scope_id: i64, img_link: &str) -> Result<(), CoreError> {
        self.inner.set_scope_image(scope_id, img_link).await
    }

    async fn get_star(&self, star_id: i64) -> Result<Option<StarRecord>, CoreError> {
        self.inner.get_star(star_id).await
    }

    async fn find_active_star(&self, user_id: i64) -> Result<Option<StarRecord>, CoreError> {
        self.inner.find_active_star(user_id).await
    }

    async fn get_or_create_active_star(&self, user_id: i64) -> Result<StarRecord, CoreError> {
        self.inner.get_or_create_active_star(user_id).await
    }

    async fn list_stars(&self, filter: &StarFilter) -> Result<Vec<StarRecord>, CoreError> {
        self.inner.list_stars(filter).await
    }

    async fn update_star_fields(
        &self,
        star_id: i64,
        name: &str,
        constellation: &str,
    ) -> Result<(), CoreError> {
        self.inner
            .update_star_fields(star_id, name, constellation)
            .await
    }

    async fn transition_star(
        &self,
        star_id: i64,
        from: &[StarStatus],
        to: StarStatus,
        moderator_id: Option<i64>,
    ) -> Result<bool, CoreError> {
        if to == StarStatus::Completed {
            self.inner
                .transition_star(star_id, &[StarStatus::Formed], StarStatus::Declined, None)
                .await?;
        }
        self.inner
            .transition_star(star_id, from, to, moderator_id)
            .await
    }

    async fn get_calc(
        &self,
        star_id: i64,
        scope_id: i64,
    ) -> Result<Option<CalcRecord>, CoreError> {
        self.inner.get_calc(star_id, scope_id).await
    }

    async fn list_calcs(&self, star_id: i64) -> Result<Vec<CalcRecord>, CoreError> {
        self.inner.list_calcs(star_id).await
    }

    async fn list_star_lines(&self, star_id: i64) -> Result<Vec<ScopeLine>, CoreError> {
        self.inner.list_star_lines(star_id).await
    }

    async fn insert_calc_if_absent(
        &self,
        star_id: i64,
        scope_id: i64,
    ) -> Result<bool, CoreError> {
        self.inner.insert_calc_if_absent(star_id, scope_id).await
    }

    async fn update_calc_inputs(
        &self,
        star_id: i64,
        scope_id: i64,
        inputs: &CalcInputs,
    ) -> Result<bool, CoreError> {
        self.inner
            .update_calc_inputs(star_id, scope_id, inputs)
            .await
    }

    async fn update_calc_results(
        &self,
        star_id: i64,
        scope_id: i64,
        outputs: &CalcOutputs,
    ) -> Result<bool, CoreError> {
        self.inner
            .update_calc_results(star_id, scope_id, outputs)
            .await
    }

    async fn delete_calc(&self, star_id: i64, scope_id: i64) -> Result<bool, CoreError> {
        self.inner.delete_calc(star_id, scope_id).await
    }

    async fn count_calcs(&self, star_id: i64) -> Result<i64, CoreError> {
        self.inner.count_calcs(star_id).await
    }

    async fn count_completed_calcs(&self, star_id: i64) -> Result<i64, CoreError> {
        self.inner.count_completed_calcs(star_id).await
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, CoreError> {
        self.inner.get_user(user_id).await
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, CoreError> {
        self.inner.get_user_by_login(login).await
    }

    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRecord, CoreError> {
        self.inner.create_user(login, password_hash, role).await
    }

    async fn update_user(
        &self,
        user_id: i64,
        login: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UserRecord, CoreError> {
        self.inner.update_user(user_id, login, password_hash).await
    }

    async fn health_check(&self) -> Result<bool, CoreError> {
        self.inner.health_check().await
    }
}
