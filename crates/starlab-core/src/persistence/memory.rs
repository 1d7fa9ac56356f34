// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory persistence for tests and local runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{NEW_STAR_CONSTELLATION, NEW_STAR_NAME, Persistence};
use crate::calculation::CalcOutputs;
use crate::error::CoreError;
use crate::model::{
    CalcInputs, CalcRecord, NewScope, Role, ScopeLine, ScopeRecord, StarFilter, StarRecord,
    StarStatus, UserRecord,
};

#[derive(Default)]
struct State {
    next_id: i64,
    scopes: BTreeMap<i64, ScopeRecord>,
    stars: BTreeMap<i64, StarRecord>,
    calcs: BTreeMap<(i64, i64), CalcRecord>,
    users: BTreeMap<i64, UserRecord>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Persistence backed by process memory. All operations hold a single lock,
/// so compare-and-set transitions are trivially atomic.
#[derive(Default)]
pub struct MemoryPersistence {
    state: Mutex<State>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn list_scopes(&self, search: Option<&str>) -> Result<Vec<ScopeRecord>, CoreError> {
        let state = self.state.lock().await;
        let needle = search.map(str::to_lowercase);
        Ok(state
            .scopes
            .values()
            .filter(|s| match &needle {
                Some(n) => s.name.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_scope(&self, scope_id: i64) -> Result<Option<ScopeRecord>, CoreError> {
        Ok(self.state.lock().await.scopes.get(&scope_id).cloned())
    }

    async fn create_scope(&self, scope: &NewScope) -> Result<ScopeRecord, CoreError> {
        let mut state = self.state.lock().await;
        let record = ScopeRecord {
            id: state.allocate_id(),
            name: scope.name.clone(),
            description: scope.description.clone(),
            status: scope.status,
            img_link: String::new(),
            filter: scope.filter.clone(),
            lambda: scope.lambda,
            delta_lamb: scope.delta_lamb,
            zero_point: scope.zero_point,
        };
        state.scopes.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_scope(&self, scope: &ScopeRecord) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        match state.scopes.get_mut(&scope.id) {
            Some(existing) => {
                *existing = scope.clone();
                Ok(())
            }
            None => Err(CoreError::not_found("scope", scope.id)),
        }
    }

    async fn delete_scope(&self, scope_id: i64) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        if !state.scopes.contains_key(&scope_id) {
            return Err(CoreError::not_found("scope", scope_id));
        }
        if state.calcs.keys().any(|(_, s)| *s == scope_id) {
            return Err(CoreError::Conflict(format!(
                "scope {} is referenced by line items",
                scope_id
            )));
        }
        state.scopes.remove(&scope_id);
        Ok(())
    }

    async fn set_scope_image(&self, scope_id: i64, img_link: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        let scope = state
            .scopes
            .get_mut(&scope_id)
            .ok_or_else(|| CoreError::not_found("scope", scope_id))?;
        scope.img_link = img_link.to_string();
        Ok(())
    }

    async fn get_star(&self, star_id: i64) -> Result<Option<StarRecord>, CoreError> {
        Ok(self.state.lock().await.stars.get(&star_id).cloned())
    }

    async fn find_active_star(&self, user_id: i64) -> Result<Option<StarRecord>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .stars
            .values()
            .find(|s| s.user_id == user_id && s.status == StarStatus::Active)
            .cloned())
    }

    async fn get_or_create_active_star(&self, user_id: i64) -> Result<StarRecord, CoreError> {
        let mut state = self.state.lock().await;
        if let Some(star) = state
            .stars
            .values()
            .find(|s| s.user_id == user_id && s.status == StarStatus::Active)
        {
            return Ok(star.clone());
        }

        let star = StarRecord {
            id: state.allocate_id(),
            status: StarStatus::Active,
            created_at: Utc::now(),
            formed_at: None,
            finished_at: None,
            name: NEW_STAR_NAME.to_string(),
            constellation: NEW_STAR_CONSTELLATION.to_string(),
            user_id,
            moderator_id: None,
        };
        state.stars.insert(star.id, star.clone());
        Ok(star)
    }

    async fn list_stars(&self, filter: &StarFilter) -> Result<Vec<StarRecord>, CoreError> {
        let state = self.state.lock().await;
        let mut stars: Vec<StarRecord> = state
            .stars
            .values()
            .filter(|s| !matches!(s.status, StarStatus::Active | StarStatus::Deleted))
            .filter(|s| filter.user_id.is_none_or(|u| s.user_id == u))
            .filter(|s| filter.status.is_none_or(|st| s.status == st))
            .filter(|s| match filter.formed_after {
                Some(after) => s.formed_at.is_some_and(|f| f >= after),
                None => true,
            })
            .filter(|s| match filter.formed_before {
                Some(before) => s.formed_at.is_some_and(|f| f <= before),
                None => true,
            })
            .cloned()
            .collect();

        // formed_at DESC NULLS LAST, id DESC
        stars.sort_by(|a, b| match (a.formed_at, b.formed_at) {
            (Some(x), Some(y)) => y.cmp(&x).then(b.id.cmp(&a.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.id.cmp(&a.id),
        });
        Ok(stars)
    }

    async fn update_star_fields(
        &self,
        star_id: i64,
        name: &str,
        constellation: &str,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        let star = state
            .stars
            .get_mut(&star_id)
            .ok_or_else(|| CoreError::not_found("star", star_id))?;
        star.name = name.to_string();
        star.constellation = constellation.to_string();
        Ok(())
    }

    async fn transition_star(
        &self,
        star_id: i64,
        from: &[StarStatus],
        to: StarStatus,
        moderator_id: Option<i64>,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        let Some(star) = state.stars.get_mut(&star_id) else {
            return Ok(false);
        };
        if !from.contains(&star.status) {
            return Ok(false);
        }

        star.status = to;
        match to {
            StarStatus::Formed => star.formed_at = Some(Utc::now()),
            StarStatus::Completed | StarStatus::Declined => star.finished_at = Some(Utc::now()),
            _ => {}
        }
        if moderator_id.is_some() {
            star.moderator_id = moderator_id;
        }
        Ok(true)
    }

    async fn get_calc(
        &self,
        star_id: i64,
        scope_id: i64,
    ) -> Result<Option<CalcRecord>, CoreError> {
        Ok(self
            .state
            .lock()
            .await
            .calcs
            .get(&(star_id, scope_id))
            .copied())
    }

    async fn list_calcs(&self, star_id: i64) -> Result<Vec<CalcRecord>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .calcs
            .range((star_id, i64::MIN)..=(star_id, i64::MAX))
            .map(|(_, c)| *c)
            .collect())
    }

    async fn list_star_lines(&self, star_id: i64) -> Result<Vec<ScopeLine>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .calcs
            .range((star_id, i64::MIN)..=(star_id, i64::MAX))
            .filter_map(|((_, scope_id), calc)| {
                state.scopes.get(scope_id).map(|scope| ScopeLine {
                    scope: scope.clone(),
                    calc: *calc,
                })
            })
            .collect())
    }

    async fn insert_calc_if_absent(
        &self,
        star_id: i64,
        scope_id: i64,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        if !state.stars.contains_key(&star_id) {
            return Err(CoreError::not_found("star", star_id));
        }
        if !state.scopes.contains_key(&scope_id) {
            return Err(CoreError::not_found("scope", scope_id));
        }
        if state.calcs.contains_key(&(star_id, scope_id)) {
            return Ok(false);
        }
        state
            .calcs
            .insert((star_id, scope_id), CalcRecord::empty(star_id, scope_id));
        Ok(true)
    }

    async fn update_calc_inputs(
        &self,
        star_id: i64,
        scope_id: i64,
        inputs: &CalcInputs,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        let Some(calc) = state.calcs.get_mut(&(star_id, scope_id)) else {
            return Ok(false);
        };
        calc.inp_mass = inputs.inp_mass;
        calc.inp_texp = inputs.inp_texp;
        calc.inp_dist = inputs.inp_dist;
        calc.res_en = 0.0;
        calc.res_ni = 0.0;
        Ok(true)
    }

    async fn update_calc_results(
        &self,
        star_id: i64,
        scope_id: i64,
        outputs: &CalcOutputs,
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        let Some(calc) = state.calcs.get_mut(&(star_id, scope_id)) else {
            return Ok(false);
        };
        calc.res_en = outputs.res_en;
        calc.res_ni = outputs.res_ni;
        Ok(true)
    }

    async fn delete_calc(&self, star_id: i64, scope_id: i64) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        Ok(state.calcs.remove(&(star_id, scope_id)).is_some())
    }

    async fn count_calcs(&self, star_id: i64) -> Result<i64, CoreError> {
        Ok(self.list_calcs(star_id).await?.len() as i64)
    }

    async fn count_completed_calcs(&self, star_id: i64) -> Result<i64, CoreError> {
        Ok(self
            .list_calcs(star_id)
            .await?
            .iter()
            .filter(|c| c.is_computed())
            .count() as i64)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, CoreError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, CoreError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.login == login).cloned())
    }

    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRecord, CoreError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.login == login) {
            return Err(CoreError::Conflict(format!(
                "login '{}' is already taken",
                login
            )));
        }
        let user = UserRecord {
            id: state.allocate_id(),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            role,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        user_id: i64,
        login: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UserRecord, CoreError> {
        let mut state = self.state.lock().await;
        if let Some(login) = login
            && state
                .users
                .values()
                .any(|u| u.login == login && u.id != user_id)
        {
            return Err(CoreError::Conflict("login is already taken".to_string()));
        }

        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        if let Some(login) = login {
            user.login = login.to_string();
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash.to_string();
        }
        Ok(user.clone())
    }

    async fn health_check(&self) -> Result<bool, CoreError> {
        Ok(true)
    }
}
