// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Star lifecycle orchestrator.
//!
//! These handlers tie the authorization gate, the line-item manager, the
//! calculation engine and the dispatch gateway together. Every handler takes
//! the caller's verified [`Identity`] explicitly.
//!
//! Guards are checked in a fixed order: role, existence, ownership, status.
//! Status changes are compare-and-set in the persistence layer, so a guard
//! that passed here can still lose a race and surface as `Conflict`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::authz;
use crate::calculation::{self, ScopeOptics};
use crate::dispatch::{self, ComputeClient, DispatchReport};
use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::line_items;
use crate::model::{
    BasketSummary, CalcEntry, CalcInputs, CalcRecord, Role, StarDetail, StarFilter, StarRecord,
    StarStatus, StarView,
};
use crate::persistence::Persistence;

/// How completed stars get their outputs. Exactly one per process.
#[derive(Clone)]
pub enum CalculationMode {
    /// Compute in-process before recording completion.
    Sync,
    /// Send every line item to the compute service after completion.
    Async(Arc<dyn ComputeClient>),
}

impl fmt::Debug for CalculationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculationMode::Sync => f.write_str("Sync"),
            CalculationMode::Async(_) => f.write_str("Async"),
        }
    }
}

/// Shared state for lifecycle handlers.
pub struct LifecycleHandlerState {
    /// Persistence implementation.
    pub persistence: Arc<dyn Persistence>,
    /// Calculation mode for completed stars.
    pub mode: CalculationMode,
}

impl LifecycleHandlerState {
    pub fn new(persistence: Arc<dyn Persistence>, mode: CalculationMode) -> Self {
        Self { persistence, mode }
    }
}

/// Name and constellation of a draft star.
#[derive(Debug, Clone, Deserialize)]
pub struct EditStarRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub constellation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormStarResponse {
    pub star: StarRecord,
    /// Entries that were written; the rest were skipped.
    pub applied: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinishStarResponse {
    pub star: StarRecord,
    /// Set when completion dispatched to the compute service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchReport>,
    /// Set when completion computed outputs in-process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeleteCalcResponse {
    pub remaining: i64,
    /// The star was soft-deleted because its last line item went away.
    pub star_deleted: bool,
}

// ============================================================================
// Helpers
// ============================================================================

async fn load_star(persistence: &dyn Persistence, star_id: i64) -> Result<StarRecord> {
    persistence
        .get_star(star_id)
        .await?
        .ok_or_else(|| CoreError::not_found("star", star_id))
}

fn require_status(star: &StarRecord, expected: StarStatus) -> Result<()> {
    if star.status == expected {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "star {} is {}, expected {}",
            star.id, star.status, expected
        )))
    }
}

fn lost_race(star_id: i64) -> CoreError {
    CoreError::Conflict(format!("star {} changed status concurrently", star_id))
}

/// Attach the derived completed-calculation count.
pub async fn star_view(persistence: &dyn Persistence, star: StarRecord) -> Result<StarView> {
    let completed_calculations = persistence.count_completed_calcs(star.id).await?;
    Ok(StarView {
        star,
        completed_calculations,
    })
}

/// Compute and store outputs for every line item of a star. Returns the
/// number of items written.
pub async fn compute_star(persistence: &dyn Persistence, star_id: i64) -> Result<usize> {
    let lines = persistence.list_star_lines(star_id).await?;
    let mut written = 0;
    for line in &lines {
        let inputs = CalcInputs {
            inp_mass: line.calc.inp_mass,
            inp_texp: line.calc.inp_texp,
            inp_dist: line.calc.inp_dist,
        };
        let outputs = calculation::calculate(ScopeOptics::from(&line.scope), inputs);
        if persistence
            .update_calc_results(star_id, line.scope.id, &outputs)
            .await?
        {
            written += 1;
        }
    }
    Ok(written)
}

// ============================================================================
// Basket
// ============================================================================

/// Add a scope to the caller's draft star, creating the star if absent.
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn handle_add_to_star(
    state: &LifecycleHandlerState,
    identity: &Identity,
    scope_id: i64,
) -> Result<StarRecord> {
    // 1. Guests have no basket
    authz::require_member(identity)?;

    // 2. Lazily create the draft and insert the line item
    let star = line_items::add_to_star(state.persistence.as_ref(), identity.user_id, scope_id)
        .await?;

    info!(star_id = star.id, "Scope in basket");
    Ok(star)
}

/// Draft star id and line count, zero for callers without a basket.
pub async fn handle_basket(
    state: &LifecycleHandlerState,
    identity: &Identity,
) -> Result<BasketSummary> {
    if identity.role == Role::Guest {
        return Ok(BasketSummary::default());
    }

    match state
        .persistence
        .find_active_star(identity.user_id)
        .await?
    {
        Some(star) => Ok(BasketSummary {
            star_id: star.id,
            count: state.persistence.count_calcs(star.id).await?,
        }),
        None => Ok(BasketSummary::default()),
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Star with its scopes and line items. Deleted stars, and drafts of other
/// users, are not found.
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn handle_get_star(
    state: &LifecycleHandlerState,
    identity: &Identity,
    star_id: i64,
) -> Result<StarDetail> {
    authz::require_member(identity)?;

    let star = load_star(state.persistence.as_ref(), star_id).await?;
    // Drafts are private to their owner, moderators included
    let foreign_draft = star.status == StarStatus::Active && star.user_id != identity.user_id;
    if star.status == StarStatus::Deleted || foreign_draft {
        return Err(CoreError::not_found("star", star_id));
    }
    authz::ensure_owner_or_moderator(&star, identity)?;

    let scopes = state.persistence.list_star_lines(star_id).await?;
    let star = star_view(state.persistence.as_ref(), star).await?;
    Ok(StarDetail { star, scopes })
}

/// Submitted stars visible to the caller.
///
/// Users only ever see their own; whatever owner the filter names is replaced.
#[instrument(skip(state, identity, filter), fields(user_id = identity.user_id))]
pub async fn handle_list_stars(
    state: &LifecycleHandlerState,
    identity: &Identity,
    mut filter: StarFilter,
) -> Result<Vec<StarView>> {
    filter.user_id = authz::listing_scope(identity)?;

    let stars = state.persistence.list_stars(&filter).await?;
    let mut views = Vec::with_capacity(stars.len());
    for star in stars {
        views.push(star_view(state.persistence.as_ref(), star).await?);
    }
    Ok(views)
}

// ============================================================================
// Owner transitions
// ============================================================================

/// Rename a draft star.
#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
pub async fn handle_edit_star(
    state: &LifecycleHandlerState,
    identity: &Identity,
    star_id: i64,
    request: EditStarRequest,
) -> Result<StarRecord> {
    // 1. Validate fields
    let name = request.name.trim();
    let constellation = request.constellation.trim();
    if name.is_empty() {
        return Err(CoreError::validation("name", "is required"));
    }
    if constellation.is_empty() {
        return Err(CoreError::validation("constellation", "is required"));
    }

    // 2. Owner of an active star only
    let star = load_star(state.persistence.as_ref(), star_id).await?;
    authz::ensure_owner(&star, identity)?;
    require_status(&star, StarStatus::Active)?;

    // 3. Write
    state
        .persistence
        .update_star_fields(star_id, name, constellation)
        .await?;

    load_star(state.persistence.as_ref(), star_id).await
}

/// Submit a draft star and apply the final line-item inputs.
///
/// The transition to `formed` is authoritative; entries are then applied best
/// effort and any that fail are skipped.
#[instrument(
    skip(state, identity, entries),
    fields(user_id = identity.user_id, entries = entries.len())
)]
pub async fn handle_form_star(
    state: &LifecycleHandlerState,
    identity: &Identity,
    star_id: i64,
    entries: Vec<CalcEntry>,
) -> Result<FormStarResponse> {
    // 1. Owner of an active star only
    let star = load_star(state.persistence.as_ref(), star_id).await?;
    authz::ensure_owner(&star, identity)?;
    require_status(&star, StarStatus::Active)?;

    // 2. active -> formed
    if !state
        .persistence
        .transition_star(star_id, &[StarStatus::Active], StarStatus::Formed, None)
        .await?
    {
        return Err(lost_race(star_id));
    }

    // 3. Apply inputs
    let applied = line_items::apply_entries(state.persistence.as_ref(), star_id, &entries).await;
    if applied < entries.len() {
        warn!(
            applied,
            skipped = entries.len() - applied,
            "Some calc entries were not applied"
        );
    }

    info!(applied, "Star formed");
    Ok(FormStarResponse {
        star: load_star(state.persistence.as_ref(), star_id).await?,
        applied,
    })
}

/// Soft-delete a star that has not reached a terminal status.
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn handle_delete_star(
    state: &LifecycleHandlerState,
    identity: &Identity,
    star_id: i64,
) -> Result<()> {
    let star = load_star(state.persistence.as_ref(), star_id).await?;
    authz::ensure_owner_or_moderator(&star, identity)?;

    if star.status.is_terminal() {
        return Err(CoreError::Conflict(format!(
            "star {} is already {}",
            star_id, star.status
        )));
    }

    if !state
        .persistence
        .transition_star(
            star_id,
            &[StarStatus::Active, StarStatus::Formed],
            StarStatus::Deleted,
            None,
        )
        .await?
    {
        return Err(lost_race(star_id));
    }

    info!("Star deleted");
    Ok(())
}

// ============================================================================
// Moderator transitions
// ============================================================================

/// Complete or decline a formed star.
///
/// Completion triggers the configured calculation mode once the transition
/// has been recorded: sync mode writes outputs in-process, async mode
/// dispatches the line items to the compute service.
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn handle_finish_star(
    state: &LifecycleHandlerState,
    identity: &Identity,
    star_id: i64,
    status: &str,
) -> Result<FinishStarResponse> {
    // 1. Moderators only
    authz::require_moderator(identity)?;

    // 2. Star must exist
    let star = load_star(state.persistence.as_ref(), star_id).await?;

    // 3. Only completed or declined are valid targets
    let target = match status.parse::<StarStatus>() {
        Ok(s @ (StarStatus::Completed | StarStatus::Declined)) => s,
        _ => return Err(CoreError::Conflict(format!("invalid status '{}'", status))),
    };

    // 4. Star must be formed
    require_status(&star, StarStatus::Formed)?;

    // 5. formed -> target, recording the moderator
    if !state
        .persistence
        .transition_star(
            star_id,
            &[StarStatus::Formed],
            target,
            Some(identity.user_id),
        )
        .await?
    {
        return Err(lost_race(star_id));
    }
    info!(status = %target, "Star finished");

    // 6. Only the winner of the transition writes outputs
    let mut computed = None;
    let mut dispatch = None;
    if target == StarStatus::Completed {
        match &state.mode {
            CalculationMode::Sync => {
                computed = Some(compute_star(state.persistence.as_ref(), star_id).await?);
            }
            CalculationMode::Async(client) => {
                dispatch = Some(
                    dispatch::dispatch_star(state.persistence.as_ref(), client.as_ref(), star_id)
                        .await?,
                );
            }
        }
    }

    Ok(FinishStarResponse {
        star: load_star(state.persistence.as_ref(), star_id).await?,
        dispatch,
        computed,
    })
}

// ============================================================================
// Line items
// ============================================================================

/// Change the inputs of a line item in a draft star. Outputs are reset.
#[instrument(skip(state, identity, inputs), fields(user_id = identity.user_id))]
pub async fn handle_edit_calc(
    state: &LifecycleHandlerState,
    identity: &Identity,
    star_id: i64,
    scope_id: i64,
    inputs: CalcInputs,
) -> Result<CalcRecord> {
    let star = load_star(state.persistence.as_ref(), star_id).await?;
    authz::ensure_owner(&star, identity)?;
    require_status(&star, StarStatus::Active)?;

    line_items::edit_calc(state.persistence.as_ref(), star_id, scope_id, &inputs).await
}

/// Remove a line item from a draft star. Removing the last one deletes the star.
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn handle_delete_calc(
    state: &LifecycleHandlerState,
    identity: &Identity,
    star_id: i64,
    scope_id: i64,
) -> Result<DeleteCalcResponse> {
    let star = load_star(state.persistence.as_ref(), star_id).await?;
    authz::ensure_owner(&star, identity)?;
    require_status(&star, StarStatus::Active)?;

    let remaining = line_items::remove_calc(state.persistence.as_ref(), star_id, scope_id).await?;

    let mut star_deleted = false;
    if remaining == 0 {
        star_deleted = state
            .persistence
            .transition_star(star_id, &[StarStatus::Active], StarStatus::Deleted, None)
            .await?;
        info!(star_deleted, "Last line item removed");
    }

    Ok(DeleteCalcResponse {
        remaining,
        star_deleted,
    })
}
