// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calc line-item manager.
//!
//! Adds, edits and removes (star, scope) line items. Callers are expected to
//! have passed the authorization gate and the star status guard already; the
//! lifecycle orchestrator does both.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::model::{CalcEntry, CalcInputs, CalcRecord, StarRecord};
use crate::persistence::Persistence;

/// Reject inputs that cannot be stored or computed.
pub fn validate_inputs(inputs: &CalcInputs) -> Result<()> {
    for (field, value) in [
        ("inp_mass", inputs.inp_mass),
        ("inp_texp", inputs.inp_texp),
        ("inp_dist", inputs.inp_dist),
    ] {
        if !value.is_finite() {
            return Err(CoreError::validation(field, "must be a finite number"));
        }
    }
    Ok(())
}

/// Parse a "mass texp dist" triple.
pub fn parse_triple(raw: &str) -> Option<CalcInputs> {
    let mut parts = raw.split_whitespace().map(str::parse::<f64>);
    let inp_mass = parts.next()?.ok()?;
    let inp_texp = parts.next()?.ok()?;
    let inp_dist = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    let inputs = CalcInputs {
        inp_mass,
        inp_texp,
        inp_dist,
    };
    validate_inputs(&inputs).ok()?;
    Some(inputs)
}

/// Convert the loose `scope id -> "mass texp dist"` mapping into typed entries.
///
/// Malformed keys or triples are skipped with a warning.
pub fn parse_calc_values(values: &BTreeMap<String, String>) -> Vec<CalcEntry> {
    values
        .iter()
        .filter_map(|(key, raw)| {
            let Ok(scope_id) = key.trim().parse::<i64>() else {
                warn!(key = %key, "Skipping calc value with non-numeric scope id");
                return None;
            };
            let Some(inputs) = parse_triple(raw) else {
                warn!(scope_id, value = %raw, "Skipping malformed calc value");
                return None;
            };
            Some(CalcEntry { scope_id, inputs })
        })
        .collect()
}

/// Put a scope into the user's draft star, creating the star if needed.
///
/// Idempotent: adding a scope already in the basket is a no-op.
pub async fn add_to_star(
    persistence: &dyn Persistence,
    user_id: i64,
    scope_id: i64,
) -> Result<StarRecord> {
    if persistence.get_scope(scope_id).await?.is_none() {
        return Err(CoreError::not_found("scope", scope_id));
    }

    let star = persistence.get_or_create_active_star(user_id).await?;
    let inserted = persistence.insert_calc_if_absent(star.id, scope_id).await?;
    debug!(star_id = star.id, scope_id, inserted, "Scope added to basket");
    Ok(star)
}

/// Overwrite a line item's inputs; outputs are reset to zero.
pub async fn edit_calc(
    persistence: &dyn Persistence,
    star_id: i64,
    scope_id: i64,
    inputs: &CalcInputs,
) -> Result<CalcRecord> {
    validate_inputs(inputs)?;

    if !persistence
        .update_calc_inputs(star_id, scope_id, inputs)
        .await?
    {
        return Err(calc_not_found(star_id, scope_id));
    }

    persistence
        .get_calc(star_id, scope_id)
        .await?
        .ok_or_else(|| calc_not_found(star_id, scope_id))
}

/// Remove a line item and return how many remain on the star.
pub async fn remove_calc(
    persistence: &dyn Persistence,
    star_id: i64,
    scope_id: i64,
) -> Result<i64> {
    if !persistence.delete_calc(star_id, scope_id).await? {
        return Err(calc_not_found(star_id, scope_id));
    }
    persistence.count_calcs(star_id).await
}

/// Best-effort bulk apply of inputs. Entries that fail are logged and
/// skipped; returns the number applied.
pub async fn apply_entries(
    persistence: &dyn Persistence,
    star_id: i64,
    entries: &[CalcEntry],
) -> usize {
    let mut applied = 0;
    for entry in entries {
        if let Err(e) = validate_inputs(&entry.inputs) {
            warn!(star_id, scope_id = entry.scope_id, error = %e, "Skipping invalid calc entry");
            continue;
        }
        match persistence
            .update_calc_inputs(star_id, entry.scope_id, &entry.inputs)
            .await
        {
            Ok(true) => applied += 1,
            Ok(false) => {
                warn!(star_id, scope_id = entry.scope_id, "Skipping entry for scope not in star");
            }
            Err(e) => {
                warn!(star_id, scope_id = entry.scope_id, error = %e, "Failed to apply calc entry");
            }
        }
    }
    applied
}

fn calc_not_found(star_id: i64, scope_id: i64) -> CoreError {
    CoreError::not_found("calc", format!("{}_{}", star_id, scope_id))
}
