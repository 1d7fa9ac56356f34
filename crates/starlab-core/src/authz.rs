// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authorization gate consulted before every mutating operation.
//!
//! | Role | Capabilities |
//! |------|--------------|
//! | Guest | browse the scope catalog |
//! | User | own basket, form own stars, view own submitted stars |
//! | Moderator | everything a User can, plus view all submitted stars, |
//! |           | finish formed stars, manage the catalog |

use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::model::{Role, StarRecord};

/// Fail unless the identity holds one of the allowed roles.
pub fn require_role(identity: &Identity, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "role {:?} may not perform this action",
            identity.role
        )))
    }
}

/// Users and moderators may keep a basket.
pub fn require_member(identity: &Identity) -> Result<()> {
    require_role(identity, &[Role::User, Role::Moderator])
}

/// Catalog management and finishing stars.
pub fn require_moderator(identity: &Identity) -> Result<()> {
    require_role(identity, &[Role::Moderator])
}

/// Owner-scoped mutations: editing, forming, and line-item changes.
pub fn ensure_owner(star: &StarRecord, identity: &Identity) -> Result<()> {
    require_member(identity)?;
    if star.user_id == identity.user_id {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "star {} is not owned by the caller",
            star.id
        )))
    }
}

/// Owner, or any moderator. Used for deletion and for reading a star.
pub fn ensure_owner_or_moderator(star: &StarRecord, identity: &Identity) -> Result<()> {
    if identity.role == Role::Moderator {
        return Ok(());
    }
    ensure_owner(star, identity)
}

/// Owner filter to apply when listing stars: moderators see everyone's.
pub fn listing_scope(identity: &Identity) -> Result<Option<i64>> {
    require_member(identity)?;
    Ok(match identity.role {
        Role::Moderator => None,
        _ => Some(identity.user_id),
    })
}
