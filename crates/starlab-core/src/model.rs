// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain records and value types shared by the engine, the persistence
//! backends and the HTTP layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capability level carried by every identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Anonymous catalog browsing only.
    Guest,
    /// Registered user managing their own basket and stars.
    User,
    /// Moderator finishing stars and managing the catalog.
    Moderator,
}

impl Role {
    /// Numeric representation stored in the `users.role` column.
    pub fn as_i16(self) -> i16 {
        match self {
            Role::Guest => 0,
            Role::User => 1,
            Role::Moderator => 2,
        }
    }
}

impl TryFrom<i16> for Role {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::Guest),
            1 => Ok(Role::User),
            2 => Ok(Role::Moderator),
            other => Err(format!("unknown role {}", other)),
        }
    }
}

/// Star lifecycle status.
///
/// ```text
///   (none) ──add to basket──▶ ACTIVE ──form──▶ FORMED ──finish──▶ COMPLETED
///                               │                 │      └──────▶ DECLINED
///                               └─────delete──────┴─────────────▶ DELETED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StarStatus {
    /// Draft basket, still mutable by its owner.
    Active,
    /// Submitted by the owner, awaiting a moderator.
    Formed,
    /// Approved by a moderator; calculations were triggered.
    Completed,
    /// Rejected by a moderator.
    Declined,
    /// Soft-deleted; excluded from listings.
    Deleted,
}

impl StarStatus {
    /// Status as stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            StarStatus::Active => "active",
            StarStatus::Formed => "formed",
            StarStatus::Completed => "completed",
            StarStatus::Declined => "declined",
            StarStatus::Deleted => "deleted",
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StarStatus::Completed | StarStatus::Declined | StarStatus::Deleted
        )
    }
}

impl fmt::Display for StarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StarStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StarStatus::Active),
            "formed" => Ok(StarStatus::Formed),
            "completed" => Ok(StarStatus::Completed),
            "declined" => Ok(StarStatus::Declined),
            "deleted" => Ok(StarStatus::Deleted),
            other => Err(format!("unknown star status '{}'", other)),
        }
    }
}

impl TryFrom<String> for StarStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Telescope catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScopeRecord {
    /// Scope identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Published (true) or hidden (false).
    pub status: bool,
    /// Public link to the scope image, empty when none.
    pub img_link: String,
    /// Photometric filter name.
    pub filter: String,
    /// Central wavelength.
    pub lambda: f64,
    /// Bandwidth.
    pub delta_lamb: f64,
    /// Flux zero-point.
    pub zero_point: f64,
}

/// Fields for a new catalog entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewScope {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_published")]
    pub status: bool,
    #[serde(default)]
    pub filter: String,
    pub lambda: f64,
    pub delta_lamb: f64,
    pub zero_point: f64,
}

fn default_published() -> bool {
    true
}

/// Partial catalog update. Empty strings and zero constants are left unchanged;
/// `status` is always applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopePatch {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub img_link: String,
    #[serde(default)]
    pub lambda: f64,
    #[serde(default)]
    pub delta_lamb: f64,
    #[serde(default)]
    pub zero_point: f64,
}

impl ScopePatch {
    /// Apply the non-empty fields of this patch onto an existing record.
    pub fn apply_to(&self, scope: &mut ScopeRecord) {
        if !self.name.is_empty() {
            scope.name = self.name.clone();
        }
        if !self.description.is_empty() {
            scope.description = self.description.clone();
        }
        if !self.filter.is_empty() {
            scope.filter = self.filter.clone();
        }
        if !self.img_link.is_empty() {
            scope.img_link = self.img_link.clone();
        }
        if self.lambda != 0.0 {
            scope.lambda = self.lambda;
        }
        if self.delta_lamb != 0.0 {
            scope.delta_lamb = self.delta_lamb;
        }
        if self.zero_point != 0.0 {
            scope.zero_point = self.zero_point;
        }
        scope.status = self.status;
    }
}

/// Observation request (the aggregate root).
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StarRecord {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub status: StarStatus,
    pub created_at: DateTime<Utc>,
    pub formed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub name: String,
    pub constellation: String,
    /// Owning user.
    pub user_id: i64,
    /// Moderator who finished the star.
    pub moderator_id: Option<i64>,
}

/// Line item joining a star and a scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CalcRecord {
    pub star_id: i64,
    pub scope_id: i64,
    /// Absolute magnitude.
    pub inp_mass: f64,
    /// Exposure time.
    pub inp_texp: f64,
    /// Distance.
    pub inp_dist: f64,
    /// Energy released, zero until computed.
    pub res_en: f64,
    /// Nickel-56 mass, zero until computed.
    pub res_ni: f64,
}

impl CalcRecord {
    /// A freshly added line item with zeroed inputs and outputs.
    pub fn empty(star_id: i64, scope_id: i64) -> Self {
        Self {
            star_id,
            scope_id,
            inp_mass: 0.0,
            inp_texp: 0.0,
            inp_dist: 0.0,
            res_en: 0.0,
            res_ni: 0.0,
        }
    }

    /// Both outputs have been filled in.
    pub fn is_computed(&self) -> bool {
        self.res_en != 0.0 && self.res_ni != 0.0
    }
}

/// Physical inputs for one line item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalcInputs {
    pub inp_mass: f64,
    pub inp_texp: f64,
    pub inp_dist: f64,
}

/// Inputs addressed to a scope within a star, used by the bulk form apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalcEntry {
    pub scope_id: i64,
    #[serde(flatten)]
    pub inputs: CalcInputs,
}

/// Registered account.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    #[sqlx(try_from = "i16")]
    pub role: Role,
}

/// Star as presented to callers, with the derived completed-calculation count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StarView {
    #[serde(flatten)]
    pub star: StarRecord,
    pub completed_calculations: i64,
}

/// A scope in a star together with its line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeLine {
    #[serde(flatten)]
    pub scope: ScopeRecord,
    pub calc: CalcRecord,
}

/// Star with all of its line items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StarDetail {
    pub star: StarView,
    pub scopes: Vec<ScopeLine>,
}

/// The caller's draft basket at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BasketSummary {
    /// Active star id, 0 when the caller has none.
    pub star_id: i64,
    /// Number of line items in the basket.
    pub count: i64,
}

/// Filter for star listings.
#[derive(Debug, Clone, Default)]
pub struct StarFilter {
    /// Restrict to one owner.
    pub user_id: Option<i64>,
    /// Exact status match.
    pub status: Option<StarStatus>,
    /// Lower bound on the form date (inclusive).
    pub formed_after: Option<DateTime<Utc>>,
    /// Upper bound on the form date (inclusive).
    pub formed_before: Option<DateTime<Utc>>,
}
