// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL persistence for starlab-core.
//!
//! Provides durable storage access functions for scopes, stars, calcs and users.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{NEW_STAR_CONSTELLATION, NEW_STAR_NAME, Persistence};
use crate::calculation::CalcOutputs;
use crate::error::CoreError;
use crate::model::{
    CalcInputs, CalcRecord, NewScope, Role, ScopeLine, ScopeRecord, StarFilter, StarRecord,
    StarStatus, UserRecord,
};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const SCOPE_COLUMNS: &str =
    "id, name, description, status, img_link, filter, lambda, delta_lamb, zero_point";

const STAR_COLUMNS: &str = "id, status, created_at, formed_at, finished_at, name, constellation, \
     user_id, moderator_id";

const CALC_COLUMNS: &str = "star_id, scope_id, inp_mass, inp_texp, inp_dist, res_en, res_ni";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

// ============================================================================
// Scope Operations
// ============================================================================

/// List scopes, optionally filtered by name substring.
pub async fn list_scopes(
    pool: &PgPool,
    search: Option<&str>,
) -> Result<Vec<ScopeRecord>, CoreError> {
    let records = sqlx::query_as::<_, ScopeRecord>(&format!(
        r#"
        SELECT {SCOPE_COLUMNS}
        FROM scopes
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
        ORDER BY id
        "#
    ))
    .bind(search)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Get a scope by ID.
pub async fn get_scope(pool: &PgPool, scope_id: i64) -> Result<Option<ScopeRecord>, CoreError> {
    let record = sqlx::query_as::<_, ScopeRecord>(&format!(
        "SELECT {SCOPE_COLUMNS} FROM scopes WHERE id = $1"
    ))
    .bind(scope_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Insert a new scope and return it with its assigned id.
pub async fn create_scope(pool: &PgPool, scope: &NewScope) -> Result<ScopeRecord, CoreError> {
    let record = sqlx::query_as::<_, ScopeRecord>(&format!(
        r#"
        INSERT INTO scopes (name, description, status, filter, lambda, delta_lamb, zero_point)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {SCOPE_COLUMNS}
        "#
    ))
    .bind(&scope.name)
    .bind(&scope.description)
    .bind(scope.status)
    .bind(&scope.filter)
    .bind(scope.lambda)
    .bind(scope.delta_lamb)
    .bind(scope.zero_point)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Overwrite a scope's mutable columns.
pub async fn update_scope(pool: &PgPool, scope: &ScopeRecord) -> Result<(), CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE scopes
        SET name = $2, description = $3, status = $4, img_link = $5, filter = $6,
            lambda = $7, delta_lamb = $8, zero_point = $9
        WHERE id = $1
        "#,
    )
    .bind(scope.id)
    .bind(&scope.name)
    .bind(&scope.description)
    .bind(scope.status)
    .bind(&scope.img_link)
    .bind(&scope.filter)
    .bind(scope.lambda)
    .bind(scope.delta_lamb)
    .bind(scope.zero_point)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("scope", scope.id));
    }
    Ok(())
}

/// Delete a scope that no line item references.
pub async fn delete_scope(pool: &PgPool, scope_id: i64) -> Result<(), CoreError> {
    let result = sqlx::query("DELETE FROM scopes WHERE id = $1")
        .bind(scope_id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                CoreError::Conflict(format!("scope {} is referenced by line items", scope_id))
            } else {
                e.into()
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("scope", scope_id));
    }
    Ok(())
}

/// Set or clear the image link of a scope.
pub async fn set_scope_image(
    pool: &PgPool,
    scope_id: i64,
    img_link: &str,
) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE scopes SET img_link = $2 WHERE id = $1")
        .bind(scope_id)
        .bind(img_link)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("scope", scope_id));
    }
    Ok(())
}

// ============================================================================
// Star Operations
// ============================================================================

/// Get a star by ID.
pub async fn get_star(pool: &PgPool, star_id: i64) -> Result<Option<StarRecord>, CoreError> {
    let record = sqlx::query_as::<_, StarRecord>(&format!(
        "SELECT {STAR_COLUMNS} FROM stars WHERE id = $1"
    ))
    .bind(star_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get the user's draft star, if any.
pub async fn find_active_star(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<StarRecord>, CoreError> {
    let record = sqlx::query_as::<_, StarRecord>(&format!(
        "SELECT {STAR_COLUMNS} FROM stars WHERE user_id = $1 AND status = 'active'"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get the user's draft star, creating one if absent.
///
/// Relies on the partial unique index over `(user_id) WHERE status = 'active'`
/// so that concurrent callers converge on a single row.
pub async fn get_or_create_active_star(
    pool: &PgPool,
    user_id: i64,
) -> Result<StarRecord, CoreError> {
    sqlx::query(
        r#"
        INSERT INTO stars (status, name, constellation, user_id, created_at)
        VALUES ('active', $2, $3, $1, NOW())
        ON CONFLICT (user_id) WHERE status = 'active' DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(NEW_STAR_NAME)
    .bind(NEW_STAR_CONSTELLATION)
    .execute(pool)
    .await?;

    find_active_star(pool, user_id)
        .await?
        .ok_or_else(|| CoreError::database("create active star", "draft star vanished"))
}

/// List submitted stars matching a filter, newest form date first.
pub async fn list_stars(pool: &PgPool, filter: &StarFilter) -> Result<Vec<StarRecord>, CoreError> {
    let records = sqlx::query_as::<_, StarRecord>(&format!(
        r#"
        SELECT {STAR_COLUMNS}
        FROM stars
        WHERE status NOT IN ('active', 'deleted')
          AND ($1::bigint IS NULL OR user_id = $1)
          AND ($2::text IS NULL OR status = $2)
          AND ($3::timestamptz IS NULL OR formed_at >= $3)
          AND ($4::timestamptz IS NULL OR formed_at <= $4)
        ORDER BY formed_at DESC NULLS LAST, id DESC
        "#
    ))
    .bind(filter.user_id)
    .bind(filter.status.map(StarStatus::as_str))
    .bind(filter.formed_after)
    .bind(filter.formed_before)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Update a star's descriptive fields.
pub async fn update_star_fields(
    pool: &PgPool,
    star_id: i64,
    name: &str,
    constellation: &str,
) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE stars SET name = $2, constellation = $3 WHERE id = $1")
        .bind(star_id)
        .bind(name)
        .bind(constellation)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("star", star_id));
    }
    Ok(())
}

/// Compare-and-set a star's status.
///
/// Returns true if the star was in one of `from` and has been moved to `to`.
pub async fn transition_star(
    pool: &PgPool,
    star_id: i64,
    from: &[StarStatus],
    to: StarStatus,
    moderator_id: Option<i64>,
) -> Result<bool, CoreError> {
    let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();

    let result = sqlx::query(
        r#"
        UPDATE stars
        SET status = $2::text,
            formed_at = CASE WHEN $2::text = 'formed' THEN NOW() ELSE formed_at END,
            finished_at = CASE WHEN $2::text IN ('completed', 'declined') THEN NOW()
                               ELSE finished_at END,
            moderator_id = COALESCE($4, moderator_id)
        WHERE id = $1 AND status = ANY($3::text[])
        "#,
    )
    .bind(star_id)
    .bind(to.as_str())
    .bind(from)
    .bind(moderator_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Calc Operations
// ============================================================================

#[derive(sqlx::FromRow)]
struct StarLineRow {
    id: i64,
    name: String,
    description: String,
    status: bool,
    img_link: String,
    filter: String,
    lambda: f64,
    delta_lamb: f64,
    zero_point: f64,
    star_id: i64,
    inp_mass: f64,
    inp_texp: f64,
    inp_dist: f64,
    res_en: f64,
    res_ni: f64,
}

impl From<StarLineRow> for ScopeLine {
    fn from(row: StarLineRow) -> Self {
        ScopeLine {
            calc: CalcRecord {
                star_id: row.star_id,
                scope_id: row.id,
                inp_mass: row.inp_mass,
                inp_texp: row.inp_texp,
                inp_dist: row.inp_dist,
                res_en: row.res_en,
                res_ni: row.res_ni,
            },
            scope: ScopeRecord {
                id: row.id,
                name: row.name,
                description: row.description,
                status: row.status,
                img_link: row.img_link,
                filter: row.filter,
                lambda: row.lambda,
                delta_lamb: row.delta_lamb,
                zero_point: row.zero_point,
            },
        }
    }
}

/// Get a single line item.
pub async fn get_calc(
    pool: &PgPool,
    star_id: i64,
    scope_id: i64,
) -> Result<Option<CalcRecord>, CoreError> {
    let record = sqlx::query_as::<_, CalcRecord>(&format!(
        "SELECT {CALC_COLUMNS} FROM calcs WHERE star_id = $1 AND scope_id = $2"
    ))
    .bind(star_id)
    .bind(scope_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// All line items of a star, ordered by scope id.
pub async fn list_calcs(pool: &PgPool, star_id: i64) -> Result<Vec<CalcRecord>, CoreError> {
    let records = sqlx::query_as::<_, CalcRecord>(&format!(
        "SELECT {CALC_COLUMNS} FROM calcs WHERE star_id = $1 ORDER BY scope_id"
    ))
    .bind(star_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Scopes of a star joined with their line items.
pub async fn list_star_lines(pool: &PgPool, star_id: i64) -> Result<Vec<ScopeLine>, CoreError> {
    let rows = sqlx::query_as::<_, StarLineRow>(
        r#"
        SELECT s.id, s.name, s.description, s.status, s.img_link, s.filter,
               s.lambda, s.delta_lamb, s.zero_point,
               c.star_id, c.inp_mass, c.inp_texp, c.inp_dist, c.res_en, c.res_ni
        FROM calcs c
        JOIN scopes s ON s.id = c.scope_id
        WHERE c.star_id = $1
        ORDER BY s.id
        "#,
    )
    .bind(star_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ScopeLine::from).collect())
}

/// Insert a zero-valued line item unless the pair already exists.
pub async fn insert_calc_if_absent(
    pool: &PgPool,
    star_id: i64,
    scope_id: i64,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO calcs (star_id, scope_id)
        VALUES ($1, $2)
        ON CONFLICT (star_id, scope_id) DO NOTHING
        "#,
    )
    .bind(star_id)
    .bind(scope_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite a line item's inputs, resetting its outputs.
pub async fn update_calc_inputs(
    pool: &PgPool,
    star_id: i64,
    scope_id: i64,
    inputs: &CalcInputs,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE calcs
        SET inp_mass = $3, inp_texp = $4, inp_dist = $5, res_en = 0, res_ni = 0
        WHERE star_id = $1 AND scope_id = $2
        "#,
    )
    .bind(star_id)
    .bind(scope_id)
    .bind(inputs.inp_mass)
    .bind(inputs.inp_texp)
    .bind(inputs.inp_dist)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Store computed outputs on a line item.
pub async fn update_calc_results(
    pool: &PgPool,
    star_id: i64,
    scope_id: i64,
    outputs: &CalcOutputs,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "UPDATE calcs SET res_en = $3, res_ni = $4 WHERE star_id = $1 AND scope_id = $2",
    )
    .bind(star_id)
    .bind(scope_id)
    .bind(outputs.res_en)
    .bind(outputs.res_ni)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove a line item.
pub async fn delete_calc(pool: &PgPool, star_id: i64, scope_id: i64) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM calcs WHERE star_id = $1 AND scope_id = $2")
        .bind(star_id)
        .bind(scope_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count line items of a star.
pub async fn count_calcs(pool: &PgPool, star_id: i64) -> Result<i64, CoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM calcs WHERE star_id = $1")
        .bind(star_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Count line items with both outputs filled in.
pub async fn count_completed_calcs(pool: &PgPool, star_id: i64) -> Result<i64, CoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM calcs WHERE star_id = $1 AND res_en <> 0 AND res_ni <> 0",
    )
    .bind(star_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

// ============================================================================
// User Operations
// ============================================================================

/// Get a user by ID.
pub async fn get_user(pool: &PgPool, user_id: i64) -> Result<Option<UserRecord>, CoreError> {
    let record = sqlx::query_as::<_, UserRecord>(
        "SELECT id, login, password_hash, role FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get a user by login.
pub async fn get_user_by_login(
    pool: &PgPool,
    login: &str,
) -> Result<Option<UserRecord>, CoreError> {
    let record = sqlx::query_as::<_, UserRecord>(
        "SELECT id, login, password_hash, role FROM users WHERE login = $1",
    )
    .bind(login)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Create an account.
pub async fn create_user(
    pool: &PgPool,
    login: &str,
    password_hash: &str,
    role: Role,
) -> Result<UserRecord, CoreError> {
    sqlx::query_as::<_, UserRecord>(
        r#"
        INSERT INTO users (login, password_hash, role)
        VALUES ($1, $2, $3)
        RETURNING id, login, password_hash, role
        "#,
    )
    .bind(login)
    .bind(password_hash)
    .bind(role.as_i16())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            CoreError::Conflict(format!("login '{}' is already taken", login))
        } else {
            e.into()
        }
    })
}

/// Change a user's login and/or password hash.
pub async fn update_user(
    pool: &PgPool,
    user_id: i64,
    login: Option<&str>,
    password_hash: Option<&str>,
) -> Result<UserRecord, CoreError> {
    sqlx::query_as::<_, UserRecord>(
        r#"
        UPDATE users
        SET login = COALESCE($2, login), password_hash = COALESCE($3, password_hash)
        WHERE id = $1
        RETURNING id, login, password_hash, role
        "#,
    )
    .bind(user_id)
    .bind(login)
    .bind(password_hash)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            CoreError::Conflict("login is already taken".to_string())
        } else {
            e.into()
        }
    })?
    .ok_or_else(|| CoreError::not_found("user", user_id))
}

// ============================================================================
// Persistence impl
// ============================================================================

#[async_trait]
impl Persistence for PostgresPersistence {
    async fn list_scopes(&self, search: Option<&str>) -> Result<Vec<ScopeRecord>, CoreError> {
        list_scopes(&self.pool, search).await
    }

    async fn get_scope(&self, scope_id: i64) -> Result<Option<ScopeRecord>, CoreError> {
        get_scope(&self.pool, scope_id).await
    }

    async fn create_scope(&self, scope: &NewScope) -> Result<ScopeRecord, CoreError> {
        create_scope(&self.pool, scope).await
    }

    async fn update_scope(&self, scope: &ScopeRecord) -> Result<(), CoreError> {
        update_scope(&self.pool, scope).await
    }

    async fn delete_scope(&self, scope_id: i64) -> Result<(), CoreError> {
        delete_scope(&self.pool, scope_id).await
    }

    async fn set_scope_image(&self, scope_id: i64, img_link: &str) -> Result<(), CoreError> {
        set_scope_image(&self.pool, scope_id, img_link).await
    }

    async fn get_star(&self, star_id: i64) -> Result<Option<StarRecord>, CoreError> {
        get_star(&self.pool, star_id).await
    }

    async fn find_active_star(&self, user_id: i64) -> Result<Option<StarRecord>, CoreError> {
        find_active_star(&self.pool, user_id).await
    }

    async fn get_or_create_active_star(&self, user_id: i64) -> Result<StarRecord, CoreError> {
        get_or_create_active_star(&self.pool, user_id).await
    }

    async fn list_stars(&self, filter: &StarFilter) -> Result<Vec<StarRecord>, CoreError> {
        list_stars(&self.pool, filter).await
    }

    async fn update_star_fields(
        &self,
        star_id: i64,
        name: &str,
        constellation: &str,
    ) -> Result<(), CoreError> {
        update_star_fields(&self.pool, star_id, name, constellation).await
    }

    async fn transition_star(
        &self,
        star_id: i64,
        from: &[StarStatus],
        to: StarStatus,
        moderator_id: Option<i64>,
    ) -> Result<bool, CoreError> {
        transition_star(&self.pool, star_id, from, to, moderator_id).await
    }

    async fn get_calc(
        &self,
        star_id: i64,
        scope_id: i64,
    ) -> Result<Option<CalcRecord>, CoreError> {
        get_calc(&self.pool, star_id, scope_id).await
    }

    async fn list_calcs(&self, star_id: i64) -> Result<Vec<CalcRecord>, CoreError> {
        list_calcs(&self.pool, star_id).await
    }

    async fn list_star_lines(&self, star_id: i64) -> Result<Vec<ScopeLine>, CoreError> {
        list_star_lines(&self.pool, star_id).await
    }

    async fn insert_calc_if_absent(
        &self,
        star_id: i64,
        scope_id: i64,
    ) -> Result<bool, CoreError> {
        insert_calc_if_absent(&self.pool, star_id, scope_id).await
    }

    async fn update_calc_inputs(
        &self,
        star_id: i64,
        scope_id: i64,
        inputs: &CalcInputs,
    ) -> Result<bool, CoreError> {
        update_calc_inputs(&self.pool, star_id, scope_id, inputs).await
    }

    async fn update_calc_results(
        &self,
        star_id: i64,
        scope_id: i64,
        outputs: &CalcOutputs,
    ) -> Result<bool, CoreError> {
        update_calc_results(&self.pool, star_id, scope_id, outputs).await
    }

    async fn delete_calc(&self, star_id: i64, scope_id: i64) -> Result<bool, CoreError> {
        delete_calc(&self.pool, star_id, scope_id).await
    }

    async fn count_calcs(&self, star_id: i64) -> Result<i64, CoreError> {
        count_calcs(&self.pool, star_id).await
    }

    async fn count_completed_calcs(&self, star_id: i64) -> Result<i64, CoreError> {
        count_completed_calcs(&self.pool, star_id).await
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, CoreError> {
        get_user(&self.pool, user_id).await
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<UserRecord>, CoreError> {
        get_user_by_login(&self.pool, login).await
    }

    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRecord, CoreError> {
        create_user(&self.pool, login, password_hash, role).await
    }

    async fn update_user(
        &self,
        user_id: i64,
        login: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UserRecord, CoreError> {
        update_user(&self.pool, user_id, login, password_hash).await
    }

    async fn health_check(&self) -> Result<bool, CoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}
