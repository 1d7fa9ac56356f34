// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scope catalog handlers.
//!
//! Anyone may browse; creating, editing, deleting and uploading images
//! requires a moderator.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::authz;
use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::model::{NewScope, ScopePatch, ScopeRecord};
use crate::object_store::{ObjectStore, scope_image_key};
use crate::persistence::Persistence;

/// Shared state for catalog handlers.
pub struct CatalogHandlerState {
    pub persistence: Arc<dyn Persistence>,
    pub objects: Arc<dyn ObjectStore>,
}

impl CatalogHandlerState {
    pub fn new(persistence: Arc<dyn Persistence>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            persistence,
            objects,
        }
    }
}

async fn load_scope(persistence: &dyn Persistence, scope_id: i64) -> Result<ScopeRecord> {
    persistence
        .get_scope(scope_id)
        .await?
        .ok_or_else(|| CoreError::not_found("scope", scope_id))
}

fn validate_constants(lambda: f64, delta_lamb: f64, zero_point: f64) -> Result<()> {
    for (field, value) in [
        ("lambda", lambda),
        ("delta_lamb", delta_lamb),
        ("zero_point", zero_point),
    ] {
        if !value.is_finite() {
            return Err(CoreError::validation(field, "must be a finite number"));
        }
    }
    Ok(())
}

/// List scopes, optionally filtered by a name substring.
pub async fn handle_list_scopes(
    state: &CatalogHandlerState,
    search: Option<&str>,
) -> Result<Vec<ScopeRecord>> {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    state.persistence.list_scopes(search).await
}

pub async fn handle_get_scope(state: &CatalogHandlerState, scope_id: i64) -> Result<ScopeRecord> {
    load_scope(state.persistence.as_ref(), scope_id).await
}

#[instrument(skip(state, identity, scope), fields(user_id = identity.user_id, name = %scope.name))]
pub async fn handle_create_scope(
    state: &CatalogHandlerState,
    identity: &Identity,
    scope: NewScope,
) -> Result<ScopeRecord> {
    authz::require_moderator(identity)?;

    if scope.name.trim().is_empty() {
        return Err(CoreError::validation("name", "is required"));
    }
    validate_constants(scope.lambda, scope.delta_lamb, scope.zero_point)?;

    let created = state.persistence.create_scope(&scope).await?;
    info!(scope_id = created.id, "Scope created");
    Ok(created)
}

/// Apply a partial update. Unset text fields and zero constants are kept.
#[instrument(skip(state, identity, patch), fields(user_id = identity.user_id))]
pub async fn handle_edit_scope(
    state: &CatalogHandlerState,
    identity: &Identity,
    scope_id: i64,
    patch: ScopePatch,
) -> Result<ScopeRecord> {
    authz::require_moderator(identity)?;
    validate_constants(patch.lambda, patch.delta_lamb, patch.zero_point)?;

    let mut scope = load_scope(state.persistence.as_ref(), scope_id).await?;
    patch.apply_to(&mut scope);
    state.persistence.update_scope(&scope).await?;

    info!("Scope updated");
    Ok(scope)
}

/// Delete a scope, then its image object when it has one.
///
/// A scope still referenced by line items fails with `Conflict` and keeps its
/// image. Failing to remove the image of a deleted scope is only logged.
#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn handle_delete_scope(
    state: &CatalogHandlerState,
    identity: &Identity,
    scope_id: i64,
) -> Result<()> {
    authz::require_moderator(identity)?;

    let scope = load_scope(state.persistence.as_ref(), scope_id).await?;
    state.persistence.delete_scope(scope_id).await?;
    info!("Scope deleted");

    if !scope.img_link.is_empty()
        && let Err(e) = state.objects.remove(&scope_image_key(scope_id)).await
    {
        warn!(error = %e, "Failed to remove image of deleted scope");
    }
    Ok(())
}

/// Store an image for a scope under `<scope_id>.jpg`, replacing any previous one.
#[instrument(skip(state, identity, bytes), fields(user_id = identity.user_id, size = bytes.len()))]
pub async fn handle_upload_image(
    state: &CatalogHandlerState,
    identity: &Identity,
    scope_id: i64,
    bytes: Vec<u8>,
    content_type: &str,
) -> Result<ScopeRecord> {
    authz::require_moderator(identity)?;

    if bytes.is_empty() {
        return Err(CoreError::validation("image", "file is empty"));
    }

    let scope = load_scope(state.persistence.as_ref(), scope_id).await?;
    let key = scope_image_key(scope_id);

    if !scope.img_link.is_empty() {
        state.objects.remove(&key).await?;
    }
    state.objects.put(&key, bytes, content_type).await?;

    let link = state.objects.public_url(&key);
    state.persistence.set_scope_image(scope_id, &link).await?;

    info!(img_link = %link, "Scope image uploaded");
    load_scope(state.persistence.as_ref(), scope_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::object_store::MemoryObjectStore;
    use crate::persistence::MemoryPersistence;

    fn moderator() -> Identity {
        Identity {
            user_id: 1,
            role: Role::Moderator,
        }
    }

    fn state() -> (CatalogHandlerState, Arc<MemoryObjectStore>) {
        let objects = Arc::new(MemoryObjectStore::new("http://minio:9000/scopes"));
        (
            CatalogHandlerState::new(Arc::new(MemoryPersistence::new()), objects.clone()),
            objects,
        )
    }

    fn hubble() -> NewScope {
        NewScope {
            name: "Hubble".into(),
            status: true,
            lambda: 775.0,
            delta_lamb: 150.0,
            zero_point: 2.518e-9,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_users_cannot_manage_catalog() {
        let (state, _) = state();
        let user = Identity {
            user_id: 2,
            role: Role::User,
        };
        let err = handle_create_scope(&state, &user, hubble()).await.unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let (state, _) = state();
        let err = handle_create_scope(
            &state,
            &moderator(),
            NewScope {
                name: "  ".into(),
                ..hubble()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_upload_replaces_and_delete_cleans_up() {
        let (state, objects) = state();
        let scope = handle_create_scope(&state, &moderator(), hubble())
            .await
            .unwrap();

        let updated = handle_upload_image(&state, &moderator(), scope.id, vec![1], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(
            updated.img_link,
            format!("http://minio:9000/scopes/{}.jpg", scope.id)
        );

        handle_upload_image(&state, &moderator(), scope.id, vec![2, 2], "image/jpeg")
            .await
            .unwrap();
        let stored = objects.get(&scope_image_key(scope.id)).await.unwrap();
        assert_eq!(stored.bytes, vec![2, 2]);

        handle_delete_scope(&state, &moderator(), scope.id)
            .await
            .unwrap();
        assert!(objects.is_empty().await);
        assert!(matches!(
            handle_get_scope(&state, scope.id).await.unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_referenced_scope_keeps_its_image() {
        let (state, objects) = state();
        let scope = handle_create_scope(&state, &moderator(), hubble())
            .await
            .unwrap();
        handle_upload_image(&state, &moderator(), scope.id, vec![1], "image/jpeg")
            .await
            .unwrap();

        let star = state.persistence.get_or_create_active_star(2).await.unwrap();
        state
            .persistence
            .insert_calc_if_absent(star.id, scope.id)
            .await
            .unwrap();

        let err = handle_delete_scope(&state, &moderator(), scope.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let kept = handle_get_scope(&state, scope.id).await.unwrap();
        assert_eq!(
            kept.img_link,
            format!("http://minio:9000/scopes/{}.jpg", scope.id)
        );
        assert!(objects.get(&scope_image_key(scope.id)).await.is_some());
    }

    #[tokio::test]
    async fn test_edit_keeps_unset_fields() {
        let (state, _) = state();
        let scope = handle_create_scope(&state, &moderator(), hubble())
            .await
            .unwrap();

        let edited = handle_edit_scope(
            &state,
            &moderator(),
            scope.id,
            ScopePatch {
                description: "orbital".into(),
                status: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(edited.name, "Hubble");
        assert_eq!(edited.description, "orbital");
        assert_eq!(edited.lambda, 775.0);
    }
}
