// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Star lifecycle tests against the in-memory backend.

mod common;

use std::sync::Arc;

use common::*;
use starlab_core::CoreError;
use starlab_core::identity::Identity;
use starlab_core::lifecycle::{self, CalculationMode, EditStarRequest};
use starlab_core::model::{CalcEntry, Role, StarFilter, StarStatus};

async fn sync_ctx() -> TestContext {
    TestContext::memory(CalculationMode::Sync).await
}

#[tokio::test]
async fn test_add_to_star_creates_single_draft() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let kepler = ctx.scope("Kepler").await;

    let a = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    let b = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, kepler.id)
        .await
        .unwrap();
    // Adding the same scope twice is a no-op
    let c = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(a.id, c.id);
    assert_eq!(a.status, StarStatus::Active);
    assert_eq!(a.name, "New Star");

    let basket = lifecycle::handle_basket(&ctx.lifecycle, &ctx.owner)
        .await
        .unwrap();
    assert_eq!(basket.star_id, a.id);
    assert_eq!(basket.count, 2);
}

#[tokio::test]
async fn test_guest_has_no_basket() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;

    let err = lifecycle::handle_add_to_star(&ctx.lifecycle, &Identity::guest(), hubble.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let basket = lifecycle::handle_basket(&ctx.lifecycle, &Identity::guest())
        .await
        .unwrap();
    assert_eq!(basket.star_id, 0);
    assert_eq!(basket.count, 0);
}

#[tokio::test]
async fn test_add_unknown_scope_is_not_found() {
    let ctx = sync_ctx().await;
    let err = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, 9999)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "scope", .. }));
}

#[tokio::test]
async fn test_edit_calc_resets_outputs() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    ctx.persistence
        .update_calc_results(
            star.id,
            hubble.id,
            &starlab_core::calculation::CalcOutputs {
                res_en: 4.0,
                res_ni: 5.0,
            },
        )
        .await
        .unwrap();

    let calc = lifecycle::handle_edit_calc(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        hubble.id,
        inputs(12.0, 120.0, 60.0),
    )
    .await
    .unwrap();
    assert_eq!(calc.inp_mass, 12.0);
    assert_eq!(calc.res_en, 0.0);
    assert_eq!(calc.res_ni, 0.0);
}

#[tokio::test]
async fn test_edit_missing_calc_is_not_found() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let kepler = ctx.scope("Kepler").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    let err = lifecycle::handle_edit_calc(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        kepler.id,
        inputs(1.0, 1.0, 1.0),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "calc", .. }));
}

#[tokio::test]
async fn test_removing_last_calc_deletes_star() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let kepler = ctx.scope("Kepler").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, kepler.id)
        .await
        .unwrap();

    let first = lifecycle::handle_delete_calc(&ctx.lifecycle, &ctx.owner, star.id, hubble.id)
        .await
        .unwrap();
    assert_eq!(first.remaining, 1);
    assert!(!first.star_deleted);

    let last = lifecycle::handle_delete_calc(&ctx.lifecycle, &ctx.owner, star.id, kepler.id)
        .await
        .unwrap();
    assert_eq!(last.remaining, 0);
    assert!(last.star_deleted);

    let stored = ctx.persistence.get_star(star.id).await.unwrap().unwrap();
    assert_eq!(stored.status, StarStatus::Deleted);

    // A new basket is created on the next add
    let next = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    assert_ne!(next.id, star.id);
}

#[tokio::test]
async fn test_form_by_non_owner_is_rejected() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    for intruder in [ctx.other, ctx.moderator] {
        let err = lifecycle::handle_form_star(&ctx.lifecycle, &intruder, star.id, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    let stored = ctx.persistence.get_star(star.id).await.unwrap().unwrap();
    assert_eq!(stored.status, StarStatus::Active);
}

#[tokio::test]
async fn test_form_applies_entries_best_effort() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let kepler = ctx.scope("Kepler").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    let response = lifecycle::handle_form_star(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        vec![
            CalcEntry {
                scope_id: hubble.id,
                inputs: inputs(12.0, 120.0, 60.0),
            },
            // Not in the star: skipped
            CalcEntry {
                scope_id: kepler.id,
                inputs: inputs(1.0, 1.0, 1.0),
            },
        ],
    )
    .await
    .unwrap();

    assert_eq!(response.applied, 1);
    assert_eq!(response.star.status, StarStatus::Formed);
    assert!(response.star.formed_at.is_some());

    let calc = ctx
        .persistence
        .get_calc(star.id, hubble.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.inp_texp, 120.0);

    // Formed stars are frozen for their owner
    let err = lifecycle::handle_form_star(&ctx.lifecycle, &ctx.owner, star.id, vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    let err = lifecycle::handle_edit_calc(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        hubble.id,
        inputs(1.0, 1.0, 1.0),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn test_finish_guards() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    // Not yet formed
    let err = lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, star.id, "completed")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    lifecycle::handle_form_star(&ctx.lifecycle, &ctx.owner, star.id, vec![])
        .await
        .unwrap();

    // Users cannot finish, not even their own star
    let err = lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.owner, star.id, "completed")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    // Only completed and declined are valid targets
    for status in ["deleted", "formed", "approved", ""] {
        let err = lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, star.id, status)
            .await
            .unwrap_err();
        assert!(
            matches!(err, CoreError::Conflict(ref m) if m.contains("invalid status")),
            "{status}: {err}"
        );
    }

    let err = lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, 9999, "completed")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_decline_records_moderator() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    lifecycle::handle_form_star(&ctx.lifecycle, &ctx.owner, star.id, vec![])
        .await
        .unwrap();

    let response =
        lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, star.id, "declined")
            .await
            .unwrap();
    assert_eq!(response.star.status, StarStatus::Declined);
    assert_eq!(response.star.moderator_id, Some(ctx.moderator.user_id));
    assert!(response.star.finished_at.is_some());
    assert!(response.computed.is_none());
    assert!(response.dispatch.is_none());

    // Terminal: a second finish conflicts
    let err = lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, star.id, "completed")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn test_sync_completion_computes_outputs() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    lifecycle::handle_form_star(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        vec![CalcEntry {
            scope_id: hubble.id,
            inputs: inputs(10.0, 100.0, 50.0),
        }],
    )
    .await
    .unwrap();

    let response =
        lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, star.id, "completed")
            .await
            .unwrap();
    assert_eq!(response.star.status, StarStatus::Completed);
    assert_eq!(response.computed, Some(1));

    let calc = ctx
        .persistence
        .get_calc(star.id, hubble.id)
        .await
        .unwrap()
        .unwrap();
    let expected =
        starlab_core::calculation::calculate((&hubble).into(), inputs(10.0, 100.0, 50.0));
    assert_eq!(calc.res_en.to_bits(), expected.res_en.to_bits());
    assert_eq!(calc.res_ni.to_bits(), expected.res_ni.to_bits());

    let detail = lifecycle::handle_get_star(&ctx.lifecycle, &ctx.owner, star.id)
        .await
        .unwrap();
    assert_eq!(detail.star.completed_calculations, 1);
    assert_eq!(detail.scopes.len(), 1);
}

#[tokio::test]
async fn test_async_completion_dispatches_every_item() {
    let client = Arc::new(RecordingComputeClient::default());
    let ctx = TestContext::memory(CalculationMode::Async(client.clone())).await;
    let hubble = ctx.scope("Hubble").await;
    let kepler = ctx.scope("Kepler").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, kepler.id)
        .await
        .unwrap();
    lifecycle::handle_form_star(&ctx.lifecycle, &ctx.owner, star.id, vec![])
        .await
        .unwrap();

    let response =
        lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, star.id, "completed")
            .await
            .unwrap();
    let report = response.dispatch.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.sent, 2);
    assert!(response.computed.is_none());

    let jobs = client.sent().await;
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].calc_id, format!("{}_{}", star.id, hubble.id));

    // Outputs stay empty until callbacks arrive
    let calc = ctx
        .persistence
        .get_calc(star.id, hubble.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!calc.is_computed());
}

#[tokio::test]
async fn test_delete_star_rules() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    let err = lifecycle::handle_delete_star(&ctx.lifecycle, &ctx.other, star.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    lifecycle::handle_form_star(&ctx.lifecycle, &ctx.owner, star.id, vec![])
        .await
        .unwrap();
    // Moderators may delete formed stars
    lifecycle::handle_delete_star(&ctx.lifecycle, &ctx.moderator, star.id)
        .await
        .unwrap();

    let err = lifecycle::handle_delete_star(&ctx.lifecycle, &ctx.owner, star.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let err = lifecycle::handle_get_star(&ctx.lifecycle, &ctx.owner, star.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_edit_star_fields() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    let err = lifecycle::handle_edit_star(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        EditStarRequest {
            name: "SN 2011fe".into(),
            constellation: String::new(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let err = lifecycle::handle_edit_star(
        &ctx.lifecycle,
        &ctx.other,
        star.id,
        EditStarRequest {
            name: "SN 2011fe".into(),
            constellation: "Ursa Major".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let renamed = lifecycle::handle_edit_star(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        EditStarRequest {
            name: "SN 2011fe".into(),
            constellation: "Ursa Major".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.name, "SN 2011fe");
    assert_eq!(renamed.constellation, "Ursa Major");
}

#[tokio::test]
async fn test_listing_visibility() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;

    let mine = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    lifecycle::handle_form_star(&ctx.lifecycle, &ctx.owner, mine.id, vec![])
        .await
        .unwrap();

    let theirs = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.other, hubble.id)
        .await
        .unwrap();
    lifecycle::handle_form_star(&ctx.lifecycle, &ctx.other, theirs.id, vec![])
        .await
        .unwrap();

    // Still-active drafts are never listed
    lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    // A user asking for someone else's stars only gets their own
    let listed = lifecycle::handle_list_stars(
        &ctx.lifecycle,
        &ctx.owner,
        StarFilter {
            user_id: Some(ctx.other.user_id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let ids: Vec<i64> = listed.iter().map(|v| v.star.id).collect();
    assert_eq!(ids, vec![mine.id]);

    let all = lifecycle::handle_list_stars(&ctx.lifecycle, &ctx.moderator, StarFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let completed = lifecycle::handle_list_stars(
        &ctx.lifecycle,
        &ctx.moderator,
        StarFilter {
            status: Some(StarStatus::Completed),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(completed.is_empty());

    let err = lifecycle::handle_list_stars(
        &ctx.lifecycle,
        &Identity {
            user_id: 0,
            role: Role::Guest,
        },
        StarFilter::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn test_moderator_cannot_read_foreign_draft() {
    let ctx = sync_ctx().await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();

    // Drafts stay private to their owner
    for identity in [ctx.moderator, ctx.other] {
        let err = lifecycle::handle_get_star(&ctx.lifecycle, &identity, star.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }), "{err}");
    }
    let own = lifecycle::handle_get_star(&ctx.lifecycle, &ctx.owner, star.id)
        .await
        .unwrap();
    assert_eq!(own.star.star.status, StarStatus::Active);

    // Once formed, moderators see it
    lifecycle::handle_form_star(&ctx.lifecycle, &ctx.owner, star.id, vec![])
        .await
        .unwrap();
    let formed = lifecycle::handle_get_star(&ctx.lifecycle, &ctx.moderator, star.id)
        .await
        .unwrap();
    assert_eq!(formed.star.star.status, StarStatus::Formed);
}

#[tokio::test]
async fn test_lost_completion_race_writes_no_outputs() {
    let ctx = TestContext::with_persistence(
        Arc::new(DeclineWinsPersistence::new()),
        CalculationMode::Sync,
    )
    .await;
    let hubble = ctx.scope("Hubble").await;
    let star = lifecycle::handle_add_to_star(&ctx.lifecycle, &ctx.owner, hubble.id)
        .await
        .unwrap();
    lifecycle::handle_form_star(
        &ctx.lifecycle,
        &ctx.owner,
        star.id,
        vec![CalcEntry {
            scope_id: hubble.id,
            inputs: inputs(10.0, 100.0, 50.0),
        }],
    )
    .await
    .unwrap();

    let err = lifecycle::handle_finish_star(&ctx.lifecycle, &ctx.moderator, star.id, "completed")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let star = ctx.persistence.get_star(star.id).await.unwrap().unwrap();
    assert_eq!(star.status, StarStatus::Declined);
    let calc = ctx
        .persistence
        .get_calc(star.id, hubble.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.res_en, 0.0);
    assert_eq!(calc.res_ni, 0.0);
    assert_eq!(ctx.persistence.count_completed_calcs(star.id).await.unwrap(), 0);
}
