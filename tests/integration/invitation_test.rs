//! Integration tests for invitations: creation, redemption, and expiry.

mod helpers;

use chrono::Duration;

use booktracker_core::error::ErrorKind;
use booktracker_database::store::GrantStore;
use booktracker_entity::invitation::ChildPermission;
use booktracker_entity::permission::PermissionLevel;
use booktracker_entity::user::User;
use booktracker_service::InviteOutcome;

use helpers::{TestApp, new_user};

async fn owner_with_children(app: &TestApp, count: usize) -> (User, Vec<ChildPermission>) {
    let owner = app.create_test_user("owner@example.com").await;
    let mut pairs = Vec::with_capacity(count);
    for i in 0..count {
        let child = app.create_child(&owner, &format!("R{}", i + 1)).await;
        let level = if i % 2 == 0 {
            PermissionLevel::View
        } else {
            PermissionLevel::Edit
        };
        pairs.push(ChildPermission::new(child.id, level));
    }
    (owner, pairs)
}

#[tokio::test]
async fn test_bulk_invite_then_register() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 2).await;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite_bulk(&ctx, "a@x.com", &pairs)
        .await
        .unwrap();
    let token = outcome.token().expect("unregistered email is invited").to_string();
    assert_eq!(outcome.len(), 2);

    let pending = app.service.pending_invitations_for(&token).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|row| row.email == "a@x.com"));

    let registration = app
        .service
        .register_with_invitation(&token, &new_user("a@x.com"))
        .await
        .unwrap();
    assert_eq!(registration.grants.len(), 2);
    assert!(app.store.all_pending_for_email("a@x.com").await.is_empty());

    let ctx = app.service.begin_request(registration.user.id);
    assert!(app
        .service
        .authorize(&ctx, pairs[0].child_id, PermissionLevel::View)
        .await
        .unwrap());
    assert!(!app
        .service
        .authorize(&ctx, pairs[0].child_id, PermissionLevel::Edit)
        .await
        .unwrap());
    assert!(app
        .service
        .authorize(&ctx, pairs[1].child_id, PermissionLevel::Edit)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_bulk_invite_is_all_or_nothing() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 4).await;
    let ctx = app.service.begin_request(owner.id);

    let earlier = app
        .service
        .invite(&ctx, "b@x.com", pairs[0].child_id, PermissionLevel::View)
        .await
        .unwrap();

    app.store.fail_pending_insert_on(3);
    let err = app
        .service
        .invite_bulk(&ctx, "b@x.com", &pairs)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);

    // The earlier invitation survives the failed replacement.
    let rows = app.store.all_pending_for_email("b@x.com").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(Some(rows[0].token.as_str()), earlier.token());
}

#[tokio::test]
async fn test_invitation_redeems_exactly_once() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 1).await;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite(&ctx, "c@x.com", pairs[0].child_id, PermissionLevel::Edit)
        .await
        .unwrap();
    let token = outcome.token().unwrap().to_string();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = app.service.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            service
                .register_with_invitation(&token, &new_user("c@x.com"))
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(registration) => {
                assert_eq!(registration.grants.len(), 1);
                succeeded += 1;
            }
            Err(err) => assert_eq!(err.kind, ErrorKind::NotFound),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(app.store.grants_for_child(pairs[0].child_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_redemption_leaves_invitation_intact() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 3).await;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite_bulk(&ctx, "d@x.com", &pairs)
        .await
        .unwrap();
    let token = outcome.token().unwrap().to_string();

    app.store.fail_grant_upsert_on(2);
    let err = app
        .service
        .register_with_invitation(&token, &new_user("d@x.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    assert_eq!(app.store.all_pending_for_email("d@x.com").await.len(), 3);

    let registration = app
        .service
        .register_with_invitation(&token, &new_user("d@x.com"))
        .await
        .unwrap();
    assert_eq!(registration.grants.len(), 3);
}

#[tokio::test]
async fn test_expired_invitation_is_not_found() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 1).await;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite(&ctx, "e@x.com", pairs[0].child_id, PermissionLevel::View)
        .await
        .unwrap();
    let token = outcome.token().unwrap().to_string();

    app.clock.advance(Duration::days(8));

    let err = app.service.pending_invitations_for(&token).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = app
        .service
        .register_with_invitation(&token, &new_user("e@x.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_redeem_for_existing_account() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 2).await;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite_bulk(&ctx, "f@x.com", &pairs)
        .await
        .unwrap();
    let token = outcome.token().unwrap().to_string();

    let user = app.create_test_user("f@x.com").await;
    let applied = app
        .service
        .redeem_invitation(&token, user.id, "F@X.com")
        .await
        .unwrap();
    assert_eq!(applied, 2);
    assert_eq!(app.store.grants_for_user(user.id).await.len(), 2);

    let err = app
        .service
        .redeem_invitation(&token, user.id, "f@x.com")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_redeem_rejects_accounts_other_than_the_invitee() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 1).await;
    let child_id = pairs[0].child_id;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite(&ctx, "j@x.com", child_id, PermissionLevel::View)
        .await
        .unwrap();
    let token = outcome.token().unwrap().to_string();
    let bystander = app.create_test_user("bystander@x.com").await;

    for user_id in [owner.id, bystander.id] {
        let err = app
            .service
            .redeem_invitation(&token, user_id, "j@x.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    assert!(app.store.grants_for_child(child_id).await.unwrap().is_empty());
    assert!(app.store.grants_for_user(owner.id).await.is_empty());
    assert_eq!(app.store.all_pending_for_email("j@x.com").await.len(), 1);

    let invitee = app.create_test_user("j@x.com").await;
    let applied = app
        .service
        .redeem_invitation(&token, invitee.id, "j@x.com")
        .await
        .unwrap();
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn test_register_with_wrong_email_is_rejected() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 1).await;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite(&ctx, "g@x.com", pairs[0].child_id, PermissionLevel::View)
        .await
        .unwrap();
    let token = outcome.token().unwrap().to_string();

    let err = app
        .service
        .register_with_invitation(&token, &new_user("someone-else@x.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(app.store.all_pending_for_email("g@x.com").await.len(), 1);
}

#[tokio::test]
async fn test_reinvite_replaces_token() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 1).await;
    let child_id = pairs[0].child_id;
    let ctx = app.service.begin_request(owner.id);

    let first = app
        .service
        .invite(&ctx, "h@x.com", child_id, PermissionLevel::View)
        .await
        .unwrap();
    let second = app
        .service
        .invite(&ctx, "h@x.com", child_id, PermissionLevel::Edit)
        .await
        .unwrap();
    assert_ne!(first.token(), second.token());

    let err = app
        .service
        .pending_invitations_for(first.token().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let rows = app
        .service
        .pending_invitations_for_child(&ctx, child_id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].level, PermissionLevel::Edit);
}

#[tokio::test]
async fn test_invite_unknown_child_is_not_found() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let ctx = app.service.begin_request(owner.id);

    let err = app
        .service
        .invite(
            &ctx,
            "i@x.com",
            booktracker_core::types::ChildId::new(),
            PermissionLevel::View,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_sweep_removes_only_expired() {
    let app = TestApp::new();
    let (owner, pairs) = owner_with_children(&app, 3).await;
    let ctx = app.service.begin_request(owner.id);

    app.service
        .invite_bulk(&ctx, "old@x.com", &pairs)
        .await
        .unwrap();
    app.clock.advance(Duration::days(5));
    let fresh = app
        .service
        .invite(&ctx, "new@x.com", pairs[0].child_id, PermissionLevel::View)
        .await
        .unwrap();
    app.clock.advance(Duration::days(3));

    assert_eq!(app.service.sweep_expired_invitations().await.unwrap(), 3);
    assert_eq!(app.service.sweep_expired_invitations().await.unwrap(), 0);

    let rows = app
        .service
        .pending_invitations_for(fresh.token().unwrap())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(matches!(fresh, InviteOutcome::Invited { .. }));
}
