//! Integration tests for authorization, sharing, and the per-request cache.

mod helpers;

use booktracker_core::error::ErrorKind;
use booktracker_core::types::ChildId;
use booktracker_database::store::GrantStore;
use booktracker_entity::invitation::ChildPermission;
use booktracker_entity::permission::PermissionLevel;
use booktracker_service::InviteOutcome;

use helpers::TestApp;

#[tokio::test]
async fn test_owner_is_always_authorized() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let child = app.create_child(&owner, "Ada").await;
    let ctx = app.service.begin_request(owner.id);

    for level in PermissionLevel::ALL {
        assert!(app.service.authorize(&ctx, child.id, level).await.unwrap());
    }
}

#[tokio::test]
async fn test_grant_then_upgrade_scenario() {
    let app = TestApp::new();
    let u1 = app.create_test_user("u1@example.com").await;
    let p2 = app.create_test_user("p2@example.com").await;
    let r1 = app.create_child(&u1, "R1").await;

    let owner_ctx = app.service.begin_request(u1.id);
    app.service
        .grant(&owner_ctx, p2.id, r1.id, PermissionLevel::View)
        .await
        .unwrap();

    let ctx = app.service.begin_request(p2.id);
    assert!(app.service.authorize(&ctx, r1.id, PermissionLevel::View).await.unwrap());
    assert!(!app.service.authorize(&ctx, r1.id, PermissionLevel::Edit).await.unwrap());

    let upgraded = app
        .service
        .grant(&owner_ctx, p2.id, r1.id, PermissionLevel::Edit)
        .await
        .unwrap();
    assert_eq!(upgraded.level, PermissionLevel::Edit);
    assert_eq!(app.store.grants_for_child(r1.id).await.unwrap().len(), 1);

    let ctx = app.service.begin_request(p2.id);
    assert!(app.service.authorize(&ctx, r1.id, PermissionLevel::Edit).await.unwrap());
}

#[tokio::test]
async fn test_stranger_is_denied_without_error() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let stranger = app.create_test_user("stranger@example.com").await;
    let child = app.create_child(&owner, "Ada").await;
    let ctx = app.service.begin_request(stranger.id);

    assert!(!app.service.authorize(&ctx, child.id, PermissionLevel::View).await.unwrap());
    assert!(!app.service.authorize(&ctx, child.id, PermissionLevel::Edit).await.unwrap());

    let err = app
        .service
        .require(&ctx, child.id, PermissionLevel::View)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_unknown_child_is_not_found() {
    let app = TestApp::new();
    let user = app.create_test_user("user@example.com").await;
    let ctx = app.service.begin_request(user.id);

    let err = app
        .service
        .authorize(&ctx, ChildId::new(), PermissionLevel::View)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_repeated_checks_hit_the_request_cache() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let child = app.create_child(&owner, "Ada").await;
    let ctx = app.service.begin_request(owner.id);

    app.service.authorize(&ctx, child.id, PermissionLevel::View).await.unwrap();
    let reads = app.store.grant_reads();
    for _ in 0..10 {
        app.service.authorize(&ctx, child.id, PermissionLevel::View).await.unwrap();
    }
    assert_eq!(app.store.grant_reads(), reads);

    // A new request starts cold.
    let fresh = app.service.begin_request(owner.id);
    app.service.authorize(&fresh, child.id, PermissionLevel::View).await.unwrap();
    assert!(app.store.grant_reads() > reads);
}

#[tokio::test]
async fn test_filter_authorized_keeps_order() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let reader = app.create_test_user("reader@example.com").await;
    let a = app.create_child(&owner, "A").await;
    let b = app.create_child(&owner, "B").await;
    let c = app.create_child(&owner, "C").await;

    let owner_ctx = app.service.begin_request(owner.id);
    app.service
        .grant(&owner_ctx, reader.id, a.id, PermissionLevel::View)
        .await
        .unwrap();
    app.service
        .grant(&owner_ctx, reader.id, c.id, PermissionLevel::Edit)
        .await
        .unwrap();

    let ctx = app.service.begin_request(reader.id);
    let visible = app
        .service
        .filter_authorized(&ctx, &[a.id, b.id, c.id], PermissionLevel::View)
        .await
        .unwrap();
    assert_eq!(visible, vec![a.id, c.id]);

    let editable = app
        .service
        .filter_authorized(&ctx, &[a.id, b.id, c.id], PermissionLevel::Edit)
        .await
        .unwrap();
    assert_eq!(editable, vec![c.id]);
    assert_eq!(ctx.permissions().len().await, 6);
}

#[tokio::test]
async fn test_only_owner_can_share() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let editor = app.create_test_user("editor@example.com").await;
    let other = app.create_test_user("other@example.com").await;
    let child = app.create_child(&owner, "Ada").await;

    let owner_ctx = app.service.begin_request(owner.id);
    app.service
        .grant(&owner_ctx, editor.id, child.id, PermissionLevel::Edit)
        .await
        .unwrap();

    let ctx = app.service.begin_request(editor.id);
    let err = app
        .service
        .grant(&ctx, other.id, child.id, PermissionLevel::View)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);

    let err = app
        .service
        .invite(&ctx, "new@example.com", child.id, PermissionLevel::View)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_owner_cannot_be_granted() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let child = app.create_child(&owner, "Ada").await;
    let ctx = app.service.begin_request(owner.id);

    let err = app
        .service
        .grant(&ctx, owner.id, child.id, PermissionLevel::View)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let err = app
        .service
        .invite(&ctx, "OWNER@example.com", child.id, PermissionLevel::Edit)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(app.store.grants_for_child(child.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invite_registered_email_grants_directly() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let friend = app.create_test_user("friend@example.com").await;
    let r1 = app.create_child(&owner, "R1").await;
    let r2 = app.create_child(&owner, "R2").await;
    let ctx = app.service.begin_request(owner.id);

    let outcome = app
        .service
        .invite_bulk(
            &ctx,
            "Friend@Example.com",
            &[
                ChildPermission::new(r1.id, PermissionLevel::View),
                ChildPermission::new(r2.id, PermissionLevel::Edit),
            ],
        )
        .await
        .unwrap();

    assert!(matches!(outcome, InviteOutcome::Granted { .. }));
    assert_eq!(outcome.len(), 2);
    assert!(outcome.token().is_none());
    assert!(app.store.all_pending_for_email("friend@example.com").await.is_empty());

    let friend_ctx = app.service.begin_request(friend.id);
    assert!(app.service.authorize(&friend_ctx, r2.id, PermissionLevel::Edit).await.unwrap());
}

#[tokio::test]
async fn test_grant_invalidates_the_acting_request_cache() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let reader = app.create_test_user("reader@example.com").await;
    let child = app.create_child(&owner, "Ada").await;
    let ctx = app.service.begin_request(owner.id);

    app.service.list_permissions(&ctx, child.id).await.unwrap();
    assert!(!ctx.permissions().is_empty().await);

    app.service
        .grant(&ctx, reader.id, child.id, PermissionLevel::View)
        .await
        .unwrap();
    assert!(ctx.permissions().is_empty().await);
}

#[tokio::test]
async fn test_list_permissions_requires_edit() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let viewer = app.create_test_user("viewer@example.com").await;
    let editor = app.create_test_user("editor@example.com").await;
    let child = app.create_child(&owner, "Ada").await;

    let owner_ctx = app.service.begin_request(owner.id);
    app.service
        .grant(&owner_ctx, viewer.id, child.id, PermissionLevel::View)
        .await
        .unwrap();
    app.service
        .grant(&owner_ctx, editor.id, child.id, PermissionLevel::Edit)
        .await
        .unwrap();

    let viewer_ctx = app.service.begin_request(viewer.id);
    let err = app
        .service
        .list_permissions(&viewer_ctx, child.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Forbidden);

    let editor_ctx = app.service.begin_request(editor.id);
    let grants = app.service.list_permissions(&editor_ctx, child.id).await.unwrap();
    assert_eq!(grants.len(), 2);
}

#[tokio::test]
async fn test_revoke_permission_by_id() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let reader = app.create_test_user("reader@example.com").await;
    let child = app.create_child(&owner, "Ada").await;
    let ctx = app.service.begin_request(owner.id);

    let grant = app
        .service
        .grant(&ctx, reader.id, child.id, PermissionLevel::View)
        .await
        .unwrap();
    app.service.revoke_permission(&ctx, grant.id).await.unwrap();

    let reader_ctx = app.service.begin_request(reader.id);
    assert!(!app
        .service
        .authorize(&reader_ctx, child.id, PermissionLevel::View)
        .await
        .unwrap());

    let err = app.service.revoke_permission(&ctx, grant.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_revoke_access_by_pair() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let reader = app.create_test_user("reader@example.com").await;
    let child = app.create_child(&owner, "Ada").await;
    let ctx = app.service.begin_request(owner.id);

    app.service
        .grant(&ctx, reader.id, child.id, PermissionLevel::Edit)
        .await
        .unwrap();
    app.service.revoke_access(&ctx, reader.id, child.id).await.unwrap();
    assert!(app.store.grants_for_user(reader.id).await.is_empty());

    let err = app
        .service
        .revoke_access(&ctx, reader.id, child.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_accessible_children() {
    let app = TestApp::new();
    let owner = app.create_test_user("owner@example.com").await;
    let reader = app.create_test_user("reader@example.com").await;
    let own = app.create_child(&reader, "Own").await;
    let shared = app.create_child(&owner, "Shared").await;
    app.create_child(&owner, "Private").await;

    let owner_ctx = app.service.begin_request(owner.id);
    app.service
        .grant(&owner_ctx, reader.id, shared.id, PermissionLevel::View)
        .await
        .unwrap();

    let ctx = app.service.begin_request(reader.id);
    let mut ids: Vec<ChildId> = app
        .service
        .accessible_children(&ctx)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    ids.sort_by_key(|id| id.into_uuid());
    let mut expected = vec![own.id, shared.id];
    expected.sort_by_key(|id| id.into_uuid());
    assert_eq!(ids, expected);
}
