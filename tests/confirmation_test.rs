//! Confirmation key lifecycle against in-memory storage

mod common;

use common::TestConfirmationRepository;
use pretty_assertions::assert_eq;
use rollcall_core::domain::{ConfirmationKind, ConfirmationStatus, ObjectId, RealmId};
use rollcall_core::error::{AppError, ConfirmationError};
use rollcall_core::service::confirmation::{hash_key, is_well_formed_key};
use rollcall_core::service::ConfirmationManager;
use std::sync::Arc;

fn manager() -> (
    Arc<TestConfirmationRepository>,
    ConfirmationManager<TestConfirmationRepository>,
) {
    let repo = Arc::new(TestConfirmationRepository::new());
    (repo.clone(), ConfirmationManager::new(repo))
}

fn confirmation_error(result: rollcall_core::Result<impl std::fmt::Debug>) -> ConfirmationError {
    match result {
        Err(AppError::Confirmation(e)) => e,
        other => panic!("expected a confirmation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_issued_key_is_stored_as_digest_only() {
    let (repo, manager) = manager();
    let issued = manager
        .issue(
            ConfirmationKind::Invitation,
            ObjectId::new_v4(),
            RealmId::new_v4(),
            Some(60),
        )
        .await
        .unwrap();

    assert!(is_well_formed_key(&issued.key));
    let stored = repo.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].key_hash, hash_key(&issued.key));
    assert_ne!(stored[0].key_hash, issued.key);
    assert_eq!(stored[0].status, ConfirmationStatus::Pending);
}

#[tokio::test]
async fn test_single_use_key_is_consumed_once() {
    let (_, manager) = manager();
    let object_id = ObjectId::new_v4();
    let issued = manager
        .issue(ConfirmationKind::UserRegistration, object_id, RealmId::new_v4(), Some(60))
        .await
        .unwrap();

    let peeked = manager
        .resolve(&issued.key, &[ConfirmationKind::UserRegistration], false)
        .await
        .unwrap();
    assert_eq!(peeked.status, ConfirmationStatus::Pending);

    let used = manager
        .resolve(&issued.key, &[ConfirmationKind::UserRegistration], true)
        .await
        .unwrap();
    assert_eq!(used.object_id, object_id);
    assert_eq!(used.status, ConfirmationStatus::Used);

    let again = manager
        .resolve(&issued.key, &[ConfirmationKind::UserRegistration], true)
        .await;
    assert_eq!(confirmation_error(again), ConfirmationError::Expired);
}

#[tokio::test]
async fn test_concurrent_redemption_succeeds_exactly_once() {
    let (repo, manager) = manager();
    let issued = manager
        .issue(ConfirmationKind::Invitation, ObjectId::new_v4(), RealmId::new_v4(), None)
        .await
        .unwrap();

    let kinds = [ConfirmationKind::Invitation];
    let (first, second) = tokio::join!(
        manager.resolve(&issued.key, &kinds, true),
        manager.resolve(&issued.key, &kinds, true),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for outcome in outcomes.into_iter().filter(|r| r.is_err()) {
        assert_eq!(confirmation_error(outcome), ConfirmationError::Expired);
    }
    assert_eq!(repo.all().await[0].status, ConfirmationStatus::Used);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemption_across_threads() {
    let (_, manager) = manager();
    let manager = Arc::new(manager);
    let issued = manager
        .issue(ConfirmationKind::Invitation, ObjectId::new_v4(), RealmId::new_v4(), Some(60))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let key = issued.key.clone();
            tokio::spawn(async move {
                manager
                    .resolve(&key, &[ConfirmationKind::Invitation], true)
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_key_without_validity_never_expires() {
    let (repo, manager) = manager();
    let issued = manager
        .issue(ConfirmationKind::Invitation, ObjectId::new_v4(), RealmId::new_v4(), None)
        .await
        .unwrap();

    assert!(issued.confirmation.expires_at.is_none());
    assert!(repo.all().await[0].expires_at.is_none());
    assert!(manager
        .resolve(&issued.key, &[ConfirmationKind::Invitation], false)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_expired_key_is_rejected() {
    let (repo, manager) = manager();
    let object_id = ObjectId::new_v4();
    let issued = manager
        .issue(ConfirmationKind::Invitation, object_id, RealmId::new_v4(), Some(60))
        .await
        .unwrap();
    repo.expire_object(object_id).await;

    let result = manager
        .resolve(&issued.key, &[ConfirmationKind::Invitation], true)
        .await;
    assert_eq!(confirmation_error(result), ConfirmationError::Expired);
    assert_eq!(repo.all().await[0].status, ConfirmationStatus::Pending);
}

#[tokio::test]
async fn test_wrong_kind_looks_like_missing_key() {
    let (_, manager) = manager();
    let issued = manager
        .issue(ConfirmationKind::EmailChange, ObjectId::new_v4(), RealmId::new_v4(), Some(60))
        .await
        .unwrap();

    let result = manager
        .resolve(
            &issued.key,
            &[ConfirmationKind::UserRegistration, ConfirmationKind::Invitation],
            true,
        )
        .await;
    assert_eq!(confirmation_error(result), ConfirmationError::NotFound);

    // Still usable for its own purpose
    assert!(manager
        .resolve(&issued.key, &[ConfirmationKind::EmailChange], true)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_malformed_and_unknown_keys() {
    let (_, manager) = manager();
    let kinds = [ConfirmationKind::Invitation];

    for garbage in ["", "short", "not a key at all!!!!!!!!!", "ABCDEFGHIJKLMNOPQRSTUVWX"] {
        let result = manager.resolve(garbage, &kinds, false).await;
        assert_eq!(confirmation_error(result), ConfirmationError::Malformed);
    }

    let unknown = "abcdefghijklmnopqrstuvwx";
    let result = manager.resolve(unknown, &kinds, false).await;
    assert_eq!(confirmation_error(result), ConfirmationError::NotFound);
}

#[tokio::test]
async fn test_multi_use_key_is_never_consumed() {
    let (repo, manager) = manager();
    let issued = manager
        .issue(ConfirmationKind::MultiuseInvite, ObjectId::new_v4(), RealmId::new_v4(), None)
        .await
        .unwrap();

    for _ in 0..3 {
        let resolved = manager
            .resolve(&issued.key, &[ConfirmationKind::MultiuseInvite], true)
            .await
            .unwrap();
        assert_eq!(resolved.status, ConfirmationStatus::Pending);
    }
    assert_eq!(repo.all().await[0].status, ConfirmationStatus::Pending);
}

#[tokio::test]
async fn test_revoke_is_not_repeatable() {
    let (_, manager) = manager();
    let object_id = ObjectId::new_v4();
    let issued = manager
        .issue(ConfirmationKind::MultiuseInvite, object_id, RealmId::new_v4(), None)
        .await
        .unwrap();

    assert_eq!(
        manager
            .revoke(ConfirmationKind::MultiuseInvite, object_id)
            .await
            .unwrap(),
        1
    );

    let again = manager.revoke(ConfirmationKind::MultiuseInvite, object_id).await;
    assert_eq!(confirmation_error(again), ConfirmationError::AlreadyRevoked);

    let resolved = manager
        .resolve(&issued.key, &[ConfirmationKind::MultiuseInvite], false)
        .await;
    assert_eq!(confirmation_error(resolved), ConfirmationError::Expired);
}

#[tokio::test]
async fn test_revoke_unknown_or_used_target() {
    let (_, manager) = manager();

    let missing = manager
        .revoke(ConfirmationKind::Invitation, ObjectId::new_v4())
        .await;
    assert_eq!(confirmation_error(missing), ConfirmationError::NotFound);

    let object_id = ObjectId::new_v4();
    let issued = manager
        .issue(ConfirmationKind::Invitation, object_id, RealmId::new_v4(), Some(60))
        .await
        .unwrap();
    manager
        .resolve(&issued.key, &[ConfirmationKind::Invitation], true)
        .await
        .unwrap();

    let used = manager.revoke(ConfirmationKind::Invitation, object_id).await;
    assert_eq!(confirmation_error(used), ConfirmationError::Expired);
}

#[tokio::test]
async fn test_revoke_covers_every_open_key_of_target() {
    let (_, manager) = manager();
    let object_id = ObjectId::new_v4();
    let realm_id = RealmId::new_v4();
    let first = manager
        .issue(ConfirmationKind::Invitation, object_id, realm_id, Some(60))
        .await
        .unwrap();
    let second = manager
        .issue(ConfirmationKind::Invitation, object_id, realm_id, Some(60))
        .await
        .unwrap();
    assert_ne!(first.key, second.key);

    assert_eq!(
        manager
            .revoke(ConfirmationKind::Invitation, object_id)
            .await
            .unwrap(),
        2
    );
    assert!(manager
        .list_open(realm_id, ConfirmationKind::Invitation)
        .await
        .unwrap()
        .is_empty());
}
