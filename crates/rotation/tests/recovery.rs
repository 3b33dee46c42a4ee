//! Crash recovery from the rotation journal

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use common::{FaultyStore, RecordingProvider, init_tracing, journal, manager, role, username};
use latchkey_rotation::{MAX_ROLE_NAME_LEN, RotationError, RotationIntent, SecureString};
use latchkey_storage::{FileStore, MemoryStore};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn crash_after_external_change_is_completed_on_restart() {
    init_tracing();
    // GIVEN a rotation whose role write failed after the provider succeeded
    let disk = Arc::new(MemoryStore::new());
    let faulty = FaultyStore::new(disk.clone());
    let provider = RecordingProvider::new();

    let first = manager(faulty.clone(), provider.clone());
    first.create_role(role("app", HOUR)).await.unwrap();
    let before = first.read_role("app").await.unwrap();

    faulty.fail_role_writes(true);
    let err = first
        .force_rotate("app", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RotationError::Storage { .. }));
    drop(first);

    let external = provider.password(&username("app")).unwrap();
    assert_ne!(external, before.current_secret.expose());
    assert_eq!(journal(disk.clone()).list().await.unwrap(), vec!["app"]);
    let updates = provider.update_count(&username("app"));

    // WHEN a fresh manager starts over the same store
    let second = manager(disk.clone(), provider.clone());
    let report = second.start().await.unwrap();

    // THEN the external secret is adopted without calling the provider again
    assert_eq!(report.completed, 1);
    assert_eq!(report.queued, 1);
    let credential = second.read_credential("app").await.unwrap();
    assert_eq!(credential.password.expose(), external);
    assert!(credential.last_rotation_time > before.last_rotation_time);
    assert_eq!(provider.update_count(&username("app")), updates);
    assert!(journal(disk).list().await.unwrap().is_empty());

    second.shutdown().await;
}

#[tokio::test]
async fn intent_for_missing_role_is_discarded() {
    let disk = Arc::new(MemoryStore::new());
    let ghost = role("ghost", HOUR).into_role();
    journal(disk.clone())
        .put(&RotationIntent::new(
            &ghost,
            SecureString::new("never-applied"),
            Utc::now(),
        ))
        .await
        .unwrap();

    let manager = manager(disk.clone(), RecordingProvider::new());
    let report = manager.start().await.unwrap();

    assert_eq!(report.orphaned, 1);
    assert_eq!(report.queued, 0);
    assert_eq!(manager.queue_len(), 0);
    assert!(journal(disk).list().await.unwrap().is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn stale_intent_is_discarded_twice_without_effect() {
    // GIVEN a rotated role and an intent from before that rotation
    let disk = Arc::new(MemoryStore::new());
    let provider = RecordingProvider::new();
    let setup = manager(disk.clone(), provider.clone());
    setup.create_role(role("app", HOUR)).await.unwrap();
    let current = setup.read_role("app").await.unwrap();
    drop(setup);

    let mut earlier = current.clone();
    earlier.last_rotation_time = current
        .last_rotation_time
        .map(|t| t - TimeDelta::hours(1));
    let stale = RotationIntent::new(&earlier, SecureString::new("outdated-secret"), Utc::now());

    for _ in 0..2 {
        journal(disk.clone()).put(&stale).await.unwrap();

        // WHEN a manager starts
        let manager = manager(disk.clone(), provider.clone());
        let report = manager.start().await.unwrap();

        // THEN the intent is dropped and the role is untouched
        assert_eq!(report.stale, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(manager.read_role("app").await.unwrap(), current);
        assert!(journal(disk.clone()).list().await.unwrap().is_empty());
        manager.shutdown().await;
    }
}

#[tokio::test]
async fn roles_survive_restart_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider::new();

    let first = manager(
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
        provider.clone(),
    );
    first.start().await.unwrap();
    first.create_role(role("app", HOUR)).await.unwrap();
    let before = first.read_credential("app").await.unwrap();
    first.shutdown().await;
    drop(first);

    let second = manager(
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
        provider.clone(),
    );
    let report = second.start().await.unwrap();

    assert_eq!(report.queued, 1);
    assert_eq!(report.replayed(), 0);
    let after = second.read_credential("app").await.unwrap();
    assert_eq!(after.password, before.password);
    assert_eq!(after.last_rotation_time, before.last_rotation_time);
    assert_eq!(
        second.scheduled_at("app"),
        before
            .last_rotation_time
            .map(|t| t + TimeDelta::hours(1))
    );

    second.shutdown().await;
}

#[tokio::test]
async fn longest_role_name_fits_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
        RecordingProvider::new(),
    );
    let name = "r".repeat(MAX_ROLE_NAME_LEN);

    manager.create_role(role(&name, HOUR)).await.unwrap();
    manager
        .force_rotate(&name, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(manager.list_roles().await.unwrap(), vec![name.clone()]);

    let err = manager
        .create_role(role(&format!("{name}r"), HOUR))
        .await
        .unwrap_err();
    assert!(matches!(err, RotationError::InvalidRole { .. }));
}

#[tokio::test(start_paused = true)]
async fn never_rotated_role_is_due_after_restart() {
    // GIVEN a role whose first rotation failed
    let disk = Arc::new(MemoryStore::new());
    let provider = RecordingProvider::new();
    provider.set_failing(true);
    let first = manager(disk.clone(), provider.clone());
    assert!(first.create_role(role("app", HOUR)).await.is_err());
    drop(first);
    provider.set_failing(false);

    // WHEN a new manager starts
    let second = manager(disk, provider.clone());
    let report = second.start().await.unwrap();
    assert_eq!(report.queued, 1);
    tokio::time::sleep(Duration::from_secs(2)).await;

    // THEN the first tick rotates it
    assert_eq!(provider.update_count(&username("app")), 1);
    assert!(
        second
            .read_role("app")
            .await
            .unwrap()
            .last_rotation_time
            .is_some()
    );
    second.shutdown().await;
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let manager = manager(Arc::new(MemoryStore::new()), RecordingProvider::new());
    manager.start().await.unwrap();
    assert!(matches!(
        manager.start().await,
        Err(RotationError::AlreadyStarted)
    ));

    manager.shutdown().await;
    manager.shutdown().await;
    assert!(matches!(
        manager.start().await,
        Err(RotationError::AlreadyStarted)
    ));
}
