//! Integration tests for construction, release and cancellation

mod common;

use common::*;
use entity_repository::prelude::*;
use entity_repository::{Config, StoreError};
use std::sync::Arc;
use std::time::Duration;

// ===== Construction =====

#[tokio::test]
async fn test_construction_rejects_disposed_store() {
    print_test_header(
        "test_construction_rejects_disposed_store",
        &["A disposed session cannot back a repository."],
    );
    let db = seeded_database();
    let session = db.session();
    session.dispose();

    let err = Repository::<_, Employee>::new(session).expect_err("disposed store must fail");
    assert!(matches!(err, RepositoryError::InvalidArgument { argument: "store", .. }));
}

#[tokio::test]
async fn test_construction_validates_entity_type() {
    print_test_header(
        "test_construction_validates_entity_type",
        &[
            "An entity type unknown to the store is rejected.",
            "The check applies with any configuration.",
        ],
    );
    let db = seeded_database();

    let err = Repository::<_, Project>::new(db.session()).expect_err("unknown entity must fail");
    assert!(matches!(err, RepositoryError::InvalidArgument { argument: "entity", .. }));
    assert!(err.to_string().contains("Project"));

    let config = Config {
        default_tracking: Tracking::Untracked,
        stream_batch_size: 8,
    };
    let err = Repository::<_, Project>::with_config(db.session(), config)
        .expect_err("unknown entity must fail");
    assert!(matches!(err, RepositoryError::InvalidArgument { argument: "entity", .. }));
}

#[tokio::test]
async fn test_construction_rejects_invalid_config() {
    print_test_header(
        "test_construction_rejects_invalid_config",
        &["A zero stream batch size is rejected up front."],
    );
    let db = seeded_database();
    let config = Config {
        stream_batch_size: 0,
        ..Config::default()
    };

    let err = Repository::<_, Employee>::with_config(db.session(), config)
        .expect_err("zero batch size must fail");
    assert!(matches!(err, RepositoryError::InvalidArgument { argument: "config", .. }));
}

// ===== Release =====

#[tokio::test]
async fn test_release_is_idempotent() {
    print_test_header(
        "test_release_is_idempotent",
        &["Only the first release disposes the store; dropping afterwards is a no-op."],
    );
    let db = seeded_database();
    let (session, repo) = employee_repository(&db);

    assert!(repo.release());
    assert!(!repo.release());
    assert!(repo.is_released());
    assert!(repo.store().is_none());
    drop(repo);

    assert_eq!(session.dispose_count(), 1);
    assert!(session.is_disposed());
}

#[tokio::test]
async fn test_drop_releases_once() {
    print_test_header("test_drop_releases_once", &["Leaving scope disposes the store."]);
    let db = seeded_database();
    let session = db.session();
    {
        let _repo = Repository::<_, Employee>::new(Arc::clone(&session))
            .expect("Failed to create repository");
        assert!(!session.is_disposed());
    }
    assert_eq!(session.dispose_count(), 1);
}

#[tokio::test]
async fn test_error_exit_releases_store() {
    print_test_header(
        "test_error_exit_releases_store",
        &["An early return through `?` still disposes the store exactly once."],
    );
    let db = seeded_database();
    let session = db.session();
    let repo = Repository::<_, Employee>::new(Arc::clone(&session))
        .expect("Failed to create repository");

    let result: Result<(), RepositoryError> = async move {
        let cancel = CancellationToken::new();
        repo.all(None, &cancel).await?;
        Ok(())
    }
    .await;
    assert!(result.is_err());
    assert_eq!(session.dispose_count(), 1);
}

#[tokio::test]
async fn test_operations_after_release_fail() {
    print_test_header(
        "test_operations_after_release_fail",
        &["A released repository reports a disposed store for every operation."],
    );
    let db = seeded_database();
    let (_session, repo) = employee_repository(&db);
    let cancel = CancellationToken::new();
    repo.release();

    let err = repo
        .get_all(QuerySpec::new(), &cancel)
        .await
        .expect_err("released repository must fail");
    assert!(matches!(
        err,
        RepositoryError::Store {
            operation: "get_all",
            source: StoreError::Disposed
        }
    ));

    let err = repo
        .update(employee(1, "John", 3, 1, None))
        .expect_err("released repository must fail");
    assert!(matches!(err.store_error(), Some(StoreError::Disposed)));

    let err = repo
        .for_each(|_| {}, &cancel)
        .await
        .expect_err("released repository must fail");
    assert!(matches!(err.store_error(), Some(StoreError::Disposed)));
}

// ===== Cancellation =====

#[tokio::test]
async fn test_cancelled_before_dispatch() {
    print_test_header(
        "test_cancelled_before_dispatch",
        &["A token cancelled up front stops the operation before the store is called."],
    );
    let db = seeded_database();
    let (session, repo) = employee_repository(&db);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = repo
        .get_all(QuerySpec::tracked(), &cancel)
        .await
        .expect_err("cancelled operation must fail");
    assert!(err.is_cancelled());
    assert_eq!(session.tracked_count::<Employee>(), 0);

    let err = repo
        .add(employee(0, "Late", 1, 1, None), &cancel)
        .await
        .expect_err("cancelled operation must fail");
    assert!(matches!(err, RepositoryError::Cancelled { operation: "add" }));
    assert_eq!(session.tracked_count::<Employee>(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_during_round_trip() {
    print_test_header(
        "test_cancelled_during_round_trip",
        &[
            "The store takes one second per round trip.",
            "Cancelling after 10ms abandons the call without partial results.",
        ],
    );
    let db = seeded_database().with_latency(Duration::from_secs(1));
    let (session, repo) = employee_repository(&db);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = repo
        .get_all(QuerySpec::tracked(), &cancel)
        .await
        .expect_err("cancelled operation must fail");
    assert!(matches!(err, RepositoryError::Cancelled { operation: "get_all" }));
    assert_eq!(session.tracked_count::<Employee>(), 0);

    let (_other, patient) = employee_repository(&db);
    let rows = patient
        .get_all(QuerySpec::untracked(), &CancellationToken::new())
        .await
        .expect("Failed to get employees");
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn test_for_each_stops_when_cancelled() {
    print_test_header(
        "test_for_each_stops_when_cancelled",
        &["Cancelling from inside the action stops after the current batch."],
    );
    let db = seeded_database();
    let session = db.session();
    let config = Config {
        stream_batch_size: 2,
        ..Config::default()
    };
    let repo = Repository::<_, Employee>::with_config(Arc::clone(&session), config)
        .expect("Failed to create repository");
    let cancel = CancellationToken::new();

    let mut seen = Vec::new();
    let err = repo
        .for_each(
            |e: Employee| {
                seen.push(e.id);
                cancel.cancel();
            },
            &cancel,
        )
        .await
        .expect_err("cancelled iteration must fail");
    assert!(err.is_cancelled());
    assert_eq!(seen, vec![1, 2]);
}
