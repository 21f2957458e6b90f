//! Integration tests for the intake service: submission, lookups, lifecycle.

use std::sync::Arc;
use std::time::Duration;

use intake_rs::config::WorkerConfig;
use intake_rs::error::Error;
use intake_rs::model::EventStatus;
use intake_rs::service::{IntakeService, SubmitResult};
use serde_json::json;
use tokio::sync::Barrier;

fn test_service(delay_ms: u64) -> IntakeService {
    bounded_service(delay_ms, 100)
}

fn bounded_service(delay_ms: u64, capacity: usize) -> IntakeService {
    IntakeService::new(WorkerConfig {
        processing_delay: Duration::from_millis(delay_ms),
        queue_capacity: capacity,
    })
}

async fn started_service(delay_ms: u64) -> IntakeService {
    let service = test_service(delay_ms);
    service.start_all().await;
    service
}

async fn wait_for_status(service: &IntakeService, id: &str, want: EventStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.get_status(id) != Some(want) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{id} never reached {want}"));
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accepted_event_is_immediately_visible() {
    let service = started_service(1000).await;

    let result = service.submit("evt_001", json!({"a": 1})).await.unwrap();
    match result {
        SubmitResult::Accepted(record) => {
            assert_eq!(record.event_id, "evt_001");
            assert_eq!(record.status, EventStatus::Accepted);
            assert_eq!(record.payload, json!({"a": 1}));
        }
        SubmitResult::Conflict { .. } => panic!("expected Accepted, got Conflict"),
    }

    assert_eq!(service.get_status("evt_001"), Some(EventStatus::Accepted));
}

#[tokio::test]
async fn repeated_submit_conflicts_without_new_record() {
    let service = started_service(1000).await;

    service.submit("evt_001", json!({"a": 1})).await.unwrap();
    let second = service.submit("evt_001", json!({"a": 2})).await.unwrap();

    assert_eq!(
        second,
        SubmitResult::Conflict {
            event_id: "evt_001".to_string(),
            status: EventStatus::Accepted,
        }
    );

    let all = service.list_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].payload, json!({"a": 1}));
}

#[tokio::test]
async fn empty_event_id_is_invalid_and_stores_nothing() {
    let service = started_service(0).await;

    let err = service.submit("", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(service.list_all().is_empty());
}

#[tokio::test]
async fn submit_before_start_is_unavailable() {
    let service = test_service(0);

    let err = service.submit("evt_early", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable));
    assert!(service.get("evt_early").is_none());
}

#[tokio::test]
async fn submit_after_shutdown_is_unavailable() {
    let service = started_service(0).await;
    service.shutdown_all().await.unwrap();

    let err = service.submit("evt_late", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable));
    assert!(service.list_all().is_empty());
}

#[tokio::test]
async fn restart_after_shutdown_keeps_intake_closed() {
    let service = started_service(0).await;
    service.shutdown_all().await.unwrap();

    service.start_all().await;
    assert!(!service.is_ready());

    let err = service.submit("evt_restart", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable));
    assert!(service.get("evt_restart").is_none());
}

#[tokio::test]
async fn second_start_all_keeps_intake_open() {
    let service = started_service(0).await;
    service.start_all().await;

    assert!(service.submit("evt_1", json!({})).await.unwrap().is_accepted());
    service.shutdown_all().await.unwrap();
    assert_eq!(service.get_status("evt_1"), Some(EventStatus::Processed));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_submit_on_full_queue_stores_nothing() {
    let service = bounded_service(200, 1);
    service.start_all().await;

    // "a" is being processed, "b" fills the only queue slot.
    service.submit("a", json!({})).await.unwrap();
    service.submit("b", json!({})).await.unwrap();

    let blocked =
        tokio::time::timeout(Duration::from_millis(20), service.submit("c", json!({}))).await;
    assert!(blocked.is_err(), "submit should wait on a full queue");
    assert_eq!(service.get_status("c"), None);

    // The abandoned attempt left no record behind, so a retry is accepted.
    let retry = tokio::time::timeout(Duration::from_secs(5), service.submit("c", json!({})))
        .await
        .expect("retry should complete once the worker frees a slot")
        .unwrap();
    assert!(retry.is_accepted());

    service.shutdown_all().await.unwrap();
    assert_eq!(service.get_status("c"), Some(EventStatus::Processed));
}

#[tokio::test]
async fn duplicate_on_full_queue_gives_the_slot_back() {
    let service = bounded_service(100, 1);
    service.start_all().await;

    service.submit("a", json!({})).await.unwrap();
    service.submit("b", json!({})).await.unwrap();

    // Waits for room like any other submit, then conflicts without queueing.
    let dup = tokio::time::timeout(Duration::from_secs(5), service.submit("b", json!({})))
        .await
        .unwrap()
        .unwrap();
    assert!(!dup.is_accepted());

    service.shutdown_all().await.unwrap();
    assert_eq!(service.list_all().len(), 2);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_accept_exactly_once() {
    const N: usize = 64;
    let service = Arc::new(started_service(0).await);
    let barrier = Arc::new(Barrier::new(N));

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                service.submit("same-key", json!({"attempt": i})).await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            SubmitResult::Accepted(_) => accepted += 1,
            SubmitResult::Conflict { .. } => conflicts += 1,
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(conflicts, N - 1);
    assert_eq!(service.list_all().len(), 1);

    service.shutdown_all().await.unwrap();
    assert_eq!(service.get_status("same-key"), Some(EventStatus::Processed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_keys_are_all_accepted() {
    let service = Arc::new(started_service(0).await);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.submit(format!("evt_{i}"), json!(i)).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_accepted());
    }

    service.shutdown_all().await.unwrap();
    let all = service.list_all();
    assert_eq!(all.len(), 32);
    assert!(all.iter().all(|e| e.status == EventStatus::Processed));
}

// ---------------------------------------------------------------------------
// Processing and shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accepted_event_is_eventually_processed() {
    let service = started_service(50).await;

    service.submit("evt_002", json!({})).await.unwrap();
    wait_for_status(&service, "evt_002", EventStatus::Processed).await;

    // Duplicate after processing reports the terminal status and changes nothing.
    let dup = service.submit("evt_002", json!({})).await.unwrap();
    assert_eq!(
        dup,
        SubmitResult::Conflict {
            event_id: "evt_002".to_string(),
            status: EventStatus::Processed,
        }
    );
    assert_eq!(service.get_status("evt_002"), Some(EventStatus::Processed));

    service.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn shutdown_drains_queued_events() {
    let service = started_service(20).await;

    for i in 0..5 {
        service.submit(format!("evt_{i}"), json!({"n": i})).await.unwrap();
    }
    service.shutdown_all().await.unwrap();

    assert!(!service.is_ready());
    let all = service.list_all();
    assert_eq!(all.len(), 5);
    assert!(all.iter().all(|e| e.status == EventStatus::Processed));
    assert!(all.iter().all(|e| e.processed_at.is_some()));
}

// ---------------------------------------------------------------------------
// Readiness and health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn readiness_tracks_worker_lifecycle() {
    let service = test_service(0);
    assert!(!service.is_ready());
    assert!(!service.readiness().ready);
    assert_eq!(service.readiness().status, "not ready");

    service.start_all().await;
    assert!(service.is_ready());
    assert_eq!(service.readiness().status, "ready");

    service.shutdown_all().await.unwrap();
    assert!(!service.is_ready());
}

#[tokio::test]
async fn health_reports_ok_and_uptime() {
    let service = test_service(0);
    let first = service.health();
    assert_eq!(first.status, "ok");

    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = service.health();
    assert!(second.uptime > first.uptime);
    assert_eq!(second.started_at, first.started_at);
}
