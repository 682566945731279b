mod common;

use common::{RecordingBroker, ScriptedStorage, ScriptedTrainer, delivery, job_body, test_config};
use kestrel_orchestrator::{JobOrchestrator, TransportError, Worker};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn worker(root: &std::path::Path, broker: Arc<RecordingBroker>) -> Worker {
    let orchestrator = JobOrchestrator::new(
        &test_config(root),
        broker,
        Arc::new(ScriptedStorage::default()),
        Arc::new(ScriptedTrainer::default()),
    );
    Worker::new(orchestrator, Duration::from_millis(5))
}

#[tokio::test]
async fn test_job_failures_do_not_stop_the_loop() {
    let temp = TempDir::new().unwrap();
    let broker = Arc::new(RecordingBroker::with_deliveries(vec![
        delivery(1, b"garbage".to_vec()),
        delivery(2, job_body("ds1", 3)),
        delivery(3, job_body("ds2", 10)),
    ]));

    let handled = worker(temp.path(), broker.clone())
        .run(std::future::pending(), Some(3))
        .await
        .unwrap();

    assert_eq!(handled, 3);
    assert_eq!(broker.acks(), vec![1, 2, 3]);
    let statuses: Vec<_> = broker
        .published()
        .iter()
        .map(|p| p.payload["data"]["status"].clone())
        .collect();
    assert_eq!(statuses, vec!["failed", "failed", "uploaded"]);
}

#[tokio::test]
async fn test_shutdown_while_idle() {
    let temp = TempDir::new().unwrap();
    let broker = Arc::new(RecordingBroker::default());

    let shutdown = tokio::time::sleep(Duration::from_millis(30));
    let handled = worker(temp.path(), broker.clone())
        .run(shutdown, None)
        .await
        .unwrap();

    assert_eq!(handled, 0);
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn test_once_mode_leaves_remaining_deliveries() {
    let temp = TempDir::new().unwrap();
    let broker = Arc::new(RecordingBroker::with_deliveries(vec![
        delivery(1, job_body("ds1", 10)),
        delivery(2, job_body("ds2", 10)),
    ]));

    let handled = worker(temp.path(), broker.clone())
        .run(std::future::pending(), Some(1))
        .await
        .unwrap();

    assert_eq!(handled, 1);
    assert_eq!(broker.acks(), vec![1]);
    assert_eq!(broker.pending(), 1);
}

#[tokio::test]
async fn test_transport_error_stops_the_worker() {
    let temp = TempDir::new().unwrap();
    let deliveries = vec![
        delivery(1, job_body("ds1", 10)),
        delivery(2, job_body("ds2", 10)),
    ];
    let broker = Arc::new(RecordingBroker {
        fail_publish: true,
        ..RecordingBroker::with_deliveries(deliveries)
    });

    let err = worker(temp.path(), broker.clone())
        .run(std::future::pending(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Publish { .. }));
    assert!(broker.acks().is_empty());
    assert_eq!(broker.pending(), 1);
}
