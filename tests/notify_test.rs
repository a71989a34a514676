mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use borrowline::domain::{Amount, DomainEvent};
use borrowline::notify::{Dispatcher, Notifier, NotifyError};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use common::{pending, person_with_account, test_engine};

#[derive(Default)]
struct RecordingNotifier {
    received: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, destination: &str, payload: &Value) -> Result<(), NotifyError> {
        self.received
            .lock()
            .await
            .push((destination.to_string(), payload.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct FailingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _destination: &str, _payload: &Value) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Status(503))
    }
}

#[tokio::test]
async fn test_dispatcher_delivers_and_marks_events() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    person_with_account(repo, "Alice", "DE001", "400.00").await?;
    person_with_account(repo, "Bob", "DE002", "600.00").await?;
    pending(repo, "DE001", "DE002", "100.00").await?;
    let report = engine.run_nightly().await;
    assert!(report.is_success());

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(repo.clone(), notifier.clone(), "https://hooks.test/events")
        .with_batch_size(2);

    let queued = repo.list_outbox().await?.len();
    let summary = dispatcher.dispatch_pending().await?;
    assert_eq!(summary.delivered, queued);
    assert_eq!(summary.failed, 0);

    let received = notifier.received.lock().await;
    assert_eq!(received.len(), queued);
    assert!(received.iter().all(|(dest, _)| dest == "https://hooks.test/events"));
    let events: Vec<_> = received
        .iter()
        .map(|(_, payload)| payload["event"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(events.contains(&"account.updated".to_string()));
    assert!(events.contains(&"net_worth.updated".to_string()));
    assert!(events.contains(&"borrowing_capacity.updated".to_string()));
    drop(received);

    assert!(repo.list_outbox().await?.iter().all(|e| e.delivered_at.is_some()));

    // Nothing left to send
    let again = dispatcher.dispatch_pending().await?;
    assert_eq!(again.delivered, 0);

    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_is_retried_until_attempts_run_out() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    engine.settle_pending().await?;
    assert_eq!(repo.list_outbox().await?.len(), 1);

    let notifier = Arc::new(FailingNotifier::default());
    let dispatcher = Dispatcher::new(repo.clone(), notifier.clone(), "https://hooks.test")
        .with_max_attempts(3);

    for _ in 0..5 {
        let summary = dispatcher.dispatch_pending().await?;
        assert_eq!(summary.delivered, 0);
    }

    assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
    let entry = &repo.list_outbox().await?[0];
    assert_eq!(entry.attempts, 3);
    assert!(entry.delivered_at.is_none());
    assert!(entry.last_error.as_deref().unwrap_or_default().contains("503"));

    Ok(())
}

/// Rejects every payload about one person.
struct RejectPersonNotifier {
    person_id: i64,
}

#[async_trait]
impl Notifier for RejectPersonNotifier {
    async fn notify(&self, _destination: &str, payload: &Value) -> Result<(), NotifyError> {
        if payload["person_id"] == self.person_id {
            return Err(NotifyError::Status(400));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_entry_does_not_block_later_entries() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    let events: Vec<_> = (1..=3)
        .map(|person_id| DomainEvent::NetWorthUpdated {
            person_id,
            net_worth: Amount::from_cents(person_id * 100),
        })
        .collect();
    repo.enqueue_events(&events, Utc::now()).await?;

    let dispatcher = Dispatcher::new(
        repo.clone(),
        Arc::new(RejectPersonNotifier { person_id: 1 }),
        "https://hooks.test",
    )
    .with_batch_size(1);

    let summary = dispatcher.dispatch_pending().await?;
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.failed, 1);

    let undelivered: Vec<_> = repo
        .list_outbox()
        .await?
        .into_iter()
        .filter(|entry| entry.delivered_at.is_none())
        .collect();
    assert_eq!(undelivered.len(), 1);
    assert_eq!(undelivered[0].payload["person_id"], 1);

    // The next pass only retries the rejected entry
    let summary = dispatcher.dispatch_pending().await?;
    assert_eq!(summary.delivered, 0);
    assert_eq!(summary.failed, 1);

    Ok(())
}

#[tokio::test]
async fn test_notifier_failure_never_fails_a_run() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();
    let (alice, _) = person_with_account(repo, "Alice", "DE001", "400.00").await?;

    let dispatcher = Arc::new(Dispatcher::new(
        repo.clone(),
        Arc::new(FailingNotifier::default()),
        "https://hooks.test",
    ));

    let report = engine
        .trigger(&borrowline::TriggerRequest::new(3, Some(alice.id)))
        .await;
    dispatcher.clone().spawn().await?;

    assert!(report.is_success());
    assert!(engine.borrowing_record(alice.id).await?.is_some());

    Ok(())
}
