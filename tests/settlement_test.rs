mod common;

use anyhow::Result;
use borrowline::application::EngineError;
use borrowline::domain::ClaimToken;
use borrowline::storage::SettleOutcome;
use chrono::Utc;
use common::{amount, balance, pending, person_with_account, test_engine};

#[tokio::test]
async fn test_settlement_moves_amount_and_marks_processed() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    person_with_account(repo, "Alice", "DE001", "400.00").await?;
    person_with_account(repo, "Bob", "DE002", "600.00").await?;
    let txn = pending(repo, "DE001", "DE002", "100.00").await?;

    let summary = engine.settle_pending().await?;

    assert_eq!(summary.settled, vec![txn.id]);
    assert_eq!(summary.updated_accounts.len(), 2);
    assert_eq!(balance(repo, "DE001").await?, amount("300.00"));
    assert_eq!(balance(repo, "DE002").await?, amount("700.00"));

    let stored = repo.get_transaction(txn.id).await?.unwrap();
    assert!(stored.processed);
    assert!(stored.processed_at.is_some());

    Ok(())
}

#[tokio::test]
async fn test_second_pass_changes_nothing() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    person_with_account(repo, "Alice", "DE001", "400.00").await?;
    person_with_account(repo, "Bob", "DE002", "600.00").await?;
    pending(repo, "DE001", "DE002", "100.00").await?;
    pending(repo, "DE002", "DE001", "25.50").await?;

    engine.settle_pending().await?;
    let again = engine.settle_pending().await?;

    assert!(again.is_empty());
    assert_eq!(balance(repo, "DE001").await?, amount("325.50"));
    assert_eq!(balance(repo, "DE002").await?, amount("674.50"));
    assert_eq!(repo.count_pending().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_settled_transaction_cannot_be_applied_again() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    person_with_account(repo, "Alice", "DE001", "400.00").await?;
    person_with_account(repo, "Bob", "DE002", "600.00").await?;
    pending(repo, "DE001", "DE002", "100.00").await?;

    let first = ClaimToken::new();
    let now = Utc::now();
    let claimed = repo
        .claim_pending(first, now, now - chrono::Duration::minutes(15), 10)
        .await?;
    assert_eq!(claimed.len(), 1);

    let outcome = repo.settle_claimed(&claimed[0], first, Utc::now()).await?;
    assert!(matches!(outcome, SettleOutcome::Settled { .. }));

    // Replaying the same row, even under another claim, is a no-op
    let replay = repo
        .settle_claimed(&claimed[0], ClaimToken::new(), Utc::now())
        .await?;
    assert_eq!(replay, SettleOutcome::AlreadySettled);
    let replay = repo.settle_claimed(&claimed[0], first, Utc::now()).await?;
    assert_eq!(replay, SettleOutcome::AlreadySettled);

    assert_eq!(balance(repo, "DE001").await?, amount("300.00"));
    assert_eq!(balance(repo, "DE002").await?, amount("700.00"));

    Ok(())
}

#[tokio::test]
async fn test_rows_claimed_by_another_run_are_skipped() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    person_with_account(repo, "Alice", "DE001", "400.00").await?;
    person_with_account(repo, "Bob", "DE002", "600.00").await?;
    let txn = pending(repo, "DE001", "DE002", "100.00").await?;

    let other_run = ClaimToken::new();
    let now = Utc::now();
    repo.claim_pending(other_run, now, now - chrono::Duration::minutes(15), 10)
        .await?;

    let summary = engine.settle_pending().await?;
    assert!(summary.is_empty());
    assert_eq!(balance(repo, "DE001").await?, amount("400.00"));

    // Once released, the next pass picks it up
    repo.release_claims(other_run).await?;
    let summary = engine.settle_pending().await?;
    assert_eq!(summary.settled, vec![txn.id]);

    Ok(())
}

#[tokio::test]
async fn test_missing_account_rolls_back_only_that_transaction() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    person_with_account(repo, "Alice", "DE001", "400.00").await?;
    person_with_account(repo, "Bob", "DE002", "600.00").await?;
    let orphan = pending(repo, "DE001", "XX999", "50.00").await?;
    let valid = pending(repo, "DE002", "DE001", "10.00").await?;

    let err = engine.settle_pending().await.unwrap_err();
    match err {
        EngineError::AccountNotFound {
            iban,
            transaction_id,
        } => {
            assert_eq!(iban, "XX999");
            assert_eq!(transaction_id, orphan.id);
        }
        other => panic!("expected AccountNotFound, got {other:?}"),
    }

    // The orphan's debit was rolled back and it stays pending
    assert_eq!(balance(repo, "DE001").await?, amount("410.00"));
    assert_eq!(balance(repo, "DE002").await?, amount("590.00"));
    assert!(!repo.get_transaction(orphan.id).await?.unwrap().processed);
    assert!(repo.get_transaction(valid.id).await?.unwrap().processed);
    assert_eq!(repo.count_pending().await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_passes_settle_each_transaction_once() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    person_with_account(repo, "Alice", "DE001", "1000.00").await?;
    person_with_account(repo, "Bob", "DE002", "0.00").await?;
    for _ in 0..20 {
        pending(repo, "DE001", "DE002", "5.00").await?;
    }

    let (a, b) = tokio::join!(engine.settle_pending(), engine.settle_pending());
    let (a, b) = (a?, b?);

    assert_eq!(a.settled.len() + b.settled.len(), 20);
    assert_eq!(balance(repo, "DE001").await?, amount("900.00"));
    assert_eq!(balance(repo, "DE002").await?, amount("100.00"));
    assert_eq!(repo.count_pending().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_settlement_queues_account_events() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let repo = engine.repository();

    engine.settle_pending().await?;
    let events = repo.list_outbox().await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "settlement.no_pending");

    person_with_account(repo, "Alice", "DE001", "400.00").await?;
    person_with_account(repo, "Bob", "DE002", "600.00").await?;
    pending(repo, "DE001", "DE002", "100.00").await?;
    pending(repo, "DE001", "DE002", "100.00").await?;
    engine.settle_pending().await?;

    let updates: Vec<_> = repo
        .list_outbox()
        .await?
        .into_iter()
        .filter(|entry| entry.event == "account.updated")
        .collect();
    // One event per touched account, carrying its final balance
    assert_eq!(updates.len(), 2);
    let alice = updates
        .iter()
        .find(|entry| entry.payload["iban"] == "DE001")
        .unwrap();
    assert_eq!(alice.payload["balance"], "200.00");
    assert!(alice.payload["timestamp"].is_string());

    Ok(())
}
