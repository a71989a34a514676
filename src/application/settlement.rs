use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{AccountId, BankAccount, ClaimToken, DomainEvent, TransactionId};
use crate::storage::SettleOutcome;

use super::{Engine, EngineError};

/// What one settlement pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SettlementSummary {
    pub settled: Vec<TransactionId>,
    /// Claimed, but another run had already settled them
    pub already_settled: Vec<TransactionId>,
    /// Left unprocessed because an IBAN matched no account
    pub rejected: Vec<RejectedTransaction>,
    /// Final balance of every account this pass touched
    pub updated_accounts: Vec<BankAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedTransaction {
    pub transaction_id: TransactionId,
    pub iban: String,
}

impl SettlementSummary {
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty() && self.already_settled.is_empty() && self.rejected.is_empty()
    }
}

impl Engine {
    /// Apply every unprocessed transaction to the sender and receiver
    /// balances exactly once.
    ///
    /// Pending rows are claimed for this run before anything is mutated, and
    /// each transaction commits its flag flip, debit and credit together.
    /// Claims still held when the pass ends are released for the next run.
    pub async fn settle_pending(&self) -> Result<SettlementSummary, EngineError> {
        let token = ClaimToken::new();
        let mut summary = SettlementSummary::default();
        let mut touched: BTreeMap<AccountId, BankAccount> = BTreeMap::new();

        let drained = self.drain_claims(token, &mut summary, &mut touched).await;

        match self.repo.release_claims(token).await {
            Ok(0) => {}
            Ok(released) => debug!(released, %token, "Released unsettled claims"),
            Err(err) => warn!(
                error = %format!("{err:#}"),
                %token,
                "Failed to release claims; they expire after the claim TTL"
            ),
        }

        summary.updated_accounts = touched.into_values().collect();
        let mut events: Vec<DomainEvent> = summary
            .updated_accounts
            .iter()
            .map(|account| DomainEvent::AccountUpdated {
                account_id: account.id,
                iban: account.iban.clone(),
                person_id: account.person_id,
                balance: account.balance,
            })
            .collect();
        if drained.is_ok() && summary.is_empty() {
            info!("No unprocessed transactions found");
            events.push(DomainEvent::NoPendingTransactions);
        }
        self.publish(events).await;

        drained?;

        if let Some(first) = summary.rejected.first() {
            return Err(EngineError::AccountNotFound {
                iban: first.iban.clone(),
                transaction_id: first.transaction_id,
            });
        }

        if !summary.is_empty() {
            info!(
                settled = summary.settled.len(),
                accounts = summary.updated_accounts.len(),
                "Processed transactions and updated balances"
            );
        }
        Ok(summary)
    }

    async fn drain_claims(
        &self,
        token: ClaimToken,
        summary: &mut SettlementSummary,
        touched: &mut BTreeMap<AccountId, BankAccount>,
    ) -> Result<(), EngineError> {
        let mut seen: HashSet<TransactionId> = HashSet::new();

        loop {
            let now = Utc::now();
            let batch = self
                .repo
                .claim_pending(token, now, now - self.claim_ttl, self.batch_size)
                .await?;

            // Rejected rows keep our claim until release, so they only come
            // back once the claim has gone stale.
            if batch.iter().all(|txn| seen.contains(&txn.id)) {
                return Ok(());
            }
            debug!(count = batch.len(), %token, "Claimed pending transactions");

            for txn in batch {
                if !seen.insert(txn.id) {
                    continue;
                }
                match self.repo.settle_claimed(&txn, token, Utc::now()).await? {
                    SettleOutcome::Settled { debited, credited } => {
                        summary.settled.push(txn.id);
                        touched.insert(debited.id, debited);
                        touched.insert(credited.id, credited);
                    }
                    SettleOutcome::AlreadySettled => {
                        warn!(transaction_id = txn.id, "Transaction already settled, skipping");
                        summary.already_settled.push(txn.id);
                    }
                    SettleOutcome::MissingAccount { iban } => {
                        warn!(
                            transaction_id = txn.id,
                            %iban,
                            "Transaction references an unknown account, left unprocessed"
                        );
                        summary.rejected.push(RejectedTransaction {
                            transaction_id: txn.id,
                            iban,
                        });
                    }
                }
            }
        }
    }
}
