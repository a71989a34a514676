use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Amount;

pub type TransactionId = i64;

/// A pending or settled money movement between two IBANs.
///
/// Transactions are written by an external collaborator with
/// `processed = false` and consumed exactly once by settlement. They are never
/// deleted or edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Account whose balance decreases
    pub sender_iban: String,
    /// Account whose balance increases
    pub receiver_iban: String,
    /// Always positive
    pub amount: Amount,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Input for recording a new transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub sender_iban: String,
    pub receiver_iban: String,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(
        sender_iban: impl Into<String>,
        receiver_iban: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Self {
            sender_iban: sender_iban.into(),
            receiver_iban: receiver_iban.into(),
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Marks the pending rows owned by one settlement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    pub fn new() -> Self {
        ClaimToken(Uuid::new_v4())
    }
}

impl Default for ClaimToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
