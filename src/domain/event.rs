use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AccountId, Amount, PersonId};

/// Something the engine did that downstream listeners may care about.
///
/// Stages only emit these; queuing and delivery belong to the outbox and the
/// notification dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum DomainEvent {
    #[serde(rename = "account.updated")]
    AccountUpdated {
        account_id: AccountId,
        iban: String,
        person_id: PersonId,
        balance: Amount,
    },

    #[serde(rename = "settlement.no_pending")]
    NoPendingTransactions,

    #[serde(rename = "net_worth.updated")]
    NetWorthUpdated { person_id: PersonId, net_worth: Amount },

    #[serde(rename = "borrowing_capacity.updated")]
    BorrowingCapacityUpdated {
        person_id: PersonId,
        max_borrow_amount: Amount,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::AccountUpdated { .. } => "account.updated",
            DomainEvent::NoPendingTransactions => "settlement.no_pending",
            DomainEvent::NetWorthUpdated { .. } => "net_worth.updated",
            DomainEvent::BorrowingCapacityUpdated { .. } => "borrowing_capacity.updated",
        }
    }

    pub fn message(&self) -> String {
        match self {
            DomainEvent::AccountUpdated { iban, balance, .. } => {
                format!("Account {} balance is now {}", iban, balance)
            }
            DomainEvent::NoPendingTransactions => "No unprocessed transactions found".to_string(),
            DomainEvent::NetWorthUpdated { person_id, net_worth } => {
                format!("Net worth of person {} is {}", person_id, net_worth)
            }
            DomainEvent::BorrowingCapacityUpdated {
                person_id,
                max_borrow_amount,
            } => format!(
                "Person {} can borrow up to {}",
                person_id, max_borrow_amount
            ),
        }
    }

    /// Notification body: `{ event, timestamp, message, ...fields }`.
    pub fn payload(&self, timestamp: DateTime<Utc>) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(EventEnvelope {
            event: self,
            timestamp,
            message: self.message(),
        })
    }
}

#[derive(Serialize)]
struct EventEnvelope<'a> {
    #[serde(flatten)]
    event: &'a DomainEvent,
    timestamp: DateTime<Utc>,
    message: String,
}
