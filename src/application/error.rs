use serde::Serialize;
use thiserror::Error;

use crate::domain::{PersonId, TransactionId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Person not found: {0}")]
    PersonNotFound(PersonId),

    #[error("Account not found for IBAN {iban} (transaction {transaction_id})")]
    AccountNotFound {
        iban: String,
        transaction_id: TransactionId,
    },

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Coarse classification used in run reports and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Store,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::PersonNotFound(_) | EngineError::AccountNotFound { .. } => {
                ErrorKind::NotFound
            }
            EngineError::Store(_) => ErrorKind::Store,
        }
    }
}
