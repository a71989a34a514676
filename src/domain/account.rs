use serde::{Deserialize, Serialize};

use super::{Amount, PersonId};

pub type AccountId = i64;

/// A bank account owned by one person. The balance only moves through
/// settlement of pending transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: AccountId,
    pub iban: String,
    pub balance: Amount,
    pub person_id: PersonId,
}

/// IBANs are at most 34 characters, alphanumeric.
pub fn is_plausible_iban(iban: &str) -> bool {
    (5..=34).contains(&iban.len()) && iban.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iban_shape() {
        assert!(is_plausible_iban("NL91ABNA0417164300"));
        assert!(!is_plausible_iban("NL91 ABNA"));
        assert!(!is_plausible_iban("NL"));
        assert!(!is_plausible_iban(&"A".repeat(35)));
    }
}
