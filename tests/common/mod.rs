// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use borrowline::application::Engine;
use borrowline::config::Config;
use borrowline::domain::{Amount, BankAccount, NewTransaction, Person, PersonId, Transaction};
use borrowline::storage::Repository;
use tempfile::TempDir;

/// Helper to create a test engine with a temporary database
pub async fn test_engine() -> Result<(Engine, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = Config::with_database(db_path.to_str().unwrap());
    let engine = Engine::init(&config).await?;
    Ok((engine, temp_dir))
}

/// Parse a decimal amount like "150.00"
pub fn amount(raw: &str) -> Amount {
    Amount::parse(raw).unwrap()
}

pub async fn person(repo: &Repository, name: &str) -> Result<Person> {
    let email = format!("{}@example.com", name.to_lowercase());
    repo.create_person(name, &email).await
}

/// Person with a single account holding `balance`.
pub async fn person_with_account(
    repo: &Repository,
    name: &str,
    iban: &str,
    balance: &str,
) -> Result<(Person, BankAccount)> {
    let person = person(repo, name).await?;
    let account = repo.open_account(person.id, iban, amount(balance)).await?;
    Ok((person, account))
}

pub async fn pending(
    repo: &Repository,
    sender: &str,
    receiver: &str,
    value: &str,
) -> Result<Transaction> {
    repo.record_transaction(&NewTransaction::new(sender, receiver, amount(value)))
        .await
}

pub async fn balance(repo: &Repository, iban: &str) -> Result<Amount> {
    let account = repo
        .get_account_by_iban(iban)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no account {iban}"))?;
    Ok(account.balance)
}

pub async fn befriend(repo: &Repository, a: PersonId, b: PersonId) -> Result<()> {
    repo.add_friendship(a, b).await?;
    Ok(())
}
