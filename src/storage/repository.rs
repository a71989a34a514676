use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    AccountId, Amount, BankAccount, BorrowingCapacity, BorrowingRecord, BorrowingSnapshot,
    ClaimToken, DomainEvent, NetWorth, NewTransaction, Person, PersonId, Transaction,
    TransactionId, borrowing_capacity, is_plausible_iban,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_OUTBOX};

const TRANSACTION_COLUMNS: &str =
    "id, sender_iban, receiver_iban, amount_cents, processed, created_at, processed_at";

/// Result of trying to settle one claimed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Debit, credit and processed flag committed together.
    Settled {
        debited: BankAccount,
        credited: BankAccount,
    },
    /// Already processed, or no longer claimed by this run. Nothing changed.
    AlreadySettled,
    /// An IBAN matched no account. The unit was rolled back.
    MissingAccount { iban: String },
}

/// Inputs for one person's borrowing capacity, read in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityInputs {
    pub own_balance: Amount,
    /// Empty when the own balance is not positive; friends are not read then.
    pub friend_balances: Vec<(PersonId, Amount)>,
}

impl CapacityInputs {
    pub fn capacity(&self) -> Amount {
        borrowing_capacity(
            self.own_balance,
            self.friend_balances.iter().map(|(_, balance)| *balance),
        )
    }
}

/// A queued notification.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Insertion order, used as the paging cursor
    pub seq: i64,
    pub id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Repository over the ledger tables, borrowing records and the outbox.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL such as `sqlite:ledger.db?mode=rwc`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_OUTBOX)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str, max_connections: u32) -> Result<Self> {
        let repo = Self::connect(database_url, max_connections).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================
    // Person operations
    // ========================

    pub async fn create_person(&self, name: &str, email: &str) -> Result<Person> {
        let row = sqlx::query("INSERT INTO persons (name, email) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .context("Failed to save person")?;

        Ok(Person {
            id: row.get("id"),
            name: name.to_string(),
            email: email.to_string(),
        })
    }

    pub async fn get_person(&self, id: PersonId) -> Result<Option<Person>> {
        let row = sqlx::query("SELECT id, name, email FROM persons WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch person")?;

        Ok(row.map(|row| Person {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
        }))
    }

    /// Persons that own no account at all.
    pub async fn persons_without_accounts(&self) -> Result<Vec<PersonId>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id
            FROM persons p
            WHERE NOT EXISTS (SELECT 1 FROM bank_accounts a WHERE a.person_id = p.id)
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list persons without accounts")?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    // ========================
    // Account operations
    // ========================

    pub async fn open_account(
        &self,
        person_id: PersonId,
        iban: &str,
        balance: Amount,
    ) -> Result<BankAccount> {
        if !is_plausible_iban(iban) {
            bail!("Invalid IBAN '{}'", iban);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO bank_accounts (iban, balance_cents, person_id)
            VALUES (?, ?, ?)
            RETURNING id, iban, balance_cents, person_id
            "#,
        )
        .bind(iban)
        .bind(balance.cents())
        .bind(person_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to save bank account")?;

        Ok(Self::row_to_account(&row))
    }

    pub async fn get_account_by_iban(&self, iban: &str) -> Result<Option<BankAccount>> {
        let row = sqlx::query(
            "SELECT id, iban, balance_cents, person_id FROM bank_accounts WHERE iban = ?",
        )
        .bind(iban)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bank account")?;

        Ok(row.as_ref().map(Self::row_to_account))
    }

    pub async fn list_accounts_for_person(&self, person_id: PersonId) -> Result<Vec<BankAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, iban, balance_cents, person_id
            FROM bank_accounts
            WHERE person_id = ?
            ORDER BY id
            "#,
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list bank accounts")?;

        Ok(rows.iter().map(Self::row_to_account).collect())
    }

    fn row_to_account(row: &SqliteRow) -> BankAccount {
        BankAccount {
            id: row.get::<AccountId, _>("id"),
            iban: row.get("iban"),
            balance: Amount::from_cents(row.get("balance_cents")),
            person_id: row.get("person_id"),
        }
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a pending transaction.
    pub async fn record_transaction(&self, new: &NewTransaction) -> Result<Transaction> {
        let query = format!(
            r#"
            INSERT INTO transactions
                (sender_iban, receiver_iban, amount_cents, processed, created_at)
            VALUES (?, ?, ?, 0, ?)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(&new.sender_iban)
            .bind(&new.receiver_iban)
            .bind(new.amount.cents())
            .bind(timestamp(new.created_at))
            .fetch_one(&self.pool)
            .await
            .context("Failed to save transaction")?;

        Self::row_to_transaction(&row)
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    pub async fn count_pending(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM transactions WHERE processed = 0")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pending transactions")?;

        Ok(row.get("count"))
    }

    /// Claim up to `limit` pending transactions for `token`.
    ///
    /// Rows claimed by another run are skipped unless their claim is older
    /// than `stale_before`. The claim is a single statement, so two runs can
    /// never own the same row.
    pub async fn claim_pending(
        &self,
        token: ClaimToken,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let query = format!(
            r#"
            UPDATE transactions
            SET claim_token = ?, claimed_at = ?
            WHERE id IN (
                SELECT id FROM transactions
                WHERE processed = 0 AND (claim_token IS NULL OR claimed_at < ?)
                ORDER BY id
                LIMIT ?
            )
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let rows = sqlx::query(&query)
            .bind(token.to_string())
            .bind(timestamp(now))
            .bind(timestamp(stale_before))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .context("Failed to claim pending transactions")?;

        let mut claimed = rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?;
        claimed.sort_by_key(|txn| txn.id);
        Ok(claimed)
    }

    /// Apply one claimed transaction as a single all-or-nothing unit.
    ///
    /// The processed flag is flipped first and only if the row is still
    /// unprocessed and claimed by `token`; the debit and credit follow in the
    /// same store transaction. Any early return drops the transaction, which
    /// rolls every statement back.
    pub async fn settle_claimed(
        &self,
        txn: &Transaction,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<SettleOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin settlement unit")?;

        let flipped = sqlx::query(
            r#"
            UPDATE transactions
            SET processed = 1, processed_at = ?, claim_token = NULL, claimed_at = NULL
            WHERE id = ? AND processed = 0 AND claim_token = ?
            "#,
        )
        .bind(timestamp(now))
        .bind(txn.id)
        .bind(token.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to mark transaction processed")?
        .rows_affected();

        if flipped == 0 {
            return Ok(SettleOutcome::AlreadySettled);
        }

        let debited = sqlx::query(
            r#"
            UPDATE bank_accounts
            SET balance_cents = balance_cents - ?
            WHERE iban = ?
            RETURNING id, iban, balance_cents, person_id
            "#,
        )
        .bind(txn.amount.cents())
        .bind(&txn.sender_iban)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to debit sender")?;

        let Some(debited) = debited else {
            return Ok(SettleOutcome::MissingAccount {
                iban: txn.sender_iban.clone(),
            });
        };

        let credited = sqlx::query(
            r#"
            UPDATE bank_accounts
            SET balance_cents = balance_cents + ?
            WHERE iban = ?
            RETURNING id, iban, balance_cents, person_id
            "#,
        )
        .bind(txn.amount.cents())
        .bind(&txn.receiver_iban)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to credit receiver")?;

        let Some(credited) = credited else {
            return Ok(SettleOutcome::MissingAccount {
                iban: txn.receiver_iban.clone(),
            });
        };

        tx.commit()
            .await
            .context("Failed to commit settlement unit")?;

        Ok(SettleOutcome::Settled {
            debited: Self::row_to_account(&debited),
            credited: Self::row_to_account(&credited),
        })
    }

    /// Drop every claim still held by `token` so the rows are retried later.
    pub async fn release_claims(&self, token: ClaimToken) -> Result<u64> {
        let released = sqlx::query(
            r#"
            UPDATE transactions
            SET claim_token = NULL, claimed_at = NULL
            WHERE claim_token = ? AND processed = 0
            "#,
        )
        .bind(token.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to release transaction claims")?
        .rows_affected();

        Ok(released)
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let created_at: String = row.get("created_at");
        let processed_at: Option<String> = row.get("processed_at");

        Ok(Transaction {
            id: row.get("id"),
            sender_iban: row.get("sender_iban"),
            receiver_iban: row.get("receiver_iban"),
            amount: Amount::from_cents(row.get("amount_cents")),
            processed: row.get::<i64, _>("processed") != 0,
            created_at: parse_timestamp(&created_at).context("Invalid created_at timestamp")?,
            processed_at: processed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .context("Invalid processed_at timestamp")?,
        })
    }

    // ========================
    // Friendship operations
    // ========================

    /// Store a friendship unless it already exists in either direction.
    /// Returns false when nothing was inserted.
    pub async fn add_friendship(&self, person_id: PersonId, friend_id: PersonId) -> Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO friendships (person_id, friend_id)
            SELECT ?1, ?2
            WHERE NOT EXISTS (
                SELECT 1 FROM friendships WHERE person_id = ?2 AND friend_id = ?1
            )
            "#,
        )
        .bind(person_id)
        .bind(friend_id)
        .execute(&self.pool)
        .await
        .context("Failed to save friendship")?
        .rows_affected();

        Ok(inserted > 0)
    }

    /// Friends of a person, whichever column the person was stored in.
    pub async fn friends_of(&self, person_id: PersonId) -> Result<Vec<PersonId>> {
        let rows = sqlx::query(
            r#"
            SELECT friend_id FROM friendships WHERE person_id = ?1 AND friend_id <> ?1
            UNION
            SELECT person_id FROM friendships WHERE friend_id = ?1 AND person_id <> ?1
            ORDER BY 1
            "#,
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list friends")?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    // ========================
    // Aggregation and borrowing
    // ========================

    /// Sum of account balances per owner. Persons without accounts are absent.
    pub async fn net_worths(&self, person_id: Option<PersonId>) -> Result<Vec<NetWorth>> {
        let rows = match person_id {
            Some(id) => {
                sqlx::query(
                    r#"
                    SELECT person_id, SUM(balance_cents) AS net_worth
                    FROM bank_accounts
                    WHERE person_id = ?
                    GROUP BY person_id
                    "#,
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT person_id, SUM(balance_cents) AS net_worth
                    FROM bank_accounts
                    GROUP BY person_id
                    ORDER BY person_id
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to compute net worth")?;

        Ok(rows
            .iter()
            .map(|row| NetWorth {
                person_id: row.get("person_id"),
                net_worth: Amount::from_cents(row.get("net_worth")),
            })
            .collect())
    }

    /// Upsert net worth for each entry, all in one transaction.
    pub async fn save_net_worths(&self, entries: &[NetWorth], now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = timestamp(now);

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO borrowing_records
                    (person_id, net_worth_cents, max_borrow_cents, created_at, updated_at)
                VALUES (?1, ?2, 0, ?3, ?3)
                ON CONFLICT(person_id) DO UPDATE SET
                    net_worth_cents = excluded.net_worth_cents,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(entry.person_id)
            .bind(entry.net_worth.cents())
            .bind(&now)
            .execute(&mut *tx)
            .await
            .context("Failed to save net worth")?;
        }

        tx.commit().await.context("Failed to commit net worth")?;
        Ok(())
    }

    /// Upsert the borrowing capacity for each entry, all in one transaction.
    pub async fn save_capacities(
        &self,
        entries: &[BorrowingCapacity],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = timestamp(now);

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO borrowing_records
                    (person_id, net_worth_cents, max_borrow_cents, created_at, updated_at)
                VALUES (?1, 0, ?2, ?3, ?3)
                ON CONFLICT(person_id) DO UPDATE SET
                    max_borrow_cents = excluded.max_borrow_cents,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(entry.person_id)
            .bind(entry.max_borrow_amount.cents())
            .bind(&now)
            .execute(&mut *tx)
            .await
            .context("Failed to save borrowing capacity")?;
        }

        tx.commit()
            .await
            .context("Failed to commit borrowing capacity")?;
        Ok(())
    }

    pub async fn get_borrowing_record(
        &self,
        person_id: PersonId,
    ) -> Result<Option<BorrowingRecord>> {
        let row = sqlx::query(
            r#"
            SELECT person_id, net_worth_cents, max_borrow_cents, created_at, updated_at
            FROM borrowing_records
            WHERE person_id = ?
            "#,
        )
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch borrowing record")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(Some(BorrowingRecord {
            person_id: row.get("person_id"),
            net_worth: Amount::from_cents(row.get("net_worth_cents")),
            max_borrow_amount: Amount::from_cents(row.get("max_borrow_cents")),
            created_at: parse_timestamp(&created_at).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at).context("Invalid updated_at timestamp")?,
        }))
    }

    /// Read one person's balance and, if positive, their friends' balances
    /// inside a single read transaction.
    pub async fn load_capacity_inputs(&self, person_id: PersonId) -> Result<CapacityInputs> {
        let mut tx = self.pool.begin().await.context("Failed to begin snapshot")?;

        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(balance_cents), 0) AS balance
            FROM bank_accounts
            WHERE person_id = ?
            "#,
        )
        .bind(person_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to fetch person balance")?;
        let own_balance = Amount::from_cents(row.get("balance"));

        if !own_balance.is_positive() {
            tx.commit().await.context("Failed to close snapshot")?;
            return Ok(CapacityInputs {
                own_balance,
                friend_balances: Vec::new(),
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT f.friend_id AS friend_id, COALESCE(SUM(a.balance_cents), 0) AS balance
            FROM (
                SELECT friend_id FROM friendships WHERE person_id = ?1
                UNION
                SELECT person_id FROM friendships WHERE friend_id = ?1
            ) f
            LEFT JOIN bank_accounts a ON a.person_id = f.friend_id
            WHERE f.friend_id <> ?1
            GROUP BY f.friend_id
            ORDER BY f.friend_id
            "#,
        )
        .bind(person_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to fetch friend balances")?;

        tx.commit().await.context("Failed to close snapshot")?;

        Ok(CapacityInputs {
            own_balance,
            friend_balances: rows
                .iter()
                .map(|row| {
                    (
                        row.get::<PersonId, _>("friend_id"),
                        Amount::from_cents(row.get("balance")),
                    )
                })
                .collect(),
        })
    }

    /// Every person's balance and every friendship edge, read together.
    pub async fn load_borrowing_snapshot(&self) -> Result<BorrowingSnapshot> {
        let mut tx = self.pool.begin().await.context("Failed to begin snapshot")?;

        let balance_rows = sqlx::query(
            r#"
            SELECT p.id AS person_id, COALESCE(SUM(a.balance_cents), 0) AS balance
            FROM persons p
            LEFT JOIN bank_accounts a ON a.person_id = p.id
            GROUP BY p.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .context("Failed to fetch balances")?;

        let edge_rows = sqlx::query("SELECT person_id, friend_id FROM friendships")
            .fetch_all(&mut *tx)
            .await
            .context("Failed to fetch friendships")?;

        tx.commit().await.context("Failed to close snapshot")?;

        Ok(BorrowingSnapshot::new(
            balance_rows.iter().map(|row| {
                (
                    row.get::<PersonId, _>("person_id"),
                    Amount::from_cents(row.get("balance")),
                )
            }),
            edge_rows.iter().map(|row| {
                (
                    row.get::<PersonId, _>("person_id"),
                    row.get::<PersonId, _>("friend_id"),
                )
            }),
        ))
    }

    // ========================
    // Outbox operations
    // ========================

    /// Queue events for delivery. Returns how many were written.
    pub async fn enqueue_events(
        &self,
        events: &[DomainEvent],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for event in events {
            let payload = event.payload(now).context("Failed to encode event payload")?;
            sqlx::query(
                r#"
                INSERT INTO outbox (id, event, payload, created_at, attempts)
                VALUES (?, ?, ?, ?, 0)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(event.name())
            .bind(payload.to_string())
            .bind(timestamp(now))
            .execute(&mut *tx)
            .await
            .context("Failed to queue event")?;
        }
        tx.commit().await.context("Failed to commit queued events")?;

        Ok(events.len())
    }

    /// Undelivered entries after `after_seq` that still have attempts left,
    /// oldest first.
    pub async fn pending_outbox(
        &self,
        max_attempts: u32,
        after_seq: i64,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT rowid AS seq, id, event, payload, created_at, attempts, last_error, delivered_at
            FROM outbox
            WHERE delivered_at IS NULL AND attempts < ? AND rowid > ?
            ORDER BY rowid
            LIMIT ?
            "#,
        )
        .bind(i64::from(max_attempts))
        .bind(after_seq)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list outbox")?;

        rows.iter().map(Self::row_to_outbox).collect()
    }

    pub async fn list_outbox(&self) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT rowid AS seq, id, event, payload, created_at, attempts, last_error, delivered_at
            FROM outbox
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list outbox")?;

        rows.iter().map(Self::row_to_outbox).collect()
    }

    pub async fn mark_delivered(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET delivered_at = ?, attempts = attempts + 1, last_error = NULL
            WHERE id = ?
            "#,
        )
        .bind(timestamp(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to mark event delivered")?;
        Ok(())
    }

    pub async fn record_delivery_failure(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = ? WHERE id = ?")
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to record delivery failure")?;
        Ok(())
    }

    fn row_to_outbox(row: &SqliteRow) -> Result<OutboxEntry> {
        let id: String = row.get("id");
        let payload: String = row.get("payload");
        let created_at: String = row.get("created_at");
        let delivered_at: Option<String> = row.get("delivered_at");

        Ok(OutboxEntry {
            seq: row.get("seq"),
            id: Uuid::parse_str(&id).context("Invalid outbox ID")?,
            event: row.get("event"),
            payload: serde_json::from_str(&payload).context("Invalid outbox payload")?,
            created_at: parse_timestamp(&created_at).context("Invalid created_at timestamp")?,
            attempts: row.get("attempts"),
            last_error: row.get("last_error"),
            delivered_at: delivered_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .context("Invalid delivered_at timestamp")?,
        })
    }
}

/// Fixed-width RFC 3339 so stored timestamps also compare correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
