mod repository;

pub use repository::*;

/// SQL migration for the ledger tables
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for the notification outbox
pub const MIGRATION_002_OUTBOX: &str = include_str!("migrations/002_outbox.sql");
