use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{BorrowingRecord, DomainEvent, Person, PersonId};
use crate::storage::Repository;

use super::{EngineError, PipelineState};

/// The settlement and borrowing-capacity engine.
///
/// Each stage is an `impl Engine` block of its own (settlement, aggregation,
/// borrowing); the pipeline sequences them.
pub struct Engine {
    pub(crate) repo: Repository,
    pub(crate) claim_ttl: chrono::Duration,
    pub(crate) batch_size: u32,
    pub(crate) state: watch::Sender<PipelineState>,
    pub(crate) run_lock: Mutex<()>,
}

impl Engine {
    pub fn new(repo: Repository, config: &Config) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            repo,
            claim_ttl: chrono::Duration::from_std(config.claim_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(15)),
            batch_size: config.settlement_batch_size,
            state,
            run_lock: Mutex::new(()),
        }
    }

    /// Create (if needed) and migrate the database, then connect.
    pub async fn init(config: &Config) -> Result<Self, EngineError> {
        let repo = Repository::init(&config.database_url(true), config.max_connections).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &Config) -> Result<Self, EngineError> {
        let repo = Repository::connect(&config.database_url(false), config.max_connections).await?;
        Ok(Self::new(repo, config))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Observe pipeline state changes.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Stored borrowing record of a person, `None` if never computed.
    pub async fn borrowing_record(
        &self,
        person_id: PersonId,
    ) -> Result<Option<BorrowingRecord>, EngineError> {
        self.require_person(person_id).await?;
        Ok(self.repo.get_borrowing_record(person_id).await?)
    }

    pub(crate) async fn require_person(&self, person_id: PersonId) -> Result<Person, EngineError> {
        self.repo
            .get_person(person_id)
            .await?
            .ok_or(EngineError::PersonNotFound(person_id))
    }

    /// Queue events for the notification dispatcher. Failing to queue is
    /// logged and never fails the calling stage.
    pub(crate) async fn publish(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        match self.repo.enqueue_events(&events, Utc::now()).await {
            Ok(count) => debug!(count, "Queued notification events"),
            Err(err) => warn!(
                error = %format!("{err:#}"),
                count = events.len(),
                "Failed to queue notification events"
            ),
        }
    }
}
