use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::storage::Repository;

use super::{LogNotifier, Notifier, WebhookNotifier};

const LOG_DESTINATION: &str = "log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Drains the outbox through a notifier. Delivery is at least once; a failed
/// entry is retried on later passes until it runs out of attempts.
pub struct Dispatcher {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    destination: String,
    max_attempts: u32,
    batch_size: u32,
}

impl Dispatcher {
    pub fn new(
        repo: Repository,
        notifier: Arc<dyn Notifier>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            notifier,
            destination: destination.into(),
            max_attempts: 5,
            batch_size: 100,
        }
    }

    /// Webhook delivery when a URL is configured, log-only otherwise.
    pub fn from_config(repo: Repository, config: &Config) -> Result<Self> {
        let dispatcher = match &config.webhook_url {
            Some(url) => {
                let notifier = WebhookNotifier::new(config.notify_timeout)?;
                Self::new(repo, Arc::new(notifier), url.clone())
            }
            None => Self::new(repo, Arc::new(LogNotifier), LOG_DESTINATION),
        };
        Ok(dispatcher.with_max_attempts(config.max_delivery_attempts))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Try every pending entry once. Entries failing in this pass stay
    /// pending behind the cursor and are retried on the next pass.
    pub async fn dispatch_pending(&self) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary::default();
        let mut cursor = 0;

        loop {
            let batch = self
                .repo
                .pending_outbox(self.max_attempts, cursor, self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = last.seq;

            for entry in batch {
                match self.notifier.notify(&self.destination, &entry.payload).await {
                    Ok(()) => {
                        self.repo.mark_delivered(entry.id, Utc::now()).await?;
                        debug!(id = %entry.id, event = %entry.event, "Delivered notification");
                        summary.delivered += 1;
                    }
                    Err(err) => {
                        self.repo
                            .record_delivery_failure(entry.id, &err.to_string())
                            .await?;
                        let attempts = entry.attempts + 1;
                        if attempts >= i64::from(self.max_attempts) {
                            error!(
                                id = %entry.id,
                                event = %entry.event,
                                attempts,
                                error = %err,
                                "Giving up on notification"
                            );
                        } else {
                            warn!(
                                id = %entry.id,
                                event = %entry.event,
                                attempts,
                                error = %err,
                                "Notification delivery failed"
                            );
                        }
                        summary.failed += 1;
                    }
                }
            }
        }

        if summary != DispatchSummary::default() {
            info!(
                delivered = summary.delivered,
                failed = summary.failed,
                "Dispatched notifications"
            );
        }
        Ok(summary)
    }

    /// Run one pass in the background. Errors are logged, never returned.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.dispatch_pending().await {
                error!(error = %format!("{err:#}"), "Notification dispatch failed");
            }
        })
    }
}
