mod dispatcher;
mod webhook;

pub use dispatcher::*;
pub use webhook::*;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Destination responded with status {0}")]
    Status(u16),
}

/// Delivers one event payload to a destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, destination: &str, payload: &Value) -> Result<(), NotifyError>;
}

/// Writes events to the log instead of sending them anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, destination: &str, payload: &Value) -> Result<(), NotifyError> {
        info!(destination, %payload, "Notification");
        Ok(())
    }
}
