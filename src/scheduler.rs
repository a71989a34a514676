use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::application::Engine;
use crate::notify::Dispatcher;

/// Runs the full pipeline on a cron schedule and dispatches the resulting
/// notifications after each run.
pub struct NightlyScheduler {
    scheduler: JobScheduler,
    engine: Arc<Engine>,
    dispatcher: Arc<Dispatcher>,
    schedule: String,
}

impl NightlyScheduler {
    pub async fn new(
        engine: Arc<Engine>,
        dispatcher: Arc<Dispatcher>,
        schedule: impl Into<String>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create scheduler: {:?}", e))?;

        Ok(Self {
            scheduler,
            engine,
            dispatcher,
            schedule: schedule.into(),
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let engine = self.engine.clone();
        let dispatcher = self.dispatcher.clone();
        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let dispatcher = dispatcher.clone();
            Box::pin(async move {
                info!("Scheduled nightly run triggered");
                let report = engine.run_nightly().await;
                if report.is_success() {
                    info!("{}", report.message);
                } else {
                    error!("{}", report.message);
                }
                dispatcher.spawn();
            })
        })
        .map_err(|e| anyhow!("Invalid schedule '{}': {:?}", self.schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to register nightly job: {:?}", e))?;

        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {:?}", e))?;

        info!(schedule = %self.schedule, "Nightly scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow!("Failed to stop scheduler: {:?}", e))?;
        info!("Nightly scheduler stopped");
        Ok(())
    }
}
