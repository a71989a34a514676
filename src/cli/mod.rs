use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use crate::application::{Engine, ErrorKind, RunReport, TriggerRequest};
use crate::config::Config;
use crate::domain::{BankAccount, BorrowingRecord, PersonId, Stage, StagePlan};
use crate::notify::Dispatcher;
use crate::scheduler::NightlyScheduler;
use crate::telemetry::LogFormat;

/// Borrowline - nightly settlement and borrowing-capacity engine
#[derive(Parser)]
#[command(name = "borrowline")]
#[command(
    about = "Settles pending transactions and computes how much each person can borrow from friends"
)]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        env = "BORROWLINE_DATABASE",
        default_value = "borrowline.db",
        global = true
    )]
    pub database: String,

    /// Webhook URL notifications are POSTed to (logged only when unset)
    #[arg(long, env = "BORROWLINE_WEBHOOK_URL", global = true)]
    pub webhook_url: Option<String>,

    /// Webhook request timeout in seconds
    #[arg(long, env = "BORROWLINE_NOTIFY_TIMEOUT_SECS", default_value_t = 10, global = true)]
    pub notify_timeout_secs: u64,

    /// Delivery attempts per notification before giving up
    #[arg(long, env = "BORROWLINE_MAX_DELIVERY_ATTEMPTS", default_value_t = 5, global = true)]
    pub max_delivery_attempts: u32,

    /// Seconds a settlement claim stays exclusive
    #[arg(long, env = "BORROWLINE_CLAIM_TTL_SECS", default_value_t = 900, global = true)]
    pub claim_ttl_secs: u64,

    /// Pending transactions claimed per round trip
    #[arg(long, env = "BORROWLINE_BATCH_SIZE", default_value_t = 500, global = true)]
    pub batch_size: u32,

    /// Connection pool size
    #[arg(long, env = "BORROWLINE_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    pub max_connections: u32,

    /// Log output format
    #[arg(
        long,
        env = "BORROWLINE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        global = true
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply migrations
    Init,

    /// Run every stage for every person once
    Run,

    /// Run a manual trigger and print its report
    Trigger {
        /// 1 = settlement, 2 = + aggregation, 3 = + borrowing (needs --person-id)
        #[arg(long, conflicts_with = "only", required_unless_present = "only")]
        stage: Option<i64>,

        /// Person to aggregate and compute borrowing capacity for
        #[arg(long)]
        person_id: Option<PersonId>,

        /// Explicit stages to run, e.g. "settlement,borrowing"
        #[arg(long, value_enum, value_delimiter = ',')]
        only: Vec<StageArg>,
    },

    /// Run the pipeline on a cron schedule until interrupted
    Schedule {
        /// Cron expression with seconds
        #[arg(long, env = "BORROWLINE_SCHEDULE", default_value = "0 0 0 * * *")]
        cron: String,
    },

    /// Deliver queued notifications
    Dispatch,

    /// Show a person's stored borrowing record
    Show {
        person_id: PersonId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Settlement,
    Aggregation,
    Borrowing,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Settlement => Stage::Settlement,
            StageArg::Aggregation => Stage::Aggregation,
            StageArg::Borrowing => Stage::Borrowing,
        }
    }
}

impl Cli {
    pub fn config(&self) -> Config {
        let schedule = match &self.command {
            Commands::Schedule { cron } => cron.clone(),
            _ => Config::default().schedule,
        };
        Config {
            database: self.database.clone(),
            max_connections: self.max_connections,
            webhook_url: self.webhook_url.clone(),
            notify_timeout: Duration::from_secs(self.notify_timeout_secs),
            max_delivery_attempts: self.max_delivery_attempts,
            claim_ttl: Duration::from_secs(self.claim_ttl_secs),
            settlement_batch_size: self.batch_size,
            schedule,
        }
    }

    pub async fn run(self) -> Result<ExitCode> {
        let config = self.config();
        config.validate().context("Invalid configuration")?;

        match self.command {
            Commands::Init => {
                Engine::init(&config).await?;
                println!("Database initialized: {}", config.database);
            }

            Commands::Run => {
                let engine = Engine::connect(&config).await?;
                let report = engine.run_nightly().await;
                return finish_run(&engine, &config, report).await;
            }

            Commands::Trigger {
                stage,
                person_id,
                only,
            } => {
                let engine = Engine::connect(&config).await?;
                let report = match stage {
                    Some(stage) => engine.trigger(&TriggerRequest::new(stage, person_id)).await,
                    None => {
                        let plan = StagePlan::from_stages(only.into_iter().map(Stage::from));
                        engine.run_plan(&plan, person_id).await
                    }
                };
                return finish_run(&engine, &config, report).await;
            }

            Commands::Schedule { .. } => {
                let engine = Arc::new(Engine::connect(&config).await?);
                let dispatcher = Arc::new(Dispatcher::from_config(
                    engine.repository().clone(),
                    &config,
                )?);
                let mut scheduler =
                    NightlyScheduler::new(engine, dispatcher, config.schedule.clone()).await?;
                scheduler.start().await?;

                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for shutdown signal")?;
                info!("Shutdown signal received");
                scheduler.shutdown().await?;
            }

            Commands::Dispatch => {
                let engine = Engine::connect(&config).await?;
                let dispatcher = Dispatcher::from_config(engine.repository().clone(), &config)?;
                let summary = dispatcher.dispatch_pending().await?;
                print_json(&summary)?;
                if summary.failed > 0 {
                    return Ok(ExitCode::FAILURE);
                }
            }

            Commands::Show { person_id } => {
                let engine = Engine::connect(&config).await?;
                let Some(record) = engine.borrowing_record(person_id).await? else {
                    eprintln!("No borrowing record for person {} yet", person_id);
                    return Ok(ExitCode::FAILURE);
                };
                let accounts = engine
                    .repository()
                    .list_accounts_for_person(person_id)
                    .await?;
                print_json(&PersonSummary { record, accounts })?;
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Serialize)]
struct PersonSummary {
    #[serde(flatten)]
    record: BorrowingRecord,
    accounts: Vec<BankAccount>,
}

/// Print the report, deliver its notifications and map the outcome to an
/// exit code.
async fn finish_run(engine: &Engine, config: &Config, report: RunReport) -> Result<ExitCode> {
    print_json(&report)?;

    match Dispatcher::from_config(engine.repository().clone(), config) {
        Ok(dispatcher) => {
            if let Err(err) = dispatcher.dispatch_pending().await {
                warn!(error = %format!("{err:#}"), "Notification dispatch failed");
            }
        }
        Err(err) => warn!(error = %format!("{err:#}"), "Notifier unavailable"),
    }

    Ok(exit_code(&report))
}

fn exit_code(report: &RunReport) -> ExitCode {
    match report.failure_kind() {
        None if report.is_success() => ExitCode::SUCCESS,
        Some(ErrorKind::Validation) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", json);
    Ok(())
}
