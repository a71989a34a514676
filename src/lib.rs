pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod telemetry;

pub use application::{Engine, EngineError, RunReport, TriggerRequest};
pub use config::Config;
pub use domain::*;
pub use storage::Repository;
