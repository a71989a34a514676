use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::{Amount, BorrowingCapacity, NetWorth, Stage};

use super::{EngineError, ErrorKind, SettlementSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Outcome of one executed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StepReport {
    pub fn settlement(summary: &SettlementSummary) -> Self {
        let message = if summary.is_empty() {
            "No unprocessed transactions found."
        } else {
            "Account balances updated successfully."
        };
        Self::success(
            Stage::Settlement,
            message,
            json!({
                "settled": summary.settled.len(),
                "already_settled": summary.already_settled.len(),
                "accounts_updated": summary.updated_accounts.len(),
            }),
        )
    }

    pub fn aggregation(entries: &[NetWorth]) -> Self {
        Self::success(
            Stage::Aggregation,
            "Net worth calculated successfully.",
            json!({ "net_worth": entries }),
        )
    }

    pub fn borrowing(capacity: &BorrowingCapacity) -> Self {
        Self::success(
            Stage::Borrowing,
            "Max borrowing amount calculated successfully.",
            json!({
                "person_id": capacity.person_id,
                "max_borrow_amount": capacity.max_borrow_amount,
            }),
        )
    }

    pub fn borrowing_all(capacities: &[BorrowingCapacity]) -> Self {
        Self::success(
            Stage::Borrowing,
            "Max borrowing amounts calculated successfully.",
            json!({ "persons": capacities.len(), "capacities": capacities }),
        )
    }

    pub fn failed(step: &str, err: &EngineError) -> Self {
        Self {
            step: step.to_string(),
            status: StepStatus::Failure,
            message: err.to_string(),
            error: Some(err.kind()),
            data: None,
        }
    }

    fn success(stage: Stage, message: &str, data: Value) -> Self {
        Self {
            step: stage.as_str().to_string(),
            status: StepStatus::Success,
            message: message.to_string(),
            error: None,
            data: Some(data),
        }
    }
}

/// Structured result of a pipeline run, returned by every entry point.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Stage selector of a manual trigger, reported as `process_id`
    #[serde(rename = "process_id", skip_serializing_if = "Option::is_none")]
    pub stage: Option<i64>,
    pub trigger: Trigger,
    pub status: StepStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_borrow_amount: Option<Amount>,
}

impl RunReport {
    pub fn new(trigger: Trigger, stage: Option<i64>) -> Self {
        Self {
            stage,
            trigger,
            status: StepStatus::Success,
            message: String::new(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            max_borrow_amount: None,
        }
    }

    /// A request refused before any stage ran.
    pub fn rejected(trigger: Trigger, stage: Option<i64>, err: &EngineError) -> Self {
        let mut report = Self::new(trigger, stage);
        report.push(StepReport::failed("validation", err));
        report.finish()
    }

    pub fn push(&mut self, step: StepReport) {
        if step.status == StepStatus::Failure {
            self.status = StepStatus::Failure;
        }
        self.steps.push(step);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self.message = match self.first_failure() {
            None if self.steps.is_empty() => "Nothing to run.".to_string(),
            None => match (self.stage, self.trigger) {
                (Some(id), _) => format!("Process {} completed successfully.", id),
                (None, Trigger::Scheduled) => "Nightly run completed successfully.".to_string(),
                (None, Trigger::Manual) => "Manual run completed successfully.".to_string(),
            },
            Some(step) if step.step == "validation" => {
                format!("Request rejected: {}", step.message)
            }
            Some(step) => format!("Run failed at {}: {}", step.step, step.message),
        };
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Kind of the failure that ended the run, if any.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.first_failure().and_then(|step| step.error)
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.step == name)
    }

    fn first_failure(&self) -> Option<&StepReport> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_report_keeps_structured_shape() {
        let err = EngineError::Validation("stage must be 1, 2 or 3".into());
        let report = RunReport::rejected(Trigger::Manual, Some(7), &err);

        assert!(!report.is_success());
        assert_eq!(report.failure_kind(), Some(ErrorKind::Validation));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["process_id"], 7);
        assert_eq!(json["status"], "failure");
        assert_eq!(json["steps"][0]["step"], "validation");
        assert_eq!(json["steps"][0]["status"], "failure");
        assert_eq!(json["steps"][0]["error"], "validation");
        assert!(json.get("max_borrow_amount").is_none());
    }

    #[test]
    fn test_success_message_names_process() {
        let mut report = RunReport::new(Trigger::Manual, Some(2));
        report.push(StepReport::aggregation(&[]));
        let report = report.finish();

        assert!(report.is_success());
        assert_eq!(report.message, "Process 2 completed successfully.");
        assert!(report.finished_at.is_some());
    }
}
