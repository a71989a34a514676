use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::domain::{PersonId, Stage, StagePlan};

use super::{Engine, EngineError, RunReport, StepReport, Trigger};

/// Where a pipeline run currently is. Every run starts and ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Settling,
    Aggregating,
    /// `person_id` is `None` while computing for everyone
    ComputingBorrowing { person_id: Option<PersonId> },
}

impl PipelineState {
    pub fn for_stage(stage: Stage, person_id: Option<PersonId>) -> Self {
        match stage {
            Stage::Settlement => PipelineState::Settling,
            Stage::Aggregation => PipelineState::Aggregating,
            Stage::Borrowing => PipelineState::ComputingBorrowing { person_id },
        }
    }

    /// Runs only move forward through the stages, or back to `Idle`.
    pub fn can_advance_to(&self, next: &PipelineState) -> bool {
        *next == PipelineState::Idle || next.rank() > self.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            PipelineState::Idle => 0,
            PipelineState::Settling => 1,
            PipelineState::Aggregating => 2,
            PipelineState::ComputingBorrowing { .. } => 3,
        }
    }
}

/// On-demand trigger body: `{ "stage": 1|2|3, "personId": 42 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub stage: i64,
    #[serde(default)]
    pub person_id: Option<PersonId>,
}

impl TriggerRequest {
    pub fn new(stage: i64, person_id: Option<PersonId>) -> Self {
        Self { stage, person_id }
    }

    /// Stages this request runs, or why it cannot run at all.
    pub fn plan(&self) -> Result<StagePlan, EngineError> {
        let plan = StagePlan::from_selector(self.stage).ok_or_else(|| {
            EngineError::Validation(format!("stage must be 1, 2 or 3, got {}", self.stage))
        })?;
        if plan.contains(Stage::Borrowing) && self.person_id.is_none() {
            return Err(EngineError::Validation(
                "personId is required for stage 3".to_string(),
            ));
        }
        Ok(plan)
    }
}

impl Engine {
    /// The scheduled daily run: every stage, every person.
    pub async fn run_nightly(&self) -> RunReport {
        self.execute(
            RunReport::new(Trigger::Scheduled, None),
            &StagePlan::full(),
            None,
        )
        .await
    }

    /// Manual run from a numeric stage selector. Invalid requests are
    /// rejected before any stage runs.
    pub async fn trigger(&self, request: &TriggerRequest) -> RunReport {
        match request.plan() {
            Ok(plan) => {
                self.execute(
                    RunReport::new(Trigger::Manual, Some(request.stage)),
                    &plan,
                    request.person_id,
                )
                .await
            }
            Err(err) => {
                info!(stage = request.stage, error = %err, "Rejected manual trigger");
                RunReport::rejected(Trigger::Manual, Some(request.stage), &err)
            }
        }
    }

    /// Manual run of an explicit set of stages. Without a person, borrowing
    /// is computed for everyone and aggregation covers all persons.
    pub async fn run_plan(&self, plan: &StagePlan, person_id: Option<PersonId>) -> RunReport {
        if plan.is_empty() {
            let err = EngineError::Validation("no stages selected".to_string());
            return RunReport::rejected(Trigger::Manual, None, &err);
        }
        self.execute(RunReport::new(Trigger::Manual, None), plan, person_id)
            .await
    }

    async fn execute(
        &self,
        mut report: RunReport,
        plan: &StagePlan,
        person_id: Option<PersonId>,
    ) -> RunReport {
        let _guard = self.run_lock.lock().await;
        self.state.send_replace(PipelineState::Idle);
        info!(trigger = %report.trigger, plan = %plan, person_id, "Pipeline run started");

        for stage in plan.stages() {
            self.advance(PipelineState::for_stage(stage, person_id));

            let step = match stage {
                Stage::Settlement => self
                    .settle_pending()
                    .await
                    .map(|summary| StepReport::settlement(&summary)),
                Stage::Aggregation => self
                    .aggregate_net_worth(person_id)
                    .await
                    .map(|entries| StepReport::aggregation(&entries)),
                Stage::Borrowing => match person_id {
                    Some(id) => self.compute_borrowing_capacity(Some(id)).await.map(|capacity| {
                        report.max_borrow_amount = Some(capacity.max_borrow_amount);
                        StepReport::borrowing(&capacity)
                    }),
                    None => self
                        .compute_all_borrowing_capacities()
                        .await
                        .map(|capacities| StepReport::borrowing_all(&capacities)),
                },
            };

            match step {
                Ok(step) => report.push(step),
                Err(err) => {
                    error!(stage = %stage, error = %err, "Stage failed, skipping remaining stages");
                    report.push(StepReport::failed(stage.as_str(), &err));
                    break;
                }
            }
        }

        self.state.send_replace(PipelineState::Idle);
        let report = report.finish();
        info!(status = ?report.status, "{}", report.message);
        report
    }

    fn advance(&self, next: PipelineState) {
        let current = self.state();
        debug_assert!(
            current.can_advance_to(&next),
            "invalid pipeline transition {current:?} -> {next:?}"
        );
        self.state.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        let idle = PipelineState::Idle;
        let borrowing = PipelineState::ComputingBorrowing { person_id: Some(1) };

        assert!(idle.can_advance_to(&PipelineState::Settling));
        assert!(PipelineState::Settling.can_advance_to(&PipelineState::Aggregating));
        assert!(PipelineState::Settling.can_advance_to(&borrowing));
        assert!(borrowing.can_advance_to(&idle));
        assert!(!PipelineState::Aggregating.can_advance_to(&PipelineState::Settling));
        assert!(!borrowing.can_advance_to(&PipelineState::Aggregating));
    }

    #[test]
    fn test_trigger_request_validation() {
        assert!(TriggerRequest::new(1, None).plan().is_ok());
        assert!(TriggerRequest::new(2, None).plan().is_ok());
        assert_eq!(
            TriggerRequest::new(3, Some(5)).plan().unwrap(),
            StagePlan::full()
        );
        assert!(matches!(
            TriggerRequest::new(3, None).plan(),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            TriggerRequest::new(4, Some(5)).plan(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_trigger_request_wire_format() {
        let request: TriggerRequest = serde_json::from_str(r#"{"stage":3,"personId":42}"#).unwrap();
        assert_eq!(request, TriggerRequest::new(3, Some(42)));

        let request: TriggerRequest = serde_json::from_str(r#"{"stage":1}"#).unwrap();
        assert_eq!(request.person_id, None);
    }
}
