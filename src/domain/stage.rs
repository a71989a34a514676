use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of the nightly pipeline. Ordering follows execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Settlement,
    Aggregation,
    Borrowing,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Settlement, Stage::Aggregation, Stage::Borrowing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Settlement => "settlement",
            Stage::Aggregation => "aggregation",
            Stage::Borrowing => "borrowing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "settlement" => Some(Stage::Settlement),
            "aggregation" => Some(Stage::Aggregation),
            "borrowing" => Some(Stage::Borrowing),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The set of stages a run executes, always in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StagePlan {
    stages: BTreeSet<Stage>,
}

impl StagePlan {
    /// Settlement, aggregation and borrowing.
    pub fn full() -> Self {
        Self::from_stages(Stage::ALL)
    }

    pub fn only(stage: Stage) -> Self {
        Self::from_stages([stage])
    }

    pub fn from_stages(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
        }
    }

    /// Maps the manual trigger's numeric selector to the stages it names:
    /// `1` settles, `2` also aggregates, `3` also computes borrowing.
    pub fn from_selector(selector: i64) -> Option<Self> {
        let upto = match selector {
            1 => 1,
            2 => 2,
            3 => 3,
            _ => return None,
        };
        Some(Self::from_stages(Stage::ALL.into_iter().take(upto)))
    }

    pub fn with(mut self, stage: Stage) -> Self {
        self.stages.insert(stage);
        self
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages.iter().copied()
    }
}

impl fmt::Display for StagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages().map(|s| s.as_str()).collect();
        write!(f, "{}", names.join(" -> "))
    }
}
