//! Status - ステージ表の読み取りビュー

use serde::{Deserialize, Serialize};

use crate::domain::ProcessStage;

/// Targets per stage, as seen by one orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub fetching: usize,
    pub normalizing: usize,
    pub computing_deviation: usize,
    pub storing: usize,
    pub done: usize,
    pub failed: usize,
}

impl StageCounts {
    pub fn from_stages(stages: impl IntoIterator<Item = ProcessStage>) -> Self {
        let mut counts = Self::default();
        for stage in stages {
            match stage {
                ProcessStage::Idle => {}
                ProcessStage::Fetching => counts.fetching += 1,
                ProcessStage::Normalizing => counts.normalizing += 1,
                ProcessStage::ComputingDeviation => counts.computing_deviation += 1,
                ProcessStage::Storing => counts.storing += 1,
                ProcessStage::Done => counts.done += 1,
                ProcessStage::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn in_flight(&self) -> usize {
        self.fetching + self.normalizing + self.computing_deviation + self.storing
    }
}
