//! State - process 実行中のターゲットごとの状態
//!
//! # 状態遷移
//! - Idle -> Fetching -> Normalizing -> ComputingDeviation -> Storing -> Done
//! - 任意の実行中ステージ -> Failed(reason)
//! - Done / Failed からは次の process で Fetching に戻れる
//!
//! Done と Failed は「実行中ではない」ので、Idle と同じく新しい process を受け付けます。

use serde::{Deserialize, Serialize};

use super::errors::ReasonCode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stage", content = "reason", rename_all = "snake_case")]
pub enum ProcessStage {
    /// Never processed in this orchestrator's lifetime.
    #[default]
    Idle,
    Fetching,
    Normalizing,
    ComputingDeviation,
    Storing,

    /// Last run stored an artifact.
    Done,

    /// Last run aborted; any previous artifact is untouched.
    Failed(ReasonCode),
}

impl ProcessStage {
    /// A run is currently executing for this target.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ProcessStage::Fetching
                | ProcessStage::Normalizing
                | ProcessStage::ComputingDeviation
                | ProcessStage::Storing
        )
    }

    /// Is `next` a legal transition from `self`?
    pub fn can_advance_to(self, next: ProcessStage) -> bool {
        use ProcessStage::*;
        match (self, next) {
            (Idle | Done | Failed(_), Fetching) => true,
            (Fetching, Normalizing) => true,
            (Normalizing, ComputingDeviation) => true,
            (ComputingDeviation, Storing) => true,
            (Storing, Done) => true,
            (from, Failed(_)) => from.is_in_flight(),
            _ => false,
        }
    }
}
