//! StageTable - ターゲットごとの process 状態表
//!
//! # 不変条件
//! - 1 ターゲットにつき実行中の process は高々 1 つ
//! - Mutex は await をまたいで保持しない（すべての操作は同期で即座に終わる）
//!
//! `claim` が返す `StageGuard` が実行中スロットを表します。guard が
//! `finish` / `fail` されずに drop された場合（future のキャンセルなど）は
//! `Failed(Cancelled)` を記録し、スロットは必ず解放されます。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::status::StageCounts;
use crate::domain::{ProcessStage, ReasonCode, TargetId};

#[derive(Debug, Default)]
pub struct StageTable {
    stages: Mutex<HashMap<TargetId, ProcessStage>>,
}

impl StageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the in-flight slot for `target`, moving it to `Fetching`.
    ///
    /// Returns `None` when a run is already in flight for that target.
    pub fn claim(self: &Arc<Self>, target: TargetId) -> Option<StageGuard> {
        let mut stages = self.lock();
        let current = stages.get(&target).copied().unwrap_or_default();
        if current.is_in_flight() {
            return None;
        }
        stages.insert(target, ProcessStage::Fetching);
        Some(StageGuard {
            table: Arc::clone(self),
            target,
            released: false,
        })
    }

    pub fn get(&self, target: TargetId) -> ProcessStage {
        self.lock().get(&target).copied().unwrap_or_default()
    }

    pub fn counts(&self) -> StageCounts {
        StageCounts::from_stages(self.lock().values().copied())
    }

    /// Drop the record for `target` unless a run is in flight.
    pub fn forget(&self, target: TargetId) {
        let mut stages = self.lock();
        if !stages.get(&target).is_some_and(|s| s.is_in_flight()) {
            stages.remove(&target);
        }
    }

    fn set(&self, target: TargetId, next: ProcessStage) {
        let mut stages = self.lock();
        let current = stages.get(&target).copied().unwrap_or_default();
        if !current.can_advance_to(next) {
            warn!(%target, ?current, ?next, "unexpected stage transition");
        }
        stages.insert(target, next);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TargetId, ProcessStage>> {
        // the map stays consistent even if a holder panicked
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The in-flight slot of one target.
#[derive(Debug)]
pub struct StageGuard {
    table: Arc<StageTable>,
    target: TargetId,
    released: bool,
}

impl StageGuard {
    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn advance(&self, next: ProcessStage) {
        debug!(target = %self.target, stage = ?next, "stage");
        self.table.set(self.target, next);
    }

    pub fn finish(mut self) {
        self.release(ProcessStage::Done);
    }

    pub fn fail(mut self, reason: ReasonCode) {
        self.release(ProcessStage::Failed(reason));
    }

    fn release(&mut self, stage: ProcessStage) {
        self.table.set(self.target, stage);
        self.released = true;
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(target = %self.target, "process abandoned before completion");
            self.release(ProcessStage::Failed(ReasonCode::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: TargetId = TargetId::new(12345);

    #[test]
    fn second_claim_is_refused_while_in_flight() {
        let table = Arc::new(StageTable::new());
        let guard = table.claim(T).unwrap();
        assert!(table.claim(T).is_none());
        assert!(table.claim(TargetId::new(1)).is_some());

        guard.finish();
        assert_eq!(table.get(T), ProcessStage::Done);
        assert!(table.claim(T).is_some());
    }

    #[test]
    fn failed_runs_release_the_slot() {
        let table = Arc::new(StageTable::new());
        let guard = table.claim(T).unwrap();
        guard.advance(ProcessStage::Normalizing);
        guard.fail(ReasonCode::InsufficientSamples);

        assert_eq!(
            table.get(T),
            ProcessStage::Failed(ReasonCode::InsufficientSamples)
        );
        assert!(table.claim(T).is_some());
    }

    #[test]
    fn dropped_guard_records_cancellation() {
        let table = Arc::new(StageTable::new());
        drop(table.claim(T).unwrap());
        assert_eq!(table.get(T), ProcessStage::Failed(ReasonCode::Cancelled));
    }

    #[test]
    fn counts_and_forget() {
        let table = Arc::new(StageTable::new());
        let running = table.claim(T).unwrap();
        table.claim(TargetId::new(2)).unwrap().finish();

        let counts = table.counts();
        assert_eq!(counts.fetching, 1);
        assert_eq!(counts.done, 1);

        table.forget(T);
        table.forget(TargetId::new(2));
        assert_eq!(table.get(T), ProcessStage::Fetching);
        assert_eq!(table.get(TargetId::new(2)), ProcessStage::Idle);
        drop(running);
    }
}
