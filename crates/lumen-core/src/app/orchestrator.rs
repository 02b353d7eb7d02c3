//! Orchestrator - 外部操作の入口
//!
//! # 操作
//! - **process**: Fetcher → Normalizer → DeviationEngine → ArtifactStore
//! - **plot** / **compare**: ArtifactStore → PlotRenderer（保存は任意）
//! - **list** / **delete** / **status**
//!
//! # 並行性
//! - 異なるターゲットの process は並行に走る
//! - 同じターゲットの process は StageTable で高々 1 つ（2 つ目は AlreadyProcessing）
//! - plot / compare / delete は StageTable に参加しない。ストアの原子性により
//!   直近に完了した process の結果だけが見える
//! - normalize と描画は CPU 処理なので spawn_blocking で実行

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::config::ProcessOptions;
use super::retry::RetryPolicy;
use super::stages::{StageGuard, StageTable};
use super::status::StageCounts;
use crate::domain::{
    Artifact, ArtifactMetadata, DeviationSummary, ProcessStage, RunId, TargetId,
};
use crate::error::LumenError;
use crate::impls::write_atomic;
use crate::pipeline::{DeviationEngine, FetchReport, Fetcher, Normalizer, SkippedFile};
use crate::plot::{ComparisonAxis, PlotRenderer};
use crate::ports::{ArtifactStore, Clock, RunIdGenerator, StoreError};

/// Result of a successful `process`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub target: TargetId,
    pub run_id: RunId,
    pub files_used: usize,
    pub files_attempted: usize,
    pub files_skipped: Vec<SkippedFile>,
    pub summary: DeviationSummary,
}

/// Rendered PNG plus where it was saved, if it was.
#[derive(Debug, Clone)]
pub struct PlotOutput {
    pub bytes: Vec<u8>,
    pub path: Option<PathBuf>,
}

pub struct Orchestrator {
    pub(super) fetcher: Fetcher,
    pub(super) normalizer: Arc<Normalizer>,
    pub(super) engine: Arc<DeviationEngine>,
    pub(super) store: Arc<dyn ArtifactStore>,
    pub(super) renderer: Arc<PlotRenderer>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn RunIdGenerator>,
    pub(super) retry: RetryPolicy,
    pub(super) plot_dir: PathBuf,
    pub(super) comparison_axis: ComparisonAxis,
    pub(super) stages: Arc<StageTable>,
}

impl Orchestrator {
    /// Fetch, normalize, compute and store the artifact for `target`.
    ///
    /// Any failure leaves a previously stored artifact untouched.
    pub async fn process(
        &self,
        target: TargetId,
        options: &ProcessOptions,
    ) -> Result<ProcessOutcome, LumenError> {
        options.validate()?;
        let guard = self
            .stages
            .claim(target)
            .ok_or(LumenError::AlreadyProcessing(target))?;
        info!(%target, timeout = ?options.timeout, max_files = ?options.max_files, "process started");

        match self.run(&guard, options).await {
            Ok(outcome) => {
                info!(
                    %target,
                    run_id = %outcome.run_id,
                    files_used = outcome.files_used,
                    samples = outcome.summary.count,
                    max_abs = outcome.summary.max_abs,
                    "process finished"
                );
                guard.finish();
                Ok(outcome)
            }
            Err(e) => {
                warn!(%target, code = %e.code(), error = %e, "process failed");
                guard.fail(e.code());
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        guard: &StageGuard,
        options: &ProcessOptions,
    ) -> Result<ProcessOutcome, LumenError> {
        let target = guard.target();

        let report = self.fetch_with_retry(target, options).await?;
        let FetchReport {
            files,
            attempted,
            skipped,
        } = report;
        let files_used = files.len();

        guard.advance(ProcessStage::Normalizing);
        let normalizer = Arc::clone(&self.normalizer);
        let params = options.normalize_params();
        let series = tokio::task::spawn_blocking(move || normalizer.normalize(&files, &params))
            .await
            .map_err(|e| LumenError::Internal(format!("normalize task failed: {e}")))??;

        guard.advance(ProcessStage::ComputingDeviation);
        let deviation = self.engine.compute(&series);

        let metadata = ArtifactMetadata {
            run_id: self.ids.generate_run_id(),
            files_used,
            files_attempted: attempted,
            files_skipped: skipped.len(),
            created_at: self.clock.now(),
            params: options.source_params(),
        };
        let artifact = Artifact::new(target, series, deviation, metadata)?;

        guard.advance(ProcessStage::Storing);
        self.store.put(target, &artifact).await?;

        Ok(ProcessOutcome {
            target,
            run_id: artifact.metadata().run_id,
            files_used,
            files_attempted: attempted,
            files_skipped: skipped,
            summary: *artifact.summary(),
        })
    }

    async fn fetch_with_retry(
        &self,
        target: TargetId,
        options: &ProcessOptions,
    ) -> Result<FetchReport, LumenError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .fetcher
                .fetch(target, options.timeout, options.max_files)
                .await
            {
                Ok(report) => return Ok(report),
                Err(e) if self.retry.should_retry(attempts) => {
                    let delay = self.retry.next_delay(attempts);
                    warn!(%target, attempts, ?delay, error = %e, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Render the deviation plot of one processed target.
    pub async fn plot(&self, target: TargetId, save: bool) -> Result<PlotOutput, LumenError> {
        let artifact = self.load_for_plot(target).await?;

        let renderer = Arc::clone(&self.renderer);
        let bytes = tokio::task::spawn_blocking(move || renderer.render_single(&artifact))
            .await
            .map_err(|e| LumenError::Internal(format!("render task failed: {e}")))??;

        let path = if save {
            let path = self
                .plot_dir
                .join(format!("{}_deviation.png", target.storage_key()));
            self.save_plot(&path, &bytes).await?;
            Some(path)
        } else {
            None
        };
        Ok(PlotOutput { bytes, path })
    }

    /// Overlay several processed targets, in the given order.
    ///
    /// Fails with `MissingArtifact` naming the first target without an artifact.
    pub async fn compare(
        &self,
        targets: &[TargetId],
        save: bool,
    ) -> Result<PlotOutput, LumenError> {
        if targets.is_empty() {
            return Err(LumenError::EmptyInput);
        }

        let mut artifacts = Vec::with_capacity(targets.len());
        for &target in targets {
            artifacts.push(self.load_for_plot(target).await?);
        }

        let renderer = Arc::clone(&self.renderer);
        let axis = self.comparison_axis;
        let bytes =
            tokio::task::spawn_blocking(move || renderer.render_comparison(&artifacts, axis))
                .await
                .map_err(|e| LumenError::Internal(format!("render task failed: {e}")))??;

        let path = if save {
            let ids: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
            let path = self
                .plot_dir
                .join(format!("comparison_{}.png", ids.join("_")));
            self.save_plot(&path, &bytes).await?;
            Some(path)
        } else {
            None
        };
        Ok(PlotOutput { bytes, path })
    }

    /// Targets that currently have a stored artifact.
    pub async fn list(&self) -> Result<BTreeSet<TargetId>, LumenError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, target: TargetId) -> Result<Artifact, LumenError> {
        self.store.get(target).await.map_err(|e| match e {
            StoreError::NotFound(t) => LumenError::NotFound(t),
            e => e.into(),
        })
    }

    /// Remove the stored artifact of `target`.
    pub async fn delete(&self, target: TargetId) -> Result<(), LumenError> {
        match self.store.delete(target).await {
            Ok(()) => {
                self.stages.forget(target);
                info!(%target, "artifact deleted");
                Ok(())
            }
            Err(StoreError::NotFound(t)) => Err(LumenError::NotFound(t)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn status(&self, target: TargetId) -> ProcessStage {
        self.stages.get(target)
    }

    pub fn status_counts(&self) -> StageCounts {
        self.stages.counts()
    }

    pub fn plot_dir(&self) -> &Path {
        &self.plot_dir
    }

    async fn load_for_plot(&self, target: TargetId) -> Result<Artifact, LumenError> {
        self.store.get(target).await.map_err(|e| match e {
            StoreError::NotFound(t) => LumenError::MissingArtifact(t),
            e => e.into(),
        })
    }

    async fn save_plot(&self, path: &Path, bytes: &[u8]) -> Result<(), LumenError> {
        write_atomic(path, bytes)
            .await
            .map_err(|e| LumenError::Store(StoreError::Io(e)))?;
        info!(path = %path.display(), bytes = bytes.len(), "plot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::OrchestratorBuilder;
    use crate::domain::{ReasonCode, Sample, SUMMARY_TOLERANCE};
    use crate::impls::{FsArtifactStore, InMemoryArtifactStore, StaticLightCurveSource};
    use crate::pipeline::render_csv;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    const KEPLER: TargetId = TargetId::new(12345);
    const EMPTY: TargetId = TargetId::new(99999);

    /// One quarter of synthetic photometry: noisy flat level with a 1% dip around `dip_at`.
    fn quarter(start: f64, dip_at: f64) -> Vec<u8> {
        let samples: Vec<Sample> = (0..400)
            .map(|i| {
                let t = start + i as f64 * 0.02;
                let level = if (t - dip_at).abs() < 0.1 { 990.0 } else { 1000.0 };
                let noise = 5.0 * (i as f64 * 1.7).sin();
                Sample::new(t, level + noise, 1.0, 0)
            })
            .collect();
        render_csv(&samples).unwrap()
    }

    fn kepler_source() -> StaticLightCurveSource {
        StaticLightCurveSource::new()
            .with_file(KEPLER, "q1", quarter(0.0, 3.0))
            .with_file(KEPLER, "q2", quarter(10.0, 13.0))
            .with_failing_file(KEPLER, "q3", "connection reset by peer")
            .with_file(KEPLER, "q4", quarter(30.0, 33.0))
            .with_file(KEPLER, "q5", quarter(40.0, 43.0))
            .with_failing_file(EMPTY, "q1", "503 service unavailable")
            .with_failing_file(EMPTY, "q2", "503 service unavailable")
    }

    fn orchestrator(source: StaticLightCurveSource) -> Orchestrator {
        OrchestratorBuilder::new()
            .source(Arc::new(source))
            .store(Arc::new(InMemoryArtifactStore::new()))
            .build()
            .unwrap()
    }

    fn options() -> ProcessOptions {
        ProcessOptions {
            timeout: Duration::from_secs(180),
            ..ProcessOptions::default()
        }
    }

    #[tokio::test]
    async fn partial_fetch_still_stores_artifact() {
        let orch = orchestrator(kepler_source());

        let outcome = orch.process(KEPLER, &options()).await.unwrap();
        assert_eq!(outcome.files_used, 4);
        assert_eq!(outcome.files_attempted, 5);
        assert_eq!(outcome.files_skipped.len(), 1);
        assert_eq!(outcome.files_skipped[0].name, "q3");

        assert!(orch.list().await.unwrap().contains(&KEPLER));
        assert_eq!(orch.status(KEPLER), ProcessStage::Done);

        let stored = orch.get(KEPLER).await.unwrap();
        assert_eq!(stored.metadata().files_used, 4);
        assert_eq!(stored.metadata().params.timeout, Duration::from_secs(180));
        assert_eq!(*stored.summary(), outcome.summary);
    }

    #[tokio::test]
    async fn stored_summary_matches_recomputation() {
        let orch = orchestrator(kepler_source());
        orch.process(KEPLER, &options()).await.unwrap();

        let stored = orch.get(KEPLER).await.unwrap();
        let fresh = DeviationSummary::from_points(stored.deviation().points());
        assert!(stored.summary().approx_eq(&fresh, SUMMARY_TOLERANCE));
        // the dips show up as negative deviation
        assert!(stored.summary().min < -0.1);
    }

    #[tokio::test]
    async fn all_downloads_failing_is_no_data() {
        let orch = orchestrator(kepler_source());

        let err = orch.process(EMPTY, &options()).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::NoDataAvailable);
        assert!(!orch.list().await.unwrap().contains(&EMPTY));
        assert_eq!(
            orch.status(EMPTY),
            ProcessStage::Failed(ReasonCode::NoDataAvailable)
        );
    }

    #[tokio::test]
    async fn failed_rerun_keeps_previous_artifact() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let good = OrchestratorBuilder::new()
            .source(Arc::new(kepler_source()))
            .store(store.clone())
            .build()
            .unwrap();
        good.process(KEPLER, &options()).await.unwrap();
        let before = store.get(KEPLER).await.unwrap();

        let broken = OrchestratorBuilder::new()
            .source(Arc::new(
                StaticLightCurveSource::new().with_failing_file(KEPLER, "q1", "down"),
            ))
            .store(store.clone())
            .build()
            .unwrap();
        let err = broken.process(KEPLER, &options()).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::NoDataAvailable);
        assert_eq!(store.get(KEPLER).await.unwrap(), before);
    }

    #[tokio::test]
    async fn too_few_samples_is_insufficient() {
        let tiny =
            render_csv(&[Sample::new(1.0, 10.0, 1.0, 0), Sample::new(2.0, 10.0, 1.0, 0)]).unwrap();
        let orch = orchestrator(StaticLightCurveSource::new().with_file(KEPLER, "q1", tiny));

        let err = orch.process(KEPLER, &options()).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::InsufficientSamples);
        assert!(orch.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_span_is_not_stored_as_flat_artifact() {
        // enough samples, but all of them land in one 0.5 day bin
        let samples: Vec<Sample> = (0..12)
            .map(|i| Sample::new(i as f64 * 0.02, 1000.0 + i as f64, 1.0, 0))
            .collect();
        let orch = orchestrator(
            StaticLightCurveSource::new().with_file(KEPLER, "q1", render_csv(&samples).unwrap()),
        );

        let err = orch.process(KEPLER, &ProcessOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::InsufficientSamples);
        assert!(orch.list().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_process_for_one_target_is_rejected() {
        let source = StaticLightCurveSource::new()
            .with_slow_file(KEPLER, "q1", quarter(0.0, 3.0), Duration::from_millis(300));
        let orch = Arc::new(orchestrator(source));

        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.process(KEPLER, &options()).await })
        };
        // let the first run claim the slot
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(orch.status(KEPLER), ProcessStage::Fetching);

        let second = orch.process(KEPLER, &options()).await.unwrap_err();
        assert_eq!(second.code(), ReasonCode::AlreadyProcessing);

        first.await.unwrap().unwrap();
        assert_eq!(orch.status(KEPLER), ProcessStage::Done);
        orch.get(KEPLER).await.unwrap().validate().unwrap();

        // serial re-run after completion is accepted
        orch.process(KEPLER, &options()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn different_targets_run_concurrently() {
        let other = TargetId::new(777);
        let source = StaticLightCurveSource::new()
            .with_slow_file(KEPLER, "q1", quarter(0.0, 3.0), Duration::from_millis(200))
            .with_slow_file(other, "q1", quarter(0.0, 5.0), Duration::from_millis(200));
        let orch = Arc::new(orchestrator(source));

        let opts = options();
        let (a, b) = tokio::join!(orch.process(KEPLER, &opts), orch.process(other, &opts));
        a.unwrap();
        b.unwrap();
        assert_eq!(orch.status_counts().done, 2);
    }

    #[tokio::test]
    async fn cancelled_process_releases_slot() {
        let source = StaticLightCurveSource::new()
            .with_slow_file(KEPLER, "q1", quarter(0.0, 3.0), Duration::from_secs(30));
        let orch = orchestrator(source);

        let result =
            tokio::time::timeout(Duration::from_millis(50), orch.process(KEPLER, &options())).await;
        assert!(result.is_err());
        assert_eq!(orch.status(KEPLER), ProcessStage::Failed(ReasonCode::Cancelled));
        assert_eq!(orch.status_counts().in_flight(), 0);
    }

    #[tokio::test]
    async fn fetch_is_retried_per_policy() {
        let source = Arc::new(StaticLightCurveSource::new().with_failing_file(EMPTY, "q1", "down"));
        let orch = OrchestratorBuilder::new()
            .source(source.clone())
            .store(Arc::new(InMemoryArtifactStore::new()))
            .retry(RetryPolicy::with_attempts(3, Duration::from_millis(1)))
            .build()
            .unwrap();

        let err = orch.process(EMPTY, &options()).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::NoDataAvailable);
        assert_eq!(source.downloads(), 3);
    }

    #[tokio::test]
    async fn plot_after_process_and_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let orch = OrchestratorBuilder::new()
            .source(Arc::new(kepler_source()))
            .store(Arc::new(InMemoryArtifactStore::new()))
            .plot_dir(dir.path())
            .build()
            .unwrap();
        orch.process(KEPLER, &options()).await.unwrap();

        let plot = orch.plot(KEPLER, false).await.unwrap();
        assert!(!plot.bytes.is_empty());
        assert!(plot.path.is_none());

        let saved = orch.plot(KEPLER, true).await.unwrap();
        let path = saved.path.unwrap();
        assert!(path.ends_with("kic_12345_deviation.png"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), saved.bytes);

        let err = orch.plot(EMPTY, false).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::MissingArtifact);
    }

    #[tokio::test]
    async fn compare_validates_inputs() {
        let other = TargetId::new(777);
        let source = kepler_source().with_file(other, "q1", quarter(0.0, 2.0));
        let orch = orchestrator(source);
        orch.process(KEPLER, &options()).await.unwrap();
        orch.process(other, &options()).await.unwrap();

        let err = orch.compare(&[], false).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::EmptyInput);

        let err = orch
            .compare(&[KEPLER, EMPTY, other], false)
            .await
            .unwrap_err();
        assert!(matches!(err, LumenError::MissingArtifact(t) if t == EMPTY));

        let plot = orch.compare(&[other, KEPLER], false).await.unwrap();
        assert!(!plot.bytes.is_empty());
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let orch = OrchestratorBuilder::new()
            .source(Arc::new(kepler_source()))
            .store(Arc::new(FsArtifactStore::new(dir.path())))
            .build()
            .unwrap();
        orch.process(KEPLER, &options()).await.unwrap();

        orch.delete(KEPLER).await.unwrap();
        assert_eq!(orch.get(KEPLER).await.unwrap_err().code(), ReasonCode::NotFound);
        assert!(!orch.list().await.unwrap().contains(&KEPLER));
        assert_eq!(orch.status(KEPLER), ProcessStage::Idle);
        assert_eq!(
            orch.delete(KEPLER).await.unwrap_err().code(),
            ReasonCode::NotFound
        );
    }

    #[tokio::test]
    async fn metadata_uses_injected_clock() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let orch = OrchestratorBuilder::new()
            .source(Arc::new(kepler_source()))
            .store(Arc::new(InMemoryArtifactStore::new()))
            .clock(Arc::new(FixedClock::new(at)))
            .build()
            .unwrap();

        let outcome = orch.process(KEPLER, &options()).await.unwrap();
        let stored = orch.get(KEPLER).await.unwrap();
        assert_eq!(stored.metadata().created_at, at);
        assert_eq!(
            outcome.run_id.as_ulid().timestamp_ms(),
            at.timestamp_millis() as u64
        );
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_claiming() {
        let orch = orchestrator(kepler_source());
        let bad = ProcessOptions {
            timeout: Duration::ZERO,
            ..ProcessOptions::default()
        };
        let err = orch.process(KEPLER, &bad).await.unwrap_err();
        assert_eq!(err.code(), ReasonCode::InvalidConfig);
        assert_eq!(orch.status(KEPLER), ProcessStage::Idle);
    }
}
