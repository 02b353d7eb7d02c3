//! OrchestratorBuilder - Orchestrator の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - source と store は必須。欠けていれば build() が BuildError を返す
//! - clock / id 生成器 / 各種設定は省略時にデフォルトを使う
//! - `from_config` は設定ファイルから本番用の実装（HTTP ソース + ファイルストア）を組み立てる

use std::path::PathBuf;
use std::sync::Arc;

use super::config::LumenConfig;
use super::orchestrator::Orchestrator;
use super::retry::RetryPolicy;
use super::stages::StageTable;
use crate::impls::{FsArtifactStore, HttpLightCurveSource};
use crate::pipeline::{BaselineKind, DeviationEngine, Fetcher, Normalizer, NormalizerConfig};
use crate::plot::{ComparisonAxis, PlotConfig, PlotError, PlotRenderer};
use crate::ports::{
    ArtifactStore, Clock, LightCurveSource, RunIdGenerator, SourceError, SystemClock,
    UlidGenerator,
};

pub const DEFAULT_PLOT_DIR: &str = "plots";

/// BuildError は Orchestrator 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}. Set it on the builder before build().")]
    MissingComponent(&'static str),

    #[error("invalid source: {0}")]
    Source(#[from] SourceError),

    #[error("invalid plot settings: {0}")]
    Plot(#[from] PlotError),
}

/// # 使用例
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .source(Arc::new(StaticLightCurveSource::new()))
///     .store(Arc::new(InMemoryArtifactStore::new()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct OrchestratorBuilder {
    source: Option<Arc<dyn LightCurveSource>>,
    store: Option<Arc<dyn ArtifactStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn RunIdGenerator>>,
    normalize: NormalizerConfig,
    baseline: BaselineKind,
    plot: PlotConfig,
    retry: RetryPolicy,
    plot_dir: Option<PathBuf>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Production wiring: HTTP source and filesystem store from `config`.
    pub fn from_config(config: &LumenConfig) -> Result<Self, BuildError> {
        let source =
            HttpLightCurveSource::new(&config.source.base_url, config.source.connect_timeout)?
                .with_max_file_bytes(config.source.max_file_bytes);
        Ok(Self::new()
            .source(Arc::new(source))
            .store(Arc::new(FsArtifactStore::new(&config.store_dir)))
            .normalizer(config.normalize.clone())
            .baseline(config.baseline)
            .plot(config.plot)
            .retry(config.retry.clone())
            .plot_dir(&config.plot_dir))
    }

    pub fn source(mut self, source: Arc<dyn LightCurveSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn run_ids(mut self, ids: Arc<dyn RunIdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn normalizer(mut self, config: NormalizerConfig) -> Self {
        self.normalize = config;
        self
    }

    pub fn baseline(mut self, baseline: BaselineKind) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn plot(mut self, plot: PlotConfig) -> Self {
        self.plot = plot;
        self
    }

    pub fn comparison_axis(mut self, axis: ComparisonAxis) -> Self {
        self.plot.comparison_axis = axis;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn plot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plot_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let source = self.source.ok_or(BuildError::MissingComponent("source"))?;
        let store = self.store.ok_or(BuildError::MissingComponent("store"))?;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let renderer = PlotRenderer::new(self.plot)?;

        Ok(Orchestrator {
            fetcher: Fetcher::new(source, Arc::clone(&clock)),
            normalizer: Arc::new(Normalizer::new(self.normalize)),
            engine: Arc::new(DeviationEngine::new(self.baseline)),
            store,
            renderer: Arc::new(renderer),
            clock,
            ids,
            retry: self.retry,
            plot_dir: self
                .plot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLOT_DIR)),
            comparison_axis: self.plot.comparison_axis,
            stages: Arc::new(StageTable::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryArtifactStore, StaticLightCurveSource};

    #[test]
    fn build_success() {
        let orchestrator = OrchestratorBuilder::new()
            .source(Arc::new(StaticLightCurveSource::new()))
            .store(Arc::new(InMemoryArtifactStore::new()))
            .build();
        assert!(orchestrator.is_ok());
    }

    #[test]
    fn build_missing_store() {
        let result = OrchestratorBuilder::new()
            .source(Arc::new(StaticLightCurveSource::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingComponent("store"))));
    }

    #[test]
    fn build_missing_source() {
        let result = OrchestratorBuilder::new()
            .store(Arc::new(InMemoryArtifactStore::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingComponent("source"))));
    }

    #[test]
    fn build_rejects_tiny_plot() {
        let result = OrchestratorBuilder::new()
            .source(Arc::new(StaticLightCurveSource::new()))
            .store(Arc::new(InMemoryArtifactStore::new()))
            .plot(PlotConfig {
                width: 20,
                ..PlotConfig::default()
            })
            .build();
        assert!(matches!(result, Err(BuildError::Plot(_))));
    }

    #[test]
    fn from_config_uses_configured_dirs() {
        let config = LumenConfig {
            plot_dir: PathBuf::from("/tmp/lumen-plots"),
            ..LumenConfig::default()
        };
        let orchestrator = OrchestratorBuilder::from_config(&config)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(orchestrator.plot_dir(), PathBuf::from("/tmp/lumen-plots"));
    }
}
