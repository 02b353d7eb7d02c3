//! lumen-core
//!
//! Core building blocks for the Lumen light-curve pipeline: fetch photometry
//! for a target, normalize it, compute its deviation from baseline, store the
//! result and render plots.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, observation, series, deviation, artifact, state, errors）
//! - **ports**: 抽象化レイヤー（LightCurveSource, ArtifactStore, Clock, RunIdGenerator）
//! - **pipeline**: Fetcher / Normalizer / DeviationEngine と CSV コーデック
//! - **plot**: PlotRenderer（PNG）
//! - **impls**: ports の実装（HTTP / インメモリのソース、ファイル / インメモリのストア）
//! - **app**: Orchestrator, builder, 設定, リトライ
//! - **error**: 操作レベルのエラー（LumenError）と ReasonCode への対応

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod pipeline;
pub mod plot;
pub mod ports;

pub use app::{LumenConfig, Orchestrator, OrchestratorBuilder, ProcessOptions, ProcessOutcome};
pub use domain::{ReasonCode, TargetId};
pub use error::LumenError;
