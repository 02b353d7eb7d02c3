//! App - アプリケーション層
//!
//! このモジュールは、ports と pipeline を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **OrchestratorBuilder**: Orchestrator の構築とワイヤリング
//! - **Orchestrator**: process / plot / compare / list / delete / status
//! - **StageTable**: ターゲットごとの処理状態（at-most-one-in-flight）
//! - **LumenConfig**: 設定の読み込み（figment）
//! - **RetryPolicy**: fetch 段のリトライ

pub mod builder;
pub mod config;
pub mod orchestrator;
pub mod retry;
pub mod stages;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::config::{ConfigError, LumenConfig, ProcessOptions, SourceConfig};
pub use self::orchestrator::{Orchestrator, PlotOutput, ProcessOutcome};
pub use self::retry::RetryPolicy;
pub use self::stages::{StageGuard, StageTable};
pub use self::status::StageCounts;
