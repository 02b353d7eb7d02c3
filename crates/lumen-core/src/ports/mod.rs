//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（上流データソース、ファイルシステム、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod artifact_store;
pub mod clock;
pub mod id_generator;
pub mod source;

// 主要な trait を再エクスポート
pub use self::artifact_store::{ArtifactStore, StoreError};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{RunIdGenerator, UlidGenerator};
pub use self::source::{CandidateFile, LightCurveSource, SourceError};
