//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpLightCurveSource**: 本番用の上流ソース（reqwest）
//! - **StaticLightCurveSource**: テスト・デモ用のインメモリソース
//! - **FsArtifactStore**: 本番用の正本（JSON ファイル、一時ファイル + rename）
//! - **InMemoryArtifactStore**: テスト用の正本

pub mod atomic_file;
pub mod fs_store;
pub mod http_source;
pub mod inmem_store;
pub mod static_source;

// 主要な型を再エクスポート
pub use self::atomic_file::write_atomic;
pub use self::fs_store::FsArtifactStore;
pub use self::http_source::HttpLightCurveSource;
pub use self::inmem_store::InMemoryArtifactStore;
pub use self::static_source::StaticLightCurveSource;
