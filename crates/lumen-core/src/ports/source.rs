//! LightCurveSource port - 上流データソース（MAST ミラーなど）
//!
//! Fetcher はこの trait だけを見ます。HTTP 実装とテスト用のインメモリ実装は
//! `impls` にあります。
//!
//! # 設計原則
//! - discover は候補ファイルを「ソース順」で返す（max_files は先頭 N 件）
//! - download は 1 ファイル分の生バイト列を返すだけ（パースは Fetcher 側）
//! - リトライはしない（Orchestrator の責務）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TargetId;

/// A downloadable light-curve file advertised by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    pub name: String,
    pub url: String,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("{url} exceeds the {limit} byte file limit")]
    TooLarge { url: String, limit: u64 },
}

#[async_trait]
pub trait LightCurveSource: Send + Sync {
    /// List candidate files for `target`, in source order.
    ///
    /// A target the source does not know yields an empty list, not an error.
    async fn discover(&self, target: TargetId) -> Result<Vec<CandidateFile>, SourceError>;

    /// Download one candidate's raw bytes.
    async fn download(&self, candidate: &CandidateFile) -> Result<Vec<u8>, SourceError>;
}
