//! ArtifactStore port - 処理結果の永続化
//!
//! ArtifactStore は TargetId ごとに 1 件の Artifact を保存します。
//!
//! # 設計原則
//! - put は上書き（append しない）
//! - put は get/list に対してアトミック（古い版か新しい版のどちらかしか見えない）
//! - delete 後の get/list は即座に削除を反映する

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Artifact, TargetId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no artifact stored for target {0}")]
    NotFound(TargetId),

    #[error("stored artifact for target {target} is corrupt: {reason}")]
    Corrupt { target: TargetId, reason: String },

    #[error("artifact store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `artifact` under `target`, replacing any previous one.
    async fn put(&self, target: TargetId, artifact: &Artifact) -> Result<(), StoreError>;

    async fn get(&self, target: TargetId) -> Result<Artifact, StoreError>;

    async fn exists(&self, target: TargetId) -> Result<bool, StoreError> {
        match self.get(target).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// All targets that currently have an artifact.
    async fn list(&self) -> Result<BTreeSet<TargetId>, StoreError>;

    /// Remove every trace of `target`. `NotFound` when there was nothing to remove.
    async fn delete(&self, target: TargetId) -> Result<(), StoreError>;
}
