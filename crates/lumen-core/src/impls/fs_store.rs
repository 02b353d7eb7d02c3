//! FsArtifactStore - ファイルシステム上の ArtifactStore
//!
//! # 配置
//! `<root>/kic_<id>.json` に 1 ターゲット 1 ファイル（serde_json）。
//!
//! # 実装
//! - put: 一時ファイルに書いて rename（`atomic_file::write_atomic`）
//! - get: デコード失敗・整合性チェック失敗は `StoreError::Corrupt`
//! - list: `kic_<id>.json` だけを数える（一時ファイルや他のファイルは無視）

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::atomic_file::{is_tmp_name, write_atomic};
use crate::domain::{Artifact, TargetId};
use crate::ports::{ArtifactStore, StoreError};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, target: TargetId) -> PathBuf {
        self.root
            .join(format!("{}.{EXTENSION}", target.storage_key()))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, target: TargetId, artifact: &Artifact) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(artifact)?;
        let path = self.path_for(target);
        write_atomic(&path, &bytes).await?;
        debug!(%target, path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(())
    }

    async fn get(&self, target: TargetId) -> Result<Artifact, StoreError> {
        let bytes = match tokio::fs::read(self.path_for(target)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(target));
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| StoreError::Corrupt { target, reason };
        let artifact: Artifact =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        artifact.validate().map_err(|e| corrupt(e.to_string()))?;
        if artifact.target() != target {
            return Err(corrupt(format!(
                "record belongs to target {}",
                artifact.target()
            )));
        }
        Ok(artifact)
    }

    async fn exists(&self, target: TargetId) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.path_for(target)).await?)
    }

    async fn list(&self) -> Result<BTreeSet<TargetId>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut targets = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_tmp_name(name) {
                continue;
            }
            if let Some(target) = name
                .strip_suffix(".json")
                .and_then(TargetId::from_storage_key)
            {
                targets.insert(target);
            }
        }
        Ok(targets)
    }

    async fn delete(&self, target: TargetId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(target)).await {
            Ok(()) => {
                debug!(%target, "artifact deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(target)),
            Err(e) => Err(e.into()),
        }
    }
}
