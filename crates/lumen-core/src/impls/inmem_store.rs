//! InMemoryArtifactStore - テスト・開発用の ArtifactStore
//!
//! RwLock<HashMap> 1 つで保持。put は値の差し替えなので get からは
//! 古い版か新しい版しか見えません。

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Artifact, TargetId};
use crate::ports::{ArtifactStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<TargetId, Artifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, target: TargetId, artifact: &Artifact) -> Result<(), StoreError> {
        self.artifacts.write().await.insert(target, artifact.clone());
        Ok(())
    }

    async fn get(&self, target: TargetId) -> Result<Artifact, StoreError> {
        self.artifacts
            .read()
            .await
            .get(&target)
            .cloned()
            .ok_or(StoreError::NotFound(target))
    }

    async fn exists(&self, target: TargetId) -> Result<bool, StoreError> {
        Ok(self.artifacts.read().await.contains_key(&target))
    }

    async fn list(&self) -> Result<BTreeSet<TargetId>, StoreError> {
        Ok(self.artifacts.read().await.keys().copied().collect())
    }

    async fn delete(&self, target: TargetId) -> Result<(), StoreError> {
        match self.artifacts.write().await.remove(&target) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(target)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::fixtures::artifact;

    #[tokio::test]
    async fn behaves_like_a_store() {
        let store = InMemoryArtifactStore::new();
        let target = TargetId::new(42);
        assert!(!store.exists(target).await.unwrap());

        store.put(target, &artifact(42, 6)).await.unwrap();
        assert_eq!(store.get(target).await.unwrap(), artifact(42, 6));
        assert_eq!(store.list().await.unwrap().into_iter().collect::<Vec<_>>(), vec![target]);

        store.delete(target).await.unwrap();
        assert!(matches!(store.get(target).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(target).await, Err(StoreError::NotFound(_))));
    }
}
