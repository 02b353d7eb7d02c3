//! StaticLightCurveSource - インメモリの上流ソース（テスト・デモ用）
//!
//! 決まった CSV を返すだけのソース。失敗するファイルや遅いファイルも
//! 仕込めるので、部分成功やタイムアウトの経路をネットワークなしで再現できます。
//!
//! URL は `memory://{target}/{name}` 形式。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::TargetId;
use crate::ports::{CandidateFile, LightCurveSource, SourceError};

#[derive(Debug, Clone)]
enum Behavior {
    Serve(Vec<u8>),
    Fail(String),
    Slow(Vec<u8>, Duration),
}

#[derive(Debug, Default)]
pub struct StaticLightCurveSource {
    targets: HashMap<TargetId, Vec<CandidateFile>>,
    files: HashMap<String, Behavior>,
    downloads: AtomicUsize,
}

impl StaticLightCurveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, target: TargetId, name: &str, body: impl Into<Vec<u8>>) -> Self {
        self.add(target, name, Behavior::Serve(body.into()))
    }

    /// A file that is advertised but whose download fails with `message`.
    pub fn with_failing_file(self, target: TargetId, name: &str, message: &str) -> Self {
        self.add(target, name, Behavior::Fail(message.to_string()))
    }

    /// A file that only arrives after `delay`.
    pub fn with_slow_file(
        self,
        target: TargetId,
        name: &str,
        body: impl Into<Vec<u8>>,
        delay: Duration,
    ) -> Self {
        self.add(target, name, Behavior::Slow(body.into(), delay))
    }

    /// Downloads started so far, including failed ones.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn add(mut self, target: TargetId, name: &str, behavior: Behavior) -> Self {
        let url = format!("memory://{target}/{name}");
        self.targets
            .entry(target)
            .or_default()
            .push(CandidateFile::new(name, url.clone()));
        self.files.insert(url, behavior);
        self
    }
}

#[async_trait]
impl LightCurveSource for StaticLightCurveSource {
    async fn discover(&self, target: TargetId) -> Result<Vec<CandidateFile>, SourceError> {
        Ok(self.targets.get(&target).cloned().unwrap_or_default())
    }

    async fn download(&self, candidate: &CandidateFile) -> Result<Vec<u8>, SourceError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        match self.files.get(&candidate.url) {
            Some(Behavior::Serve(body)) => Ok(body.clone()),
            Some(Behavior::Fail(message)) => Err(SourceError::Transport(message.clone())),
            Some(Behavior::Slow(body, delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(body.clone())
            }
            None => Err(SourceError::Status {
                status: 404,
                url: candidate.url.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: TargetId = TargetId::new(7);

    #[tokio::test]
    async fn discover_keeps_insertion_order() {
        let source = StaticLightCurveSource::new()
            .with_file(TARGET, "b", "x")
            .with_file(TARGET, "a", "y");
        let names: Vec<String> = source
            .discover(TARGET)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn unknown_target_is_empty() {
        let source = StaticLightCurveSource::new();
        assert!(source.discover(TARGET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_file_counts_as_download() {
        let source = StaticLightCurveSource::new().with_failing_file(TARGET, "a", "reset");
        let candidate = source.discover(TARGET).await.unwrap().remove(0);
        assert!(matches!(
            source.download(&candidate).await,
            Err(SourceError::Transport(m)) if m == "reset"
        ));
        assert_eq!(source.downloads(), 1);
    }

    #[tokio::test]
    async fn unadvertised_url_is_404() {
        let source = StaticLightCurveSource::new();
        let err = source
            .download(&CandidateFile::new("x", "memory://7/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 404, .. }));
    }
}
