//! Fetcher: download every candidate file for a target, tolerating partial failure.
//!
//! Policy:
//! - candidates are attempted sequentially in source order, first `max_files` only
//! - each download is bounded by `timeout`; expiry drops that file only
//! - transport errors and malformed files are skipped the same way
//! - the call fails with `NoDataAvailable` only if nothing succeeded
//! - no retries here; the orchestrator owns retry policy

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::codec::parse_csv;
use crate::domain::{Provenance, RawObservationFile, TargetId};
use crate::ports::{CandidateFile, Clock, LightCurveSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Timeout,
    Transport(String),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub url: String,
    pub reason: SkipReason,
}

/// Successful fetch result, possibly partial.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub files: Vec<RawObservationFile>,

    /// Candidates actually attempted (after the `max_files` cap).
    pub attempted: usize,
    pub skipped: Vec<SkippedFile>,
}

impl FetchReport {
    pub fn files_used(&self) -> usize {
        self.files.len()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no data available for target {target}: {detail}")]
    NoDataAvailable {
        target: TargetId,
        attempted: usize,
        detail: String,
    },
}

pub struct Fetcher {
    source: Arc<dyn LightCurveSource>,
    clock: Arc<dyn Clock>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn LightCurveSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    pub async fn fetch(
        &self,
        target: TargetId,
        timeout: Duration,
        max_files: Option<usize>,
    ) -> Result<FetchReport, FetchError> {
        let mut candidates =
            self.source
                .discover(target)
                .await
                .map_err(|e| FetchError::NoDataAvailable {
                    target,
                    attempted: 0,
                    detail: format!("discovery failed: {e}"),
                })?;

        if candidates.is_empty() {
            return Err(FetchError::NoDataAvailable {
                target,
                attempted: 0,
                detail: "no light curves found".to_string(),
            });
        }

        if let Some(limit) = max_files
            && limit < candidates.len()
        {
            info!(%target, limit, available = candidates.len(), "limiting candidate files");
            candidates.truncate(limit);
        } else {
            info!(%target, available = candidates.len(), "found candidate files");
        }

        let attempted = candidates.len();
        let mut files = Vec::with_capacity(attempted);
        let mut skipped = Vec::new();

        for (source_index, candidate) in candidates.iter().enumerate() {
            debug!(%target, file = %candidate.name, n = source_index + 1, of = attempted, "downloading");
            match self.fetch_one(candidate, source_index, timeout).await {
                Ok(file) => files.push(file),
                Err(reason) => {
                    warn!(%target, file = %candidate.name, ?reason, "skipping file");
                    skipped.push(SkippedFile {
                        name: candidate.name.clone(),
                        url: candidate.url.clone(),
                        reason,
                    });
                }
            }
        }

        if files.is_empty() {
            return Err(FetchError::NoDataAvailable {
                target,
                attempted,
                detail: format!("all {attempted} downloads failed"),
            });
        }

        info!(
            %target,
            files_used = files.len(),
            files_skipped = skipped.len(),
            "fetch finished"
        );
        Ok(FetchReport {
            files,
            attempted,
            skipped,
        })
    }

    async fn fetch_one(
        &self,
        candidate: &CandidateFile,
        source_index: usize,
        timeout: Duration,
    ) -> Result<RawObservationFile, SkipReason> {
        let bytes = match tokio::time::timeout(timeout, self.source.download(candidate)).await {
            Err(_elapsed) => return Err(SkipReason::Timeout),
            Ok(Err(e)) => return Err(SkipReason::Transport(e.to_string())),
            Ok(Ok(bytes)) => bytes,
        };

        let provenance = Provenance {
            source_url: candidate.url.clone(),
            downloaded_at: self.clock.now(),
            source_index,
        };
        parse_csv(&bytes, provenance).map_err(|e| SkipReason::Malformed(e.to_string()))
    }
}
