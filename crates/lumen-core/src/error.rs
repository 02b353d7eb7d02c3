//! Operation-level error returned by the Orchestrator.
//!
//! 各コンポーネントのエラーを `#[from]` で包み、`code()` で安定した ReasonCode に落とします。

use thiserror::Error;

use crate::app::config::ConfigError;
use crate::domain::{ArtifactError, ReasonCode, TargetId};
use crate::pipeline::{FetchError, NormalizeError};
use crate::plot::PlotError;
use crate::ports::StoreError;

#[derive(Debug, Error)]
pub enum LumenError {
    #[error("target {0} is already being processed")]
    AlreadyProcessing(TargetId),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("no artifact stored for target {0}")]
    NotFound(TargetId),

    #[error("no artifact available for target {0}; process it first")]
    MissingArtifact(TargetId),

    #[error("no targets given")]
    EmptyInput,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("plot failed: {0}")]
    Plot(#[from] PlotError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("inconsistent artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LumenError {
    pub fn code(&self) -> ReasonCode {
        match self {
            LumenError::AlreadyProcessing(_) => ReasonCode::AlreadyProcessing,
            LumenError::Fetch(FetchError::NoDataAvailable { .. }) => ReasonCode::NoDataAvailable,
            LumenError::Normalize(e) => match e {
                NormalizeError::NoInput | NormalizeError::InsufficientSamples { .. } => {
                    ReasonCode::InsufficientSamples
                }
                NormalizeError::EmptyTimeWindow { .. } => ReasonCode::EmptyTimeWindow,
                NormalizeError::DegenerateBaseline { .. } => ReasonCode::DegenerateBaseline,
                NormalizeError::InvalidSeries(_) => ReasonCode::Internal,
            },
            LumenError::NotFound(_) | LumenError::Store(StoreError::NotFound(_)) => {
                ReasonCode::NotFound
            }
            LumenError::MissingArtifact(_) => ReasonCode::MissingArtifact,
            LumenError::EmptyInput | LumenError::Plot(PlotError::EmptyInput) => {
                ReasonCode::EmptyInput
            }
            LumenError::Store(_) => ReasonCode::Storage,
            LumenError::Plot(_) => ReasonCode::Render,
            LumenError::Config(_) => ReasonCode::InvalidConfig,
            LumenError::Artifact(_) | LumenError::Internal(_) => ReasonCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LumenError::AlreadyProcessing(TargetId::new(1)), "ALREADY_PROCESSING")]
    #[case(
        LumenError::Fetch(FetchError::NoDataAvailable {
            target: TargetId::new(1),
            attempted: 0,
            detail: String::new(),
        }),
        "NO_DATA_AVAILABLE"
    )]
    #[case(
        LumenError::Normalize(NormalizeError::InsufficientSamples { found: 1, required: 10 }),
        "INSUFFICIENT_SAMPLES"
    )]
    #[case(LumenError::MissingArtifact(TargetId::new(2)), "MISSING_ARTIFACT")]
    #[case(LumenError::Store(StoreError::NotFound(TargetId::new(3))), "NOT_FOUND")]
    #[case(LumenError::EmptyInput, "EMPTY_INPUT")]
    #[case(LumenError::Plot(PlotError::Encode("x".into())), "RENDER")]
    fn codes_are_stable(#[case] err: LumenError, #[case] code: &str) {
        assert_eq!(err.code().as_str(), code);
    }
}
