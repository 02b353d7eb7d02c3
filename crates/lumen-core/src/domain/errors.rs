//! Errors - 失敗理由コード
//!
//! ReasonCode は呼び出し側（CLI や HTTP 層）が機械的に判定できる安定したコードです。
//! 表示用メッセージは各エラー型の Display に任せ、分類はここに集約します。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, machine-checkable failure reason.
///
/// Serialized as SCREAMING_SNAKE_CASE (`NO_DATA_AVAILABLE`, ...). Variants are
/// never renamed once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NoDataAvailable,
    InsufficientSamples,
    EmptyTimeWindow,
    DegenerateBaseline,
    AlreadyProcessing,
    NotFound,
    MissingArtifact,
    EmptyInput,
    InvalidConfig,
    Storage,
    Render,
    Cancelled,
    Internal,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::NoDataAvailable => "NO_DATA_AVAILABLE",
            ReasonCode::InsufficientSamples => "INSUFFICIENT_SAMPLES",
            ReasonCode::EmptyTimeWindow => "EMPTY_TIME_WINDOW",
            ReasonCode::DegenerateBaseline => "DEGENERATE_BASELINE",
            ReasonCode::AlreadyProcessing => "ALREADY_PROCESSING",
            ReasonCode::NotFound => "NOT_FOUND",
            ReasonCode::MissingArtifact => "MISSING_ARTIFACT",
            ReasonCode::EmptyInput => "EMPTY_INPUT",
            ReasonCode::InvalidConfig => "INVALID_CONFIG",
            ReasonCode::Storage => "STORAGE",
            ReasonCode::Render => "RENDER",
            ReasonCode::Cancelled => "CANCELLED",
            ReasonCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
