//! Domain identifiers (strongly-typed IDs).
//!
//! # TargetId
//! KIC カタログ番号をそのまま保持する newtype です。
//! すべての層（Fetcher / ArtifactStore / Orchestrator）で主キーとして使います。
//!
//! # RunId
//! 1 回の process 実行を識別する ULID ベースの ID です。
//! 保存される Artifact の series と deviation は同じ RunId を持ちます。
//!
//! ## Phantom Type パターン
//! `Id<T>` というジェネリック型で共通実装を提供しつつ、
//! `T` は実行時には使わない（PhantomData）マーカー型として、
//! コンパイル時の型安全性を提供します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Catalog identifier of a target (KIC number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(u64);

impl TargetId {
    const STORAGE_PREFIX: &'static str = "kic_";

    pub const fn new(kic: u64) -> Self {
        Self(kic)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// ストレージ上のキー（例: `kic_12345`）
    pub fn storage_key(self) -> String {
        format!("{}{}", Self::STORAGE_PREFIX, self.0)
    }

    /// `storage_key()` の逆変換。形式が違えば None
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let digits = key.strip_prefix(Self::STORAGE_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl From<u64> for TargetId {
    fn from(kic: u64) -> Self {
        Self(kic)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid target id '{0}': expected a KIC number such as '12345' or 'KIC 12345'")]
pub struct ParseTargetIdError(String);

impl FromStr for TargetId {
    type Err = ParseTargetIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = match trimmed.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("kic") => trimmed[3..].trim_start(),
            _ => trimmed,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseTargetIdError(s.to_string()));
        }
        digits
            .parse()
            .map(Self)
            .map_err(|_| ParseTargetIdError(s.to_string()))
    }
}

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"run-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ULID ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Processing run のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identifier of one `process` run.
pub type RunId = Id<Run>;
