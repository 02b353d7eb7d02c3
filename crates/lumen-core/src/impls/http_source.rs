//! HttpLightCurveSource - HTTP 上流ソース
//!
//! # ワイヤ形式
//! - `GET {base_url}/targets/{id}/files` → `{"files": [{"url": "...", "name": "..."}]}`
//!   （ソース順。相対 URL は base_url 基準で解決）
//! - 各ファイルは CSV（`pipeline::codec` 参照）
//!
//! 404 は「そのターゲットのデータなし」として空リストを返します。
//! ファイル単位のタイムアウトは Fetcher 側で掛けるので、ここでは接続タイムアウトだけ。
//! ファイルサイズは `max_file_bytes` で頭打ち（Content-Length と受信済みバイト数の両方で確認）。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::domain::TargetId;
use crate::ports::{CandidateFile, LightCurveSource, SourceError};

#[derive(Debug, Deserialize)]
struct Manifest {
    files: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    url: String,
    #[serde(default)]
    name: Option<String>,
}

pub const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpLightCurveSource {
    client: Client,
    base_url: Url,
    max_file_bytes: u64,
}

impl HttpLightCurveSource {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Self::with_client(client, base_url)
    }

    /// Use a preconfigured client (proxy, TLS roots, ...).
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        })
    }

    /// Largest file body `download` accepts.
    pub fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn manifest_url(&self, target: TargetId) -> Result<Url, SourceError> {
        self.base_url
            .join(&format!("targets/{}/files", target.get()))
            .map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl LightCurveSource for HttpLightCurveSource {
    async fn discover(&self, target: TargetId) -> Result<Vec<CandidateFile>, SourceError> {
        let url = self.manifest_url(target)?;
        debug!(%target, %url, "discovering files");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        candidates_from_manifest(&self.base_url, &body)
    }

    async fn download(&self, candidate: &CandidateFile) -> Result<Vec<u8>, SourceError> {
        let mut response = self
            .client
            .get(&candidate.url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url: candidate.url.clone(),
            });
        }

        let limit = self.max_file_bytes;
        let too_large = || SourceError::TooLarge {
            url: candidate.url.clone(),
            limit,
        };
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Parse `base_url`, making sure it ends in `/` so relative joins append.
fn parse_base_url(raw: &str) -> Result<Url, SourceError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| SourceError::Malformed(format!("base url '{raw}': {e}")))
}

fn candidates_from_manifest(base: &Url, body: &[u8]) -> Result<Vec<CandidateFile>, SourceError> {
    let manifest: Manifest =
        serde_json::from_slice(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    manifest
        .files
        .into_iter()
        .map(|entry| {
            let url = base
                .join(&entry.url)
                .map_err(|e| SourceError::Malformed(format!("file url '{}': {e}", entry.url)))?;
            let name = entry.name.unwrap_or_else(|| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default()
                    .to_string()
            });
            Ok(CandidateFile::new(name, url.to_string()))
        })
        .collect()
}
