//! Remote compilation service client.
//!
//! Wire contract, which must match the service bit-for-bit:
//!
//! - `GET {url}/api/compilers` → `[{id, name, lang}]`
//! - `POST {url}/api/compiler/{id}/compile` with
//!   `{"source": …, "options": {"userArguments": …, "filters": {…}}}` →
//!   `{"code", "stdout", "stderr", "asm"}`, each stream a list of
//!   `{"text": string|null, "source": {"file", "line"}|null}`
//!
//! A non-200 status is a connection error. A response with `code != 0` is a
//! *compile* failure and is returned as data, not as an error. The caller
//! decides what to surface.
//!
//! Response bodies are read chunk by chunk; the worker checks its
//! cancellation token at every read boundary and bails out with the silent
//! cancellation sentinel, never a surfaced error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use correlation::{CompiledChunk, CompiledText, RemoteCompilerInfo, SourceLocation};

use crate::config::Filters;
use crate::error::ExplorerError;

/// Compile-request options, forwarded opaquely.
#[derive(Debug, Clone, Serialize)]
pub struct CompileOptions {
    #[serde(rename = "userArguments")]
    pub user_arguments: String,
    pub filters: Filters,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileRequest {
    pub source: String,
    pub options: CompileOptions,
}

#[derive(Debug, Deserialize)]
struct LocationDto {
    // The service emits {"file": null, "line": N} for lines inside the
    // submitted source itself; those chunks stay unattributed.
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    line: u32,
}

#[derive(Debug, Deserialize)]
struct ChunkDto {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    source: Option<LocationDto>,
}

#[derive(Debug, Deserialize)]
struct CompiledResultDto {
    code: i32,
    #[serde(default)]
    stdout: Vec<ChunkDto>,
    #[serde(default)]
    stderr: Vec<ChunkDto>,
    #[serde(default)]
    asm: Vec<ChunkDto>,
}

impl From<ChunkDto> for CompiledChunk {
    fn from(dto: ChunkDto) -> Self {
        let source = dto
            .source
            .and_then(|s| s.file.map(|file| SourceLocation::new(&file, s.line)));
        CompiledChunk {
            text: dto.text,
            source,
        }
    }
}

impl From<CompiledResultDto> for CompiledText {
    fn from(dto: CompiledResultDto) -> Self {
        CompiledText {
            code: dto.code,
            stdout: dto.stdout.into_iter().map(Into::into).collect(),
            stderr: dto.stderr.into_iter().map(Into::into).collect(),
            asm: dto.asm.into_iter().map(Into::into).collect(),
        }
    }
}

/// The remote service seam. A trait so tests can script the service without
/// a network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch the advertised compiler list.
    async fn list_compilers(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteCompilerInfo>, ExplorerError>;

    /// Submit one compilation to the given remote compiler.
    async fn compile(
        &self,
        compiler_id: &str,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<CompiledText, ExplorerError>;
}

/// Production client over `reqwest`.
pub struct HttpRemoteClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    fn connection_error(url: &str, detail: impl std::fmt::Display) -> ExplorerError {
        ExplorerError::Connection {
            url: url.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Drain the response body, checking the cancellation flag after every
    /// network read.
    async fn read_body(
        mut response: reqwest::Response,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExplorerError> {
        let mut body = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(ExplorerError::Canceled);
            }
            match response.chunk().await {
                Ok(Some(bytes)) => body.extend_from_slice(&bytes),
                Ok(None) => return Ok(body),
                Err(e) => return Err(Self::connection_error(url, e)),
            }
        }
    }

    fn checked(
        response: reqwest::Response,
        url: &str,
    ) -> Result<reqwest::Response, ExplorerError> {
        if response.status().as_u16() != 200 {
            return Err(Self::connection_error(
                url,
                format!("HTTP error code: {}", response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn list_compilers(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteCompilerInfo>, ExplorerError> {
        let url = format!("{}/api/compilers", self.base_url);
        debug!(%url, "fetching remote compiler list");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Self::connection_error(&url, e))?;
        let response = Self::checked(response, &url)?;
        let body = Self::read_body(response, &url, cancel).await?;
        serde_json::from_slice(&body).map_err(|e| Self::connection_error(&url, e))
    }

    async fn compile(
        &self,
        compiler_id: &str,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<CompiledText, ExplorerError> {
        let url = format!("{}/api/compiler/{}/compile", self.base_url, compiler_id);
        debug!(%url, source_bytes = request.source.len(), "submitting compile request");
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Self::connection_error(&url, e))?;
        let response = Self::checked(response, &url)?;
        let body = Self::read_body(response, &url, cancel).await?;
        let dto: CompiledResultDto =
            serde_json::from_slice(&body).map_err(|e| Self::connection_error(&url, e))?;
        Ok(dto.into())
    }
}
