use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use wave2notes_domain::{DomainError, TranscriptionResult};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Read-only access to a running transcription service: fetching stored
/// results and locating the audio rendering they point at.
#[derive(Clone)]
pub struct TranscriptionClient {
    base_url: String,
    http: reqwest::Client,
}

impl TranscriptionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turns a service-relative asset path such as `/api/download/take.mid`
    /// into an absolute URL. Absolute URLs pass through unchanged.
    pub fn resolve_asset(&self, asset: &str) -> String {
        if asset.contains("://") {
            return asset.to_string();
        }
        format!("{}/{}", self.base_url, asset.trim_start_matches('/'))
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        let url = self.resolve_asset("/api/health");
        debug!(%url, "checking service health");
        let response = self.http.get(&url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<HealthStatus>().await?)
    }

    /// Downloads a transcription result document and validates its notes.
    #[instrument(skip(self))]
    pub async fn fetch_result(&self, path: &str) -> Result<TranscriptionResult> {
        let url = self.resolve_asset(path);
        info!(%url, "fetching transcription result");
        let response = self.http.get(&url).send().await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        let mut result = TranscriptionResult::from_slice(&bytes)?;
        if let Some(midi) = result.midi_file.take() {
            result.midi_file = Some(self.resolve_asset(&midi));
        }
        info!(
            notes = result.notes.len(),
            rejected = result.rejected,
            "transcription result loaded"
        );
        Ok(result)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}
