//! Media vendor boundary and HTTP backends.
//!
//! The orchestrator only sees the [`MediaVendor`] trait: submit one prompt,
//! get back an opaque job handle, poll the handle until it reports a
//! terminal state. Tests substitute a scripted fake; production uses a
//! [`VendorBackend`], an enum over the two supported HTTP dialects built by
//! [`create_vendor`].
//!
//! | Dialect | Submit | Poll | Terminal states |
//! |---------|--------|------|-----------------|
//! | generic jobs | `POST {base}/jobs` | `GET {base}/jobs/{id}` | `completed`, `failed` |
//! | predictions | `POST {base}/predictions` | `GET {base}/predictions/{id}` | `succeeded`, `failed`, `canceled` |

use companion_types::{MediaKind, MediaVariant};

use crate::config::{VendorConfig, VendorKind};

// ---------------------------------------------------------------------------
// Boundary types
// ---------------------------------------------------------------------------

/// Errors raised by a vendor call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VendorError {
    /// The request never got a response (connect, TLS, timeout).
    #[error("vendor transport failed: {0}")]
    Transport(String),

    /// The vendor answered with a non-success status.
    #[error("vendor returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("vendor response malformed: {0}")]
    Malformed(String),

    /// The vendor reported the job itself as failed.
    #[error("vendor job failed: {0}")]
    JobFailed(String),
}

impl VendorError {
    /// Whether retrying the same call may succeed.
    ///
    /// Transport failures, rate limiting (429), and server errors (5xx)
    /// are transient. Client rejections, malformed responses, and
    /// vendor-reported job failures are not.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::JobFailed(_) => false,
        }
    }
}

/// Opaque vendor-side job handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VendorJobId(pub String);

impl core::fmt::Display for VendorJobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One submission: a rendered prompt for one (mood, kind) variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    /// The variant this submission produces.
    pub variant: MediaVariant,
    /// Rendered prompt text.
    pub prompt: String,
}

/// Vendor-reported job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorJobState {
    /// Accepted, not started.
    Queued,
    /// Rendering.
    Running,
    /// Finished with output.
    Succeeded,
    /// Finished without output.
    Failed,
}

/// One poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPoll {
    /// Current state.
    pub state: VendorJobState,
    /// Output reference, once succeeded.
    pub output_url: Option<String>,
    /// Vendor error message, once failed.
    pub error: Option<String>,
}

/// A media generation service.
#[async_trait::async_trait]
pub trait MediaVendor: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Submit one prompt and return the vendor's handle for it.
    async fn submit(&self, request: &MediaRequest) -> Result<VendorJobId, VendorError>;

    /// Read the current state of a submitted job.
    async fn poll(&self, job: &VendorJobId) -> Result<VendorPoll, VendorError>;
}

// ---------------------------------------------------------------------------
// Unified backend enum
// ---------------------------------------------------------------------------

/// An HTTP vendor backend.
pub enum VendorBackend {
    /// Generic JSON job API.
    GenericJobs(GenericJobsBackend),
    /// Predictions-style API.
    Predictions(PredictionsBackend),
}

#[async_trait::async_trait]
impl MediaVendor for VendorBackend {
    fn name(&self) -> &str {
        match self {
            Self::GenericJobs(_) => "generic-jobs",
            Self::Predictions(_) => "predictions",
        }
    }

    async fn submit(&self, request: &MediaRequest) -> Result<VendorJobId, VendorError> {
        match self {
            Self::GenericJobs(backend) => backend.submit(request).await,
            Self::Predictions(backend) => backend.submit(request).await,
        }
    }

    async fn poll(&self, job: &VendorJobId) -> Result<VendorPoll, VendorError> {
        match self {
            Self::GenericJobs(backend) => backend.poll(job).await,
            Self::Predictions(backend) => backend.poll(job).await,
        }
    }
}

/// Shared HTTP plumbing for both dialects.
struct HttpClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    image_model: String,
    video_model: String,
}

impl HttpClient {
    fn new(config: &VendorConfig) -> Result<Self, VendorError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VendorError::Transport(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            image_model: config.image_model.clone(),
            video_model: config.video_model.clone(),
        })
    }

    fn model_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Image => &self.image_model,
            MediaKind::Video => &self.video_model,
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, VendorError> {
        let url = format!("{}/{path}", self.api_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| VendorError::Transport(format!("POST {url} failed: {e}")))?;
        read_json(response).await
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, VendorError> {
        let url = format!("{}/{path}", self.api_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| VendorError::Transport(format!("GET {url} failed: {e}")))?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, VendorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        return Err(VendorError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| VendorError::Malformed(format!("response parse failed: {e}")))
}

fn job_id(json: &serde_json::Value) -> Result<VendorJobId, VendorError> {
    json.get("id")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .map(|id| VendorJobId(id.to_owned()))
        .ok_or_else(|| VendorError::Malformed("response missing id".to_owned()))
}

fn error_message(json: &serde_json::Value) -> Option<String> {
    match json.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Object(obj)) => obj
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Generic jobs dialect
// ---------------------------------------------------------------------------

/// Backend for a generic JSON job API.
///
/// Submits `{"model", "kind", "prompt"}` to `{api_url}/jobs` and expects
/// `{"id"}`; polls `{api_url}/jobs/{id}` for
/// `{"status", "output_url" | "output": {"url"}, "error"}`.
pub struct GenericJobsBackend {
    http: HttpClient,
}

impl GenericJobsBackend {
    /// Create a new generic jobs backend.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &VendorConfig) -> Result<Self, VendorError> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    async fn submit(&self, request: &MediaRequest) -> Result<VendorJobId, VendorError> {
        let body = serde_json::json!({
            "model": self.http.model_for(request.variant.kind),
            "kind": request.variant.kind.as_str(),
            "prompt": request.prompt,
            "metadata": {"variant": request.variant.key()},
        });
        let json = self.http.post_json("jobs", &body).await?;
        job_id(&json)
    }

    async fn poll(&self, job: &VendorJobId) -> Result<VendorPoll, VendorError> {
        let json = self.http.get_json(&format!("jobs/{job}")).await?;
        parse_generic_poll(&json)
    }
}

fn parse_generic_poll(json: &serde_json::Value) -> Result<VendorPoll, VendorError> {
    let status = json
        .get("status")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| VendorError::Malformed("job response missing status".to_owned()))?;

    let state = match status {
        "queued" | "pending" => VendorJobState::Queued,
        "running" | "processing" => VendorJobState::Running,
        "completed" | "succeeded" => VendorJobState::Succeeded,
        "failed" | "error" | "cancelled" | "canceled" => VendorJobState::Failed,
        other => {
            return Err(VendorError::Malformed(format!(
                "unknown job status: {other}"
            )));
        }
    };

    let output_url = json
        .get("output_url")
        .or_else(|| json.get("output").and_then(|o| o.get("url")))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned);

    Ok(VendorPoll {
        state,
        output_url,
        error: error_message(json),
    })
}

// ---------------------------------------------------------------------------
// Predictions dialect
// ---------------------------------------------------------------------------

/// Backend for a predictions-style API.
///
/// Submits `{"version", "input": {"prompt"}}` to `{api_url}/predictions`;
/// polls `{api_url}/predictions/{id}` whose `output` is either a URL string
/// or an array of URLs (the first is used).
pub struct PredictionsBackend {
    http: HttpClient,
}

impl PredictionsBackend {
    /// Create a new predictions backend.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &VendorConfig) -> Result<Self, VendorError> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    async fn submit(&self, request: &MediaRequest) -> Result<VendorJobId, VendorError> {
        let body = serde_json::json!({
            "version": self.http.model_for(request.variant.kind),
            "input": {
                "prompt": request.prompt,
                "output_kind": request.variant.kind.as_str(),
            },
        });
        let json = self.http.post_json("predictions", &body).await?;
        job_id(&json)
    }

    async fn poll(&self, job: &VendorJobId) -> Result<VendorPoll, VendorError> {
        let json = self.http.get_json(&format!("predictions/{job}")).await?;
        parse_prediction_poll(&json)
    }
}

fn parse_prediction_poll(json: &serde_json::Value) -> Result<VendorPoll, VendorError> {
    let status = json
        .get("status")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| VendorError::Malformed("prediction missing status".to_owned()))?;

    let state = match status {
        "starting" => VendorJobState::Queued,
        "processing" => VendorJobState::Running,
        "succeeded" => VendorJobState::Succeeded,
        "failed" | "canceled" => VendorJobState::Failed,
        other => {
            return Err(VendorError::Malformed(format!(
                "unknown prediction status: {other}"
            )));
        }
    };

    let output_url = match json.get("output") {
        Some(serde_json::Value::String(url)) => Some(url.clone()),
        Some(serde_json::Value::Array(items)) => items
            .first()
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned),
        _ => None,
    };

    let error = error_message(json).or_else(|| {
        (status == "canceled").then(|| "prediction canceled".to_owned())
    });

    Ok(VendorPoll {
        state,
        output_url,
        error,
    })
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create a vendor backend from configuration.
///
/// # Errors
///
/// Returns [`VendorError::Transport`] if the HTTP client cannot be built.
pub fn create_vendor(config: &VendorConfig) -> Result<VendorBackend, VendorError> {
    Ok(match config.backend {
        VendorKind::GenericJobs => VendorBackend::GenericJobs(GenericJobsBackend::new(config)?),
        VendorKind::Predictions => VendorBackend::Predictions(PredictionsBackend::new(config)?),
    })
}
