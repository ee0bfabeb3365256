use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::error::SyncError;

/// Where the control plane lives and how to authenticate to it (§6):
/// `Authorization: Bearer {api_key}`, resolved from the environment.
/// `http_timeout` (default 30s) bounds the token and notify calls;
/// `upload_timeout` (default 300s) bounds the upload call, and is applied as
/// a per-chunk idle timeout rather than a flat total-duration cap, so it
/// resets on every byte of upload progress (§5).
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub base_url: String,
    pub api_key: String,
    pub http_timeout: Duration,
    pub upload_timeout: Duration,
}

impl ControlPlaneConfig {
    pub fn from_env(http_timeout: Duration, upload_timeout: Duration) -> Result<Self, SyncError> {
        let base_url = std::env::var("BRIDGE_CONTROL_PLANE_URL")
            .map_err(|_| SyncError::ConfigInvalid("BRIDGE_CONTROL_PLANE_URL not set".into()))?;
        let api_key = std::env::var("BRIDGE_API_KEY")
            .map_err(|_| SyncError::ConfigInvalid("BRIDGE_API_KEY not set".into()))?;
        Ok(Self {
            base_url,
            api_key,
            http_timeout,
            upload_timeout,
        })
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    filename: &'a str,
    content_length: u64,
    content_type: &'static str,
    encoding: &'static str,
    upload_id: &'a str,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    Put,
    Post,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub upload_url: String,
    pub method: UploadMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct NotifyRequest<'a> {
    upload_id: &'a str,
    record_count: u64,
    bytes: u64,
    watermark_after: &'a str,
}

/// Thin `reqwest`-backed client for the Uploader's three HTTP calls (§4.4).
/// Knows nothing about retries — that's [`crate::uploader::Uploader`]'s job.
/// Cheap to clone: `reqwest::Client` is an `Arc` handle internally, so each
/// mapping's [`crate::pipeline::Pipeline`] can hold its own owned copy.
///
/// Holds two clients rather than one: `http` bounds the token and notify
/// calls to `http_timeout` (30s default). `upload_http` carries no built-in
/// timeout at all — the upload's 300s budget is enforced per chunk, in
/// `upload_object`, so a slow-but-healthy transfer isn't killed by a
/// flat total-duration cap.
#[derive(Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    upload_http: reqwest::Client,
    config: ControlPlaneConfig,
}

impl ControlPlaneClient {
    pub fn new(config: ControlPlaneConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .expect("reqwest client builder has no fallible runtime config here");
        let upload_http = reqwest::Client::builder()
            .build()
            .expect("reqwest client builder has no fallible runtime config here");
        Self {
            http,
            upload_http,
            config,
        }
    }

    pub async fn request_upload_token(
        &self,
        schema_slug: &str,
        filename: &str,
        content_length: u64,
        upload_id: &str,
    ) -> Result<TokenResponse, reqwest::Error> {
        let url = format!(
            "{}/v1/schemas/{schema_slug}/generate-upload-token",
            self.config.base_url
        );
        let body = TokenRequest {
            filename,
            content_length,
            content_type: "application/x-ndjson",
            encoding: "gzip",
            upload_id,
        };

        self.http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await
    }

    /// Streams the artifact file to `upload_url` using the method and
    /// headers the token response specified, verbatim — no extra headers
    /// (§4.4 step 2). Each chunk must arrive within `upload_timeout` of the
    /// last one; a stall trips the timeout, but steady progress can run the
    /// upload as long as it needs to.
    pub async fn upload_object(
        &self,
        token: &TokenResponse,
        path: &Path,
        content_length: u64,
    ) -> Result<(), UploadObjectError> {
        let file = tokio::fs::File::open(path).await?;
        let upload_timeout = self.config.upload_timeout;
        let chunks = tokio_stream::StreamExt::timeout(ReaderStream::new(file), upload_timeout);
        let stream = futures::StreamExt::map(chunks, move |item| match item {
            Ok(chunk) => chunk,
            Err(_elapsed) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no upload progress for {upload_timeout:?}"),
            )),
        });
        let body = reqwest::Body::wrap_stream(stream);

        let mut request = match token.method {
            UploadMethod::Put => self.upload_http.put(&token.upload_url),
            UploadMethod::Post => self.upload_http.post(&token.upload_url),
        };
        for (name, value) in &token.headers {
            request = request.header(name, value);
        }
        request = request.header(reqwest::header::CONTENT_LENGTH, content_length);

        request.body(body).send().await?.error_for_status()?;
        Ok(())
    }

    /// Returns `false` when the endpoint 404s — the control plane treats
    /// that as "notification not required" and proceeds (§4.4 step 3).
    pub async fn notify_upload(
        &self,
        schema_slug: &str,
        upload_id: &str,
        record_count: u64,
        bytes: u64,
        watermark_after: &str,
    ) -> Result<bool, reqwest::Error> {
        let url = format!("{}/v1/schemas/{schema_slug}/notify-upload", self.config.base_url);
        let body = NotifyRequest {
            upload_id,
            record_count,
            bytes,
            watermark_after,
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }
}

/// Object upload can fail either because the artifact disappeared out from
/// under us or because the HTTP exchange itself failed.
#[derive(Debug, thiserror::Error)]
pub enum UploadObjectError {
    #[error("could not read artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
