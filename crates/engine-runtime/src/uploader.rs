use chrono::{DateTime, Utc};
use engine_core::{
    metrics::MetricsSink,
    retry::{RetryDisposition, RetryError, RetryPolicy},
};
use model::error::ErrorKind;
use std::future::Future;
use uuid::Uuid;

use crate::{
    batch_writer::Artifact,
    control_plane::ControlPlaneClient,
    error::{classify_reqwest_error, classify_upload_object_error, SyncError},
};

/// Proof that one artifact made it to the remote store and was acknowledged
/// (§4.4's three-step protocol: token, object upload, notify).
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub remote_url: String,
    pub confirmed_at: DateTime<Utc>,
    pub bytes: u64,
}

/// Drives one artifact through the control plane's upload protocol, retrying
/// `Transient` failures per mapping's `retry_attempts` (§4.4). Idempotent by
/// construction: each call mints its own `upload_id`, so a client-side retry
/// after a dropped response is safe to replay against the same endpoint.
pub struct Uploader {
    client: ControlPlaneClient,
    retry: RetryPolicy,
    metrics: MetricsSink,
}

impl Uploader {
    pub fn new(client: ControlPlaneClient, retry_attempts: u32, metrics: MetricsSink) -> Self {
        Self {
            client,
            retry: RetryPolicy::for_uploader(retry_attempts),
            metrics,
        }
    }

    pub async fn put(
        &self,
        artifact: &Artifact,
        schema_slug: &str,
        watermark_after: &str,
    ) -> Result<UploadReceipt, SyncError> {
        let upload_id = Uuid::new_v4().to_string();
        let filename = artifact
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact.jsonl.gz")
            .to_string();

        let token = self
            .with_retry(
                || {
                    self.client
                        .request_upload_token(schema_slug, &filename, artifact.size, &upload_id)
                },
                classify_reqwest_error,
            )
            .await?;

        self.with_retry(
            || self.client.upload_object(&token, &artifact.path, artifact.size),
            classify_upload_object_error,
        )
        .await?;

        self.metrics.add_bytes_out(artifact.size);
        self.metrics.add_records_uploaded(artifact.record_count);
        self.metrics.inc_artifacts();

        self.with_retry(
            || {
                self.client.notify_upload(
                    schema_slug,
                    &upload_id,
                    artifact.record_count,
                    artifact.size,
                    watermark_after,
                )
            },
            classify_reqwest_error,
        )
        .await?;

        Ok(UploadReceipt {
            remote_url: token.upload_url.clone(),
            confirmed_at: Utc::now(),
            bytes: artifact.size,
        })
    }

    /// Runs one phase of the upload protocol under the Uploader's retry
    /// policy, folding the classifier's kind into a retry/stop decision and
    /// the sink's retry counters.
    async fn with_retry<T, E, F, Fut>(
        &self,
        op: F,
        classify: impl Fn(&E) -> ErrorKind,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let metrics = self.metrics.clone();
        let result = self
            .retry
            .run(op, |err: &E| {
                if matches!(classify(err), ErrorKind::Transient) {
                    metrics.inc_retries_attempted();
                    RetryDisposition::Retry
                } else {
                    RetryDisposition::Stop
                }
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(RetryError::Fatal(err)) => Err(SyncError::UploadFailed(err.to_string())),
            Err(RetryError::AttemptsExceeded(err)) => {
                self.metrics.inc_retries_exhausted();
                Err(SyncError::UploadFailed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::ControlPlaneConfig;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_artifact(dir: &std::path::Path, contents: &[u8]) -> Artifact {
        let path = dir.join("m1.run1.0.jsonl.gz");
        std::fs::write(&path, contents).unwrap();
        Artifact {
            path,
            size: contents.len() as u64,
            record_count: 2,
        }
    }

    fn uploader_for(server: &MockServer, retry_attempts: u32) -> Uploader {
        let config = ControlPlaneConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            http_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(5),
        };
        let client = ControlPlaneClient::new(config);
        Uploader::new(client, retry_attempts, MetricsSink::new())
    }

    #[tokio::test]
    async fn full_protocol_succeeds_and_returns_receipt() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let artifact = make_artifact(dir.path(), b"hello-gzip-bytes");

        Mock::given(method("POST"))
            .and(path("/v1/schemas/events/generate-upload-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "upload_url": format!("{}/upload-object", server.uri()),
                "method": "PUT",
                "headers": {},
                "expires_at": "2030-01-01T00:00:00Z",
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload-object"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/schemas/events/notify-upload"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let uploader = uploader_for(&server, 3);
        let receipt = uploader.put(&artifact, "events", "1000").await.unwrap();
        assert_eq!(receipt.bytes, artifact.size);
    }

    #[tokio::test]
    async fn notify_404_is_treated_as_success() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let artifact = make_artifact(dir.path(), b"small");

        Mock::given(method("POST"))
            .and(path("/v1/schemas/events/generate-upload-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "upload_url": format!("{}/upload-object", server.uri()),
                "method": "PUT",
                "headers": {},
                "expires_at": "2030-01-01T00:00:00Z",
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload-object"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/schemas/events/notify-upload"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let uploader = uploader_for(&server, 3);
        let receipt = uploader.put(&artifact, "events", "1000").await;
        assert!(receipt.is_ok());
    }

    #[tokio::test]
    async fn token_request_5xx_exhausts_retries_and_fails() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let artifact = make_artifact(dir.path(), b"small");

        Mock::given(method("POST"))
            .and(path("/v1/schemas/events/generate-upload-token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let uploader = uploader_for(&server, 2);
        let result = uploader.put(&artifact, "events", "1000").await;
        assert!(matches!(result, Err(SyncError::UploadFailed(_))));
        assert_eq!(uploader.metrics.snapshot().retries_exhausted, 1);
    }

    #[tokio::test]
    async fn token_request_4xx_fails_without_retrying() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let artifact = make_artifact(dir.path(), b"small");

        Mock::given(method("POST"))
            .and(path("/v1/schemas/events/generate-upload-token"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = uploader_for(&server, 5);
        let result = uploader.put(&artifact, "events", "1000").await;
        assert!(matches!(result, Err(SyncError::UploadFailed(_))));
    }
}
