use connectors::{FetchResult, SourceAdapter};
use engine_core::{metrics::MetricsSink, retry::RetryPolicy};
use model::{error::ErrorKind, watermark::Watermark};

use crate::error::SyncError;

/// Wraps a [`SourceAdapter`] with the Extractor's own retry policies.
/// `SourceUnavailable` gets §7's 2/4/8s schedule; `Transient` gets §4.2's
/// distinct, faster 1/2/4s schedule. Every other error kind bubbles straight
/// up — the Extractor never retries `QueryRejected` or `SchemaDrift`.
pub struct Extractor {
    source: Box<dyn SourceAdapter>,
    source_unavailable_retry: RetryPolicy,
    transient_retry: RetryPolicy,
    metrics: MetricsSink,
}

impl Extractor {
    pub fn new(source: Box<dyn SourceAdapter>, metrics: MetricsSink) -> Self {
        Self {
            source,
            source_unavailable_retry: RetryPolicy::for_extractor(),
            transient_retry: RetryPolicy::for_extractor_transient(),
            metrics,
        }
    }

    fn policy_for(&self, kind: ErrorKind) -> &RetryPolicy {
        match kind {
            ErrorKind::Transient => &self.transient_retry,
            _ => &self.source_unavailable_retry,
        }
    }

    pub async fn fetch_batch(
        &mut self,
        watermark: &Watermark,
        is_initial: bool,
        batch_size: usize,
    ) -> Result<FetchResult, SyncError> {
        let mut attempt = 0usize;
        loop {
            match self.source.fetch_batch(watermark, is_initial, batch_size).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let kind = err.kind();
                    let retryable = matches!(kind, ErrorKind::Transient | ErrorKind::SourceUnavailable);
                    if !retryable {
                        return Err(SyncError::from(err));
                    }
                    let policy = self.policy_for(kind);
                    if attempt + 1 >= policy.max_attempts {
                        self.metrics.inc_retries_exhausted();
                        return Err(SyncError::from(err));
                    }
                    self.metrics.inc_retries_attempted();
                    tracing::warn!(attempt, error = %err, "extractor retrying transient failure");
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Delegates post-upload deletion (§4.4) to the underlying source. Not
    /// retried — a failure here is logged by the caller and does not affect
    /// the mapping's already-committed watermark.
    pub async fn delete_uploaded(
        &mut self,
        table: &str,
        where_column: &str,
        values: &[serde_json::Value],
    ) -> Result<u64, SyncError> {
        self.source
            .delete_by_pk(table, where_column, values)
            .await
            .map_err(SyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::ConnectorError;
    use model::batch::Batch;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySource {
        calls: AtomicUsize,
        fail_until: usize,
    }

    #[async_trait]
    impl SourceAdapter for FlakySource {
        async fn fetch_batch(
            &mut self,
            _watermark: &Watermark,
            _is_initial: bool,
            _batch_size: usize,
        ) -> Result<FetchResult, ConnectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_until {
                Err(ConnectorError::Transient("connection reset".into()))
            } else {
                Ok(FetchResult {
                    batch: Batch::new(),
                    reached_end: true,
                })
            }
        }
    }

    #[tokio::test]
    async fn recovers_from_transient_failures_within_budget() {
        let source = FlakySource {
            calls: AtomicUsize::new(0),
            fail_until: 2,
        };
        let mut extractor = Extractor::new(Box::new(source), MetricsSink::new());
        extractor.transient_retry = RetryPolicy {
            max_attempts: 3,
            backoff: engine_core::retry::Backoff::Doubling {
                base: std::time::Duration::from_millis(0),
            },
        };

        let result = extractor
            .fetch_batch(&Watermark::empty(), true, 100)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn query_rejected_is_never_retried() {
        struct AlwaysRejects;
        #[async_trait]
        impl SourceAdapter for AlwaysRejects {
            async fn fetch_batch(
                &mut self,
                _watermark: &Watermark,
                _is_initial: bool,
                _batch_size: usize,
            ) -> Result<FetchResult, ConnectorError> {
                Err(ConnectorError::QueryRejected("no such column".into()))
            }
        }

        let mut extractor = Extractor::new(Box::new(AlwaysRejects), MetricsSink::new());
        let result = extractor.fetch_batch(&Watermark::empty(), true, 100).await;
        assert!(matches!(
            result,
            Err(SyncError::Connector(ConnectorError::QueryRejected(_)))
        ));
    }
}
