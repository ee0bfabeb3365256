use std::path::PathBuf;
use std::time::Instant;

use connectors::{
    log::laravel::LaravelLogSource,
    sql::{connection_url, mysql::MySqlSource, postgres::PostgresSource},
    SourceAdapter,
};
use engine_config::SecretResolver;
use engine_core::{metrics::MetricsSink, state::JsonStateStore};
use model::{
    batch::Batch,
    error::ErrorKind,
    mapping::{Mapping, RelationalDriver, Source},
    outcome::{MappingOutcome, SkipReason},
};
use tokio_util::sync::CancellationToken;

use crate::{
    batch_writer::{Artifact, BatchWriter},
    control_plane::ControlPlaneClient,
    error::SyncError,
    extractor::Extractor,
    uploader::Uploader,
};

/// Drives one mapping's full run: extract batches, write artifacts, upload
/// them, advance the watermark, and apply post-upload deletion — all
/// sequentially, per §5's "one mapping, one extractor, one writer, one
/// uploader, never interleaved" rule. The Runner owns fan-out across
/// mappings; this type owns nothing about any other mapping.
pub struct Pipeline<'a> {
    mapping: &'a Mapping,
    run_id: String,
    state_store: &'a JsonStateStore,
    secrets: &'a dyn SecretResolver,
    control_plane: ControlPlaneClient,
    scratch_dir: PathBuf,
    dry_run: bool,
    force: bool,
    batch_size_override: Option<usize>,
    cancel: CancellationToken,
    metrics: MetricsSink,
}

impl<'a> Pipeline<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mapping: &'a Mapping,
        run_id: String,
        state_store: &'a JsonStateStore,
        secrets: &'a dyn SecretResolver,
        control_plane: ControlPlaneClient,
        scratch_dir: PathBuf,
        dry_run: bool,
        force: bool,
        batch_size_override: Option<usize>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            mapping,
            run_id,
            state_store,
            secrets,
            control_plane,
            scratch_dir,
            dry_run,
            force,
            batch_size_override,
            cancel,
            metrics: MetricsSink::new(),
        }
    }

    pub fn metrics(&self) -> MetricsSink {
        self.metrics.clone()
    }

    /// Runs the mapping to completion (or cancellation/failure), never
    /// propagating an error — the Runner needs every mapping's outcome even
    /// when others fail (§5's graceful-degradation rule).
    pub async fn run(&self) -> MappingOutcome {
        if self.force {
            if let Err(err) = self.state_store.force_reset(&self.mapping.id).await {
                return MappingOutcome::Failed {
                    error_kind: ErrorKind::StateCorrupt,
                    message: err.to_string(),
                    records_uploaded_before_failure: 0,
                };
            }
        }

        match self.run_inner().await {
            Ok(outcome) => outcome,
            Err(err) => MappingOutcome::Failed {
                error_kind: err.kind(),
                message: err.to_string(),
                records_uploaded_before_failure: self.metrics.snapshot().records_uploaded,
            },
        }
    }

    async fn run_inner(&self) -> Result<MappingOutcome, SyncError> {
        let started_at = Instant::now();
        let mut state = self
            .state_store
            .load(&self.mapping.id)
            .await
            .map_err(SyncError::StateStore)?;

        let source = build_source(self.mapping, self.secrets).await?;
        let mut extractor = Extractor::new(source, self.metrics.clone());
        let uploader = Uploader::new(
            self.control_plane.clone(),
            self.mapping.transfer.retry_attempts,
            self.metrics.clone(),
        );
        let mut writer = BatchWriter::new(
            self.scratch_dir.clone(),
            self.mapping.id.clone(),
            self.run_id.clone(),
            self.mapping.transfer.max_file_size_mb,
        );

        let batch_size = self
            .batch_size_override
            .unwrap_or(self.mapping.transfer.batch_size);
        let mut batches = 0u64;
        let mut total_records = 0u64;
        let mut total_bytes = 0u64;
        let mut is_initial = state.watermark_is_initial;

        // Drives each `fetch_batch` call. Advances on every non-empty batch,
        // dry-run or not, so a dry run can walk the whole source transiently;
        // `state.watermark` itself is only overwritten once a batch is
        // actually committed, below.
        let mut working_watermark = state.watermark.clone();

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let result = extractor
                .fetch_batch(&working_watermark, is_initial, batch_size)
                .await?;
            is_initial = false;

            if result.batch.is_empty() {
                break;
            }
            self.metrics.add_records_read(result.batch.len() as u64);
            self.metrics.inc_batches();
            batches += 1;

            if let Some(advanced) = result.batch.tentative_watermark.clone() {
                working_watermark = advanced;
            }

            let artifacts = writer.write(&result.batch).await?;
            let batch_record_count: u64 = artifacts.iter().map(|a| a.record_count).sum();

            // Per-batch guard (§4.2): only this batch is skipped, not the run.
            // Earlier batches in this loop may already be committed, so the
            // run as a whole still succeeds if it uploaded anything at all;
            // `Skipped{LowVolume}` is reserved for a run that uploaded nothing.
            if batch_record_count < self.mapping.transfer.min_records_for_upload as u64 {
                self.metrics.inc_skipped_low_volume();
                delete_artifacts(&artifacts).await;
                break;
            }

            if self.dry_run {
                delete_artifacts(&artifacts).await;
                if result.reached_end {
                    break;
                }
                continue;
            }

            for artifact in &artifacts {
                let receipt = uploader
                    .put(artifact, &self.mapping.schema_slug, working_watermark.as_str())
                    .await?;
                total_bytes += receipt.bytes;
                total_records += artifact.record_count;
                let _ = tokio::fs::remove_file(&artifact.path).await;
            }

            state.watermark = working_watermark.clone();
            state.watermark_is_initial = false;
            state.last_success_at = Some(chrono::Utc::now());
            state.last_error = None;
            state.last_run_id = Some(self.run_id.clone());
            state.records_uploaded_total += total_records;
            self.state_store
                .commit(&self.mapping.id, state.clone())
                .await
                .map_err(SyncError::StateStore)?;

            apply_post_upload_deletion(self.mapping, &mut extractor, &result.batch).await;

            if result.reached_end {
                break;
            }
        }

        // Dry runs never populate `total_records` (they never upload) but
        // still report `Succeeded` — only a real run that uploaded nothing
        // at all falls back to `Skipped{LowVolume}`.
        if !self.dry_run && total_records == 0 {
            return Ok(MappingOutcome::Skipped {
                reason: SkipReason::LowVolume,
            });
        }

        Ok(MappingOutcome::Succeeded {
            records: total_records,
            batches,
            bytes: total_bytes,
            duration: started_at.elapsed(),
        })
    }
}

async fn delete_artifacts(artifacts: &[Artifact]) {
    for artifact in artifacts {
        let _ = tokio::fs::remove_file(&artifact.path).await;
    }
}

/// Applies §4.4's post-upload deletion, refusing (and logging once) when
/// `delete_safety.enabled` is false rather than silently skipping — a
/// misconfigured mapping should be visible, not quietly inert.
async fn apply_post_upload_deletion(mapping: &Mapping, extractor: &mut Extractor, batch: &Batch) {
    if !mapping.transfer.delete_after_upload {
        return;
    }
    if !mapping.transfer.delete_safety.enabled {
        tracing::warn!(
            mapping_id = %mapping.id,
            "delete_after_upload is set but delete_safety.enabled is false; refusing to delete"
        );
        return;
    }
    let Some(where_column) = mapping.transfer.delete_safety.where_column.as_deref() else {
        tracing::warn!(
            mapping_id = %mapping.id,
            "delete_after_upload is set but delete_safety.where_column is empty; refusing to delete"
        );
        return;
    };
    let Some(table) = mapping.extraction.table.as_deref() else {
        tracing::warn!(
            mapping_id = %mapping.id,
            "delete_after_upload requires a table-based extraction; refusing to delete"
        );
        return;
    };

    let values: Vec<serde_json::Value> = batch
        .records
        .iter()
        .filter_map(|r| r.get(where_column).cloned())
        .collect();
    if values.is_empty() {
        return;
    }

    if let Err(err) = extractor.delete_uploaded(table, where_column, &values).await {
        tracing::error!(mapping_id = %mapping.id, %err, "post-upload deletion failed");
    }
}

async fn build_source(
    mapping: &Mapping,
    secrets: &dyn SecretResolver,
) -> Result<Box<dyn SourceAdapter>, SyncError> {
    match &mapping.source {
        Source::Relational {
            driver,
            host,
            port,
            db,
            user,
            secret_ref,
        } => {
            let password = secrets
                .resolve(secret_ref)
                .map_err(|e| SyncError::ConfigInvalid(e.to_string()))?;
            let url = connection_url(*driver, host, *port, db, user, &password);
            let extraction = mapping.extraction.clone();
            let transfer = mapping.transfer.clone();
            let source: Box<dyn SourceAdapter> = match driver {
                RelationalDriver::Mysql => {
                    Box::new(MySqlSource::connect(&url, extraction, transfer).await?)
                }
                RelationalDriver::Postgres => {
                    Box::new(PostgresSource::connect(&url, extraction, transfer).await?)
                }
            };
            Ok(source)
        }
        Source::LogFile { path, max_memory_mb } => {
            Ok(Box::new(LaravelLogSource::new(path.clone(), *max_memory_mb)))
        }
    }
}
