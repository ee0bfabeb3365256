use engine_core::error::StateStoreError;
use flate2::{Compression, GzBuilder};
use model::batch::{Batch, Record};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// One gzip-compressed NDJSON file produced by [`BatchWriter`] (§3's
/// `TransferArtifact`, named `{mapping_id}.{run_id}.{seq}.jsonl.gz`).
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
    pub record_count: u64,
}

/// Serializes batches to gzip-compressed, newline-delimited JSON, splitting
/// into multiple artifacts when `max_file_size_mb` would be exceeded (§4.3).
/// `next_seq` runs continuously for the life of one mapping run, independent
/// of batch boundaries.
pub struct BatchWriter {
    scratch_dir: PathBuf,
    mapping_id: String,
    run_id: String,
    max_file_size_bytes: u64,
    next_seq: u64,
}

impl BatchWriter {
    pub fn new(
        scratch_dir: PathBuf,
        mapping_id: String,
        run_id: String,
        max_file_size_mb: u64,
    ) -> Self {
        Self {
            scratch_dir,
            mapping_id,
            run_id,
            max_file_size_bytes: max_file_size_mb.max(1) * 1_048_576,
            next_seq: 0,
        }
    }

    /// Serializes `batch` to one or more artifacts. Blocking file and gzip
    /// work runs on the blocking thread pool.
    pub async fn write(&mut self, batch: &Batch) -> Result<Vec<Artifact>, SyncError> {
        let scratch_dir = self.scratch_dir.clone();
        tokio::fs::create_dir_all(&scratch_dir)
            .await
            .map_err(|e| SyncError::StateStore(StateStoreError::Write(e.to_string())))?;

        let records = batch.records.clone();
        let mapping_id = self.mapping_id.clone();
        let run_id = self.run_id.clone();
        let start_seq = self.next_seq;
        let max_bytes = self.max_file_size_bytes;

        let (artifacts, next_seq) = tokio::task::spawn_blocking(move || {
            write_records_blocking(&records, &scratch_dir, &mapping_id, &run_id, start_seq, max_bytes)
        })
        .await
        .map_err(|e| SyncError::StateStore(StateStoreError::Write(e.to_string())))?
        .map_err(|e| SyncError::StateStore(StateStoreError::Write(e.to_string())))?;

        self.next_seq = next_seq;
        Ok(artifacts)
    }
}

fn write_records_blocking(
    records: &[Record],
    scratch_dir: &Path,
    mapping_id: &str,
    run_id: &str,
    start_seq: u64,
    max_file_size_bytes: u64,
) -> std::io::Result<(Vec<Artifact>, u64)> {
    let mut artifacts = Vec::new();
    let mut seq = start_seq;
    let mut writer: Option<(PathBuf, flate2::write::GzEncoder<std::fs::File>)> = None;
    let mut uncompressed_bytes = 0u64;
    let mut record_count = 0u64;

    let open = |seq: u64| -> std::io::Result<(PathBuf, flate2::write::GzEncoder<std::fs::File>)> {
        let path = scratch_dir.join(format!("{mapping_id}.{run_id}.{seq}.jsonl.gz"));
        let file = std::fs::File::create(&path)?;
        let encoder = GzBuilder::new().mtime(0).write(file, Compression::default());
        Ok((path, encoder))
    };

    let finish = |writer: (PathBuf, flate2::write::GzEncoder<std::fs::File>),
                  record_count: u64|
     -> std::io::Result<Artifact> {
        let (path, encoder) = writer;
        encoder.finish()?;
        let size = std::fs::metadata(&path)?.len();
        Ok(Artifact {
            path,
            size,
            record_count,
        })
    };

    for record in records {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let line_len = line.len() as u64;

        if writer.is_none() {
            writer = Some(open(seq)?);
        } else if uncompressed_bytes + line_len > max_file_size_bytes && record_count > 0 {
            let finished = finish(writer.take().unwrap(), record_count)?;
            artifacts.push(finished);
            seq += 1;
            record_count = 0;
            uncompressed_bytes = 0;
            writer = Some(open(seq)?);
        }

        writer.as_mut().unwrap().1.write_all(line.as_bytes())?;
        uncompressed_bytes += line_len;
        record_count += 1;
    }

    if let Some(w) = writer {
        artifacts.push(finish(w, record_count)?);
        seq += 1;
    }

    Ok((artifacts, seq))
}
