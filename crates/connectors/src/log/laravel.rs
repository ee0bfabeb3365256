use crate::{
    adapter::{apply_schema_drift_check, FetchResult, SourceAdapter},
    error::ConnectorError,
};
use async_trait::async_trait;
use model::{
    batch::{Batch, Record},
    watermark::Watermark,
};
use regex::Regex;
use serde_json::json;
use std::{
    io::{Read, Seek, SeekFrom},
    os::unix::fs::MetadataExt,
    path::PathBuf,
};
use tokio::task;

const HEADER_PATTERN: &str =
    r"(?m)^\[(?P<log_date>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\] (?P<environment>[^.]+)\.(?P<type>[A-Z]+): ";

/// Streaming reader for Laravel-style log files (§4.2). Reads in chunks
/// bounded by `max_memory_mb`; the trailing, possibly-incomplete record of a
/// chunk is held back and prefixed to the next read so no record is split.
pub struct LaravelLogSource {
    path: PathBuf,
    max_memory_mb: u64,
    header: Regex,
    /// Leftover text from the previous chunk that did not form a complete
    /// record yet.
    carry: String,
    /// File byte offset where `carry` begins.
    carry_start: u64,
    /// Next file offset to read from.
    read_pos: u64,
    started: bool,
    /// Inode of the file as of the last `resolve_start`/successful read,
    /// used alongside size to detect rotation (§4.2, SPEC_FULL §10.5).
    last_inode: Option<u64>,
    /// Field set established by this run's first non-empty batch; seeds
    /// null-injection and schema drift detection for every batch after.
    field_order: Option<Vec<String>>,
}

impl LaravelLogSource {
    pub fn new(path: impl Into<PathBuf>, max_memory_mb: u64) -> Self {
        Self {
            path: path.into(),
            max_memory_mb: max_memory_mb.max(1),
            header: Regex::new(HEADER_PATTERN).expect("static header pattern is valid"),
            carry: String::new(),
            carry_start: 0,
            read_pos: 0,
            started: false,
            last_inode: None,
            field_order: None,
        }
    }

    fn chunk_bytes(&self) -> u64 {
        self.max_memory_mb * 1_048_576
    }

    /// Resolves the run's starting offset. A rotation — detected as either an
    /// inode change or the current file being shorter than the persisted
    /// watermark offset — resets to zero and is logged (S4). The inode check
    /// catches create-new-file rotation schemes that `logrotate` on CI boxes
    /// commonly grow past the stale offset before the next sync.
    async fn resolve_start(&mut self, watermark: &Watermark) -> Result<(), ConnectorError> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        let current_len = metadata.len();
        let current_inode = metadata.ino();
        let requested_offset = watermark.as_str().parse::<u64>().unwrap_or(0);

        let inode_changed = self
            .last_inode
            .is_some_and(|last| last != current_inode);
        let size_shrunk = current_len < requested_offset;

        if inode_changed || size_shrunk {
            tracing::warn!(
                path = %self.path.display(),
                requested_offset,
                current_len,
                inode_changed,
                size_shrunk,
                "log rotation detected, restarting from offset 0"
            );
            self.read_pos = 0;
        } else {
            self.read_pos = requested_offset;
        }
        self.last_inode = Some(current_inode);
        self.carry_start = self.read_pos;
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for LaravelLogSource {
    async fn fetch_batch(
        &mut self,
        watermark: &Watermark,
        _is_initial: bool,
        batch_size: usize,
    ) -> Result<FetchResult, ConnectorError> {
        if !self.started {
            self.resolve_start(watermark).await?;
            self.started = true;
        }

        let path = self.path.clone();
        let read_pos = self.read_pos;
        let chunk_bytes = self.chunk_bytes();
        let (chunk, eof) = task::spawn_blocking(move || read_chunk(&path, read_pos, chunk_bytes))
            .await
            .map_err(|e| ConnectorError::Io(std::io::Error::other(e)))??;
        self.read_pos += chunk.len() as u64;

        let mut text = std::mem::take(&mut self.carry);
        text.push_str(&String::from_utf8_lossy(&chunk));
        let base_offset = self.carry_start;

        let matches: Vec<usize> = self.header.find_iter(&text).map(|m| m.start()).collect();

        let mut batch = Batch::new();
        let mut last_emitted_start = None;
        let mut i = 0;
        while i < matches.len() && batch.len() < batch_size {
            let start = matches[i];
            let is_last_match = i + 1 == matches.len();
            if is_last_match && !eof {
                // Incomplete trailing record — hold it back for the next chunk.
                break;
            }
            let end = if is_last_match { text.len() } else { matches[i + 1] };

            batch.records.push(parse_record(&self.header, &text[start..end]));
            last_emitted_start = Some(base_offset + start as u64);
            i += 1;
        }

        let consumed_end = if i < matches.len() { matches[i] } else { text.len() };
        self.carry_start = base_offset + consumed_end as u64;
        self.carry = text[consumed_end..].to_string();

        if let Some(offset) = last_emitted_start {
            batch.tentative_watermark = Some(Watermark::from(offset.to_string()));
        } else if eof {
            // Nothing new emitted this call; if we've reached EOF, watermark is
            // simply the file's end (covers the "file unchanged" no-op run).
            batch.tentative_watermark = Some(Watermark::from(self.read_pos.to_string()));
        }

        apply_schema_drift_check(&mut batch, &mut self.field_order)?;

        Ok(FetchResult {
            batch,
            reached_end: eof,
        })
    }
}

fn read_chunk(path: &std::path::Path, pos: u64, max_bytes: u64) -> std::io::Result<(Vec<u8>, bool)> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(pos))?;

    let mut buf = vec![0u8; max_bytes as usize];
    let mut total = 0usize;
    loop {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    let eof = (total as u64) < max_bytes;
    Ok((buf, eof))
}

fn parse_record(header: &Regex, body: &str) -> Record {
    let mut record = Record::new();
    record.insert(
        "message".to_string(),
        json!(body.trim_end_matches('\n')),
    );
    if let Some(caps) = header.captures(body) {
        if let Some(m) = caps.name("log_date") {
            record.insert("log_date".to_string(), json!(m.as_str()));
        }
        if let Some(m) = caps.name("environment") {
            record.insert("environment".to_string(), json!(m.as_str()));
        }
        if let Some(m) = caps.name("type") {
            record.insert("level".to_string(), json!(m.as_str()));
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_log() -> String {
        "[2024-01-01 10:00:00] production.ERROR: first failure\nwith a trailing line\n\
         [2024-01-01 10:00:05] production.INFO: second message\n"
            .to_string()
    }

    #[tokio::test]
    async fn parses_two_records_from_a_small_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", sample_log()).unwrap();

        let mut source = LaravelLogSource::new(file.path(), 8);
        let result = source
            .fetch_batch(&Watermark::empty(), true, 10)
            .await
            .unwrap();

        assert!(result.reached_end);
        assert_eq!(result.batch.len(), 2);
        assert_eq!(result.batch.records[0]["level"], json!("ERROR"));
        assert_eq!(result.batch.records[1]["level"], json!("INFO"));
        assert!(
            result.batch.records[0]["message"]
                .as_str()
                .unwrap()
                .contains("with a trailing line")
        );
    }

    #[tokio::test]
    async fn rotation_resets_offset_to_zero() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", sample_log()).unwrap();

        let mut source = LaravelLogSource::new(file.path(), 8);
        // Simulate a persisted watermark far beyond the new (rotated) file's length.
        let stale_watermark = Watermark::from("999999");
        let result = source.fetch_batch(&stale_watermark, true, 10).await.unwrap();

        assert_eq!(result.batch.len(), 2);
    }
}
