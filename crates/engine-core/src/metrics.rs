use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// In-process counters for one mapping's run (§4.6). Cheap to clone (an
/// `Arc` around atomics) so the Extractor, BatchWriter and Uploader can each
/// hold a handle without coordinating.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    records_read: AtomicU64,
    records_uploaded: AtomicU64,
    bytes_out: AtomicU64,
    batches: AtomicU64,
    artifacts: AtomicU64,
    retries_attempted: AtomicU64,
    retries_exhausted: AtomicU64,
    skipped_low_volume: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub records_read: u64,
    pub records_uploaded: u64,
    pub bytes_out: u64,
    pub batches: u64,
    pub artifacts: u64,
    pub retries_attempted: u64,
    pub retries_exhausted: u64,
    pub skipped_low_volume: u64,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_records_read(&self, n: u64) {
        self.inner.records_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_records_uploaded(&self, n: u64) {
        self.inner.records_uploaded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.inner.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_batches(&self) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_artifacts(&self) {
        self.inner.artifacts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries_attempted(&self) {
        self.inner.retries_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries_exhausted(&self) {
        self.inner.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped_low_volume(&self) {
        self.inner.skipped_low_volume.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.inner.records_read.load(Ordering::Relaxed),
            records_uploaded: self.inner.records_uploaded.load(Ordering::Relaxed),
            bytes_out: self.inner.bytes_out.load(Ordering::Relaxed),
            batches: self.inner.batches.load(Ordering::Relaxed),
            artifacts: self.inner.artifacts.load(Ordering::Relaxed),
            retries_attempted: self.inner.retries_attempted.load(Ordering::Relaxed),
            retries_exhausted: self.inner.retries_exhausted.load(Ordering::Relaxed),
            skipped_low_volume: self.inner.skipped_low_volume.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = MetricsSink::new();
        metrics.add_records_read(10);
        metrics.add_records_uploaded(8);
        metrics.inc_retries_attempted();
        metrics.inc_retries_attempted();

        let snap = metrics.snapshot();
        assert_eq!(snap.records_read, 10);
        assert_eq!(snap.records_uploaded, 8);
        assert_eq!(snap.retries_attempted, 2);
        assert_eq!(snap.retries_exhausted, 0);
    }
}
