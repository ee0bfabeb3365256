use crate::watermark::Watermark;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-mapping persisted state (§3). Created on first run; mutated only by
/// the StateStore; destroyed only by an explicit `--force` reset, which
/// zeroes `watermark` and clears `last_error` but leaves other mappings'
/// states untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub watermark: Watermark,
    /// Distinguishes the first `incremental_timestamp` call after a
    /// `--force` reset (`>=` on the boundary row) from subsequent calls
    /// (`>`), so the boundary row is not re-emitted on every run.
    #[serde(default)]
    pub watermark_is_initial: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_run_id: Option<String>,
    pub records_uploaded_total: u64,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            watermark: Watermark::empty(),
            watermark_is_initial: true,
            last_success_at: None,
            last_error: None,
            last_run_id: None,
            records_uploaded_total: 0,
        }
    }
}

impl RunState {
    /// Resets for `--force`: watermark back to empty, error cleared, the
    /// "initial" bit re-armed so the next incremental_timestamp query uses
    /// `>=` again.
    pub fn force_reset(&mut self) {
        self.watermark = Watermark::empty();
        self.watermark_is_initial = true;
        self.last_error = None;
    }
}
