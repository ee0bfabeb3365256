use serde::{Deserialize, Serialize};
use std::fmt;

/// The error taxonomy from spec §7 — kinds, not types. Every crate boundary
/// error eventually classifies into one of these so the Runner can decide
/// retry-vs-fatal without string matching on error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed mapping, missing credential reference. Fatal for that
    /// mapping; surfaces without any network or DB activity.
    ConfigInvalid,
    /// TCP refused, auth failed, DB down. Retried up to 3 times at the
    /// Extractor level, then fatal for the mapping.
    SourceUnavailable,
    /// SQL error, missing column, permission denied. Fatal; no retry.
    QueryRejected,
    /// Column set changed mid-run outside of null-injection reconciliation.
    /// Best-effort, surfaced but not retried.
    SchemaDrift,
    /// Mid-stream disconnect, 5xx, 429, timeout. Retried per the owning
    /// component's policy; exhausted retries become `UploadFailed`.
    Transient,
    /// Upload retry budget exhausted. Fatal; watermark not advanced.
    UploadFailed,
    /// Unparseable state file. Recovered: quarantine + empty state + warning.
    StateCorrupt,
    /// External signal (SIGINT/SIGTERM). Fatal for the mapping; clean
    /// termination with the last committed watermark retained.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::SourceUnavailable => "SourceUnavailable",
            ErrorKind::QueryRejected => "QueryRejected",
            ErrorKind::SchemaDrift => "SchemaDrift",
            ErrorKind::Transient => "Transient",
            ErrorKind::UploadFailed => "UploadFailed",
            ErrorKind::StateCorrupt => "StateCorrupt",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}
