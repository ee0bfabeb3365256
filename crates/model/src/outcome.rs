use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of running a single mapping, aggregated by the Runner into a
/// [`RunReport`]-shaped map (`mapping_id -> MappingOutcome`) — see
/// `engine-runtime::runner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MappingOutcome {
    Succeeded {
        records: u64,
        batches: u64,
        bytes: u64,
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error_kind: ErrorKind,
        message: String,
        records_uploaded_before_failure: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    LowVolume,
    NotScheduled,
}

impl MappingOutcome {
    /// Whether this outcome counts toward the Runner's `success` exit status
    /// (every scheduled mapping succeeded or was cleanly skipped).
    pub fn is_clean(&self) -> bool {
        !matches!(self, MappingOutcome::Failed { .. })
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
