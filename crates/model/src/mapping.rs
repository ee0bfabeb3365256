use serde::{Deserialize, Serialize};

/// A declarative unit describing one source table/log to one remote schema slug.
///
/// A [`Mapping`] is immutable for the duration of a run; it is loaded once by
/// `engine-config` and never mutated by the engine. See [`Mapping::validate`]
/// for the well-formedness rule enforced at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: String,
    pub source: Source,
    pub schema_slug: String,
    #[serde(flatten)]
    pub extraction: Extraction,
    #[serde(default)]
    pub transfer: TransferParams,
}

/// Either a literal SQL query or a `{table, primary_key, timestamp_column}` triple.
/// Exactly one of `query` or `table` must be set; enforced by [`Mapping::validate`]
/// rather than by the shape of this type, since both arrive as optional JSON fields.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Extraction {
    pub query: Option<String>,
    pub table: Option<String>,
    pub primary_key: Option<String>,
    pub timestamp_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Relational {
        driver: RelationalDriver,
        host: String,
        port: u16,
        db: String,
        user: String,
        secret_ref: String,
    },
    LogFile {
        path: String,
        max_memory_mb: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationalDriver {
    Mysql,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalMode {
    Full,
    IncrementalPk,
    IncrementalTimestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSafety {
    #[serde(default)]
    pub enabled: bool,
    pub where_column: Option<String>,
}

impl Default for DeleteSafety {
    fn default() -> Self {
        Self {
            enabled: false,
            where_column: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferParams {
    #[serde(default = "TransferParams::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "TransferParams::default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "TransferParams::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub min_records_for_upload: usize,
    #[serde(default)]
    pub incremental_mode: IncrementalMode,
    pub order_by: Option<String>,
    #[serde(default)]
    pub delete_after_upload: bool,
    #[serde(default)]
    pub delete_safety: DeleteSafety,
}

impl TransferParams {
    /// Source docs and sample mappings disagreed (10000 vs 5000); 5000 is the
    /// explicit, documented default going forward.
    fn default_batch_size() -> usize {
        5000
    }

    fn default_max_file_size_mb() -> u64 {
        64
    }

    fn default_retry_attempts() -> u32 {
        3
    }
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            max_file_size_mb: Self::default_max_file_size_mb(),
            retry_attempts: Self::default_retry_attempts(),
            min_records_for_upload: 0,
            incremental_mode: IncrementalMode::Full,
            order_by: None,
            delete_after_upload: false,
            delete_safety: DeleteSafety::default(),
        }
    }
}

impl Default for IncrementalMode {
    fn default() -> Self {
        IncrementalMode::Full
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MappingValidationError {
    #[error("mapping `{0}`: exactly one of `query` or `table` must be set")]
    AmbiguousSource(String),
    #[error("mapping `{0}`: batch_size must be >= 1")]
    InvalidBatchSize(String),
    #[error("mapping `{0}`: incremental_pk mode requires a non-empty primary_key")]
    MissingPrimaryKey(String),
}

impl Mapping {
    pub fn validate(&self) -> Result<(), MappingValidationError> {
        let has_query = self.extraction.query.is_some();
        let has_table = self.extraction.table.is_some();
        if has_query == has_table {
            return Err(MappingValidationError::AmbiguousSource(self.id.clone()));
        }

        if self.transfer.batch_size < 1 {
            return Err(MappingValidationError::InvalidBatchSize(self.id.clone()));
        }

        if self.transfer.incremental_mode == IncrementalMode::IncrementalPk
            && self
                .extraction
                .primary_key
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err(MappingValidationError::MissingPrimaryKey(self.id.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(extraction: Extraction, transfer: TransferParams) -> Mapping {
        Mapping {
            id: "m1".into(),
            source: Source::LogFile {
                path: "/var/log/app.log".into(),
                max_memory_mb: 32,
            },
            schema_slug: "slug".into(),
            extraction,
            transfer,
        }
    }

    #[test]
    fn rejects_both_query_and_table() {
        let m = base(
            Extraction {
                query: Some("select 1".into()),
                table: Some("users".into()),
                ..Default::default()
            },
            TransferParams::default(),
        );
        assert!(matches!(
            m.validate(),
            Err(MappingValidationError::AmbiguousSource(_))
        ));
    }

    #[test]
    fn rejects_neither_query_nor_table() {
        let m = base(Extraction::default(), TransferParams::default());
        assert!(matches!(
            m.validate(),
            Err(MappingValidationError::AmbiguousSource(_))
        ));
    }

    #[test]
    fn rejects_incremental_pk_without_primary_key() {
        let mut transfer = TransferParams::default();
        transfer.incremental_mode = IncrementalMode::IncrementalPk;
        let m = base(
            Extraction {
                table: Some("users".into()),
                ..Default::default()
            },
            transfer,
        );
        assert!(matches!(
            m.validate(),
            Err(MappingValidationError::MissingPrimaryKey(_))
        ));
    }

    #[test]
    fn accepts_well_formed_mapping() {
        let mut transfer = TransferParams::default();
        transfer.incremental_mode = IncrementalMode::IncrementalPk;
        let m = base(
            Extraction {
                table: Some("users".into()),
                primary_key: Some("id".into()),
                ..Default::default()
            },
            transfer,
        );
        assert!(m.validate().is_ok());
    }
}
