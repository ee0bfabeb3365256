use crate::error::ConnectorError;
use async_trait::async_trait;
use model::{
    batch::{Batch, Record},
    mapping::{Extraction, IncrementalMode},
    watermark::Watermark,
};
use serde_json::Value;
use std::collections::BTreeSet;

/// Result of one `fetch_batch` call.
pub struct FetchResult {
    pub batch: Batch,
    /// True when fewer than `batch_size` rows came back — the Extractor's
    /// stream is exhausted for this run.
    pub reached_end: bool,
}

/// The capability set a source must implement (§9: "Model as a closed
/// variant behind a capability set {open, stream(watermark) -> ..., close}").
/// `connect`/`close` are modeled as ordinary constructors/`Drop` on the
/// concrete adapters; this trait is the `stream` capability, called once per
/// batch by the Extractor.
#[async_trait]
pub trait SourceAdapter: Send {
    /// Fetch at most `batch_size` records strictly after `watermark`.
    /// `is_initial` is the first-call-after-force bit (§4.2), consulted only
    /// by `incremental_timestamp` adapters.
    async fn fetch_batch(
        &mut self,
        watermark: &Watermark,
        is_initial: bool,
        batch_size: usize,
    ) -> Result<FetchResult, ConnectorError>;

    /// Deletes the rows identified by `values` in `where_column` after a
    /// successful upload, when a mapping opts into `delete_after_upload`
    /// (§4.4). Sources that cannot reasonably support this reject it rather
    /// than silently no-op, so a misconfigured mapping fails loudly instead
    /// of quietly accumulating rows it believes it already deleted.
    async fn delete_by_pk(
        &mut self,
        _table: &str,
        _where_column: &str,
        _values: &[Value],
    ) -> Result<u64, ConnectorError> {
        Err(ConnectorError::QueryRejected(
            "source does not support delete_after_upload".into(),
        ))
    }
}

/// Pulls the column `incremental_mode` orders by out of one record and
/// stringifies it, so the adapter can fold a batch's rows into a tentative
/// watermark (§4.2 step 3) without the Extractor needing driver-specific
/// knowledge of column types.
pub fn row_watermark(
    extraction: &Extraction,
    mode: IncrementalMode,
    record: &Record,
) -> Option<Watermark> {
    let column = match mode {
        IncrementalMode::IncrementalPk => extraction.primary_key.as_deref()?,
        IncrementalMode::IncrementalTimestamp => extraction.timestamp_column.as_deref()?,
        IncrementalMode::Full => return None,
    };
    record.get(column).map(json_value_to_watermark)
}

fn json_value_to_watermark(value: &Value) -> Watermark {
    match value {
        Value::String(s) => Watermark::from(s.as_str()),
        Value::Number(n) => Watermark::from(n.to_string()),
        other => Watermark::from(other.to_string()),
    }
}

/// Applies §3's null-injection invariant and SPEC_FULL §10.5's `SchemaDrift`
/// detection to one fetched batch. `field_order` is `None` until the run's
/// first non-empty batch establishes it; every batch after that is widened
/// to those fields via [`Batch::reconcile`], and a batch introducing a field
/// outside that set is rejected rather than silently adopted.
pub fn apply_schema_drift_check(
    batch: &mut Batch,
    field_order: &mut Option<Vec<String>>,
) -> Result<(), ConnectorError> {
    if batch.is_empty() {
        return Ok(());
    }
    match field_order {
        None => {
            *field_order = Some(batch.field_order());
        }
        Some(fields) => {
            let known: BTreeSet<String> = fields.iter().cloned().collect();
            if batch.has_schema_drift(&known) {
                return Err(ConnectorError::SchemaDrift(format!(
                    "batch introduced a field outside the run's established set: {:?}",
                    fields
                )));
            }
            batch.reconcile(fields);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        let mut m = Record::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), v.clone());
        }
        m
    }

    #[test]
    fn first_batch_seeds_field_order_without_error() {
        let mut batch = Batch::new();
        batch.records.push(rec(&[("id", json!(1)), ("name", json!("a"))]));
        let mut field_order = None;

        apply_schema_drift_check(&mut batch, &mut field_order).unwrap();

        let mut fields = field_order.unwrap();
        fields.sort();
        assert_eq!(fields, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn later_batch_missing_a_field_gets_null_injected() {
        let mut field_order = Some(vec!["id".to_string(), "name".to_string()]);
        let mut batch = Batch::new();
        batch.records.push(rec(&[("id", json!(2))]));

        apply_schema_drift_check(&mut batch, &mut field_order).unwrap();

        assert_eq!(batch.records[0]["name"], Value::Null);
    }

    #[test]
    fn later_batch_with_an_unknown_field_is_rejected() {
        let mut field_order = Some(vec!["id".to_string()]);
        let mut batch = Batch::new();
        batch.records.push(rec(&[("id", json!(1)), ("new_col", json!("x"))]));

        let err = apply_schema_drift_check(&mut batch, &mut field_order).unwrap_err();
        assert!(matches!(err, ConnectorError::SchemaDrift(_)));
    }
}
