use crate::watermark::Watermark;
use serde_json::Value;
use std::collections::BTreeSet;

/// A mapping from field name to JSON scalar or object, in the field order
/// established by the first record of the run.
pub type Record = serde_json::Map<String, Value>;

/// An ordered, finite sequence of records processed as a unit, tagged with the
/// tentative watermark reached after the last record in the batch.
///
/// Invariant (§3): every record has the same field set as the first record of
/// the run; [`Batch::reconcile`] enforces this by injecting `null` for columns
/// absent from a given row.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub records: Vec<Record>,
    pub tentative_watermark: Option<Watermark>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Widens every record to the union of field names seen across the run,
    /// injecting `null` for any field a given row did not produce.
    pub fn reconcile(&mut self, field_order: &[String]) {
        for record in &mut self.records {
            for field in field_order {
                record.entry(field.clone()).or_insert(Value::Null);
            }
        }
    }

    /// The field names present in the first record, in encounter order. Used
    /// to seed `field_order` for [`Batch::reconcile`] across a whole run.
    pub fn field_order(&self) -> Vec<String> {
        self.records
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// True if any record's field set differs from the first record's,
    /// outside of what `reconcile` can fix by injecting nulls. This is the
    /// best-effort `SchemaDrift` signal: a genuinely new column appearing
    /// mid-run, not just a missing one.
    pub fn has_schema_drift(&self, known_fields: &BTreeSet<String>) -> bool {
        self.records
            .iter()
            .any(|r| r.keys().any(|k| !known_fields.contains(k)))
    }
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
    fn reconcile_injects_nulls_for_missing_fields() {
        let mut batch = Batch::new();
        batch.records.push(rec(&[("id", json!(1)), ("name", json!("a"))]));
        batch.records.push(rec(&[("id", json!(2))]));

        batch.reconcile(&["id".to_string(), "name".to_string()]);

        assert_eq!(batch.records[1]["name"], Value::Null);
        assert_eq!(batch.records[1]["id"], json!(2));
    }

    #[test]
    fn detects_schema_drift_for_unknown_column() {
        let mut batch = Batch::new();
        batch.records.push(rec(&[("id", json!(1)), ("extra", json!("x"))]));
        let known: BTreeSet<String> = ["id".to_string()].into_iter().collect();
        assert!(batch.has_schema_drift(&known));
    }
}
