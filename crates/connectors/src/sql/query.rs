use model::mapping::{Extraction, IncrementalMode, TransferParams};
use model::watermark::Watermark;

/// Builds the deterministic query for one fetch, per §4.2:
///
/// - `incremental_pk`: `SELECT * FROM {table} WHERE {pk} > :w ORDER BY {pk} ASC LIMIT :n`
/// - `incremental_timestamp`: same pattern on the timestamp column, `>=` on
///   the first call after a `--force` reset and `>` thereafter.
/// - `full`: `SELECT * FROM {table}` with `order_by`, paged by `OFFSET` (only
///   acceptable for `full`, and quadratic — see module docs).
/// - an explicit `query` has `:w`/`:n` substituted textually; the mapping
///   author is responsible for correctness (§4.2 step 1).
pub fn build_query(
    extraction: &Extraction,
    transfer: &TransferParams,
    watermark: &Watermark,
    is_initial: bool,
    offset: Option<u64>,
) -> String {
    if let Some(explicit) = &extraction.query {
        return substitute_explicit(explicit, watermark, transfer.batch_size);
    }

    let table = extraction
        .table
        .as_deref()
        .expect("Mapping::validate guarantees table is set when query is not");

    match transfer.incremental_mode {
        IncrementalMode::IncrementalPk => {
            let pk = extraction
                .primary_key
                .as_deref()
                .expect("Mapping::validate guarantees primary_key for incremental_pk");
            build_incremental(table, pk, ">", watermark, transfer.batch_size)
        }
        IncrementalMode::IncrementalTimestamp => {
            let col = extraction
                .timestamp_column
                .as_deref()
                .unwrap_or("updated_at");
            let op = if is_initial { ">=" } else { ">" };
            build_incremental(table, col, op, watermark, transfer.batch_size)
        }
        IncrementalMode::Full => {
            let order = transfer.order_by.as_deref().unwrap_or("1");
            match offset {
                Some(off) => format!(
                    "SELECT * FROM {table} ORDER BY {order} LIMIT {n} OFFSET {off}",
                    n = transfer.batch_size
                ),
                None => format!("SELECT * FROM {table} ORDER BY {order} LIMIT {n}", n = transfer.batch_size),
            }
        }
    }
}

fn build_incremental(
    table: &str,
    column: &str,
    op: &str,
    watermark: &Watermark,
    batch_size: usize,
) -> String {
    if watermark.is_empty() {
        format!("SELECT * FROM {table} ORDER BY {column} ASC LIMIT {batch_size}")
    } else {
        let literal = sql_literal(watermark.as_str());
        format!(
            "SELECT * FROM {table} WHERE {column} {op} {literal} ORDER BY {column} ASC LIMIT {batch_size}"
        )
    }
}

fn substitute_explicit(query: &str, watermark: &Watermark, batch_size: usize) -> String {
    query
        .replace(":w", &sql_literal(watermark.as_str()))
        .replace(":n", &batch_size.to_string())
}

/// Embeds a watermark value as a SQL literal. Watermarks are either produced
/// by this engine (PK/timestamp values re-serialized from a previous batch)
/// or a trusted mapping's initial value, never raw user input, so textual
/// embedding (rather than driver-level parameter binding, which would
/// require knowing the column's native type up front) is safe and matches
/// the substitution model §4.2 describes for explicit queries.
pub(crate) fn sql_literal(value: &str) -> String {
    if value.parse::<i64>().is_ok() || value.parse::<f64>().is_ok() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Builds the comma-separated literal list for a `DELETE ... WHERE col IN
/// (...)` clause (§4.4 post-upload deletion), embedding each value the same
/// way [`sql_literal`] embeds watermarks.
pub(crate) fn delete_in_clause(values: &[serde_json::Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            serde_json::Value::String(s) => sql_literal(s),
            serde_json::Value::Number(n) => n.to_string(),
            other => sql_literal(&other.to_string()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(table: &str) -> Extraction {
        Extraction {
            query: None,
            table: Some(table.to_string()),
            primary_key: Some("id".to_string()),
            timestamp_column: Some("updated_at".to_string()),
        }
    }

    #[test]
    fn incremental_pk_empty_watermark_has_no_where_clause() {
        let transfer = TransferParams {
            incremental_mode: IncrementalMode::IncrementalPk,
            batch_size: 200,
            ..Default::default()
        };
        let sql = build_query(&extraction("users"), &transfer, &Watermark::empty(), true, None);
        assert_eq!(
            sql,
            "SELECT * FROM users ORDER BY id ASC LIMIT 200"
        );
    }

    #[test]
    fn incremental_pk_nonempty_watermark_uses_strict_gt() {
        let transfer = TransferParams {
            incremental_mode: IncrementalMode::IncrementalPk,
            batch_size: 200,
            ..Default::default()
        };
        let sql = build_query(
            &extraction("users"),
            &transfer,
            &Watermark::from("1000"),
            false,
            None,
        );
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE id > 1000 ORDER BY id ASC LIMIT 200"
        );
    }

    #[test]
    fn incremental_timestamp_initial_call_uses_gte() {
        let transfer = TransferParams {
            incremental_mode: IncrementalMode::IncrementalTimestamp,
            batch_size: 10,
            ..Default::default()
        };
        let wm = Watermark::from("2024-01-01T00:00:00.000Z");
        let sql = build_query(&extraction("events"), &transfer, &wm, true, None);
        assert!(sql.contains(">= '2024-01-01T00:00:00.000Z'"));
    }

    #[test]
    fn incremental_timestamp_subsequent_call_uses_strict_gt() {
        let transfer = TransferParams {
            incremental_mode: IncrementalMode::IncrementalTimestamp,
            batch_size: 10,
            ..Default::default()
        };
        let wm = Watermark::from("2024-01-01T00:00:00.000Z");
        let sql = build_query(&extraction("events"), &transfer, &wm, false, None);
        assert!(sql.contains("> '2024-01-01T00:00:00.000Z'"));
    }

    #[test]
    fn full_mode_pages_with_offset() {
        let transfer = TransferParams {
            incremental_mode: IncrementalMode::Full,
            batch_size: 50,
            order_by: Some("id".to_string()),
            ..Default::default()
        };
        let sql = build_query(&extraction("logs"), &transfer, &Watermark::empty(), true, Some(100));
        assert_eq!(sql, "SELECT * FROM logs ORDER BY id LIMIT 50 OFFSET 100");
    }

    #[test]
    fn delete_in_clause_mixes_numbers_and_strings() {
        let values = vec![serde_json::json!(1), serde_json::json!("o'brien")];
        assert_eq!(delete_in_clause(&values), "1, 'o''brien'");
    }

    #[test]
    fn explicit_query_substitutes_watermark_and_batch_size() {
        let extraction = Extraction {
            query: Some("SELECT * FROM t WHERE id > :w LIMIT :n".to_string()),
            ..Default::default()
        };
        let transfer = TransferParams {
            batch_size: 42,
            ..Default::default()
        };
        let sql = build_query(&extraction, &transfer, &Watermark::from("7"), false, None);
        assert_eq!(sql, "SELECT * FROM t WHERE id > 7 LIMIT 42");
    }
}
