use engine_runtime::RunReport;
use model::outcome::MappingOutcome;
use model::run_state::RunState;

use crate::error::CliError;

/// One line per mapping (§7's "terse one-line status per mapping"); details
/// belong in the log, not here.
pub fn print_report_human(report: &RunReport) {
    let mut ids: Vec<&String> = report.outcomes.keys().collect();
    ids.sort();
    for id in ids {
        match &report.outcomes[id] {
            MappingOutcome::Succeeded {
                records,
                batches,
                bytes,
                duration,
            } => println!(
                "{id}: succeeded ({records} records, {batches} batches, {bytes} bytes, {:.1}s)",
                duration.as_secs_f64()
            ),
            MappingOutcome::Skipped { reason } => println!("{id}: skipped ({reason:?})"),
            MappingOutcome::Failed {
                error_kind,
                message,
                records_uploaded_before_failure,
            } => println!(
                "{id}: failed ({error_kind}): {message} [{records_uploaded_before_failure} records uploaded before failure]"
            ),
        }
    }
}

pub fn print_report_json(report: &RunReport) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(&report.outcomes)?;
    println!("{json}");
    Ok(())
}

pub fn print_status_human(mapping_id: &str, state: &RunState) {
    let watermark = if state.watermark.is_empty() {
        "<none>".to_string()
    } else {
        state.watermark.as_str().to_string()
    };
    let last_success = state
        .last_success_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    let last_error = state.last_error.as_deref().unwrap_or("none");
    println!(
        "{mapping_id}: watermark={watermark} last_success={last_success} last_error={last_error} records_uploaded_total={}",
        state.records_uploaded_total
    );
}

pub fn print_status_json(states: &std::collections::HashMap<String, RunState>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(states)?;
    println!("{json}");
    Ok(())
}
