use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::scan::ScanOutcome;
use crate::BatchReport;

#[derive(Serialize)]
struct JsonReport<'a> {
    run_id: &'a Uuid,
    started_at: &'a DateTime<Utc>,
    elapsed_secs: f64,
    target: &'a Path,
    target_sha256: Option<&'a str>,
    checker: &'a Path,
    threads: usize,
    rules_total: usize,
    rules_matched: usize,
    outcomes: Vec<JsonOutcome<'a>>,
}

#[derive(Serialize)]
struct JsonOutcome<'a> {
    #[serde(flatten)]
    outcome: &'a ScanOutcome,
    matched_identifiers: Vec<String>,
}

/// Render the batch as a JSON document with run metadata.
pub fn render(report: &BatchReport) -> Result<String> {
    let doc = JsonReport {
        run_id: &report.run_id,
        started_at: &report.started_at,
        elapsed_secs: report.elapsed.as_secs_f64(),
        target: &report.target,
        target_sha256: report.target_sha256.as_deref(),
        checker: &report.checker,
        threads: report.threads,
        rules_total: report.outcomes.len(),
        rules_matched: report.matched_count(),
        outcomes: report
            .outcomes
            .iter()
            .map(|outcome| JsonOutcome {
                outcome,
                matched_identifiers: outcome.matched_identifiers(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::sample_report;
    use pretty_assertions::assert_eq;

    #[test]
    fn includes_run_metadata_and_status() {
        let report = sample_report();
        let value: serde_json::Value = serde_json::from_str(&render(&report).unwrap()).unwrap();

        assert_eq!(value["run_id"], report.run_id.to_string());
        assert_eq!(value["rules_total"], 3);
        assert_eq!(value["rules_matched"], 1);
        assert_eq!(value["threads"], 4);
        assert_eq!(value["outcomes"][0]["rule_name"], "a.yar");
        assert_eq!(value["outcomes"][0]["status"]["kind"], "completed");
        assert_eq!(value["outcomes"][2]["status"]["kind"], "exit_failure");
        assert_eq!(value["outcomes"][2]["status"]["code"], 1);
        assert_eq!(value["outcomes"][0]["matched_identifiers"][0], "MATCH");
    }
}
