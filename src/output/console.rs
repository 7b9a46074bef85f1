use crate::scan::{OutcomeStatus, ScanOutcome};
use crate::BatchReport;

pub fn start_line(rules: usize, threads: usize) -> String {
    format!("Scanning with {} rule file(s) using {} thread(s)...", rules, threads)
}

/// One line per collected outcome.
pub fn progress_line(outcome: &ScanOutcome) -> String {
    let verdict = if outcome.matched { "match" } else { "no match" };
    match outcome.status {
        OutcomeStatus::Completed => format!("Done: {} - {}", outcome.rule_name, verdict),
        ref status => format!("Done: {} - {} ({})", outcome.rule_name, verdict, status),
    }
}

pub fn summary_line(report: &BatchReport) -> String {
    format!(
        "Scan complete! Processed {} rule(s), {} matched, in {:.2} seconds",
        report.outcomes.len(),
        report.matched_count(),
        report.elapsed.as_secs_f64(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::sample_report;
    use pretty_assertions::assert_eq;

    #[test]
    fn progress_lines() {
        let report = sample_report();
        assert_eq!(progress_line(&report.outcomes[0]), "Done: a.yar - match");
        assert_eq!(progress_line(&report.outcomes[1]), "Done: b.yara - no match");
        assert_eq!(
            progress_line(&report.outcomes[2]),
            "Done: c.yar - no match (exit code 1)"
        );
    }

    #[test]
    fn summary_reports_totals_and_time() {
        assert_eq!(
            summary_line(&sample_report()),
            "Scan complete! Processed 3 rule(s), 1 matched, in 1.50 seconds"
        );
    }
}
