pub mod invoker;

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::rules::RuleTask;

pub use invoker::YaraInvoker;

/// Applies one rule to the batch's fixed target.
///
/// Implementations must always return an outcome; failures are folded into
/// [`OutcomeStatus`] instead of being returned as errors.
pub trait Invoke: Send + Sync {
    fn invoke(&self, task: &RuleTask) -> ScanOutcome;

    /// The target every invocation runs against.
    fn target(&self) -> &Path;
}

/// How a single invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Checker exited with status 0.
    Completed,
    /// Checker exited non-zero; `code` is `None` when killed by a signal.
    ExitFailure { code: Option<i32> },
    /// Checker could not be spawned or waited on.
    LaunchFailed,
    /// Checker exceeded the per-invocation timeout and was killed.
    TimedOut { after_secs: u64 },
    /// The invocation panicked or its worker vanished before reporting.
    WorkerFault,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::ExitFailure { code: Some(code) } => write!(f, "exit code {}", code),
            Self::ExitFailure { code: None } => write!(f, "killed by signal"),
            Self::LaunchFailed => write!(f, "launch failed"),
            Self::TimedOut { after_secs } => write!(f, "timed out after {}s", after_secs),
            Self::WorkerFault => write!(f, "worker fault"),
        }
    }
}

/// Normalized result of applying one rule file to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub rule_name: String,
    pub rule_path: PathBuf,
    pub target_path: PathBuf,
    pub matched: bool,
    pub stdout: String,
    pub stderr: String,
    pub status: OutcomeStatus,
}

impl ScanOutcome {
    /// Build an outcome from captured process output.
    ///
    /// Only a clean exit with non-empty output counts as a match.
    pub fn from_output(
        task: &RuleTask,
        target: &Path,
        status: OutcomeStatus,
        stdout: &str,
        stderr: &str,
    ) -> Self {
        let stdout = stdout.trim().to_string();
        let matched = status == OutcomeStatus::Completed && !stdout.is_empty();
        Self {
            rule_name: task.rule_name.clone(),
            rule_path: task.rule_path.clone(),
            target_path: target.to_path_buf(),
            matched,
            stdout,
            stderr: stderr.trim().to_string(),
            status,
        }
    }

    /// A no-match outcome carrying only a failure description.
    pub fn degraded(
        task: &RuleTask,
        target: &Path,
        status: OutcomeStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            rule_name: task.rule_name.clone(),
            rule_path: task.rule_path.clone(),
            target_path: target.to_path_buf(),
            matched: false,
            stdout: String::new(),
            stderr: reason.into(),
            status,
        }
    }

    /// Rule identifiers reported by the checker, in first-seen order.
    ///
    /// Checker match lines look like `Ident [tags] [meta] target`; string
    /// detail lines (`0x1f:$a: ...`) and blank lines are skipped.
    pub fn matched_identifiers(&self) -> Vec<String> {
        static MATCH_LINE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\s|$)").unwrap());

        if !self.matched {
            return Vec::new();
        }
        let mut idents: Vec<String> = Vec::new();
        for line in self.stdout.lines() {
            if let Some(caps) = MATCH_LINE.captures(line.trim_start()) {
                let ident = &caps[1];
                if !idents.iter().any(|i| i == ident) {
                    idents.push(ident.to_string());
                }
            }
        }
        idents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn task() -> RuleTask {
        RuleTask::new("/rules/a.yar")
    }

    #[test]
    fn clean_exit_with_output_matches() {
        let o = ScanOutcome::from_output(
            &task(),
            Path::new("t.exe"),
            OutcomeStatus::Completed,
            "  MATCH\n",
            " \n",
        );
        assert!(o.matched);
        assert_eq!(o.stdout, "MATCH");
        assert_eq!(o.stderr, "");
        assert_eq!(o.rule_name, "a.yar");
    }

    #[test]
    fn clean_exit_with_whitespace_does_not_match() {
        let o = ScanOutcome::from_output(
            &task(),
            Path::new("t.exe"),
            OutcomeStatus::Completed,
            " \n\t",
            "",
        );
        assert!(!o.matched);
    }

    #[test]
    fn nonzero_exit_never_matches() {
        let o = ScanOutcome::from_output(
            &task(),
            Path::new("t.exe"),
            OutcomeStatus::ExitFailure { code: Some(1) },
            "MATCH",
            "parse error",
        );
        assert!(!o.matched);
        assert_eq!(o.stdout, "MATCH");
        assert_eq!(o.stderr, "parse error");
    }

    #[test]
    fn identifiers_skip_string_detail_lines() {
        let o = ScanOutcome::from_output(
            &task(),
            Path::new("t.exe"),
            OutcomeStatus::Completed,
            "Evil_Packer [packer] t.exe\n0x1f:$a: UPX!\nEvil_Packer t.exe\nSecond t.exe",
            "",
        );
        assert_eq!(o.matched_identifiers(), vec!["Evil_Packer", "Second"]);
    }

    #[test]
    fn status_display() {
        assert_eq!(
            OutcomeStatus::ExitFailure { code: Some(2) }.to_string(),
            "exit code 2"
        );
        assert_eq!(
            OutcomeStatus::TimedOut { after_secs: 30 }.to_string(),
            "timed out after 30s"
        );
    }
}
