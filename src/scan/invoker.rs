use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Invoke, OutcomeStatus, ScanOutcome};
use crate::rules::RuleTask;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `checker rule target` as a child process for each rule.
#[derive(Debug, Clone)]
pub struct YaraInvoker {
    checker: PathBuf,
    target: PathBuf,
    timeout: Option<Duration>,
}

enum Finished {
    Exited {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut,
}

impl YaraInvoker {
    pub fn new(checker: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            checker: checker.into(),
            target: target.into(),
            timeout: None,
        }
    }

    /// Kill and report any invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, rule: &Path) -> Command {
        let mut cmd = Command::new(&self.checker);
        cmd.arg(rule)
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn wait(&self, child: Child) -> io::Result<Finished> {
        match self.timeout {
            Some(timeout) => wait_with_deadline(child, timeout),
            None => {
                let output = child.wait_with_output()?;
                Ok(Finished::Exited {
                    status: output.status,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
        }
    }
}

impl Invoke for YaraInvoker {
    fn invoke(&self, task: &RuleTask) -> ScanOutcome {
        tracing::debug!(rule = %task.rule_path.display(), "invoking checker");

        let child = match self.command(&task.rule_path).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(rule = %task.rule_name, error = %e, "checker failed to launch");
                return ScanOutcome::degraded(
                    task,
                    &self.target,
                    OutcomeStatus::LaunchFailed,
                    format!("failed to launch '{}': {}", self.checker.display(), e),
                );
            }
        };

        match self.wait(child) {
            Ok(Finished::Exited {
                status,
                stdout,
                stderr,
            }) => {
                let status = if status.success() {
                    OutcomeStatus::Completed
                } else {
                    OutcomeStatus::ExitFailure {
                        code: status.code(),
                    }
                };
                ScanOutcome::from_output(
                    task,
                    &self.target,
                    status,
                    &String::from_utf8_lossy(&stdout),
                    &String::from_utf8_lossy(&stderr),
                )
            }
            Ok(Finished::TimedOut) => {
                let status = OutcomeStatus::TimedOut {
                    after_secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                };
                tracing::warn!(rule = %task.rule_name, "checker {}", status);
                let reason = format!("checker {}", status);
                ScanOutcome::degraded(task, &self.target, status, reason)
            }
            Err(e) => ScanOutcome::degraded(
                task,
                &self.target,
                OutcomeStatus::LaunchFailed,
                format!("failed waiting for '{}': {}", self.checker.display(), e),
            ),
        }
    }

    fn target(&self) -> &Path {
        &self.target
    }
}

/// Drain both pipes on helper threads while polling the child for exit.
///
/// On timeout the child is killed and reaped, but the reader threads are
/// left detached: a grandchild may still hold the pipes open.
fn wait_with_deadline(mut child: Child, timeout: Duration) -> io::Result<Finished> {
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());
    let deadline = Instant::now() + timeout;

    loop {
        let exited = match child.try_wait() {
            Ok(exited) => exited,
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(e);
            }
        };
        if let Some(status) = exited {
            return Ok(Finished::Exited {
                status,
                stdout: stdout_reader.join().unwrap_or_default(),
                stderr: stderr_reader.join().unwrap_or_default(),
            });
        }
        if Instant::now() >= deadline {
            kill_and_reap(&mut child);
            return Ok(Finished::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

// The checker is `/bin/sh`, so each rule file is a shell script standing in
// for checker behaviour.
#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(dir: &Path, name: &str, script: &str) -> RuleTask {
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        RuleTask::new(path)
    }

    fn invoker(dir: &Path) -> YaraInvoker {
        let target = dir.join("target.bin");
        std::fs::write(&target, b"MZ\x90\x00").unwrap();
        YaraInvoker::new("/bin/sh", target)
    }

    #[test]
    fn clean_exit_with_output_is_a_match() {
        let dir = tempfile::tempdir().unwrap();
        let task = rule(dir.path(), "a.yar", "echo MATCH\n");
        let outcome = invoker(dir.path()).invoke(&task);
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(outcome.matched);
        assert_eq!(outcome.stdout, "MATCH");
        assert_eq!(outcome.rule_name, "a.yar");
    }

    #[test]
    fn target_is_passed_as_second_argument() {
        let dir = tempfile::tempdir().unwrap();
        let task = rule(dir.path(), "a.yar", "echo \"hit $1\"\n");
        let inv = invoker(dir.path());
        let outcome = inv.invoke(&task);
        assert_eq!(
            outcome.stdout,
            format!("hit {}", inv.target().display())
        );
        assert_eq!(outcome.target_path, inv.target());
    }

    #[test]
    fn clean_exit_without_output_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let task = rule(dir.path(), "b.yara", "true\n");
        let outcome = invoker(dir.path()).invoke(&task);
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(!outcome.matched);
        assert_eq!(outcome.stdout, "");
    }

    #[test]
    fn nonzero_exit_keeps_output_but_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let task = rule(
            dir.path(),
            "c.yar",
            "echo partial\necho 'parse error' >&2\nexit 1\n",
        );
        let outcome = invoker(dir.path()).invoke(&task);
        assert_eq!(outcome.status, OutcomeStatus::ExitFailure { code: Some(1) });
        assert!(!outcome.matched);
        assert_eq!(outcome.stdout, "partial");
        assert_eq!(outcome.stderr, "parse error");
    }

    #[test]
    fn missing_checker_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let task = rule(dir.path(), "a.yar", "echo MATCH\n");
        let inv = YaraInvoker::new(dir.path().join("no-such-checker"), dir.path().join("t"));
        let outcome = inv.invoke(&task);
        assert_eq!(outcome.status, OutcomeStatus::LaunchFailed);
        assert!(!outcome.matched);
        assert_eq!(outcome.stdout, "");
        assert!(outcome.stderr.contains("no-such-checker"));
        assert!(outcome.stderr.starts_with("failed to launch"));
    }

    #[test]
    fn timeout_kills_the_checker() {
        let dir = tempfile::tempdir().unwrap();
        let task = rule(dir.path(), "slow.yar", "echo started\nexec sleep 10\n");
        let inv = invoker(dir.path()).with_timeout(Some(Duration::from_secs(1)));

        let start = Instant::now();
        let outcome = inv.invoke(&task);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.status, OutcomeStatus::TimedOut { after_secs: 1 });
        assert!(!outcome.matched);
        assert_eq!(outcome.stderr, "checker timed out after 1s");
    }

    #[test]
    fn kill_and_reap_leaves_no_running_child() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "exec sleep 30"])
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        let start = Instant::now();
        kill_and_reap(&mut child);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(matches!(child.try_wait(), Ok(Some(status)) if !status.success()));
    }

    #[test]
    fn timeout_path_captures_output_of_fast_checker() {
        let dir = tempfile::tempdir().unwrap();
        let task = rule(dir.path(), "a.yar", "echo MATCH\necho warn >&2\n");
        let inv = invoker(dir.path()).with_timeout(Some(Duration::from_secs(10)));
        let outcome = inv.invoke(&task);
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(outcome.matched);
        assert_eq!(outcome.stderr, "warn");
    }
}
