use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "yarabatch.toml";
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_CHECKER: &str = "yara64.exe";
pub const DEFAULT_OUTPUT: &str = "result.csv";

/// Top-level configuration from `yarabatch.toml`.
///
/// Every field is optional; command-line flags take precedence, then this
/// file, then the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanSection {
    pub threads: Option<usize>,
    pub checker: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSection {
    pub output: Option<PathBuf>,
    pub format: Option<String>,
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scan.threads == Some(0) {
            return Err(BatchError::Config(
                "scan.threads must be a positive integer".into(),
            ));
        }
        if self.scan.timeout_secs == Some(0) {
            return Err(BatchError::Config(
                "scan.timeout_secs must be a positive integer".into(),
            ));
        }
        Ok(())
    }

    pub fn threads(&self, cli: Option<usize>) -> usize {
        cli.or(self.scan.threads).unwrap_or(DEFAULT_THREADS)
    }

    pub fn checker(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.scan.checker.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKER))
    }

    pub fn timeout_secs(&self, cli: Option<u64>) -> Option<u64> {
        cli.or(self.scan.timeout_secs)
    }

    pub fn output(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.report.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
    }

    pub fn format(&self, cli: Option<String>) -> Option<String> {
        cli.or_else(|| self.report.format.clone())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# yarabatch configuration
# Command-line flags override anything set here.

[scan]
# Number of checker processes run at once.
threads = 4

# Path to the checker executable, relative to the working directory.
checker = "yara64.exe"

# Kill a checker that runs longer than this many seconds.
# timeout_secs = 60

[report]
# Report file and format (csv, json).
output = "result.csv"
format = "csv"
"#
    }
}
