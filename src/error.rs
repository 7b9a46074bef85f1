use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BatchError>;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("target file '{}' does not exist", .0.display())]
    TargetNotFound(PathBuf),

    #[error("checker executable '{}' does not exist", .0.display())]
    CheckerNotFound(PathBuf),

    #[error("rules directory '{}' does not exist", .0.display())]
    RulesDirNotFound(PathBuf),

    #[error("no .yara or .yar files found in directory '{}'", .0.display())]
    NoRules(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to write report {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: Box<BatchError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BatchError {
    /// An empty rule set is reported but still counts as a clean exit.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::NoRules(_))
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_warning() {
            0
        } else {
            1
        }
    }
}
