use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// Extensions that identify a rule file, compared case-insensitively.
pub const RULE_EXTENSIONS: [&str; 2] = [".yara", ".yar"];

/// One rule file queued for a checker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTask {
    /// Full path handed to the checker.
    pub rule_path: PathBuf,
    /// Basename, used as the report key.
    pub rule_name: String,
}

impl RuleTask {
    pub fn new(rule_path: impl Into<PathBuf>) -> Self {
        let rule_path = rule_path.into();
        let rule_name = rule_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| rule_path.display().to_string());
        Self {
            rule_path,
            rule_name,
        }
    }
}

/// Whether `path` names a rule file by extension.
pub fn is_rule_file(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    RULE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Recursively collect every rule file under `dir`, sorted by path.
///
/// Entries that cannot be read are logged and skipped rather than failing
/// the whole discovery.
pub fn discover(dir: &Path) -> Result<Vec<RuleTask>> {
    let mut tasks = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_rule_file(entry.path()) {
            continue;
        }
        tasks.push(RuleTask::new(entry.into_path()));
    }

    tasks.sort_by(|a, b| a.rule_path.cmp(&b.rule_path));
    tracing::debug!(dir = %dir.display(), count = tasks.len(), "discovered rule files");
    Ok(tasks)
}
