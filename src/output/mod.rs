pub mod console;
pub mod csv;
pub mod json;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};
use crate::BatchReport;

/// Report file format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

impl ReportFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Write the finished batch to `path`, replacing any existing file.
pub fn write_report(report: &BatchReport, format: ReportFormat, path: &Path) -> Result<()> {
    write_to(report, format, path).map_err(|e| BatchError::Report {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

fn write_to(report: &BatchReport, format: ReportFormat, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        ReportFormat::Csv => csv::write(&report.outcomes, &mut writer)?,
        ReportFormat::Json => {
            writer.write_all(json::render(report)?.as_bytes())?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    tracing::debug!(path = %path.display(), rows = report.outcomes.len(), "report written");
    Ok(())
}
