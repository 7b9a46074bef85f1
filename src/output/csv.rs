use std::io::Write;

use crate::error::Result;
use crate::scan::ScanOutcome;

pub const HEADER: [&str; 5] = ["yara_rule", "target_file", "matched", "result", "error"];

/// Write one row per outcome under a fixed header.
pub fn write<W: Write>(outcomes: &[ScanOutcome], writer: W) -> Result<()> {
    let mut wtr = ::csv::Writer::from_writer(writer);
    wtr.write_record(HEADER)?;
    for outcome in outcomes {
        let target = outcome.target_path.display().to_string();
        let matched = if outcome.matched { "true" } else { "false" };
        wtr.write_record([
            outcome.rule_name.as_str(),
            target.as_str(),
            matched,
            outcome.stdout.as_str(),
            outcome.stderr.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
