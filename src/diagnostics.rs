use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;

/// Writes the full error chain of a fatal failure to a timestamped log file
/// next to the working directory. Automation runs are typically unattended,
/// so a console message alone is not enough of a trace.
pub fn write_failure_report(dir: &Path, error: &anyhow::Error) -> io::Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    let path = dir.join(format!("dnb_statements_{timestamp}.log"));

    let mut report = String::new();
    let _ = writeln!(report, "Run failed at {}", Local::now().to_rfc3339());
    let _ = writeln!(report, "Error: {error}");
    for cause in error.chain().skip(1) {
        let _ = writeln!(report, "Caused by: {cause}");
    }

    fs::write(&path, report)?;
    Ok(path)
}
