use std::collections::HashSet;
use std::io;
use std::path::Path;

use chrono::NaiveDate;
use regex::Regex;

use crate::config::Account;
use crate::months::{self, MonthOffset};

/// Which months of this account already have a statement on disk.
///
/// The browser only *initiates* a download when the UI link is clicked; the
/// file showing up in the download directory is the actual completion signal.
/// The offset is computed from the date embedded in the filename, not from
/// the month that was requested, so a statement that arrives late or under a
/// collision-renamed filename still counts for its own month.
///
/// Read-only: never creates, renames or deletes anything.
pub fn downloaded_offsets(
    dir: &Path,
    account: &Account,
    today: NaiveDate,
) -> io::Result<HashSet<MonthOffset>> {
    let pattern = Regex::new(r"^(\d+)_-_(\d{4})-(\d{2})").unwrap();
    let account_id = account.normalized_id();

    let mut offsets = HashSet::new();
    for entry in dir.read_dir()? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("pdf") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let Some(captures) = pattern.captures(stem) else {
            continue;
        };
        if &captures[1] != account_id {
            continue;
        }
        // Malformed dates (e.g. month 13) are skipped like any other
        // non-matching filename.
        let year = captures[2].parse().unwrap();
        let month = captures[3].parse().unwrap();
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1) {
            offsets.insert(months::month_offset(today, date));
        }
    }

    Ok(offsets)
}
