use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;

/// Final safety sweep over the download directory.
///
/// Consolidation claims statements by an exact stem match, so anything the
/// browser renamed on a filename collision (" (1)" style suffixes from
/// duplicate downloads) or a month-only malformed name survives it. This pass
/// deletes every per-month statement file regardless of account, returning
/// the directory to a state without statement artifacts. Consolidated output
/// documents never match the pattern and are left alone.
///
/// Returns how many files were removed. A file that can't be deleted (locked,
/// already gone) is logged and skipped, never fatal.
pub fn remove_residual(dir: &Path) -> io::Result<usize> {
    let pattern = Regex::new(r"^\d+_-_\d{4}-\d{2}").unwrap();

    let mut removed = 0;
    for entry in dir.read_dir()? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("pdf") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if !pattern.is_match(stem) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed residual statement file {}", path.display());
                removed += 1;
            }
            Err(err) => {
                log::warn!("Unable to remove {}: {}", path.display(), err);
            }
        }
    }

    Ok(removed)
}
