//! Recent temp-file purge and recently-used list reset.

use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::browser::FileRemover;
use super::report::StepOutcome;

/// Content of an empty XBEL bookmark list.
pub const EMPTY_XBEL: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xbel version=\"1.0\">\n</xbel>\n";

/// Default age window for purged files.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(180 * 60);

fn within_window(modified: SystemTime, cutoff: SystemTime) -> bool {
    modified >= cutoff
}

/// Removes regular files under `location` modified within `window`.
/// Anything below `exclude` (the private working root) is never walked.
pub fn purge_recent(
    location: &Path,
    window: Duration,
    exclude: Option<&Path>,
    remover: &dyn FileRemover,
) -> StepOutcome {
    if !location.is_dir() {
        return StepOutcome::Skipped("location does not exist".to_string());
    }
    let cutoff = SystemTime::now()
        .checked_sub(window)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0usize;
    let mut failures = 0usize;
    let mut first_failure = None;
    let walker = WalkDir::new(location)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| exclude.is_none_or(|root| !entry.path().starts_with(root)));

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            continue;
        };
        if !within_window(modified, cutoff) {
            continue;
        }
        match remover.remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Could not purge");
                failures += 1;
                first_failure.get_or_insert_with(|| format!("{}: {e}", entry.path().display()));
            }
        }
    }

    info!(location = %location.display(), removed, failures, "Temp location purged");
    match first_failure {
        Some(first) => {
            warn!(location = %location.display(), failures, "Some files could not be purged");
            StepOutcome::Warning(format!("{failures} file(s) not removed, first: {first}"))
        }
        None => StepOutcome::Succeeded,
    }
}

/// Resets the recently-used list. An XBEL file is rewritten empty; a
/// recent-items folder has entries within `window` removed.
pub fn reset_recent_list(path: &Path, window: Duration, remover: &dyn FileRemover) -> StepOutcome {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => purge_recent(path, window, None, remover),
        Ok(_) => match std::fs::write(path, EMPTY_XBEL) {
            Ok(()) => {
                info!(path = %path.display(), "Recently-used list reset");
                StepOutcome::Succeeded
            }
            Err(e) => StepOutcome::Warning(format!("{}: {e}", path.display())),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            StepOutcome::Skipped("no recently-used list".to_string())
        }
        Err(e) => StepOutcome::Warning(format!("{}: {e}", path.display())),
    }
}

/// Cutoff timestamp for a window, for logging.
#[must_use]
pub fn cutoff(window: Duration) -> DateTime<Utc> {
    let cutoff = SystemTime::now()
        .checked_sub(window)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(cutoff)
}
