//! Browser history, cookie and credential-store scrubbing.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::report::StepOutcome;

/// Profile directories are at most this deep below a browser root.
const PROFILE_DEPTH: usize = 3;

const CHROMIUM_ARTIFACTS: [&str; 4] = ["History", "Cookies", "Login Data", "Web Data"];
const FIREFOX_ARTIFACTS: [&str; 3] = ["places.sqlite", "cookies.sqlite", "formhistory.sqlite"];
const SIBLING_SUFFIXES: [&str; 2] = ["-journal", "-wal"];

/// Removes files; the seam through which locked files are simulated.
pub trait FileRemover: Send + Sync + fmt::Debug {
    /// Removes one file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileRemover`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Profile layout family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    /// Chrome, Chromium, Edge.
    Chromium,
    /// Firefox.
    Firefox,
}

impl BrowserFamily {
    fn artifacts(self) -> &'static [&'static str] {
        match self {
            Self::Chromium => &CHROMIUM_ARTIFACTS,
            Self::Firefox => &FIREFOX_ARTIFACTS,
        }
    }

    /// Returns `true` if `file_name` is one of this family's artifacts or a
    /// journal/WAL sibling of one.
    #[must_use]
    pub fn matches(self, file_name: &str) -> bool {
        self.artifacts().iter().any(|artifact| {
            file_name == *artifact
                || SIBLING_SUFFIXES
                    .iter()
                    .any(|suffix| file_name.strip_suffix(suffix) == Some(artifact))
        })
    }
}

/// A browser whose profile data is scrubbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Browser {
    /// Display name used in the report.
    pub name: String,
    /// Profile root.
    pub root: PathBuf,
    /// Layout family.
    pub family: BrowserFamily,
}

impl Browser {
    fn new(name: &str, root: PathBuf, family: BrowserFamily) -> Self {
        Self {
            name: name.to_string(),
            root,
            family,
        }
    }

    /// Known browsers for this platform, relative to `home`.
    #[must_use]
    pub fn catalog(home: &Path) -> Vec<Self> {
        if cfg!(windows) {
            let local = home.join("AppData").join("Local");
            let roaming = home.join("AppData").join("Roaming");
            vec![
                Self::new("Chrome", local.join(r"Google\Chrome\User Data"), BrowserFamily::Chromium),
                Self::new("Chromium", local.join(r"Chromium\User Data"), BrowserFamily::Chromium),
                Self::new("Edge", local.join(r"Microsoft\Edge\User Data"), BrowserFamily::Chromium),
                Self::new("Firefox", roaming.join(r"Mozilla\Firefox\Profiles"), BrowserFamily::Firefox),
            ]
        } else if cfg!(target_os = "macos") {
            let support = home.join("Library/Application Support");
            vec![
                Self::new("Chrome", support.join("Google/Chrome"), BrowserFamily::Chromium),
                Self::new("Chromium", support.join("Chromium"), BrowserFamily::Chromium),
                Self::new("Edge", support.join("Microsoft Edge"), BrowserFamily::Chromium),
                Self::new("Firefox", support.join("Firefox/Profiles"), BrowserFamily::Firefox),
            ]
        } else {
            vec![
                Self::new("Chrome", home.join(".config/google-chrome"), BrowserFamily::Chromium),
                Self::new("Chromium", home.join(".config/chromium"), BrowserFamily::Chromium),
                Self::new("Edge", home.join(".config/microsoft-edge"), BrowserFamily::Chromium),
                Self::new("Firefox", home.join(".mozilla/firefox"), BrowserFamily::Firefox),
            ]
        }
    }

    /// Removes this browser's artifacts. A browser that is not installed is
    /// skipped; any file that cannot be removed turns the step into a warning.
    pub fn scrub(&self, remover: &dyn FileRemover) -> StepOutcome {
        if !self.root.is_dir() {
            return StepOutcome::Skipped("not installed".to_string());
        }

        let mut removed = 0usize;
        let mut failures = Vec::new();
        let walker = WalkDir::new(&self.root)
            .max_depth(PROFILE_DEPTH)
            .follow_links(false);
        for entry in walker.into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !self.family.matches(&name) {
                continue;
            }
            match remover.remove_file(entry.path()) {
                Ok(()) => {
                    debug!(browser = %self.name, path = %entry.path().display(), "Removed");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(browser = %self.name, path = %entry.path().display(), error = %e, "Could not remove");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            info!(browser = %self.name, removed, "Browser scrubbed");
            StepOutcome::Succeeded
        } else {
            StepOutcome::Warning(failures.join("; "))
        }
    }
}
