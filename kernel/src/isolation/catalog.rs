//! The fixed catalog of user-data folders that a session isolates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A user-data folder that can be placed under isolation.
///
/// Variants are declared in catalog order; `Ord` follows that order so
/// sorted collections of folders always match the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UserFolder {
    /// `~/Documents`
    Documents,
    /// `~/Downloads`
    Downloads,
    /// `~/Pictures`
    Pictures,
    /// `~/Videos`
    Videos,
    /// `~/Music`
    Music,
    /// `~/Desktop`
    Desktop,
}

impl UserFolder {
    /// Every catalog folder, in catalog order.
    pub const ALL: [UserFolder; 6] = [
        UserFolder::Documents,
        UserFolder::Downloads,
        UserFolder::Pictures,
        UserFolder::Videos,
        UserFolder::Music,
        UserFolder::Desktop,
    ];

    /// Directory name of the folder inside a home directory.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Documents => "Documents",
            Self::Downloads => "Downloads",
            Self::Pictures => "Pictures",
            Self::Videos => "Videos",
            Self::Music => "Music",
            Self::Desktop => "Desktop",
        }
    }

    /// Location of the original folder under `home`.
    #[must_use]
    pub fn original_in(self, home: &Path) -> PathBuf {
        home.join(self.dir_name())
    }

    /// Location of the folder below one of the private per-layer roots
    /// (`upper`, `work`, `merged`, `sandbox`).
    #[must_use]
    pub fn under(self, layer_root: &Path) -> PathBuf {
        layer_root.join(self.dir_name())
    }
}

impl fmt::Display for UserFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Error returned when parsing an unknown folder name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown user folder: {0}")]
pub struct UnknownFolder(pub String);

impl FromStr for UserFolder {
    type Err = UnknownFolder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|folder| folder.dir_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFolder(s.to_string()))
    }
}

/// Normalizes a configured folder list: removes duplicates and restores
/// catalog order. An empty list means the whole catalog.
#[must_use]
pub fn normalize(folders: &[UserFolder]) -> Vec<UserFolder> {
    if folders.is_empty() {
        return UserFolder::ALL.to_vec();
    }
    let mut out = folders.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}
