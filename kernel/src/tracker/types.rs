//! Inventory types published by the change tracker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::slice;

use crate::isolation::UserFolder;

/// One file found under a writable surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    /// 1-based position in scan order. Not stable across scans.
    pub id: usize,
    /// File name without directories.
    pub name: String,
    /// Path on the writable surface.
    pub absolute_path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// Catalog folder the file was found under.
    pub folder: UserFolder,
}

/// Ordered result of one scan: catalog order, then path order within a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileInventory(Vec<TrackedFile>);

impl FileInventory {
    /// Builds an inventory, assigning ids in order.
    #[must_use]
    pub fn new(mut files: Vec<TrackedFile>) -> Self {
        for (index, file) in files.iter_mut().enumerate() {
            file.id = index + 1;
        }
        Self(files)
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no file was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the files in order.
    pub fn iter(&self) -> slice::Iter<'_, TrackedFile> {
        self.0.iter()
    }

    /// Looks a file up by its id in this inventory.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&TrackedFile> {
        id.checked_sub(1).and_then(|index| self.0.get(index))
    }

    /// Total size of all files.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.0.iter().map(|f| f.size_bytes).sum()
    }
}

impl<'a> IntoIterator for &'a FileInventory {
    type Item = &'a TrackedFile;
    type IntoIter = slice::Iter<'a, TrackedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
