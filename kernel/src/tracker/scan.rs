//! Recursive walk of the tracked roots.

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use super::types::{FileInventory, TrackedFile};
use crate::isolation::Surface;

/// Walks every surface's tracked root and builds an inventory.
///
/// Only regular files are listed. Entries that vanish mid-walk or whose
/// metadata cannot be read are skipped.
#[must_use]
pub fn scan_surfaces(surfaces: &[Surface]) -> FileInventory {
    let mut files = Vec::new();

    for surface in surfaces {
        let walker = WalkDir::new(&surface.tracked)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker.into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let modified_at = metadata
                .modified()
                .map_or(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::from);

            files.push(TrackedFile {
                id: 0,
                name: entry.file_name().to_string_lossy().into_owned(),
                absolute_path: surface.display_path(entry.path()),
                size_bytes: metadata.len(),
                modified_at,
                folder: surface.folder,
            });
        }
    }

    FileInventory::new(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::UserFolder;
    use std::path::Path;

    fn surface(root: &Path, folder: UserFolder) -> Surface {
        Surface {
            folder,
            writable: root.join("merged").join(folder.dir_name()),
            tracked: root.join("upper").join(folder.dir_name()),
        }
    }

    #[test]
    fn lists_files_in_catalog_then_name_order() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let docs = surface(root.path(), UserFolder::Documents);
        let music = surface(root.path(), UserFolder::Music);
        std::fs::create_dir_all(docs.tracked.join("sub"))?;
        std::fs::create_dir_all(&music.tracked)?;
        std::fs::write(docs.tracked.join("b.txt"), b"bb")?;
        std::fs::write(docs.tracked.join("a.txt"), b"a")?;
        std::fs::write(docs.tracked.join("sub/c.txt"), b"ccc")?;
        std::fs::write(music.tracked.join("song.ogg"), b"0123456789")?;

        let inventory = scan_surfaces(&[docs.clone(), music]);
        let names: Vec<_> = inventory.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "song.ogg"]);
        assert_eq!(
            inventory.get(3).map(|f| f.absolute_path.clone()),
            Some(docs.writable.join("sub/c.txt"))
        );
        assert_eq!(inventory.get(4).map(|f| f.folder), Some(UserFolder::Music));
        Ok(())
    }

    #[test]
    fn missing_root_yields_empty_inventory() {
        let root = Path::new("/nonexistent/ephemera");
        let inventory = scan_surfaces(&[surface(root, UserFolder::Videos)]);
        assert!(inventory.is_empty());
    }

    #[test]
    fn identical_trees_scan_equal() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let docs = surface(root.path(), UserFolder::Documents);
        std::fs::create_dir_all(&docs.tracked)?;
        std::fs::write(docs.tracked.join("note.txt"), b"0123456789")?;

        let surfaces = [docs];
        assert_eq!(scan_surfaces(&surfaces), scan_surfaces(&surfaces));
        Ok(())
    }
}
