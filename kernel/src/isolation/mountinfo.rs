//! Mount table probing via `/proc/self/mountinfo`.

use std::path::{Path, PathBuf};

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Mount points listed in a mountinfo table.
///
/// The fifth whitespace-separated field of each line is the mount point, with
/// space, tab, newline and backslash octal-escaped (`\040`).
#[must_use]
pub fn parse_mount_points(table: &str) -> Vec<PathBuf> {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape(field)))
        .collect()
}

fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && let Some(value) = octal_byte(&bytes[i + 1..=i + 3])
        {
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    digits.iter().try_fold(0u16, |acc, d| {
        (b'0'..=b'7')
            .contains(d)
            .then(|| acc * 8 + u16::from(d - b'0'))
    })
    .and_then(|v| u8::try_from(v).ok())
}

/// Returns `true` if `path` is currently a mount point of this process's
/// mount namespace. Always `false` where mountinfo is unavailable.
#[must_use]
pub fn is_mount_point(path: &Path) -> bool {
    let Ok(table) = std::fs::read_to_string(MOUNTINFO) else {
        return false;
    };
    let canonical = dunce::canonicalize(path).ok();
    parse_mount_points(&table)
        .iter()
        .any(|mp| mp == path || canonical.as_deref() == Some(mp.as_path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
98 22 0:52 / /tmp/ephemera/merged/Documents rw,relatime shared:50 - overlay overlay rw,lowerdir=/home/a/Documents
99 22 0:53 / /media/My\\040Disk rw,relatime - vfat /dev/sdb1 rw
";

    #[test]
    fn parses_mount_points() {
        let points = parse_mount_points(SAMPLE);
        assert_eq!(points.len(), 3);
        assert_eq!(points[1], PathBuf::from("/tmp/ephemera/merged/Documents"));
    }

    #[test]
    fn decodes_octal_escapes() {
        let points = parse_mount_points(SAMPLE);
        assert_eq!(points[2], PathBuf::from("/media/My Disk"));
    }

    #[test]
    fn trailing_backslash_is_kept() {
        assert_eq!(unescape("a\\04"), "a\\04");
        assert_eq!(unescape("a\\134b"), "a\\b");
    }

    #[test]
    fn plain_directory_is_not_a_mount_point() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let child = dir.path().join("merged");
        std::fs::create_dir(&child)?;
        assert!(!is_mount_point(&child));
        Ok(())
    }
}
