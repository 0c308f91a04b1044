// Mount table (/proc/mounts) parsing
//
// Lines have the fstab layout: `source target fstype options dump pass`, with
// whitespace and backslashes inside fields escaped as three-digit octal.
// Paths are raw bytes; unrelated entries need not be valid UTF-8.

use super::error::{DriverError, DriverResult};
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// Filesystem types the driver mounts
const NFS_TYPES: [&str; 2] = ["nfs", "nfs4"];

/// One entry of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub target: PathBuf,
    pub fs_type: String,
}

impl MountEntry {
    pub fn is_nfs(&self) -> bool {
        NFS_TYPES.contains(&self.fs_type.as_str())
    }
}

/// Parse mount table content, skipping malformed lines
pub fn parse(content: &[u8]) -> Vec<MountEntry> {
    content
        .split(|b| *b == b'\n')
        .filter_map(|line| {
            let mut fields = line.split(u8::is_ascii_whitespace).filter(|f| !f.is_empty());
            let _source = fields.next()?;
            let target = fields.next()?;
            let fs_type = fields.next()?;

            Some(MountEntry {
                target: PathBuf::from(OsString::from_vec(unescape(target))),
                fs_type: String::from_utf8_lossy(fs_type).into_owned(),
            })
        })
        .collect()
}

/// Whether `target` is the exact target of an NFS entry.
///
/// Compares whole paths, so `/mnt/fs/v1` does not match `/mnt/fs/v10`.
pub fn is_mounted_in(content: &[u8], target: &Path) -> bool {
    parse(content).iter().any(|entry| entry.is_nfs() && entry.target == target)
}

/// Read the mount table at `table` and check whether `target` is mounted
pub async fn is_mounted(table: &Path, target: &Path) -> DriverResult<bool> {
    let content = tokio::fs::read(table).await.map_err(|e| DriverError::io(table, e))?;
    Ok(is_mounted_in(&content, target))
}

fn unescape(field: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(field.len());
    let mut i = 0;

    while i < field.len() {
        if field[i] == b'\\' && i + 3 < field.len() && is_octal_escape(&field[i + 1..i + 4]) {
            let digit = |offset: usize| field[i + offset] - b'0';
            out.push(digit(1) * 64 + digit(2) * 8 + digit(3));
            i += 4;
        } else {
            out.push(field[i]);
            i += 1;
        }
    }

    out
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[u8] = b"\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
10.0.0.1:/export /mnt/fs/v1 nfs rw,relatime,vers=3,proto=tcp,port=2049,nolock 0 0
10.0.0.2:/data /mnt/fs/with\\040space nfs4 rw,relatime 0 0
";

    #[test]
    fn test_parse_entries() {
        let entries = parse(TABLE);
        assert_eq!(entries.len(), 3);

        let nfs = &entries[1];
        assert_eq!(nfs.target, PathBuf::from("/mnt/fs/v1"));
        assert_eq!(nfs.fs_type, "nfs");
        assert!(nfs.is_nfs());
        assert!(!entries[0].is_nfs());
    }

    #[test]
    fn test_parse_unescapes_octal() {
        let entries = parse(TABLE);
        assert_eq!(entries[2].target, PathBuf::from("/mnt/fs/with space"));
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let entries = parse(b"garbage\n\n/dev/sda1 / ext4 rw 0 0\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, PathBuf::from("/"));
    }

    #[test]
    fn test_exact_target_match() {
        assert!(is_mounted_in(TABLE, Path::new("/mnt/fs/v1")));
        assert!(!is_mounted_in(TABLE, Path::new("/mnt/fs/v10")));
        assert!(!is_mounted_in(TABLE, Path::new("/mnt/fs")));
    }

    #[test]
    fn test_prefix_path_is_not_a_match() {
        let table = b"10.0.0.1:/export /mnt/fs/v10 nfs rw 0 0\n";
        assert!(!is_mounted_in(table, Path::new("/mnt/fs/v1")));
    }

    #[test]
    fn test_non_nfs_entry_is_not_a_match() {
        let table = b"tmpfs /mnt/fs/v1 tmpfs rw 0 0\n";
        assert!(!is_mounted_in(table, Path::new("/mnt/fs/v1")));
    }

    #[test]
    fn test_non_utf8_entries_are_tolerated() {
        let table = b"/dev/sdb1 /media/caf\xe9 vfat rw 0 0\n\
10.0.0.1:/export /mnt/fs/v1 nfs rw 0 0\n";

        assert!(is_mounted_in(table, Path::new("/mnt/fs/v1")));
        let entries = parse(table);
        let latin1 = OsString::from_vec(b"/media/caf\xe9".to_vec());
        assert_eq!(entries[0].target, PathBuf::from(latin1));
    }

    #[test]
    fn test_unescape_leaves_plain_backslash() {
        assert_eq!(unescape(b"a\\b"), b"a\\b");
        assert_eq!(unescape(b"tab\\011x"), b"tab\tx");
    }

    #[tokio::test]
    async fn test_is_mounted_reads_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), TABLE).unwrap();

        assert!(is_mounted(tmp.path(), Path::new("/mnt/fs/v1")).await.unwrap());
        assert!(!is_mounted(tmp.path(), Path::new("/mnt/fs/v2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_mounted_with_non_utf8_line_in_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut table = b"/dev/sdb1 /media/caf\xe9 vfat rw,relatime 0 0\n".to_vec();
        table.extend_from_slice(b"10.0.0.1:/export /mnt/fs/v1 nfs rw,relatime 0 0\n");
        std::fs::write(tmp.path(), table).unwrap();

        assert!(is_mounted(tmp.path(), Path::new("/mnt/fs/v1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_mounted_missing_table() {
        let result = is_mounted(Path::new("/nonexistent/mounts"), Path::new("/mnt")).await;
        assert!(result.is_err());
    }
}
