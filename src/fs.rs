//! Path and directory adapter.
//!
//! [`HostFs`] is the capability every platform backend implements. Whole-file
//! reads and writes are shared between backends and go through [`HostFile`].

use serde::Deserialize;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use crate::error::Error;
use crate::error::Result;
use crate::file::HostFile;
use crate::file::SEEK_END;
use crate::file::SEEK_SET;
use crate::record::FileKind;
use crate::record::StatRecord;

/// Which directory entries `list_dir` reports.
///
/// `.` and `..` are never reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingPolicy {
    /// Every entry, including dot-prefixed ones.
    All,
    /// Drop every name that starts with `.`.
    SkipHidden,
}

impl Default for ListingPolicy {
    fn default() -> Self {
        Self::All
    }
}

impl ListingPolicy {
    pub fn admits(self, name: &OsStr) -> bool {
        if name == "." || name == ".." {
            return false;
        }
        match self {
            Self::All => true,
            Self::SkipHidden => !name.to_string_lossy().starts_with('.'),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FsOptions {
    pub listing: ListingPolicy,
    /// Permission bits for `create_dir`, before the umask.
    pub dir_mode: u32,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            listing: ListingPolicy::All,
            dir_mode: 0o777,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
}

/// Result of a type check that also reports absence.
///
/// Besides found-directory, found-file and missing, `Other` covers entries
/// that exist but are neither (fifos, sockets, devices).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
    /// Exists, but is neither a regular file nor a directory.
    Other,
    /// Absent, or the stat call failed.
    Missing,
}

impl PathKind {
    /// Sentinel used across the C ABI; matches the [`FileKind`] codes.
    pub fn code(self) -> i32 {
        match self {
            Self::File => FileKind::Regular.code() as i32,
            Self::Directory => FileKind::Directory.code() as i32,
            Self::Other => FileKind::Unknown.code() as i32,
            Self::Missing => -1,
        }
    }
}

pub trait HostFs {
    fn options(&self) -> &FsOptions;

    /// True iff something exists at `path`, following symlinks.
    fn exists(&self, path: &Path) -> bool;

    fn path_kind(&self, path: &Path) -> PathKind;

    fn is_dir(&self, path: &Path) -> bool {
        self.path_kind(path) == PathKind::Directory
    }

    fn is_file(&self, path: &Path) -> bool {
        self.path_kind(path) == PathKind::File
    }

    /// Creates a single directory level.
    fn create_dir(&self, path: &Path) -> Result<()>;

    fn remove_dir(&self, path: &Path) -> Result<()>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Metadata of `path` itself; symlinks are not followed.
    fn stat_details(&self, path: &Path) -> Result<StatRecord>;

    fn stat_kind(&self, path: &Path) -> Result<FileKind> {
        self.stat_details(path).map(|record| record.kind)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        read_file(path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        write_file(path, content)
    }
}

/// Reads the whole file, sizing the buffer from the end offset.
///
/// Only regular files are read; the end offset of anything else is not a
/// byte count.
#[tracing::instrument(level = "debug", skip_all, fields(path = ?path))]
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = HostFile::open(path, "rb")?;
    if !file.metadata()?.is_file() {
        tracing::debug!("not a regular file");
        return Err(Error::from_io(
            file.path(),
            io::Error::new(io::ErrorKind::Other, "not a regular file"),
        ));
    }

    let size = file.seek(0, SEEK_END)?;
    file.seek(0, SEEK_SET)?;

    let mut content = alloc_buffer(file.path(), size)?;
    let n = file.read(&mut content)?;
    if n != content.len() {
        tracing::debug!(expected = content.len(), read = n, "short read");
        return Err(Error::from_io(
            file.path(),
            io::Error::from(io::ErrorKind::UnexpectedEof),
        ));
    }

    file.close()?;
    Ok(content)
}

fn alloc_buffer(path: &Path, size: u64) -> Result<Vec<u8>> {
    let size = usize::try_from(size)
        .map_err(|_| Error::invalid(format!("{}: file too large", path.display())))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|err| {
        tracing::debug!(size, %err, "buffer allocation failed");
        Error::from_io(path, io::Error::new(io::ErrorKind::OutOfMemory, err))
    })?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Replaces the file content with `content`, creating the file if needed.
#[tracing::instrument(level = "debug", skip_all, fields(path = ?path, len = content.len()))]
pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = HostFile::open(path, "wb")?;
    file.write(content)?;
    file.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NativeFs;
    use tempfile::tempdir;

    fn names(mut entries: Vec<DirEntry>) -> Vec<String> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
            .into_iter()
            .map(|e| e.name.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn missing_path_is_nothing() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let p = dir.path().join("absent");

        assert!(!fs.exists(&p));
        assert!(!fs.is_dir(&p));
        assert!(!fs.is_file(&p));
        assert_eq!(fs.path_kind(&p), PathKind::Missing);
        assert_eq!(fs.stat_details(&p).unwrap_err().kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn create_dir_then_again() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let p = dir.path().join("sub");

        fs.create_dir(&p).unwrap();
        assert!(fs.exists(&p));
        assert!(fs.is_dir(&p));
        assert!(!fs.is_file(&p));

        let err = fs.create_dir(&p).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }), "{:?}", err);
    }

    #[test]
    fn create_dir_without_parent_fails() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let err = fs.create_dir(&dir.path().join("a").join("b")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{:?}", err);
    }

    #[test]
    fn remove_dir_rules() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let sub = dir.path().join("sub");

        assert!(fs.remove_dir(&sub).is_err());

        fs.create_dir(&sub).unwrap();
        fs.write_file(&sub.join("f"), b"x").unwrap();
        assert!(fs.remove_dir(&sub).is_err());
        assert!(fs.remove_dir(&sub.join("f")).is_err());

        fs.remove_file(&sub.join("f")).unwrap();
        fs.remove_dir(&sub).unwrap();
        assert!(!fs.exists(&sub));
    }

    #[test]
    fn remove_file_rejects_directories() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let sub = dir.path().join("sub");
        fs.create_dir(&sub).unwrap();

        assert!(fs.remove_file(&sub).is_err());
        assert!(fs.is_dir(&sub));
        assert!(fs.remove_file(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn list_dir_keeps_dot_files_by_default() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        for name in ["a", "b", ".hidden"] {
            fs.write_file(&dir.path().join(name), b"").unwrap();
        }

        let entries = fs.list_dir(dir.path()).unwrap();
        assert_eq!(names(entries), vec![".hidden", "a", "b"]);
    }

    #[test]
    fn list_dir_can_skip_hidden() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::new(FsOptions {
            listing: ListingPolicy::SkipHidden,
            ..Default::default()
        });
        assert_eq!(fs.options().listing, ListingPolicy::SkipHidden);
        assert_eq!(fs.options().dir_mode, 0o777);
        for name in ["a", "b", ".hidden"] {
            fs.write_file(&dir.path().join(name), b"").unwrap();
        }

        let entries = fs.list_dir(dir.path()).unwrap();
        assert_eq!(names(entries), vec!["a", "b"]);
    }

    #[test]
    fn list_dir_of_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        assert!(fs.list_dir(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let p = dir.path().join("data");

        fs.write_file(&p, b"hello world").unwrap();
        assert_eq!(fs.read_file(&p).unwrap(), b"hello world");

        fs.write_file(&p, b"hi").unwrap();
        assert_eq!(fs.read_file(&p).unwrap(), b"hi");
    }

    #[test]
    fn zero_bytes_survive_a_write() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let p = dir.path().join("bin");

        let content = [1u8, 0, 2, 0, 0, 3];
        fs.write_file(&p, &content).unwrap();
        assert_eq!(fs.read_file(&p).unwrap(), content);
    }

    #[test]
    fn read_missing_file_fails() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let err = fs.read_file(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{:?}", err);
    }

    #[test]
    fn read_file_of_directory_fails() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        for i in 0..64 {
            fs.write_file(&dir.path().join(format!("f{}", i)), b"").unwrap();
        }

        // Windows refuses to open a directory as a file at all.
        let err = fs.read_file(dir.path()).unwrap_err();
        if cfg!(unix) {
            assert!(matches!(err, Error::Io { .. }), "{:?}", err);
        }
        assert!(fs.read_file(&dir.path().join("f0")).unwrap().is_empty());
    }

    #[test]
    fn oversized_buffer_is_an_error() {
        let err = alloc_buffer(Path::new("big"), usize::MAX as u64).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{:?}", err);
        assert_eq!(alloc_buffer(Path::new("small"), 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn fresh_empty_file_stats_as_regular() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let p = dir.path().join("empty");
        fs.write_file(&p, b"").unwrap();

        let record = fs.stat_details(&p).unwrap();
        assert_eq!(record.size, 0);
        assert_eq!(record.kind, FileKind::Regular);
        assert_eq!(record.to_bytes()[12], 0);
        assert_eq!(fs.stat_kind(&p).unwrap(), FileKind::Regular);

        let record = fs.stat_details(dir.path()).unwrap();
        assert_eq!(record.kind, FileKind::Directory);
    }

    #[test]
    fn stat_reports_size_and_times() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let p = dir.path().join("f");
        fs.write_file(&p, b"12345").unwrap();

        let record = fs.stat_details(&p).unwrap();
        assert_eq!(record.size, 5);
        assert!(record.mtime.sec > 0);
        assert!(record.nlink >= 1);
    }

    #[cfg(unix)]
    #[test]
    fn stat_does_not_follow_symlinks() {
        let dir = tempdir().unwrap();
        let fs = NativeFs::default();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        fs.write_file(&target, b"abc").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(fs.stat_kind(&link).unwrap(), FileKind::Symlink);
        assert!(fs.is_file(&link));
    }

    #[test]
    fn policy_never_admits_dot_entries() {
        for policy in [ListingPolicy::All, ListingPolicy::SkipHidden] {
            assert!(!policy.admits(OsStr::new(".")));
            assert!(!policy.admits(OsStr::new("..")));
            assert!(policy.admits(OsStr::new("a")));
        }
        assert!(ListingPolicy::All.admits(OsStr::new(".git")));
        assert!(!ListingPolicy::SkipHidden.admits(OsStr::new(".git")));
    }

    #[test]
    fn path_kind_codes() {
        assert_eq!(PathKind::File.code(), 0);
        assert_eq!(PathKind::Directory.code(), 1);
        assert_eq!(PathKind::Other.code(), 3);
        assert_eq!(PathKind::Missing.code(), -1);
    }
}
