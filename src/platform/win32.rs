use std::ffi::OsString;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::ffi::OsStringExt;
use std::os::windows::fs::MetadataExt;
use std::path::Path;
use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_NO_MORE_FILES;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Storage::FileSystem::FindClose;
use windows::Win32::Storage::FileSystem::FindFirstFileW;
use windows::Win32::Storage::FileSystem::FindNextFileW;
use windows::Win32::Storage::FileSystem::GetFileAttributesW;
use windows::Win32::Storage::FileSystem::FILE_ATTRIBUTE_DIRECTORY;
use windows::Win32::Storage::FileSystem::FILE_ATTRIBUTE_READONLY;
use windows::Win32::Storage::FileSystem::INVALID_FILE_ATTRIBUTES;
use windows::Win32::Storage::FileSystem::WIN32_FIND_DATAW;
use crate::error::Error;
use crate::error::Result;
use crate::fs::DirEntry;
use crate::fs::FsOptions;
use crate::fs::HostFs;
use crate::fs::PathKind;
use crate::record::FileKind;
use crate::record::StatRecord;
use crate::record::Timespec;
use crate::record::S_IFDIR;
use crate::record::S_IFLNK;
use crate::record::S_IFREG;

// FILETIME counts 100ns intervals since 1601-01-01.
const FILETIME_TICKS_PER_SEC: u64 = 10_000_000;
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// Win32 backend; type checks and listing go through the attribute and
/// find-file APIs.
#[derive(Clone, Debug, Default)]
pub struct WindowsFs {
    options: FsOptions,
}

impl WindowsFs {
    pub fn new(options: FsOptions) -> Self {
        Self { options }
    }
}

fn wide(path: &Path) -> Result<Vec<u16>> {
    let mut buf: Vec<u16> = path.as_os_str().encode_wide().collect();
    if buf.contains(&0) {
        return Err(Error::invalid(format!("{}: path contains a NUL character", path.display())));
    }
    buf.push(0);
    Ok(buf)
}

fn attributes(path: &Path) -> Option<u32> {
    let path = wide(path).ok()?;
    let attrs = unsafe { GetFileAttributesW(PCWSTR(path.as_ptr())) };
    if attrs == INVALID_FILE_ATTRIBUTES {
        return None;
    }
    Some(attrs)
}

fn filetime_to_timespec(ticks: u64) -> Timespec {
    if ticks == 0 {
        return Timespec::default();
    }
    let sec = (ticks / FILETIME_TICKS_PER_SEC) as i64 - FILETIME_UNIX_OFFSET_SECS;
    let nsec = ((ticks % FILETIME_TICKS_PER_SEC) * 100) as i64;
    Timespec::new(sec, nsec)
}

struct FindHandle(HANDLE);

impl Drop for FindHandle {
    fn drop(&mut self) {
        let _ = unsafe { FindClose(self.0) };
    }
}

fn is_end_of_listing(err: &windows::core::Error) -> bool {
    err.code() == ERROR_NO_MORE_FILES.to_hresult()
}

fn find_data_name(data: &WIN32_FIND_DATAW) -> OsString {
    let len = data
        .cFileName
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(data.cFileName.len());
    OsString::from_wide(&data.cFileName[..len])
}

impl HostFs for WindowsFs {
    fn options(&self) -> &FsOptions {
        &self.options
    }

    fn exists(&self, path: &Path) -> bool {
        attributes(path).is_some()
    }

    // Anything that is not a directory counts as a file here.
    fn path_kind(&self, path: &Path) -> PathKind {
        match attributes(path) {
            Some(attrs) if attrs & FILE_ATTRIBUTE_DIRECTORY.0 != 0 => PathKind::Directory,
            Some(_) => PathKind::File,
            None => PathKind::Missing,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn create_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir(path).map_err(|err| Error::from_io(path, err))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn remove_dir(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir(path).map_err(|err| Error::from_io(path, err))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn remove_file(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).map_err(|err| Error::from_io(path, err))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let pattern = wide(&path.join("*"))?;
        let mut data = WIN32_FIND_DATAW::default();
        let handle = unsafe { FindFirstFileW(PCWSTR(pattern.as_ptr()), &mut data) }
            .map_err(|_| Error::from_io(path, io::Error::last_os_error()))?;
        let handle = FindHandle(handle);

        let mut entries = vec![];
        loop {
            let name = find_data_name(&data);
            if self.options.listing.admits(&name) {
                entries.push(DirEntry { name });
            }
            match unsafe { FindNextFileW(handle.0, &mut data) } {
                Ok(()) => {}
                Err(err) if is_end_of_listing(&err) => break,
                Err(err) => {
                    tracing::debug!(%err, "listing interrupted");
                    return Err(Error::from_io(path, io::Error::from(err)));
                }
            }
        }
        tracing::debug!(count = entries.len());
        Ok(entries)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn stat_details(&self, path: &Path) -> Result<StatRecord> {
        let meta = std::fs::symlink_metadata(path).map_err(|err| Error::from_io(path, err))?;
        let attrs = meta.file_attributes();

        let (kind, mut mode) = if meta.file_type().is_symlink() {
            (FileKind::Symlink, S_IFLNK | 0o777)
        } else if attrs & FILE_ATTRIBUTE_DIRECTORY.0 != 0 {
            (FileKind::Directory, S_IFDIR | 0o755)
        } else {
            (FileKind::Regular, S_IFREG | 0o644)
        };
        if attrs & FILE_ATTRIBUTE_READONLY.0 != 0 {
            mode &= !0o222;
        }

        let mtime = filetime_to_timespec(meta.last_write_time());
        Ok(StatRecord {
            mode,
            kind,
            nlink: 1,
            atime: filetime_to_timespec(meta.last_access_time()),
            mtime,
            ctime: mtime,
            birthtime: filetime_to_timespec(meta.creation_time()),
            size: meta.file_size(),
            ..Default::default()
        })
    }
}
