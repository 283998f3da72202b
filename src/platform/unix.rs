use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
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
use crate::record::S_IFMT;
use crate::record::S_IFREG;

/// POSIX backend built directly on libc.
#[derive(Clone, Debug, Default)]
pub struct UnixFs {
    options: FsOptions,
}

impl UnixFs {
    pub fn new(options: FsOptions) -> Self {
        Self { options }
    }
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::invalid(format!("{}: path contains a NUL byte", path.display())))
}

fn cvt(rc: libc::c_int, path: &Path) -> Result<()> {
    if rc == -1 {
        let err = io::Error::last_os_error();
        tracing::debug!(?err, ?path);
        return Err(Error::from_io(path, err));
    }
    Ok(())
}

fn stat(path: &Path, follow: bool) -> Result<libc::stat> {
    let c_path = c_path(path)?;
    let mut st = MaybeUninit::<libc::stat>::zeroed();
    let rc = unsafe {
        if follow {
            libc::stat(c_path.as_ptr(), st.as_mut_ptr())
        } else {
            libc::lstat(c_path.as_ptr(), st.as_mut_ptr())
        }
    };
    cvt(rc, path)?;
    Ok(unsafe { st.assume_init() })
}

#[allow(clippy::unnecessary_cast)]
fn fill_record(st: &libc::stat) -> StatRecord {
    let mode = st.st_mode as u32;
    let mut record = StatRecord {
        dev: st.st_dev as u64,
        mode,
        kind: FileKind::from_mode(mode),
        nlink: st.st_nlink as u64,
        ino: st.st_ino as u64,
        uid: st.st_uid as u32,
        gid: st.st_gid as u32,
        rdev: st.st_rdev as u64,
        atime: Timespec::new(st.st_atime as i64, st.st_atime_nsec as i64),
        mtime: Timespec::new(st.st_mtime as i64, st.st_mtime_nsec as i64),
        ctime: Timespec::new(st.st_ctime as i64, st.st_ctime_nsec as i64),
        size: st.st_size as u64,
        blocks: st.st_blocks as u64,
        blksize: st.st_blksize as u32,
        ..Default::default()
    };
    fill_bsd_fields(&mut record, st);
    record
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
#[allow(clippy::unnecessary_cast)]
fn fill_bsd_fields(record: &mut StatRecord, st: &libc::stat) {
    record.birthtime = Timespec::new(st.st_birthtime as i64, st.st_birthtime_nsec as i64);
    record.flags = st.st_flags as u32;
    record.gen = st.st_gen as u32;
}

// birth time, flags and generation stay zero
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
fn fill_bsd_fields(_record: &mut StatRecord, _st: &libc::stat) {}

impl HostFs for UnixFs {
    fn options(&self) -> &FsOptions {
        &self.options
    }

    fn exists(&self, path: &Path) -> bool {
        stat(path, true).is_ok()
    }

    #[allow(clippy::unnecessary_cast)]
    fn path_kind(&self, path: &Path) -> PathKind {
        match stat(path, true) {
            Ok(st) => match st.st_mode as u32 & S_IFMT {
                S_IFDIR => PathKind::Directory,
                S_IFREG => PathKind::File,
                _ => PathKind::Other,
            },
            Err(_) => PathKind::Missing,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn create_dir(&self, path: &Path) -> Result<()> {
        let c_path = c_path(path)?;
        let rc = unsafe { libc::mkdir(c_path.as_ptr(), self.options.dir_mode as libc::mode_t) };
        cvt(rc, path)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn remove_dir(&self, path: &Path) -> Result<()> {
        let c_path = c_path(path)?;
        cvt(unsafe { libc::rmdir(c_path.as_ptr()) }, path)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn remove_file(&self, path: &Path) -> Result<()> {
        let c_path = c_path(path)?;
        cvt(unsafe { libc::unlink(c_path.as_ptr()) }, path)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let dir = std::fs::read_dir(path).map_err(|err| Error::from_io(path, err))?;

        let mut entries = vec![];
        for entry in dir {
            let entry = entry.map_err(|err| Error::from_io(path, err))?;
            let name = entry.file_name();
            if self.options.listing.admits(&name) {
                entries.push(DirEntry { name });
            }
        }
        tracing::debug!(count = entries.len());
        Ok(entries)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn stat_details(&self, path: &Path) -> Result<StatRecord> {
        stat(path, false).map(|st| fill_record(&st))
    }
}
