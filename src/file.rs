//! Open file handles with fopen-style modes.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use crate::error::Error;
use crate::error::Result;

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

bitflags::bitflags! {
    /// Access mode of a [`HostFile`].
    pub struct OpenMode: u32 {
        /// Open the file for reading.
        const READ = 0x01;

        /// Open the file for writing.
        const WRITE = 0x02;

        /// Every write goes to the end of the file.
        const APPEND = 0x04;

        /// Create the file if it does not exist.
        const CREATE = 0x08;

        /// Truncate an existing file to zero length.
        const TRUNCATE = 0x10;
    }
}

impl OpenMode {
    /// Parses `r`, `w`, `a`, each optionally followed by `+` and/or `b`.
    pub fn parse(mode: &str) -> Result<Self> {
        let mut chars = mode.chars();
        let mut flags = match chars.next() {
            Some('r') => Self::READ,
            Some('w') => Self::WRITE | Self::CREATE | Self::TRUNCATE,
            Some('a') => Self::WRITE | Self::APPEND | Self::CREATE,
            _ => return Err(Error::invalid(format!("bad open mode {:?}", mode))),
        };

        let (mut plus, mut binary) = (false, false);
        for c in chars {
            match c {
                '+' if !plus => plus = true,
                'b' if !binary => binary = true,
                _ => return Err(Error::invalid(format!("bad open mode {:?}", mode))),
            }
        }
        if plus {
            flags |= Self::READ | Self::WRITE;
        }
        Ok(flags)
    }

    fn to_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.contains(Self::READ))
            .write(self.contains(Self::WRITE))
            .append(self.contains(Self::APPEND))
            .create(self.contains(Self::CREATE))
            .truncate(self.contains(Self::TRUNCATE));
        options
    }
}

#[derive(Debug)]
pub struct HostFile {
    file: File,
    path: PathBuf,
    mode: OpenMode,
}

impl HostFile {
    #[tracing::instrument(level = "debug", skip_all, fields(path = ?path.as_ref(), mode = mode))]
    pub fn open<P: AsRef<Path>>(path: P, mode: &str) -> Result<Self> {
        let path = path.as_ref();
        let mode = OpenMode::parse(mode)?;
        let file = mode.to_options().open(path).map_err(|err| {
            tracing::debug!(?err, "open failed");
            Error::from_io(path, err)
        })?;
        Ok(Self {
            file,
            path: path.to_owned(),
            mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn metadata(&self) -> Result<std::fs::Metadata> {
        self.file
            .metadata()
            .map_err(|err| Error::from_io(&self.path, err))
    }

    /// Fills `buf` as far as the file allows; a short count means EOF.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::from_io(&self.path, err)),
            }
        }
        Ok(filled)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file
            .write_all(buf)
            .map_err(|err| Error::from_io(&self.path, err))?;
        Ok(buf.len())
    }

    /// Moves the cursor; `whence` is one of `SEEK_SET`, `SEEK_CUR`, `SEEK_END`.
    pub fn seek(&mut self, offset: i64, whence: i32) -> Result<u64> {
        let pos = match whence {
            SEEK_SET => {
                let offset = u64::try_from(offset)
                    .map_err(|_| Error::invalid(format!("negative offset {}", offset)))?;
                SeekFrom::Start(offset)
            }
            SEEK_CUR => SeekFrom::Current(offset),
            SEEK_END => SeekFrom::End(offset),
            _ => return Err(Error::invalid(format!("bad whence {}", whence))),
        };
        self.file
            .seek(pos)
            .map_err(|err| Error::from_io(&self.path, err))
    }

    pub fn tell(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|err| Error::from_io(&self.path, err))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|err| Error::from_io(&self.path, err))
    }

    /// Closes the handle and reports a failing close. Dropping closes
    /// silently.
    #[cfg(unix)]
    pub fn close(self) -> Result<()> {
        use std::os::unix::io::IntoRawFd;

        let Self { file, path, .. } = self;
        let fd = file.into_raw_fd();
        if unsafe { libc::close(fd) } == -1 {
            return Err(Error::from_io(path, io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_modes() {
        assert_eq!(OpenMode::parse("r").unwrap(), OpenMode::READ);
        assert_eq!(OpenMode::parse("rb").unwrap(), OpenMode::READ);
        assert_eq!(
            OpenMode::parse("wb").unwrap(),
            OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE
        );
        assert_eq!(
            OpenMode::parse("a").unwrap(),
            OpenMode::WRITE | OpenMode::APPEND | OpenMode::CREATE
        );
        assert_eq!(
            OpenMode::parse("r+b").unwrap(),
            OpenMode::READ | OpenMode::WRITE
        );
        assert_eq!(OpenMode::parse("rb+").unwrap(), OpenMode::parse("r+b").unwrap());

        for bad in ["", "x", "rr", "r++", "wbb", "w+x"] {
            assert!(OpenMode::parse(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn seek_tell_read_write() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("f");

        let mut f = HostFile::open(&p, "w+").unwrap();
        assert_eq!(f.write(b"abcdef").unwrap(), 6);
        f.flush().unwrap();
        assert_eq!(f.tell().unwrap(), 6);

        assert_eq!(f.seek(2, SEEK_SET).unwrap(), 2);
        let mut buf = [0u8; 3];
        assert_eq!(f.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"cde");

        assert_eq!(f.seek(-1, SEEK_CUR).unwrap(), 4);
        assert_eq!(f.seek(-2, SEEK_END).unwrap(), 4);

        let mut tail = [0u8; 8];
        assert_eq!(f.read(&mut tail).unwrap(), 2);
        assert_eq!(&tail[..2], b"ef");
        f.close().unwrap();
    }

    #[test]
    fn bad_seeks_are_rejected() {
        let dir = tempdir().unwrap();
        let mut f = HostFile::open(dir.path().join("f"), "w").unwrap();
        assert!(f.seek(0, 7).is_err());
        assert!(f.seek(-1, SEEK_SET).is_err());
    }

    #[test]
    fn append_mode_writes_at_end() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("log");

        let mut f = HostFile::open(&p, "w").unwrap();
        f.write(b"one").unwrap();
        f.close().unwrap();

        let mut f = HostFile::open(&p, "a").unwrap();
        assert_eq!(f.path(), p.as_path());
        assert_eq!(f.mode(), OpenMode::WRITE | OpenMode::APPEND | OpenMode::CREATE);
        assert_eq!(f.metadata().unwrap().len(), 3);
        f.write(b"two").unwrap();
        f.close().unwrap();

        assert_eq!(std::fs::read(&p).unwrap(), b"onetwo");
    }

    #[test]
    fn read_mode_does_not_create() {
        let dir = tempdir().unwrap();
        let err = HostFile::open(dir.path().join("absent"), "r").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
