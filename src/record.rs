//! The fixed-layout stat record handed to the runtime.
//!
//! Every platform produces the same 160-byte little-endian layout. Fields the
//! host cannot supply are left zero.

use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;
use static_assertions::const_assert_eq;
use crate::error::Error;
use crate::error::Result;

pub const STAT_RECORD_LEN: usize = 160;

// dev, mode, kind, nlink, ino, uid, gid, rdev, 4 timestamps, size, blocks,
// blksize, flags, gen, reserved
const_assert_eq!(
    8 + 4 + 4 + 8 + 8 + 4 + 4 + 8 + 4 * 16 + 8 + 8 + 4 + 4 + 4 + 4 + 16,
    STAT_RECORD_LEN
);

pub(crate) const S_IFMT: u32 = 0o170000;
pub(crate) const S_IFDIR: u32 = 0o040000;
pub(crate) const S_IFREG: u32 = 0o100000;
pub(crate) const S_IFLNK: u32 = 0o120000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum FileKind {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
    Unknown = 3,
}

impl FileKind {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => Self::Regular,
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            _ => Self::Unknown,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Regular,
            1 => Self::Directory,
            2 => Self::Symlink,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

impl Default for FileKind {
    fn default() -> Self {
        Self::Unknown
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    pub fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatRecord {
    pub dev: u64,
    pub mode: u32,
    pub kind: FileKind,
    pub nlink: u64,
    pub ino: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
    pub birthtime: Timespec,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
    pub flags: u32,
    pub gen: u32,
}

impl StatRecord {
    pub fn to_bytes(&self) -> [u8; STAT_RECORD_LEN] {
        let mut b = BytesMut::with_capacity(STAT_RECORD_LEN);
        b.put_u64_le(self.dev);
        b.put_u32_le(self.mode);
        b.put_u32_le(self.kind.code());
        b.put_u64_le(self.nlink);
        b.put_u64_le(self.ino);
        b.put_u32_le(self.uid);
        b.put_u32_le(self.gid);
        b.put_u64_le(self.rdev);
        for ts in [&self.atime, &self.mtime, &self.ctime, &self.birthtime] {
            b.put_i64_le(ts.sec);
            b.put_i64_le(ts.nsec);
        }
        b.put_u64_le(self.size);
        b.put_u64_le(self.blocks);
        b.put_u32_le(self.blksize);
        b.put_u32_le(self.flags);
        b.put_u32_le(self.gen);
        b.put_bytes(0, STAT_RECORD_LEN - b.len());
        debug_assert_eq!(b.len(), STAT_RECORD_LEN);

        let mut out = [0u8; STAT_RECORD_LEN];
        out.copy_from_slice(&b);
        out
    }

    pub fn from_bytes(mut b: &[u8]) -> Result<Self> {
        if b.len() != STAT_RECORD_LEN {
            return Err(Error::invalid(format!(
                "stat record must be {} bytes, got {}",
                STAT_RECORD_LEN,
                b.len()
            )));
        }

        fn timespec(b: &mut &[u8]) -> Timespec {
            let sec = b.get_i64_le();
            let nsec = b.get_i64_le();
            Timespec { sec, nsec }
        }

        let dev = b.get_u64_le();
        let mode = b.get_u32_le();
        let kind = FileKind::from_code(b.get_u32_le());
        let nlink = b.get_u64_le();
        let ino = b.get_u64_le();
        let uid = b.get_u32_le();
        let gid = b.get_u32_le();
        let rdev = b.get_u64_le();
        let atime = timespec(&mut b);
        let mtime = timespec(&mut b);
        let ctime = timespec(&mut b);
        let birthtime = timespec(&mut b);
        let size = b.get_u64_le();
        let blocks = b.get_u64_le();
        let blksize = b.get_u32_le();
        let flags = b.get_u32_le();
        let gen = b.get_u32_le();

        Ok(Self {
            dev,
            mode,
            kind,
            nlink,
            ino,
            uid,
            gid,
            rdev,
            atime,
            mtime,
            ctime,
            birthtime,
            size,
            blocks,
            blksize,
            flags,
            gen,
        })
    }
}
