//! File status snapshot handed to callbacks.

use otter_uv::NativeStat;
use serde::Serialize;

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Immutable stat value. Timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    /// 0 where the platform does not report it
    pub blksize: u64,
    /// 0 where the platform does not report it
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Stats {
    /// Convert a native stat structure. An absent structure converts to
    /// `None`, not an error.
    pub fn from_native(native: Option<&NativeStat>) -> Option<Stats> {
        let st = native?;
        Some(Stats {
            dev: st.dev,
            ino: st.ino,
            mode: st.mode,
            nlink: st.nlink,
            uid: st.uid,
            gid: st.gid,
            rdev: st.rdev,
            size: st.size,
            blksize: st.blksize.unwrap_or(0),
            blocks: st.blocks.unwrap_or(0),
            atime: to_millis(st.atime),
            mtime: to_millis(st.mtime),
            ctime: to_millis(st.ctime),
        })
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }
}

fn to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(atime: i64, mtime: i64, ctime: i64) -> NativeStat {
        NativeStat {
            mode: S_IFREG | 0o644,
            size: 42,
            blksize: Some(4096),
            blocks: Some(8),
            atime,
            mtime,
            ctime,
            ..NativeStat::default()
        }
    }

    #[test]
    fn absent_structure_is_none() {
        assert_eq!(Stats::from_native(None), None);
    }

    #[test]
    fn timestamps_are_exact_millis() {
        let stats = Stats::from_native(Some(&native(0, -86_400, 1_700_000_000))).unwrap();
        assert_eq!(stats.atime, 0);
        assert_eq!(stats.mtime, -86_400_000);
        assert_eq!(stats.ctime, 1_700_000_000_000);
    }

    #[test]
    fn missing_block_fields_degrade_to_zero() {
        let mut st = native(1, 2, 3);
        st.blksize = None;
        st.blocks = None;
        let stats = Stats::from_native(Some(&st)).unwrap();
        assert_eq!((stats.blksize, stats.blocks), (0, 0));
        assert_eq!(stats.size, 42);
    }

    #[test]
    fn mode_predicates() {
        let stats = Stats::from_native(Some(&native(0, 0, 0))).unwrap();
        assert!(stats.is_file());
        assert!(!stats.is_directory());
        assert!(!stats.is_symbolic_link());
    }
}
