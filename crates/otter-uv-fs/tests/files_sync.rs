//! Blocking-mode behaviour of the facade.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

use otter_uv::flags::{O_CREAT, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY};
use otter_uv::{ErrorCode, Loop, LoopConfig};
use otter_uv_fs::{ByteArray, FilesError, Files};

const SYNC: i32 = 0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn files() -> Files {
    init_tracing();
    Files::new(Loop::new(LoopConfig::default()).expect("loop"))
}

fn p(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

#[test]
fn hello_round_trip() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("f");
    let files = files();

    let fd = files
        .open(p(&file), O_CREAT | O_WRONLY, 0o644, SYNC)
        .expect("open for write");
    assert!(fd >= 0);
    let source = ByteArray::from_vec(b"hello".to_vec());
    assert_eq!(files.write(fd, &source, 5, 0, 0, SYNC).expect("write"), 5);
    assert_eq!(files.close(fd, SYNC).expect("close"), 0);

    let fd = files.open(p(&file), O_RDONLY, 0, SYNC).expect("open for read");
    let buf = ByteArray::new(5);
    assert_eq!(files.read(fd, &buf, 5, 0, 0, SYNC).expect("read"), 5);
    assert_eq!(buf.to_vec(), b"hello");
    files.close(fd, SYNC).expect("close");
}

#[test]
fn offsets_apply_to_managed_buffers() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("offsets");
    let files = files();

    let fd = files
        .open(p(&file), O_CREAT | O_RDWR | O_TRUNC, 0o644, SYNC)
        .expect("open");
    let source = ByteArray::from_vec(b"..payload..".to_vec());
    assert_eq!(files.write(fd, &source, 7, 2, 0, SYNC).expect("write"), 7);

    let dest = ByteArray::from_vec(vec![b'-'; 10]);
    let n = files.read(fd, &dest, 7, 3, 0, SYNC).expect("read");
    assert_eq!(n, 7);
    assert_eq!(dest.to_vec(), b"---payload");
    files.close(fd, SYNC).expect("close");
}

#[test]
fn short_read_copies_only_bytes_read() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("short");
    std::fs::write(&file, b"abc").expect("write");
    let files = files();

    let fd = files.open(p(&file), O_RDONLY, 0, SYNC).expect("open");
    let dest = ByteArray::from_vec(vec![b'x'; 6]);
    assert_eq!(files.read(fd, &dest, 6, 0, 0, SYNC).expect("read"), 3);
    assert_eq!(dest.to_vec(), b"abcxxx");
    files.close(fd, SYNC).expect("close");
}

#[test]
fn zero_length_round_trip() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("empty");
    let files = files();

    let fd = files
        .open(p(&file), O_CREAT | O_RDWR, 0o644, SYNC)
        .expect("open");
    let empty = ByteArray::new(0);
    assert_eq!(files.write(fd, &empty, 0, 0, 0, SYNC).expect("write"), 0);
    assert_eq!(files.read(fd, &empty, 0, 0, 0, SYNC).expect("read"), 0);
    files.close(fd, SYNC).expect("close");
}

#[test]
fn stat_missing_raises_translated_error() {
    let err = files().stat("missing", SYNC).unwrap_err();
    let fs = err.as_fs().expect("fs error");
    assert_eq!(fs.errno, ErrorCode::ENOENT);
    assert_eq!(fs.code, "ENOENT");
    assert_eq!(fs.syscall, "stat");
    assert_eq!(fs.path.as_deref(), Some("missing"));
    assert!(err.to_string().starts_with("ENOENT: stat 'missing': "));
}

#[test]
fn readdir_lists_exactly_the_entries() {
    let dir = tempdir().expect("tempdir");
    let d = dir.path().join("d");
    std::fs::create_dir(&d).expect("mkdir");
    std::fs::write(d.join("a"), b"").expect("a");
    std::fs::write(d.join("b"), b"").expect("b");
    let files = files();

    let first = files.readdir(p(&d), 0, SYNC).expect("readdir").expect("names");
    let second = files.readdir(p(&d), 0, SYNC).expect("readdir").expect("names");
    assert_eq!(first, second);

    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(sorted, ["a", "b"]);
    assert!(first.iter().all(|name| !name.contains('\0')));
}

#[test]
fn stat_timestamps_are_seconds_times_1000() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("stamped");
    std::fs::write(&file, vec![1_u8; 300]).expect("write");
    let files = files();

    files
        .utime(p(&file), 1_000_000.0, 1_500_000.25, SYNC)
        .expect("utime");
    let stats = files.stat(p(&file), SYNC).expect("stat").expect("stats");
    let meta = std::fs::metadata(&file).expect("metadata");

    assert!(stats.is_file());
    assert_eq!(stats.size, 300);
    assert_eq!(stats.atime, 1_000_000_000);
    assert_eq!(stats.mtime, 1_500_000_000);
    assert_eq!(stats.ctime, meta.ctime() * 1000);
    assert_eq!(stats.ino, meta.ino());
}

#[test]
fn symlink_readlink_and_lstat() {
    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("target");
    let link = dir.path().join("link");
    std::fs::write(&target, b"t").expect("write");
    let files = files();

    files.symlink(p(&target), p(&link), 0, SYNC).expect("symlink");
    let resolved = files.readlink(p(&link), SYNC).expect("readlink");
    assert_eq!(resolved.as_deref(), Some(p(&target)));

    let lstat = files.lstat(p(&link), SYNC).expect("lstat").expect("stats");
    assert!(lstat.is_symbolic_link());
    let stat = files.stat(p(&link), SYNC).expect("stat").expect("stats");
    assert!(stat.is_file());
}

#[test]
fn rename_failure_carries_both_paths() {
    let dir = tempdir().expect("tempdir");
    let from = dir.path().join("nope");
    let to = dir.path().join("dest");
    let err = files().rename(p(&from), p(&to), SYNC).unwrap_err();
    let fs = err.as_fs().expect("fs error");
    assert_eq!(fs.syscall, "rename");
    assert_eq!(fs.dest.as_deref(), Some(p(&to)));
    assert!(err.to_string().contains(" -> "));
}

#[test]
fn link_unlink_mkdir_rmdir() {
    let dir = tempdir().expect("tempdir");
    let original = dir.path().join("orig");
    let hard = dir.path().join("hard");
    let sub = dir.path().join("sub");
    std::fs::write(&original, b"x").expect("write");
    let files = files();

    assert_eq!(files.link(p(&original), p(&hard), SYNC).expect("link"), 0);
    let stats = files.stat(p(&original), SYNC).expect("stat").expect("stats");
    assert_eq!(stats.nlink, 2);
    files.unlink(p(&hard), SYNC).expect("unlink");
    assert!(!hard.exists());

    files.mkdir(p(&sub), 0o755, SYNC).expect("mkdir");
    let stats = files.stat(p(&sub), SYNC).expect("stat").expect("stats");
    assert!(stats.is_directory());
    files.rmdir(p(&sub), SYNC).expect("rmdir");
    assert!(!sub.exists());
}

#[test]
fn descriptor_operations() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("fd-ops");
    std::fs::write(&file, b"0123456789").expect("write");
    let files = files();

    let fd = files.open(p(&file), O_RDWR, 0, SYNC).expect("open");
    files.ftruncate(fd, 4, SYNC).expect("ftruncate");
    files.fsync(fd, SYNC).expect("fsync");
    files.fdatasync(fd, SYNC).expect("fdatasync");
    files.fchmod(fd, 0o600, SYNC).expect("fchmod");
    files.futime(fd, 10.0, 20.0, SYNC).expect("futime");

    let stats = files.fstat(fd, SYNC).expect("fstat").expect("stats");
    assert_eq!(stats.size, 4);
    assert_eq!(stats.mode & 0o777, 0o600);
    assert_eq!(stats.mtime, 20_000);

    files.chmod(p(&file), 0o640, SYNC).expect("chmod");
    let stats = files.fstat(fd, SYNC).expect("fstat").expect("stats");
    assert_eq!(stats.mode & 0o777, 0o640);

    // Owner unchanged: chown to the current ids always succeeds.
    files
        .fchown(fd, stats.uid, stats.gid, SYNC)
        .expect("fchown");
    files
        .chown(p(&file), stats.uid, stats.gid, SYNC)
        .expect("chown");
    files.close(fd, SYNC).expect("close");
}

#[test]
fn sendfile_between_descriptors() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("src");
    let dst = dir.path().join("dst");
    std::fs::write(&src, b"sendfile-body").expect("write");
    let files = files();

    let in_fd = files.open(p(&src), O_RDONLY, 0, SYNC).expect("open src");
    let out_fd = files
        .open(p(&dst), O_CREAT | O_WRONLY, 0o644, SYNC)
        .expect("open dst");
    assert_eq!(files.sendfile(out_fd, in_fd, 0, 8, SYNC).expect("sendfile"), 8);
    files.close(in_fd, SYNC).expect("close");
    files.close(out_fd, SYNC).expect("close");
    assert_eq!(std::fs::read(&dst).expect("read"), b"sendfile");
}

#[test]
fn buffer_overrun_is_range_fault() {
    let files = files();
    let small = ByteArray::new(4);
    let err = files.read(0, &small, 4, 1, 0, SYNC).unwrap_err();
    assert!(matches!(err, FilesError::Range(_)));
    let err = files.write(1, &small, 8, 0, 0, SYNC).unwrap_err();
    assert!(matches!(err, FilesError::Range(_)));
}

#[test]
fn bad_descriptor_is_ebadf() {
    let err = files().close(-1, SYNC).unwrap_err();
    assert_eq!(err.as_fs().map(|e| e.errno), Some(ErrorCode::EBADF));
}

#[cfg(target_os = "linux")]
#[test]
fn get_path_resolves_open_descriptor() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("located");
    std::fs::write(&file, b"").expect("write");
    let files = files();

    let fd = files.open(p(&file), O_RDONLY, 0, SYNC).expect("open");
    let resolved = files.get_path(fd).expect("get_path");
    let expected = std::fs::canonicalize(&file).expect("canonicalize");
    assert_eq!(Path::new(&resolved), expected);
    files.close(fd, SYNC).expect("close");

    assert!(files.get_path(-1).is_err());
}

#[test]
fn facade_shares_one_loop() {
    let lp = Loop::new(LoopConfig::default()).expect("loop");
    let files = Files::new(Arc::clone(&lp));
    assert!(Arc::ptr_eq(files.event_loop(), &lp));
    assert!(!files.callbacks().is_initialized());
}

#[test]
fn stats_serialize_with_millisecond_times() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("json");
    std::fs::write(&file, b"{}").expect("write");
    let files = files();
    files.utime(p(&file), 7.0, 9.0, SYNC).expect("utime");

    let stats = files.stat(p(&file), SYNC).expect("stat").expect("stats");
    let json = serde_json::to_value(stats).expect("serialize");
    assert_eq!(json["size"], 2);
    assert_eq!(json["atime"], 7000);
    assert_eq!(json["mtime"], 9000);
}
