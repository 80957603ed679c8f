/*!
 * End-to-End Scenarios
 * Full shim flows exercising bridge, dispatcher, and registry together
 */

use bridgefs::core::types::{oflags, DirEntry, FileStat};
use bridgefs::{
    clear_errno, errno, Bridge, Dispatcher, Errno, LocalFallback, MemBackend, ShimConfig,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn shim() -> (Arc<Dispatcher>, String, TempDir) {
    let config = ShimConfig::default();
    let prefix = config.backend_prefix.clone();
    let backend_root = prefix.clone();
    let bridge = Bridge::start(move || MemBackend::new(backend_root));
    let temp = TempDir::new().unwrap();
    let fallback = Arc::new(LocalFallback::new(temp.path()));
    (
        Arc::new(Dispatcher::new(bridge, fallback, config)),
        prefix,
        temp,
    )
}

/// Write a line, reopen, and read back exactly what was written
#[test]
fn test_write_then_read_round_trip() {
    let (shim, prefix, _temp) = shim();
    let path = format!("{}/example", prefix);
    let line = b"Writing a few characters.\n";
    assert_eq!(line.len(), 26);

    let fd = shim.open(
        &path,
        oflags::O_CREAT | oflags::O_WRONLY | oflags::O_TRUNC,
        0o644,
    );
    assert!(fd >= 0);
    assert_eq!(shim.write(fd, line), 26);
    assert_eq!(shim.close(fd), 0);

    let fd = shim.open(&path, oflags::O_RDONLY, 0);
    assert!(fd >= 0);
    let mut buf = [0u8; 64];
    let n = shim.read(fd, &mut buf);
    assert_eq!(n, 26);
    assert_eq!(&buf[..26], line);
    assert_eq!(shim.close(fd), 0);
}

/// Ten appending threads plus a main-thread prolog produce eleven lines,
/// each exactly once
#[test]
fn test_multi_writer_append() {
    let (shim, prefix, _temp) = shim();
    let path = format!("{}/multi", prefix);

    let fd = shim.open(&path, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert!(fd >= 0);
    assert!(shim.write(fd, b"Writing from the main thread\n") > 0);
    assert_eq!(shim.close(fd), 0);

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let shim = Arc::clone(&shim);
            let path = path.clone();
            thread::spawn(move || {
                let line = format!("Writing from thread {}\n", i);
                let fd = shim.open(&path, oflags::O_WRONLY | oflags::O_APPEND, 0);
                assert!(fd >= 0);
                assert_eq!(shim.write(fd, line.as_bytes()), line.len() as isize);
                assert_eq!(shim.close(fd), 0);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let fd = shim.open(&path, oflags::O_RDONLY, 0);
    let mut contents = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = shim.read(fd, &mut buf);
        assert!(n >= 0);
        if n == 0 {
            break;
        }
        contents.extend_from_slice(&buf[..n as usize]);
    }
    assert_eq!(shim.close(fd), 0);

    let text = String::from_utf8(contents).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(
        lines
            .iter()
            .filter(|&&l| l == "Writing from the main thread")
            .count(),
        1
    );
    for i in 0..10 {
        let expected = format!("Writing from thread {}", i);
        assert_eq!(
            lines.iter().filter(|&&l| l == expected.as_str()).count(),
            1,
            "{}",
            expected
        );
    }
}

/// A rename that straddles the backend/fallback boundary is refused and
/// modifies nothing
#[test]
fn test_cross_backend_rename_rejection() {
    let (shim, prefix, temp) = shim();
    let src = format!("{}/a", prefix);

    let fd = shim.open(&src, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.write(fd, b"survivor"), 8);
    assert_eq!(shim.close(fd), 0);

    clear_errno();
    assert_eq!(shim.rename(&src, "b"), -1);
    assert_eq!(errno(), Errno::XDev.as_raw());

    let mut stat = FileStat::default();
    assert_eq!(shim.stat(&src, &mut stat), 0);
    assert_eq!(stat.size, 8);

    clear_errno();
    assert_eq!(shim.stat("b", &mut stat), -1);
    assert_eq!(errno(), Errno::NoEnt.as_raw());
    assert!(!temp.path().join("b").exists());
}

/// Directory enumeration yields `.`, `..`, and the file, then end-of-stream
#[test]
fn test_directory_enumeration() {
    let (shim, prefix, _temp) = shim();
    let dir = format!("{}/d", prefix);
    let file = format!("{}/d/f.txt", prefix);

    assert_eq!(shim.mkdir(&dir, 0o755), 0);
    let fd = shim.open(&file, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.close(fd), 0);

    let dir_fd = shim.open(&dir, oflags::O_RDONLY | oflags::O_DIRECTORY, 0);
    assert!(dir_fd >= 0);

    let mut names = Vec::new();
    for _ in 0..3 {
        let mut batch: Vec<DirEntry> = Vec::new();
        assert_eq!(shim.getdents(dir_fd, &mut batch, 1), 1);
        names.push(batch.remove(0).name);
    }

    let mut batch: Vec<DirEntry> = Vec::new();
    assert_eq!(shim.getdents(dir_fd, &mut batch, 1), 0);
    assert!(batch.is_empty());

    let seen: HashSet<&str> = names.iter().map(String::as_str).collect();
    let expected: HashSet<&str> = [".", "..", "f.txt"].into_iter().collect();
    assert_eq!(seen, expected);
    assert_eq!(shim.close(dir_fd), 0);
}

/// A closed backend descriptor falls out of the registry, so the next use
/// routes to the fallback and fails with EBADF
#[test]
fn test_close_removes_descriptor_from_registry() {
    let (shim, prefix, _temp) = shim();
    let path = format!("{}/short-lived", prefix);

    let fd = shim.open(&path, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert!(fd >= 0);
    assert!(shim.registry().contains(fd));
    assert_eq!(shim.close(fd), 0);
    assert!(!shim.registry().contains(fd));

    clear_errno();
    assert_eq!(shim.write(fd, b"too late"), -1);
    assert_eq!(errno(), Errno::BadFd.as_raw());
}

/// The first backend-routed call initializes the backend exactly once;
/// later calls reuse it
#[test]
fn test_backend_init_happens_once() {
    let config = ShimConfig::default();
    let prefix = config.backend_prefix.clone();
    let inits = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&inits);
    let backend_root = prefix.clone();
    let bridge =
        Bridge::start(move || MemBackend::new(backend_root).with_init_counter(counter));
    let temp = TempDir::new().unwrap();
    let fallback = Arc::new(LocalFallback::new(temp.path()));
    let shim = Dispatcher::new(bridge, fallback, config);

    // fallback traffic does not wake the backend
    let fd = shim.open("local.txt", oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.close(fd), 0);
    assert_eq!(inits.load(Ordering::SeqCst), 0);

    let path = format!("{}/first", prefix);
    let fd = shim.open(&path, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.write(fd, b"x"), 1);
    assert_eq!(shim.close(fd), 0);

    let mut stat = FileStat::default();
    assert_eq!(shim.stat(&path, &mut stat), 0);
    assert_eq!(shim.unlink(&path), 0);

    assert_eq!(inits.load(Ordering::SeqCst), 1);
}
