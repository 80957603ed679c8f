/*!
 * Dispatcher Integration Tests
 * Routing decisions, registry consistency, and error mapping
 */

use bridgefs::core::types::{oflags, FileStat};
use bridgefs::{
    clear_errno, errno, is_backend_path, Bridge, Dispatcher, Errno, LocalFallback, MemBackend,
    Opcode, RouteKind, ShimConfig,
};
use std::sync::Arc;
use tempfile::TempDir;

fn shim() -> (Dispatcher, String, TempDir) {
    let config = ShimConfig::default();
    let prefix = config.backend_prefix.clone();
    let backend_root = prefix.clone();
    let bridge = Bridge::start(move || MemBackend::new(backend_root));
    let temp = TempDir::new().unwrap();
    let fallback = Arc::new(LocalFallback::new(temp.path()));
    (Dispatcher::new(bridge, fallback, config), prefix, temp)
}

#[test]
fn test_routing_is_a_pure_function_of_the_prefix() {
    let prefix = ShimConfig::default().backend_prefix;
    assert!(is_backend_path(&prefix, &format!("{}/a.txt", prefix)));
    assert!(is_backend_path(&prefix, &format!("/{}/a.txt", prefix)));
    assert!(!is_backend_path(&prefix, &format!("{}extra/a.txt", prefix)));
    assert!(!is_backend_path(&prefix, "tmp/a.txt"));
    assert!(!is_backend_path(&prefix, "/"));
}

#[test]
fn test_syscall_table_is_total() {
    for op in Opcode::ALL {
        assert!(!op.name().is_empty());
        match op.route_kind() {
            RouteKind::Path | RouteKind::Fd | RouteKind::TwoPath => {}
        }
    }
    assert_eq!(Opcode::Open.route_kind(), RouteKind::Path);
    assert_eq!(Opcode::Close.route_kind(), RouteKind::Fd);
    assert_eq!(Opcode::Rename.route_kind(), RouteKind::TwoPath);
}

#[test]
fn test_backend_open_registers_descriptor() {
    let (shim, prefix, _temp) = shim();
    let fd = shim.open(
        &format!("{}/f.txt", prefix),
        oflags::O_CREAT | oflags::O_WRONLY,
        0o644,
    );
    assert!(fd >= 0);
    assert!(shim.registry().contains(fd));

    assert_eq!(shim.close(fd), 0);
    assert!(!shim.registry().contains(fd));
}

#[test]
fn test_fallback_open_stays_unregistered() {
    let (shim, _prefix, temp) = shim();
    let fd = shim.open("plain.txt", oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert!(fd >= 0);
    assert!(!shim.registry().contains(fd));
    assert_eq!(shim.close(fd), 0);
    assert!(temp.path().join("plain.txt").exists());
}

#[test]
fn test_lookalike_prefix_routes_to_fallback() {
    let (shim, prefix, temp) = shim();
    let path = format!("{}x.txt", prefix);
    let fd = shim.open(&path, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert!(fd >= 0);
    assert!(!shim.registry().contains(fd));
    assert_eq!(shim.close(fd), 0);
    assert!(temp.path().join(&path).exists());
}

#[test]
fn test_stale_fd_routes_to_fallback() {
    let (shim, _prefix, _temp) = shim();
    let mut buf = [0u8; 4];
    clear_errno();
    assert_eq!(shim.read(9999, &mut buf), -1);
    assert_eq!(errno(), Errno::BadFd.as_raw());
}

#[test]
fn test_close_of_unknown_fd_leaves_registry_untouched() {
    let (shim, prefix, _temp) = shim();
    let fd = shim.open(
        &format!("{}/keep", prefix),
        oflags::O_CREAT | oflags::O_WRONLY,
        0o644,
    );
    assert!(fd >= 0);

    clear_errno();
    assert_eq!(shim.close(4242), -1);
    assert_eq!(errno(), Errno::BadFd.as_raw());
    assert!(shim.registry().contains(fd));
    assert_eq!(shim.registry().len(), 1);
}

#[test]
fn test_rename_within_backend() {
    let (shim, prefix, _temp) = shim();
    let a = format!("{}/a", prefix);
    let b = format!("{}/b", prefix);

    let fd = shim.open(&a, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.write(fd, b"payload"), 7);
    assert_eq!(shim.close(fd), 0);

    assert_eq!(shim.rename(&a, &b), 0);

    let mut stat = FileStat::default();
    clear_errno();
    assert_eq!(shim.stat(&a, &mut stat), -1);
    assert_eq!(errno(), Errno::NoEnt.as_raw());
    assert_eq!(shim.stat(&b, &mut stat), 0);
    assert_eq!(stat.size, 7);
}

#[test]
fn test_rename_within_fallback() {
    let (shim, _prefix, temp) = shim();
    let fd = shim.open("x.txt", oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.write(fd, b"abc"), 3);
    assert_eq!(shim.close(fd), 0);

    assert_eq!(shim.rename("x.txt", "y.txt"), 0);
    assert!(!temp.path().join("x.txt").exists());
    assert!(temp.path().join("y.txt").exists());
}

#[test]
fn test_mixed_rename_is_cross_device() {
    let (shim, prefix, _temp) = shim();
    let a = format!("{}/a", prefix);
    let fd = shim.open(&a, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.close(fd), 0);

    clear_errno();
    assert_eq!(shim.rename(&a, "b"), -1);
    assert_eq!(errno(), Errno::XDev.as_raw());

    clear_errno();
    assert_eq!(shim.rename("b", &format!("{}/c", prefix)), -1);
    assert_eq!(errno(), Errno::XDev.as_raw());
}

#[test]
fn test_mkdir_rmdir_cycle_on_backend() {
    let (shim, prefix, _temp) = shim();
    let dir = format!("{}/d", prefix);

    assert_eq!(shim.mkdir(&dir, 0o755), 0);
    let mut stat = FileStat::default();
    assert_eq!(shim.stat(&dir, &mut stat), 0);
    assert!(stat.is_dir());

    assert_eq!(shim.rmdir(&dir), 0);
    clear_errno();
    assert_eq!(shim.stat(&dir, &mut stat), -1);
    assert_eq!(errno(), Errno::NoEnt.as_raw());
}

#[test]
fn test_missing_file_maps_to_enoent_on_both_routes() {
    let (shim, prefix, _temp) = shim();

    clear_errno();
    assert_eq!(
        shim.open(&format!("{}/ghost", prefix), oflags::O_RDONLY, 0),
        -1
    );
    assert_eq!(errno(), Errno::NoEnt.as_raw());

    clear_errno();
    assert_eq!(shim.open("ghost", oflags::O_RDONLY, 0), -1);
    assert_eq!(errno(), Errno::NoEnt.as_raw());
}

#[test]
fn test_truncate_rejects_negative_length() {
    let (shim, prefix, _temp) = shim();
    let file = format!("{}/t", prefix);
    let fd = shim.open(&file, oflags::O_CREAT | oflags::O_WRONLY, 0o644);
    assert_eq!(shim.close(fd), 0);

    clear_errno();
    assert_eq!(shim.truncate(&file, -5), -1);
    assert_eq!(errno(), Errno::Inval.as_raw());
}

#[test]
fn test_seek_read_write_through_both_routes() {
    let (shim, prefix, _temp) = shim();

    for path in [format!("{}/io", prefix), "io".to_string()] {
        let fd = shim.open(&path, oflags::O_CREAT | oflags::O_RDWR, 0o644);
        assert!(fd >= 0);
        assert_eq!(shim.write(fd, b"0123456789"), 10);
        assert_eq!(shim.lseek(fd, 2, 0), 2);

        let mut buf = [0u8; 3];
        assert_eq!(shim.read(fd, &mut buf), 3);
        assert_eq!(&buf, b"234");

        assert_eq!(shim.pwrite(fd, b"ZZ", 0), 2);
        let mut buf = [0u8; 2];
        assert_eq!(shim.pread(fd, &mut buf, 0), 2);
        assert_eq!(&buf, b"ZZ");

        assert_eq!(shim.close(fd), 0);
    }
}

#[test]
fn test_ioctl_is_refused_politely() {
    let (shim, prefix, _temp) = shim();
    let file = format!("{}/dev", prefix);
    let fd = shim.open(&file, oflags::O_CREAT | oflags::O_RDWR, 0o644);

    clear_errno();
    assert_eq!(shim.ioctl(fd, 0x5401, 0), -1);
    assert_eq!(errno(), Errno::NoTty.as_raw());
    assert_eq!(shim.close(fd), 0);
}

#[test]
fn test_fcntl_getfl_reports_open_flags() {
    let (shim, prefix, _temp) = shim();
    let file = format!("{}/flags", prefix);
    let flags = oflags::O_CREAT | oflags::O_RDWR;
    let fd = shim.open(&file, flags, 0o644);

    let reported = shim.fcntl(fd, 3, 0);
    assert_eq!(reported & oflags::O_ACCMODE, oflags::O_RDWR);
    assert_eq!(shim.close(fd), 0);
}
