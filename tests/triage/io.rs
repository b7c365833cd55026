//! Integration tests for size-limited reads.

use pescan::triage::io::{read_bounded, IOLimits, TargetFile};

use crate::common::test_utils::{create_temp_file, create_temp_file_with_size};

#[test]
fn test_file_over_read_limit_is_refused() {
    let temp_file = create_temp_file_with_size(8192, 0x41);
    let limits = IOLimits {
        max_read_bytes: 4096,
        max_file_size: 100 * 1024 * 1024,
    };

    let err = read_bounded(temp_file.path(), &limits).unwrap_err();
    assert!(err.to_string().contains("exceeds read limit"));
}

#[test]
fn test_default_limits_read_large_file() {
    let temp_file = create_temp_file_with_size(1 << 20, 0x41);
    let data = read_bounded(temp_file.path(), &IOLimits::default()).unwrap();
    assert_eq!(data.len(), 1 << 20);
}

#[test]
fn test_file_size_limit_enforcement() {
    let temp_file = create_temp_file_with_size(2048, 0);
    let limits = IOLimits {
        max_read_bytes: 1000,
        max_file_size: 1024,
    };
    let err = TargetFile::open(temp_file.path(), limits).err().unwrap();
    assert!(err.to_string().contains("file too large"));
}

#[test]
fn test_default_limits_read_whole_file() {
    let temp_file = create_temp_file(b"MZ and then some");
    let target = TargetFile::open(temp_file.path(), IOLimits::default()).unwrap();
    assert_eq!(target.size(), 16);
    assert_eq!(target.read_all().unwrap(), b"MZ and then some");
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_bounded(&dir.path().join("absent.exe"), &IOLimits::default()).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
