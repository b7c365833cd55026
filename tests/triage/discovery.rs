//! Target resolution against real directory trees.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use pescan::triage::{resolve_targets, validate_inputs};

use crate::common::test_utils::write_file;

#[test]
fn test_mixed_inputs_keep_top_level_order() {
    let root = tempfile::tempdir().unwrap();
    let first = write_file(root.path(), "first.exe", b"1");
    let samples = root.path().join("samples");
    fs::create_dir(&samples).unwrap();
    let inner: BTreeSet<PathBuf> = ["x.exe", "y.dll", "z.sys"]
        .iter()
        .map(|name| write_file(&samples, name, b"s"))
        .collect();
    fs::create_dir(samples.join("nested")).unwrap();
    write_file(&samples.join("nested"), "hidden.exe", b"h");
    let last = write_file(root.path(), "last.exe", b"2");

    let inputs = vec![first.clone(), samples.clone(), last.clone()];
    validate_inputs(&inputs).unwrap();
    let targets = resolve_targets(&inputs, true);

    assert_eq!(targets.len(), 5);
    assert_eq!(targets.first(), Some(&first));
    assert_eq!(targets.last(), Some(&last));
    let expanded: BTreeSet<PathBuf> = targets[1..4].iter().cloned().collect();
    assert_eq!(expanded, inner);
}

#[test]
fn test_directories_pass_through_without_recursion() {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), "a.exe", b"a");
    let inputs = vec![root.path().to_path_buf()];
    assert_eq!(resolve_targets(&inputs, false), inputs);
}

#[test]
fn test_empty_directory_contributes_nothing() {
    let root = tempfile::tempdir().unwrap();
    let only = write_file(root.path(), "only.exe", b"o");
    let empty = root.path().join("empty");
    fs::create_dir(&empty).unwrap();
    fs::create_dir(empty.join("sub")).unwrap();

    assert_eq!(resolve_targets(&[empty, only.clone()], true), vec![only]);
}

#[cfg(unix)]
#[test]
fn test_symlinked_directories_are_skipped() {
    let root = tempfile::tempdir().unwrap();
    let real = root.path().join("real");
    fs::create_dir(&real).unwrap();
    let scan = root.path().join("scan");
    fs::create_dir(&scan).unwrap();
    let file = write_file(&scan, "a.exe", b"a");
    std::os::unix::fs::symlink(&real, scan.join("link")).unwrap();

    assert_eq!(resolve_targets(&[scan], true), vec![file]);
}
