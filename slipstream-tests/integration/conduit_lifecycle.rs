//! Provisioner end-state tests: whatever is (or is not) at the path before
//! the call, a FIFO is there afterwards.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use slipstream_core::conduit::ensure_conduit;
use tempfile::tempdir;

fn assert_fifo_at(path: &Path) {
    let file_type = fs::symlink_metadata(path).unwrap().file_type();
    assert!(file_type.is_fifo(), "{} is not a FIFO", path.display());
}

#[test]
fn test_provisions_fifo_at_fresh_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fifo.flv");

    let conduit = ensure_conduit(&path).unwrap();

    assert_eq!(conduit.path(), path);
    assert_fifo_at(&path);
}

#[test]
fn test_repeated_provisioning_reaches_the_same_end_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fifo.flv");

    for _ in 0..3 {
        ensure_conduit(&path).unwrap();
        assert_fifo_at(&path);
    }
}

#[test]
fn test_replaces_preexisting_regular_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fifo.flv");
    fs::write(&path, b"stale stream bytes from a crashed run").unwrap();

    ensure_conduit(&path).unwrap();

    // A FIFO, not the old regular file; the stale contents are gone with it
    let metadata = fs::symlink_metadata(&path).unwrap();
    assert!(metadata.file_type().is_fifo());
    assert!(!metadata.file_type().is_file());
}

#[test]
fn test_creates_missing_parent_directory_tree() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a/b/c/fifo.flv");

    ensure_conduit(&path).unwrap();

    assert_fifo_at(&path);
}

#[test]
fn test_removal_deletes_the_fifo_and_is_repeatable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fifo.flv");

    let mut conduit = ensure_conduit(&path).unwrap();
    conduit.remove().unwrap();
    conduit.remove().unwrap();

    assert!(!path.exists());
    assert!(conduit.is_removed());
}
