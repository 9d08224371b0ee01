//! Platform parity tests for flush visibility across OSes.
//!
//! Contract: after an accessor's flush() or dispose(), a newly opened read-only
//! mapping (or a plain file read) must observe the written bytes on all
//! supported platforms.

use mmap_view::{create_mapping, load_mapping, MmapMode};
use std::fs;
use std::path::PathBuf;

fn tmp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!(
        "mmap_view_platform_parity_{}_{}",
        name,
        std::process::id()
    ));
    p
}

#[test]
fn parity_explicit_flush_visibility() {
    let path = tmp_path("parity_explicit_flush_visibility");
    let _ = fs::remove_file(&path);

    let handle = create_mapping(&path, 8192).expect("create");
    let mut acc = handle
        .create_view_accessor(5000, 1000, MmapMode::ReadWrite)
        .expect("accessor");
    acc.write_bytes(0, b"ABCDEFGHIJ").expect("write-1");
    acc.write_bytes(990, b"klmnopqrst").expect("write-2");
    acc.flush().expect("flush");

    // The accessor is still open; a second mapping sees the flushed bytes.
    let ro = load_mapping(&path, MmapMode::ReadOnly).expect("open ro");
    let reader = ro
        .create_view_accessor(5000, 1000, MmapMode::ReadOnly)
        .expect("reader");
    let mut s1 = [0u8; 10];
    let mut s2 = [0u8; 10];
    reader.read_bytes(0, &mut s1).expect("read s1");
    reader.read_bytes(990, &mut s2).expect("read s2");
    assert_eq!(&s1, b"ABCDEFGHIJ");
    assert_eq!(&s2, b"klmnopqrst");
    assert!(acc.is_open());

    drop(reader);
    drop(acc);
    let _ = fs::remove_file(&path);
}

#[test]
fn parity_dispose_flush_visibility() {
    let path = tmp_path("parity_dispose_flush_visibility");
    let _ = fs::remove_file(&path);

    let handle = create_mapping(&path, 4096).expect("create");
    let mut a = handle
        .create_view_accessor(0, 100, MmapMode::ReadWrite)
        .expect("a");
    let mut b = handle
        .create_view_accessor(2000, 100, MmapMode::ReadWrite)
        .expect("b");
    a.write::<u64>(8, 0x1122_3344_5566_7788).expect("write a");
    b.write::<u16>(2, 0xBEEF).expect("write b");

    // No explicit flush: disposal must persist.
    a.dispose();
    b.dispose();
    assert!(!handle.is_open());

    let raw = fs::read(&path).expect("read file");
    assert_eq!(&raw[8..16], &0x1122_3344_5566_7788u64.to_ne_bytes());
    assert_eq!(&raw[2002..2004], &0xBEEFu16.to_ne_bytes());

    let _ = fs::remove_file(&path);
}

#[test]
fn parity_flush_then_dispose_is_stable() {
    let path = tmp_path("parity_flush_then_dispose_is_stable");
    let _ = fs::remove_file(&path);

    let handle = create_mapping(&path, 4096).expect("create");
    let mut acc = handle
        .create_view_accessor(10, 100, MmapMode::ReadWrite)
        .expect("accessor");
    acc.write::<u32>(0, 77).expect("write");
    acc.flush().expect("flush");
    let after_flush = fs::read(&path).expect("read after flush");

    acc.dispose();
    let after_dispose = fs::read(&path).expect("read after dispose");
    assert_eq!(after_flush, after_dispose);
    assert_eq!(&after_dispose[10..14], &77u32.to_ne_bytes());

    let _ = fs::remove_file(&path);
}
