//! Reference counting and teardown across several accessors.

use mmap_view::{open_mapping, ErrorKind, MappingSource, MmapMode};
use std::sync::Arc;
use std::thread;

#[test]
fn handle_outlives_every_view() {
    let handle = open_mapping(MappingSource::Anonymous, 16 * 1024, MmapMode::ReadWrite)
        .expect("anon");

    let mut accessors: Vec<_> = (0..4u64)
        .map(|i| {
            handle
                .create_view_accessor(i * 4096, 4096, MmapMode::ReadWrite)
                .expect("accessor")
        })
        .collect();
    assert_eq!(handle.ref_count(), 4);

    for (i, acc) in accessors.iter_mut().enumerate() {
        acc.write::<u64>(0, i as u64).expect("write");
    }

    // Release out of creation order; the mapping survives until the last one.
    let last = accessors.remove(1);
    for mut acc in accessors.drain(..) {
        acc.dispose();
        assert!(handle.is_open());
        assert_eq!(acc.read::<u64>(0).expect_err("closed").kind(), ErrorKind::InvalidState);
    }
    assert_eq!(handle.ref_count(), 1);
    assert_eq!(last.read::<u64>(0).expect("still readable"), 1);

    drop(last);
    assert_eq!(handle.ref_count(), 0);
    assert!(!handle.is_open());
    assert!(handle.base_address().is_none());

    let err = handle
        .create_view_accessor(0, 16, MmapMode::ReadOnly)
        .expect_err("closed handle");
    assert_eq!(err.kind(), ErrorKind::Argument);
}

#[test]
fn overlapping_views_see_each_others_writes() {
    let handle = open_mapping(MappingSource::Anonymous, 8192, MmapMode::ReadWrite)
        .expect("anon");
    let mut wide = handle
        .create_view_accessor(0, 8192, MmapMode::ReadWrite)
        .expect("wide");
    let narrow = handle
        .create_view_accessor(4100, 50, MmapMode::ReadOnly)
        .expect("narrow");

    wide.write::<f64>(4110, 2.5).expect("write");
    assert_eq!(narrow.read::<f64>(10).expect("read"), 2.5);
}

#[test]
fn concurrent_open_and_dispose() {
    let handle = open_mapping(MappingSource::Anonymous, 64 * 1024, MmapMode::ReadWrite)
        .expect("anon");
    // An anchor view keeps the handle open while workers churn.
    let anchor = handle
        .create_view_accessor(0, 8, MmapMode::ReadOnly)
        .expect("anchor");

    let workers: Vec<_> = (0..8u64)
        .map(|w| {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                for i in 0..200u64 {
                    let offset = 4096 + w * 4096 + (i % 16) * 64;
                    let mut acc = handle
                        .create_view_accessor(offset, 64, MmapMode::ReadWrite)
                        .expect("accessor");
                    acc.write::<u64>(0, w * 1000 + i).expect("write");
                    assert_eq!(acc.read::<u64>(0).expect("read"), w * 1000 + i);
                    acc.dispose();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("join");
    }

    assert_eq!(handle.ref_count(), 1);
    assert!(handle.is_open());
    drop(anchor);
    assert!(!handle.is_open());
}

#[test]
fn explicit_close_invalidates_open_accessors() {
    let handle = open_mapping(MappingSource::Anonymous, 4096, MmapMode::ReadWrite)
        .expect("anon");
    let mut acc = handle
        .create_view_accessor(0, 128, MmapMode::ReadWrite)
        .expect("accessor");

    handle.close().expect("close");
    handle.close().expect("close twice");
    assert!(!handle.is_open());
    assert_eq!(acc.write::<u8>(0, 1).expect_err("unmapped").kind(), ErrorKind::InvalidState);

    // Disposal still balances the count without touching the unmapped range.
    acc.dispose();
    assert_eq!(handle.ref_count(), 0);
}
