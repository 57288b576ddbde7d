use std::sync::Arc;

use basalt::heap::{HeapFile, FIRST_RECORD_PAGE};
use basalt::{BufferPoolManager, Pager, Rid, StorageError};
use tempfile::tempdir;

fn heap(dir: &std::path::Path, record_size: usize) -> Arc<HeapFile> {
    let pager = Arc::new(Pager::new());
    let bpm = Arc::new(BufferPoolManager::with_clock(pager, 64));
    Arc::new(HeapFile::create(bpm, dir.join("table.bas"), record_size).unwrap())
}

fn record(tag: u8, len: usize) -> Vec<u8> {
    vec![tag; len]
}

#[test]
fn insert_get_update_delete_round_trip() {
    let dir = tempdir().unwrap();
    let heap = heap(dir.path(), 16);

    let rid = heap.insert_record(&record(1, 16)).unwrap();
    assert_eq!(rid, Rid::new(FIRST_RECORD_PAGE, 0));
    assert!(heap.is_record(rid));
    assert_eq!(heap.get_record(rid).unwrap(), record(1, 16));

    heap.update_record(rid, &record(2, 16)).unwrap();
    assert_eq!(heap.get_record(rid).unwrap(), record(2, 16));

    heap.delete_record(rid).unwrap();
    assert!(!heap.is_record(rid));
    assert!(matches!(
        heap.get_record(rid),
        Err(StorageError::RecordNotFound(_))
    ));
}

#[test]
fn wrong_record_length_is_rejected() {
    let dir = tempdir().unwrap();
    let heap = heap(dir.path(), 16);
    assert!(matches!(
        heap.insert_record(&record(1, 8)),
        Err(StorageError::RecordSizeMismatch {
            expected: 16,
            got: 8
        })
    ));
}

#[test]
fn deleted_slots_are_reused_before_the_file_grows() {
    let dir = tempdir().unwrap();
    let heap = heap(dir.path(), 16);

    let first = heap.insert_record(&record(1, 16)).unwrap();
    let second = heap.insert_record(&record(2, 16)).unwrap();
    heap.delete_record(first).unwrap();

    let reused = heap.insert_record(&record(3, 16)).unwrap();
    assert_eq!(reused, first);
    assert_eq!(heap.get_record(second).unwrap(), record(2, 16));
    assert_eq!(heap.get_record(reused).unwrap(), record(3, 16));
}

#[test]
fn full_pages_spill_to_new_pages() {
    let dir = tempdir().unwrap();
    // Large records keep the per-page slot count small.
    let heap = heap(dir.path(), 1000);
    let per_page = heap.header().records_per_page;

    let rids: Vec<Rid> = (0..per_page * 2 + 1)
        .map(|i| heap.insert_record(&record(i as u8, 1000)).unwrap())
        .collect();

    assert_eq!(rids[0].page_no, FIRST_RECORD_PAGE);
    assert!(rids.last().unwrap().page_no > FIRST_RECORD_PAGE + 1);
    for (i, rid) in rids.iter().enumerate() {
        assert_eq!(heap.get_record(*rid).unwrap(), record(i as u8, 1000));
    }
}

#[test]
fn scan_visits_occupied_slots_in_file_order() {
    let dir = tempdir().unwrap();
    let heap = heap(dir.path(), 500);

    let rids: Vec<Rid> = (0..20)
        .map(|i| heap.insert_record(&record(i as u8, 500)).unwrap())
        .collect();
    // Punch holes, including the very first slot.
    for idx in [0usize, 3, 7, 8, 19] {
        heap.delete_record(rids[idx]).unwrap();
    }
    let expected: Vec<Rid> = rids
        .iter()
        .enumerate()
        .filter(|(i, _)| ![0usize, 3, 7, 8, 19].contains(i))
        .map(|(_, rid)| *rid)
        .collect();

    let mut seen = Vec::new();
    let mut scan = heap.scan();
    while !scan.is_end() {
        seen.push(scan.rid());
        scan.next();
    }
    assert_eq!(seen, expected);
    assert_eq!(scan.rid(), Rid::INVALID);
}

#[test]
fn scan_of_an_empty_file_is_immediately_done() {
    let dir = tempdir().unwrap();
    let heap = heap(dir.path(), 32);
    let scan = heap.scan();
    assert!(scan.is_end());
    assert_eq!(scan.rid(), Rid::INVALID);
}

#[test]
fn scan_observes_the_live_header_while_the_file_grows() {
    let dir = tempdir().unwrap();
    let heap = heap(dir.path(), 1000);
    let per_page = heap.header().records_per_page;

    for i in 0..per_page {
        heap.insert_record(&record(i as u8, 1000)).unwrap();
    }
    let mut scan = heap.scan();
    assert!(!scan.is_end());

    // Pages appended mid-scan are still reached.
    let late = heap.insert_record(&record(0xEE, 1000)).unwrap();
    assert!(late.page_no > FIRST_RECORD_PAGE);
    let mut seen = Vec::new();
    while !scan.is_end() {
        seen.push(scan.rid());
        scan.next();
    }
    assert_eq!(seen.len() as u32, per_page + 1);
    assert_eq!(*seen.last().unwrap(), late);
}

#[test]
fn heap_survives_flush_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.bas");
    let rid;
    {
        let pager = Arc::new(Pager::new());
        let bpm = Arc::new(BufferPoolManager::with_clock(pager, 64));
        let heap = HeapFile::create(bpm, path.clone(), 24).unwrap();
        rid = heap.insert_record(&record(9, 24)).unwrap();
        heap.flush().unwrap();
    }

    let pager = Arc::new(Pager::new());
    let bpm = Arc::new(BufferPoolManager::with_clock(pager, 64));
    let heap = HeapFile::open(bpm, path).unwrap();
    assert!(heap.is_record(rid));
    assert_eq!(heap.get_record(rid).unwrap(), record(9, 24));
    assert_eq!(heap.record_size(), 24);
}
