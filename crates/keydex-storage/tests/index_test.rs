//! Key index integration tests.
//!
//! Exercises the engine end to end against on-disk record stores:
//! - Ordering of traversal for arbitrary insertion order
//! - Round-trip of every key to the record that produced it
//! - Null-to-space normalization against ASCII ordering
//! - Capacity clamping
//! - Detection of perturbed index stores
//! - Foreign-key resolution through a built index

use bytes::Bytes;
use keydex_common::{KeydexConfig, KeydexError, PAGE_SIZE, PageType, RecordPointer};
use keydex_storage::{
    Association, FieldSpec, FileRecordStore, ForeignKeyResolver, IndexReader, IndexWriter,
    KeyLayout, RecordStore, SearchMode, WriteOutcome, uniquing_suffix,
};
use rand::Rng;
use rand::seq::SliceRandom;
use std::path::Path;
use tempfile::tempdir;

// =============================================================================
// Helpers
// =============================================================================

const PART_RECORD_LEN: usize = 32;

fn test_config(dir: &Path) -> KeydexConfig {
    KeydexConfig {
        data_dir: dir.join("idx"),
        fsync_enabled: false,
        ..Default::default()
    }
}

/// search(10) | type(4) | size(4) | supplier(6) | filler(8)
fn part_layout() -> KeyLayout {
    KeyLayout::new(vec![
        FieldSpec::new("search", 0, 10),
        FieldSpec::new("type", 10, 4),
        FieldSpec::new("size", 14, 4),
    ])
    .with_suffix()
}

fn part_record(search: &[u8], kind: &[u8], size: &[u8], supplier: &[u8]) -> Vec<u8> {
    let mut record = vec![0u8; PART_RECORD_LEN];
    record[..search.len()].copy_from_slice(search);
    record[10..10 + kind.len()].copy_from_slice(kind);
    record[14..14 + size.len()].copy_from_slice(size);
    record[18..18 + supplier.len()].copy_from_slice(supplier);
    record
}

fn random_part(rng: &mut impl Rng) -> Vec<u8> {
    let mut field = |len: usize| -> Vec<u8> {
        (0..rng.gen_range(0..=len))
            .map(|_| {
                // Mix in nulls so normalization is exercised
                if rng.gen_range(0..8) == 0 {
                    0
                } else {
                    rng.gen_range(b'A'..=b'Z')
                }
            })
            .collect()
    };
    let search = field(10);
    let kind = field(4);
    let size = field(4);
    part_record(&search, &kind, &size, b"SUP000")
}

fn collect_keys(reader: &mut IndexReader) -> Vec<(Bytes, RecordPointer)> {
    reader
        .entries()
        .map(|e| e.map(|e| (e.key, e.pointer)))
        .collect::<keydex_common::Result<Vec<_>>>()
        .unwrap()
}

// =============================================================================
// Ordering and round-trip
// =============================================================================

#[test]
fn test_traversal_is_ordered_and_round_trips() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    let layout = part_layout();

    let mut rng = rand::thread_rng();
    let mut parts =
        FileRecordStore::create(&dir.path().join("parts.dat"), PART_RECORD_LEN).unwrap();
    for _ in 0..3_000 {
        parts.append(&random_part(&mut rng)).unwrap();
    }

    // Insert in shuffled record order
    let mut pointers: Vec<u32> = (1..=parts.count()).collect();
    pointers.shuffle(&mut rng);

    let mut writer = IndexWriter::create(&cfg, "parts", layout.width()).unwrap();
    for p in &pointers {
        let pointer = RecordPointer::new(*p).unwrap();
        let record = parts.read_at(pointer).unwrap().unwrap();
        let key = layout.key_for(&record, pointer).unwrap();
        writer.write(&key, pointer).unwrap();
    }
    let mut reader = writer.finish().unwrap();

    let entries = collect_keys(&mut reader);
    assert_eq!(entries.len(), 3_000);
    for pair in entries.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "keys out of order");
    }

    // Each key appears once and its pointer leads back to its record
    let mut seen = vec![false; 3_001];
    for (key, pointer) in &entries {
        assert!(!seen[pointer.get() as usize]);
        seen[pointer.get() as usize] = true;
        let record = parts.read_at(*pointer).unwrap().unwrap();
        assert_eq!(&layout.key_for(&record, *pointer).unwrap(), key);
    }

    // Reopen from disk and search every tenth key
    drop(reader);
    let mut reader = IndexReader::open(&cfg, "parts", 20).unwrap();
    for (key, pointer) in entries.iter().step_by(10) {
        assert_eq!(reader.search(key, SearchMode::Exact).unwrap(), Some(*pointer));
    }
}

#[test]
fn test_null_field_sorts_as_spaces() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    let layout = KeyLayout::new(vec![FieldSpec::new("search", 0, 2)]).with_suffix();

    let mut store = FileRecordStore::create(&dir.path().join("s.dat"), 2).unwrap();
    for record in [b"AB", b"\0\0", b"Z "] {
        store.append(record).unwrap();
    }

    let mut writer = IndexWriter::create(&cfg, "nulls", layout.width()).unwrap();
    store.rewind();
    while let Some((pointer, record)) = store.read_next().unwrap() {
        writer.write(&layout.key_for(&record, pointer).unwrap(), pointer).unwrap();
    }
    let mut reader = writer.finish().unwrap();

    let fields: Vec<Vec<u8>> = collect_keys(&mut reader)
        .iter()
        .map(|(k, _)| k[..2].to_vec())
        .collect();
    assert_eq!(fields, vec![b"  ".to_vec(), b"AB".to_vec(), b"Z ".to_vec()]);

    // The null key and the blank key are the same key
    let blank = layout.encode_record(&[b"  "], RecordPointer::new(2).unwrap()).unwrap();
    assert_eq!(
        reader.search(&blank, SearchMode::Exact).unwrap(),
        RecordPointer::new(2)
    );
}

#[test]
fn test_duplicate_fields_kept_apart_by_suffix() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    let layout = KeyLayout::new(vec![FieldSpec::new("search", 0, 4)]).with_suffix();

    let mut writer = IndexWriter::create(&cfg, "dups", layout.width()).unwrap();
    for n in [300u32, 2, 256, 1, 40] {
        let pointer = RecordPointer::new(n).unwrap();
        writer
            .write(&layout.encode_record(&[b"SAME"], pointer).unwrap(), pointer)
            .unwrap();
    }
    let mut reader = writer.finish().unwrap();

    let entries = collect_keys(&mut reader);
    let order: Vec<u32> = entries.iter().map(|(_, p)| p.get()).collect();
    assert_eq!(order, vec![1, 2, 40, 256, 300]);
    assert_eq!(&entries[3].0[4..], &uniquing_suffix(256));

    // Prefix search lands on the lowest ordinal
    assert_eq!(
        reader.search(b"SAME", SearchMode::Prefix(4)).unwrap(),
        RecordPointer::new(1)
    );
}

// =============================================================================
// Capacity
// =============================================================================

#[test]
fn test_clamp_keeps_exactly_capacity() {
    let dir = tempdir().unwrap();
    let cfg = KeydexConfig {
        max_index_entries: 250,
        ..test_config(dir.path())
    };

    let mut writer = IndexWriter::create(&cfg, "clamped", 4).unwrap();
    let mut clamped = 0;
    for n in 1..=400u32 {
        let outcome = writer
            .write_clamped(&n.to_be_bytes(), RecordPointer::new(n).unwrap())
            .unwrap();
        if outcome == WriteOutcome::Clamped {
            clamped += 1;
        }
    }
    assert_eq!(clamped, 150);
    assert_eq!(writer.clamped(), 150);

    let mut reader = writer.finish().unwrap();
    let entries = collect_keys(&mut reader);
    assert_eq!(entries.len(), 250);
    assert_eq!(entries.last().unwrap().1.get(), 250);
}

// =============================================================================
// Corruption detection
// =============================================================================

/// Finds the first leaf page with at least `min_entries` entries.
fn find_leaf(bytes: &[u8], min_entries: u16) -> usize {
    (1..bytes.len() / PAGE_SIZE)
        .find(|&page| {
            let base = page * PAGE_SIZE;
            let entries = u16::from_le_bytes([bytes[base + 6], bytes[base + 7]]);
            bytes[base + 4] == PageType::Leaf as u8 && entries >= min_entries
        })
        .expect("no leaf page found")
}

#[test]
fn test_swapped_entries_detected_mid_traversal() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    let width = 8;

    let mut writer = IndexWriter::create(&cfg, "perturbed", width).unwrap();
    for n in 1..=2_000u64 {
        writer
            .write(&n.to_be_bytes(), RecordPointer::new(n as u32).unwrap())
            .unwrap();
    }
    let reader = writer.finish().unwrap();
    assert!(reader.len() == 2_000);
    drop(reader);

    // Swap two adjacent entries of some leaf
    let path = cfg.index_path("perturbed");
    let mut bytes = std::fs::read(&path).unwrap();
    let page = find_leaf(&bytes, 10);
    let entry = width + 4;
    let first = page * PAGE_SIZE + keydex_common::NodeHeader::SIZE + 4 * entry;
    let (a, b) = bytes[first..first + 2 * entry].split_at_mut(entry);
    a.swap_with_slice(b);
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = IndexReader::open(&cfg, "perturbed", width).unwrap();
    let mut read = 0u64;
    let err = loop {
        match reader.read() {
            Ok(Some(_)) => read += 1,
            Ok(None) => panic!("perturbed index traversed cleanly"),
            Err(e) => break e,
        }
    };

    assert!(err.is_corruption());
    match err {
        KeydexError::OutOfOrder { position, .. } => assert_eq!(position, read + 1),
        other => panic!("expected OutOfOrder, got {other}"),
    }
    println!("perturbation detected after {} entries", read);
}

#[test]
fn test_damaged_header_rejected() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());

    let mut writer = IndexWriter::create(&cfg, "header", 4).unwrap();
    writer.write(b"KEY1", RecordPointer::FIRST).unwrap();
    drop(writer.finish().unwrap());

    let path = cfg.index_path("header");
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[16] ^= 0x01; // entry count
    std::fs::write(&path, &bytes).unwrap();

    let err = IndexReader::open(&cfg, "header", 4).err().unwrap();
    assert!(matches!(err, KeydexError::IndexCorrupted { .. }));
}

// =============================================================================
// Foreign-key resolution
// =============================================================================

#[test]
fn test_resolver_over_supplier_index() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());

    let mut suppliers = FileRecordStore::create(&dir.path().join("sup.dat"), 6).unwrap();
    for code in [b"SUP002", b"SUP001", b"SUP003"] {
        suppliers.append(code).unwrap();
    }
    let mut writer = IndexWriter::create(&cfg, "suppliers", 6).unwrap();
    suppliers.rewind();
    while let Some((pointer, record)) = suppliers.read_next().unwrap() {
        writer.write(&record, pointer).unwrap();
    }
    // A stale entry pointing past the end of the supplier store
    writer.write(b"SUP999", RecordPointer::new(77).unwrap()).unwrap();
    let reader = writer.finish().unwrap();

    let mut resolver =
        ForeignKeyResolver::new(reader, SearchMode::Exact).with_valid_range(suppliers.count());

    // Parts arrive grouped by supplier
    let requests: [&[u8]; 8] = [
        b"SUP001", b"SUP001", b"SUP001", b"SUP003", b"SUP003", b"SUP404", b"SUP999", b"SUP001",
    ];
    let associations: Vec<Association> = requests
        .iter()
        .map(|k| resolver.associate(k).unwrap())
        .collect();

    assert_eq!(associations[0], Association::Linked(RecordPointer::new(2).unwrap()));
    assert_eq!(associations[3], Association::Linked(RecordPointer::new(3).unwrap()));
    assert_eq!(associations[5], Association::Unlinked);
    assert!(matches!(associations[6], Association::OutOfRange(_)));
    assert_eq!(associations[7], associations[0]);

    let stats = resolver.stats();
    assert_eq!(stats.lookups, 5);
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.out_of_range, 1);

    // Cold lookups agree with the cache
    let mut reader = resolver.into_inner();
    assert_eq!(
        reader.search(b"SUP001", SearchMode::Exact).unwrap(),
        associations[0].pointer()
    );
}
