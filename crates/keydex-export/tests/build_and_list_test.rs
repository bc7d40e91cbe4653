//! Build-and-list and batch consolidation workflows.
//!
//! Each test drives record stores on disk through the public drivers:
//! - Incremental build with foreign-key resolution, then listing
//! - Batch sort of records with duplicate search fields
//! - Multi-source consolidation into a new directory store
//! - Strategy selection by volume
//! - Listing a perturbed index

use bytes::Bytes;
use keydex_common::{KeydexConfig, KeydexError, PAGE_SIZE, RecordPointer, StoreTag};
use keydex_export::{
    BuildStrategy, PushOutcome, SortIndexBuilder, Source, build_index, consolidate, export_lines,
    list_index,
};
use keydex_storage::{
    Association, FieldSpec, FileRecordStore, ForeignKeyResolver, IndexReader, KeyLayout,
    MemoryRecordStore, RecordStore, SearchMode, ordinal_from_suffix,
};
use rand::seq::SliceRandom;
use std::path::Path;
use tempfile::tempdir;

// =============================================================================
// Helpers
// =============================================================================

fn test_config(dir: &Path) -> KeydexConfig {
    KeydexConfig {
        data_dir: dir.join("idx"),
        fsync_enabled: false,
        ..Default::default()
    }
}

fn ptr(n: u32) -> RecordPointer {
    RecordPointer::new(n).unwrap()
}

/// Supplier record: code(6) | name(10)
fn supplier_store(path: &Path) -> FileRecordStore {
    let mut store = FileRecordStore::create(path, 16).unwrap();
    for record in [b"BOLT01Bolt Works", b"ACME01Acme Ltd  ", b"NUTS01Nut House "] {
        store.append(record).unwrap();
    }
    store
}

/// Part record: search(8) | supplier code(6)
fn part_store(path: &Path) -> FileRecordStore {
    let mut store = FileRecordStore::create(path, 14).unwrap();
    for record in [
        b"WASHER  ACME01",
        b"BOLT    ACME01",
        b"NUT\0\0\0\0\0ACME01",
        b"BOLT    BOLT01",
        b"SCREW   GONE01",
        b"RIVET   NUTS01",
    ] {
        store.append(record).unwrap();
    }
    store
}

// =============================================================================
// Incremental build-and-list
// =============================================================================

#[test]
fn test_build_with_resolved_suppliers_and_list() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());

    let mut suppliers = supplier_store(&dir.path().join("sup.dat"));
    let code = KeyLayout::new(vec![FieldSpec::new("code", 0, 6)]);
    let (supplier_index, _) = build_index(&cfg, "supplier-code", 6, &mut suppliers, |p, r| {
        code.key_for(r, p).map(Some)
    })
    .unwrap();

    let mut resolver = ForeignKeyResolver::new(supplier_index, SearchMode::Exact)
        .with_valid_range(suppliers.count());

    // Key: supplier pointer (2, big-endian) | part search(8) | suffix(2)
    let search = KeyLayout::new(vec![FieldSpec::new("search", 0, 8)]).with_suffix();
    let mut parts = part_store(&dir.path().join("parts.dat"));
    let (mut index, summary) = build_index(&cfg, "parts-by-supplier", 12, &mut parts, |p, r| {
        let supplier = match resolver.associate(&r[8..14])? {
            Association::Linked(s) => s.get() as u16,
            Association::Unlinked | Association::OutOfRange(_) => 0,
        };
        let mut key = supplier.to_be_bytes().to_vec();
        key.extend_from_slice(&search.key_for(r, p)?);
        Ok(Some(Bytes::from(key)))
    })
    .unwrap();

    assert_eq!(summary.written, 6);
    let stats = resolver.stats();
    assert_eq!(stats.lookups, 4); // ACME01 run, BOLT01, GONE01, NUTS01
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);

    let mut out = Vec::new();
    let listing = list_index(&mut index, &mut parts, &mut out, |e, r| {
        let supplier = u16::from_be_bytes([e.key[0], e.key[1]]);
        let part = String::from_utf8_lossy(&r[..8]).replace('\0', " ");
        format!("{:>2} {}", supplier, part.trim_end())
    })
    .unwrap();

    assert_eq!(listing.listed, 6);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        " 0 SCREW\n 1 BOLT\n 2 BOLT\n 2 NUT\n 2 WASHER\n 3 RIVET\n"
    );
}

#[test]
fn test_reopened_index_lists_the_same() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    let mut parts = part_store(&dir.path().join("parts.dat"));
    let layout = KeyLayout::new(vec![FieldSpec::new("search", 0, 8)]).with_suffix();

    let (mut built, _) = build_index(&cfg, "parts", layout.width(), &mut parts, |p, r| {
        layout.key_for(r, p).map(Some)
    })
    .unwrap();
    let mut first = Vec::new();
    export_lines(&mut built, &mut parts, &mut first).unwrap();
    drop(built);

    let mut reopened = IndexReader::open(&cfg, "parts", layout.width()).unwrap();
    let mut second = Vec::new();
    export_lines(&mut reopened, &mut parts, &mut second).unwrap();

    assert_eq!(first, second);
    let text = String::from_utf8(first).unwrap();
    assert!(text.starts_with("BOLT    ACME01\nBOLT    BOLT01\nNUT     ACME01\n"));
}

#[test]
fn test_listing_halts_on_perturbed_index() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    let mut parts = part_store(&dir.path().join("parts.dat"));
    let layout = KeyLayout::new(vec![FieldSpec::new("search", 0, 8)]).with_suffix();

    let (built, _) = build_index(&cfg, "parts", layout.width(), &mut parts, |p, r| {
        layout.key_for(r, p).map(Some)
    })
    .unwrap();
    drop(built);

    // Single leaf at page 1: overwrite the third key so it sorts after the fourth
    let path = cfg.index_path("parts");
    let mut bytes = std::fs::read(&path).unwrap();
    let entry = layout.width() + 4;
    let third = PAGE_SIZE + keydex_common::NodeHeader::SIZE + 2 * entry;
    bytes[third..third + 8].copy_from_slice(b"ZZZZZZZZ");
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = IndexReader::open(&cfg, "parts", layout.width()).unwrap();
    let mut out = Vec::new();
    let err = export_lines(&mut reader, &mut parts, &mut out).unwrap_err();

    assert!(matches!(err, KeydexError::OutOfOrder { position: 4, .. }));
    assert!(out.is_empty(), "partial listing written");
}

// =============================================================================
// Batch sort
// =============================================================================

#[test]
fn test_batch_duplicate_fields_get_distinct_entries() {
    let dir = tempdir().unwrap();
    let mut source = FileRecordStore::create(&dir.path().join("dup.dat"), 6).unwrap();
    for record in [b"SAME-a", b"SAME-b", b"SAME-c", b"SAME-d", b"SAME-e"] {
        source.append(record).unwrap();
    }
    let layout = KeyLayout::new(vec![FieldSpec::new("search", 0, 4)]).with_suffix();

    let mut builder = SortIndexBuilder::new(4_000);
    let collected = builder
        .collect(&mut source, |p, r| layout.key_for(r, p).map(Some))
        .unwrap();
    assert_eq!(collected.accepted, 5);

    let run = builder.sort();
    let mut output = FileRecordStore::create(&dir.path().join("out.dat"), 6).unwrap();
    let written = run
        .write_to(&mut output, |e| {
            source
                .read_at(e.pointer)?
                .ok_or(KeydexError::InvalidPointer(e.pointer.get()))
        })
        .unwrap();
    assert_eq!(written, 5);

    let ordinals: Vec<u16> = run
        .entries()
        .iter()
        .map(|e| ordinal_from_suffix([e.key[4], e.key[5]]))
        .collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);

    let mut distinct: Vec<_> = run.entries().iter().map(|e| e.key.clone()).collect();
    distinct.dedup();
    assert_eq!(distinct.len(), 5);

    let tails: Vec<u8> = (1..=5)
        .map(|n| output.read_at(ptr(n)).unwrap().unwrap()[5])
        .collect();
    assert_eq!(tails, b"abcde".to_vec());
}

#[test]
fn test_batch_clamp_signals_drops() {
    let records = (0..50u8).map(|n| [b'A' + n % 26, n]);
    let mut source = MemoryRecordStore::from_records(2, records).unwrap();
    let mut builder = SortIndexBuilder::new(20);
    let summary = builder
        .collect(&mut source, |_, r| Ok(Some(Bytes::copy_from_slice(r))))
        .unwrap();

    assert_eq!(summary.accepted, 20);
    assert_eq!(summary.dropped, 30);
    assert_eq!(builder.push(Bytes::from_static(b"ZZ"), ptr(99)).unwrap(), PushOutcome::Dropped);

    let run = builder.sort();
    assert_eq!(run.len(), 20);
    assert_eq!(run.dropped(), 31);
}

#[test]
fn test_batch_clamp_before_suffix_overflow() {
    // More records than a two-byte suffix can number, far above the cap
    let records = (0..65_536u32).map(|n| [b'a' + (n % 26) as u8]);
    let mut store = MemoryRecordStore::from_records(1, records).unwrap();
    let layout = KeyLayout::new(vec![FieldSpec::new("letter", 0, 1)]);
    let mut sources = [Source::new(StoreTag(b'L'), layout, &mut store)];

    let mut output = MemoryRecordStore::new(1);
    let summary = consolidate(&mut sources, 10, &mut output, |_, record| {
        Ok(Bytes::copy_from_slice(record))
    })
    .unwrap();

    assert_eq!(summary.written, 10);
    assert_eq!(summary.dropped, 65_526);
    assert_eq!(summary.sources[0].1.scanned, 65_536);
    assert_eq!(summary.sources[0].1.accepted, 10);
    assert_eq!(output.count(), 10);
}

// =============================================================================
// Consolidation
// =============================================================================

#[test]
fn test_consolidate_three_stores_into_directory() {
    let dir = tempdir().unwrap();

    // Each store keeps the name at a different offset
    let mut suppliers = supplier_store(&dir.path().join("sup.dat"));
    let mut customers = FileRecordStore::create(&dir.path().join("cust.dat"), 12).unwrap();
    for record in [b"C1Zenith Co ", b"C2Acme Ltd  ", b"C9          "] {
        customers.append(record).unwrap();
    }
    let mut agents = MemoryRecordStore::from_records(10, [b"Bolt Agent"]).unwrap();

    let name_at = |offset: usize| KeyLayout::new(vec![FieldSpec::new("name", offset, 10)]);
    let has_name = |r: &[u8]| r[2..].iter().any(|b| *b != b' ');
    let mut sources = [
        Source::new(StoreTag(b'S'), name_at(6), &mut suppliers),
        Source::new(StoreTag(b'C'), name_at(2), &mut customers).with_filter(&has_name),
        Source::new(StoreTag(b'A'), name_at(0), &mut agents),
    ];

    let out_path = dir.path().join("directory.dat");
    let mut directory = FileRecordStore::create(&out_path, 12).unwrap();
    let summary = consolidate(&mut sources, 4_000, &mut directory, |tag, record| {
        let name = match tag.as_byte() {
            b'S' => &record[6..16],
            b'C' => &record[2..12],
            _ => &record[..10],
        };
        let mut line = vec![tag.as_byte(), b' '];
        line.extend_from_slice(name);
        Ok(Bytes::from(line))
    })
    .unwrap();

    assert_eq!(summary.written, 6);
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.sources[1].1.scanned, 3);
    assert_eq!(summary.sources[1].1.qualified, 2);
    directory.sync().unwrap();

    let mut reopened = FileRecordStore::open(&out_path, 12).unwrap();
    let mut lines = Vec::new();
    while let Some((_, record)) = reopened.read_next().unwrap() {
        lines.push(String::from_utf8(record.to_vec()).unwrap());
    }
    assert_eq!(
        lines,
        vec![
            "C Acme Ltd  ",
            "S Acme Ltd  ",
            "A Bolt Agent",
            "S Bolt Works",
            "S Nut House ",
            "C Zenith Co ",
        ]
    );
}

// =============================================================================
// Strategy selection
// =============================================================================

#[test]
fn test_large_volume_takes_batch_path_with_same_order() {
    let dir = tempdir().unwrap();
    let cfg = KeydexConfig {
        batch_threshold: 500,
        ..test_config(dir.path())
    };

    let mut names: Vec<u32> = (1..=800).collect();
    names.shuffle(&mut rand::thread_rng());
    let records: Vec<Vec<u8>> = names.iter().map(|n| format!("N{:07}", n).into_bytes()).collect();
    let mut store = MemoryRecordStore::from_records(8, &records).unwrap();

    let estimated = store.count() as usize;
    assert_eq!(BuildStrategy::choose(estimated, &cfg), BuildStrategy::Batch);
    assert_eq!(BuildStrategy::choose(estimated / 2, &cfg), BuildStrategy::Incremental);

    let mut results = Vec::new();
    for strategy in [BuildStrategy::Batch, BuildStrategy::Incremental] {
        let mut build = strategy.start(&cfg, "names", 8).unwrap();
        store.rewind();
        while let Some((p, r)) = store.read_next().unwrap() {
            build.insert(r, p).unwrap();
        }
        results.push(build.finish().unwrap());
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].first().unwrap().key.as_ref(), b"N0000001");
    assert_eq!(results[0].last().unwrap().key.as_ref(), b"N0000800");
}
