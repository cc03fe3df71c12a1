use std::collections::BTreeMap;
use std::io::Cursor;

use cdx_bigfile::allocate::VolumeAllocator;
use cdx_bigfile::error::Result;
use cdx_bigfile::types::{ArchiveEntry, ArchiveFormat, ArchiveIndex, EntryKey, Endian};
use cdx_bigfile::ReadOptions;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const VOLUME_SIZE: u32 = 16 * 2048;

/// Build an index satisfying every invariant of `format` by allocating the entries in order
fn build_index(
    format: ArchiveFormat,
    endian: Endian,
    block_alignment: u32,
    files: &[(u32, u32, u32)],
) -> Result<ArchiveIndex> {
    let mut index = ArchiveIndex::new(format, endian);
    index.block_alignment = block_alignment;

    let mut unique = BTreeMap::new();
    for &(name_hash, locale, size) in files {
        unique.insert(EntryKey { name_hash, locale }, size);
    }

    let mut allocator = VolumeAllocator::new(block_alignment, format.estimate_header_size(unique.len()))?;
    for (key, size) in unique {
        let allocation = allocator.allocate(size as u64);
        let (offset, data_index) = match format {
            ArchiveFormat::Tiger => (allocation.byte_offset() as u32, allocation.volume as u8),
            _ => (allocation.global_block, 0),
        };

        index.entries.push(ArchiveEntry {
            name_hash: key.name_hash,
            locale: key.locale,
            uncompressed_size: allocation.length as u32,
            compressed_size: 0,
            offset,
            data_index,
        });
    }

    if format == ArchiveFormat::Tiger {
        index.base_path = "pc-w".into();
        index.priority = 9;
        index.data_file_count = allocator.current_volume() + 1;
    } else if format == ArchiveFormat::BigFileV2 {
        index.base_path = "DX3".into();
    }

    Ok(index)
}

fn as_set(index: &ArchiveIndex) -> BTreeMap<EntryKey, ArchiveEntry> {
    index.entries.iter().map(|e| (e.key(), *e)).collect()
}

fn round_trip(index: &ArchiveIndex) -> Result<ArchiveIndex> {
    let mut buffer = Cursor::new(Vec::new());
    index.write(&mut buffer)?;
    assert!(buffer.get_ref().len() as u32 <= index.header_size());

    buffer.set_position(0);
    let options = ReadOptions::builder()
        .endian(index.endian)
        .block_alignment(index.block_alignment)
        .build();
    ArchiveIndex::read_detect(&mut buffer, options)
}

fn archive_format() -> impl Strategy<Value = ArchiveFormat> {
    prop_oneof![
        Just(ArchiveFormat::BigFileV1),
        Just(ArchiveFormat::BigFileV2),
        Just(ArchiveFormat::Tiger),
    ]
}

fn endian() -> impl Strategy<Value = Endian> {
    prop_oneof![Just(Endian::Little), Just(Endian::Big)]
}

proptest! {
    /// Every index that satisfies its format's invariants decodes to the same entry set and metadata
    #[test]
    fn index_round_trip(
        format in archive_format(),
        endian in endian(),
        use_xenon_alignment in any::<bool>(),
        files in prop::collection::vec((any::<u32>(), prop_oneof![Just(0xFFFF_FFFFu32), 1u32..0x2000], 0u32..8192), 0..40)
    ) {
        let block_alignment = match format {
            ArchiveFormat::BigFileV2 if use_xenon_alignment => 0x6230_0000,
            ArchiveFormat::BigFileV2 => 0x7FF0_0000,
            _ => VOLUME_SIZE,
        };

        let index = build_index(format, endian, block_alignment, &files)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        // BigFile V1 has no magic, an empty V1 index is just a zero count which still detects as V1
        let decoded = round_trip(&index).map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(decoded.format, index.format);
        prop_assert_eq!(decoded.endian, index.endian);
        prop_assert_eq!(decoded.block_alignment, index.block_alignment);
        prop_assert_eq!(&decoded.base_path, &index.base_path);
        prop_assert_eq!(decoded.data_file_count, index.data_file_count);
        prop_assert_eq!(decoded.priority, index.priority);
        prop_assert_eq!(as_set(&decoded), as_set(&index));

        for entry in &decoded.entries {
            if format == ArchiveFormat::Tiger {
                prop_assert_eq!(entry.offset & 0x7FF, 0);
            }
            prop_assert_eq!(decoded.locate(entry).map_err(|e| TestCaseError::fail(e.to_string()))?.1 % 2048, 0);
        }
    }

    /// V2 stores entries by hash, then by size
    #[test]
    fn v2_composite_order(
        files in prop::collection::vec((0u32..8, 0u32..64, 0u32..8192), 1..40)
    ) {
        let index = build_index(ArchiveFormat::BigFileV2, Endian::Little, 0x7FF0_0000, &files)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = round_trip(&index).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let keys: Vec<(u32, u32)> = decoded.entries.iter().map(|e| (e.name_hash, e.uncompressed_size)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        prop_assert_eq!(keys, sorted);
    }

    /// V1 only guarantees ascending hashes
    #[test]
    fn v1_hash_order(
        files in prop::collection::vec((0u32..8, 0u32..64, 0u32..8192), 1..40)
    ) {
        let index = build_index(ArchiveFormat::BigFileV1, Endian::Big, VOLUME_SIZE, &files)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = round_trip(&index).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let hashes: Vec<u32> = decoded.entries.iter().map(|e| e.name_hash).collect();
        prop_assert!(hashes.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn tiger_priority_mismatch_fails_whole_decode() -> Result<()> {
    let index = build_index(ArchiveFormat::Tiger, Endian::Little, VOLUME_SIZE, &[(1, 1, 10), (2, 1, 10)])?;

    let mut buffer = Cursor::new(Vec::new());
    index.write(&mut buffer)?;

    // second record's packed offset, priority lives in bits 4..11
    let mut data = buffer.into_inner();
    let packed = 52 + 16 + 12;
    data[packed] ^= 0x10;

    let result = ArchiveIndex::read(&mut Cursor::new(data), ArchiveFormat::Tiger, ReadOptions::default());
    assert!(matches!(result, Err(cdx_bigfile::error::Error::MalformedHeader(_))));

    Ok(())
}

#[test]
fn empty_v2_index() -> Result<()> {
    let index = build_index(ArchiveFormat::BigFileV2, Endian::Big, 0x7FF0_0000, &[])?;
    let decoded = round_trip(&index)?;
    assert_eq!(decoded, index);
    Ok(())
}
