//! BigFile V1 and V2 index layouts.

use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt};
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::header::{read_fixed_string, write_fixed_string, ReadOptions};
use crate::types::{ArchiveEntry, ArchiveFormat, ArchiveIndex, Endian};

/// Raw alignment field values accepted by a V2 index, read as little endian
pub(crate) const V2_ALIGNMENTS: [u32; 4] = [0x7FF0_0000, 0x0000_F07F, 0x6230_0000, 0x0000_3062];

/// Length of the base path field of a V2 index
pub(crate) const V2_BASE_PATH_LENGTH: usize = 64;

/// One row of the entry table that follows the hash table
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
pub struct BigFileRecord {
    /// Size of the resource in bytes
    pub uncompressed_size: u32,

    /// Global block index of the resource data
    pub offset: u32,

    /// Locale mask
    pub locale: u32,

    /// Size after compression, 0 when stored
    pub compressed_size: u32,
}

impl BigFileRecord {
    fn into_entry(self, name_hash: u32) -> ArchiveEntry {
        ArchiveEntry {
            name_hash,
            locale: self.locale,
            uncompressed_size: self.uncompressed_size,
            compressed_size: self.compressed_size,
            offset: self.offset,
            data_index: 0,
        }
    }
}

impl From<&ArchiveEntry> for BigFileRecord {
    fn from(entry: &ArchiveEntry) -> Self {
        Self {
            uncompressed_size: entry.uncompressed_size,
            offset: entry.offset,
            locale: entry.locale,
            compressed_size: entry.compressed_size,
        }
    }
}

fn read_tables<R: Read + Seek>(reader: &mut R, endian: Endian) -> Result<Vec<ArchiveEntry>> {
    let count: u32 = reader.read_type(endian)?;

    let hashes = (0..count)
        .map(|_| reader.read_type::<u32>(endian).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;

    hashes
        .into_iter()
        .map(|name_hash| -> Result<ArchiveEntry> {
            let record = BigFileRecord::read_options(reader, endian, ())?;
            trace!(name_hash, ?record, "read entry");
            Ok(record.into_entry(name_hash))
        })
        .collect()
}

fn write_tables<W: Write + Seek>(
    writer: &mut W,
    endian: Endian,
    entries: &[ArchiveEntry],
) -> Result<()> {
    writer.write_type(&(entries.len() as u32), endian)?;

    for entry in entries {
        writer.write_type(&entry.name_hash, endian)?;
    }

    for entry in entries {
        BigFileRecord::from(entry).write_options(writer, endian, ())?;
    }

    Ok(())
}

/// Entries in the order a V1 index stores them
///
/// Two stable passes, by size and then by hash. The hash pass decides the order,
/// the relative order of entries sharing a hash is not part of the format.
pub(crate) fn v1_order(entries: &[ArchiveEntry]) -> Vec<ArchiveEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.uncompressed_size);
    sorted.sort_by_key(|e| e.name_hash);
    sorted
}

/// Entries in the order a V2 index stores them, by hash then by size
pub(crate) fn v2_order(entries: &[ArchiveEntry]) -> Vec<ArchiveEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| (e.name_hash, e.uncompressed_size));
    sorted
}

#[instrument(skip(reader), err)]
pub(crate) fn read_v1<R: Read + Seek>(reader: &mut R, options: ReadOptions) -> Result<ArchiveIndex> {
    let entries = read_tables(reader, options.endian)?;

    Ok(ArchiveIndex {
        block_alignment: options.block_alignment,
        entries,
        ..ArchiveIndex::new(ArchiveFormat::BigFileV1, options.endian)
    })
}

#[instrument(skip(reader), err)]
pub(crate) fn read_v2<R: Read + Seek>(reader: &mut R) -> Result<ArchiveIndex> {
    let raw_alignment = reader.read_u32::<LittleEndian>()?;
    let (endian, block_alignment) = match raw_alignment {
        0x7FF0_0000 | 0x6230_0000 => (Endian::Little, raw_alignment),
        0x0000_F07F | 0x0000_3062 => (Endian::Big, raw_alignment.swap_bytes()),
        _ => {
            return Err(Error::MalformedHeader(format!(
                "unexpected file alignment {raw_alignment:#010X} (should have been 0x7FF00000)"
            )))
        }
    };

    let base_path = read_fixed_string(reader, V2_BASE_PATH_LENGTH)?;
    let entries = read_tables(reader, endian)?;

    if let Some(entry) = entries.iter().find(|e| e.compressed_size != 0) {
        return Err(Error::UnsupportedFeature(format!(
            "entry {entry} has a compressed size of {}",
            entry.compressed_size
        )));
    }

    Ok(ArchiveIndex {
        block_alignment,
        base_path,
        entries,
        ..ArchiveIndex::new(ArchiveFormat::BigFileV2, endian)
    })
}

pub(crate) fn write_v1<W: Write + Seek>(index: &ArchiveIndex, writer: &mut W) -> Result<()> {
    write_tables(writer, index.endian, &v1_order(&index.entries))
}

pub(crate) fn write_v2<W: Write + Seek>(index: &ArchiveIndex, writer: &mut W) -> Result<()> {
    if !matches!(index.block_alignment, 0x7FF0_0000 | 0x6230_0000) {
        return Err(Error::ConstraintViolation(format!(
            "block alignment {:#010X} can't be stored in a V2 index",
            index.block_alignment
        )));
    }

    if let Some(entry) = index.entries.iter().find(|e| e.compressed_size != 0) {
        return Err(Error::ConstraintViolation(format!(
            "entry {entry} is compressed, V2 indexes only store raw entries"
        )));
    }

    writer.write_type(&index.block_alignment, index.endian)?;
    write_fixed_string(writer, &index.base_path, V2_BASE_PATH_LENGTH)?;
    write_tables(writer, index.endian, &v2_order(&index.entries))
}
