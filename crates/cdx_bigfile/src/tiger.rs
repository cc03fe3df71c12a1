//! Tiger archive (`TAFS`) index layout.
//!
//! | Offset (bytes) | Field            | Description                                       |
//! |----------------|------------------|---------------------------------------------------|
//! | 0x0000         | Magic            | 4 bytes: `TAFS`, or `SFAT` for big endian files   |
//! | 0x0004         | Version          | 4 bytes: always 3                                 |
//! | 0x0008         | Data File Count  | 4 bytes: number of `.NNN.tiger` data files        |
//! | 0x000C         | Entry Count      | 4 bytes: number of records that follow            |
//! | 0x0010         | Priority         | 4 bytes: priority shared by every record          |
//! | 0x0014         | Base Path        | 32 bytes: zero padded ASCII                       |
//! | 0x0034         | Records          | 16 bytes each                                     |
//!
//! The last field of a record packs the entry's location: bits 31..11 hold the
//! 2048 aligned byte offset, bits 10..4 the priority and bits 3..0 the data file index.

use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::header::{read_fixed_string, write_fixed_string, ReadOptions};
use crate::types::{ArchiveEntry, ArchiveFormat, ArchiveIndex, Endian};

pub(crate) const MAGIC: &[u8; 4] = b"TAFS";
pub(crate) const MAGIC_SWAPPED: &[u8; 4] = b"SFAT";
const VERSION: u32 = 3;
const BASE_PATH_LENGTH: usize = 32;

const OFFSET_MASK: u32 = 0xFFFF_F800;
const PRIORITY_MASK: u32 = 0x7F;
const DATA_INDEX_MASK: u32 = 0xF;

/// One record of a Tiger index
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TigerRecord {
    /// Content hash of the normalized path
    pub name_hash: u32,

    /// Locale mask
    pub locale: u32,

    /// Size of the resource in bytes
    pub size: u32,

    /// Offset, priority and data file index packed together
    pub packed_offset: u32,
}

impl TigerRecord {
    /// Block aligned byte offset inside the data file
    pub fn offset(&self) -> u32 {
        self.packed_offset & OFFSET_MASK
    }

    /// Priority of the archive this record was written for
    pub fn priority(&self) -> u8 {
        ((self.packed_offset >> 4) & PRIORITY_MASK) as u8
    }

    /// Index of the data file holding the resource
    pub fn data_index(&self) -> u8 {
        (self.packed_offset & DATA_INDEX_MASK) as u8
    }

    /// Pack an entry, the offset must already be 2048 aligned
    pub fn pack(entry: &ArchiveEntry, priority: u32) -> Result<Self> {
        if entry.offset & !OFFSET_MASK != 0 {
            return Err(Error::ConstraintViolation(format!(
                "entry {entry} offset must be aligned to 2048 bytes"
            )));
        }

        if priority > PRIORITY_MASK {
            return Err(Error::ConstraintViolation(format!(
                "priority {priority} does not fit in 7 bits"
            )));
        }

        if entry.data_index as u32 > DATA_INDEX_MASK {
            return Err(Error::ConstraintViolation(format!(
                "entry {entry} data file index does not fit in 4 bits"
            )));
        }

        Ok(Self {
            name_hash: entry.name_hash,
            locale: entry.locale,
            size: entry.uncompressed_size,
            packed_offset: entry.offset | (priority << 4) | entry.data_index as u32,
        })
    }
}

#[instrument(skip(reader), err)]
pub(crate) fn read<R: Read + Seek>(reader: &mut R, options: ReadOptions) -> Result<ArchiveIndex> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;

    let endian = match &magic {
        MAGIC => Endian::Little,
        MAGIC_SWAPPED => Endian::Big,
        _ => {
            return Err(Error::MalformedHeader(format!(
                "bad magic {magic:02X?}, expected TAFS"
            )))
        }
    };

    let version: u32 = reader.read_type(endian)?;
    if version != VERSION {
        return Err(Error::MalformedHeader(format!(
            "unsupported version {version}, expected {VERSION}"
        )));
    }

    let data_file_count: u32 = reader.read_type(endian)?;
    let entry_count: u32 = reader.read_type(endian)?;
    let priority: u32 = reader.read_type(endian)?;
    let base_path = read_fixed_string(reader, BASE_PATH_LENGTH)?;

    let entries = (0..entry_count)
        .map(|_| -> Result<ArchiveEntry> {
            let record = TigerRecord::read_options(reader, endian, ())?;
            trace!(?record, "read record");

            if record.priority() as u32 != priority {
                return Err(Error::MalformedHeader(format!(
                    "record {:08X} has priority {} but the archive has priority {priority}",
                    record.name_hash,
                    record.priority()
                )));
            }

            if record.data_index() as u32 >= data_file_count {
                return Err(Error::MalformedHeader(format!(
                    "record {:08X} references data file {} of {data_file_count}",
                    record.name_hash,
                    record.data_index()
                )));
            }

            Ok(ArchiveEntry {
                name_hash: record.name_hash,
                locale: record.locale,
                uncompressed_size: record.size,
                compressed_size: 0,
                offset: record.offset(),
                data_index: record.data_index(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ArchiveIndex {
        block_alignment: options.block_alignment,
        base_path,
        data_file_count,
        priority,
        entries,
        ..ArchiveIndex::new(ArchiveFormat::Tiger, endian)
    })
}

pub(crate) fn write<W: Write + Seek>(index: &ArchiveIndex, writer: &mut W) -> Result<()> {
    let endian = index.endian;

    let records = index
        .entries
        .iter()
        .map(|entry| TigerRecord::pack(entry, index.priority))
        .collect::<Result<Vec<_>>>()?;

    writer.write_all(match endian {
        Endian::Little => MAGIC,
        Endian::Big => MAGIC_SWAPPED,
    })?;
    writer.write_type(&VERSION, endian)?;
    writer.write_type(&index.data_file_count, endian)?;
    writer.write_type(&(records.len() as u32), endian)?;
    writer.write_type(&index.priority, endian)?;
    write_fixed_string(writer, &index.base_path, BASE_PATH_LENGTH)?;

    for record in records {
        record.write_options(writer, endian, ())?;
    }

    Ok(())
}
