//! Base types for the structure of an archive index.

use std::fmt;

pub use binrw::Endian;

use crate::error::{Error, Result};
use crate::locale::Locale;

/// Size in bytes of the addressing unit used by every archive offset
pub const BLOCK_SIZE: u32 = 2048;

/// Default number of bytes per volume used by retail archives
pub const DEFAULT_BLOCK_ALIGNMENT: u32 = 0x7FF0_0000;

/// Rounds `value` up to the next multiple of `alignment`, which must be a power of two
#[inline]
pub const fn align(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Number of 2048 byte blocks needed to store `length` bytes
#[inline]
pub const fn block_count(length: u64) -> u64 {
    align(length, BLOCK_SIZE as u64) / BLOCK_SIZE as u64
}

/// The on-disk layout of an archive index
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// No magic, caller declared endianness, hash table followed by an entry table
    BigFileV1,

    /// Alignment field and 64 byte base path in front of the V1 layout
    BigFileV2,

    /// `TAFS` magic, 32 byte base path and bit-packed offsets
    Tiger,
}

/// Key identifying an entry in an archive, the content hash is only unique per locale
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    /// Content hash of the normalized path
    pub name_hash: u32,
    /// Locale mask
    pub locale: u32,
}

/// One packed resource
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArchiveEntry {
    /// Content hash of the normalized path
    pub name_hash: u32,

    /// Locale is a bitmask representing what languages this resource is valid for,
    /// [`Locale::DEFAULT`] indicates all languages.
    pub locale: u32,

    /// Size of the resource in bytes
    pub uncompressed_size: u32,

    /// Always 0 for the formats handled here
    pub compressed_size: u32,

    /// BigFile: global block index across all volumes.
    /// Tiger: 2048 aligned byte offset inside the data file selected by `data_index`.
    pub offset: u32,

    /// Tiger only, index of the data file holding this entry
    pub data_index: u8,
}

impl ArchiveEntry {
    /// Lookup key of this entry
    pub fn key(&self) -> EntryKey {
        EntryKey {
            name_hash: self.name_hash,
            locale: self.locale,
        }
    }

    /// Number of blocks this entry occupies in its volume
    pub fn blocks(&self) -> u64 {
        block_count(self.uncompressed_size as u64)
    }
}

impl fmt::Display for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}:{:08X} @ {}:{} ({} bytes) [{}]",
            self.name_hash,
            self.locale,
            self.data_index,
            self.offset,
            self.uncompressed_size,
            Locale(self.locale)
        )
    }
}

/// The decoded index of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveIndex {
    /// Layout the index is read from and written as
    pub format: ArchiveFormat,

    /// Byte order of every multi-byte field
    pub endian: Endian,

    /// Maximum number of bytes stored in a single volume, a multiple of [`BLOCK_SIZE`]
    pub block_alignment: u32,

    /// Platform base path, 64 bytes for BigFile V2 and 32 bytes for Tiger
    pub base_path: String,

    /// Tiger only, number of data files referenced by the entries
    pub data_file_count: u32,

    /// Tiger only, priority shared by every entry
    pub priority: u32,

    /// Entries, in on-disk order after a decode
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveIndex {
    /// Create an empty index for the given format
    pub fn new(format: ArchiveFormat, endian: Endian) -> Self {
        Self {
            format,
            endian,
            block_alignment: DEFAULT_BLOCK_ALIGNMENT,
            base_path: String::new(),
            data_file_count: 0,
            priority: 0,
            entries: Vec::new(),
        }
    }

    /// Number of entries in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of blocks that fit in one volume
    pub fn max_blocks_per_volume(&self) -> u32 {
        self.block_alignment / BLOCK_SIZE
    }

    /// Returns the volume holding `entry` and the byte offset of its data inside that volume
    pub fn locate(&self, entry: &ArchiveEntry) -> Result<(u32, u64)> {
        match self.format {
            ArchiveFormat::Tiger => Ok((entry.data_index as u32, entry.offset as u64)),
            ArchiveFormat::BigFileV1 | ArchiveFormat::BigFileV2 => {
                let max_blocks = self.max_blocks_per_volume();
                if max_blocks == 0 {
                    return Err(Error::ConstraintViolation(format!(
                        "block alignment {:#X} is smaller than a block",
                        self.block_alignment
                    )));
                }
                Ok((
                    entry.offset / max_blocks,
                    (entry.offset % max_blocks) as u64 * BLOCK_SIZE as u64,
                ))
            }
        }
    }

    /// Checks that every entry fits inside its volume and agrees with archive-level values
    pub fn validate(&self) -> Result<()> {
        if self.block_alignment == 0 || self.block_alignment % BLOCK_SIZE != 0 {
            return Err(Error::ConstraintViolation(format!(
                "block alignment {:#X} is not a multiple of {BLOCK_SIZE}",
                self.block_alignment
            )));
        }

        let max_blocks = self.max_blocks_per_volume() as u64;
        for entry in &self.entries {
            let local_block = match self.format {
                ArchiveFormat::Tiger => {
                    if entry.offset % BLOCK_SIZE != 0 {
                        return Err(Error::ConstraintViolation(format!(
                            "entry {entry} is not aligned to {BLOCK_SIZE} bytes"
                        )));
                    }
                    if entry.data_index as u32 >= self.data_file_count {
                        return Err(Error::ConstraintViolation(format!(
                            "entry {entry} references data file {} of {}",
                            entry.data_index, self.data_file_count
                        )));
                    }
                    (entry.offset / BLOCK_SIZE) as u64
                }
                ArchiveFormat::BigFileV1 | ArchiveFormat::BigFileV2 => {
                    (entry.offset % self.max_blocks_per_volume()) as u64
                }
            };

            if local_block + entry.blocks() > max_blocks {
                return Err(Error::ConstraintViolation(format!(
                    "entry {entry} overruns its volume of {max_blocks} blocks"
                )));
            }
        }

        Ok(())
    }
}
