//! Relocation tables stored in front of section payloads.
//!
//! A table starts with five record counts followed by the records of each kind in
//! order. The records describe pointer-sized slots of the payload that are patched
//! when a section is loaded:
//!
//! | Kind | Size    | Target                                                        |
//! |------|---------|---------------------------------------------------------------|
//! | 0    | 8 bytes | another offset of the same payload                            |
//! | 1    | 8 bytes | an offset in the payload of another section, by index         |
//! | 2    | 4 bytes | the payload of the section matching an id and a section type  |
//! | 3    | 4 bytes | unknown, kept as is                                           |
//! | 4    | 4 bytes | same as kind 2                                                |
//!
//! Records are only decoded and encoded here, applying them is up to the caller.

use std::io::{Cursor, Seek, Write};

use binrw::{BinReaderExt, BinWriterExt, Endian};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::section::SectionType;

/// Size of the count header
const HEADER_SIZE: u64 = 20;

/// Patch `pointer_offset` to point at `data_offset`, both inside the same payload
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LocalRelocation {
    /// Offset of the slot to patch
    pub pointer_offset: u32,
    /// Offset the slot points to once patched
    pub data_offset: u32,
}

impl LocalRelocation {
    /// Unpack a record, pointer offset in the high word
    pub fn from_raw(value: u64) -> Self {
        Self {
            pointer_offset: (value >> 32) as u32,
            data_offset: value as u32,
        }
    }

    /// Pack the record
    pub fn to_raw(&self) -> u64 {
        ((self.pointer_offset as u64) << 32) | self.data_offset as u64
    }
}

/// Patch `pointer_offset` to point at `data_offset` inside the payload of section `section_index`
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RemoteRelocation {
    /// 14 bits
    pub section_index: u16,
    /// 24 bits, stored divided by 4
    pub pointer_offset: u32,
    /// 26 bits
    pub data_offset: u32,
}

impl RemoteRelocation {
    /// Unpack a record
    pub fn from_raw(value: u64) -> Self {
        Self {
            section_index: (value & 0x3FFF) as u16,
            pointer_offset: (((value >> 14) & 0xFF_FFFF) * 4) as u32,
            data_offset: (value >> 38) as u32,
        }
    }

    /// Pack the record, failing when a field does not fit its bit width
    pub fn to_raw(&self) -> Result<u64> {
        if self.section_index > 0x3FFF {
            return Err(Error::ConstraintViolation(format!(
                "section index {} does not fit in 14 bits",
                self.section_index
            )));
        }
        let pointer = scaled_pointer(self.pointer_offset, 0xFF_FFFF)?;
        if self.data_offset >= 1 << 26 {
            return Err(Error::ConstraintViolation(format!(
                "data offset {:#X} does not fit in 26 bits",
                self.data_offset
            )));
        }

        Ok(self.section_index as u64 | (pointer as u64) << 14 | (self.data_offset as u64) << 38)
    }
}

/// Patch `pointer_offset` to point at the payload of the section whose id is stored
/// at `pointer_offset` and whose type is `section_type`
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TypedRelocation {
    /// 25 bits, stored divided by 4
    pub pointer_offset: u32,
    /// 7 bits, raw [`SectionType`]
    pub section_type: u8,
}

impl TypedRelocation {
    /// Unpack a record
    pub fn from_raw(value: u32) -> Self {
        Self {
            pointer_offset: (value & 0x1FF_FFFF) * 4,
            section_type: ((value >> 25) & 0x7F) as u8,
        }
    }

    /// Pack the record, failing when a field does not fit its bit width
    pub fn to_raw(&self) -> Result<u32> {
        let pointer = scaled_pointer(self.pointer_offset, 0x1FF_FFFF)?;
        if self.section_type > 0x7F {
            return Err(Error::ConstraintViolation(format!(
                "section type {} does not fit in 7 bits",
                self.section_type
            )));
        }

        Ok(pointer | (self.section_type as u32) << 25)
    }

    /// Target section type, `None` for values outside of [`SectionType`]
    pub fn section_type(&self) -> Option<SectionType> {
        SectionType::try_from(self.section_type).ok()
    }
}

fn scaled_pointer(pointer_offset: u32, max: u32) -> Result<u32> {
    if pointer_offset % 4 != 0 || pointer_offset / 4 > max {
        return Err(Error::ConstraintViolation(format!(
            "pointer offset {pointer_offset:#X} is not a multiple of 4 below {:#X}",
            (max as u64 + 1) * 4
        )));
    }
    Ok(pointer_offset / 4)
}

/// Decoded relocation table of one section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverTable {
    /// Kind 0
    pub local: Vec<LocalRelocation>,
    /// Kind 1
    pub remote: Vec<RemoteRelocation>,
    /// Kind 2
    pub typed: Vec<TypedRelocation>,
    /// Kind 3
    pub raw: Vec<u32>,
    /// Kind 4
    pub typed_secondary: Vec<TypedRelocation>,
}

impl ResolverTable {
    /// Decode a table from the bytes stored in front of a payload
    ///
    /// `counts` is the byte order of the count header, `records` the byte order of the
    /// records themselves. Bytes after the last record are ignored.
    #[instrument(skip(data), fields(size = data.len()), err)]
    pub fn read(data: &[u8], counts: Endian, records: Endian) -> Result<Self> {
        if (data.len() as u64) < HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "resolver table of {} bytes is smaller than its header",
                data.len()
            )));
        }

        let mut reader = Cursor::new(data);
        let mut count = [0u32; 5];
        for value in count.iter_mut() {
            *value = reader.read_type(counts)?;
        }
        trace!(?count, "read resolver counts");

        let required = HEADER_SIZE
            + 8 * (count[0] as u64 + count[1] as u64)
            + 4 * (count[2] as u64 + count[3] as u64 + count[4] as u64);
        if required > data.len() as u64 {
            return Err(Error::MalformedHeader(format!(
                "resolver counts {count:?} need {required} bytes but the table has {}",
                data.len()
            )));
        }

        let local = (0..count[0])
            .map(|_| -> Result<LocalRelocation> { Ok(LocalRelocation::from_raw(reader.read_type(records)?)) })
            .collect::<Result<Vec<_>>>()?;
        let remote = (0..count[1])
            .map(|_| -> Result<RemoteRelocation> { Ok(RemoteRelocation::from_raw(reader.read_type(records)?)) })
            .collect::<Result<Vec<_>>>()?;
        let typed = (0..count[2])
            .map(|_| -> Result<TypedRelocation> { Ok(TypedRelocation::from_raw(reader.read_type(records)?)) })
            .collect::<Result<Vec<_>>>()?;
        let raw = (0..count[3])
            .map(|_| reader.read_type::<u32>(records).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;
        let typed_secondary = (0..count[4])
            .map(|_| -> Result<TypedRelocation> { Ok(TypedRelocation::from_raw(reader.read_type(records)?)) })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            local,
            remote,
            typed,
            raw,
            typed_secondary,
        })
    }

    /// Encoded size in bytes
    pub fn size(&self) -> u64 {
        HEADER_SIZE
            + 8 * (self.local.len() + self.remote.len()) as u64
            + 4 * (self.typed.len() + self.raw.len() + self.typed_secondary.len()) as u64
    }

    /// Whether the table holds no record
    pub fn is_empty(&self) -> bool {
        self.size() == HEADER_SIZE
    }

    /// Encode the table, failing when a field does not fit its bit width
    pub fn write<W: Write + Seek>(&self, writer: &mut W, counts: Endian, records: Endian) -> Result<()> {
        let remote = self
            .remote
            .iter()
            .map(RemoteRelocation::to_raw)
            .collect::<Result<Vec<_>>>()?;
        let typed = self
            .typed
            .iter()
            .map(TypedRelocation::to_raw)
            .collect::<Result<Vec<_>>>()?;
        let typed_secondary = self
            .typed_secondary
            .iter()
            .map(TypedRelocation::to_raw)
            .collect::<Result<Vec<_>>>()?;

        for count in [
            self.local.len(),
            remote.len(),
            typed.len(),
            self.raw.len(),
            typed_secondary.len(),
        ] {
            writer.write_type(&(count as u32), counts)?;
        }

        for record in &self.local {
            writer.write_type(&record.to_raw(), records)?;
        }
        for value in &remote {
            writer.write_type(value, records)?;
        }
        for value in typed.iter().chain(&self.raw).chain(&typed_secondary) {
            writer.write_type(value, records)?;
        }

        Ok(())
    }
}
