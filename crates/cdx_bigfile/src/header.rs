//! Reading and writing archive indexes, dispatching on [`ArchiveFormat`].

use std::io::{Read, Seek, SeekFrom, Write};

use bon::Builder;
use tracing::{debug, instrument};

use crate::bigfile::{self, V2_ALIGNMENTS};
use crate::error::{Error, Result};
use crate::tiger;
use crate::types::{align, ArchiveFormat, ArchiveIndex, Endian, BLOCK_SIZE, DEFAULT_BLOCK_ALIGNMENT};

/// Options for decoding an archive index
///
/// Only BigFile V1 needs these, the other layouts describe themselves.
#[derive(Debug, Clone, Copy, Builder)]
pub struct ReadOptions {
    /// Byte order of a V1 index
    #[builder(default = Endian::Little)]
    pub endian: Endian,

    /// Bytes per volume of a V1 archive
    #[builder(default = DEFAULT_BLOCK_ALIGNMENT)]
    pub block_alignment: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ArchiveFormat {
    /// Size of an index holding `count` entries, rounded up to a whole block
    ///
    /// Packing starts writing data at this offset inside the first volume.
    pub fn estimate_header_size(&self, count: usize) -> u32 {
        let count = count as u64;
        let size = match self {
            ArchiveFormat::BigFileV1 => 4 + 4 * count + 16 * count,
            ArchiveFormat::BigFileV2 => 4 + 64 + 4 + 4 * count + 16 * count,
            ArchiveFormat::Tiger => 4 + 4 + 4 + 4 + 4 + 32 + 16 * count,
        };
        align(size, BLOCK_SIZE as u64) as u32
    }

    /// Guess the format of the index at the current position without consuming any input
    #[instrument(skip(reader), err)]
    pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<ArchiveFormat> {
        let start = reader.stream_position()?;

        let mut magic = [0u8; 4];
        let read = reader.read_exact(&mut magic);
        reader.seek(SeekFrom::Start(start))?;
        if read.is_err() {
            return Err(Error::MalformedHeader(
                "not enough data for an archive header".into(),
            ));
        }

        let format = if &magic == tiger::MAGIC || &magic == tiger::MAGIC_SWAPPED {
            ArchiveFormat::Tiger
        } else if V2_ALIGNMENTS.contains(&u32::from_le_bytes(magic)) {
            ArchiveFormat::BigFileV2
        } else {
            ArchiveFormat::BigFileV1
        };

        debug!(?format, "detected archive format");
        Ok(format)
    }
}

impl ArchiveIndex {
    /// Decode an index of the given format
    ///
    /// Nothing is returned unless the whole index decoded successfully.
    #[instrument(skip(reader), err)]
    pub fn read<R: Read + Seek>(
        reader: &mut R,
        format: ArchiveFormat,
        options: ReadOptions,
    ) -> Result<ArchiveIndex> {
        let index = match format {
            ArchiveFormat::BigFileV1 => bigfile::read_v1(reader, options)?,
            ArchiveFormat::BigFileV2 => bigfile::read_v2(reader)?,
            ArchiveFormat::Tiger => tiger::read(reader, options)?,
        };

        debug!(entries = index.len(), endian = ?index.endian, "read archive index");
        Ok(index)
    }

    /// Detect the format with [`ArchiveFormat::detect`] and decode the index
    pub fn read_detect<R: Read + Seek>(reader: &mut R, options: ReadOptions) -> Result<ArchiveIndex> {
        let format = ArchiveFormat::detect(reader)?;
        Self::read(reader, format, options)
    }

    /// Encode the index in its own format
    #[instrument(skip_all, fields(format = ?self.format, entries = self.len()), err)]
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.validate()?;

        match self.format {
            ArchiveFormat::BigFileV1 => bigfile::write_v1(self, writer),
            ArchiveFormat::BigFileV2 => bigfile::write_v2(self, writer),
            ArchiveFormat::Tiger => tiger::write(self, writer),
        }
    }

    /// Size of this index once written, rounded up to a whole block
    pub fn header_size(&self) -> u32 {
        self.format.estimate_header_size(self.len())
    }
}

/// Read a zero padded ASCII string occupying exactly `length` bytes
pub(crate) fn read_fixed_string<R: Read>(reader: &mut R, length: usize) -> Result<String> {
    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;

    let end = buffer.iter().position(|&c| c == 0).unwrap_or(length);
    buffer.truncate(end);

    if !buffer.is_ascii() {
        return Err(Error::MalformedHeader(
            "base path is not an ASCII string".into(),
        ));
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Write `value` zero padded to exactly `length` bytes
pub(crate) fn write_fixed_string<W: Write>(writer: &mut W, value: &str, length: usize) -> Result<()> {
    if !value.is_ascii() || value.len() > length {
        return Err(Error::ConstraintViolation(format!(
            "base path {value:?} must be ASCII and at most {length} bytes"
        )));
    }

    let mut buffer = vec![0u8; length];
    buffer[..value.len()].copy_from_slice(value.as_bytes());
    writer.write_all(&buffer)?;
    Ok(())
}
