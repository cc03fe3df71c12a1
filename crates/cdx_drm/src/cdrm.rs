//! CDRM block compression envelope.
//!
//! | Offset (bytes) | Field            | Description                                          |
//! |----------------|------------------|------------------------------------------------------|
//! | 0x0000         | Magic            | 4 bytes: `CDRM`                                      |
//! | 0x0004         | Version          | 4 bytes: 0, or 2 (byte swapped for big endian)       |
//! | 0x0008         | Count            | 4 bytes: number of blocks                            |
//! | 0x000C         | Padding          | 4 bytes: bytes between the block table and the data  |
//! | 0x0010         | Blocks           | 8 bytes each, the table is padded to 16 bytes        |
//!
//! Version 0 has no byte order marker. Its count is stored in the envelope's byte
//! order and the padding field is unused, the data simply starts at the next 16
//! byte boundary.
//!
//! Each block descriptor holds the block type in the low 8 bits of its first word,
//! the uncompressed size in the upper 24 bits, followed by the compressed size.
//! Every block starts on a 16 byte boundary, both in the envelope and once decompressed.

use std::io::{self, Read, Seek, SeekFrom, Take};

use binrw::{BinRead, BinReaderExt, BinWrite, Endian};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use tracing::{debug, instrument, trace};

use crate::error::{Error, Result};

/// `CDRM` read as a big endian integer
pub const CDRM_MAGIC: u32 = 0x4344_524D;

/// Largest block count a version 0 envelope stores without swapping its bytes
const MAX_LEGACY_COUNT: u32 = 0x7F_FFFF;

/// Rounds `value` up to the next multiple of 16
#[inline]
pub const fn align16(value: u64) -> u64 {
    (value + 15) & !15
}

/// How a single block is stored
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// Stored as is
    Raw = 1,

    /// Zlib stream
    Zlib = 2,
}

impl TryFrom<u8> for BlockKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(BlockKind::Raw),
            2 => Ok(BlockKind::Zlib),
            _ => Err(Error::UnsupportedFeature(format!("unknown block type {value}"))),
        }
    }
}

/// One entry of the block table
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Block type in bits 0..8, uncompressed size in bits 8..32
    pub flags: u32,

    /// Number of bytes stored in the envelope
    pub compressed_size: u32,
}

impl BlockDescriptor {
    /// Describe a block, `uncompressed_size` must fit in 24 bits
    pub fn new(kind: BlockKind, uncompressed_size: u32, compressed_size: u32) -> Self {
        Self {
            flags: ((uncompressed_size & 0xFF_FFFF) << 8) | kind as u32,
            compressed_size,
        }
    }

    /// Raw block type
    pub fn block_type(&self) -> u8 {
        (self.flags & 0xFF) as u8
    }

    /// Size of the block once decompressed
    pub fn uncompressed_size(&self) -> u32 {
        (self.flags >> 8) & 0xFF_FFFF
    }

    /// Block type, failing on types that are not known
    pub fn kind(&self) -> Result<BlockKind> {
        BlockKind::try_from(self.block_type())
    }
}

enum BlockReader<'a, R: Read> {
    Raw(Take<&'a mut R>),
    Zlib(Box<ZlibDecoder<Take<&'a mut R>>>),
}

impl<'a, R: Read> BlockReader<'a, R> {
    fn new(reader: &'a mut R, kind: BlockKind, compressed_size: u64) -> Self {
        let limit_reader = reader.take(compressed_size);
        match kind {
            BlockKind::Raw => BlockReader::Raw(limit_reader),
            BlockKind::Zlib => BlockReader::Zlib(Box::new(ZlibDecoder::new(limit_reader))),
        }
    }
}

impl<R: Read> Read for BlockReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BlockReader::Raw(r) => r.read(buf),
            BlockReader::Zlib(r) => r.read(buf),
        }
    }
}

/// Whether a CDRM envelope starts at the current position, the position is left unchanged
pub fn is_compressed<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    let start = reader.stream_position()?;
    let magic = reader.read_u32::<BigEndian>();
    reader.seek(SeekFrom::Start(start))?;

    match magic {
        Ok(magic) => Ok(magic == CDRM_MAGIC),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Decompress the envelope at the current position into one buffer
///
/// Every block lands at a 16 byte aligned offset of the output, gaps between
/// blocks are zero filled. The output ends with the last block, without padding.
#[instrument(skip(reader), err)]
pub fn decompress<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>> {
    let base = reader.stream_position()?;

    let magic = reader.read_u32::<BigEndian>()?;
    if magic != CDRM_MAGIC {
        return Err(Error::MalformedHeader(format!(
            "bad magic {magic:#010X}, expected CDRM"
        )));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    let (endian, count, padding) = match version {
        0 => {
            let raw_count = reader.read_u32::<LittleEndian>()?;
            let (endian, count) = if raw_count > MAX_LEGACY_COUNT {
                (Endian::Big, raw_count.swap_bytes())
            } else {
                (Endian::Little, raw_count)
            };

            let _reserved: u32 = reader.read_type(endian)?;

            let table_end = base + 16 + count as u64 * 8;
            (endian, count, align16(table_end) - table_end)
        }
        _ if version == 2 || version.swap_bytes() == 2 => {
            let endian = if version == 2 { Endian::Little } else { Endian::Big };
            let count: u32 = reader.read_type(endian)?;
            let padding: u32 = reader.read_type(endian)?;
            (endian, count, padding as u64)
        }
        _ => {
            return Err(Error::MalformedHeader(format!(
                "unsupported version {version:#010X}"
            )))
        }
    };

    debug!(version, ?endian, count, padding, "read CDRM header");

    let start_of_data = base + 16 + count as u64 * 8 + padding;

    let table_size = align16(count as u64 * 8);
    let mut table = Vec::new();
    let read = reader.by_ref().take(table_size).read_to_end(&mut table)? as u64;
    if read != table_size {
        return Err(Error::MalformedHeader(format!(
            "table of {count} blocks needs {table_size} bytes but the envelope ended after {read}"
        )));
    }
    let mut table = io::Cursor::new(table);
    let blocks = (0..count)
        .map(|_| BlockDescriptor::read_options(&mut table, endian, ()).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;

    let position = reader.stream_position()?;
    if position != start_of_data {
        return Err(Error::MalformedHeader(format!(
            "block data should start at {start_of_data:#X} but the table ends at {position:#X}"
        )));
    }

    let mut output = Vec::new();
    let mut offset = 0u64;
    for (index, block) in blocks.iter().enumerate() {
        trace!(index, ?block, "decompressing block");

        let kind = block.kind()?;
        let compressed_size = block.compressed_size as u64;
        let uncompressed_size = block.uncompressed_size() as u64;
        let next_position = reader.stream_position()? + align16(compressed_size);

        if kind == BlockKind::Raw && compressed_size != uncompressed_size {
            return Err(Error::MalformedHeader(format!(
                "raw block {index} has a compressed size of {compressed_size} but should hold {uncompressed_size} bytes"
            )));
        }

        output.resize(offset as usize, 0);
        let read = BlockReader::new(reader, kind, compressed_size)
            .take(uncompressed_size)
            .read_to_end(&mut output)? as u64;

        if read != uncompressed_size {
            return Err(Error::MalformedHeader(format!(
                "block {index} decompressed to {read} bytes instead of {uncompressed_size}"
            )));
        }

        offset += align16(uncompressed_size);
        reader.seek(SeekFrom::Start(next_position))?;
    }

    debug!(size = output.len(), blocks = blocks.len(), "decompressed CDRM envelope");
    Ok(output)
}
