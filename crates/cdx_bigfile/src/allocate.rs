//! Assigning blocks to files when packing an archive.
//!
//! Files are placed first-fit in arrival order. A file that does not fit in the
//! remainder of the current volume starts a new one, a file larger than a whole
//! volume is truncated to the volume size.

use crate::error::{Error, Result};
use crate::types::{block_count, BLOCK_SIZE};

/// Where a file was placed by [`VolumeAllocator::allocate`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Index of the volume receiving the data
    pub volume: u32,

    /// Block index inside that volume
    pub local_block: u32,

    /// Block index across all volumes, the value stored in a BigFile index
    pub global_block: u32,

    /// Number of blocks reserved
    pub blocks: u32,

    /// Number of bytes to copy into the volume
    pub length: u64,

    /// Whether the file was larger than a volume and only `length` bytes of it fit
    pub truncated: bool,
}

impl Allocation {
    /// Byte offset of the data inside its volume
    pub fn byte_offset(&self) -> u64 {
        self.local_block as u64 * BLOCK_SIZE as u64
    }
}

/// Block allocator spanning bounded-size volumes
#[derive(Debug, Clone)]
pub struct VolumeAllocator {
    max_blocks: u32,
    volume: u32,
    local_block: u32,
    global_block: u32,
}

impl VolumeAllocator {
    /// Create an allocator for volumes of `block_alignment` bytes
    ///
    /// The first `header_bytes` of volume 0 are reserved for the index and are
    /// rounded up to whole blocks.
    pub fn new(block_alignment: u32, header_bytes: u32) -> Result<Self> {
        if block_alignment == 0 || block_alignment % BLOCK_SIZE != 0 {
            return Err(Error::ConstraintViolation(format!(
                "block alignment {block_alignment:#X} is not a multiple of {BLOCK_SIZE}"
            )));
        }

        let max_blocks = block_alignment / BLOCK_SIZE;
        let header_blocks = block_count(header_bytes as u64) as u32;
        if header_blocks > max_blocks {
            return Err(Error::ConstraintViolation(format!(
                "index of {header_bytes} bytes does not fit in a volume of {block_alignment} bytes"
            )));
        }

        Ok(Self {
            max_blocks,
            volume: 0,
            local_block: header_blocks,
            global_block: 0,
        })
    }

    /// Number of blocks in a volume
    pub fn max_blocks(&self) -> u32 {
        self.max_blocks
    }

    /// Index of the volume the next allocation would start in
    pub fn current_volume(&self) -> u32 {
        self.volume
    }

    /// Reserve space for a file of `length` bytes
    pub fn allocate(&mut self, length: u64) -> Allocation {
        let mut blocks = block_count(length);
        let mut stored = length;
        let truncated = blocks > self.max_blocks as u64;

        if truncated {
            blocks = self.max_blocks as u64;
            stored = blocks * BLOCK_SIZE as u64;
        }

        let blocks = blocks as u32;
        if self.local_block + blocks > self.max_blocks {
            self.volume += 1;
            self.local_block = 0;
            self.global_block += self.max_blocks;
        }

        let allocation = Allocation {
            volume: self.volume,
            local_block: self.local_block,
            global_block: self.global_block + self.local_block,
            blocks,
            length: stored,
            truncated,
        };

        self.local_block += blocks;
        allocation
    }
}
