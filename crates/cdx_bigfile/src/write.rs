//! Types for packing archives
//!

use std::io::{self, Read, Seek, SeekFrom, Write};

use bon::Builder;
use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::allocate::{Allocation, VolumeAllocator};
use crate::error::{CapacityOverflow, Error, Result};
use crate::types::{ArchiveEntry, ArchiveFormat, ArchiveIndex, EntryKey, Endian, DEFAULT_BLOCK_ALIGNMENT};
use crate::volume::VolumeSink;

/// Tiger records only have 4 bits for the data file index
const TIGER_MAX_DATA_FILES: u32 = 16;

/// Options for how the archive should be packed
#[derive(Debug, Clone, Builder)]
pub struct PackOptions {
    /// Index layout to write
    #[builder(default = ArchiveFormat::BigFileV2)]
    pub format: ArchiveFormat,

    /// Byte order of the index
    #[builder(default = Endian::Little)]
    pub endian: Endian,

    /// Maximum number of bytes in a single volume
    #[builder(default = DEFAULT_BLOCK_ALIGNMENT)]
    pub block_alignment: u32,

    /// Platform base path, ignored by BigFile V1
    #[builder(default, into)]
    pub base_path: String,

    /// Tiger priority
    #[builder(default)]
    pub priority: u32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// What a finished packer hands back
#[derive(Debug)]
pub struct PackOutput<S> {
    /// The index written to volume 0
    pub index: ArchiveIndex,

    /// Files that were only partially stored
    pub warnings: Vec<CapacityOverflow>,

    /// The volume storage
    pub volumes: S,
}

/// Archive packer
///
/// Files are copied into 2048 byte aligned blocks in the order they are added.
/// At most one volume is open at a time and the index is written to volume 0
/// once every file has been stored.
///
/// ```
/// # fn doit() -> cdx_bigfile::error::Result<()>
/// # {
/// use cdx_bigfile::{ArchivePacker, MemoryVolumes, PackOptions};
///
/// let mut packer = ArchivePacker::new(MemoryVolumes::new(), PackOptions::default(), 1)?;
///
/// let data = b"Hello, World!";
/// packer.add_file(0x1234_5678, 0xFFFF_FFFF, &mut &data[..], data.len() as u64)?;
///
/// let output = packer.finish()?;
/// assert_eq!(output.index.len(), 1);
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct ArchivePacker<S: VolumeSink> {
    volumes: S,
    options: PackOptions,
    expected_files: usize,
    allocator: VolumeAllocator,
    current: Option<(u32, S::Volume)>,
    created_volumes: u32,
    entries: IndexMap<EntryKey, ArchiveEntry>,
    warnings: Vec<CapacityOverflow>,
}

impl<S: VolumeSink> ArchivePacker<S> {
    /// Prepare to pack `file_count` files
    ///
    /// The file count decides how much room is reserved for the index at the
    /// start of volume 0, adding more files than announced fails.
    pub fn new(volumes: S, options: PackOptions, file_count: usize) -> Result<Self> {
        if options.format == ArchiveFormat::Tiger && options.priority > 0x7F {
            return Err(Error::ConstraintViolation(format!(
                "priority {} does not fit in 7 bits",
                options.priority
            )));
        }

        let header_size = options.format.estimate_header_size(file_count);
        let allocator = VolumeAllocator::new(options.block_alignment, header_size)?;
        debug!(header_size, max_blocks = allocator.max_blocks(), "starting archive");

        Ok(Self {
            volumes,
            options,
            expected_files: file_count,
            allocator,
            current: None,
            created_volumes: 0,
            entries: IndexMap::with_capacity(file_count),
            warnings: Vec::new(),
        })
    }

    /// Number of files added so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file has been added yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy `length` bytes from `reader` into the archive
    ///
    /// A file larger than a volume is truncated to fit, which is reported through
    /// [`PackOutput::warnings`]. The open volume is closed when this fails.
    #[instrument(skip(self, reader), err)]
    pub fn add_file<R: Read>(
        &mut self,
        name_hash: u32,
        locale: u32,
        reader: &mut R,
        length: u64,
    ) -> Result<ArchiveEntry> {
        match self.store(name_hash, locale, reader, length) {
            Ok(entry) => Ok(entry),
            Err(err) => {
                if let Err(close_err) = self.close_current() {
                    warn!(%close_err, "unable to close volume after a failed write");
                }
                Err(err)
            }
        }
    }

    fn store<R: Read>(
        &mut self,
        name_hash: u32,
        locale: u32,
        reader: &mut R,
        length: u64,
    ) -> Result<ArchiveEntry> {
        let key = EntryKey { name_hash, locale };

        if self.entries.len() >= self.expected_files {
            return Err(Error::ConstraintViolation(format!(
                "the archive was started for {} files",
                self.expected_files
            )));
        }

        if self.entries.contains_key(&key) {
            return Err(Error::ConstraintViolation(format!(
                "file {name_hash:08X} with locale {locale:08X} was already added"
            )));
        }

        let allocation = self.allocator.allocate(length);

        if self.options.format == ArchiveFormat::Tiger && allocation.volume >= TIGER_MAX_DATA_FILES {
            return Err(Error::ConstraintViolation(format!(
                "Tiger archives can't span more than {TIGER_MAX_DATA_FILES} data files"
            )));
        }

        if allocation.truncated {
            let overflow = CapacityOverflow {
                name_hash,
                locale,
                length,
                stored: allocation.length,
            };
            warn!("{overflow}");
            self.warnings.push(overflow);
        }

        self.copy_into_volume(&allocation, reader)?;

        let (offset, data_index) = match self.options.format {
            ArchiveFormat::Tiger => (allocation.byte_offset() as u32, allocation.volume as u8),
            ArchiveFormat::BigFileV1 | ArchiveFormat::BigFileV2 => (allocation.global_block, 0),
        };

        let entry = ArchiveEntry {
            name_hash,
            locale,
            uncompressed_size: allocation.length as u32,
            compressed_size: 0,
            offset,
            data_index,
        };

        self.entries.insert(key, entry);
        Ok(entry)
    }

    fn copy_into_volume<R: Read>(&mut self, allocation: &Allocation, reader: &mut R) -> Result<()> {
        let volume = self.open(allocation.volume)?;
        volume.seek(SeekFrom::Start(allocation.byte_offset()))?;

        let copied = io::copy(&mut reader.take(allocation.length), volume)?;
        if copied != allocation.length {
            return Err(Error::IOError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes but the input ended after {copied}", allocation.length),
            )));
        }

        Ok(())
    }

    fn open(&mut self, index: u32) -> Result<&mut S::Volume> {
        let volume = match self.current.take() {
            Some((current, volume)) if current == index => volume,
            previous => {
                if let Some((previous, volume)) = previous {
                    self.volumes.close(previous, volume)?;
                }

                if index < self.created_volumes {
                    self.volumes.reopen(index)?
                } else {
                    debug!(index, "rolling to a new volume");
                    self.created_volumes = index + 1;
                    self.volumes.create(index)?
                }
            }
        };

        Ok(&mut self.current.insert((index, volume)).1)
    }

    fn close_current(&mut self) -> Result<()> {
        match self.current.take() {
            Some((index, volume)) => self.volumes.close(index, volume),
            None => Ok(()),
        }
    }

    /// Close the last volume and write the index to volume 0
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<PackOutput<S>> {
        self.close_current()?;

        let header_size = self.options.format.estimate_header_size(self.expected_files);
        let is_tiger = self.options.format == ArchiveFormat::Tiger;
        let volume_count = self.created_volumes.max(1);

        let index = ArchiveIndex {
            block_alignment: self.options.block_alignment,
            base_path: self.options.base_path.clone(),
            data_file_count: if is_tiger { volume_count } else { 0 },
            priority: if is_tiger { self.options.priority } else { 0 },
            entries: self.entries.into_values().collect(),
            ..ArchiveIndex::new(self.options.format, self.options.endian)
        };

        let mut volume = if self.created_volumes > 0 {
            self.volumes.reopen(0)?
        } else {
            self.volumes.create(0)?
        };

        let written = write_index(&index, &mut volume, header_size as u64);
        self.volumes.close(0, volume)?;
        written?;

        debug!(entries = index.len(), volumes = volume_count, "finished archive");

        Ok(PackOutput {
            index,
            warnings: self.warnings,
            volumes: self.volumes,
        })
    }
}

/// Write the index at the start of volume 0, which always spans at least the reserved header blocks
fn write_index<W: Write + Seek>(index: &ArchiveIndex, volume: &mut W, header_size: u64) -> Result<()> {
    volume.seek(SeekFrom::Start(0))?;
    index.write(volume)?;

    let end = volume.seek(SeekFrom::End(0))?;
    if end < header_size {
        volume.seek(SeekFrom::Start(header_size - 1))?;
        volume.write_all(&[0])?;
    }

    Ok(())
}
