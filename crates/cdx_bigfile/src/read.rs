//! Types for reading archives
//!

use std::fmt::{self, Debug};
use std::io::{Read, Seek, SeekFrom, Take};

use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::detect::{detect_extension, DETECT_LENGTH};
use crate::error::{Error, FileNotFoundError, Result};
use crate::header::ReadOptions;
use crate::types::{ArchiveEntry, ArchiveFormat, ArchiveIndex, EntryKey};
use crate::volume::VolumeSource;

/// A struct for reading an entry from an archive
pub struct ArchiveFile<'a, R: Read + Seek> {
    entry: ArchiveEntry,
    reader: Take<&'a mut R>,
}

impl<R: Read + Seek> Debug for ArchiveFile<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ArchiveFile({})", self.entry)
    }
}

impl<R: Read + Seek> ArchiveFile<'_, R> {
    /// Get the content hash of the file
    pub fn name_hash(&self) -> u32 {
        self.entry.name_hash
    }

    /// Get the locale mask of the file
    pub fn locale(&self) -> u32 {
        self.entry.locale
    }

    /// Get the size of the file, in bytes
    pub fn size(&self) -> u64 {
        self.entry.uncompressed_size as u64
    }

    /// Get the index entry describing the file
    pub fn entry(&self) -> &ArchiveEntry {
        &self.entry
    }
}

impl<R: Read + Seek> Read for ArchiveFile<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Archive reader
///
/// The index is decoded from volume 0. Data is read from whichever volume holds
/// an entry, only one volume is open at any time.
///
/// ```no_run
/// use std::io::prelude::*;
/// use cdx_bigfile::{ArchiveReader, FileVolumes, ReadOptions};
///
/// fn list_archive_contents() -> cdx_bigfile::error::Result<()> {
///     let volumes = FileVolumes::from_path("bigfile.000");
///     let mut archive = ArchiveReader::open(volumes, None, ReadOptions::default())?;
///
///     for entry in archive.entries_by_offset()? {
///         let extension = archive.detect_extension(&entry)?;
///         println!("{:08X}.{extension}", entry.name_hash);
///
///         let mut file = archive.by_entry(&entry)?;
///         std::io::copy(&mut file, &mut std::io::sink())?;
///     }
///
///     Ok(())
/// }
/// ```
pub struct ArchiveReader<S: VolumeSource> {
    volumes: S,
    index: ArchiveIndex,
    files: IndexMap<EntryKey, ArchiveEntry>,
    current: Option<(u32, S::Volume)>,
}

impl<S: VolumeSource> ArchiveReader<S> {
    /// Decode the index of an archive
    ///
    /// Without an explicit format the layout is detected from the first bytes of volume 0.
    #[instrument(skip(volumes), err)]
    pub fn open(mut volumes: S, format: Option<ArchiveFormat>, options: ReadOptions) -> Result<Self> {
        let mut volume = volumes.open(0)?;

        let index = match format {
            Some(format) => ArchiveIndex::read(&mut volume, format, options)?,
            None => ArchiveIndex::read_detect(&mut volume, options)?,
        };

        let mut files = IndexMap::with_capacity(index.entries.len());
        for entry in &index.entries {
            if let Some(previous) = files.insert(entry.key(), *entry) {
                warn!(%previous, "duplicate entry, only the last one can be looked up by key");
            }
        }

        Ok(Self {
            volumes,
            index,
            files,
            current: Some((0, volume)),
        })
    }

    /// The decoded index
    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    /// Number of distinct keys contained in this archive.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether this archive contains no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the keys of every entry
    pub fn keys(&self) -> impl Iterator<Item = &EntryKey> {
        self.files.keys()
    }

    /// Get the index of an entry by key, if it's present.
    #[inline(always)]
    pub fn index_for_key(&self, key: &EntryKey) -> Option<usize> {
        self.files.get_index_of(key)
    }

    /// Entries ordered by volume and position inside the volume
    ///
    /// Extracting in this order reads every volume front to back exactly once.
    /// Entries sharing a key are all included.
    pub fn entries_by_offset(&self) -> Result<Vec<ArchiveEntry>> {
        let mut located = self
            .index
            .entries
            .iter()
            .map(|entry| -> Result<_> { Ok((self.index.locate(entry)?, *entry)) })
            .collect::<Result<Vec<_>>>()?;

        located.sort_by_key(|(position, _)| *position);
        Ok(located.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Search for a file by content hash and locale
    pub fn by_key(&mut self, name_hash: u32, locale: u32) -> Result<ArchiveFile<'_, S::Volume>> {
        let key = EntryKey { name_hash, locale };
        let Some(index) = self.files.get_index_of(&key) else {
            return Err(Error::FileNotFound(FileNotFoundError::Key { name_hash, locale }));
        };
        self.by_index(index)
    }

    /// Get a contained file by index
    pub fn by_index(&mut self, file_number: usize) -> Result<ArchiveFile<'_, S::Volume>> {
        let (_, entry) = self
            .files
            .get_index(file_number)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(file_number)))?;

        let entry = *entry;
        self.by_entry(&entry)
    }

    /// Open the data of an entry
    pub fn by_entry(&mut self, entry: &ArchiveEntry) -> Result<ArchiveFile<'_, S::Volume>> {
        let (volume_index, offset) = self.index.locate(entry)?;

        let volume = self.volume(volume_index)?;
        volume.seek(SeekFrom::Start(offset))?;

        Ok(ArchiveFile {
            entry: *entry,
            reader: volume.take(entry.uncompressed_size as u64),
        })
    }

    /// Guess the extension of an entry from its first bytes
    pub fn detect_extension(&mut self, entry: &ArchiveEntry) -> Result<&'static str> {
        let mut guess = Vec::with_capacity(DETECT_LENGTH);
        self.by_entry(entry)?
            .take(DETECT_LENGTH as u64)
            .read_to_end(&mut guess)?;
        Ok(detect_extension(&guess))
    }

    /// Unwrap and return the volume source
    pub fn into_inner(self) -> S {
        self.volumes
    }

    fn volume(&mut self, index: u32) -> Result<&mut S::Volume> {
        let volume = match self.current.take() {
            Some((current, volume)) if current == index => volume,
            _ => {
                debug!(index, "switching volume");
                self.volumes.open(index)?
            }
        };

        Ok(&mut self.current.insert((index, volume)).1)
    }
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Read};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::ArchiveReader;
    use crate::error::{Error, FileNotFoundError, Result};
    use crate::header::ReadOptions;
    use crate::types::{ArchiveEntry, ArchiveFormat, ArchiveIndex, Endian};
    use crate::volume::MemoryVolumes;

    fn two_volume_archive() -> Result<MemoryVolumes> {
        let mut index = ArchiveIndex::new(ArchiveFormat::BigFileV1, Endian::Little);
        index.block_alignment = 2 * 2048;
        index.entries = vec![
            ArchiveEntry {
                name_hash: 0xB,
                locale: 0xFFFF_FFFF,
                uncompressed_size: 5,
                offset: 2,
                ..Default::default()
            },
            ArchiveEntry {
                name_hash: 0xA,
                locale: 0xFFFF_FFFF,
                uncompressed_size: 5,
                offset: 1,
                ..Default::default()
            },
        ];

        let mut first = Cursor::new(Vec::new());
        index.write(&mut first)?;
        let mut first = first.into_inner();
        first.resize(2048, 0);
        first.extend(b"first");

        let mut volumes = MemoryVolumes::new();
        volumes.insert(0, first);
        volumes.insert(1, b"secnd".to_vec());
        Ok(volumes)
    }

    #[traced_test]
    #[test]
    fn read_entries_across_volumes() -> Result<()> {
        let options = ReadOptions::builder().block_alignment(2 * 2048).build();
        let mut archive = ArchiveReader::open(two_volume_archive()?, Some(ArchiveFormat::BigFileV1), options)?;
        assert_eq!(archive.len(), 2);

        let order: Vec<u32> = archive.entries_by_offset()?.iter().map(|e| e.name_hash).collect();
        assert_eq!(order, vec![0xA, 0xB]);

        let mut buffer = String::new();
        archive.by_key(0xB, 0xFFFF_FFFF)?.read_to_string(&mut buffer)?;
        assert_eq!(buffer, "secnd");

        buffer.clear();
        archive.by_key(0xA, 0xFFFF_FFFF)?.read_to_string(&mut buffer)?;
        assert_eq!(buffer, "first");

        Ok(())
    }

    #[traced_test]
    #[test]
    fn duplicate_keys_are_still_extracted() -> Result<()> {
        let mut volumes = two_volume_archive()?;

        let mut index = ArchiveIndex::new(ArchiveFormat::BigFileV1, Endian::Little);
        index.block_alignment = 2 * 2048;
        index.entries = vec![
            ArchiveEntry {
                name_hash: 0xA,
                locale: 0xFFFF_FFFF,
                uncompressed_size: 5,
                offset: 1,
                ..Default::default()
            },
            ArchiveEntry {
                name_hash: 0xA,
                locale: 0xFFFF_FFFF,
                uncompressed_size: 5,
                offset: 2,
                ..Default::default()
            },
        ];
        let mut first = Cursor::new(volumes.get(0).unwrap().to_vec());
        index.write(&mut first)?;
        volumes.insert(0, first.into_inner());

        let options = ReadOptions::builder().block_alignment(2 * 2048).build();
        let mut archive = ArchiveReader::open(volumes, Some(ArchiveFormat::BigFileV1), options)?;
        assert_eq!(archive.len(), 1);
        assert!(logs_contain("duplicate entry"));

        let mut contents = Vec::new();
        for entry in archive.entries_by_offset()? {
            let mut buffer = String::new();
            archive.by_entry(&entry)?.read_to_string(&mut buffer)?;
            contents.push(buffer);
        }
        assert_eq!(contents, vec!["first", "secnd"]);

        Ok(())
    }

    #[test]
    fn missing_entries() -> Result<()> {
        let options = ReadOptions::builder().block_alignment(2 * 2048).build();
        let mut archive = ArchiveReader::open(two_volume_archive()?, None, options)?;

        assert!(matches!(
            archive.by_key(0xA, 1),
            Err(Error::FileNotFound(FileNotFoundError::Key { name_hash: 0xA, locale: 1 }))
        ));
        assert!(matches!(
            archive.by_index(2),
            Err(Error::FileNotFound(FileNotFoundError::Index(2)))
        ));

        Ok(())
    }
}
