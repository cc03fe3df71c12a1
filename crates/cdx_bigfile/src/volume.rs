//! Storage for the volumes of an archive.
//!
//! An archive is split across numbered volumes. BigFile volumes are named
//! `<stem>.000`, `<stem>.001`, ... and Tiger data files `<stem>.000.tiger`,
//! `<stem>.001.tiger`, ... The index always lives at the start of volume 0.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::ArchiveFormat;

/// Destination for the volumes written while packing
pub trait VolumeSink {
    /// Handle to one open volume
    type Volume: Write + Seek;

    /// Create volume `index`, discarding anything previously stored under that index
    fn create(&mut self, index: u32) -> Result<Self::Volume>;

    /// Open an already created volume for writing without truncating it
    fn reopen(&mut self, index: u32) -> Result<Self::Volume>;

    /// Flush and release a volume handle
    fn close(&mut self, index: u32, volume: Self::Volume) -> Result<()>;
}

/// Origin of the volumes read while extracting
pub trait VolumeSource {
    /// Handle to one open volume
    type Volume: Read + Seek;

    /// Open volume `index` for reading
    fn open(&mut self, index: u32) -> Result<Self::Volume>;
}

/// File naming convention of the volumes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VolumeNaming {
    /// `<stem>.NNN`
    BigFile,
    /// `<stem>.NNN.tiger`
    Tiger,
}

impl VolumeNaming {
    /// File name of volume `index`
    pub fn file_name(&self, stem: &str, index: u32) -> String {
        match self {
            VolumeNaming::BigFile => format!("{stem}.{index:03}"),
            VolumeNaming::Tiger => format!("{stem}.{index:03}.tiger"),
        }
    }
}

impl From<ArchiveFormat> for VolumeNaming {
    fn from(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::BigFileV1 | ArchiveFormat::BigFileV2 => VolumeNaming::BigFile,
            ArchiveFormat::Tiger => VolumeNaming::Tiger,
        }
    }
}

/// Volumes stored as files next to each other in one directory
#[derive(Debug, Clone)]
pub struct FileVolumes {
    directory: PathBuf,
    stem: String,
    naming: VolumeNaming,
}

impl FileVolumes {
    /// Volumes named `<directory>/<stem>.NNN[.tiger]`
    pub fn new(directory: impl Into<PathBuf>, stem: impl Into<String>, naming: VolumeNaming) -> Self {
        Self {
            directory: directory.into(),
            stem: stem.into(),
            naming,
        }
    }

    /// Derive the directory, stem and naming from the path of any volume
    ///
    /// `data/bigfile.000` and `data/bigfile` both give the stem `bigfile`,
    /// `data/pc-w.002.tiger` gives `pc-w` with Tiger naming.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let naming = match name.strip_suffix(".tiger") {
            Some(stripped) => {
                name = stripped.to_owned();
                VolumeNaming::Tiger
            }
            None => VolumeNaming::BigFile,
        };

        if let Some((stem, suffix)) = name.rsplit_once('.') {
            if suffix.len() == 3 && suffix.bytes().all(|c| c.is_ascii_digit()) {
                name = stem.to_owned();
            }
        }

        Self::new(directory, name, naming)
    }

    /// Full path of volume `index`
    pub fn path(&self, index: u32) -> PathBuf {
        self.directory.join(self.naming.file_name(&self.stem, index))
    }

    /// Naming convention in use
    pub fn naming(&self) -> VolumeNaming {
        self.naming
    }
}

impl VolumeSink for FileVolumes {
    type Volume = File;

    #[instrument(skip(self), err)]
    fn create(&mut self, index: u32) -> Result<File> {
        let path = self.path(index);
        debug!(path = %path.display(), "creating volume");
        Ok(File::create(path)?)
    }

    #[instrument(skip(self), err)]
    fn reopen(&mut self, index: u32) -> Result<File> {
        Ok(OpenOptions::new().write(true).open(self.path(index))?)
    }

    fn close(&mut self, _index: u32, mut volume: File) -> Result<()> {
        volume.flush()?;
        Ok(())
    }
}

impl VolumeSource for FileVolumes {
    type Volume = File;

    #[instrument(skip(self), err)]
    fn open(&mut self, index: u32) -> Result<File> {
        Ok(File::open(self.path(index))?)
    }
}

/// Volumes kept in memory, keyed by index
#[derive(Debug, Clone, Default)]
pub struct MemoryVolumes {
    volumes: HashMap<u32, Vec<u8>>,
}

impl MemoryVolumes {
    /// Empty set of volumes
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored volumes
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Whether no volume has been stored yet
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Contents of volume `index`, if it has been stored
    pub fn get(&self, index: u32) -> Option<&[u8]> {
        self.volumes.get(&index).map(Vec::as_slice)
    }

    /// Store the contents of volume `index`
    pub fn insert(&mut self, index: u32, data: Vec<u8>) {
        self.volumes.insert(index, data);
    }

    fn missing(index: u32) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("volume {index} does not exist"))
    }
}

impl VolumeSink for MemoryVolumes {
    type Volume = Cursor<Vec<u8>>;

    fn create(&mut self, index: u32) -> Result<Self::Volume> {
        self.volumes.remove(&index);
        Ok(Cursor::new(Vec::new()))
    }

    fn reopen(&mut self, index: u32) -> Result<Self::Volume> {
        let data = self.volumes.remove(&index).ok_or_else(|| Self::missing(index))?;
        Ok(Cursor::new(data))
    }

    fn close(&mut self, index: u32, volume: Self::Volume) -> Result<()> {
        self.volumes.insert(index, volume.into_inner());
        Ok(())
    }
}

impl VolumeSource for MemoryVolumes {
    type Volume = Cursor<Vec<u8>>;

    fn open(&mut self, index: u32) -> Result<Self::Volume> {
        let data = self.volumes.get(&index).ok_or_else(|| Self::missing(index))?;
        Ok(Cursor::new(data.clone()))
    }
}
