//! This library handles reading from and creating the multi-volume **BigFile** and **Tiger**
//! archives used by Crystal Dynamics titles.
//!
//! # Archive Format Documentation
//!
//! An archive packs many resources, identified by a 32-bit hash of their normalized path
//! and a locale mask, into 2048 byte blocks. The data is spread over one or more volumes of
//! at most `block_alignment` bytes each, and the index is stored at the start of volume 0.
//! No field of an index carries a file name.
//!
//! Three index layouts exist, all of them represented by [`ArchiveIndex`]:
//!
//! ## BigFile V1
//!
//! | Offset (bytes) | Field                  | Description                                        |
//! |----------------|------------------------|----------------------------------------------------|
//! | 0x0000         | Count                  | 4 bytes: number of entries                         |
//! | 0x0004         | Hashes                 | 4 bytes per entry: content hash                    |
//! | ...            | Entries                | 16 bytes per entry, see below                      |
//!
//! V1 has no magic and no alignment field, the byte order and the volume size are supplied
//! through [`ReadOptions`].
//!
//! ## BigFile V2
//!
//! | Offset (bytes) | Field                  | Description                                        |
//! |----------------|------------------------|----------------------------------------------------|
//! | 0x0000         | Alignment              | 4 bytes: `0x7FF00000` or `0x62300000`              |
//! | 0x0004         | Base Path              | 64 bytes: zero padded ASCII                        |
//! | 0x0044         | Count                  | 4 bytes: number of entries                         |
//! | 0x0048         | Hashes                 | 4 bytes per entry: content hash                    |
//! | ...            | Entries                | 16 bytes per entry, see below                      |
//!
//! The byte order of the alignment field gives the byte order of the whole index.
//!
//! Both BigFile layouts share the same entry record:
//!
//! | Offset (bytes) | Field                  | Description                                        |
//! |----------------|------------------------|----------------------------------------------------|
//! | 0x0000         | Uncompressed Size      | 4 bytes: size of the resource                      |
//! | 0x0004         | Offset                 | 4 bytes: block index across all volumes            |
//! | 0x0008         | Locale                 | 4 bytes: locale mask, `0xFFFFFFFF` for all         |
//! | 0x000C         | Compressed Size        | 4 bytes: always 0 in V2                            |
//!
//! A BigFile offset addresses volume `offset / (alignment / 2048)`, block
//! `offset % (alignment / 2048)` of that volume.
//!
//! ## Tiger
//!
//! See [`tiger`] for the layout. Tiger offsets are byte offsets inside one data file and the
//! data file index is packed into the low bits of the offset field.
//!
//! ## Additional Information
//!
//! - **Volume names**: `<stem>.000`, `<stem>.001`, ... for BigFile and `<stem>.000.tiger`,
//!   `<stem>.001.tiger`, ... for Tiger
//! - **Block size**: 2048 bytes
//! - **Compression**: none, entries are stored raw
//!

pub mod allocate;
mod bigfile;
pub mod detect;
pub mod error;
pub mod header;
pub mod locale;
pub mod read;
pub mod tiger;
pub mod types;
pub mod volume;
pub mod write;

pub use bigfile::BigFileRecord;
pub use detect::detect_extension;
pub use header::ReadOptions;
pub use locale::Locale;
pub use read::{ArchiveFile, ArchiveReader};
pub use types::{ArchiveEntry, ArchiveFormat, ArchiveIndex, EntryKey, Endian};
pub use volume::{FileVolumes, MemoryVolumes, VolumeNaming, VolumeSink, VolumeSource};
pub use write::{ArchivePacker, PackOptions, PackOutput};
