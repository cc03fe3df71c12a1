use cdx_bigfile::{
    error::Error,
    types::{ArchiveFormat, Endian},
    ArchivePacker, ArchiveReader, FileVolumes, MemoryVolumes, PackOptions, ReadOptions, VolumeNaming, VolumeSink,
};
use miette::{IntoDiagnostic, Result};
use std::cell::RefCell;
use std::io::{Cursor, Read};
use std::rc::Rc;
use tracing::info;
use tracing_test::traced_test;

fn payload(seed: u8, length: usize) -> Vec<u8> {
    (0..length).map(|i| seed.wrapping_add(i as u8)).collect()
}

fn pack_and_unpack(options: PackOptions, files: &[(u32, Vec<u8>)]) -> Result<()> {
    let directory = tempfile::tempdir().into_diagnostic()?;
    let format = options.format;
    let volumes = FileVolumes::new(directory.path(), "bigfile", VolumeNaming::from(format));

    let mut packer = ArchivePacker::new(volumes, options.clone(), files.len())?;
    for (name_hash, data) in files {
        packer.add_file(*name_hash, 0xFFFF_FFFF, &mut data.as_slice(), data.len() as u64)?;
    }
    let output = packer.finish()?;
    assert!(output.warnings.is_empty());

    let volume_zero = output.volumes.path(0);
    info!("reading back {}", volume_zero.display());
    assert!(volume_zero.exists());

    let read_options = ReadOptions::builder()
        .endian(options.endian)
        .block_alignment(options.block_alignment)
        .build();
    let mut archive = ArchiveReader::open(FileVolumes::from_path(&volume_zero), Some(format), read_options)?;

    assert_eq!(archive.len(), files.len());
    assert_eq!(archive.index().base_path, output.index.base_path);

    for (name_hash, expected) in files {
        let mut actual = Vec::new();
        archive
            .by_key(*name_hash, 0xFFFF_FFFF)?
            .read_to_end(&mut actual)
            .into_diagnostic()?;
        assert_eq!(&actual, expected, "{name_hash:08X}");
    }

    Ok(())
}

#[traced_test]
#[test]
fn pack_bigfile_v1_on_disk() -> Result<()> {
    let options = PackOptions::builder()
        .format(ArchiveFormat::BigFileV1)
        .endian(Endian::Big)
        .block_alignment(4 * 2048)
        .build();

    pack_and_unpack(
        options,
        &[(3, payload(1, 100)), (1, payload(2, 5000)), (2, payload(3, 4096)), (4, Vec::new())],
    )
}

#[traced_test]
#[test]
fn pack_bigfile_v2_on_disk() -> Result<()> {
    let options = PackOptions::builder()
        .format(ArchiveFormat::BigFileV2)
        .base_path("DEUSEX3")
        .build();

    pack_and_unpack(options, &[(0xCAFE_BABE, payload(7, 3000)), (0x0BAD_F00D, payload(9, 1))])
}

#[traced_test]
#[test]
fn pack_tiger_on_disk() -> Result<()> {
    let options = PackOptions::builder()
        .format(ArchiveFormat::Tiger)
        .block_alignment(2 * 2048)
        .base_path("pc-w")
        .priority(3)
        .build();

    pack_and_unpack(
        options,
        &[(10, payload(1, 10)), (11, payload(2, 2048)), (12, payload(3, 2049))],
    )
}

#[traced_test]
#[test]
fn oversized_file_is_truncated_with_warning() -> Result<()> {
    let options = PackOptions::builder()
        .format(ArchiveFormat::BigFileV1)
        .block_alignment(2 * 2048)
        .build();

    let big = payload(5, 5000);
    let mut packer = ArchivePacker::new(MemoryVolumes::new(), options, 2)?;
    packer.add_file(1, 0xFFFF_FFFF, &mut big.as_slice(), big.len() as u64)?;
    packer.add_file(2, 0xFFFF_FFFF, &mut &b"tail"[..], 4)?;
    let output = packer.finish()?;

    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].name_hash, 1);
    assert_eq!(output.warnings[0].stored, 4096);
    assert!(logs_contain("can't fit in a volume"));

    // header takes the first block of volume 0, the truncated file fills volume 1
    let offsets: Vec<(u32, u32, u32)> = output
        .index
        .entries
        .iter()
        .map(|e| (e.name_hash, e.offset, e.uncompressed_size))
        .collect();
    assert_eq!(offsets, vec![(1, 2, 4096), (2, 4, 4)]);

    for entry in &output.index.entries {
        assert_eq!(output.index.locate(entry)?.1 % 2048, 0);
    }

    let mut archive = ArchiveReader::open(
        output.volumes,
        None,
        ReadOptions::builder().block_alignment(2 * 2048).build(),
    )?;
    let mut stored = Vec::new();
    archive.by_key(1, 0xFFFF_FFFF)?.read_to_end(&mut stored).into_diagnostic()?;
    assert_eq!(stored, big[..4096]);

    Ok(())
}

#[test]
fn duplicate_keys_are_rejected() -> Result<()> {
    let mut packer = ArchivePacker::new(MemoryVolumes::new(), PackOptions::default(), 2)?;
    packer.add_file(1, 0xFFFF_FFFF, &mut &b"one"[..], 3)?;

    assert!(matches!(
        packer.add_file(1, 0xFFFF_FFFF, &mut &b"two"[..], 3),
        Err(Error::ConstraintViolation(_))
    ));

    Ok(())
}

#[test]
fn short_input_fails() -> Result<()> {
    let mut packer = ArchivePacker::new(MemoryVolumes::new(), PackOptions::default(), 1)?;

    assert!(matches!(
        packer.add_file(1, 0xFFFF_FFFF, &mut &b"one"[..], 10),
        Err(Error::IOError(_))
    ));

    Ok(())
}

/// Memory volumes recording which handles are still open
#[derive(Default)]
struct TrackedVolumes {
    inner: MemoryVolumes,
    open: Rc<RefCell<Vec<u32>>>,
}

impl VolumeSink for TrackedVolumes {
    type Volume = Cursor<Vec<u8>>;

    fn create(&mut self, index: u32) -> cdx_bigfile::error::Result<Self::Volume> {
        self.open.borrow_mut().push(index);
        self.inner.create(index)
    }

    fn reopen(&mut self, index: u32) -> cdx_bigfile::error::Result<Self::Volume> {
        self.open.borrow_mut().push(index);
        self.inner.reopen(index)
    }

    fn close(&mut self, index: u32, volume: Self::Volume) -> cdx_bigfile::error::Result<()> {
        self.open.borrow_mut().retain(|&i| i != index);
        self.inner.close(index, volume)
    }
}

#[traced_test]
#[test]
fn failed_file_closes_its_volume() -> Result<()> {
    let volumes = TrackedVolumes::default();
    let open = volumes.open.clone();

    let mut packer = ArchivePacker::new(volumes, PackOptions::default(), 2)?;
    assert!(matches!(
        packer.add_file(1, 0xFFFF_FFFF, &mut &b"one"[..], 10),
        Err(Error::IOError(_))
    ));
    assert_eq!(*open.borrow(), Vec::<u32>::new());

    packer.add_file(2, 0xFFFF_FFFF, &mut &b"two"[..], 3)?;
    assert_eq!(*open.borrow(), vec![0]);

    let output = packer.finish()?;
    assert_eq!(*open.borrow(), Vec::<u32>::new());
    assert_eq!(output.index.len(), 1);

    let volume = output.volumes.inner.get(0).unwrap();
    assert_eq!(&volume[2048..2051], b"one");

    Ok(())
}

#[test]
fn tiger_priority_must_fit() {
    let options = PackOptions::builder()
        .format(ArchiveFormat::Tiger)
        .priority(0x80)
        .build();

    assert!(ArchivePacker::new(MemoryVolumes::new(), options, 0).is_err());
}
