use std::io::{Cursor, Write};

use cdx_drm::cdrm::{align16, decompress, is_compressed, BlockKind};
use cdx_drm::error::{Error, Result};
use cdx_drm::Endian;
use flate2::{write::ZlibEncoder, Compression};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

fn put(output: &mut Vec<u8>, value: u32, endian: Endian) {
    match endian {
        Endian::Big => output.extend(value.to_be_bytes()),
        Endian::Little => output.extend(value.to_le_bytes()),
    }
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Build an envelope holding `blocks`, with every block stored at a 16 byte boundary
fn envelope(version: u32, endian: Endian, blocks: &[(BlockKind, &[u8])]) -> Vec<u8> {
    let mut output = b"CDRM".to_vec();
    put(&mut output, version, endian);
    put(&mut output, blocks.len() as u32, endian);

    let table_end = 16 + blocks.len() as u64 * 8;
    let padding = if version == 0 { 0 } else { align16(table_end) - table_end };
    put(&mut output, padding as u32, endian);

    let stored = blocks
        .iter()
        .map(|(kind, data)| match kind {
            BlockKind::Raw => data.to_vec(),
            BlockKind::Zlib => zlib(data),
        })
        .collect::<Vec<_>>();

    for ((kind, data), stored) in blocks.iter().zip(&stored) {
        put(&mut output, (data.len() as u32) << 8 | *kind as u32, endian);
        put(&mut output, stored.len() as u32, endian);
    }
    output.resize(align16(output.len() as u64) as usize, 0);

    for stored in &stored {
        output.extend(stored);
        output.resize(align16(output.len() as u64) as usize, 0);
    }

    output
}

#[traced_test]
#[test]
fn blocks_land_on_16_byte_boundaries() -> Result<()> {
    let first = [0xAAu8; 16];
    let second = b"0123456789";

    let input = envelope(2, Endian::Little, &[(BlockKind::Raw, &first[..]), (BlockKind::Zlib, &second[..])]);
    let output = decompress(&mut Cursor::new(input))?;

    assert_eq!(output.len(), 26);
    assert_eq!(&output[..16], &first);
    assert_eq!(&output[16..26], second);

    Ok(())
}

#[test]
fn gaps_between_blocks_are_zero_filled() -> Result<()> {
    let input = envelope(
        2,
        Endian::Big,
        &[(BlockKind::Zlib, &b"hello"[..]), (BlockKind::Raw, &b"abc"[..])],
    );
    let output = decompress(&mut Cursor::new(input))?;

    let mut expected = b"hello".to_vec();
    expected.resize(16, 0);
    expected.extend(b"abc");
    assert_eq!(output, expected);

    Ok(())
}

#[test]
fn legacy_envelopes_in_both_byte_orders() -> Result<()> {
    let payload = (0..100u8).collect::<Vec<_>>();
    let blocks: [(BlockKind, &[u8]); 3] = [
        (BlockKind::Zlib, &payload[..40]),
        (BlockKind::Raw, &payload[40..47]),
        (BlockKind::Zlib, &payload[47..]),
    ];

    let little = decompress(&mut Cursor::new(envelope(0, Endian::Little, &blocks)))?;
    let big = decompress(&mut Cursor::new(envelope(0, Endian::Big, &blocks)))?;

    assert_eq!(little, big);
    assert_eq!(&little[..40], &payload[..40]);
    assert_eq!(&little[48..55], &payload[40..47]);
    assert_eq!(&little[64..], &payload[47..]);

    Ok(())
}

#[test]
fn envelope_after_other_data() -> Result<()> {
    let mut input = vec![0xEEu8; 24];
    input.extend(envelope(2, Endian::Little, &[(BlockKind::Zlib, &b"offset envelope"[..])]));

    let mut reader = Cursor::new(input);
    reader.set_position(24);
    assert!(is_compressed(&mut reader)?);
    assert_eq!(reader.position(), 24);
    assert_eq!(decompress(&mut reader)?, b"offset envelope");

    Ok(())
}

#[test]
fn short_zlib_block() {
    let mut input = envelope(2, Endian::Little, &[(BlockKind::Zlib, &b"0123456789"[..])]);
    // claim 12 bytes for a block that inflates to 10
    input[17] = 12;

    assert!(matches!(
        decompress(&mut Cursor::new(input)),
        Err(Error::MalformedHeader(_))
    ));
}

#[test]
fn empty_envelope() -> Result<()> {
    let input = envelope(2, Endian::Little, &[]);
    assert_eq!(decompress(&mut Cursor::new(input))?, Vec::<u8>::new());
    Ok(())
}
