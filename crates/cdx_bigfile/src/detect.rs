//! Guessing a file extension from the first bytes of a resource.

/// Number of leading bytes [`detect_extension`] looks at
pub const DETECT_LENGTH: usize = 64;

const SAMPLE_RATES: [u32; 2] = [44100, 48000];

/// Guess the extension of a resource from its leading bytes
///
/// Resources are stored by hash only, this is what gives extracted files a
/// usable name.
///
/// ```
/// use cdx_bigfile::detect_extension;
///
/// assert_eq!(detect_extension(b"CDRM\x00\x00\x00\x00"), "drm");
/// assert_eq!(detect_extension(&[]), "null");
/// ```
pub fn detect_extension(data: &[u8]) -> &'static str {
    let Some(magic) = data.first_chunk::<4>() else {
        return if data.is_empty() { "null" } else { "unknown" };
    };

    match magic {
        b"CDRM" => "drm",
        b"CRID" => "cpk",
        b"FSB4" => "sam",
        [b'M', b'u', b's', _] => "mus",
        _ if is_sample_rate(magic) => "mul",
        _ => "unknown",
    }
}

/// Multiplexed audio streams start with their sample rate, in either byte order
fn is_sample_rate(magic: &[u8; 4]) -> bool {
    let little = u32::from_le_bytes(*magic);
    let big = u32::from_be_bytes(*magic);
    SAMPLE_RATES.contains(&little) || SAMPLE_RATES.contains(&big)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::detect_extension;

    #[test]
    fn detect_known_magics() {
        let cases: [(&[u8], &str); 10] = [
            (&[], "null"),
            (b"CD", "unknown"),
            (b"CDRM\x02\x00\x00\x00", "drm"),
            (b"CRID", "cpk"),
            (b"FSB4\x00", "sam"),
            (b"Mus!", "mus"),
            (&[0x44, 0xAC, 0x00, 0x00], "mul"),
            (&[0x00, 0x00, 0xAC, 0x44], "mul"),
            (&[0x00, 0x00, 0xBB, 0x80, 0x01], "mul"),
            (&[0x15, 0x00, 0x00, 0x00], "unknown"),
        ];

        for (input, expected) in cases {
            assert_eq!(detect_extension(input), expected, "{input:02X?}");
        }
    }
}
