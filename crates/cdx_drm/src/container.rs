//! Reading and writing DRM containers.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt, Endian};
use bon::Builder;
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, instrument, trace};

use crate::cdrm::{self, align16};
use crate::error::{Error, Result};
use crate::resolver::ResolverTable;
use crate::section::{resolver_size, Section, SectionHeader, SectionType};

/// The only known container version
pub const DRM_VERSION: u32 = 21;

/// Size of the fixed container header
const HEADER_SIZE: u64 = 32;

/// Container flag enabling 16 byte alignment of every block
pub const FLAG_PADDED: u32 = 1;

/// Byte order of resolver records
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ResolverByteOrder {
    /// Always little endian, which is what shipped game data uses
    #[default]
    Little,

    /// Same byte order as the container
    Container,
}

impl ResolverByteOrder {
    fn endian(self, container: Endian) -> Endian {
        match self {
            ResolverByteOrder::Little => Endian::Little,
            ResolverByteOrder::Container => container,
        }
    }
}

/// Options for decoding a container
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct DrmReadOptions {
    /// Byte order of the records of every resolver table, the counts always follow the container
    #[builder(default)]
    pub resolver_records: ResolverByteOrder,
}

/// A decoded DRM container
///
/// ```
/// # fn doit() -> cdx_drm::error::Result<()>
/// # {
/// use std::io::Cursor;
/// use cdx_drm::{DrmContainer, DrmReadOptions, Endian, ResolverByteOrder, Section, SectionType};
///
/// let mut container = DrmContainer::new(Endian::Little);
/// let mut section = Section::new(0x1234, SectionType::Script);
/// section.payload = Some(b"print".to_vec());
/// container.sections.push(section);
///
/// let mut buffer = Cursor::new(Vec::new());
/// container.write(&mut buffer, ResolverByteOrder::Little)?;
///
/// buffer.set_position(0);
/// let decoded = DrmContainer::read(&mut buffer, DrmReadOptions::default())?;
/// assert_eq!(decoded.find_section(0x1234, SectionType::Script)?.data(), b"print");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmContainer {
    /// Always [`DRM_VERSION`]
    pub version: u32,

    /// Byte order of the header and section headers
    pub endian: Endian,

    /// Bit 0 enables 16 byte alignment
    pub flags: u32,

    /// Not interpreted
    pub unknown10: u32,

    /// Trailing header count, not interpreted here
    pub unknown1c: u32,

    /// Strings of the first blob
    pub unknown04: Vec<String>,

    /// Strings of the second blob, stored before the first one
    pub unknown08: Vec<String>,

    /// Sections in storage order, remote relocations refer to them by index
    pub sections: Vec<Section>,
}

impl DrmContainer {
    /// Create an empty container
    pub fn new(endian: Endian) -> Self {
        Self {
            version: DRM_VERSION,
            endian,
            flags: 0,
            unknown10: 0,
            unknown1c: 0,
            unknown04: Vec::new(),
            unknown08: Vec::new(),
            sections: Vec::new(),
        }
    }

    /// Whether sections are aligned to 16 bytes
    pub fn is_padded(&self) -> bool {
        self.flags & FLAG_PADDED != 0
    }

    /// Decode a container, decompressing it first when it is wrapped in a CDRM envelope
    #[instrument(skip(reader), err)]
    pub fn read<R: Read + Seek>(reader: &mut R, options: DrmReadOptions) -> Result<Self> {
        if cdrm::is_compressed(reader)? {
            let data = cdrm::decompress(reader)?;
            return Self::read_uncompressed(&mut Cursor::new(data), options);
        }

        Self::read_uncompressed(reader, options)
    }

    fn read_uncompressed<R: Read + Seek>(reader: &mut R, options: DrmReadOptions) -> Result<Self> {
        let base = reader.stream_position()?;
        let length = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(base))?;

        if base + HEADER_SIZE > length {
            return Err(Error::MalformedHeader(
                "not enough data for a container header".into(),
            ));
        }

        let raw_version = reader.read_u32::<LittleEndian>()?;
        let endian = if raw_version == DRM_VERSION {
            Endian::Little
        } else if raw_version.swap_bytes() == DRM_VERSION {
            Endian::Big
        } else {
            return Err(Error::MalformedHeader(format!(
                "unsupported version {raw_version:#010X}, expected {DRM_VERSION}"
            )));
        };

        let unknown04_size: u32 = reader.read_type(endian)?;
        let unknown08_size: u32 = reader.read_type(endian)?;
        let unknown0c: u32 = reader.read_type(endian)?;
        let unknown10: u32 = reader.read_type(endian)?;
        let flags: u32 = reader.read_type(endian)?;
        let section_count: u32 = reader.read_type(endian)?;
        let unknown1c: u32 = reader.read_type(endian)?;

        debug!(?endian, flags, section_count, unknown04_size, unknown08_size, "read DRM header");

        if unknown0c != 0 {
            return Err(Error::UnsupportedFeature(format!(
                "reserved header field is {unknown0c:#X}"
            )));
        }

        if base + HEADER_SIZE + section_count as u64 * SectionHeader::SIZE > length {
            return Err(Error::MalformedHeader(format!(
                "{section_count} section headers don't fit in {length} bytes"
            )));
        }

        let headers = (0..section_count)
            .map(|_| -> Result<(SectionHeader, SectionType)> {
                let header = SectionHeader::read_options(reader, endian, ())?;
                trace!(?header, "read section header");
                Ok((header, SectionType::try_from(header.section_type)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let unknown08 = read_strings(reader, unknown08_size)?;
        let unknown04 = read_strings(reader, unknown04_size)?;

        let padded = flags & FLAG_PADDED != 0;
        let resolver_endian = options.resolver_records.endian(endian);

        skip_padding(reader, base, padded)?;

        let sections = headers
            .into_iter()
            .map(|(header, section_type)| -> Result<Section> {
                if header.unknown05 & 1 != 0 {
                    return Err(Error::UnsupportedFeature(format!(
                        "section {:08X} has unknown05 bit 0 set",
                        header.id
                    )));
                }

                let resolver = match header.resolver_size() {
                    0 => None,
                    size => {
                        let data = read_bytes(reader, size)?;
                        Some(ResolverTable::read(&data, endian, resolver_endian)?)
                    }
                };
                skip_padding(reader, base, padded)?;

                let payload = match header.data_size {
                    0 => None,
                    size => Some(read_bytes(reader, size)?),
                };
                skip_padding(reader, base, padded)?;

                Ok(Section {
                    id: header.id,
                    section_type,
                    unknown05: header.unknown05,
                    unknown06: header.unknown06,
                    flags: header.flags,
                    unknown10: header.unknown10,
                    resolver,
                    payload,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: DRM_VERSION,
            endian,
            flags,
            unknown10,
            unknown1c,
            unknown04,
            unknown08,
            sections,
        })
    }

    /// Encode the container without compression
    ///
    /// Section sizes and resolver sizes are recomputed from the data.
    #[instrument(skip_all, fields(sections = self.sections.len()), err)]
    pub fn write<W: Write + Seek>(&self, writer: &mut W, resolver_records: ResolverByteOrder) -> Result<()> {
        let endian = self.endian;
        let resolver_endian = resolver_records.endian(endian);
        let padded = self.is_padded();

        let unknown04 = encode_strings(&self.unknown04)?;
        let unknown08 = encode_strings(&self.unknown08)?;

        let mut headers = Vec::with_capacity(self.sections.len());
        let mut resolvers = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            if section.unknown05 & 1 != 0 {
                return Err(Error::ConstraintViolation(format!(
                    "section {section} has unknown05 bit 0 set"
                )));
            }

            let resolver = match &section.resolver {
                Some(table) => {
                    let mut buffer = Cursor::new(Vec::new());
                    table.write(&mut buffer, endian, resolver_endian)?;
                    buffer.into_inner()
                }
                None => Vec::new(),
            };

            if resolver.len() > 0xFF_FFFF {
                return Err(Error::ConstraintViolation(format!(
                    "resolver of section {section} is larger than 24 bits"
                )));
            }

            let data_size = u32::try_from(section.data().len()).map_err(|_| {
                Error::ConstraintViolation(format!("section {section} is larger than 4 GiB"))
            })?;

            headers.push(SectionHeader {
                data_size,
                section_type: section.section_type.into(),
                unknown05: section.unknown05,
                unknown06: section.unknown06,
                flags: (section.flags & 0xFF) | ((resolver.len() as u32) << 8),
                id: section.id,
                unknown10: section.unknown10,
            });
            resolvers.push(resolver);
        }

        let base = writer.stream_position()?;

        writer.write_type(&DRM_VERSION, endian)?;
        writer.write_type(&(unknown04.len() as u32), endian)?;
        writer.write_type(&(unknown08.len() as u32), endian)?;
        writer.write_type(&0u32, endian)?;
        writer.write_type(&self.unknown10, endian)?;
        writer.write_type(&self.flags, endian)?;
        writer.write_type(&(self.sections.len() as u32), endian)?;
        writer.write_type(&self.unknown1c, endian)?;

        for header in &headers {
            header.write_options(writer, endian, ())?;
        }

        writer.write_all(&unknown08)?;
        writer.write_all(&unknown04)?;
        write_padding(writer, base, padded)?;

        for ((section, header), resolver) in self.sections.iter().zip(&headers).zip(&resolvers) {
            debug_assert_eq!(resolver_size(header.flags) as usize, resolver.len());

            writer.write_all(resolver)?;
            write_padding(writer, base, padded)?;
            writer.write_all(section.data())?;
            write_padding(writer, base, padded)?;
        }

        Ok(())
    }

    /// The unique section with the given id and type
    ///
    /// This is the lookup type-resolved relocations rely on.
    pub fn find_section(&self, id: u32, section_type: SectionType) -> Result<&Section> {
        let mut matches = self
            .sections
            .iter()
            .filter(|s| s.id == id && s.section_type == section_type);

        match (matches.next(), matches.next()) {
            (Some(section), None) => Ok(section),
            (None, _) => Err(Error::ConstraintViolation(format!(
                "no {section_type} section with id {id:08X}"
            ))),
            (Some(_), Some(_)) => Err(Error::ConstraintViolation(format!(
                "several {section_type} sections with id {id:08X}"
            ))),
        }
    }
}

fn read_bytes<R: Read>(reader: &mut R, size: u32) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let read = reader.take(size as u64).read_to_end(&mut data)?;
    if read != size as usize {
        return Err(Error::MalformedHeader(format!(
            "expected {size} bytes but the container ended after {read}"
        )));
    }
    Ok(data)
}

/// Zero terminated strings filling exactly `size` bytes, the last terminator may be missing
fn read_strings<R: Read>(reader: &mut R, size: u32) -> Result<Vec<String>> {
    let data = read_bytes(reader, size)?;
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let data = data.strip_suffix(&[0u8]).unwrap_or(&data[..]);
    Ok(data
        .split(|&c| c == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect())
}

fn encode_strings(strings: &[String]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for string in strings {
        if !string.is_ascii() || string.contains('\0') {
            return Err(Error::ConstraintViolation(format!(
                "{string:?} can't be stored as a zero terminated ASCII string"
            )));
        }
        data.extend(string.as_bytes());
        data.push(0);
    }
    Ok(data)
}

fn skip_padding<R: Seek>(reader: &mut R, base: u64, padded: bool) -> Result<()> {
    if padded {
        let position = reader.stream_position()?;
        reader.seek(SeekFrom::Start(base + align16(position - base)))?;
    }
    Ok(())
}

fn write_padding<W: Write + Seek>(writer: &mut W, base: u64, padded: bool) -> Result<()> {
    if padded {
        let position = writer.stream_position()?;
        let padding = align16(position - base) - (position - base);
        writer.write_all(&[0u8; 16][..padding as usize])?;
    }
    Ok(())
}
