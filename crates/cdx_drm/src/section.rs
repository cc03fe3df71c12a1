//! Sections of a DRM container.

use std::fmt;

use binrw::{BinRead, BinWrite};

use crate::error::{Error, Result};
use crate::resolver::ResolverTable;

/// Kind of data held by a section
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SectionType {
    /// Untyped data
    Generic = 0,
    /// Placeholder without data
    Empty = 1,
    /// Animation data
    Animation = 2,
    /// Texture or other GPU resource
    RenderResource = 5,
    /// Sound data
    Wave = 6,
    /// Typed game data
    DTPData = 7,
    /// Compiled script
    Script = 8,
    /// Shader library
    ShaderLib = 9,
    /// Material definition
    Material = 10,
    /// Object definition
    Object = 11,
    /// Renderable mesh
    RenderMesh = 12,
    /// Collision mesh
    CollisionMesh = 13,
    /// List of stream groups
    StreamGroupList = 14,
}

impl TryFrom<u8> for SectionType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => SectionType::Generic,
            1 => SectionType::Empty,
            2 => SectionType::Animation,
            5 => SectionType::RenderResource,
            6 => SectionType::Wave,
            7 => SectionType::DTPData,
            8 => SectionType::Script,
            9 => SectionType::ShaderLib,
            10 => SectionType::Material,
            11 => SectionType::Object,
            12 => SectionType::RenderMesh,
            13 => SectionType::CollisionMesh,
            14 => SectionType::StreamGroupList,
            _ => {
                return Err(Error::UnsupportedFeature(format!(
                    "unknown section type {value}"
                )))
            }
        })
    }
}

impl From<SectionType> for u8 {
    fn from(value: SectionType) -> Self {
        value as u8
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fixed 20 byte section header as stored in the container
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Size of the payload
    pub data_size: u32,

    /// Raw [`SectionType`]
    pub section_type: u8,

    /// Bit 0 marks a layout that is not supported
    pub unknown05: u8,

    /// Not interpreted
    pub unknown06: u16,

    /// Resolver table size in bits 8..32
    pub flags: u32,

    /// Identifier referenced by type-resolved relocations
    pub id: u32,

    /// Not interpreted
    pub unknown10: u32,
}

impl SectionHeader {
    /// Size in bytes of a section header
    pub const SIZE: u64 = 20;

    /// Size of the resolver table stored before the payload
    pub fn resolver_size(&self) -> u32 {
        resolver_size(self.flags)
    }
}

pub(crate) fn resolver_size(flags: u32) -> u32 {
    flags >> 8
}

/// One decoded section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Identifier, usually a hash of the resource name
    pub id: u32,

    /// Kind of data held in the payload
    pub section_type: SectionType,

    /// Bit 0 marks a layout that is not supported
    pub unknown05: u8,

    /// Not interpreted
    pub unknown06: u16,

    /// Header flags, bits 8..32 hold the resolver table size
    pub flags: u32,

    /// Not interpreted
    pub unknown10: u32,

    /// Relocations to apply to the payload
    pub resolver: Option<ResolverTable>,

    /// Section data, `None` when the section is empty
    pub payload: Option<Vec<u8>>,
}

impl Section {
    /// An empty section of the given type
    pub fn new(id: u32, section_type: SectionType) -> Self {
        Self {
            id,
            section_type,
            unknown05: 0,
            unknown06: 0,
            flags: 0,
            unknown10: 0,
            resolver: None,
            payload: None,
        }
    }

    /// Payload bytes, empty when the section has no payload
    pub fn data(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X} {} ({} bytes)",
            self.id,
            self.section_type,
            self.data().len()
        )
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::{BinRead, Endian};
    use pretty_assertions::assert_eq;

    use super::{SectionHeader, SectionType};
    use crate::error::{Error, Result};

    #[test]
    fn section_types() -> Result<()> {
        assert_eq!(SectionType::try_from(5)?, SectionType::RenderResource);
        assert_eq!(u8::from(SectionType::StreamGroupList), 14);
        assert!(matches!(
            SectionType::try_from(3),
            Err(Error::UnsupportedFeature(_))
        ));
        Ok(())
    }

    #[test]
    fn read_big_endian_header() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            // Data size
            0x00, 0x00, 0x01, 0x00,
            // Type, unknown05, unknown06
            0x0C, 0x00, 0x12, 0x34,
            // Flags
            0x00, 0x00, 0x20, 0x01,
            // Id
            0xDE, 0xAD, 0xBE, 0xEF,
            // Unknown10
            0x00, 0x00, 0x00, 0x07,
        ];

        let header = SectionHeader::read_options(&mut Cursor::new(input), Endian::Big, ())?;

        assert_eq!(
            header,
            SectionHeader {
                data_size: 0x100,
                section_type: 12,
                unknown05: 0,
                unknown06: 0x1234,
                flags: 0x2001,
                id: 0xDEAD_BEEF,
                unknown10: 7,
            }
        );
        assert_eq!(header.resolver_size(), 0x20);

        Ok(())
    }
}
