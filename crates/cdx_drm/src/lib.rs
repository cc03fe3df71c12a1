//! This library decodes the **DRM** resource containers used by Crystal Dynamics titles,
//! and the **CDRM** block compression envelope they are usually wrapped in.
//!
//! # Container Format Documentation
//!
//! A container is a list of typed sections. Every section carries a payload and an optional
//! relocation table, see [`resolver`], used to turn offsets inside the payload into pointers.
//! [`DrmContainer::read`] transparently decompresses containers stored in a CDRM envelope,
//! see [`cdrm`] for that layout.
//!
//! ## Header
//!
//! | Offset (bytes) | Field                  | Description                                        |
//! |----------------|------------------------|----------------------------------------------------|
//! | 0x0000         | Version                | 4 bytes: 21, byte swapped for big endian           |
//! | 0x0004         | Unknown04 Size         | 4 bytes: size of the second string blob            |
//! | 0x0008         | Unknown08 Size         | 4 bytes: size of the first string blob             |
//! | 0x000C         | Unknown0C              | 4 bytes: must be 0                                 |
//! | 0x0010         | Unknown10              | 4 bytes                                            |
//! | 0x0014         | Flags                  | 4 bytes: bit 0 enables 16 byte alignment           |
//! | 0x0018         | Section Count          | 4 bytes                                            |
//! | 0x001C         | Unknown1C              | 4 bytes                                            |
//!
//! The header is followed by one 20 byte header per section, the Unknown08 strings, the
//! Unknown04 strings and finally the resolver table and payload of every section in order.
//! When bit 0 of the flags is set, the string blobs, every resolver table and every payload
//! end on a 16 byte boundary, relative to the start of the container.
//!
//! ## Section Header
//!
//! | Offset (bytes) | Field                  | Description                                        |
//! |----------------|------------------------|----------------------------------------------------|
//! | 0x0000         | Data Size              | 4 bytes: size of the payload                       |
//! | 0x0004         | Type                   | 1 byte: see [`SectionType`]                        |
//! | 0x0005         | Unknown05              | 1 byte: bit 0 must be clear                        |
//! | 0x0006         | Unknown06              | 2 bytes                                            |
//! | 0x0008         | Flags                  | 4 bytes: resolver table size in bits 8..32         |
//! | 0x000C         | Id                     | 4 bytes                                            |
//! | 0x0010         | Unknown10              | 4 bytes                                            |
//!
//! ## Additional Information
//!
//! - **Strings**: zero terminated ASCII filling their blob
//! - **Resolver records**: little endian in shipped data even in big endian containers,
//!   configurable through [`DrmReadOptions`]
//!

pub mod cdrm;
pub mod container;
pub mod error;
pub mod resolver;
pub mod section;

pub use binrw::Endian;
pub use container::{DrmContainer, DrmReadOptions, ResolverByteOrder};
pub use resolver::{LocalRelocation, RemoteRelocation, ResolverTable, TypedRelocation};
pub use section::{Section, SectionHeader, SectionType};
