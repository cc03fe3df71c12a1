//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Bad magic, bad version, unexpected alignment constant or truncated header
    #[error("malformed archive header: {0}")]
    #[diagnostic(code(cdx_bigfile::malformed_header))]
    MalformedHeader(String),

    /// A field uses a value whose meaning has not been reverse engineered
    #[error("unsupported archive feature: {0}")]
    #[diagnostic(code(cdx_bigfile::unsupported_feature))]
    UnsupportedFeature(String),

    /// The in-memory index does not satisfy the invariants of the target format
    #[error("archive constraint violated: {0}")]
    #[diagnostic(code(cdx_bigfile::constraint_violation))]
    ConstraintViolation(String),

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by hash and locale
    #[error("by hash {name_hash:08X} and locale {locale:08X}")]
    Key {
        /// Content hash of the entry
        name_hash: u32,
        /// Locale mask of the entry
        locale: u32,
    },
}

/// A file that did not fit inside a single volume and was only partially stored
///
/// This is not fatal: packing continues and the diagnostic is handed back to the caller.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
#[error("file {name_hash:08X} ({length} bytes) can't fit in a volume, only {stored} bytes were stored")]
#[diagnostic(
    code(cdx_bigfile::capacity_overflow),
    severity(Warning),
    help("increase the block alignment of the archive")
)]
pub struct CapacityOverflow {
    /// Content hash of the truncated file
    pub name_hash: u32,
    /// Locale mask of the truncated file
    pub locale: u32,
    /// Length of the source file
    pub length: u64,
    /// Number of bytes that were written to the volume
    pub stored: u64,
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
