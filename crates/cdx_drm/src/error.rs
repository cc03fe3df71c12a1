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

    /// Bad magic or version, inconsistent sizes or truncated input
    #[error("malformed container: {0}")]
    #[diagnostic(code(cdx_drm::malformed_header))]
    MalformedHeader(String),

    /// A reserved field or flag is set, or a block or section type is unknown
    #[error("unsupported container feature: {0}")]
    #[diagnostic(
        code(cdx_drm::unsupported_feature),
        help("this part of the format has not been reverse engineered yet")
    )]
    UnsupportedFeature(String),

    /// The in-memory container can't be represented, or a section lookup is ambiguous
    #[error("container constraint violated: {0}")]
    #[diagnostic(code(cdx_drm::constraint_violation))]
    ConstraintViolation(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
