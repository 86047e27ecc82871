//! Error types.
//!
//! Three kinds, matching the three ways this engine can fail: a structurally
//! broken table graph, a legal-but-unimplemented construct, and (for callers
//! that layer their own I/O around this core) a passthrough I/O failure.
//! Plain enums with a manual `Display`/`Error` impl, in the style of
//! `read_fonts::ReadError` and `write_fonts::error::Error` — this core does
//! not pull in `thiserror`.

use std::fmt;

/// Errors produced while parsing or applying GSUB/GPOS/GDEF tables.
#[derive(Debug)]
pub enum Error {
    /// A structural defect in the table graph: a bad offset, an impossible
    /// count, a malformed sub-record. Only produced while parsing.
    InvalidFont {
        subsystem: &'static str,
        reason: String,
    },
    /// A legal but unimplemented construct: an unknown table version, or a
    /// device/variation-index table reached at apply time.
    UnsupportedFeature {
        subsystem: &'static str,
        feature: String,
    },
    /// Passed through from a byte-source collaborator; never produced by
    /// this core directly.
    Io(std::io::Error),
}

impl Error {
    pub(crate) fn invalid(subsystem: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidFont {
            subsystem,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(subsystem: &'static str, feature: impl Into<String>) -> Self {
        Error::UnsupportedFeature {
            subsystem,
            feature: feature.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidFont { subsystem, reason } => {
                write!(f, "invalid {subsystem}: {reason}")
            }
            Error::UnsupportedFeature { subsystem, feature } => {
                write!(f, "{subsystem}: unsupported feature: {feature}")
            }
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
