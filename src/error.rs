//! Errors produced while reading a core file. Most of these are recoverable: callers
//! that reconstruct modules, threads, or symbol tables record them as diagnostics and
//! keep going with whatever they could salvage.
use std::fmt;
use thiserror::Error;

/// Broad classification used by diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ErrorKind {
    /// Bad magic, unsupported class or version. Fatal for that one ELF image.
    Format,

    /// An address that isn't mapped, isn't backed by file data, or whose arithmetic
    /// wrapped around.
    MemoryFault,

    /// A malformed record, truncated string, implausible length, etc.
    CorruptData,

    /// A library or executable that couldn't be found.
    MissingResource,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bad ELF format: {0}")]
    Format(String),

    #[error("memory fault at 0x{address:x}: {reason}")]
    MemoryFault { address: u64, reason: String },

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("missing {0}")]
    MissingResource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("call frame information: {0}")]
    Dwarf(#[from] gimli::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn format(mesg: impl Into<String>) -> Self {
        CoreError::Format(mesg.into())
    }

    pub fn corrupt(mesg: impl Into<String>) -> Self {
        CoreError::CorruptData(mesg.into())
    }

    pub fn missing(mesg: impl Into<String>) -> Self {
        CoreError::MissingResource(mesg.into())
    }

    pub fn fault(address: u64, reason: impl Into<String>) -> Self {
        CoreError::MemoryFault {
            address,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Format(_) => ErrorKind::Format,
            CoreError::MemoryFault { .. } => ErrorKind::MemoryFault,
            CoreError::CorruptData(_) => ErrorKind::CorruptData,
            CoreError::MissingResource(_) => ErrorKind::MissingResource,
            CoreError::Io(_) => ErrorKind::MissingResource,
            CoreError::Dwarf(_) => ErrorKind::CorruptData,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Format => fmt.write_str("format"),
            ErrorKind::MemoryFault => fmt.write_str("memory fault"),
            ErrorKind::CorruptData => fmt.write_str("corrupt data"),
            ErrorKind::MissingResource => fmt.write_str("missing resource"),
        }
    }
}
