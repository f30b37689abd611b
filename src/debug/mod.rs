//! Debugging support found in executables and libraries: function symbols from the
//! ELF symbol tables and call frame information from .eh_frame. Both can come from
//! files on disk or from module images dumped into the core.
pub mod cfi;
pub mod symbols;

pub use cfi::*;
pub use symbols::*;
