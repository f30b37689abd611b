//! Generic ELF support. These can be core files, executables or libraries on disk, or
//! executables and libraries whose headers were dumped into a core file's segments.
//! Quick ELF reference: https://gist.github.com/x0nu11byt3/bcb35c3de461e5fb66173071a2379779
//!
//! ELF files start with an ELF header which includes:
//! * A magic number to identify the file as an ELF file.
//! * The word size and byte order used by the rest of the file.
//! * The offset to and number of program headers.
//! * The offset to and number of section headers.
//!
//! Program headers identify segments. For a core file the Load segments are the dumped
//! memory of the process and the Note segments hold per-thread registers and process
//! info. Section headers are used for static linking. They don't appear in core files
//! but the tables of executables and libraries give us symbols and finer grained
//! memory ranges.
pub mod dynamic;
pub mod elf_file;
pub mod header;
pub mod io;
pub mod notes;
pub mod sections;
pub mod segments;

pub use dynamic::*;
pub use elf_file::*;
pub use header::*;
pub use io::*;
pub use notes::*;
pub use sections::*;
pub use segments::*;
