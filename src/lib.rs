//! Reconstructs the state of a Linux process from an ELF core file: its memory, the
//! executable and shared libraries it had loaded, and each thread's registers and
//! call stack.
pub mod arch;
pub mod commands;
pub mod debug;
pub mod elf;
pub mod error;
pub mod memory;
pub mod modules;
pub mod process;
pub mod utils;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use process::{CoreDump, Options};
