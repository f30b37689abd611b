//! The address space of the process that cored. Core file Load segments provide most
//! of it. Sections from libraries can fill in ranges the core doesn't have.
pub mod address_space;
pub mod source;

pub use address_space::*;
pub use source::*;
