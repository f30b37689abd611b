//! The process that cored: its threads and their stacks, plus the knobs and the
//! diagnostics for one analysis.
pub mod core_dump;
pub mod diagnostics;
pub mod options;
pub mod stack;
pub mod thread;

pub use core_dump::*;
pub use diagnostics::*;
pub use options::*;
pub use stack::*;
pub use thread::*;
