//! Reports for the commands users type, e.g. `bt` and `info threads`. Output goes to
//! any Write so the reports can be tested.
pub mod info;
pub mod misc;
pub mod tables;

pub use info::*;
pub use misc::*;
