//! The executable and shared libraries that were loaded into the process.
pub mod library;
pub mod link_map;
pub mod resolver;

pub use library::*;
pub use link_map::*;
pub use resolver::*;

use crate::debug::{CallFrameTable, Symbol, lookup_symbol};
use std::collections::BTreeMap;

/// A section (or, if no section table was available, a segment) of a module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleRange {
    /// Section name, empty for segments.
    pub name: String,
    pub base: u64,
    pub size: u64,

    /// Whether the core (or a library copy) has the bytes.
    pub backed: bool,
}

impl ModuleRange {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// Where a module's metadata (sections and symbols) came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ModuleSource {
    /// The headers dumped into the core.
    InCore,

    /// A copy found by the library resolver, e.g. on disk.
    External(String),

    /// Only the name and address are known.
    Missing,
}

#[derive(Debug)]
pub struct Module {
    /// Absolute path if the link map had one, otherwise the SONAME.
    pub name: String,

    /// Lowest address of the module's Load segments.
    pub base: u64,
    pub ranges: Vec<ModuleRange>,

    /// Function symbols sorted by address.
    pub symbols: Vec<Symbol>,
    pub properties: BTreeMap<String, String>,
    pub source: ModuleSource,
    pub cfi: Option<CallFrameTable>,
}

impl Module {
    /// A module we know exists but whose image isn't in the core and couldn't be found
    /// elsewhere.
    pub fn missing(name: &str, base: u64) -> Self {
        Module {
            name: name.to_string(),
            base,
            ranges: Vec::new(),
            symbols: Vec::new(),
            properties: BTreeMap::new(),
            source: ModuleSource::Missing,
            cfi: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.source == ModuleSource::Missing
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.ranges.iter().any(|r| r.contains(addr))
    }

    /// The function containing addr along with the offset into the function.
    pub fn symbol_for_address(&self, addr: u64) -> Option<(&Symbol, u64)> {
        lookup_symbol(&self.symbols, addr)
    }

    /// Last path component of the name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}
