//! Finding copies of the executable and libraries outside of the core. These have the
//! section tables and symbols that usually aren't loaded into memory.
use crate::elf::ByteSource;
use crate::error::CoreResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maps a library name (usually an absolute path from the link map, sometimes just a
/// SONAME) to its bytes. Ok(None) means not found which is normal.
pub trait LibraryResolver {
    fn resolve(&self, name: &str) -> CoreResult<Option<ByteSource>>;
}

/// For analyses that only use what's in the core.
pub struct NoLibraries;

impl LibraryResolver for NoLibraries {
    fn resolve(&self, _name: &str) -> CoreResult<Option<ByteSource>> {
        Ok(None)
    }
}

/// Looks on the local file system. Absolute paths are first tried under each of the
/// roots (e.g. a directory with libraries collected from the machine that cored) and
/// then as is. Relative names are only tried under the roots.
#[derive(Clone, Debug, Default)]
pub struct DiskResolver {
    roots: Vec<PathBuf>,
}

impl DiskResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        DiskResolver { roots }
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let path = Path::new(name);
        let relative = path.strip_prefix("/").unwrap_or(path);
        let mut result: Vec<PathBuf> = self.roots.iter().map(|r| r.join(relative)).collect();
        if path.is_absolute() {
            result.push(path.to_path_buf());
        }
        result
    }
}

impl LibraryResolver for DiskResolver {
    fn resolve(&self, name: &str) -> CoreResult<Option<ByteSource>> {
        if name.is_empty() {
            return Ok(None);
        }
        for path in self.candidates(name) {
            if path.is_file() {
                return ByteSource::open(&path).map(Some);
            }
        }
        Ok(None)
    }
}

/// Images that are already in memory, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct MemoryResolver {
    images: HashMap<String, ByteSource>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        MemoryResolver::default()
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.images
            .insert(name.to_string(), ByteSource::from_vec(name, bytes));
    }
}

impl LibraryResolver for MemoryResolver {
    fn resolve(&self, name: &str) -> CoreResult<Option<ByteSource>> {
        Ok(self.images.get(name).cloned())
    }
}
