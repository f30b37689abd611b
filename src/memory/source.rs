use crate::elf::ByteSource;
use crate::error::{CoreError, CoreResult};

/// Where the bytes of a memory range come from.
#[derive(Clone, Debug)]
pub enum Backing {
    /// Bytes starting at offset within source.
    File { source: ByteSource, offset: u64 },

    /// The range was declared (e.g. by a program header) but its contents aren't
    /// available. Reads fault with the reason.
    Unbacked { reason: String },
}

/// A contiguous range of the process's address space.
#[derive(Clone, Debug)]
pub struct MemorySource {
    pub base: u64,
    pub size: u64,
    pub backing: Backing,

    /// PF_R, PF_W, PF_X as in program headers.
    pub flags: u32,

    /// Module or section name, "stack", etc.
    pub name: Option<String>,
}

impl MemorySource {
    pub fn backed(base: u64, size: u64, source: ByteSource, offset: u64, flags: u32) -> Self {
        MemorySource {
            base,
            size,
            backing: Backing::File { source, offset },
            flags,
            name: None,
        }
    }

    pub fn unbacked(base: u64, size: u64, reason: &str, flags: u32) -> Self {
        MemorySource {
            base,
            size,
            backing: Backing::Unbacked {
                reason: reason.to_string(),
            },
            flags,
            name: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn is_backed(&self) -> bool {
        matches!(self.backing, Backing::File { .. })
    }

    /// One past the last address. None for ranges that run off the end of the address
    /// space, which aren't allowed in an AddressSpace.
    pub fn end(&self) -> Option<u64> {
        self.base.checked_add(self.size)
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// The bytes from addr to the end of the range (or the end of the file, if the
    /// file was truncated).
    pub fn bytes_from(&self, addr: u64) -> CoreResult<&[u8]> {
        if !self.contains(addr) {
            return Err(CoreError::fault(addr, "outside of memory range"));
        }
        match &self.backing {
            Backing::File { source, offset } => {
                let delta = addr - self.base;
                let start = offset.checked_add(delta).map(|n| n as usize);
                let end = offset.checked_add(self.size).map(|n| n as usize);
                let bytes = source.as_slice();
                match (start, end) {
                    (Some(start), Some(end)) if start < bytes.len() => {
                        Ok(&bytes[start..end.min(bytes.len())])
                    }
                    _ => Err(CoreError::fault(addr, "file backing the range is truncated")),
                }
            }
            Backing::Unbacked { reason } => Err(CoreError::fault(addr, reason.clone())),
        }
    }
}
