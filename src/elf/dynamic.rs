//! The dynamic table (PT_DYNAMIC) as it exists in the memory of the process. The
//! run-time loader relocates some of these entries in place so they are read from the
//! address space rather than from the file.
use crate::error::CoreResult;
use crate::memory::{AddressSpace, offset_address};

pub const DT_NULL: u64 = 0;
pub const DT_STRTAB: u64 = 5;
pub const DT_SONAME: u64 = 14;
pub const DT_DEBUG: u64 = 21;

/// Upper bound on entries read from one table.
const MAX_DYNAMIC_ENTRIES: usize = 4096;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DynamicEntry {
    pub tag: u64,
    pub value: u64,
}

#[derive(Clone, Debug, Default)]
pub struct DynamicTable {
    pub entries: Vec<DynamicEntry>,

    /// Set if reading stopped at a tag that isn't valid.
    pub bad_tag: Option<u64>,
}

impl DynamicTable {
    /// Reads entries until DT_NULL, an invalid tag, or size bytes.
    pub fn read(space: &AddressSpace, addr: u64, size: u64) -> CoreResult<Self> {
        let word = space.word_size();
        let count = (size / (2 * word)) as usize;
        let mut table = DynamicTable::default();
        for i in 0..count.min(MAX_DYNAMIC_ENTRIES) {
            let entry_addr = offset_address(addr, (i as u64) * 2 * word)?;
            let tag = space.read_pointer(entry_addr)?;
            if tag == DT_NULL {
                break;
            }
            if !is_valid_tag(tag) {
                table.bad_tag = Some(tag);
                break;
            }
            let value = space.read_pointer(offset_address(entry_addr, word)?)?;
            table.entries.push(DynamicEntry { tag, value });
        }
        Ok(table)
    }

    pub fn find(&self, tag: u64) -> Option<u64> {
        self.entries.iter().find(|e| e.tag == tag).map(|e| e.value)
    }
}

/// Generic tags plus the OS and processor specific ranges.
pub fn is_valid_tag(tag: u64) -> bool {
    tag <= 33 || (0x6000_0000..=0x6fff_ffff).contains(&tag) || (0x7000_0000..=0x7fff_ffff).contains(&tag)
}
