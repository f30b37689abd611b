use super::MemorySource;
use crate::error::{CoreError, CoreResult};
use rangemap::RangeMap;
use std::collections::BTreeMap;
use std::ops::Range;

/// Longest string read_string_at will return. Longer strings are truncated.
pub const MAX_STRING_LENGTH: usize = 4096;

/// base + delta for addresses computed from values read out of the dump.
pub fn offset_address(base: u64, delta: u64) -> CoreResult<u64> {
    base.checked_add(delta)
        .ok_or_else(|| CoreError::fault(base, "address wraps around the address space"))
}

/// What happened to a source passed to AddressSpace::add_source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    /// Nothing was there.
    Added,

    /// The source replaced (all or part of) unbacked placeholders.
    Replaced,

    /// A range already at that base won.
    KeptExisting,

    /// The source was empty, wrapped around the address space, or partially overlapped
    /// a backed range.
    Rejected,
}

/// The memory of the process that cored: a set of non-overlapping ranges, each of
/// which is either backed by file data or an explicit placeholder.
#[derive(Debug)]
pub struct AddressSpace {
    pub sixty_four_bit: bool,
    pub little_endian: bool,
    ranges: RangeMap<u64, u64>, // values are the base address of the source
    sources: BTreeMap<u64, MemorySource>,
}

impl AddressSpace {
    pub fn new(sixty_four_bit: bool, little_endian: bool) -> Self {
        AddressSpace {
            sixty_four_bit,
            little_endian,
            ranges: RangeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    pub fn word_size(&self) -> u64 {
        if self.sixty_four_bit { 8 } else { 4 }
    }

    /// Adds a source. Backed ranges replace unbacked placeholders that they overlap
    /// (keeping whatever part of the placeholder they don't cover) but a backed range
    /// is never displaced.
    pub fn add_source(&mut self, source: MemorySource) -> AddOutcome {
        let Some(end) = source.end() else {
            return AddOutcome::Rejected;
        };
        if source.size == 0 || (source.base == 0 && source.size == u64::MAX) {
            return AddOutcome::Rejected;
        }
        let range = source.base..end;

        let overlapping: Vec<u64> = self
            .ranges
            .overlapping(&range)
            .map(|(_, base)| *base)
            .collect();
        if overlapping.is_empty() {
            self.insert(source);
            return AddOutcome::Added;
        }

        let blocked = !source.is_backed()
            || overlapping
                .iter()
                .any(|base| self.sources.get(base).is_some_and(|s| s.is_backed()));
        if blocked {
            if overlapping.contains(&source.base) {
                return AddOutcome::KeptExisting;
            }
            return AddOutcome::Rejected;
        }

        for base in overlapping {
            if let Some(old) = self.remove_source(base) {
                for piece in remainder(&old, &range) {
                    self.insert(piece);
                }
            }
        }
        self.insert(source);
        AddOutcome::Replaced
    }

    pub fn remove_source(&mut self, base: u64) -> Option<MemorySource> {
        let source = self.sources.remove(&base)?;
        if let Some(end) = source.end() {
            self.ranges.remove(source.base..end);
        }
        Some(source)
    }

    pub fn range_for_address(&self, addr: u64) -> Option<&MemorySource> {
        self.ranges.get(&addr).and_then(|base| self.sources.get(base))
    }

    pub fn source_at(&self, base: u64) -> Option<&MemorySource> {
        self.sources.get(&base)
    }

    pub fn is_mapped(&self, addr: u64) -> bool {
        self.ranges.contains_key(&addr)
    }

    /// Sources ordered by base address.
    pub fn sources(&self) -> impl Iterator<Item = &MemorySource> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Names the range containing addr, e.g. with a module name.
    pub fn set_name(&mut self, addr: u64, name: &str) {
        if let Some(base) = self.ranges.get(&addr).copied()
            && let Some(source) = self.sources.get_mut(&base)
        {
            source.name = Some(name.to_string());
        }
    }

    pub fn read_bytes(&self, addr: u64, len: usize) -> CoreResult<Vec<u8>> {
        let mut result = Vec::with_capacity(len.min(64 * 1024));
        let mut current = addr;
        while result.len() < len {
            let source = self
                .range_for_address(current)
                .ok_or_else(|| CoreError::fault(current, "address isn't mapped"))?;
            let bytes = source.bytes_from(current)?;
            let n = bytes.len().min(len - result.len());
            result.extend_from_slice(&bytes[..n]);
            if result.len() < len {
                current = current
                    .checked_add(n as u64)
                    .ok_or_else(|| CoreError::fault(addr, "read wraps around the address space"))?;
            }
        }
        Ok(result)
    }

    /// Like read_bytes but returns whatever could be read before the first fault.
    pub fn read_available(&self, addr: u64, max_len: usize) -> Vec<u8> {
        let mut result = Vec::new();
        let mut current = addr;
        while result.len() < max_len {
            let Some(source) = self.range_for_address(current) else {
                break;
            };
            let Ok(bytes) = source.bytes_from(current) else {
                break;
            };
            let n = bytes.len().min(max_len - result.len());
            result.extend_from_slice(&bytes[..n]);
            match current.checked_add(n as u64) {
                Some(next) => current = next,
                None => break,
            }
        }
        result
    }

    pub fn read_u8(&self, addr: u64) -> CoreResult<u8> {
        Ok(self.read_array::<1>(addr)?[0])
    }

    pub fn read_u16(&self, addr: u64) -> CoreResult<u16> {
        let bytes = self.read_array(addr)?;
        if self.little_endian {
            Ok(u16::from_le_bytes(bytes))
        } else {
            Ok(u16::from_be_bytes(bytes))
        }
    }

    pub fn read_u32(&self, addr: u64) -> CoreResult<u32> {
        let bytes = self.read_array(addr)?;
        if self.little_endian {
            Ok(u32::from_le_bytes(bytes))
        } else {
            Ok(u32::from_be_bytes(bytes))
        }
    }

    pub fn read_u64(&self, addr: u64) -> CoreResult<u64> {
        let bytes = self.read_array(addr)?;
        if self.little_endian {
            Ok(u64::from_le_bytes(bytes))
        } else {
            Ok(u64::from_be_bytes(bytes))
        }
    }

    /// Reads a word sized for the process (4 or 8 bytes).
    pub fn read_pointer(&self, addr: u64) -> CoreResult<u64> {
        if self.sixty_four_bit {
            self.read_u64(addr)
        } else {
            Ok(self.read_u32(addr)? as u64)
        }
    }

    /// Reads a null-terminated string, truncated to MAX_STRING_LENGTH bytes.
    pub fn read_string_at(&self, addr: u64) -> CoreResult<String> {
        let mut bytes = Vec::new();
        let mut current = addr;
        loop {
            let source = self
                .range_for_address(current)
                .ok_or_else(|| CoreError::fault(current, "address isn't mapped"))?;
            let chunk = source.bytes_from(current)?;
            let wanted = MAX_STRING_LENGTH - bytes.len();
            let chunk = &chunk[..chunk.len().min(wanted)];
            if let Some(n) = chunk.iter().position(|b| *b == 0) {
                bytes.extend_from_slice(&chunk[..n]);
                break;
            }
            bytes.extend_from_slice(chunk);
            if bytes.len() >= MAX_STRING_LENGTH {
                break;
            }
            current = current
                .checked_add(chunk.len() as u64)
                .ok_or_else(|| CoreError::fault(addr, "string wraps around the address space"))?;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns the address of the first occurrence of pattern at or after start.
    /// Matches that span two ranges aren't found.
    pub fn find_pattern(&self, pattern: &[u8], start: u64) -> Option<u64> {
        if pattern.is_empty() {
            return None;
        }
        for source in self.sources.values() {
            let end = source.end()?;
            if end <= start || !source.is_backed() {
                continue;
            }
            let from = start.max(source.base);
            let Ok(bytes) = source.bytes_from(from) else {
                continue;
            };
            if let Some(i) = bytes.windows(pattern.len()).position(|w| w == pattern) {
                return Some(from + i as u64);
            }
        }
        None
    }

    fn read_array<const N: usize>(&self, addr: u64) -> CoreResult<[u8; N]> {
        let bytes = self.read_bytes(addr, N)?;
        let mut result = [0; N];
        result.copy_from_slice(&bytes);
        Ok(result)
    }

    fn insert(&mut self, source: MemorySource) {
        if let Some(end) = source.end() {
            self.ranges.insert(source.base..end, source.base);
            self.sources.insert(source.base, source);
        }
    }
}

/// The parts of old that aren't covered by range.
fn remainder(old: &MemorySource, range: &Range<u64>) -> Vec<MemorySource> {
    let mut pieces = Vec::new();
    let Some(old_end) = old.end() else {
        return pieces;
    };
    if old.base < range.start {
        let mut piece = old.clone();
        piece.size = range.start - old.base;
        pieces.push(piece);
    }
    if old_end > range.end {
        let mut piece = old.clone();
        piece.base = range.end;
        piece.size = old_end - range.end;
        pieces.push(piece);
    }
    pieces
}
