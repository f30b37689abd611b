//! Used by the linker and debugger. Also see segments. Core files normally have no
//! section headers but executables and libraries (on disk or inside the core) do.
use super::{ElfHeader, Reader, Stream};
use crate::error::{CoreError, CoreResult};

const WRITE_FLAG: u64 = 1 << 0; // Writable
const ALLOC_FLAG: u64 = 1 << 1; // Occupies memory during execution
const EXECINSTR_FLAG: u64 = 1 << 2; // Executable
const MERGE_FLAG: u64 = 1 << 4; // Might be merged
const STRINGS_FLAG: u64 = 1 << 5; // Contains nul-terminated strings
const TLS_FLAG: u64 = 1 << 10; // Section hold thread-local data.

/// Describes a section.
#[derive(Clone, Debug, PartialEq)]
pub struct SectionHeader {
    // Elf32_Shdr or Elf64_Shdr, see https://gist.github.com/x0nu11byt3/bcb35c3de461e5fb66173071a2379779
    /// Index into the section name string table. Zero means no name.
    pub name: u32,

    /// Type of the section.
    pub stype: SectionType,

    /// Write, alloc, and/or exec.
    pub flags: u64,

    /// Virtual address of the first byte, zero if the section isn't loaded.
    pub addr: u64,

    /// Offset of the first byte within the ELF file.
    pub offset: u64,

    pub size: u64,

    /// Link to another section with related information, usually a string
    /// or symbol table.
    pub link: u32,

    /// Additional section info.
    pub info: u32,

    /// Section alignment.
    pub align: u64,

    /// Set if the section holds a table of entries.
    pub entry_size: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SectionType {
    /// Dynamic linking information.
    Dynamic,

    // Dynamic linker symbol table.
    DynamicSymbolTable,

    /// Array of pointers to termination functions.
    FiniArray,

    /// GNU style hash table.
    GnuHash,

    /// Array of pointers to initialization functions.
    InitArray,

    /// Uninitialized data.
    NoBits,

    /// Arbitrary metadata.
    Note,

    /// Not to be used.
    Null,

    /// CPU instructions or constant data.
    ProgBits,

    /// Relocation entries with addends.
    RelocationsWith,

    /// Relocation entries without addends.
    RelocationsWithout,

    /// Strings for use by the linker and debugger.
    StringTable,

    /// Symbol hash table.
    SymbolHashTable,

    /// Full symbol table, usually stripped from release builds.
    SymbolTable,

    /// OS or processor specific.
    Other(u32),
}

impl SectionType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0 => SectionType::Null, // see https://android.googlesource.com/platform/art/+/e34fa1d/runtime/elf.h
            0x1 => SectionType::ProgBits,
            0x2 => SectionType::SymbolTable,
            0x3 => SectionType::StringTable,
            0x4 => SectionType::RelocationsWith,
            0x5 => SectionType::SymbolHashTable,
            0x6 => SectionType::Dynamic,
            0x7 => SectionType::Note,
            0x8 => SectionType::NoBits,
            0x9 => SectionType::RelocationsWithout,
            0xb => SectionType::DynamicSymbolTable,
            0xe => SectionType::InitArray,
            0xf => SectionType::FiniArray,
            0x6ffffff6 => SectionType::GnuHash,
            _ => SectionType::Other(value),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            SectionType::Null => 0x0,
            SectionType::ProgBits => 0x1,
            SectionType::SymbolTable => 0x2,
            SectionType::StringTable => 0x3,
            SectionType::RelocationsWith => 0x4,
            SectionType::SymbolHashTable => 0x5,
            SectionType::Dynamic => 0x6,
            SectionType::Note => 0x7,
            SectionType::NoBits => 0x8,
            SectionType::RelocationsWithout => 0x9,
            SectionType::DynamicSymbolTable => 0xb,
            SectionType::InitArray => 0xe,
            SectionType::FiniArray => 0xf,
            SectionType::GnuHash => 0x6ffffff6,
            SectionType::Other(n) => n,
        }
    }
}

impl SectionHeader {
    pub fn new(reader: &Reader, offset: usize) -> CoreResult<Self> {
        let mut s = Stream::new(reader, offset);
        if reader.sixty_four_bit {
            Ok(SectionHeader {
                name: s.read_word()?,
                stype: SectionType::from_u32(s.read_word()?),
                flags: s.read_xword()?,
                addr: s.read_addr()?,
                offset: s.read_offset()?,
                size: s.read_xword()?,
                link: s.read_word()?,
                info: s.read_word()?,
                align: s.read_xword()?,
                entry_size: s.read_xword()?,
            })
        } else {
            Ok(SectionHeader {
                name: s.read_word()?,
                stype: SectionType::from_u32(s.read_word()?),
                flags: s.read_word()? as u64,
                addr: s.read_addr()?,
                offset: s.read_offset()?,
                size: s.read_word()? as u64,
                link: s.read_word()?,
                info: s.read_word()?,
                align: s.read_word()? as u64,
                entry_size: s.read_word()? as u64,
            })
        }
    }

    pub fn is_alloc(&self) -> bool {
        self.flags & ALLOC_FLAG != 0
    }

    /// Protection flags in program header form (PF_X, PF_W, PF_R).
    pub fn segment_flags(&self) -> u32 {
        let mut flags = 0x4;
        if self.flags & WRITE_FLAG != 0 {
            flags |= 0x2;
        }
        if self.flags & EXECINSTR_FLAG != 0 {
            flags |= 0x1;
        }
        flags
    }

    pub fn is_symbol_table(&self) -> bool {
        matches!(
            self.stype,
            SectionType::SymbolTable | SectionType::DynamicSymbolTable
        )
    }

    /// The SHN_UNDEF entry that starts every section table is all zeros.
    fn is_null_entry(&self) -> bool {
        self.name == 0
            && self.stype == SectionType::Null
            && self.flags == 0
            && self.addr == 0
            && self.offset == 0
            && self.size == 0
            && self.link == 0
            && self.info == 0
            && self.align == 0
            && self.entry_size == 0
    }

    pub fn flags_str(flags: u64) -> String {
        let mut result = Vec::new();
        if flags & WRITE_FLAG != 0 {
            result.push("WRITE");
        }
        if flags & ALLOC_FLAG != 0 {
            result.push("ALLOC");
        }
        if flags & EXECINSTR_FLAG != 0 {
            result.push("EXEC");
        }
        if flags & MERGE_FLAG != 0 {
            result.push("MERGE");
        }
        if flags & STRINGS_FLAG != 0 {
            result.push("STRINGS");
        }
        if flags & TLS_FLAG != 0 {
            result.push("TLS");
        }
        if result.is_empty() {
            result.push("none");
        }
        result.join(" ")
    }
}

/// Reads the section header table. Section tables inside core files have often been
/// overwritten (or were never loaded) so the table is only trusted if the first entry
/// is the all-zero null entry and the second entry has a non-zero size. After that
/// entries are read until one fails to read or fails a sanity check. Entries that were
/// validated before the failure are kept.
pub fn read_section_table(reader: &Reader, header: &ElfHeader) -> CoreResult<Vec<SectionHeader>> {
    let count = header.num_section_entries as usize;
    if count < 3 {
        return Ok(Vec::new());
    }

    let entry_size = header.section_entry_size as usize;
    let min_size = if reader.sixty_four_bit { 64 } else { 40 };
    if entry_size < min_size {
        return Err(CoreError::corrupt(format!(
            "section header entries are too small ({entry_size} bytes)"
        )));
    }

    let start = header.section_offset as usize;
    let first = SectionHeader::new(reader, start)?;
    if !first.is_null_entry() {
        return Err(CoreError::corrupt("first section header isn't the null entry"));
    }
    let second = SectionHeader::new(reader, start + entry_size)?;
    if second.size == 0 {
        return Err(CoreError::corrupt("second section header has zero size"));
    }

    let mut sections = vec![first, second];
    for i in 2..count {
        let Ok(section) = SectionHeader::new(reader, start + i * entry_size) else {
            break;
        };
        if section.link as usize >= count {
            break;
        }
        sections.push(section);
    }
    Ok(sections)
}
