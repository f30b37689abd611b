use crate::elf::{ElfFile, Reader, SectionHeader, SectionType, Stream};
use crate::error::{CoreError, CoreResult};

/// Upper bound on entries read from one symbol table.
pub const MAX_SYMBOLS: usize = 1 << 20;

/// A function symbol with its address corrected for where the module was loaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub address: u64,

    /// Zero if the size is unknown.
    pub size: u64,
    pub function: bool,
}

pub struct SymbolTableEntry {
    // see https://refspecs.linuxbase.org/elf/gabi4+/ch4.symtab.html
    /// Index into the symbol string table.
    pub name: u32,

    /// Can be an address, absolute value, etc.
    pub value: u64,

    /// Size of the symbol. Zero if the symbol has no or unknown size.
    pub size: u64,

    pub stype: SymbolType,

    pub binding: SymbolBinding,

    pub visibility: SymbolVisibility,

    pub index: SymbolIndex,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolIndex {
    /// Symbol has an absolute value that will not change with relocation.
    Abs,

    /// A common block that has not yet been allocated. Value has alignment.
    Common,

    /// Symbol value refers to another section at this index.
    Index(u16),

    /// Value is undefined. Linker will fix these up.
    Undef,

    /// Used when Index overflows. Related section will be of type SHT_SYMTAB_SHNDX.
    XIndex,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolVisibility {
    /// Visibility is per binding.
    Default,

    /// Visible only within its object file. CPU may special case this.
    Internal,

    /// Visible only within its object file.
    Hidden,

    /// Visible to other object files but cannot be prempted.
    Protected,
}

/// Linkage visibility and behavior
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolBinding {
    /// Symbol is not visible outside the object file containing its definition. These
    /// will appear before global and weak symbols in the table.
    Local,

    /// Visible to all object files.
    Global,

    /// Similar to Global but has lower precedence. These can be preempted by a Global.
    Weak,

    /// For use by OS or CPU.
    Reserved,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolType {
    None,

    /// A data object, variable, array, etc.
    Object,

    /// Function or other executable code.
    Func,

    /// Another section. Used for relocation.
    Section,

    /// Source file associated with the symbol table.
    File,

    /// Uninitialized common blocks. Used by the linker.
    Common,

    /// Thread Local Storage data. Value is an offset to the data.
    Tls,

    /// For use by OS or CPU.
    Reserved,
}

impl SymbolTableEntry {
    pub fn new(reader: &Reader, offset: usize) -> CoreResult<Self> {
        // Field order is different so we need both cases.
        let mut s = Stream::new(reader, offset);
        let (name, value, size, info, other, index) = if reader.sixty_four_bit {
            let name = s.read_word()?; // 4
            let info = s.read_byte()?; // 1
            let other = s.read_byte()?; // 1
            let index = s.read_half()?; // 2
            let value = s.read_addr()?; // 8
            let size = s.read_xword()?; // 8
            (name, value, size, info, other, index)
        } else {
            let name = s.read_word()?;
            let value = s.read_addr()?;
            let size = s.read_word()? as u64;
            let info = s.read_byte()?;
            let other = s.read_byte()?;
            let index = s.read_half()?;
            (name, value, size, info, other, index)
        };
        Ok(SymbolTableEntry {
            name,
            value,
            size,
            stype: SymbolType::from_u8(info),
            binding: SymbolBinding::from_u8(info),
            visibility: SymbolVisibility::from_u8(other),
            index: SymbolIndex::from_u16(index),
        })
    }

    pub fn entry_size(reader: &Reader) -> usize {
        if reader.sixty_four_bit { 24 } else { 16 }
    }
}

impl SymbolIndex {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => SymbolIndex::Undef,
            0xfff1 => SymbolIndex::Abs,
            0xfff2 => SymbolIndex::Common,
            0xffff => SymbolIndex::XIndex,
            _ => SymbolIndex::Index(value),
        }
    }
}

impl SymbolVisibility {
    pub fn from_u8(value: u8) -> Self {
        match value & 0x3 {
            1 => SymbolVisibility::Internal,
            2 => SymbolVisibility::Hidden,
            3 => SymbolVisibility::Protected,
            _ => SymbolVisibility::Default,
        }
    }
}

impl SymbolBinding {
    pub fn from_u8(value: u8) -> Self {
        match value >> 4 {
            0 => SymbolBinding::Local,
            1 => SymbolBinding::Global,
            2 => SymbolBinding::Weak,
            _ => SymbolBinding::Reserved,
        }
    }
}

impl SymbolType {
    pub fn from_u8(value: u8) -> Self {
        match value & 0xf {
            0 => SymbolType::None,
            1 => SymbolType::Object,
            2 => SymbolType::Func,
            3 => SymbolType::Section,
            4 => SymbolType::File,
            5 => SymbolType::Common,
            6 => SymbolType::Tls,
            _ => SymbolType::Reserved,
        }
    }
}

/// Symbol values in executables are usually absolute but in shared libraries they are
/// relative to the load address. Values at or above the base are taken to be absolute
/// already so correcting twice is harmless. The comparison is unsigned: values in the
/// upper half of the address space count as absolute rather than negative offsets.
pub fn correct_value(value: u64, base: u64) -> u64 {
    if value >= base {
        value
    } else {
        base.wrapping_add(value)
    }
}

/// Reads the function symbols from one SYMTAB or DYNSYM section. If the table can only
/// be partially read the symbols before the bad entry are returned along with the
/// error.
pub fn read_function_symbols(
    file: &ElfFile,
    section: &SectionHeader,
    base: u64,
) -> (Vec<Symbol>, Option<CoreError>) {
    let mut symbols = Vec::new();
    let entry_size = match section.entry_size as usize {
        0 => SymbolTableEntry::entry_size(&file.reader),
        n => n,
    };
    let count = (section.size as usize / entry_size).min(MAX_SYMBOLS);
    let strings = section.link as usize;

    for i in 0..count {
        let Some(offset) = (section.offset as usize).checked_add(i * entry_size) else {
            let err = CoreError::corrupt(format!(
                "symbol table in {} runs past the end of memory",
                file.name
            ));
            return (symbols, Some(err));
        };
        let entry = match SymbolTableEntry::new(&file.reader, offset) {
            Ok(entry) => entry,
            Err(err) => {
                let err = CoreError::corrupt(format!(
                    "symbol {i} of {} in {}: {err}",
                    count, file.name
                ));
                return (symbols, Some(err));
            }
        };
        if entry.stype != SymbolType::Func || entry.value == 0 {
            continue;
        }
        match file.find_string(strings, entry.name as usize) {
            Ok(name) if !name.is_empty() => symbols.push(Symbol {
                name,
                address: correct_value(entry.value, base),
                size: entry.size,
                function: true,
            }),
            _ => continue,
        }
    }
    (symbols, None)
}

/// All the function symbols in a module's symbol tables, sorted by address.
pub fn module_symbols(file: &ElfFile, base: u64) -> (Vec<Symbol>, Vec<CoreError>) {
    let mut symbols = Vec::new();
    let mut errors = Vec::new();
    let tables = file
        .find_sections(SectionType::SymbolTable)
        .chain(file.find_sections(SectionType::DynamicSymbolTable));
    for section in tables {
        let (mut found, err) = read_function_symbols(file, section, base);
        symbols.append(&mut found);
        errors.extend(err);
    }
    symbols.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));
    symbols.dedup_by(|a, b| a.address == b.address && a.name == b.name);
    (symbols, errors)
}

/// Finds the symbol containing addr within symbols sorted by address. Symbols with an
/// unknown size extend to the next symbol.
pub fn lookup_symbol(symbols: &[Symbol], addr: u64) -> Option<(&Symbol, u64)> {
    let index = symbols.partition_point(|s| s.address <= addr);
    let symbol = symbols.get(index.checked_sub(1)?)?;
    let offset = addr - symbol.address;
    if symbol.size != 0 && offset >= symbol.size {
        return None;
    }
    Some((symbol, offset))
}
