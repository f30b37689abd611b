use super::{Reader, Stream};
use crate::error::CoreResult;
use std::fmt;

pub const EM_386: u16 = 3;
pub const EM_PPC: u16 = 20;
pub const EM_PPC64: u16 = 21;
pub const EM_S390: u16 = 22;
pub const EM_ARM: u16 = 40;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
    None,
    Relocatable,
    Executable,
    SharedObject,
    Core,
    Other(u16),
}

impl FileType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => FileType::None,
            1 => FileType::Relocatable,
            2 => FileType::Executable,
            3 => FileType::SharedObject,
            4 => FileType::Core,
            _ => FileType::Other(value),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileType::None => fmt.write_str("none"),
            FileType::Relocatable => fmt.write_str("relocatable"),
            FileType::Executable => fmt.write_str("executable"),
            FileType::SharedObject => fmt.write_str("shared object"),
            FileType::Core => fmt.write_str("core"),
            FileType::Other(n) => write!(fmt, "0x{n:x}"),
        }
    }
}

/// Elf32_Ehdr or Elf64_Ehdr. The identification bytes were already validated when the
/// Reader was created.
#[derive(Clone, Debug)]
pub struct ElfHeader {
    pub sixty_four_bit: bool,
    pub little_endian: bool,
    pub abi: u8,
    pub abi_version: u8,
    pub file_type: FileType,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub ph_offset: u64,
    pub section_offset: u64,
    pub flags: u32,
    pub header_size: u16,
    pub ph_entry_size: u16,
    pub num_ph_entries: u16,
    pub section_entry_size: u16,
    pub num_section_entries: u16,
    pub string_table_index: u16,
}

impl ElfHeader {
    pub fn new(reader: &Reader) -> CoreResult<Self> {
        let abi = reader.read_byte(7)?;
        let abi_version = reader.read_byte(8)?;

        // Everything after e_ident has the same order in 32 and 64-bit files, only the
        // address and offset widths change.
        let mut s = Stream::new(reader, 16);
        let file_type = FileType::from_u16(s.read_half()?);
        let machine = s.read_half()?;
        let version = s.read_word()?;
        let entry = s.read_addr()?;
        let ph_offset = s.read_offset()?;
        let section_offset = s.read_offset()?;
        let flags = s.read_word()?;
        let header_size = s.read_half()?;
        let ph_entry_size = s.read_half()?;
        let num_ph_entries = s.read_half()?;
        let section_entry_size = s.read_half()?;
        let num_section_entries = s.read_half()?;
        let string_table_index = s.read_half()?;

        Ok(ElfHeader {
            sixty_four_bit: reader.sixty_four_bit,
            little_endian: reader.little_endian,
            abi,
            abi_version,
            file_type,
            machine,
            version,
            entry,
            ph_offset,
            section_offset,
            flags,
            header_size,
            ph_entry_size,
            num_ph_entries,
            section_entry_size,
            num_section_entries,
            string_table_index,
        })
    }

    pub fn machine_name(&self) -> &'static str {
        match self.machine {
            EM_386 => "Intel 80386",
            EM_PPC => "PowerPC",
            EM_PPC64 => "PowerPC 64-bit",
            EM_S390 => "IBM S/390",
            EM_ARM => "ARM",
            EM_X86_64 => "AMD x86-64",
            EM_AARCH64 => "ARM 64-bit",
            _ => "unknown",
        }
    }

    pub fn abi_name(&self) -> &'static str {
        match self.abi {
            0 => "System V",
            3 => "Linux",
            _ => "unknown",
        }
    }
}
