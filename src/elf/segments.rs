//! Used by the run-time loader. Also see sections.
use super::{Reader, Stream};
use crate::error::CoreResult;

const EXECUTE_FLAG: u32 = 0x1;
const WRITE_FLAG: u32 = 0x2;
const READ_FLAG: u32 = 0x4;

/// Describes a segment. For core files the Load segments are the memory of the
/// process and the Note segments hold registers and process info.
#[derive(Clone, Debug)]
pub struct ProgramHeader {
    // Elf64_Phdr or Elf32_Phdr, see https://llvm.org/doxygen/BinaryFormat_2ELF_8h_source.html
    pub stype: SegmentType,

    /// Offset to the first byte of the segment.
    pub offset: u64,

    /// Virtual address of the first byte in the segment.
    pub vaddr: u64,

    /// Physical address of the first byte in the segment.
    pub paddr: u64,

    /// Number of bytes in the segment in the file. Zero for memory that wasn't dumped.
    pub file_size: u64,

    /// Number of bytes in the segment in memory.
    pub mem_size: u64,

    /// Read/Write/Execute flags.
    pub flags: u32,

    pub align: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentType {
    /// Not to be used.
    Null,

    /// A loadable segment, described by p_filesz and p_memsz.
    Load,

    /// Specifies dynamic linking information.
    Dynamic,

    /// Location and size of a null-terminated path name to invoke as an interpreter.
    Interpreter,

    /// The location and size of auxiliary information.
    Note,

    /// Reserved but has unspecified semantics.
    Shlib,

    /// The location and size of the program header table itself.
    Phdr,

    /// The Thread-Local Storage template.
    Tls,

    /// The .eh_frame_hdr section, used to find call frame information.
    GnuEhFrame,

    /// Stack permissions.
    GnuStack,

    /// Read-only after relocation.
    GnuRelro,

    /// OS or processor specific.
    Other(u32),
}

impl SegmentType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => SegmentType::Null,
            1 => SegmentType::Load,
            2 => SegmentType::Dynamic,
            3 => SegmentType::Interpreter,
            4 => SegmentType::Note,
            5 => SegmentType::Shlib,
            6 => SegmentType::Phdr,
            7 => SegmentType::Tls,
            0x6474e550 => SegmentType::GnuEhFrame,
            0x6474e551 => SegmentType::GnuStack,
            0x6474e552 => SegmentType::GnuRelro,
            _ => SegmentType::Other(value),
        }
    }
}

impl ProgramHeader {
    pub fn new(reader: &Reader, offset: usize) -> CoreResult<Self> {
        // Field sizes and order differ between 32-bit and 64-bit ELF files,
        // see https://llvm.org/doxygen/BinaryFormat_2ELF_8h_source.html.
        let mut s = Stream::new(reader, offset);
        if reader.sixty_four_bit {
            let p_type = SegmentType::from_u32(s.read_word()?);
            let p_flags = s.read_word()?;
            let p_offset = s.read_offset()?;
            let p_vaddr = s.read_addr()?;
            let p_paddr = s.read_addr()?;
            let p_filesz = s.read_xword()?;
            let p_memsz = s.read_xword()?;
            let p_align = s.read_xword()?;
            Ok(ProgramHeader {
                stype: p_type,
                flags: p_flags,
                offset: p_offset,
                vaddr: p_vaddr,
                paddr: p_paddr,
                file_size: p_filesz,
                mem_size: p_memsz,
                align: p_align,
            })
        } else {
            let p_type = SegmentType::from_u32(s.read_word()?);
            let p_offset = s.read_offset()?;
            let p_vaddr = s.read_addr()?;
            let p_paddr = s.read_addr()?;
            let p_filesz = s.read_word()? as u64;
            let p_memsz = s.read_word()? as u64;
            let p_flags = s.read_word()?;
            let p_align = s.read_word()? as u64;
            Ok(ProgramHeader {
                stype: p_type,
                flags: p_flags,
                offset: p_offset,
                vaddr: p_vaddr,
                paddr: p_paddr,
                file_size: p_filesz,
                mem_size: p_memsz,
                align: p_align,
            })
        }
    }

    pub fn is_load(&self) -> bool {
        self.stype == SegmentType::Load
    }

    /// Declared but not backed by any bytes in the file.
    pub fn is_empty(&self) -> bool {
        self.file_size == 0
    }

    /// True if addr is within the segment's memory image.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.vaddr && addr - self.vaddr < self.mem_size
    }

    /// Translates a virtual address into an offset from the start of the ELF image.
    /// Only addresses with bytes in the file translate.
    pub fn to_offset(&self, addr: u64) -> Option<u64> {
        if addr >= self.vaddr && addr - self.vaddr < self.file_size {
            self.offset.checked_add(addr - self.vaddr)
        } else {
            None
        }
    }

    pub fn executable(&self) -> bool {
        self.flags & EXECUTE_FLAG != 0
    }

    pub fn writeable(&self) -> bool {
        self.flags & WRITE_FLAG != 0
    }

    pub fn readable(&self) -> bool {
        self.flags & READ_FLAG != 0
    }

    pub fn flags_str(flags: u32) -> String {
        let mut result = String::new();
        result.push(if flags & READ_FLAG != 0 { 'r' } else { '-' });
        result.push(if flags & WRITE_FLAG != 0 { 'w' } else { '-' });
        result.push(if flags & EXECUTE_FLAG != 0 { 'x' } else { '-' });
        result
    }
}
