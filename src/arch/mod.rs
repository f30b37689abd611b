//! Per instruction set knowledge: how PRSTATUS lays out the registers, which registers
//! are the stack, frame, instruction, and link registers, and how DWARF numbers the
//! registers. Each supported ISA is a static [`Architecture`] selected once from the
//! ELF header.
pub mod arm;
pub mod ppc;
pub mod s390;
pub mod x86;

use crate::elf::{EM_386, EM_AARCH64, EM_ARM, EM_PPC, EM_PPC64, EM_S390, EM_X86_64, Stream};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;

/// Register name to value. Names are the ones used in [`Architecture::note_layout`].
pub type Registers = BTreeMap<&'static str, u64>;

pub struct Architecture {
    pub name: &'static str,

    /// e_machine
    pub machine: u16,
    pub sixty_four_bit: bool,

    /// pr_reg as (name, width in bytes). Slots with an empty name are skipped.
    pub note_layout: &'static [(&'static str, u8)],

    /// Registers that are 32 bits wide but are stored in the high half of an 8 byte
    /// slot.
    pub high_words: &'static [&'static str],

    pub stack_pointer: &'static str,

    /// Same as stack_pointer on ISAs without a dedicated frame pointer.
    pub base_pointer: &'static str,
    pub instruction_pointer: &'static str,
    pub link_register: Option<&'static str>,

    /// Indexed by DWARF register number. Empty names are registers we don't track.
    pub dwarf_registers: &'static [&'static str],

    /// Applied to instruction pointers before they are used as addresses.
    pub ip_mask: Option<u64>,

    /// Words from the saved frame pointer to the saved return address.
    pub ip_offset_from_bp: u64,

    /// Width of the uid and gid fields within PRPSINFO.
    pub uid_width: u8,

    /// Reported as the processor type of the core file.
    pub processor_type: &'static str,
}

impl Architecture {
    /// Selects the ISA for an ELF header's e_machine and class.
    pub fn for_machine(machine: u16, sixty_four_bit: bool) -> CoreResult<&'static Architecture> {
        match (machine, sixty_four_bit) {
            (EM_X86_64, true) => Ok(&x86::AMD64),
            (EM_386, false) => Ok(&x86::IA32),
            (EM_PPC | EM_PPC64, true) => Ok(&ppc::PPC64),
            (EM_PPC, false) => Ok(&ppc::PPC32),
            (EM_S390, true) => Ok(&s390::S390X),
            (EM_S390, false) => Ok(&s390::S390),
            (EM_AARCH64, true) => Ok(&arm::AARCH64),
            (EM_ARM, false) => Ok(&arm::ARM32),
            _ => {
                let bits = if sixty_four_bit { 64 } else { 32 };
                Err(CoreError::format(format!(
                    "unsupported machine type {machine} ({bits}-bit)"
                )))
            }
        }
    }

    pub fn word_size(&self) -> usize {
        if self.sixty_four_bit { 8 } else { 4 }
    }

    /// Decodes pr_reg. The stream should be positioned at the start of the registers,
    /// i.e. just after the fixed part of PRSTATUS.
    pub fn read_registers(&self, s: &mut Stream) -> CoreResult<Registers> {
        let mut registers = Registers::new();
        for (name, width) in self.note_layout.iter() {
            let value = match width {
                4 => s.read_word()? as u64,
                _ => s.read_xword()?,
            };
            if name.is_empty() {
                continue;
            }
            let value = if self.high_words.contains(name) {
                value >> 32
            } else {
                value
            };
            registers.insert(name, value);
        }
        Ok(registers)
    }

    pub fn mask_ip(&self, ip: u64) -> u64 {
        match self.ip_mask {
            Some(mask) => ip & mask,
            None => ip,
        }
    }

    pub fn dwarf_register_name(&self, number: u16) -> Option<&'static str> {
        self.dwarf_registers
            .get(number as usize)
            .copied()
            .filter(|name| !name.is_empty())
    }

    pub fn dwarf_register_number(&self, name: &str) -> Option<u16> {
        self.dwarf_registers
            .iter()
            .position(|n| !n.is_empty() && *n == name)
            .map(|i| i as u16)
    }

    pub fn stack_pointer(&self, registers: &Registers) -> u64 {
        registers.get(self.stack_pointer).copied().unwrap_or(0)
    }

    pub fn base_pointer(&self, registers: &Registers) -> u64 {
        registers.get(self.base_pointer).copied().unwrap_or(0)
    }

    /// The masked instruction pointer.
    pub fn instruction_pointer(&self, registers: &Registers) -> u64 {
        let ip = registers.get(self.instruction_pointer).copied().unwrap_or(0);
        self.mask_ip(ip)
    }

    /// The masked link register, 0 on ISAs without one.
    pub fn link_register(&self, registers: &Registers) -> u64 {
        self.link_register
            .and_then(|name| registers.get(name).copied())
            .map(|lr| self.mask_ip(lr))
            .unwrap_or(0)
    }

    /// The registers in note order, for display.
    pub fn ordered(&self, registers: &Registers) -> Vec<(&'static str, u64)> {
        let mut result: Vec<(&'static str, u64)> = self
            .note_layout
            .iter()
            .filter_map(|(name, _)| registers.get(name).map(|v| (*name, *v)))
            .collect();
        for (name, value) in registers.iter() {
            if !result.iter().any(|(n, _)| n == name) {
                result.push((name, *value));
            }
        }
        result
    }
}

impl std::fmt::Debug for Architecture {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::{ByteSource, Reader};
    use crate::utils::synthetic::{self, ElfBuilder};

    fn decode(arch: &Architecture, little_endian: bool, regs: &[(&str, u64)]) -> Registers {
        let prstatus = synthetic::prstatus(arch, little_endian, 1, regs);
        let prefix = if arch.sixty_four_bit { 112 } else { 72 };
        let mut b = ElfBuilder::core(arch, little_endian);
        b.segments.push(synthetic::SegmentSpec::new(4, 0, prstatus));
        let bytes = b.build();
        let reader = Reader::new(ByteSource::from_vec("core", bytes)).unwrap();
        let header = crate::elf::ElfHeader::new(&reader).unwrap();
        let ph = crate::elf::ProgramHeader::new(&reader, header.ph_offset as usize).unwrap();
        let mut s = Stream::new(&reader, ph.offset as usize + prefix);
        arch.read_registers(&mut s).unwrap()
    }

    #[test]
    fn selects_by_machine_and_class() {
        assert_eq!(Architecture::for_machine(EM_X86_64, true).unwrap().name, "amd64");
        assert_eq!(Architecture::for_machine(EM_386, false).unwrap().name, "x86");
        assert_eq!(Architecture::for_machine(EM_S390, false).unwrap().name, "s390");
        assert_eq!(Architecture::for_machine(EM_S390, true).unwrap().name, "s390x");
        assert_eq!(Architecture::for_machine(EM_PPC, true).unwrap().name, "ppc64");
        assert_eq!(Architecture::for_machine(EM_ARM, false).unwrap().name, "arm");
        assert_eq!(Architecture::for_machine(EM_AARCH64, true).unwrap().name, "aarch64");
        assert_eq!(Architecture::for_machine(EM_PPC64, true).unwrap().name, "ppc64");

        let err = Architecture::for_machine(50, true).unwrap_err(); // IA-64
        insta::assert_snapshot!(err.to_string(), @"bad ELF format: unsupported machine type 50 (64-bit)");
    }

    #[test]
    fn amd64_registers() {
        let arch = &x86::AMD64;
        let regs = decode(
            arch,
            true,
            &[("rip", 0x401000), ("rsp", 0x7ffee0000100), ("rbp", 0x7ffee0000200), ("r15", 15)],
        );
        assert_eq!(arch.instruction_pointer(&regs), 0x401000);
        assert_eq!(arch.stack_pointer(&regs), 0x7ffee0000100);
        assert_eq!(arch.base_pointer(&regs), 0x7ffee0000200);
        assert_eq!(arch.link_register(&regs), 0);
        assert_eq!(regs["r15"], 15);
        assert!(!regs.contains_key(""));
        assert_eq!(regs.len(), 26);
        assert_eq!(arch.dwarf_register_name(7), Some("rsp"));
        assert_eq!(arch.dwarf_register_name(16), Some("rip"));
        assert_eq!(arch.dwarf_register_number("rbp"), Some(6));
    }

    #[test]
    fn ia32_registers() {
        let arch = &x86::IA32;
        let regs = decode(arch, true, &[("eip", 0x8048000), ("esp", 0xbfff0000), ("ebp", 0xbfff0010)]);
        assert_eq!(arch.instruction_pointer(&regs), 0x8048000);
        assert_eq!(arch.stack_pointer(&regs), 0xbfff0000);
        assert_eq!(arch.base_pointer(&regs), 0xbfff0010);
        assert_eq!(arch.dwarf_register_name(4), Some("esp"));
    }

    #[test]
    fn ppc64_packs_xer_and_cr_in_high_words() {
        let arch = &ppc::PPC64;
        let regs = decode(
            arch,
            false,
            &[
                ("pc", 0x10000200),
                ("gpr1", 0x7fff0000),
                ("lr", 0x10000100),
                ("xer", 0x2000_0000_0000_0000),
                ("cr", 0x4200_0088_0000_0000),
            ],
        );
        assert_eq!(arch.instruction_pointer(&regs), 0x10000200);
        assert_eq!(arch.stack_pointer(&regs), 0x7fff0000);
        assert_eq!(arch.base_pointer(&regs), 0x7fff0000);
        assert_eq!(arch.link_register(&regs), 0x10000100);
        assert_eq!(regs["xer"], 0x2000_0000);
        assert_eq!(regs["cr"], 0x4200_0088);
        assert_eq!(arch.ip_offset_from_bp, 2);
        assert_eq!(arch.dwarf_register_name(65), Some("lr"));
    }

    #[test]
    fn s390_masks_the_instruction_pointer() {
        let arch = &s390::S390;
        let regs = decode(arch, false, &[("addr", 0x8040_1000), ("gpr15", 0x7fff_0000)]);
        assert_eq!(regs["addr"], 0x8040_1000);
        assert_eq!(arch.instruction_pointer(&regs), 0x0040_1000);
        assert_eq!(arch.stack_pointer(&regs), 0x7fff_0000);
        assert_eq!(arch.link_register(&regs), 0);

        let arch = &s390::S390X;
        assert_eq!(arch.mask_ip(0x8040_1000), 0x8040_1000);
    }

    #[test]
    fn arm_registers() {
        let arch = &arm::ARM32;
        let regs = decode(arch, true, &[("pc", 0x10400), ("sp", 0xbe000000), ("lr", 0x10300)]);
        assert_eq!(arch.instruction_pointer(&regs), 0x10400);
        assert_eq!(arch.base_pointer(&regs), 0xbe000000);
        assert_eq!(arch.link_register(&regs), 0x10300);

        let arch = &arm::AARCH64;
        let regs = decode(
            arch,
            true,
            &[("pc", 0x400400), ("sp", 0xffff0000), ("x29", 0xffff0010), ("x30", 0x400300)],
        );
        assert_eq!(arch.base_pointer(&regs), 0xffff0010);
        assert_eq!(arch.link_register(&regs), 0x400300);
        assert_eq!(arch.dwarf_register_name(31), Some("sp"));
    }

    #[test]
    fn ordered_follows_note_layout() {
        let arch = &x86::AMD64;
        let regs = decode(arch, true, &[]);
        let names: Vec<&str> = arch.ordered(&regs).iter().take(3).map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["r15", "r14", "r13"]);
    }
}
