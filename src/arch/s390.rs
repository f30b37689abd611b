use super::Architecture;
use crate::elf::EM_S390;

macro_rules! s390_layout {
    ($width:literal) => {
        &[
            ("mask", $width), ("addr", $width),
            ("gpr0", $width), ("gpr1", $width), ("gpr2", $width), ("gpr3", $width),
            ("gpr4", $width), ("gpr5", $width), ("gpr6", $width), ("gpr7", $width),
            ("gpr8", $width), ("gpr9", $width), ("gpr10", $width), ("gpr11", $width),
            ("gpr12", $width), ("gpr13", $width), ("gpr14", $width), ("gpr15", $width),
            ("acr0", 4), ("acr1", 4), ("acr2", 4), ("acr3", 4),
            ("acr4", 4), ("acr5", 4), ("acr6", 4), ("acr7", 4),
            ("acr8", 4), ("acr9", 4), ("acr10", 4), ("acr11", 4),
            ("acr12", 4), ("acr13", 4), ("acr14", 4), ("acr15", 4),
            ("orig_gpr2", $width),
        ]
    };
}

// gpr0-15, fpr0-15, cr0-15, acr0-15, then the PSW
static S390_DWARF_REGISTERS: [&str; 66] = [
    "gpr0", "gpr1", "gpr2", "gpr3", "gpr4", "gpr5", "gpr6", "gpr7", "gpr8", "gpr9", "gpr10",
    "gpr11", "gpr12", "gpr13", "gpr14", "gpr15", "", "", "", "", "", "", "", "", "", "", "",
    "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "",
    "acr0", "acr1", "acr2", "acr3", "acr4", "acr5", "acr6", "acr7", "acr8", "acr9", "acr10",
    "acr11", "acr12", "acr13", "acr14", "acr15", "mask", "addr",
];

pub static S390X: Architecture = Architecture {
    name: "s390x",
    machine: EM_S390,
    sixty_four_bit: true,
    note_layout: s390_layout!(8),
    high_words: &[],
    stack_pointer: "gpr15",
    base_pointer: "gpr15",
    instruction_pointer: "addr",
    link_register: None,
    dwarf_registers: &S390_DWARF_REGISTERS,
    ip_mask: None,
    ip_offset_from_bp: 1,
    uid_width: 4,
    processor_type: "s390x",
};

/// 31-bit addressing: the top bit of the PSW address is the addressing mode bit. The
/// registers keep it but it is cleared before the instruction pointer is used.
pub static S390: Architecture = Architecture {
    name: "s390",
    machine: EM_S390,
    sixty_four_bit: false,
    note_layout: s390_layout!(4),
    high_words: &[],
    stack_pointer: "gpr15",
    base_pointer: "gpr15",
    instruction_pointer: "addr",
    link_register: None,
    dwarf_registers: &S390_DWARF_REGISTERS,
    ip_mask: Some(0x7fff_ffff),
    ip_offset_from_bp: 1,
    uid_width: 2,
    processor_type: "s390",
};

/// Names of the registers whose upper halves are in NT_S390_HIGH_GPRS, in note order.
pub static HIGH_GPRS: [&str; 16] = [
    "gpr0", "gpr1", "gpr2", "gpr3", "gpr4", "gpr5", "gpr6", "gpr7", "gpr8", "gpr9", "gpr10",
    "gpr11", "gpr12", "gpr13", "gpr14", "gpr15",
];
