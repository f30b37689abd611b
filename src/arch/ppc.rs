use super::Architecture;
use crate::elf::{EM_PPC, EM_PPC64};

macro_rules! ppc_layout {
    ($width:literal) => {
        &[
            ("gpr0", $width), ("gpr1", $width), ("gpr2", $width), ("gpr3", $width),
            ("gpr4", $width), ("gpr5", $width), ("gpr6", $width), ("gpr7", $width),
            ("gpr8", $width), ("gpr9", $width), ("gpr10", $width), ("gpr11", $width),
            ("gpr12", $width), ("gpr13", $width), ("gpr14", $width), ("gpr15", $width),
            ("gpr16", $width), ("gpr17", $width), ("gpr18", $width), ("gpr19", $width),
            ("gpr20", $width), ("gpr21", $width), ("gpr22", $width), ("gpr23", $width),
            ("gpr24", $width), ("gpr25", $width), ("gpr26", $width), ("gpr27", $width),
            ("gpr28", $width), ("gpr29", $width), ("gpr30", $width), ("gpr31", $width),
            ("pc", $width),
            ("", $width), // msr
            ("", $width), // orig_gpr3
            ("ctr", $width),
            ("lr", $width),
            ("xer", $width),
            ("cr", $width),
        ]
    };
}

// gpr0-31, fpr0-31, then cr, lr, ctr as in the 64-bit ELF ABI
static PPC_DWARF_REGISTERS: [&str; 67] = [
    "gpr0", "gpr1", "gpr2", "gpr3", "gpr4", "gpr5", "gpr6", "gpr7", "gpr8", "gpr9", "gpr10",
    "gpr11", "gpr12", "gpr13", "gpr14", "gpr15", "gpr16", "gpr17", "gpr18", "gpr19", "gpr20",
    "gpr21", "gpr22", "gpr23", "gpr24", "gpr25", "gpr26", "gpr27", "gpr28", "gpr29", "gpr30",
    "gpr31", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "",
    "", "", "", "", "", "", "", "", "", "", "", "", "cr", "lr", "ctr",
];

pub static PPC64: Architecture = Architecture {
    name: "ppc64",
    machine: EM_PPC64,
    sixty_four_bit: true,
    note_layout: ppc_layout!(8),
    high_words: &["xer", "cr"],
    stack_pointer: "gpr1",
    base_pointer: "gpr1",
    instruction_pointer: "pc",
    link_register: Some("lr"),
    dwarf_registers: &PPC_DWARF_REGISTERS,
    ip_mask: None,
    // the back chain word is followed by the saved cr
    ip_offset_from_bp: 2,
    uid_width: 4,
    processor_type: "ppc64",
};

pub static PPC32: Architecture = Architecture {
    name: "ppc",
    machine: EM_PPC,
    sixty_four_bit: false,
    note_layout: ppc_layout!(4),
    high_words: &[],
    stack_pointer: "gpr1",
    base_pointer: "gpr1",
    instruction_pointer: "pc",
    link_register: Some("lr"),
    dwarf_registers: &PPC_DWARF_REGISTERS,
    ip_mask: None,
    ip_offset_from_bp: 1,
    uid_width: 2,
    processor_type: "ppc",
};
