use super::Architecture;
use crate::elf::{EM_AARCH64, EM_ARM};

pub static ARM32: Architecture = Architecture {
    name: "arm",
    machine: EM_ARM,
    sixty_four_bit: false,
    note_layout: &[
        ("r0", 4),
        ("r1", 4),
        ("r2", 4),
        ("r3", 4),
        ("r4", 4),
        ("r5", 4),
        ("r6", 4),
        ("r7", 4),
        ("r8", 4),
        ("r9", 4),
        ("r10", 4),
        ("r11", 4),
        ("r12", 4),
        ("sp", 4),
        ("lr", 4),
        ("pc", 4),
        ("cpsr", 4),
        ("", 4), // orig_r0
    ],
    high_words: &[],
    stack_pointer: "sp",
    // r11 is only a frame pointer with some compiler options
    base_pointer: "sp",
    instruction_pointer: "pc",
    link_register: Some("lr"),
    dwarf_registers: &[
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp",
        "lr", "pc",
    ],
    ip_mask: None,
    ip_offset_from_bp: 1,
    uid_width: 4,
    processor_type: "arm",
};

pub static AARCH64: Architecture = Architecture {
    name: "aarch64",
    machine: EM_AARCH64,
    sixty_four_bit: true,
    note_layout: &[
        ("x0", 8),
        ("x1", 8),
        ("x2", 8),
        ("x3", 8),
        ("x4", 8),
        ("x5", 8),
        ("x6", 8),
        ("x7", 8),
        ("x8", 8),
        ("x9", 8),
        ("x10", 8),
        ("x11", 8),
        ("x12", 8),
        ("x13", 8),
        ("x14", 8),
        ("x15", 8),
        ("x16", 8),
        ("x17", 8),
        ("x18", 8),
        ("x19", 8),
        ("x20", 8),
        ("x21", 8),
        ("x22", 8),
        ("x23", 8),
        ("x24", 8),
        ("x25", 8),
        ("x26", 8),
        ("x27", 8),
        ("x28", 8),
        ("x29", 8),
        ("x30", 8),
        ("sp", 8),
        ("pc", 8),
        ("pstate", 8),
    ],
    high_words: &[],
    stack_pointer: "sp",
    base_pointer: "x29",
    instruction_pointer: "pc",
    link_register: Some("x30"),
    dwarf_registers: &[
        "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
        "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25",
        "x26", "x27", "x28", "x29", "x30", "sp",
    ],
    ip_mask: None,
    ip_offset_from_bp: 1,
    uid_width: 4,
    processor_type: "aarch64",
};
