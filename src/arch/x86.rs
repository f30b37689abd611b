use super::Architecture;
use crate::elf::{EM_386, EM_X86_64};

pub static AMD64: Architecture = Architecture {
    name: "amd64",
    machine: EM_X86_64,
    sixty_four_bit: true,
    note_layout: &[
        ("r15", 8),
        ("r14", 8),
        ("r13", 8),
        ("r12", 8),
        ("rbp", 8),
        ("rbx", 8),
        ("r11", 8),
        ("r10", 8),
        ("r9", 8),
        ("r8", 8),
        ("rax", 8),
        ("rcx", 8),
        ("rdx", 8),
        ("rsi", 8),
        ("rdi", 8),
        ("", 8), // orig_rax
        ("rip", 8),
        ("cs", 8),
        ("eflags", 8),
        ("rsp", 8),
        ("ss", 8),
        ("fs_base", 8),
        ("gs_base", 8),
        ("ds", 8),
        ("es", 8),
        ("fs", 8),
        ("gs", 8),
    ],
    high_words: &[],
    stack_pointer: "rsp",
    base_pointer: "rbp",
    instruction_pointer: "rip",
    link_register: None,
    // System V AMD64 psABI figure 3.36
    dwarf_registers: &[
        "rax", "rdx", "rcx", "rbx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11",
        "r12", "r13", "r14", "r15", "rip",
    ],
    ip_mask: None,
    ip_offset_from_bp: 1,
    uid_width: 4,
    processor_type: "amd64",
};

pub static IA32: Architecture = Architecture {
    name: "x86",
    machine: EM_386,
    sixty_four_bit: false,
    note_layout: &[
        ("ebx", 4),
        ("ecx", 4),
        ("edx", 4),
        ("esi", 4),
        ("edi", 4),
        ("ebp", 4),
        ("eax", 4),
        ("ds", 4),
        ("es", 4),
        ("fs", 4),
        ("gs", 4),
        ("", 4), // orig_eax
        ("eip", 4),
        ("cs", 4),
        ("efl", 4),
        ("esp", 4),
        ("ss", 4),
    ],
    high_words: &[],
    stack_pointer: "esp",
    base_pointer: "ebp",
    instruction_pointer: "eip",
    link_register: None,
    dwarf_registers: &["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "eip"],
    ip_mask: None,
    ip_offset_from_bp: 1,
    uid_width: 2,
    processor_type: "x86",
};
