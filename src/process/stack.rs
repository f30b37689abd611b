//! Stack walking. Call frame information is used for code that has it, everything else
//! falls back to chasing the frame pointer chain.
use crate::arch::{Architecture, Registers};
use crate::debug::Unwound;
use crate::error::CoreResult;
use crate::memory::AddressSpace;
use crate::modules::Module;
use std::fmt;

/// Corrupt stacks often loop back on themselves.
pub const MAX_FRAMES: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StackFrame {
    /// The CFA for frames unwound with call frame information, otherwise the frame
    /// (or base) pointer.
    pub frame_address: u64,
    pub instruction_pointer: u64,
}

/// Why a walk ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// Zero frame pointer or return address: the normal way for a walk to end.
    EndOfChain,

    /// The instruction pointer isn't inside any memory range.
    Unmapped(u64),
    FrameLimit,

    /// A saved register or return address couldn't be read.
    Fault(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StopReason::EndOfChain => write!(fmt, "end of chain"),
            StopReason::Unmapped(addr) => write!(fmt, "0x{addr:x} isn't mapped"),
            StopReason::FrameLimit => write!(fmt, "more than {MAX_FRAMES} frames"),
            StopReason::Fault(mesg) => write!(fmt, "{mesg}"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackTrace {
    /// Innermost frame first.
    pub frames: Vec<StackFrame>,
    pub stopped: StopReason,
}

/// Walks the stack starting with a thread's registers. Frames found before a problem
/// are always returned.
pub fn walk_stack(
    arch: &Architecture,
    space: &AddressSpace,
    modules: &[&Module],
    registers: &Registers,
) -> StackTrace {
    let mut regs = registers.clone();
    let mut ip = arch.instruction_pointer(&regs);
    if ip == 0 || !space.is_mapped(ip) {
        // Probably a call through a bad function pointer.
        ip = arch.link_register(&regs);
    }
    let mut bp = arch.base_pointer(&regs);
    let mut frames = Vec::new();

    let stopped = loop {
        if ip == 0 {
            break StopReason::EndOfChain;
        }
        if !space.is_mapped(ip) {
            break StopReason::Unmapped(ip);
        }
        if frames.len() >= MAX_FRAMES {
            break StopReason::FrameLimit;
        }

        // Return addresses point just past the call which may be the first byte of the
        // next function.
        let lookup = if frames.is_empty() { ip } else { ip - 1 };
        match unwind_with_cfi(arch, space, modules, &regs, lookup) {
            Ok(Some(unwound)) => {
                frames.push(StackFrame {
                    frame_address: unwound.cfa,
                    instruction_pointer: ip,
                });
                regs = unwound.registers;
                bp = arch.base_pointer(&regs);
                ip = unwound.return_address;
                continue;
            }
            Ok(None) => (),
            Err(err) => {
                frames.push(StackFrame {
                    frame_address: bp,
                    instruction_pointer: ip,
                });
                break StopReason::Fault(err.to_string());
            }
        }

        frames.push(StackFrame {
            frame_address: bp,
            instruction_pointer: ip,
        });
        if bp == 0 {
            break StopReason::EndOfChain;
        }
        match read_frame(arch, space, bp) {
            Ok((caller_bp, return_address)) => {
                let word = space.word_size();
                regs.insert(arch.stack_pointer, bp.wrapping_add(word * (arch.ip_offset_from_bp + 1)));
                regs.insert(arch.base_pointer, caller_bp);
                regs.insert(arch.instruction_pointer, return_address);
                bp = caller_bp;
                ip = arch.mask_ip(return_address);
            }
            Err(err) => break StopReason::Fault(err.to_string()),
        }
    };
    StackTrace { frames, stopped }
}

fn unwind_with_cfi(
    arch: &Architecture,
    space: &AddressSpace,
    modules: &[&Module],
    regs: &Registers,
    address: u64,
) -> CoreResult<Option<Unwound>> {
    let table = modules
        .iter()
        .find(|m| m.contains(address))
        .and_then(|m| m.cfi.as_ref());
    match table {
        Some(table) => table.unwind(arch, space, regs, address),
        None => Ok(None),
    }
}

/// The saved frame pointer and return address for the frame at bp.
fn read_frame(arch: &Architecture, space: &AddressSpace, bp: u64) -> CoreResult<(u64, u64)> {
    let caller_bp = space.read_pointer(bp)?;
    let slot = bp.wrapping_add(space.word_size() * arch.ip_offset_from_bp);
    let return_address = space.read_pointer(slot)?;
    Ok((caller_bp, return_address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::x86::AMD64;
    use crate::debug::CallFrameTable;
    use crate::debug::cfi::tests::{HDR, eh_frame_image};
    use crate::elf::ByteSource;
    use crate::memory::MemorySource;
    use crate::modules::ModuleRange;

    const STACK: u64 = 0x7ffe0000;

    fn space_with_stack(stack: Vec<u8>) -> AddressSpace {
        let mut space = AddressSpace::new(true, true);
        space.add_source(MemorySource::unbacked(0x401000, 0x2000, "not dumped", 5));
        let size = stack.len() as u64;
        space.add_source(MemorySource::backed(STACK, size, ByteSource::from_vec("stack", stack), 0, 6));
        space
    }

    fn put(stack: &mut [u8], offset: usize, value: u64) {
        stack[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn registers(ip: u64, sp: u64, bp: u64) -> Registers {
        let mut regs = Registers::new();
        regs.insert("rip", ip);
        regs.insert("rsp", sp);
        regs.insert("rbp", bp);
        regs
    }

    fn ips(trace: &StackTrace) -> Vec<u64> {
        trace.frames.iter().map(|f| f.instruction_pointer).collect()
    }

    #[test]
    fn follows_frame_pointers() {
        let mut stack = vec![0u8; 0x400];
        put(&mut stack, 0x200, STACK + 0x300);
        put(&mut stack, 0x208, 0x401100);
        put(&mut stack, 0x300, 0);
        put(&mut stack, 0x308, 0x402200);
        let space = space_with_stack(stack);

        let trace = walk_stack(&AMD64, &space, &[], &registers(0x401010, STACK + 0x100, STACK + 0x200));
        assert_eq!(ips(&trace), vec![0x401010, 0x401100, 0x402200]);
        assert_eq!(trace.frames[1].frame_address, STACK + 0x300);
        assert_eq!(trace.stopped, StopReason::EndOfChain);
    }

    #[test]
    fn cyclic_chain_is_capped() {
        let mut stack = vec![0u8; 0x400];
        put(&mut stack, 0x200, STACK + 0x200);
        put(&mut stack, 0x208, 0x401100);
        let space = space_with_stack(stack);

        let trace = walk_stack(&AMD64, &space, &[], &registers(0x401010, STACK + 0x100, STACK + 0x200));
        assert_eq!(trace.frames.len(), MAX_FRAMES);
        assert_eq!(trace.stopped, StopReason::FrameLimit);
    }

    #[test]
    fn leaf_only() {
        let space = space_with_stack(vec![0u8; 0x100]);
        let trace = walk_stack(&AMD64, &space, &[], &registers(0x401000, 0x7ffee0000100, 0));
        assert_eq!(ips(&trace), vec![0x401000]);
        assert_eq!(trace.stopped, StopReason::EndOfChain);
    }

    #[test]
    fn unmapped_return_address() {
        let mut stack = vec![0u8; 0x400];
        put(&mut stack, 0x200, STACK + 0x300);
        put(&mut stack, 0x208, 0xdead_0000);
        let space = space_with_stack(stack);

        let trace = walk_stack(&AMD64, &space, &[], &registers(0x401010, STACK + 0x100, STACK + 0x200));
        assert_eq!(ips(&trace), vec![0x401010]);
        insta::assert_snapshot!(trace.stopped.to_string(), @"0xdead0000 isn't mapped");
    }

    #[test]
    fn bad_frame_pointer_keeps_frames() {
        let space = space_with_stack(vec![0u8; 0x100]);
        let trace = walk_stack(&AMD64, &space, &[], &registers(0x401010, STACK, 0x1000));
        assert_eq!(ips(&trace), vec![0x401010]);
        assert!(matches!(trace.stopped, StopReason::Fault(_)));
    }

    #[test]
    fn bad_instruction_pointer_uses_link_register() {
        let space = space_with_stack(vec![0u8; 0x100]);
        let mut regs = Registers::new();
        regs.insert("pc", 0);
        regs.insert("lr", 0x401234);
        regs.insert("sp", STACK);
        let trace = walk_stack(&crate::arch::arm::ARM32, &space, &[], &regs);
        assert_eq!(trace.frames[0].instruction_pointer, 0x401234);

        // No link register on amd64.
        let trace = walk_stack(&AMD64, &space, &[], &registers(0, STACK, 0));
        assert!(trace.frames.is_empty());
        assert_eq!(trace.stopped, StopReason::EndOfChain);
    }

    #[test]
    fn unwinds_with_cfi_then_frame_pointers() {
        let mut stack = vec![0u8; 0x200];
        put(&mut stack, 0xf8, STACK + 0x200); // saved rbp, just past the stack
        put(&mut stack, 0x100, 0x402345);
        let mut space = space_with_stack(stack);
        let image = eh_frame_image();
        let size = image.len() as u64;
        space.add_source(MemorySource::backed(HDR, size, ByteSource::from_vec("image", image), 0, 4));

        let mut module = Module::missing("app", 0x400000);
        module.ranges.push(ModuleRange {
            name: ".text".to_string(),
            base: 0x401000,
            size: 0x2000,
            backed: false,
        });
        module.cfi = Some(CallFrameTable::load(&space, HDR, 8).unwrap());

        let regs = registers(0x401010, STACK + 0xf8, STACK + 0xf8);
        let trace = walk_stack(&AMD64, &space, &[&module], &regs);
        assert_eq!(ips(&trace), vec![0x401010, 0x402345]);
        assert_eq!(trace.frames[0].frame_address, STACK + 0x108);
        assert_eq!(trace.frames[1].frame_address, STACK + 0x200);
        assert!(matches!(trace.stopped, StopReason::Fault(_)));
    }
}
