//! Call frame information from a module's PT_GNU_EH_FRAME segment. The segment holds
//! .eh_frame_hdr which points at .eh_frame and usually has a binary search table of
//! the FDEs. Both are read out of the address space so this works for modules whose
//! files couldn't be found.
use crate::arch::{Architecture, Registers};
use crate::error::{CoreError, CoreResult};
use crate::memory::AddressSpace;
use gimli::{
    BaseAddresses, CfaRule, EhFrame, EhFrameHdr, Pointer, RegisterRule, RunTimeEndian,
    UnwindContext, UnwindSection,
};

/// Upper bound on the .eh_frame bytes copied out of the address space.
const MAX_EH_FRAME_SIZE: usize = 64 * 1024 * 1024;

pub struct CallFrameTable {
    hdr_address: u64,
    hdr: Vec<u8>,
    eh_frame_address: u64,
    eh_frame: Vec<u8>,
    endian: RunTimeEndian,
    address_size: u8,
}

/// The caller's state as recovered from one row of the table.
#[derive(Clone, Debug)]
pub struct Unwound {
    /// Canonical frame address: the callee's stack pointer before the call.
    pub cfa: u64,
    pub return_address: u64,

    /// The caller's registers with the stack and instruction pointers updated.
    /// Registers whose rules we can't evaluate are dropped.
    pub registers: Registers,
}

impl CallFrameTable {
    pub fn load(space: &AddressSpace, hdr_address: u64, hdr_size: u64) -> CoreResult<Self> {
        let hdr = space.read_bytes(hdr_address, hdr_size as usize)?;
        let endian = if space.little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let address_size = space.word_size() as u8;

        let bases = BaseAddresses::default().set_eh_frame_hdr(hdr_address);
        let parsed = EhFrameHdr::new(&hdr, endian).parse(&bases, address_size)?;
        let eh_frame_address = match parsed.eh_frame_ptr() {
            Pointer::Direct(addr) => addr,
            Pointer::Indirect(addr) => space.read_pointer(addr)?,
        };

        let eh_frame = space.read_available(eh_frame_address, MAX_EH_FRAME_SIZE);
        if eh_frame.is_empty() {
            return Err(CoreError::fault(eh_frame_address, ".eh_frame isn't in the core"));
        }

        Ok(CallFrameTable {
            hdr_address,
            hdr,
            eh_frame_address,
            eh_frame,
            endian,
            address_size,
        })
    }

    pub fn eh_frame_address(&self) -> u64 {
        self.eh_frame_address
    }

    fn bases(&self) -> BaseAddresses {
        BaseAddresses::default()
            .set_eh_frame_hdr(self.hdr_address)
            .set_eh_frame(self.eh_frame_address)
    }

    /// Computes the caller's registers for code at address. Returns None if there is no
    /// FDE covering address or if the CFA can't be computed from the registers we have.
    pub fn unwind(
        &self,
        arch: &Architecture,
        space: &AddressSpace,
        registers: &Registers,
        address: u64,
    ) -> CoreResult<Option<Unwound>> {
        let bases = self.bases();
        let hdr = EhFrameHdr::new(&self.hdr, self.endian).parse(&bases, self.address_size)?;
        let mut eh_frame = EhFrame::new(&self.eh_frame, self.endian);
        eh_frame.set_address_size(self.address_size);

        let fde = match hdr.table() {
            Some(table) => table.fde_for_address(&eh_frame, &bases, address, |section, bases, offset| {
                section.cie_from_offset(bases, offset)
            }),
            None => eh_frame.fde_for_address(&bases, address, |section, bases, offset| {
                section.cie_from_offset(bases, offset)
            }),
        };
        let fde = match fde {
            Ok(fde) => fde,
            Err(gimli::Error::NoUnwindInfoForAddress) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut ctx: UnwindContext<usize> = UnwindContext::new();
        let row = match fde.unwind_info_for_address(&eh_frame, &bases, &mut ctx, address) {
            Ok(row) => row,
            Err(gimli::Error::NoUnwindInfoForAddress) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let cfa = match row.cfa() {
            CfaRule::RegisterAndOffset { register, offset } => {
                let Some(value) = register_value(arch, registers, register.0) else {
                    return Ok(None);
                };
                value.wrapping_add_signed(*offset)
            }
            _ => return Ok(None),
        };

        let mut caller = registers.clone();
        for (register, rule) in row.registers() {
            let Some(name) = arch.dwarf_register_name(register.0) else {
                continue;
            };
            match rule {
                RegisterRule::Undefined => {
                    caller.remove(name);
                }
                RegisterRule::SameValue => (),
                RegisterRule::Offset(n) => {
                    let value = space.read_pointer(cfa.wrapping_add_signed(*n))?;
                    caller.insert(name, value);
                }
                RegisterRule::ValOffset(n) => {
                    caller.insert(name, cfa.wrapping_add_signed(*n));
                }
                RegisterRule::Register(other) => match register_value(arch, registers, other.0) {
                    Some(value) => {
                        caller.insert(name, value);
                    }
                    None => {
                        caller.remove(name);
                    }
                },
                _ => {
                    caller.remove(name);
                }
            }
        }

        let ra_register = fde.cie().return_address_register();
        let return_address = arch
            .dwarf_register_name(ra_register.0)
            .and_then(|name| caller.get(name).copied())
            .unwrap_or(0);
        caller.insert(arch.stack_pointer, cfa);
        caller.insert(arch.instruction_pointer, return_address);

        Ok(Some(Unwound {
            cfa,
            return_address: arch.mask_ip(return_address),
            registers: caller,
        }))
    }
}

fn register_value(arch: &Architecture, registers: &Registers, number: u16) -> Option<u64> {
    let name = arch.dwarf_register_name(number)?;
    registers.get(name).copied()
}

impl std::fmt::Debug for CallFrameTable {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "CallFrameTable {{ eh_frame_hdr: 0x{:x}, eh_frame: 0x{:x} ({} bytes) }}",
            self.hdr_address,
            self.eh_frame_address,
            self.eh_frame.len()
        )
    }
}
