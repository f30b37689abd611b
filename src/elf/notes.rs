//! The various notes in a core file. These provide information about the process and
//! its threads, not all may be present.
use super::{ProgramHeader, Reader, Stream};
use crate::error::{CoreError, CoreResult};
use crate::utils;

/// Notes larger than this are treated as corrupt.
const MAX_NOTE_SIZE: u32 = 64 * 1024 * 1024;

pub const AT_NULL: u64 = 0;
pub const AT_ENTRY: u64 = 9;
pub const AT_PLATFORM: u64 = 15;
pub const AT_HWCAP: u64 = 16;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NoteType {
    /// Signal info, pid, and the general purpose registers for one thread. See
    /// elf_prstatus in https://docs.huihoo.com/doxygen/linux/kernel/3.7/uapi_2linux_2elfcore_8h_source.html.
    PrStatus,

    /// Floating point register values.
    PrFPReg,

    /// Process state info, e.g. whether it's running, sleeping, or a zombie. Also the
    /// name and arguments for the executable.
    PrPsInfo,

    /// The auxiliary vector the kernel handed the process, e.g. the entry point and
    /// platform name.
    AuxV,

    /// Upper halves of the general purpose registers for 31-bit s390 processes.
    S390HighGprs,

    /// siginfo_t for the signal that killed the process.
    SigInfo,

    /// Memory-mapped files.
    File,

    Other(u32),
}

impl NoteType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => NoteType::PrStatus, // see https://docs.huihoo.com/doxygen/linux/kernel/3.7/include_2uapi_2linux_2elf_8h_source.html
            2 => NoteType::PrFPReg,
            3 => NoteType::PrPsInfo,
            6 => NoteType::AuxV,
            0x300 => NoteType::S390HighGprs,
            0x53494749 => NoteType::SigInfo,
            0x46494c45 => NoteType::File,
            _ => NoteType::Other(value),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Note {
    pub name: String,
    pub ntype: NoteType,

    /// Offset of the descriptor within the ELF image.
    pub offset: usize,

    /// Size of the descriptor.
    pub size: usize,
}

pub fn read_note(s: &mut Stream) -> CoreResult<Note> {
    let n_namesz = s.read_word()?;
    let n_descsz = s.read_word()?;
    let n_type = s.read_word()?;
    utils::require(n_namesz < 4096 && n_descsz < MAX_NOTE_SIZE, || {
        CoreError::corrupt(format!(
            "implausible note sizes: name {n_namesz}, desc {n_descsz}"
        ))
    })?;

    let name_bytes = s.reader.slice(s.offset, n_namesz as usize)?;
    let end = name_bytes.iter().position(|b| *b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
    s.offset += utils::align_to_word(n_namesz) as usize; // align desc to 4-byte boundary

    let desc_offset = s.offset;
    s.reader.slice(desc_offset, n_descsz as usize)?;
    s.offset += utils::align_to_word(n_descsz) as usize; // align next note to 4-byte boundary

    Ok(Note {
        name,
        ntype: NoteType::from_u32(n_type),
        offset: desc_offset,
        size: n_descsz as usize,
    })
}

/// Reads all the notes in a PT_NOTE segment. A note that can't be read ends the
/// segment (the sizes of later notes can't be trusted) and is reported as an error
/// along with the notes that were read.
pub fn read_notes(reader: &Reader, ph: &ProgramHeader) -> (Vec<Note>, Option<CoreError>) {
    let mut notes = Vec::new();
    let start = ph.offset as usize;
    let end = start.saturating_add(ph.file_size as usize);
    let mut s = Stream::new(reader, start);
    while s.offset.saturating_add(12) <= end {
        match read_note(&mut s) {
            Ok(note) => notes.push(note),
            Err(err) => {
                let err = CoreError::corrupt(format!("note at offset 0x{:x}: {err}", s.offset));
                return (notes, Some(err));
            }
        }
    }
    (notes, None)
}

/// The parts of elf_prstatus that precede the registers. The registers are decoded
/// by the architecture.
#[derive(Clone, Debug, Default)]
pub struct PrStatus {
    /// The signal that terminated the process.
    pub signal_num: i32,

    /// Further details about the signal. For example, code can be SEGV_MAPERR (bad
    /// address) or SEGV_ACCERR (bad permessions) for the SIGSEGV signal. See
    /// https://www.mkssoftware.com/docs/man5/siginfo_t.5.asp#Signal_Codes for more.
    pub signal_code: i32,

    /// If non-zero, the errno associated with the signal.
    pub errno: i32,

    /// The current signal, not the one that caused the core dump.
    pub current_signal: u16,

    /// The thread id (pid for the main thread).
    pub pid: i32,
    pub ppid: i32,
    pub pgrp: i32,
    pub sid: i32,

    /// Time spent in user code: seconds and microseconds.
    pub user_time: (u64, u64),

    /// Time spent in system code.
    pub system_time: (u64, u64),

    pub child_user_time: (u64, u64),
    pub child_system_time: (u64, u64),
}

impl PrStatus {
    /// Reads up to the start of pr_reg, leaving the stream positioned at the registers.
    pub fn read(s: &mut Stream) -> CoreResult<Self> {
        let signal_num = s.read_int()?;
        let signal_code = s.read_int()?;
        let errno = s.read_int()?;
        let current_signal = s.read_half()?;
        let _padding = s.read_half()?;
        let _pending_signals = s.read_ulong()?;
        let _held_signals = s.read_ulong()?;
        let pid = s.read_int()?;
        let ppid = s.read_int()?;
        let pgrp = s.read_int()?;
        let sid = s.read_int()?;
        let user_time = (s.read_ulong()?, s.read_ulong()?);
        let system_time = (s.read_ulong()?, s.read_ulong()?);
        let child_user_time = (s.read_ulong()?, s.read_ulong()?);
        let child_system_time = (s.read_ulong()?, s.read_ulong()?);
        Ok(PrStatus {
            signal_num,
            signal_code,
            errno,
            current_signal,
            pid,
            ppid,
            pgrp,
            sid,
            user_time,
            system_time,
            child_user_time,
            child_system_time,
        })
    }

    pub fn signal(&self) -> &'static str {
        signal_name(self.signal_num, self.signal_code)
    }
}

pub fn signal_name(signal_num: i32, signal_code: i32) -> &'static str {
    match signal_num {
        1 => "SIGHUP", // see https://man7.org/linux/man-pages/man7/signal.7.html
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => match signal_code {
            // and https://sites.uclouvain.be/SystInfo/usr/include/bits/siginfo.h.html
            1 => "SIGILL: Illegal opcode",          // ILL_ILLOPC
            2 => "SIGILL: Illegal operand",         // ILL_ILLOPN
            3 => "SIGILL: Illegal addressing mode", // ILL_ILLADR
            4 => "SIGILL: Illegal trap",            // ILL_ILLTRP
            5 => "SIGILL: Privileged opcode",       // ILL_PRVOPC
            6 => "SIGILL: Privileged register",     // ILL_PRVREG
            7 => "SIGILL: Coprocessor error",       // ILL_COPROC
            8 => "SIGILL: Internal stack error",    // ILL_BADSTK
            _ => "SIGILL",
        },
        5 => match signal_code {
            1 => "SIGTRAP: Process breakpoint", // TRAP_BRKPT
            2 => "SIGTRAP: Process trace trap", // TRAP_TRACE
            _ => "SIGTRAP",
        },
        6 => "SIGABRT",
        7 => match signal_code {
            1 => "SIGBUS: Invalid address alignment",      // BUS_ADRALN
            2 => "SIGBUS: Non-existant physical address",  // BUS_ADRERR
            3 => "SIGBUS: Object specific hardware error", // BUS_OBJERR
            _ => "SIGBUS",
        },
        8 => match signal_code {
            1 => "SIGFPE: Integer divide by zero",           // FPE_INTDIV
            2 => "SIGFPE: Integer overflow",                 // FPE_INTOVF
            3 => "SIGFPE: Floating point divide by zero",    // FPE_FLTDIV
            4 => "SIGFPE: Floating point overflow",          // FPE_FLTOVF
            5 => "SIGFPE: Floating point underflow",         // FPE_FLTUND
            6 => "SIGFPE: Floating point inexact result",    // FPE_FLTRES
            7 => "SIGFPE: Floating point invalid operation", // FPE_FLTINV
            8 => "SIGFPE: Subscript out of range",           // FPE_FLTSUB
            _ => "SIGFPE",
        },
        9 => "SIGKILL",
        10 => "SIGUSR1",
        11 => match signal_code {
            1 => "SIGSEGV: Address not mapped to object", // SEGV_MAPERR
            2 => "SIGSEGV: Invalid permissions for mapped object", // SEGV_ACCERR
            _ => "SIGSEGV",
        },
        12 => "SIGUSR2",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        16 => "SIGSTKFLT",
        17 => "SIGCHLD",
        18 => "SIGCONT",
        19 => "SIGSTOP",
        20 => "SIGTSTP",
        21 => "SIGTTIN",
        22 => "SIGTTOU",
        23 => "SIGURG",
        24 => "SIGXCPU",
        25 => "SIGXFSZ",
        26 => "SIGVTALRM",
        27 => "SIGPROF",
        28 => "SIGWINCH",
        29 => "SIGIO",
        30 => "SIGPWR",
        31 => "SIGSYS",
        _ => "unknown signal",
    }
}

/// elf_prpsinfo: process-wide info.
#[derive(Clone, Debug, Default)]
pub struct PrPsInfo {
    pub state: u8,
    pub state_name: char,
    pub zombie: bool,
    pub nice: i8,
    pub flags: u64,
    pub uid: u32,
    pub gid: u32,
    pub pid: i32,
    pub ppid: i32,
    pub pgrp: i32,
    pub sid: i32,

    /// Executable file name, truncated to 16 bytes by the kernel.
    pub file_name: String,

    /// Start of the command line, truncated to 80 bytes by the kernel.
    pub arguments: String,
}

/// Size of pr_fname.
const FNAME_SIZE: usize = 16;

/// Size of pr_psargs (ELF_PRARGSZ).
const PSARGS_SIZE: usize = 80;

impl PrPsInfo {
    /// uid_width is 2 or 4: older 32-bit ABIs use 16-bit uids.
    pub fn read(reader: &Reader, note: &Note, uid_width: u8) -> CoreResult<Self> {
        let mut s = Stream::new(reader, note.offset);
        let state = s.read_byte()?;
        let state_name = s.read_byte()? as char;
        let zombie = s.read_byte()? != 0;
        let nice = s.read_byte()? as i8;
        s.align_from(note.offset, reader.word_size());
        let flags = s.read_ulong()?;
        let (uid, gid) = if uid_width == 2 {
            (s.read_half()? as u32, s.read_half()? as u32)
        } else {
            (s.read_word()?, s.read_word()?)
        };
        let pid = s.read_int()?;
        let ppid = s.read_int()?;
        let pgrp = s.read_int()?;
        let sid = s.read_int()?;

        // The strings are at the end of the record. Reading them from there avoids
        // depending on padding which varies between ABIs.
        let names_size = FNAME_SIZE + PSARGS_SIZE;
        utils::require(note.size >= names_size, || {
            CoreError::corrupt(format!("prpsinfo note is too small ({} bytes)", note.size))
        })?;
        let mut s = Stream::new(reader, note.offset.saturating_add(note.size - names_size));
        let file_name = s.read_fixed_string(FNAME_SIZE)?;
        let arguments = s.read_fixed_string(PSARGS_SIZE)?;

        Ok(PrPsInfo {
            state,
            state_name,
            zombie,
            nice,
            flags,
            uid,
            gid,
            pid,
            ppid,
            pgrp,
            sid,
            file_name,
            arguments: arguments.trim_end().to_string(),
        })
    }
}

/// Key/value pairs from the NT_AUXV note.
#[derive(Clone, Debug, Default)]
pub struct AuxiliaryVector {
    pub entries: Vec<(u64, u64)>,
}

impl AuxiliaryVector {
    pub fn read(reader: &Reader, note: &Note) -> CoreResult<Self> {
        let mut s = Stream::new(reader, note.offset);
        let end = note.offset.saturating_add(note.size);
        let mut entries = Vec::new();
        while s.offset.saturating_add(2 * reader.word_size()) <= end {
            let key = s.read_ulong()?;
            let value = s.read_ulong()?;
            if key == AT_NULL {
                break;
            }
            entries.push((key, value));
        }
        Ok(AuxiliaryVector { entries })
    }

    pub fn get(&self, key: u64) -> Option<u64> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Address of the program's entry point.
    pub fn entry(&self) -> Option<u64> {
        self.get(AT_ENTRY)
    }

    /// Address of a string naming the platform, e.g. "x86_64".
    pub fn platform(&self) -> Option<u64> {
        self.get(AT_PLATFORM)
    }

    pub fn hwcap(&self) -> Option<u64> {
        self.get(AT_HWCAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::elf::{ByteSource, ElfHeader, SegmentType};
    use crate::utils::synthetic::{self, ElfBuilder, SegmentSpec};

    fn note_reader(notes: Vec<u8>) -> (Reader, ProgramHeader) {
        let mut b = ElfBuilder::core(&arch::x86::AMD64, true);
        b.segments.push(SegmentSpec::new(4, 0, notes));
        let reader = Reader::new(ByteSource::from_vec("core", b.build())).unwrap();
        let header = ElfHeader::new(&reader).unwrap();
        let ph = ProgramHeader::new(&reader, header.ph_offset as usize).unwrap();
        assert_eq!(ph.stype, SegmentType::Note);
        (reader, ph)
    }

    #[test]
    fn reads_prstatus_prefix() {
        let arch = &arch::x86::AMD64;
        let desc = synthetic::prstatus(arch, true, 42, &[("rip", 0x401000)]);
        let (reader, ph) = note_reader(synthetic::note(true, "CORE", 1, &desc));
        let (notes, err) = read_notes(&reader, &ph);
        assert!(err.is_none());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].name, "CORE");
        assert_eq!(notes[0].ntype, NoteType::PrStatus);

        let mut s = Stream::new(&reader, notes[0].offset);
        let status = PrStatus::read(&mut s).unwrap();
        assert_eq!(status.pid, 42);
        assert_eq!(status.user_time, (3, 0));
        assert_eq!(status.signal(), "SIGSEGV: Address not mapped to object");
        assert_eq!(s.offset - notes[0].offset, 112);
    }

    #[test]
    fn reads_prpsinfo_and_auxv() {
        let arch = &arch::x86::AMD64;
        let mut bytes = synthetic::note(
            true,
            "CORE",
            3,
            &synthetic::prpsinfo(arch, true, 42, "java", "/usr/bin/java -Xmx1g Main"),
        );
        bytes.extend(synthetic::note(
            true,
            "CORE",
            6,
            &synthetic::auxv(true, true, &[(AT_ENTRY, 0x401000), (AT_PLATFORM, 0x7ffe1000)]),
        ));
        let (reader, ph) = note_reader(bytes);
        let (notes, err) = read_notes(&reader, &ph);
        assert!(err.is_none());
        assert_eq!(notes.len(), 2);

        // The descriptor starts 4 bytes past an 8 byte boundary so the padding after
        // pr_nice has to be counted from the descriptor.
        assert_eq!(notes[0].offset % 8, 4);
        let info = PrPsInfo::read(&reader, &notes[0], 4).unwrap();
        assert_eq!(info.state_name, 'R');
        assert_eq!(info.flags, 0);
        assert_eq!(info.pid, 42);
        assert_eq!(info.ppid, 1);
        assert_eq!(info.uid, 1000);
        assert_eq!(info.gid, 1000);
        assert_eq!(info.file_name, "java");
        assert_eq!(info.arguments, "/usr/bin/java -Xmx1g Main");

        let auxv = AuxiliaryVector::read(&reader, &notes[1]).unwrap();
        assert_eq!(auxv.entry(), Some(0x401000));
        assert_eq!(auxv.platform(), Some(0x7ffe1000));
        assert_eq!(auxv.hwcap(), None);
    }

    #[test]
    fn bad_note_keeps_earlier_notes() {
        let mut bytes = synthetic::note(true, "CORE", 6, &[0; 16]);
        // namesz, descsz, type with a descriptor far larger than the segment
        bytes.extend([5, 0, 0, 0, 0, 0, 0, 0x10, 1, 0, 0, 0]);
        let (reader, ph) = note_reader(bytes);
        let (notes, err) = read_notes(&reader, &ph);
        assert_eq!(notes.len(), 1);
        assert_eq!(err.unwrap().kind(), crate::error::ErrorKind::CorruptData);
    }
}
