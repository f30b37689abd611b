//! The top level reader: rebuilds the process's memory, modules, and threads from a
//! core file. Damage to one part of the core (a module, a thread, a note) is recorded
//! in [`Diagnostics`] and the rest of the process is still reconstructed.
use super::{Diagnostics, OsThread, Options, StackTrace, walk_stack};
use crate::arch::{Architecture, Registers, s390};
use crate::debug::Symbol;
use crate::elf::{
    AuxiliaryVector, ByteSource, EM_S390, ElfFile, FileType, Note, NoteType, PrPsInfo,
    PrStatus, Reader, Stream,
};
use crate::error::{CoreError, CoreResult};
use crate::memory::{AddOutcome, AddressSpace, MemorySource};
use crate::modules::{ExecutableHints, LibraryResolver, Module, ModuleResolver};
use crate::utils;
use std::collections::BTreeMap;
use std::path::Path;

pub struct CoreDump {
    pub core: ElfFile,
    pub arch: &'static Architecture,
    pub space: AddressSpace,

    /// From PRPSINFO if present, else the first thread.
    pub pid: u64,
    pub process: Option<PrPsInfo>,
    pub auxv: AuxiliaryVector,

    /// The AT_PLATFORM string, e.g. "x86_64".
    pub platform: Option<String>,
    pub threads: Vec<OsThread>,
    pub executable: Module,

    /// Sorted by base address.
    pub libraries: Vec<Module>,
    pub diagnostics: Diagnostics,
    pub options: Options,

    /// Library and executable copies opened while resolving modules.
    open_files: Vec<ByteSource>,
}

struct ProcessNotes {
    threads: Vec<OsThread>,
    process: Option<PrPsInfo>,
    auxv: AuxiliaryVector,
}

impl CoreDump {
    pub fn open(path: &Path, options: Options, libraries: &dyn LibraryResolver) -> CoreResult<Self> {
        let source = ByteSource::open(path)?;
        CoreDump::from_source(source, options, libraries)
    }

    /// Fails only if source isn't an ELF core for a supported architecture or if it has
    /// neither thread nor process notes.
    pub fn from_source(
        source: ByteSource,
        options: Options,
        libraries: &dyn LibraryResolver,
    ) -> CoreResult<Self> {
        let core = ElfFile::parse(source)?;
        utils::require(core.header.file_type == FileType::Core, || {
            CoreError::format(format!(
                "{} isn't a core file (file type is {})",
                core.name, core.header.file_type
            ))
        })?;
        let arch = Architecture::for_machine(core.header.machine, core.header.sixty_four_bit)?;

        let mut diagnostics = Diagnostics::new(options.quiet);
        for err in core.errors.iter() {
            diagnostics.warn(&core.name, err);
        }
        let mut space = build_address_space(&core, &mut diagnostics);
        let notes = read_process_notes(&core, arch, &mut diagnostics)?;
        let pid = match (&notes.process, notes.threads.first()) {
            (Some(info), _) => info.pid as u32 as u64,
            (None, Some(thread)) => thread.tid,
            (None, None) => 0,
        };
        let platform = notes
            .auxv
            .platform()
            .and_then(|addr| space.read_string_at(addr).ok());

        let hints = ExecutableHints {
            entry: notes.auxv.entry(),
            file_name: notes.process.as_ref().map(|p| p.file_name.clone()).unwrap_or_default(),
            command_line: notes.process.as_ref().map(|p| p.arguments.clone()).unwrap_or_default(),
        };
        let mut open_files = Vec::new();
        let resolved = ModuleResolver::new(
            &core,
            &mut space,
            &options,
            libraries,
            &mut diagnostics,
            &mut open_files,
        )
        .resolve(&hints);

        for thread in notes.threads.iter() {
            let sp = arch.stack_pointer(&thread.registers);
            let unnamed = space.range_for_address(sp).is_some_and(|r| r.name.is_none());
            if unnamed {
                space.set_name(sp, "stack");
            }
        }

        Ok(CoreDump {
            core,
            arch,
            space,
            pid,
            process: notes.process,
            auxv: notes.auxv,
            platform,
            threads: notes.threads,
            executable: resolved.executable,
            libraries: resolved.libraries,
            diagnostics,
            options,
            open_files,
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn command_line(&self) -> &str {
        self.process.as_ref().map(|p| p.arguments.as_str()).unwrap_or("")
    }

    /// The signal that killed the process, 0 if unknown.
    pub fn signal(&self) -> i32 {
        self.threads.first().map(|t| t.signal()).unwrap_or(0)
    }

    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert("System type".to_string(), "Linux".to_string());
        properties.insert("Processor type".to_string(), self.arch.processor_type.to_string());
        properties.insert(
            "Processor subtype".to_string(),
            self.platform.clone().unwrap_or_else(|| "unknown".to_string()),
        );
        properties.insert("Dump format".to_string(), "ELF".to_string());
        properties.insert("Signal number".to_string(), self.signal().to_string());
        properties
    }

    /// The executable followed by the libraries.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        std::iter::once(&self.executable).chain(self.libraries.iter())
    }

    pub fn module_for_address(&self, addr: u64) -> Option<&Module> {
        self.modules().find(|m| m.contains(addr))
    }

    /// The module and function containing addr along with the offset into the function.
    pub fn symbol_for_address(&self, addr: u64) -> Option<(&Module, &Symbol, u64)> {
        let module = self.module_for_address(addr)?;
        let (symbol, offset) = module.symbol_for_address(addr)?;
        Some((module, symbol, offset))
    }

    /// The thread's stack, walked the first time it's asked for.
    pub fn stack_trace(&self, index: usize) -> Option<&StackTrace> {
        let thread = self.threads.get(index)?;
        Some(thread.trace.get_or_init(|| self.walk(&thread.registers)))
    }

    pub fn walk(&self, registers: &Registers) -> StackTrace {
        let modules: Vec<&Module> = self.modules().collect();
        walk_stack(self.arch, &self.space, &modules, registers)
    }

    /// Forgets every cached stack trace.
    pub fn invalidate_stacks(&mut self) {
        for thread in self.threads.iter_mut() {
            thread.invalidate();
        }
    }

    pub fn read_bytes(&self, addr: u64, len: usize) -> CoreResult<Vec<u8>> {
        self.space.read_bytes(addr, len)
    }

    pub fn read_string_at(&self, addr: u64) -> CoreResult<String> {
        self.space.read_string_at(addr)
    }

    pub fn find_pattern(&self, pattern: &[u8], start: u64) -> Option<u64> {
        self.space.find_pattern(pattern, start)
    }

    pub fn open_file_count(&self) -> usize {
        self.open_files.len()
    }

    /// Releases the library and executable copies. Memory maps shared with the address
    /// space go away with the CoreDump.
    pub fn close(mut self) {
        self.open_files.clear();
    }
}

impl std::fmt::Debug for CoreDump {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "CoreDump {{ core: {}, arch: {:?}, pid: {}, threads: {}, libraries: {}, diagnostics: {} }}",
            self.core.name,
            self.arch,
            self.pid,
            self.threads.len(),
            self.libraries.len(),
            self.diagnostics.len()
        )
    }
}

/// Adds the Load segments. Segments that were only partly dumped get a backed range
/// for what's in the file and a placeholder for the rest.
fn build_address_space(core: &ElfFile, diagnostics: &mut Diagnostics) -> AddressSpace {
    let mut space = AddressSpace::new(core.header.sixty_four_bit, core.header.little_endian);
    let source = core.reader.source();
    let file_len = core.reader.len() as u64;
    for ph in core.loads() {
        if ph.vaddr == 0 && ph.mem_size == u64::MAX {
            continue;
        }
        let available = file_len.saturating_sub(ph.offset).min(ph.file_size);
        let backed = available.min(ph.mem_size);
        if backed > 0 {
            let offset = core.reader.base() as u64 + ph.offset;
            let range = MemorySource::backed(ph.vaddr, backed, source.clone(), offset, ph.flags);
            add_segment(&mut space, range, diagnostics);
        }
        if ph.mem_size > backed {
            let reason = if ph.file_size == 0 {
                "segment wasn't dumped"
            } else if available < ph.file_size {
                "core file is truncated"
            } else {
                "segment was only partially dumped"
            };
            let range = MemorySource::unbacked(
                ph.vaddr.wrapping_add(backed),
                ph.mem_size - backed,
                reason,
                ph.flags,
            );
            add_segment(&mut space, range, diagnostics);
        }
    }
    space
}

fn add_segment(space: &mut AddressSpace, range: MemorySource, diagnostics: &mut Diagnostics) {
    let (base, size) = (range.base, range.size);
    if space.add_source(range) == AddOutcome::Rejected {
        let err = CoreError::corrupt(format!(
            "Load segment 0x{base:x} ({size} bytes) wraps or overlaps another segment"
        ));
        diagnostics.warn("address space", &err);
    }
}

fn read_process_notes(
    core: &ElfFile,
    arch: &Architecture,
    diagnostics: &mut Diagnostics,
) -> CoreResult<ProcessNotes> {
    let (notes, errors) = core.notes();
    for err in errors.iter() {
        diagnostics.warn("notes", err);
    }

    let mut threads = Vec::new();
    let mut process = None;
    let mut auxv = AuxiliaryVector::default();
    let mut high_gprs = None;
    for note in notes.iter() {
        match note.ntype {
            NoteType::PrStatus => match read_thread(&core.reader, arch, note) {
                Ok(thread) => threads.push(thread),
                Err(err) => diagnostics.warn("prstatus", &err),
            },
            NoteType::PrPsInfo => match PrPsInfo::read(&core.reader, note, arch.uid_width) {
                Ok(info) if process.is_none() => process = Some(info),
                Ok(_) => {
                    let err = CoreError::corrupt("more than one process info note");
                    diagnostics.warn("prpsinfo", &err);
                }
                Err(err) => diagnostics.warn("prpsinfo", &err),
            },
            NoteType::AuxV => match AuxiliaryVector::read(&core.reader, note) {
                Ok(vector) => auxv = vector,
                Err(err) => diagnostics.warn("auxv", &err),
            },
            NoteType::S390HighGprs => high_gprs = Some(note),
            _ => (),
        }
    }
    utils::require(!threads.is_empty() || process.is_some(), || {
        CoreError::corrupt(format!("{} has no thread or process notes", core.name))
    })?;

    if let Some(note) = high_gprs
        && arch.machine == EM_S390
        && !arch.sixty_four_bit
    {
        let pid = process.as_ref().map(|p| p.pid as u32 as u64);
        let main = threads
            .iter()
            .position(|t| Some(t.tid) == pid)
            .or(if threads.is_empty() { None } else { Some(0) });
        if let Some(index) = main
            && let Err(err) = merge_high_gprs(&core.reader, note, &mut threads[index].registers)
        {
            diagnostics.warn("s390 high gprs", &err);
        }
    }

    Ok(ProcessNotes {
        threads,
        process,
        auxv,
    })
}

fn read_thread(reader: &Reader, arch: &Architecture, note: &Note) -> CoreResult<OsThread> {
    let mut s = Stream::new(reader, note.offset);
    let status = PrStatus::read(&mut s)?;
    let registers = arch.read_registers(&mut s)?;
    utils::require(s.offset <= note.offset + note.size, || {
        CoreError::corrupt(format!("prstatus note is too small ({} bytes)", note.size))
    })?;
    Ok(OsThread::new(status, registers))
}

/// 31-bit s390 processes running on 64-bit kernels keep the upper halves of their
/// general purpose registers in a separate note.
fn merge_high_gprs(reader: &Reader, note: &Note, registers: &mut Registers) -> CoreResult<()> {
    utils::require(note.size >= 4 * s390::HIGH_GPRS.len(), || {
        CoreError::corrupt(format!("high gprs note is too small ({} bytes)", note.size))
    })?;
    let mut s = Stream::new(reader, note.offset);
    for name in s390::HIGH_GPRS.iter() {
        let high = s.read_word()? as u64;
        if let Some(value) = registers.get_mut(name) {
            *value = (high << 32) | (*value & 0xffff_ffff);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::x86::AMD64;
    use crate::error::ErrorKind;
    use crate::memory::Backing;
    use crate::modules::{MemoryResolver, ModuleSource, NoLibraries};
    use crate::process::StopReason;
    use crate::utils::synthetic::{self, *};

    fn quiet() -> Options {
        Options {
            quiet: true,
            ..Default::default()
        }
    }

    fn load(bytes: Vec<u8>, libraries: &dyn LibraryResolver) -> CoreResult<CoreDump> {
        CoreDump::from_source(ByteSource::from_vec("core", bytes), quiet(), libraries)
    }

    fn reason(dump: &CoreDump, addr: u64) -> String {
        match dump.space.range_for_address(addr).map(|r| &r.backing) {
            Some(Backing::Unbacked { reason }) => reason.clone(),
            Some(Backing::File { .. }) => "backed".to_string(),
            None => "unmapped".to_string(),
        }
    }

    #[test]
    fn minimal_core() {
        let prstatus = synthetic::prstatus(
            &AMD64,
            true,
            42,
            &[("rsp", 0x7ffee0000100), ("rip", 0x401000)],
        );
        let mut b = ElfBuilder::core(&AMD64, true);
        b.segments.push(SegmentSpec::new(4, 0, synthetic::note(true, "CORE", 1, &prstatus)));
        b.segments.push(SegmentSpec::new(1, 0x401000, vec![0; 0x1000]));
        let dump = load(b.build(), &NoLibraries).unwrap();

        assert_eq!(dump.threads.len(), 1);
        assert_eq!(dump.threads[0].tid, 42);
        assert_eq!(dump.pid, 42);
        assert_eq!(dump.arch.instruction_pointer(&dump.threads[0].registers), 0x401000);
        assert!(dump.threads[0].cached_trace().is_none());

        let trace = dump.stack_trace(0).unwrap();
        assert_eq!(trace.frames.len(), 1);
        assert_eq!(trace.frames[0].instruction_pointer, 0x401000);
        assert!(dump.threads[0].cached_trace().is_some());
        assert!(dump.stack_trace(1).is_none());

        assert!(dump.executable.is_missing());
        assert_eq!(dump.executable.name, "executable");
        assert!(dump.libraries.is_empty());
    }

    #[test]
    fn sample_process() {
        let dump = load(sample_core(), &NoLibraries).unwrap();
        assert_eq!(dump.pid, 42);
        assert_eq!(dump.command_line(), "/opt/bin/app -x");
        assert_eq!(dump.signal(), 11);
        let tids: Vec<u64> = dump.threads.iter().map(|t| t.tid).collect();
        assert_eq!(tids, vec![42, 43]);
        assert_eq!(dump.threads[0].properties["Thread user time secs"], "3");
        assert_eq!(dump.threads[0].properties["Thread sys time usecs"], "0");

        let properties = dump.properties();
        assert_eq!(properties["Processor type"], "amd64");
        assert_eq!(properties["Processor subtype"], "x86_64");
        assert_eq!(properties["Signal number"], "11");
        assert_eq!(properties["System type"], "Linux");

        assert_eq!(dump.executable.name, "/opt/bin/app");
        assert_eq!(dump.executable.base, EXE_BASE);
        assert_eq!(dump.executable.source, ModuleSource::InCore);
        let names: Vec<&str> = dump.libraries.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["/opt/lib/libfoo.so.1", "/opt/lib/libbar.so"]);
        assert_eq!(dump.libraries[0].base, LIB_BASE);
        assert_eq!(dump.libraries[0].source, ModuleSource::InCore);
        assert!(dump.libraries[1].is_missing());
        assert_eq!(dump.libraries[1].base, MISSING_LIB_BASE);
        assert!(
            dump.diagnostics
                .of_kind(ErrorKind::MissingResource)
                .any(|d| d.subject == "/opt/lib/libbar.so")
        );
        assert_eq!(dump.open_file_count(), 0);
    }

    #[test]
    fn sample_memory() {
        let dump = load(sample_core(), &NoLibraries).unwrap();
        assert_eq!(reason(&dump, EXE_BASE), "backed");
        assert_eq!(reason(&dump, 0x401800), "segment was only partially dumped");
        assert_eq!(reason(&dump, UNDUMPED_BASE), "segment wasn't dumped");
        assert_eq!(reason(&dump, 0x1000), "unmapped");

        let stack = dump.space.range_for_address(STACK_BASE + 0x100).unwrap();
        assert_eq!(stack.name.as_deref(), Some("stack"));
        let lib = dump.space.range_for_address(LIB_BASE).unwrap();
        assert_eq!(lib.name.as_deref(), Some("/opt/lib/libfoo.so.1"));

        assert_eq!(dump.read_string_at(DATA_BASE + 0x410).unwrap(), "/opt/lib/libfoo.so.1");
        assert_eq!(dump.find_pattern(b"libbar", DATA_BASE), Some(DATA_BASE + 0x439));
        assert_eq!(dump.read_bytes(EXE_BASE, 4).unwrap(), b"\x7fELF");
        let err = dump.read_bytes(UNDUMPED_BASE, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryFault);
    }

    #[test]
    fn sample_stacks() {
        let dump = load(sample_core(), &NoLibraries).unwrap();
        let trace = dump.stack_trace(0).unwrap();
        let ips: Vec<u64> = trace.frames.iter().map(|f| f.instruction_pointer).collect();
        assert_eq!(ips, vec![0x401010, 0x401100, LIB_BASE + 0x184]);
        assert_eq!(trace.stopped, StopReason::EndOfChain);
        assert_eq!(dump.module_for_address(LIB_BASE + 0x184).unwrap().name, "/opt/lib/libfoo.so.1");

        // No symbols without the library copy.
        assert!(dump.symbol_for_address(LIB_BASE + 0x184).is_none());

        let trace = dump.stack_trace(1).unwrap();
        assert!(trace.frames.is_empty());
    }

    #[test]
    fn library_copies() {
        let mut libraries = MemoryResolver::new();
        libraries.insert("/opt/lib/libfoo.so.1", library_image("libfoo.so.1"));
        let dump = load(sample_core(), &libraries).unwrap();

        let lib = &dump.libraries[0];
        assert_eq!(lib.source, ModuleSource::External("/opt/lib/libfoo.so.1".to_string()));
        let ranges: Vec<&str> = lib.ranges.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(ranges, vec![".text", ".dynamic"]);
        assert!(lib.ranges.iter().all(|r| r.backed));

        let (module, symbol, offset) = dump.symbol_for_address(LIB_BASE + 0x184).unwrap();
        assert_eq!(module.base, LIB_BASE);
        assert_eq!(symbol.name, "foo_init");
        assert_eq!(offset, 4);
        assert_eq!(dump.open_file_count(), 1);
        dump.close();
    }

    #[test]
    fn loaded_libraries_only() {
        let mut libraries = MemoryResolver::new();
        libraries.insert("/opt/lib/libfoo.so.1", library_image("libfoo.so.1"));
        let options = Options {
            use_loaded_libraries: true,
            quiet: true,
            ..Default::default()
        };
        let source = ByteSource::from_vec("core", sample_core());
        let dump = CoreDump::from_source(source, options, &libraries).unwrap();
        assert_eq!(dump.libraries[0].source, ModuleSource::InCore);
        assert_eq!(dump.open_file_count(), 0);
    }

    #[test]
    fn invalidated_stacks_are_walked_again() {
        let mut dump = load(sample_core(), &NoLibraries).unwrap();
        assert_eq!(dump.stack_trace(0).unwrap().frames.len(), 3);

        dump.invalidate_stacks();
        assert!(dump.threads[0].cached_trace().is_none());
        dump.threads[0].registers.insert("rbp", 0);
        assert_eq!(dump.stack_trace(0).unwrap().frames.len(), 1);
    }

    #[test]
    fn rejects_non_cores() {
        let err = load(executable_image(), &NoLibraries).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        insta::assert_snapshot!(err.to_string(), @"bad ELF format: core isn't a core file (file type is executable)");

        let mut b = ElfBuilder::core(&AMD64, true);
        b.segments.push(SegmentSpec::new(1, 0x401000, vec![0; 0x100]));
        let err = load(b.build(), &NoLibraries).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn damaged_executable_header() {
        let mut bytes = sample_core();
        let core = ElfFile::parse(ByteSource::from_vec("core", bytes.clone())).unwrap();
        let exe = core.segments.iter().find(|ph| ph.vaddr == EXE_BASE).unwrap();
        let start = exe.offset as usize + 32; // e_phoff of the in-core image
        bytes[start..start + 8].copy_from_slice(&(u64::MAX - 8).to_le_bytes());

        let dump = load(bytes, &NoLibraries).unwrap();
        assert_eq!(dump.pid, 42);
        assert_eq!(dump.threads.len(), 2);
        assert_eq!(reason(&dump, EXE_BASE), "backed");

        let text = format!("{dump:?}");
        assert!(text.starts_with("CoreDump { core: core, arch: amd64, pid: 42, threads: 2, "), "{text}");
    }

    #[test]
    fn duplicate_process_info() {
        let info = synthetic::prpsinfo(&AMD64, true, 7, "app", "app");
        let mut notes = synthetic::note(true, "CORE", 3, &info);
        notes.extend(synthetic::note(true, "CORE", 3, &info));
        let mut b = ElfBuilder::core(&AMD64, true);
        b.segments.push(SegmentSpec::new(4, 0, notes));
        let dump = load(b.build(), &NoLibraries).unwrap();

        assert!(dump.threads.is_empty());
        assert_eq!(dump.pid, 7);
        let messages: Vec<String> = dump
            .diagnostics
            .of_kind(ErrorKind::CorruptData)
            .map(|d| d.to_string())
            .collect();
        assert_eq!(messages, vec!["corrupt data: prpsinfo: corrupt data: more than one process info note"]);
    }

    #[test]
    fn s390_high_registers() {
        let arch = &s390::S390;
        let prstatus = synthetic::prstatus(arch, false, 7, &[("gpr2", 0x1234), ("gpr3", 0x5678)]);
        let mut high = ByteWriter::new(false, false);
        for i in 0..16 {
            high.word(if i == 2 { 1 } else { 0 });
        }
        let mut notes = synthetic::note(false, "CORE", 1, &prstatus);
        notes.extend(synthetic::note(false, "LINUX", 0x300, &high.bytes));
        let mut b = ElfBuilder::core(arch, false);
        b.segments.push(SegmentSpec::new(4, 0, notes));
        let dump = load(b.build(), &NoLibraries).unwrap();

        let regs = &dump.threads[0].registers;
        assert_eq!(regs["gpr2"], 0x1_0000_1234);
        assert_eq!(regs["gpr3"], 0x5678);
    }
}
