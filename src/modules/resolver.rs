//! Reconstructs the executable and the shared libraries from three sources:
//!
//! 1. ELF images found at the start of the core's Load segments. The kernel dumps the
//!    first page of every file mapping so most modules show up here, usually with
//!    their program headers but without section tables.
//! 2. The dynamic linker's link map which has the full paths of the libraries (and
//!    libraries whose first page wasn't dumped).
//! 3. Copies of the executable and libraries from a [`LibraryResolver`]. These have
//!    section tables and symbols but are only used if they match what was loaded.
//!
//! Memory ranges always come from the core: a library copy says what the sections
//! were but only the core knows what was actually in memory.
use super::{
    LibraryResolver, Module, ModuleRange, ModuleSource, find_debug_address, read_link_map,
};
use crate::debug::{CallFrameTable, module_symbols};
use crate::elf::{
    ByteSource, DT_SONAME, DT_STRTAB, DynamicTable, ElfFile, FileType, SectionHeader,
    SectionType, SegmentType,
};
use crate::error::{CoreError, CoreResult};
use crate::memory::{AddressSpace, MemorySource};
use crate::process::{Diagnostics, Options};
use std::collections::BTreeMap;

/// SONAME reported by an executable that's been dumped into the core.
const EXECUTABLE_PLACEHOLDER: &str = "lib.so";

/// What the notes say about the executable.
#[derive(Clone, Debug, Default)]
pub struct ExecutableHints {
    /// AT_ENTRY from the auxiliary vector: where the executable's entry point was
    /// loaded.
    pub entry: Option<u64>,

    /// pr_fname: the first 15 characters of the executable's file name.
    pub file_name: String,

    /// pr_psargs: the start of the command line.
    pub command_line: String,
}

#[derive(Debug)]
pub struct ResolvedModules {
    pub executable: Module,

    /// Sorted by base address.
    pub libraries: Vec<Module>,
}

struct Executable {
    name: String,
    base: Option<u64>,
    external: Option<ElfFile>,
}

pub struct ModuleResolver<'a> {
    core: &'a ElfFile,
    space: &'a mut AddressSpace,
    options: &'a Options,
    libraries: &'a dyn LibraryResolver,
    diagnostics: &'a mut Diagnostics,

    /// Every file opened via the library resolver.
    opened: &'a mut Vec<ByteSource>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(
        core: &'a ElfFile,
        space: &'a mut AddressSpace,
        options: &'a Options,
        libraries: &'a dyn LibraryResolver,
        diagnostics: &'a mut Diagnostics,
        opened: &'a mut Vec<ByteSource>,
    ) -> Self {
        ModuleResolver {
            core,
            space,
            options,
            libraries,
            diagnostics,
            opened,
        }
    }

    pub fn resolve(mut self, hints: &ExecutableHints) -> ResolvedModules {
        let images = self.scan_images();
        let exe = self.find_executable(&images, hints);
        let link_names = self.link_map_names(&exe, &images);

        let mut libraries = Vec::new();
        for (base, image) in images.iter() {
            if Some(*base) == exe.base {
                continue;
            }
            let soname = match self.read_soname(image, *base) {
                Some(name) if name == EXECUTABLE_PLACEHOLDER => Some(exe.name.clone()),
                soname => soname,
            };
            // Images without a name are data files or mappings we can't identify.
            let Some(name) = link_names.get(base).cloned().or(soname) else {
                continue;
            };
            let external = self.find_compatible_library(&name, image);
            libraries.push(self.build_module(*base, &name, Some(image), external));
        }

        for (base, name) in link_names.iter() {
            if images.contains_key(base) || Some(*base) == exe.base {
                continue;
            }
            let err = CoreError::missing(format!("image at 0x{base:x} (not dumped)"));
            self.diagnostics.record(name, &err);
            libraries.push(Module::missing(name, *base));
        }
        libraries.sort_by_key(|m| m.base);

        let executable = self.build_executable(exe, &images);
        ResolvedModules {
            executable,
            libraries,
        }
    }

    /// Every Load segment that starts with a parseable ELF header, keyed by address.
    /// Most segments aren't ELF images so failures are expected and ignored.
    fn scan_images(&self) -> BTreeMap<u64, ElfFile> {
        let mut images = BTreeMap::new();
        let source = self.core.reader.source();
        for ph in self.core.loads().filter(|ph| !ph.is_empty()) {
            let name = format!("image at 0x{:x}", ph.vaddr);
            let Some(offset) = self.core.reader.base().checked_add(ph.offset as usize) else {
                continue;
            };
            let Ok(image) = ElfFile::parse_at(source.clone(), offset, ph.file_size as usize, &name)
            else {
                continue;
            };
            if image.header.file_type != FileType::Core && image.load_base().is_some() {
                images.insert(ph.vaddr, image);
            }
        }
        images
    }

    fn find_executable(&mut self, images: &BTreeMap<u64, ElfFile>, hints: &ExecutableHints) -> Executable {
        let external = if self.options.use_loaded_libraries {
            None
        } else {
            self.find_external_executable(hints)
        };
        let name = external
            .as_ref()
            .map(|(name, _)| name.clone())
            .or_else(|| self.options.executable_path.clone())
            .unwrap_or_else(|| default_executable_name(hints));

        let base = match (find_in_core_executable(images, hints.entry), &external) {
            (Some(base), _) => Some(base),
            (None, Some((_, file))) => external_base(file, hints.entry),
            (None, None) => None,
        };
        Executable {
            name,
            base,
            external: external.map(|(_, file)| file),
        }
    }

    /// Tries the override, the first word of the command line, and then pr_fname.
    fn find_external_executable(&mut self, hints: &ExecutableHints) -> Option<(String, ElfFile)> {
        let mut candidates = Vec::new();
        if let Some(path) = &self.options.executable_path {
            candidates.push(path.clone());
        }
        if let Some(word) = hints.command_line.split_whitespace().next() {
            candidates.push(word.to_string());
        }
        if !hints.file_name.is_empty() {
            candidates.push(hints.file_name.clone());
        }
        for name in candidates {
            if let Some(file) = self.open_external(&name) {
                return Some((name, file));
            }
        }
        None
    }

    fn build_executable(&mut self, exe: Executable, images: &BTreeMap<u64, ElfFile>) -> Module {
        let Some(base) = exe.base else {
            let err = CoreError::missing("executable (not in the core and not found)");
            self.diagnostics.record(&exe.name, &err);
            return Module::missing(&exe.name, 0);
        };
        let image = images.get(&base);
        let external = match (exe.external, image) {
            (Some(file), Some(image)) => self.check_compatible(image, file),
            (external, _) => external,
        };
        self.build_module(base, &exe.name, image, external)
    }

    /// Link map paths keyed by load address. Entries whose names aren't absolute
    /// paths are named with the SONAME of the image at that address.
    fn link_map_names(
        &mut self,
        exe: &Executable,
        images: &BTreeMap<u64, ElfFile>,
    ) -> BTreeMap<u64, String> {
        let mut names = BTreeMap::new();
        let Some(base) = exe.base else {
            return names;
        };
        let Some(file) = exe.external.as_ref().or_else(|| images.get(&base)) else {
            return names;
        };
        let Some(dynamic) = file.find_segment(SegmentType::Dynamic) else {
            return names;
        };
        let bias = base.wrapping_sub(file.load_base().unwrap_or(base));
        let addr = dynamic.vaddr.wrapping_add(bias);
        if !self.space.is_mapped(addr) {
            return names;
        }

        let r_debug = match find_debug_address(self.space, addr, self.diagnostics) {
            Ok(Some(r_debug)) => r_debug,
            Ok(None) => return names,
            Err(err) => {
                self.diagnostics.record("link map", &err);
                return names;
            }
        };
        let (entries, err) = read_link_map(self.space, r_debug);
        if let Some(err) = err {
            self.diagnostics.warn("link map", &err);
        }

        for entry in entries {
            if entry.name.starts_with('/') {
                names.insert(entry.base, entry.name);
            } else if let Some(image) = images.get(&entry.base)
                && let Some(soname) = self.read_soname(image, entry.base)
            {
                names.insert(entry.base, soname);
            }
        }
        names
    }

    /// DT_SONAME from the image's dynamic table as it is in memory.
    pub fn read_soname(&self, image: &ElfFile, base: u64) -> Option<String> {
        let dynamic = image.find_segment(SegmentType::Dynamic)?;
        let bias = base.wrapping_sub(image.load_base()?);
        let addr = dynamic.vaddr.wrapping_add(bias);
        let size = dynamic.mem_size.max(dynamic.file_size);
        let table = DynamicTable::read(self.space, addr, size).ok()?;
        let soname = table.find(DT_SONAME)?;
        let strtab = table.find(DT_STRTAB)?;

        // Most loaders relocate DT_STRTAB in place but not all.
        let strtab = if strtab < base {
            strtab.wrapping_add(bias)
        } else {
            strtab
        };
        self.space
            .read_string_at(strtab.wrapping_add(soname))
            .ok()
            .filter(|name| !name.is_empty())
    }

    fn open_external(&mut self, name: &str) -> Option<ElfFile> {
        match self.libraries.resolve(name) {
            Ok(Some(source)) => {
                self.opened.push(source.clone());
                match ElfFile::parse(source) {
                    Ok(file) => Some(file),
                    Err(err) => {
                        self.diagnostics.record(name, &err);
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(err) => {
                self.diagnostics.record(name, &err);
                None
            }
        }
    }

    /// Resolves name and, for names that aren't absolute paths, retries in the known
    /// library directories.
    fn find_library(&mut self, name: &str) -> Option<ElfFile> {
        if let Some(file) = self.open_external(name) {
            return Some(file);
        }
        if !name.starts_with('/') {
            for dir in self.options.lib_paths(self.core.header.sixty_four_bit) {
                let path = dir.join(name);
                if let Some(file) = self.open_external(&path.to_string_lossy()) {
                    return Some(file);
                }
            }
        }
        self.diagnostics
            .record(name, &CoreError::missing(format!("copy of {name}")));
        None
    }

    fn find_compatible_library(&mut self, name: &str, image: &ElfFile) -> Option<ElfFile> {
        if self.options.use_loaded_libraries {
            return None;
        }
        let file = self.find_library(name)?;
        self.check_compatible(image, file)
    }

    fn check_compatible(&mut self, image: &ElfFile, file: ElfFile) -> Option<ElfFile> {
        match compatible(image, &file) {
            Ok(()) => Some(file),
            Err(err) => {
                self.diagnostics.record(&file.name, &err);
                None
            }
        }
    }

    fn build_module(
        &mut self,
        base: u64,
        name: &str,
        in_core: Option<&ElfFile>,
        external: Option<ElfFile>,
    ) -> Module {
        let Some(meta) = external.as_ref().or(in_core) else {
            return Module::missing(name, base);
        };
        let layout = in_core.unwrap_or(meta);
        let bias = base.wrapping_sub(layout.load_base().unwrap_or(base));

        let (symbols, errors) = module_symbols(meta, base);
        for err in errors.iter().chain(meta.errors.iter()) {
            self.diagnostics.record(name, err);
        }

        self.name_segments(name, layout, bias);
        let ranges = if meta.sections.is_empty() {
            self.segment_ranges(layout, bias)
        } else {
            self.section_ranges(meta, in_core, bias)
        };
        let cfi = self.load_cfi(name, layout, bias);
        let source = match &external {
            Some(file) => ModuleSource::External(file.name.clone()),
            None => ModuleSource::InCore,
        };

        Module {
            name: name.to_string(),
            base,
            ranges,
            symbols,
            properties: layout.properties(),
            source,
            cfi,
        }
    }

    fn name_segments(&mut self, name: &str, layout: &ElfFile, bias: u64) {
        for ph in layout.loads() {
            let addr = ph.vaddr.wrapping_add(bias);
            let unnamed = self
                .space
                .range_for_address(addr)
                .is_some_and(|range| range.name.is_none());
            if unnamed {
                self.space.set_name(addr, name);
            }
        }
    }

    fn segment_ranges(&self, layout: &ElfFile, bias: u64) -> Vec<ModuleRange> {
        layout
            .loads()
            .map(|ph| {
                let addr = ph.vaddr.wrapping_add(bias);
                ModuleRange {
                    name: String::new(),
                    base: addr,
                    size: ph.mem_size,
                    backed: self.is_backed(addr),
                }
            })
            .collect()
    }

    /// Ranges for the allocated sections. Sections the core has bytes for keep the
    /// core's bytes. The rest are installed, backed by the in-core image if it has
    /// them.
    fn section_ranges(&mut self, meta: &ElfFile, in_core: Option<&ElfFile>, bias: u64) -> Vec<ModuleRange> {
        let mut ranges = Vec::new();
        for section in meta.sections.iter() {
            // Sections linked at zero (.comment, .symtab, etc) usually aren't loaded.
            // Adding them would shadow whatever follows the module's base.
            if section.addr == 0 || section.size == 0 {
                continue;
            }
            let addr = section.addr.wrapping_add(bias);
            let name = meta.section_name(section).unwrap_or_default();
            if !self.is_backed(addr) {
                let source = section_source(section, in_core, addr).with_name(&name);
                self.space.add_source(source);
            }
            ranges.push(ModuleRange {
                name,
                base: addr,
                size: section.size,
                backed: self.is_backed(addr),
            });
        }
        ranges
    }

    fn load_cfi(&mut self, name: &str, layout: &ElfFile, bias: u64) -> Option<CallFrameTable> {
        let ph = layout.find_segment(SegmentType::GnuEhFrame)?;
        let addr = ph.vaddr.wrapping_add(bias);
        match CallFrameTable::load(self.space, addr, ph.mem_size.max(ph.file_size)) {
            Ok(table) => Some(table),
            Err(err) => {
                // Common for the vdso and for libraries mapped more than once.
                self.diagnostics.record(name, &err);
                None
            }
        }
    }

    fn is_backed(&self, addr: u64) -> bool {
        self.space
            .range_for_address(addr)
            .is_some_and(|range| range.is_backed())
    }
}

/// A library copy is only used if it looks like the image that was loaded. This
/// guards against, for example, picking up a prelinked library from a different
/// machine.
pub fn compatible(in_core: &ElfFile, external: &ElfFile) -> CoreResult<()> {
    let (a, b) = (&in_core.header, &external.header);
    let mismatch = |what: &str| {
        Err(CoreError::corrupt(format!(
            "{} doesn't match the image in the core: {what} differs",
            external.name
        )))
    };
    if a.machine != b.machine {
        return mismatch("machine type");
    }
    if a.num_ph_entries != b.num_ph_entries {
        return mismatch("program header count");
    }
    if a.num_section_entries != b.num_section_entries {
        return mismatch("section header count");
    }
    if a.version != b.version {
        return mismatch("ELF version");
    }
    let differs = in_core
        .segments
        .iter()
        .zip(external.segments.iter())
        .any(|(x, y)| x.vaddr != y.vaddr);
    if differs {
        return mismatch("segment address");
    }
    Ok(())
}

fn section_source(section: &SectionHeader, in_core: Option<&ElfFile>, addr: u64) -> MemorySource {
    let flags = section.segment_flags();
    if section.stype != SectionType::NoBits
        && let Some(image) = in_core
        && section
            .offset
            .checked_add(section.size)
            .is_some_and(|end| end <= image.reader.len() as u64)
    {
        let offset = image.reader.base() as u64 + section.offset;
        return MemorySource::backed(addr, section.size, image.reader.source().clone(), offset, flags);
    }
    MemorySource::unbacked(addr, section.size, "section isn't in the core", flags)
}

/// The in-core image whose entry point (after relocation) is AT_ENTRY, else the first
/// ET_EXEC image.
fn find_in_core_executable(images: &BTreeMap<u64, ElfFile>, entry: Option<u64>) -> Option<u64> {
    if let Some(entry) = entry {
        for (base, image) in images.iter() {
            let Some(load_base) = image.load_base() else {
                continue;
            };
            let bias = base.wrapping_sub(load_base);
            if image.header.entry != 0 && image.header.entry.wrapping_add(bias) == entry {
                return Some(*base);
            }
        }
    }
    images
        .iter()
        .find(|(_, image)| image.header.file_type == FileType::Executable)
        .map(|(base, _)| *base)
}

/// Where an executable found outside the core was loaded. Position independent
/// executables are found by comparing the entry points.
fn external_base(file: &ElfFile, entry: Option<u64>) -> Option<u64> {
    let load_base = file.load_base()?;
    match entry {
        Some(entry) if file.header.entry != 0 => {
            Some(entry.wrapping_sub(file.header.entry).wrapping_add(load_base))
        }
        _ => Some(load_base),
    }
}

fn default_executable_name(hints: &ExecutableHints) -> String {
    match hints.command_line.split_whitespace().next() {
        Some(word) => word.to_string(),
        None if !hints.file_name.is_empty() => hints.file_name.clone(),
        None => "executable".to_string(),
    }
}
