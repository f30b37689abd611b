//! Byte-exact ELF images and core files for unit tests.
use crate::arch::Architecture;

/// Little helper for laying out ELF structures with the right widths and byte order.
pub struct ByteWriter {
    pub little_endian: bool,
    pub sixty_four_bit: bool,
    pub bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new(sixty_four_bit: bool, little_endian: bool) -> Self {
        ByteWriter {
            little_endian,
            sixty_four_bit,
            bytes: Vec::new(),
        }
    }

    pub fn pos(&self) -> usize {
        self.bytes.len()
    }

    pub fn byte(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub fn half(&mut self, value: u16) -> &mut Self {
        if self.little_endian {
            self.bytes.extend(value.to_le_bytes());
        } else {
            self.bytes.extend(value.to_be_bytes());
        }
        self
    }

    pub fn word(&mut self, value: u32) -> &mut Self {
        if self.little_endian {
            self.bytes.extend(value.to_le_bytes());
        } else {
            self.bytes.extend(value.to_be_bytes());
        }
        self
    }

    pub fn xword(&mut self, value: u64) -> &mut Self {
        if self.little_endian {
            self.bytes.extend(value.to_le_bytes());
        } else {
            self.bytes.extend(value.to_be_bytes());
        }
        self
    }

    /// Address, offset, or user_long_t.
    pub fn addr(&mut self, value: u64) -> &mut Self {
        if self.sixty_four_bit {
            self.xword(value)
        } else {
            self.word(value as u32)
        }
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn fixed_string(&mut self, s: &str, size: usize) -> &mut Self {
        let mut field = vec![0u8; size];
        let n = s.len().min(size);
        field[..n].copy_from_slice(&s.as_bytes()[..n]);
        self.raw(&field)
    }

    pub fn align(&mut self, alignment: usize) -> &mut Self {
        while self.bytes.len() % alignment != 0 {
            self.bytes.push(0);
        }
        self
    }

    pub fn pad_to(&mut self, size: usize) -> &mut Self {
        if self.bytes.len() < size {
            self.bytes.resize(size, 0);
        }
        self
    }

    pub fn put_addr(&mut self, at: usize, value: u64) {
        let mut w = ByteWriter::new(self.sixty_four_bit, self.little_endian);
        w.addr(value);
        self.bytes[at..at + w.bytes.len()].copy_from_slice(&w.bytes);
    }
}

pub struct SegmentSpec {
    pub ptype: u32,
    pub flags: u32,
    pub vaddr: u64,
    pub data: Vec<u8>,

    /// Zero means use data.len().
    pub mem_size: u64,

    /// Used as is instead of the data offset when set.
    pub file_size: Option<u64>,
}

impl SegmentSpec {
    pub fn new(ptype: u32, vaddr: u64, data: Vec<u8>) -> Self {
        SegmentSpec {
            ptype,
            flags: 0x4,
            vaddr,
            data,
            mem_size: 0,
            file_size: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct SectionSpec {
    pub name: u32,
    pub stype: u32,
    pub flags: u64,
    pub addr: u64,
    pub data: Vec<u8>,
    pub size: Option<u64>,
    pub link: u32,
    pub info: u32,
    pub entry_size: u64,
}

impl SectionSpec {
    pub fn null() -> Self {
        SectionSpec::default()
    }
}

pub struct ElfBuilder {
    pub sixty_four_bit: bool,
    pub little_endian: bool,
    pub file_type: u16,
    pub machine: u16,
    pub entry: u64,
    pub segments: Vec<SegmentSpec>,
    pub sections: Vec<SectionSpec>,
    pub string_table_index: u16,

    /// Overrides e_shnum, e.g. to claim more sections than are present.
    pub section_count: Option<u16>,
}

impl ElfBuilder {
    pub fn new(sixty_four_bit: bool, little_endian: bool) -> Self {
        ElfBuilder {
            sixty_four_bit,
            little_endian,
            file_type: 2,
            machine: 62,
            entry: 0,
            segments: Vec::new(),
            sections: Vec::new(),
            string_table_index: 0,
            section_count: None,
        }
    }

    pub fn core(arch: &Architecture, little_endian: bool) -> Self {
        let mut b = ElfBuilder::new(arch.sixty_four_bit, little_endian);
        b.file_type = 4;
        b.machine = arch.machine;
        b
    }

    pub fn build(&self) -> Vec<u8> {
        let (header_size, ph_size, sh_size) = if self.sixty_four_bit {
            (64, 56, 64)
        } else {
            (52, 32, 40)
        };

        // Lay out segment and section contents after the program headers.
        let mut offset = header_size + ph_size * self.segments.len();
        let mut segment_offsets = Vec::new();
        for seg in self.segments.iter() {
            offset = (offset + 7) & !7;
            segment_offsets.push(offset);
            offset += seg.data.len();
        }
        let mut section_offsets = Vec::new();
        for sec in self.sections.iter() {
            offset = (offset + 7) & !7;
            section_offsets.push(offset);
            offset += sec.data.len();
        }
        let sh_offset = if self.sections.is_empty() {
            0
        } else {
            (offset + 7) & !7
        };

        let mut w = ByteWriter::new(self.sixty_four_bit, self.little_endian);
        w.raw(&[0x7f, b'E', b'L', b'F']);
        w.byte(if self.sixty_four_bit { 2 } else { 1 });
        w.byte(if self.little_endian { 1 } else { 2 });
        w.byte(1);
        w.pad_to(16);
        w.half(self.file_type);
        w.half(self.machine);
        w.word(1);
        w.addr(self.entry);
        w.addr(if self.segments.is_empty() {
            0
        } else {
            header_size as u64
        });
        w.addr(sh_offset as u64);
        w.word(0);
        w.half(header_size as u16);
        w.half(ph_size as u16);
        w.half(self.segments.len() as u16);
        w.half(sh_size as u16);
        w.half(
            self.section_count
                .unwrap_or(self.sections.len() as u16),
        );
        w.half(self.string_table_index);

        for (seg, offset) in self.segments.iter().zip(segment_offsets.iter()) {
            let file_size = seg.file_size.unwrap_or(seg.data.len() as u64);
            let mem_size = if seg.mem_size == 0 {
                seg.data.len() as u64
            } else {
                seg.mem_size
            };
            if self.sixty_four_bit {
                w.word(seg.ptype).word(seg.flags);
                w.xword(*offset as u64).xword(seg.vaddr).xword(0);
                w.xword(file_size).xword(mem_size).xword(0x1000);
            } else {
                w.word(seg.ptype).word(*offset as u32).word(seg.vaddr as u32).word(0);
                w.word(file_size as u32).word(mem_size as u32).word(seg.flags).word(0x1000);
            }
        }

        for (seg, offset) in self.segments.iter().zip(segment_offsets.iter()) {
            w.pad_to(*offset);
            w.raw(&seg.data);
        }
        for (sec, offset) in self.sections.iter().zip(section_offsets.iter()) {
            w.pad_to(*offset);
            w.raw(&sec.data);
        }

        if !self.sections.is_empty() {
            w.pad_to(sh_offset);
            for (sec, offset) in self.sections.iter().zip(section_offsets.iter()) {
                let size = sec.size.unwrap_or(sec.data.len() as u64);
                let offset = if sec.data.is_empty() { 0 } else { *offset as u64 };
                w.word(sec.name).word(sec.stype);
                w.addr(sec.flags).addr(sec.addr).addr(offset).addr(size);
                w.word(sec.link).word(sec.info);
                w.addr(if sec.stype == 0 { 0 } else { 8 }).addr(sec.entry_size);
            }
        }
        w.bytes
    }
}

/// A note record: namesz, descsz, type, then the padded name and descriptor.
pub fn note(little_endian: bool, name: &str, ntype: u32, desc: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::new(false, little_endian);
    w.word(name.len() as u32 + 1);
    w.word(desc.len() as u32);
    w.word(ntype);
    w.raw(name.as_bytes()).byte(0).align(4);
    w.raw(desc).align(4);
    w.bytes
}

/// elf_prstatus with the registers laid out per the architecture's note layout.
pub fn prstatus(
    arch: &Architecture,
    little_endian: bool,
    pid: u32,
    registers: &[(&str, u64)],
) -> Vec<u8> {
    let mut w = ByteWriter::new(arch.sixty_four_bit, little_endian);
    w.word(11).word(1).word(0); // SIGSEGV, SEGV_MAPERR
    w.half(11).half(0);
    w.addr(0).addr(0);
    w.word(pid).word(1).word(pid).word(pid);
    for t in 0..8 {
        w.addr(if t == 0 { 3 } else { 0 }); // 3 secs of user time
    }
    for (name, width) in arch.note_layout.iter() {
        let value = registers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .unwrap_or(0);
        match width {
            4 => w.word(value as u32),
            _ => w.xword(value),
        };
    }
    w.word(0).align(if arch.sixty_four_bit { 8 } else { 4 });
    w.bytes
}

/// elf_prpsinfo.
pub fn prpsinfo(
    arch: &Architecture,
    little_endian: bool,
    pid: u32,
    fname: &str,
    args: &str,
) -> Vec<u8> {
    let mut w = ByteWriter::new(arch.sixty_four_bit, little_endian);
    w.byte(b'R').byte(b'R').byte(0).byte(0);
    w.align(arch.word_size());
    w.addr(0);
    match arch.uid_width {
        2 => w.half(1000).half(1000),
        _ => w.word(1000).word(1000),
    };
    w.word(pid).word(1).word(pid).word(pid);
    w.fixed_string(fname, 16);
    w.fixed_string(args, 80);
    w.bytes
}

pub fn auxv(sixty_four_bit: bool, little_endian: bool, entries: &[(u64, u64)]) -> Vec<u8> {
    let mut w = ByteWriter::new(sixty_four_bit, little_endian);
    for (key, value) in entries {
        w.addr(*key).addr(*value);
    }
    w.addr(0).addr(0);
    w.bytes
}

/// Elf32_Dyn or Elf64_Dyn entries, terminated by DT_NULL.
pub fn dynamic(sixty_four_bit: bool, little_endian: bool, entries: &[(u64, u64)]) -> Vec<u8> {
    let mut w = ByteWriter::new(sixty_four_bit, little_endian);
    for (tag, value) in entries {
        w.addr(*tag).addr(*value);
    }
    w.addr(0).addr(0);
    w.bytes
}

/// Elf32_Sym or Elf64_Sym.
pub fn symbol(
    w: &mut ByteWriter,
    name: u32,
    info: u8,
    shndx: u16,
    value: u64,
    size: u64,
) {
    if w.sixty_four_bit {
        w.word(name).byte(info).byte(0).half(shndx).xword(value).xword(size);
    } else {
        w.word(name).word(value as u32).word(size as u32);
        w.byte(info).byte(0).half(shndx);
    }
}

pub const EXE_BASE: u64 = 0x400000;
pub const DATA_BASE: u64 = 0x600000;
pub const LIB_BASE: u64 = 0x7f00_0000_0000;
pub const MISSING_LIB_BASE: u64 = 0x7f10_0000_0000;
pub const UNDUMPED_BASE: u64 = 0x7f20_0000_0000;
pub const VDSO_BASE: u64 = 0x7fff_f7ff_d000;
pub const STACK_BASE: u64 = 0x7ffe_e000_0000;

/// A 64-bit ET_DYN library linked at zero. Its one Load segment is the first page which
/// has the dynamic table at 0x800 and the dynamic string table at 0x900. The section
/// table (.text, .dynamic, .symtab with foo_init at 0x180) is past the first page so
/// it's lost when only that page is dumped.
pub fn library_image(soname: &str) -> Vec<u8> {
    let mut b = ElfBuilder::new(true, true);
    b.file_type = 3;
    let mut load = SegmentSpec::new(1, 0, Vec::new());
    load.flags = 5;
    load.mem_size = 0x1000;
    load.file_size = Some(0x1000);
    let mut dynamic = SegmentSpec::new(2, 0x800, Vec::new());
    dynamic.mem_size = 0x40;
    dynamic.file_size = Some(0x40);
    b.segments.push(load);
    b.segments.push(dynamic);

    let mut symbols = ByteWriter::new(true, true);
    symbol(&mut symbols, 0, 0, 0, 0, 0);
    symbol(&mut symbols, 1, 0x12, 2, 0x180, 0x20); // GLOBAL FUNC

    b.sections.push(SectionSpec::null());
    b.sections.push(SectionSpec {
        name: 1,
        stype: 1,
        data: vec![0; 0x1000],
        ..Default::default()
    });
    b.sections.push(SectionSpec {
        name: 6,
        stype: 1,
        flags: 6,
        addr: 0x100,
        size: Some(0x100),
        ..Default::default()
    });
    b.sections.push(SectionSpec {
        name: 12,
        stype: 6,
        flags: 3,
        addr: 0x800,
        size: Some(0x40),
        ..Default::default()
    });
    b.sections.push(SectionSpec {
        name: 21,
        stype: 2,
        data: symbols.bytes,
        link: 5,
        entry_size: 24,
        ..Default::default()
    });
    b.sections.push(SectionSpec {
        name: 29,
        stype: 3,
        data: b"\0foo_init\0".to_vec(),
        ..Default::default()
    });
    b.sections.push(SectionSpec {
        name: 37,
        stype: 3,
        data: b"\0.pad\0.text\0.dynamic\0.symtab\0.strtab\0.shstrtab\0".to_vec(),
        ..Default::default()
    });
    b.string_table_index = 6;

    let mut bytes = b.build();
    let table = dynamic_table(&[(14, 1), (5, 0x900)]); // DT_SONAME, DT_STRTAB
    bytes[0x800..0x800 + table.len()].copy_from_slice(&table);
    bytes[0x901..0x901 + soname.len()].copy_from_slice(soname.as_bytes());
    bytes
}

fn dynamic_table(entries: &[(u64, u64)]) -> Vec<u8> {
    dynamic(true, true, entries)
}

/// A 64-bit ET_EXEC linked at EXE_BASE with its entry point at 0x401000 and its
/// dynamic table at DATA_BASE. One page long.
pub fn executable_image() -> Vec<u8> {
    let mut b = ElfBuilder::new(true, true);
    b.entry = 0x401000;
    let mut load = SegmentSpec::new(1, EXE_BASE, Vec::new());
    load.flags = 5;
    load.mem_size = 0x2000;
    load.file_size = Some(0x1000);
    let mut dynamic = SegmentSpec::new(2, DATA_BASE, Vec::new());
    dynamic.mem_size = 0x40;
    dynamic.file_size = Some(0x40);
    b.segments.push(load);
    b.segments.push(dynamic);
    let mut bytes = b.build();
    bytes.resize(0x1000, 0);
    bytes
}

/// The data page of the executable: its dynamic table, r_debug, the link map (the
/// executable, libfoo, libbar which wasn't dumped, and the vdso), and the platform
/// string.
fn data_page() -> Vec<u8> {
    let mut w = ByteWriter::new(true, true);
    w.pad_to(0x1000);
    let table = dynamic_table(&[(21, DATA_BASE + 0x100)]); // DT_DEBUG
    w.bytes[..table.len()].copy_from_slice(&table);

    w.bytes[0x100] = 1;
    w.put_addr(0x108, DATA_BASE + 0x200);
    let nodes = [
        (0x200, 0, 0x400),
        (0x240, LIB_BASE, 0x410),
        (0x280, MISSING_LIB_BASE, 0x430),
        (0x2c0, VDSO_BASE, 0x450),
    ];
    for (i, (at, base, name)) in nodes.iter().enumerate() {
        w.put_addr(*at, *base);
        w.put_addr(*at + 8, DATA_BASE + name);
        let next = nodes.get(i + 1).map(|n| DATA_BASE + n.0 as u64).unwrap_or(0);
        w.put_addr(*at + 24, next);
    }
    for (at, s) in [
        (0x410, "/opt/lib/libfoo.so.1"),
        (0x430, "/opt/lib/libbar.so"),
        (0x450, "linux-vdso.so.1"),
        (0x500, "x86_64"),
    ] {
        w.bytes[at..at + s.len()].copy_from_slice(s.as_bytes());
    }
    w.bytes
}

/// An amd64 core for "/opt/bin/app -x" (pid 42) with two threads. The main thread is
/// stopped at 0x401010 with a frame pointer chain running 0x401100 then foo_init+4.
/// The second thread has no registers.
pub fn sample_core() -> Vec<u8> {
    let arch = &crate::arch::x86::AMD64;
    let sp = STACK_BASE + 0x100;
    let bp = STACK_BASE + 0x200;

    let mut notes = note(
        true,
        "CORE",
        1,
        &prstatus(arch, true, 42, &[("rip", 0x401010), ("rsp", sp), ("rbp", bp)]),
    );
    notes.extend(note(true, "CORE", 1, &prstatus(arch, true, 43, &[])));
    notes.extend(note(true, "CORE", 3, &prpsinfo(arch, true, 42, "app", "/opt/bin/app -x")));
    notes.extend(note(
        true,
        "CORE",
        6,
        &auxv(true, true, &[(9, 0x401000), (15, DATA_BASE + 0x500)]), // AT_ENTRY, AT_PLATFORM
    ));

    let mut stack = ByteWriter::new(true, true);
    stack.pad_to(0x1000);
    stack.put_addr(0x200, STACK_BASE + 0x300);
    stack.put_addr(0x208, 0x401100);
    stack.put_addr(0x300, 0);
    stack.put_addr(0x308, LIB_BASE + 0x184);

    let mut b = ElfBuilder::core(arch, true);
    b.segments.push(SegmentSpec::new(4, 0, notes));
    let mut exe = SegmentSpec::new(1, EXE_BASE, executable_image());
    exe.flags = 5;
    exe.mem_size = 0x2000;
    b.segments.push(exe);
    let mut data = SegmentSpec::new(1, DATA_BASE, data_page());
    data.flags = 6;
    b.segments.push(data);
    let mut lib = SegmentSpec::new(1, LIB_BASE, library_image("libfoo.so.1")[..0x1000].to_vec());
    lib.flags = 5;
    b.segments.push(lib);
    let mut undumped = SegmentSpec::new(1, UNDUMPED_BASE, Vec::new());
    undumped.mem_size = 0x1000;
    b.segments.push(undumped);
    let mut stack_segment = SegmentSpec::new(1, STACK_BASE, stack.bytes);
    stack_segment.flags = 6;
    b.segments.push(stack_segment);
    b.build()
}
