use super::location;
use super::tables::{SimpleTableBuilder, TableBuilder, add_field, add_simple};
use crate::elf::ProgramHeader;
use crate::memory::Backing;
use crate::modules::ModuleSource;
use crate::process::CoreDump;
use crate::utils::{self, Styling, uwriteln};
use std::io::Write;

pub fn info_process(mut out: impl Write, dump: &CoreDump, explain: bool) {
    let mut b = SimpleTableBuilder::new();
    add_simple!(b, "pid", dump.pid, "the process id of the process that cored");
    if let Some(process) = &dump.process {
        add_simple!(b, "parent pid", process.ppid, "the process id of the parent process");
        add_simple!(
            b,
            "file name",
            process.file_name,
            "the executable's file name, truncated by the kernel to 15 characters"
        );
        add_simple!(
            b,
            "command line",
            process.arguments,
            "the start of the command line, truncated by the kernel to 80 characters"
        );
    }
    add_simple!(b, "executable", dump.executable.name, "where the executable was found");
    if let Some(thread) = dump.threads.first() {
        add_simple!(b, "signal", thread.status.signal(), "the signal that terminated the process");
    }
    add_simple!(b, "threads", dump.threads.len(), "number of PRSTATUS notes");
    add_simple!(
        b,
        "libraries",
        dump.libraries.len(),
        "shared libraries found in the core or in the link map"
    );
    for (key, value) in dump.properties() {
        b.add_str_row(&key, value.table_field().to_string(), "");
    }
    b.writeln(&mut out, explain);
}

pub fn info_threads(mut out: impl Write, dump: &CoreDump, titles: bool, explain: bool) {
    let mut builder = TableBuilder::new();
    builder.add_col_r("index", "used with bt and info registers");
    builder.add_col_r("tid", "the thread id (the pid for the main thread)");
    builder.add_col_r("ip", "the instruction pointer");
    builder.add_col_r("sp", "the stack pointer");
    builder.add_col_r("frames", "number of stack frames that could be walked");
    builder.add_col_l("location", "function or module containing the instruction pointer");

    for (i, thread) in dump.threads.iter().enumerate() {
        let ip = dump.arch.instruction_pointer(&thread.registers);
        let frames = dump.stack_trace(i).map(|t| t.frames.len()).unwrap_or(0);
        add_field!(builder, "index", i);
        add_field!(builder, "tid", thread.tid);
        add_field!(builder, "ip", "{:x}", ip);
        add_field!(builder, "sp", "{:x}", dump.arch.stack_pointer(&thread.registers));
        add_field!(builder, "frames", frames);
        add_field!(builder, "location", location(dump, ip));
    }

    if builder.is_empty() {
        uwriteln!(out, "no threads");
    } else {
        builder.writeln(&mut out, titles, explain);
    }
}

pub fn info_modules(mut out: impl Write, dump: &CoreDump, titles: bool, explain: bool) {
    let mut builder = TableBuilder::new();
    builder.add_col_l("base", "address of the module's first Load segment");
    builder.add_col_r("ranges", "number of sections (or segments) in the module");
    builder.add_col_r("symbols", "number of function symbols");
    builder.add_col_l("source", "where the sections and symbols came from");
    builder.add_col_l("name", "path from the link map, else the SONAME");

    for module in dump.modules() {
        let source = match &module.source {
            ModuleSource::InCore => "core".to_string(),
            ModuleSource::External(path) => path.clone(),
            ModuleSource::Missing => "missing".to_string(),
        };
        add_field!(builder, "base", "{:x}", module.base);
        add_field!(builder, "ranges", module.ranges.len());
        add_field!(builder, "symbols", module.symbols.len());
        add_field!(builder, "source", source);
        add_field!(builder, "name", module.name);
    }
    builder.writeln(&mut out, titles, explain);
}

pub fn info_registers(
    mut out: impl Write,
    dump: &CoreDump,
    index: usize,
    titles: bool,
    explain: bool,
) {
    let Some(thread) = dump.threads.get(index) else {
        uwriteln!(out, "no thread {index}");
        return;
    };

    let mut builder = TableBuilder::new();
    builder.add_col_l("name", "the register name");
    builder.add_col_r("hex", "the register value in hex");
    builder.add_col_r("decimal", "the register value in decimal");
    for (name, value) in dump.arch.ordered(&thread.registers) {
        add_field!(builder, "name", name);
        add_field!(builder, "hex", "{:x}", value);
        add_field!(builder, "decimal", value);
    }
    builder.writeln(&mut out, titles, explain);

    if explain {
        let arch = dump.arch;
        utils::explain(arch.instruction_pointer, "the address of the instruction being executed");
        utils::explain(arch.stack_pointer, "the bottom of the stack");
        if arch.base_pointer != arch.stack_pointer {
            utils::explain(arch.base_pointer, "the frame pointer (if the compiler kept one)");
        }
        if let Some(lr) = arch.link_register {
            utils::explain(lr, "the return address for leaf functions");
        }
    }
}

/// Function symbols, optionally only for modules whose name contains filter.
pub fn info_symbols(
    mut out: impl Write,
    dump: &CoreDump,
    filter: Option<&str>,
    titles: bool,
    explain: bool,
) {
    let mut builder = TableBuilder::new();
    builder.add_col_l("address", "the relocated address of the function");
    builder.add_col_r("size", "size of the function in bytes (0 if unknown)");
    builder.add_col_l("name", "the function name");
    builder.add_col_l("module", "the module the function is in");

    let modules = dump
        .modules()
        .filter(|m| filter.is_none_or(|f| m.name.contains(f)));
    for module in modules {
        for symbol in module.symbols.iter() {
            add_field!(builder, "address", "{:x}", symbol.address);
            add_field!(builder, "size", symbol.size);
            add_field!(builder, "name", symbol.name);
            add_field!(builder, "module", module.short_name());
        }
    }

    if builder.is_empty() {
        uwriteln!(out, "no symbols");
    } else {
        builder.writeln(&mut out, titles, explain);
    }
}

/// The process's memory ranges.
pub fn info_segments(mut out: impl Write, dump: &CoreDump, titles: bool, explain: bool) {
    let mut builder = TableBuilder::new();
    builder.add_col_l("start", "the address of the first byte in the range");
    builder.add_col_r("end", "the address just after the last byte in the range");
    builder.add_col_r("size", "the size of the range in bytes (decimal)");
    builder.add_col_l("flags", "r, w, and x permissions");
    builder.add_col_l("contents", "module, section, or stack, and why the bytes are missing");

    for source in dump.space.sources() {
        let name = source.name.clone().unwrap_or_default();
        let contents = match &source.backing {
            Backing::File { .. } => name,
            Backing::Unbacked { reason } if name.is_empty() => reason.clone(),
            Backing::Unbacked { reason } => format!("{name} ({reason})"),
        };
        add_field!(builder, "start", "{:x}", source.base);
        add_field!(builder, "end", "{:x}", source.base.wrapping_add(source.size));
        add_field!(builder, "size", source.size);
        add_field!(builder, "flags", ProgramHeader::flags_str(source.flags));
        add_field!(builder, "contents", contents);
    }
    builder.writeln(&mut out, titles, explain);
}

/// Section (or segment) ranges of the modules whose name contains filter.
pub fn info_sections(
    mut out: impl Write,
    dump: &CoreDump,
    filter: Option<&str>,
    titles: bool,
    explain: bool,
) {
    let mut builder = TableBuilder::new();
    builder.add_col_l("start", "the relocated address of the section");
    builder.add_col_r("size", "the size of the section in bytes (decimal)");
    builder.add_col_l("core", "whether the core has the section's bytes");
    builder.add_col_l("name", "section name, empty for segments");
    builder.add_col_l("module", "the module the section is in");

    let modules = dump
        .modules()
        .filter(|m| filter.is_none_or(|f| m.name.contains(f)));
    for module in modules {
        for range in module.ranges.iter() {
            add_field!(builder, "start", "{:x}", range.base);
            add_field!(builder, "size", range.size);
            add_field!(builder, "core", if range.backed { "yes" } else { "no" });
            add_field!(builder, "name", range.name);
            add_field!(builder, "module", module.short_name());
        }
    }

    if builder.is_empty() {
        uwriteln!(out, "no sections");
    } else {
        builder.writeln(&mut out, titles, explain);
    }
}

/// Everything that went wrong while reconstructing the process.
pub fn info_diagnostics(mut out: impl Write, dump: &CoreDump, titles: bool, explain: bool) {
    let mut builder = TableBuilder::new();
    builder.add_col_l("kind", "format, memory fault, corrupt data, or missing resource");
    builder.add_col_l("subject", "the module, note, etc. that was affected");
    builder.add_col_l("message", "what went wrong");

    for item in dump.diagnostics.items() {
        add_field!(builder, "kind", item.kind);
        add_field!(builder, "subject", item.subject);
        add_field!(builder, "message", item.message);
    }

    if builder.is_empty() {
        uwriteln!(out, "no diagnostics");
    } else {
        builder.writeln(&mut out, titles, explain);
    }
}
