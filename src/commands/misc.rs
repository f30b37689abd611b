use crate::process::{CoreDump, StopReason};
use crate::utils::{Styling, uwrite, uwriteln};
use clap::ValueEnum;
use std::fmt;
use std::io::Write;

/// Function (or module) containing addr, e.g. "foo_init+0x4 (libfoo.so.1)".
pub fn location(dump: &CoreDump, addr: u64) -> String {
    if let Some((module, symbol, offset)) = dump.symbol_for_address(addr) {
        if offset == 0 {
            format!("{} ({})", symbol.name, module.short_name())
        } else {
            format!("{}+0x{offset:x} ({})", symbol.name, module.short_name())
        }
    } else if let Some(module) = dump.module_for_address(addr) {
        module.short_name().to_string()
    } else {
        "??".to_string()
    }
}

/// Call stack for one thread or, if all is set, for every thread.
pub fn backtrace(mut out: impl Write, dump: &CoreDump, thread: usize, all: bool) {
    if all {
        for (i, t) in dump.threads.iter().enumerate() {
            if i > 0 {
                uwriteln!(out);
            }
            uwriteln!(out, "thread {}", t.tid);
            thread_backtrace(&mut out, dump, i);
        }
    } else if thread < dump.threads.len() {
        thread_backtrace(&mut out, dump, thread);
    } else {
        uwriteln!(out, "no thread {thread}");
    }
}

fn thread_backtrace(out: &mut impl Write, dump: &CoreDump, index: usize) {
    let Some(trace) = dump.stack_trace(index) else {
        return;
    };
    if trace.frames.is_empty() {
        uwriteln!(out, "no frames");
    }
    for (i, frame) in trace.frames.iter().enumerate() {
        let ip = frame.instruction_pointer;
        let label = format!("#{i:<3}");
        uwriteln!(out, "{label}0x{ip:016x} in {}", location(dump, ip).frame_symbol());
    }
    if trace.stopped != StopReason::EndOfChain {
        uwriteln!(out, "stopped: {}", trace.stopped.to_string().warn());
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum HexdumpLabels {
    /// Show nothing at the start of lines
    None,

    /// Show the address for the first byte on each line
    Addr,

    /// Show the offset from zero for the first byte on each line
    Zero,
}

impl fmt::Display for HexdumpLabels {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HexdumpLabels::None => fmt.write_str("none"),
            HexdumpLabels::Addr => fmt.write_str("addr"),
            HexdumpLabels::Zero => fmt.write_str("zero"),
        }
    }
}

/// Prints up to count bytes starting at addr as hex and ascii. Stops at the first
/// byte the core doesn't have.
pub fn hexdump(
    mut out: impl Write,
    dump: &CoreDump,
    addr: u64,
    count: usize,
    labels: HexdumpLabels,
) {
    let bytes = dump.space.read_available(addr, count);
    if bytes.is_empty() && count > 0 {
        if let Err(err) = dump.read_bytes(addr, count) {
            uwriteln!(out, "{}", err.to_string().warn());
        }
        return;
    }
    write_hex(&mut out, addr, &bytes, labels);
    if bytes.len() < count {
        uwriteln!(
            out,
            "{}",
            format!("only {} of {count} bytes are available", bytes.len()).warn()
        );
    }
}

fn write_hex(out: &mut impl Write, addr: u64, bytes: &[u8], labels: HexdumpLabels) {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let offset = row * 16;
        match labels {
            HexdumpLabels::None => (),
            HexdumpLabels::Addr => {
                let label = format!("{:012x}: ", addr.wrapping_add(offset as u64));
                uwrite!(out, "{}", label.hex_offset());
            }
            HexdumpLabels::Zero => {
                let label = format!("{offset:04x}: ");
                uwrite!(out, "{}", label.hex_offset());
            }
        }

        for (i, byte) in chunk.iter().enumerate() {
            if i == 8 {
                uwrite!(out, " ");
            }
            uwrite!(out, "{}", format!("{byte:02x} ").hex_hex());
        }
        uwrite!(out, "   ");
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                let ch = b as char;
                if ch.is_ascii_graphic() { ch } else { '.' }
            })
            .collect();
        uwriteln!(out, "{}", ascii.hex_ascii());
    }
}

/// Searches the dumped memory for pattern. Reports at most max_results addresses (0 for
/// unlimited) and, if count is set, hexdumps count bytes at each one.
pub fn find(
    mut out: impl Write,
    dump: &CoreDump,
    pattern: &[u8],
    max_results: usize,
    count: usize,
) {
    if pattern.is_empty() {
        uwriteln!(out, "{}", "empty pattern".warn());
        return;
    }

    let mut found = 0;
    let mut start = 0;
    while let Some(addr) = dump.find_pattern(pattern, start) {
        if max_results > 0 && found == max_results {
            uwriteln!(out, "...");
            return;
        }
        uwriteln!(out, "0x{addr:x}");
        if count > 0 {
            let bytes = dump.space.read_available(addr, count);
            write_hex(&mut out, addr, &bytes, HexdumpLabels::None);
            uwriteln!(out);
        }
        found += 1;

        match addr.checked_add(pattern.len() as u64) {
            Some(next) => start = next,
            None => break,
        }
    }

    if found == 0 {
        uwriteln!(out, "not found");
    }
}

/// Parses hex bytes with optional spaces between bytes, e.g. "ab ac acab".
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = s.chars().filter(|c| *c != ' ').collect();
    if digits.len() % 2 != 0 {
        return Err(format!("`{s}` has an odd number of hex digits"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text: String = pair.iter().collect();
            u8::from_str_radix(&text, 16).map_err(|_| format!("`{text}` isn't a hex byte"))
        })
        .collect()
}
