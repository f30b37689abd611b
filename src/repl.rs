//! Definitions for the commands that are used interactively, e.g.
//! `bt` and `info registers`.
use clap::{Args, Parser, Subcommand};
use corescope::commands::HexdumpLabels;

#[derive(Parser)]
#[command(about = "Inspect the process reconstructed from a core file")]
#[command(infer_subcommands(true))] // allow abreviations
pub struct Repl {
    #[command(subcommand)]
    pub command: MainCommand,
}

#[derive(Subcommand)]
pub enum MainCommand {
    /// Show the call stack for a thread
    Bt(BacktraceArgs),

    /// Search memory for a bit pattern
    Find(FindArgs),

    /// Show information about the cored process
    Info(InfoCommand),

    /// Print memory range as hex and ascii
    Hexdump(HexdumpArgs),

    /// Exit corescope
    Quit,
}

#[derive(Args)]
pub struct InfoCommand {
    #[clap(subcommand)]
    pub action: InfoAction,
}

#[derive(Subcommand)]
pub enum InfoAction {
    /// Show problems found while reconstructing the process
    Diagnostics(TableArgs),

    /// Show the executable and shared libraries
    Modules(TableArgs),

    /// Show information about the process associated with the core file
    Process(ExplainArgs),

    /// Show a thread's registers
    Registers(RegistersArgs),

    /// Show sections (or segments) for modules
    Sections(FilterArgs),

    /// Show the memory ranges in the core
    Segments(TableArgs),

    /// Show function symbols
    Symbols(FilterArgs),

    /// Show the threads
    Threads(TableArgs),
}

#[derive(Args)]
pub struct BacktraceArgs {
    /// Show every thread
    #[arg(short, long)]
    pub all: bool,

    /// Index of the thread to show (see info threads)
    #[arg(short, long, default_value_t = 0)]
    pub thread: usize,
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,
}

#[derive(Args)]
pub struct FindArgs {
    /// Search for an UTF-8 string e.g. "the brown fox"
    #[arg(long, group = "filter")]
    pub string: Option<String>,

    /// Optionally hexdump count bytes for each address found
    #[arg(short, long, default_value_t = 0)]
    pub count: usize,

    /// Search for a hex string with spaces ignored, e.g. "ab ac acab"
    #[arg(long, group = "filter")]
    pub hex: Option<String>,

    /// Max number of results to report, 0 for unlimited
    #[arg(short, long, default_value_t = 10, requires = "filter")]
    pub max_results: usize,
}

#[derive(Args)]
pub struct TableArgs {
    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,

    /// Add column headers
    #[arg(short, long)]
    pub titles: bool,
}

#[derive(Args)]
pub struct FilterArgs {
    /// Only show modules whose name contains this
    pub module: Option<String>,

    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,

    /// Add column headers
    #[arg(short, long)]
    pub titles: bool,
}

#[derive(Args)]
pub struct RegistersArgs {
    /// Index of the thread to show (see info threads)
    #[arg(long, default_value_t = 0)]
    pub thread: usize,

    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,

    /// Add column headers
    #[arg(short, long)]
    pub titles: bool,
}

#[derive(Args)]
pub struct HexdumpArgs {
    /// Number of bytes to dump
    #[arg(short, long)]
    #[arg(default_value_t = 16)]
    pub count: usize,

    /// How to display the start of each row
    #[arg(short, long, name = "TYPE")]
    #[arg(default_value_t = HexdumpLabels::None)]
    pub labels: HexdumpLabels,

    /// A virtual address
    #[arg(value_parser = parse_u64_expr)]
    pub addr: u64,
}

fn parse_u64_expr(s: &str) -> Result<u64, String> {
    if let Some(t) = s.strip_prefix("0x") {
        u64::from_str_radix(t, 16).map_err(|_| format!("`{s}` isn't a hex or decimal number"))
    } else {
        s.parse()
            .map_err(|_| format!("`{s}` isn't a hex or decimal number"))
    }
}
