mod repl;
use clap::Parser;
use clap_repl::ClapEditor;
use clap_repl::reedline::{
    DefaultPrompt, FileBackedHistory, Highlighter, Prompt, PromptEditMode, PromptHistorySearch,
    StyledText,
};
use corescope::commands::{self, hex_to_bytes};
use corescope::modules::DiskResolver;
use corescope::utils::{self, warn};
use corescope::{CoreDump, Options};
use nu_ansi_term::{Color, Style};
use repl::{InfoAction, MainCommand, Repl};
use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// path to core file
    core: PathBuf,

    /// Directory holding copies of the cored machine's libraries, e.g. a sysroot
    #[arg(long = "lib-dir", value_name = "DIR")]
    lib_dirs: Vec<PathBuf>,

    /// Path to the executable that cored
    #[arg(long)]
    exe: Option<String>,

    /// Use only what's in the core, never copies of the executable or libraries
    #[arg(long)]
    loaded_only: bool,

    /// Don't print warnings while loading the core (see info diagnostics)
    #[arg(short, long)]
    quiet: bool,
}

/// Colors what the user types.
pub struct CommandHighlighter {
    color: Color,
}

impl Highlighter for CommandHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled_text = StyledText::new();
        styled_text.push((Style::new().fg(self.color), line.to_string()));
        styled_text
    }
}

impl CommandHighlighter {
    pub fn new() -> CommandHighlighter {
        CommandHighlighter { color: Color::Blue }
    }
}

impl Default for CommandHighlighter {
    fn default() -> Self {
        CommandHighlighter::new()
    }
}

pub struct CorePrompt {
    color: clap_repl::reedline::Color,
    default: DefaultPrompt,
}

impl Prompt for CorePrompt {
    fn render_prompt_left(&self) -> Cow<str> {
        Cow::Borrowed("corescope")
    }

    fn render_prompt_right(&self) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<str> {
        self.default.render_prompt_multiline_indicator()
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<str> {
        self.default
            .render_prompt_history_search_indicator(history_search)
    }

    // the text that appears in the prompt
    fn get_prompt_color(&self) -> clap_repl::reedline::Color {
        self.color
    }

    // the symbol that typically appears in the prompt, e.g. '>'
    fn get_indicator_color(&self) -> clap_repl::reedline::Color {
        clap_repl::reedline::Color::Black
    }
}

impl CorePrompt {
    fn new() -> CorePrompt {
        CorePrompt {
            color: clap_repl::reedline::Color::DarkBlue,
            default: DefaultPrompt::default(),
        }
    }
}

fn options(cli: &Cli) -> Options {
    let mut options = Options::from_env();
    if cli.loaded_only {
        options.use_loaded_libraries = true;
    }
    if cli.exe.is_some() {
        options.executable_path = cli.exe.clone();
    }
    options.quiet = cli.quiet;
    options
}

fn load_core(cli: &Cli) -> CoreDump {
    let resolver = DiskResolver::new(cli.lib_dirs.clone());
    match CoreDump::open(&cli.core, options(cli), &resolver) {
        Ok(dump) => dump,
        Err(e) => {
            warn(&format!("Couldn't load {}: {e}", cli.core.display()));
            process::exit(1);
        }
    }
}

fn pattern(args: &repl::FindArgs) -> Option<Vec<u8>> {
    if let Some(s) = &args.hex {
        match hex_to_bytes(s) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn(&err);
                None
            }
        }
    } else {
        args.string.as_ref().map(|s| s.as_bytes().to_vec())
    }
}

fn main() {
    utils::generate_style_file();

    let cli = Cli::parse();
    let dump = load_core(&cli);
    if !dump.diagnostics.is_empty() && !cli.quiet {
        println!("{} problems, see info diagnostics", dump.diagnostics.len());
    }

    // left prompt                    before what the user types
    // highlighter                    this is for what the user types
    // with_visual_selection_style    this is for the selection
    let prompt = CorePrompt::new();
    let rl = ClapEditor::<Repl>::builder()
        .with_prompt(Box::new(prompt))
        .with_editor_hook(|reed| {
            let reed = reed.with_highlighter(Box::new(CommandHighlighter::new()));
            match FileBackedHistory::with_file(10000, "/tmp/corescope-history".into()) {
                Ok(history) => reed.with_history(Box::new(history)),
                Err(_) => reed,
            }
        })
        .build();

    rl.repl(|repl: Repl| {
        let out = io::stdout();
        match repl.command {
            MainCommand::Bt(args) => commands::backtrace(out, &dump, args.thread, args.all),
            MainCommand::Find(args) => {
                if let Some(bytes) = pattern(&args) {
                    commands::find(out, &dump, &bytes, args.max_results, args.count);
                }
            }
            MainCommand::Info(info) => match info.action {
                InfoAction::Diagnostics(args) => {
                    commands::info_diagnostics(out, &dump, args.titles, args.explain)
                }
                InfoAction::Modules(args) => {
                    commands::info_modules(out, &dump, args.titles, args.explain)
                }
                InfoAction::Process(args) => commands::info_process(out, &dump, args.explain),
                InfoAction::Registers(args) => {
                    commands::info_registers(out, &dump, args.thread, args.titles, args.explain)
                }
                InfoAction::Sections(args) => commands::info_sections(
                    out,
                    &dump,
                    args.module.as_deref(),
                    args.titles,
                    args.explain,
                ),
                InfoAction::Segments(args) => {
                    commands::info_segments(out, &dump, args.titles, args.explain)
                }
                InfoAction::Symbols(args) => commands::info_symbols(
                    out,
                    &dump,
                    args.module.as_deref(),
                    args.titles,
                    args.explain,
                ),
                InfoAction::Threads(args) => {
                    commands::info_threads(out, &dump, args.titles, args.explain)
                }
            },
            MainCommand::Hexdump(args) => {
                commands::hexdump(out, &dump, args.addr, args.count, args.labels)
            }
            MainCommand::Quit => process::exit(0),
        }
    });
}
