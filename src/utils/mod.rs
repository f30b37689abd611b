pub mod styles;
#[cfg(test)]
pub(crate) mod synthetic;

pub use styles::*;

use crate::error::{CoreError, CoreResult};

/// writeln! for terminal output where a failed write isn't worth reporting.
macro_rules! uwriteln {
    ($out:expr) => {{
        let _ = writeln!($out);
    }};
    ($out:expr, $($arg:tt)*) => {{
        let _ = writeln!($out, $($arg)*);
    }};
}
pub(crate) use uwriteln;

macro_rules! uwrite {
    ($out:expr, $($arg:tt)*) => {{
        let _ = write!($out, $($arg)*);
    }};
}
pub(crate) use uwrite;

pub fn require(predicate: bool, err: impl FnOnce() -> CoreError) -> CoreResult<()> {
    if predicate { Ok(()) } else { Err(err()) }
}

/// Reports damage that the user probably wants to know about. Conditions that are
/// normal for core files (segments that aren't ELF images, libraries that can't be
/// found, etc.) go into the diagnostics list instead.
pub fn warn(mesg: &str) {
    eprintln!("{}", mesg.warn());
}

pub fn explain(title: &str, text: &str) {
    println!("{}: {}", title.explain_title(), text.explain_text());
}

pub fn align_to_word(n: u32) -> u32 {
    (n + 3) & !3
}

/// Remove escape sequences from the string (e.g. for colors).
pub fn strip_escapes(s: &str) -> String {
    // tabled adds escape sequences to the end of lines to reset all modes even with
    // Style::empty() so it's simpler to strip everything.
    let mut result = String::with_capacity(s.len());
    let mut escaping = false;

    for c in s.chars() {
        if c == '\x1b' {
            escaping = true;
        } else if escaping {
            if c == 'm' {
                escaping = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}
