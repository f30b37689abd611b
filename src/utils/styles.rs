//! Used to color and otherwise style various bits of output using a
//! ~/.corescope/styles.tcss file.
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use termio::prelude::*;
use termio::{StyledString, Termio};

/// Create the style file if it is missing.
pub fn generate_style_file() {
    if let Some(dir) = style_dir() {
        if make_dir(&dir) {
            default_styles(dir.join("styles.tcss"));
        }
    } else {
        eprintln!("couldn't find home directory"); // don't use warn() here
    }
}

pub trait Styling {
    fn explain_title(self) -> StyledString;
    fn explain_text(self) -> StyledString;
    fn hex_offset(self) -> StyledString;
    fn hex_hex(self) -> StyledString;
    fn hex_ascii(self) -> StyledString;
    fn table_header(self) -> StyledString;
    fn table_sep(self) -> StyledString;
    fn table_field(self) -> StyledString;
    fn frame_symbol(self) -> StyledString;
    fn warn(self) -> StyledString;
}

impl Styling for &str {
    fn explain_title(self) -> StyledString {
        self.style("explain title", &TCSS)
    }

    fn explain_text(self) -> StyledString {
        self.style("explain text", &TCSS)
    }

    fn hex_offset(self) -> StyledString {
        self.style("hex offset", &TCSS)
    }

    fn hex_hex(self) -> StyledString {
        self.style("hex hex", &TCSS)
    }

    fn hex_ascii(self) -> StyledString {
        self.style("hex ascii", &TCSS)
    }

    fn table_header(self) -> StyledString {
        self.style("table header", &TCSS)
    }

    fn table_sep(self) -> StyledString {
        self.style("table separator", &TCSS)
    }

    fn table_field(self) -> StyledString {
        self.style("table field", &TCSS)
    }

    fn frame_symbol(self) -> StyledString {
        self.style("frame symbol", &TCSS)
    }

    fn warn(self) -> StyledString {
        self.style("warn", &TCSS)
    }
}

impl Styling for String {
    fn explain_title(self) -> StyledString {
        self.as_str().explain_title()
    }

    fn explain_text(self) -> StyledString {
        self.as_str().explain_text()
    }

    fn hex_offset(self) -> StyledString {
        self.as_str().hex_offset()
    }

    fn hex_hex(self) -> StyledString {
        self.as_str().hex_hex()
    }

    fn hex_ascii(self) -> StyledString {
        self.as_str().hex_ascii()
    }

    fn table_header(self) -> StyledString {
        self.as_str().table_header()
    }

    fn table_sep(self) -> StyledString {
        self.as_str().table_sep()
    }

    fn table_field(self) -> StyledString {
        self.as_str().table_field()
    }

    fn frame_symbol(self) -> StyledString {
        self.as_str().frame_symbol()
    }

    fn warn(self) -> StyledString {
        self.as_str().warn()
    }
}

static TCSS: LazyLock<Termio> = LazyLock::new(|| {
    let Some(dir) = style_dir() else {
        return Termio::new(); // we'll have warned about this already
    };
    let path = dir.join("styles.tcss");
    if !path.is_file() {
        // Library users that never ran the front end get plain text.
        return Termio::new();
    }
    let os_path = path.to_string_lossy().into_owned();
    match Termio::from_file(&os_path) {
        Ok(tcss) => tcss,
        Err(err) => {
            eprintln!("couldn't parse file at {os_path}: {err}"); // don't use warn() here
            Termio::new()
        }
    }
});

fn style_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".corescope"))
}

fn make_dir(path: &Path) -> bool {
    match fs::create_dir(path) {
        Ok(_) => true,
        Err(err) => match err.kind() {
            io::ErrorKind::AlreadyExists => true,
            _ => {
                eprintln!("couldn't create path for {}: {err}", path.display()); // don't use warn() here
                false
            }
        },
    }
}

fn default_styles(path: PathBuf) {
    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            let defaults = include_str!("default.tcss");
            if let Err(err) = file.write_all(defaults.as_bytes()) {
                eprintln!("error writing defaults to {}: {err}", path.display());
            }
        }
        Err(err) => match err.kind() {
            io::ErrorKind::AlreadyExists => (), // user already has a styles file
            _ => eprintln!("error creating {}: {err}", path.display()), // don't use warn() here
        },
    }
}
