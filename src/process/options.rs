use std::ffi::OsString;
use std::path::PathBuf;

/// Directories retried for library names that aren't absolute paths.
const KNOWN_LIB_PATHS_32: [&str; 3] = ["/lib", "/usr/lib", "/usr/local/lib"];
const KNOWN_LIB_PATHS_64: [&str; 3] = ["/lib64", "/usr/lib64", "/usr/local/lib64"];

/// Knobs for one analysis. Passed explicitly so that independent analyses in one
/// process don't interfere.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Use only what's inside the core, never external copies of the executable and
    /// libraries.
    pub use_loaded_libraries: bool,

    /// None means use the defaults for the core's word size.
    pub known_lib_paths: Option<Vec<PathBuf>>,

    /// Where the executable lives. Tried before the name recorded in the core.
    pub executable_path: Option<String>,

    /// Don't print warnings (they still land in the diagnostics list).
    pub quiet: bool,
}

impl Options {
    /// Reads CORESCOPE_USE_LOADED_LIBRARIES, CORESCOPE_KNOWN_LIB_PATHS (a PATH style
    /// list), and CORESCOPE_EXECUTABLE.
    pub fn from_env() -> Self {
        Options::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let known_lib_paths = lookup("CORESCOPE_KNOWN_LIB_PATHS")
            .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
            .filter(|paths| !paths.is_empty());
        Options {
            use_loaded_libraries: lookup("CORESCOPE_USE_LOADED_LIBRARIES").is_some(),
            known_lib_paths,
            executable_path: lookup("CORESCOPE_EXECUTABLE")
                .map(|s| s.to_string_lossy().into_owned()),
            quiet: false,
        }
    }

    pub fn lib_paths(&self, sixty_four_bit: bool) -> Vec<PathBuf> {
        match &self.known_lib_paths {
            Some(paths) => paths.clone(),
            None if sixty_four_bit => KNOWN_LIB_PATHS_64.iter().map(PathBuf::from).collect(),
            None => KNOWN_LIB_PATHS_32.iter().map(PathBuf::from).collect(),
        }
    }
}
