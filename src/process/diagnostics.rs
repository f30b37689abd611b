use crate::error::{CoreError, ErrorKind};
use crate::utils;
use std::fmt;

/// Something that went wrong while reconstructing part of the process. Reconstruction
/// keeps going so these describe what's missing or degraded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,

    /// The module, thread, note, etc. that was affected.
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}: {}: {}", self.kind, self.subject, self.message)
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    quiet: bool,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(quiet: bool) -> Self {
        Diagnostics {
            quiet,
            items: Vec::new(),
        }
    }

    /// Records an expected sort of problem, e.g. a library that couldn't be found.
    pub fn record(&mut self, subject: &str, err: &CoreError) {
        self.items.push(Diagnostic {
            kind: err.kind(),
            subject: subject.to_string(),
            message: err.to_string(),
        });
    }

    /// Records damage to the core and also tells the user about it.
    pub fn warn(&mut self, subject: &str, err: &CoreError) {
        if !self.quiet {
            utils::warn(&format!("{subject}: {err}"));
        }
        self.record(subject, err);
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.kind == kind)
    }
}
