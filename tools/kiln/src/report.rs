//! Console reporting.
//!
//! Everything kiln tells the user goes through here so `-q` and `-v` apply
//! the same way everywhere:
//!
//! | level   | status lines | details | warnings, notes | errors |
//! |---------|--------------|---------|-----------------|--------|
//! | quiet   |              |         |                 | yes    |
//! | normal  | yes          |         | warnings        | yes    |
//! | verbose | yes          | yes     | both            | yes    |
//!
//! Details are staleness reasons, fingerprints and phase timings. Warnings
//! and errors are counted whether or not they are shown, for the summary.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Instant;

use kiln_config::Diagnostic;

use crate::state::{CompilerMessage, Severity};

/// How much to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Errors and the final summary.
    Quiet = 0,
    /// Adds one line per task and warnings.
    Normal = 1,
    /// Adds details and notes.
    Verbose = 2,
}

impl Verbosity {
    /// Level selected by the `-q` / `-v` flags.
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(Verbosity::Normal as u8);
static WARNINGS: AtomicUsize = AtomicUsize::new(0);
static ERRORS: AtomicUsize = AtomicUsize::new(0);

/// Set the process-wide level.
pub fn set_verbosity(level: Verbosity) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Current level.
pub fn verbosity() -> Verbosity {
    match LEVEL.load(Ordering::Relaxed) {
        0 => Verbosity::Quiet,
        2 => Verbosity::Verbose,
        _ => Verbosity::Normal,
    }
}

/// Whether output meant for `level` is printed.
pub fn shows(level: Verbosity) -> bool {
    verbosity() >= level
}

/// Progress line, hidden by `-q`. Usage mirrors `println!`.
macro_rules! status {
    ($($arg:tt)*) => {
        if $crate::report::shows($crate::report::Verbosity::Normal) {
            println!($($arg)*);
        }
    };
}

/// Detail line, shown only with `-v`. Usage mirrors `println!`.
macro_rules! detail {
    ($($arg:tt)*) => {
        if $crate::report::shows($crate::report::Verbosity::Verbose) {
            println!($($arg)*);
        }
    };
}

pub(crate) use {detail, status};

/// Warnings and errors reported so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Warnings, including compiler warnings.
    pub warnings: usize,
    /// Errors, including compiler errors and failed tasks.
    pub errors: usize,
}

/// Totals since the process started.
pub fn counts() -> Counts {
    Counts {
        warnings: WARNINGS.load(Ordering::Relaxed),
        errors: ERRORS.load(Ordering::Relaxed),
    }
}

/// Report a warning.
pub fn warning(message: impl Display) {
    WARNINGS.fetch_add(1, Ordering::Relaxed);
    if shows(Verbosity::Normal) {
        eprintln!("warning: {message}");
    }
}

/// Report an error. Errors are never hidden.
pub fn error(message: impl Display) {
    ERRORS.fetch_add(1, Ordering::Relaxed);
    eprintln!("error: {message}");
}

/// Report resolution problems found in a config file. Diagnostics without
/// a source location are prefixed with `file`.
pub fn config_diagnostics(file: &Path, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        if diagnostic.location.is_some() {
            warning(diagnostic);
        } else {
            warning(format_args!("{}: {diagnostic}", file.display()));
        }
    }
}

/// Report one parsed compiler diagnostic at the level its severity calls
/// for.
pub fn compiler_message(message: &CompilerMessage) {
    let level = match message.severity {
        Severity::Error => {
            ERRORS.fetch_add(1, Ordering::Relaxed);
            Verbosity::Quiet
        }
        Severity::Warning => {
            WARNINGS.fetch_add(1, Ordering::Relaxed);
            Verbosity::Normal
        }
        Severity::Note => Verbosity::Verbose,
    };
    if shows(level) {
        eprintln!("{message}");
    }
}

/// Pass through tool output nothing could be parsed from.
pub fn tool_output(text: &str) {
    let text = text.trim_end();
    if !text.is_empty() {
        eprintln!("{text}");
    }
}

/// Times a build phase; the elapsed time is a detail line on drop.
///
/// ```ignore
/// let _phase = Phase::start(format!("staleness check ({name})"));
/// ```
pub struct Phase {
    label: String,
    start: Instant,
}

impl Phase {
    /// Begin timing `label`.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for Phase {
    fn drop(&mut self) {
        detail!("  {}: {:.1?}", self.label, self.start.elapsed());
    }
}
