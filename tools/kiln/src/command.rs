//! Typed builder for compiler, archiver and linker invocations.
//!
//! Wraps `std::process::Command` with methods for the flags GNU-style
//! drivers share, so toolchains assemble commands the same way.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, bail};

/// A tool invocation that can be inspected before it runs.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    label: String,
}

impl ToolCommand {
    /// Create a builder for `program`; `label` names the command in errors.
    pub fn new(program: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            label: label.into(),
        }
    }

    /// Compile only (`-c`).
    pub fn compile_only(&mut self) -> &mut Self {
        self.arg("-c")
    }

    /// Set the output file (`-o <path>`).
    pub fn output(&mut self, path: &Path) -> &mut Self {
        self.arg("-o").arg(path)
    }

    /// Emit a Makefile dependency file next to the object (`-MD -MP`).
    pub fn dep_info(&mut self) -> &mut Self {
        self.arg("-MD").arg("-MP")
    }

    /// Preprocessor define (`-D<define>`).
    pub fn define(&mut self, define: &str) -> &mut Self {
        self.arg(format!("-D{define}"))
    }

    /// Include search directory (`-I <dir>`).
    pub fn include_dir(&mut self, dir: &Path) -> &mut Self {
        self.arg("-I").arg(dir)
    }

    /// Library search directory (`-L <dir>`).
    pub fn library_dir(&mut self, dir: &Path) -> &mut Self {
        self.arg("-L").arg(dir)
    }

    /// Link a named library (`-l<name>`).
    pub fn library(&mut self, name: &str) -> &mut Self {
        self.arg(format!("-l{name}"))
    }

    /// Append several arguments.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for a in args {
            self.arg(a);
        }
        self
    }

    /// Escape hatch for any argument.
    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Execute the command and capture its output.
    pub fn run(&self) -> Result<Output> {
        Command::new(&self.program)
            .args(&self.args)
            .output()
            .with_context(|| format!("failed to run {} for {}", self.program.display(), self.label))
    }

    /// Execute the command and bail if it fails.
    pub fn run_checked(&self, verb: &str) -> Result<Output> {
        let output = self.run()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("failed to {verb} '{}':\n{stderr}", self.label);
        }
        Ok(output)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {}", a.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Find `program` on `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
