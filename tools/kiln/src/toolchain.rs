//! Toolchains: turn stale files into ordered build tasks.
//!
//! The builder only sees the [`Toolchain`] trait. The GNU-style driver here
//! covers GCC and Clang; tests inject their own implementations through the
//! builder's toolchain factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::command::{ToolCommand, find_program};
use crate::state::{FileInfo, MessageLog};
use crate::task::{BuildTask, CompileTask, ToolTask};
use crate::workspace::{Language, OptimizationLevel, OutputType, Platform, ProjectFile, Toolset, WarningLevel};

/// Produces the tasks that build one project.
pub trait Toolchain: Send {
    /// Locate tools and query their versions. Failure is fatal for the target.
    fn init(&mut self) -> Result<()>;

    /// Tasks that bring `output` up to date. `files` carry their staleness;
    /// only stale ones need compiling, but all of them are linked.
    fn tasks(
        &self,
        files: &[FileInfo],
        fingerprint: u64,
        output: &Path,
        version: Option<&str>,
    ) -> Vec<Box<dyn BuildTask>>;

    /// Whether sources go through a per-file compile step whose results are
    /// tracked in the manifest.
    fn requires_compile_step(&self) -> bool;

    /// Human-readable name and version.
    fn description(&self) -> String;

    /// Extension of per-file outputs.
    fn object_extension(&self) -> &str {
        "o"
    }
}

/// What a toolchain is created for.
#[derive(Debug, Clone)]
pub struct ToolchainContext {
    /// The project being built.
    pub project: Arc<ProjectFile>,
    /// Artifacts of the project's dependencies, in dependency order.
    pub dependency_outputs: Vec<PathBuf>,
    /// Where compile tasks leave parsed compiler messages.
    pub messages: MessageLog,
}

/// Compiler family of a GNU-style driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainKind {
    /// `gcc` / `g++`.
    Gcc,
    /// `clang` / `clang++`.
    Clang,
}

impl ToolchainKind {
    /// Driver program for `language`.
    pub fn compiler(self, language: Language) -> &'static str {
        match (self, language) {
            (ToolchainKind::Gcc, Language::C) => "gcc",
            (ToolchainKind::Gcc, Language::Cpp) => "g++",
            (ToolchainKind::Clang, Language::C) => "clang",
            (ToolchainKind::Clang, Language::Cpp) => "clang++",
        }
    }
}

/// Pick a toolchain for a project, or `None` if nothing can build it.
pub fn select(language: Language, platform: Platform, toolset: Toolset) -> Option<ToolchainKind> {
    if !platform_supported(platform, std::env::consts::ARCH) {
        return None;
    }
    match (language, toolset) {
        (Language::C | Language::Cpp, Toolset::Gcc) => Some(ToolchainKind::Gcc),
        (Language::C | Language::Cpp, Toolset::Clang) => Some(ToolchainKind::Clang),
        (Language::C | Language::Cpp, Toolset::Default) => {
            if cfg!(any(target_os = "linux", target_os = "macos")) {
                Some(ToolchainKind::Clang)
            } else {
                Some(ToolchainKind::Gcc)
            }
        }
    }
}

/// Whether the host driver can target `platform` from `host_arch`.
fn platform_supported(platform: Platform, host_arch: &str) -> bool {
    match platform {
        Platform::Native => true,
        Platform::X64 => host_arch == "x86_64",
        Platform::X86 => matches!(host_arch, "x86" | "x86_64"),
        Platform::Arm => host_arch == "arm",
        Platform::Arm64 => host_arch == "aarch64",
    }
}

/// Create the toolchain for `ctx` the default way.
pub fn create_toolchain(ctx: &ToolchainContext) -> Result<Box<dyn Toolchain>> {
    let project = &ctx.project;
    let Some(kind) = select(project.language, project.platform, project.toolset) else {
        bail!(
            "no toolchain available for project '{}' ({:?}, {:?}, {:?})",
            project.name,
            project.language,
            project.platform,
            project.toolset
        );
    };
    Ok(Box::new(GnuToolchain::new(kind, ctx.clone())))
}

/// A GCC or Clang driver plus `ar`.
pub struct GnuToolchain {
    kind: ToolchainKind,
    ctx: ToolchainContext,
    compiler: PathBuf,
    archiver: PathBuf,
    version: Option<String>,
}

impl GnuToolchain {
    /// Toolchain using the default program names; [`Toolchain::init`]
    /// resolves them on `PATH`.
    pub fn new(kind: ToolchainKind, ctx: ToolchainContext) -> Self {
        let compiler = PathBuf::from(kind.compiler(ctx.project.language));
        Self::with_programs(kind, ctx, compiler, PathBuf::from("ar"))
    }

    /// Toolchain with explicit program paths.
    pub fn with_programs(kind: ToolchainKind, ctx: ToolchainContext, compiler: PathBuf, archiver: PathBuf) -> Self {
        Self {
            kind,
            ctx,
            compiler,
            archiver,
            version: None,
        }
    }

    fn project(&self) -> &ProjectFile {
        &self.ctx.project
    }

    fn compile_command(&self, info: &FileInfo, version: Option<&str>) -> ToolCommand {
        let project = self.project();
        let mut cmd = ToolCommand::new(&self.compiler, info.source_path.display().to_string());
        cmd.compile_only().output(&info.output_path).dep_info();
        cmd.args(platform_flags(project.platform));
        cmd.args(optimization_flags(project.optimization));
        cmd.args(warning_flags(project.warnings));
        if project.output_type == OutputType::DynamicLibrary {
            cmd.arg("-fPIC");
        }
        for define in &project.defines {
            cmd.define(define);
        }
        if let Some(version) = version {
            cmd.define(&format!("KILN_VERSION=\"{version}\""));
        }
        for dir in &project.include_directories {
            cmd.include_dir(dir);
        }
        cmd.args(&project.compiler_arguments);
        cmd.arg(&info.source_path);
        cmd
    }

    fn link_task(&self, objects: &[&Path], output: &Path) -> Box<dyn BuildTask> {
        let project = self.project();
        if project.output_type == OutputType::StaticLibrary {
            let mut cmd = ToolCommand::new(&self.archiver, project.name.clone());
            cmd.arg("rcs").arg(output).args(objects);
            return Box::new(ToolTask::archive(output, cmd));
        }

        let mut cmd = ToolCommand::new(&self.compiler, project.name.clone());
        if project.output_type == OutputType::DynamicLibrary {
            cmd.arg("-shared");
        }
        cmd.args(platform_flags(project.platform));
        cmd.output(output).args(objects);
        cmd.args(&self.ctx.dependency_outputs);
        for dir in &project.library_directories {
            cmd.library_dir(dir);
        }
        for lib in &project.libraries {
            cmd.library(lib);
        }
        cmd.args(&project.linker_arguments);
        Box::new(ToolTask::link(output, cmd))
    }
}

impl Toolchain for GnuToolchain {
    fn init(&mut self) -> Result<()> {
        if !self.compiler.is_absolute() {
            let name = self.compiler.to_string_lossy().into_owned();
            self.compiler = find_program(&name).with_context(|| format!("compiler '{name}' not found on PATH"))?;
        }
        if self.project().output_type == OutputType::StaticLibrary && !self.archiver.is_absolute() {
            let name = self.archiver.to_string_lossy().into_owned();
            self.archiver = find_program(&name).with_context(|| format!("archiver '{name}' not found on PATH"))?;
        }
        let output = ToolCommand::new(&self.compiler, "version query")
            .arg("--version")
            .run_checked("query version of")?;
        let text = String::from_utf8_lossy(&output.stdout);
        self.version = text.lines().next().and_then(parse_version);
        Ok(())
    }

    fn tasks(
        &self,
        files: &[FileInfo],
        _fingerprint: u64,
        output: &Path,
        version: Option<&str>,
    ) -> Vec<Box<dyn BuildTask>> {
        let mut tasks: Vec<Box<dyn BuildTask>> = files
            .iter()
            .filter(|f| f.out_of_date)
            .map(|f| {
                let cmd = self.compile_command(f, version);
                Box::new(CompileTask::new(&f.source_path, &f.output_path, cmd, self.ctx.messages.clone())) as Box<dyn BuildTask>
            })
            .collect();
        let objects: Vec<&Path> = files.iter().map(|f| f.output_path.as_path()).collect();
        tasks.push(self.link_task(&objects, output));
        tasks
    }

    fn requires_compile_step(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        let name = match self.kind {
            ToolchainKind::Gcc => "GCC",
            ToolchainKind::Clang => "Clang",
        };
        match &self.version {
            Some(v) => format!("{name} {v}"),
            None => name.to_string(),
        }
    }
}

fn platform_flags(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::X86 => &["-m32"],
        Platform::X64 => &["-m64"],
        Platform::Arm | Platform::Arm64 | Platform::Native => &[],
    }
}

fn optimization_flags(level: OptimizationLevel) -> &'static [&'static str] {
    match level {
        OptimizationLevel::Debug => &["-O0", "-g"],
        OptimizationLevel::PreferSize => &["-Os"],
        OptimizationLevel::PreferSpeed => &["-O2"],
        OptimizationLevel::Full => &["-O3"],
    }
}

fn warning_flags(level: WarningLevel) -> &'static [&'static str] {
    match level {
        WarningLevel::None => &["-w"],
        WarningLevel::Low => &["-Wall"],
        WarningLevel::High => &["-Wall", "-Wextra"],
        WarningLevel::Verbose => &["-Wall", "-Wextra", "-Wpedantic"],
    }
}

/// Version number from the first line of `--version` output.
fn parse_version(line: &str) -> Option<String> {
    line.split_whitespace()
        .rev()
        .find(|w| w.starts_with(|c: char| c.is_ascii_digit()) && w.contains('.'))
        .map(str::to_string)
}
