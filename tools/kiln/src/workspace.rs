//! Workspace and project descriptions.
//!
//! Both are config-language files. Loading one parses it, injects the
//! command-line target and file locations, resolves it and reads the known
//! groups into typed settings. A project is layered over its workspace: the
//! project's values come first, so they win wherever both declare a key.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use kiln_config::ConfigFile;
use walkdir::WalkDir;

use crate::report;

/// The configuration and platform being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Configuration name, as the workspace declares it.
    pub configuration: String,
    /// Platform name, as the workspace declares it.
    pub platform: String,
}

/// Source language of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// `.c` sources.
    C,
    /// C++ sources; `.c` files are compiled too.
    Cpp,
}

impl Language {
    /// Whether a file with this path is compiled for this language.
    pub fn is_source(self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match self {
            Language::C => ext == "c",
            Language::Cpp => matches!(ext, "c" | "cc" | "cpp" | "cxx" | "c++"),
        }
    }
}

/// What a project produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// A program.
    Executable,
    /// An archive of objects.
    StaticLibrary,
    /// A shared library.
    DynamicLibrary,
    /// Groups other projects; produces nothing itself.
    Container,
}

impl OutputType {
    /// Default file extension for this output on the host.
    pub fn default_extension(self) -> &'static str {
        match self {
            OutputType::Executable => std::env::consts::EXE_EXTENSION,
            OutputType::StaticLibrary if cfg!(windows) => "lib",
            OutputType::StaticLibrary => "a",
            OutputType::DynamicLibrary => std::env::consts::DLL_EXTENSION,
            OutputType::Container => "",
        }
    }

    /// Whether other projects link against this output.
    pub fn is_library(self) -> bool {
        matches!(self, OutputType::StaticLibrary | OutputType::DynamicLibrary)
    }
}

/// Target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// 32-bit x86.
    X86,
    /// x86-64.
    X64,
    /// 32-bit ARM.
    Arm,
    /// AArch64.
    Arm64,
    /// Whatever the host compiler targets by default.
    Native,
}

/// Which compiler family to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolset {
    /// The host's usual compiler.
    Default,
    /// GCC.
    Gcc,
    /// Clang.
    Clang,
}

/// Optimisation setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    /// No optimisation, debug info.
    Debug,
    /// Optimise for size.
    PreferSize,
    /// Optimise for speed.
    PreferSpeed,
    /// Everything the compiler offers.
    Full,
}

/// Warning setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningLevel {
    /// Warnings off.
    None,
    /// Common warnings.
    Low,
    /// Common and extra warnings.
    High,
    /// Everything, including pedantic warnings.
    Verbose,
}

/// Where a project's version number comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// `ProductInfo.Version` as written.
    None,
    /// Queried from source control.
    SourceControl,
}

const VERSION_SOURCES: &[(&str, VersionSource)] = &[
    ("None", VersionSource::None),
    ("SourceControl", VersionSource::SourceControl),
];

const LANGUAGES: &[(&str, Language)] = &[("C", Language::C), ("Cpp", Language::Cpp), ("C++", Language::Cpp)];

const OUTPUT_TYPES: &[(&str, OutputType)] = &[
    ("Executable", OutputType::Executable),
    ("StaticLibrary", OutputType::StaticLibrary),
    ("DynamicLibrary", OutputType::DynamicLibrary),
    ("Container", OutputType::Container),
];

const PLATFORMS: &[(&str, Platform)] = &[
    ("x86", Platform::X86),
    ("x64", Platform::X64),
    ("ARM", Platform::Arm),
    ("ARM64", Platform::Arm64),
    ("Native", Platform::Native),
];

const TOOLSETS: &[(&str, Toolset)] = &[
    ("Default", Toolset::Default),
    ("GCC", Toolset::Gcc),
    ("Clang", Toolset::Clang),
];

const OPTIMIZATION_LEVELS: &[(&str, OptimizationLevel)] = &[
    ("Debug", OptimizationLevel::Debug),
    ("PreferSize", OptimizationLevel::PreferSize),
    ("PreferSpeed", OptimizationLevel::PreferSpeed),
    ("Full", OptimizationLevel::Full),
];

const WARNING_LEVELS: &[(&str, WarningLevel)] = &[
    ("None", WarningLevel::None),
    ("Low", WarningLevel::Low),
    ("High", WarningLevel::High),
    ("Verbose", WarningLevel::Verbose),
];

/// Look up an enum spelling, ignoring ASCII case.
fn parse_enum<T: Copy>(file: &ConfigFile, group: &str, key: &str, table: &[(&str, T)]) -> Result<Option<T>> {
    let Some(value) = file.get_value(group, key) else {
        return Ok(None);
    };
    if let Some(&(_, v)) = table.iter().find(|(name, _)| name.eq_ignore_ascii_case(value.trim())) {
        return Ok(Some(v));
    }
    let expected: Vec<&str> = table.iter().map(|(name, _)| *name).collect();
    bail!(
        "{}: unknown value '{value}' for {group}.{key} (expected one of: {})",
        file.path().display(),
        expected.join(", ")
    )
}

/// Parse a platform name as declared by a workspace.
pub fn parse_platform(name: &str) -> Option<Platform> {
    PLATFORMS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, p)| p)
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(str::to_string).collect()
}

/// Make `path` absolute relative to `base`.
fn rooted(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}

/// Directory of `file`, absolute.
fn directory_of(file: &Path) -> Result<PathBuf> {
    let file = std::path::absolute(file)
        .with_context(|| format!("cannot resolve path {}", file.display()))?;
    Ok(file.parent().map(Path::to_path_buf).unwrap_or_default())
}

fn inject(file: &mut ConfigFile, group: &str, key: &str, value: &str) -> Result<()> {
    file.set_or_add_value(group, key, value)
        .with_context(|| format!("cannot set {group}.{key}"))
}

fn inject_target(file: &mut ConfigFile, target: &Target) -> Result<()> {
    inject(file, "Target", "Configuration", &target.configuration)?;
    inject(file, "Target", "Platform", &target.platform)?;
    inject(file, "Host", "Platform", host_platform_name())?;
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    inject(file, "Host", "Directory", &cwd.to_string_lossy())
}

/// Host platform spelling, as a workspace would declare it.
pub fn host_platform_name() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "x86",
        "x86_64" => "x64",
        "arm" => "ARM",
        "aarch64" => "ARM64",
        _ => "Native",
    }
}

fn report_diagnostics(file: &ConfigFile) {
    report::config_diagnostics(file.path(), file.diagnostics());
}

/// A parsed and resolved workspace file.
#[derive(Debug, Clone)]
pub struct WorkspaceFile {
    /// The workspace file as given.
    pub path: PathBuf,
    /// Absolute directory containing the workspace file.
    pub directory: PathBuf,
    /// `Workspace.Name`.
    pub name: String,
    /// Declared configurations; the first is the default.
    pub configurations: Vec<String>,
    /// Declared platforms; the first is the default.
    pub platforms: Vec<String>,
    /// Project files, absolute.
    pub projects: Vec<PathBuf>,
    /// The resolved config, merged into every project.
    pub config: ConfigFile,
}

impl WorkspaceFile {
    /// Load the workspace at `path` for `target`.
    ///
    /// An empty configuration or platform in `target` selects the first one
    /// the workspace declares; the resolved target is returned alongside.
    pub fn load(path: &Path, target: &Target) -> Result<(Self, Target)> {
        let directory = directory_of(path)?;

        // Declarations are read once without a target so defaults can be
        // picked, then the file is resolved again for real.
        let mut defaults = ConfigFile::new();
        defaults.parse(path)?;
        defaults.resolve();
        let target = Target {
            configuration: pick(&target.configuration, defaults.get_value("Configurations", "Configuration")),
            platform: pick(&target.platform, defaults.get_value("Platforms", "Platform")),
        };

        let mut config = defaults;
        inject_target(&mut config, &target)?;
        inject(&mut config, "Workspace", "File", &path.to_string_lossy())?;
        inject(&mut config, "Workspace", "Directory", &directory.to_string_lossy())?;
        config.resolve();
        report_diagnostics(&config);

        let name = config
            .get_value("Workspace", "Name")
            .map(str::to_string)
            .with_context(|| format!("{}: Workspace.Name is not set", path.display()))?;
        let configurations = owned(config.get_values("Configurations", "Configuration"));
        let platforms = owned(config.get_values("Platforms", "Platform"));
        let projects = config
            .get_values("Projects", "Project")
            .into_iter()
            .map(|p| rooted(&directory, p))
            .collect();

        if !configurations.contains(&target.configuration) {
            bail!(
                "configuration '{}' is not declared by workspace '{name}' (available: {})",
                target.configuration,
                configurations.join(", ")
            );
        }
        if !platforms.contains(&target.platform) {
            bail!(
                "platform '{}' is not declared by workspace '{name}' (available: {})",
                target.platform,
                platforms.join(", ")
            );
        }
        if let Some(bad) = platforms.iter().find(|p| parse_platform(p).is_none()) {
            bail!("{}: unknown platform '{bad}'", path.display());
        }

        let workspace = Self {
            path: path.to_path_buf(),
            directory,
            name,
            configurations,
            platforms,
            projects,
            config,
        };
        Ok((workspace, target))
    }
}

fn pick(requested: &str, fallback: Option<&str>) -> String {
    if requested.is_empty() {
        fallback.unwrap_or_default().to_string()
    } else {
        requested.to_string()
    }
}

/// A parsed and resolved project file with its settings.
#[derive(Debug, Clone)]
pub struct ProjectFile {
    /// The project file as listed by the workspace.
    pub path: PathBuf,
    /// Absolute directory containing the project file; relative paths in
    /// the project resolve against it.
    pub directory: PathBuf,
    /// `Project.Name`, unique within the workspace.
    pub name: String,
    /// `Project.Language`; C++ when unset.
    pub language: Language,
    /// `Project.OutputType`; an executable when unset.
    pub output_type: OutputType,
    /// Artifact file stem; the project name when unset.
    pub output_name: String,
    /// Artifact extension without the dot.
    pub output_extension: String,
    /// Where the artifact goes.
    pub output_directory: PathBuf,
    /// Where objects, dep-info files and the manifest go.
    pub intermediate_directory: PathBuf,
    /// Platform being built.
    pub platform: Platform,
    /// `Build.PlatformToolset`.
    pub toolset: Toolset,
    /// `Build.OptimizationLevel`.
    pub optimization: OptimizationLevel,
    /// `Build.WarningLevel`.
    pub warnings: WarningLevel,
    /// Extra compiler arguments, split on whitespace.
    pub compiler_arguments: Vec<String>,
    /// Extra linker arguments, split on whitespace.
    pub linker_arguments: Vec<String>,
    /// Preprocessor defines, `NAME` or `NAME=value`.
    pub defines: Vec<String>,
    /// Include search directories, absolute.
    pub include_directories: Vec<PathBuf>,
    /// Library search directories, absolute.
    pub library_directories: Vec<PathBuf>,
    /// Libraries to link by name.
    pub libraries: Vec<String>,
    /// Names of projects this one depends on.
    pub dependencies: Vec<String>,
    /// Declared files after pattern expansion, absolute. Includes the
    /// generated version source, if any.
    pub files: Vec<PathBuf>,
    /// Shell commands run before anything else.
    pub pre_build_commands: Vec<String>,
    /// Shell commands run after the artifact is produced.
    pub post_build_commands: Vec<String>,
    /// `ProductInfo.Version`.
    pub version: Option<String>,
    /// `ProductInfo.VersionSource`.
    pub version_source: VersionSource,
    /// `ProductInfo.VersionHpp`: generated version header, absolute.
    pub version_header: Option<PathBuf>,
    /// `ProductInfo.VersionCpp`: generated version source, absolute.
    pub version_source_file: Option<PathBuf>,
    /// The resolved config, layered over the workspace's.
    pub config: ConfigFile,
}

impl ProjectFile {
    /// Load the project at `path`, layered over `workspace`.
    #[allow(clippy::too_many_lines)]
    pub fn load(path: &Path, workspace: &WorkspaceFile, target: &Target) -> Result<Self> {
        let directory = directory_of(path)?;

        let mut config = ConfigFile::new();
        config.parse(path)?;
        inject_target(&mut config, target)?;
        inject(&mut config, "Project", "File", &path.to_string_lossy())?;
        inject(&mut config, "Project", "Directory", &directory.to_string_lossy())?;
        config.merge(&workspace.config);
        config.resolve();
        report_diagnostics(&config);

        let name = config
            .get_value("Project", "Name")
            .map(str::to_string)
            .with_context(|| format!("{}: Project.Name is not set", path.display()))?;
        let language = parse_enum(&config, "Project", "Language", LANGUAGES)?.unwrap_or(Language::Cpp);
        let output_type =
            parse_enum(&config, "Project", "OutputType", OUTPUT_TYPES)?.unwrap_or(OutputType::Executable);
        let platform = parse_platform(&target.platform)
            .with_context(|| format!("unknown platform '{}'", target.platform))?;
        let toolset = parse_enum(&config, "Build", "PlatformToolset", TOOLSETS)?.unwrap_or(Toolset::Default);
        let optimization = parse_enum(&config, "Build", "OptimizationLevel", OPTIMIZATION_LEVELS)?
            .unwrap_or(OptimizationLevel::Debug);
        let warnings = parse_enum(&config, "Build", "WarningLevel", WARNING_LEVELS)?.unwrap_or(WarningLevel::Low);

        let output_name = config.get_value("Project", "OutputName").unwrap_or(name.as_str()).to_string();
        let output_extension = config
            .get_value("Project", "OutputExtension")
            .map_or_else(|| output_type.default_extension().to_string(), |e| e.trim_start_matches('.').to_string());

        let build_root = workspace
            .directory
            .join("build")
            .join(&name)
            .join(format!("{}_{}", target.configuration, target.platform));
        let output_directory = config
            .get_value("Project", "OutputDirectory")
            .map_or_else(|| build_root.join("bin"), |d| rooted(&directory, d));
        let intermediate_directory = config
            .get_value("Project", "IntermediateDirectory")
            .map_or_else(|| build_root.join("obj"), |d| rooted(&directory, d));

        let split_args = |key: &str| -> Vec<String> {
            config
                .get_values("Build", key)
                .iter()
                .flat_map(|v| v.split_whitespace())
                .map(str::to_string)
                .collect()
        };
        let compiler_arguments = split_args("CompilerArguments");
        let linker_arguments = split_args("LinkerArguments");

        let dirs = |key: &str| -> Vec<PathBuf> {
            config
                .get_values("SearchPaths", key)
                .into_iter()
                .map(|d| rooted(&directory, d))
                .collect()
        };
        let include_directories = dirs("IncludeDirectory");
        let library_directories = dirs("LibraryDirectory");

        let version_source =
            parse_enum(&config, "ProductInfo", "VersionSource", VERSION_SOURCES)?.unwrap_or(VersionSource::None);
        let version_header = config.get_value("ProductInfo", "VersionHpp").map(|p| rooted(&directory, p));
        let version_source_file = config.get_value("ProductInfo", "VersionCpp").map(|p| rooted(&directory, p));

        // The generated source may not exist yet; it goes first so the
        // order does not change once it does.
        let mut files: Vec<PathBuf> = version_source_file.iter().cloned().collect();
        for pattern in config.get_values("Files", "File") {
            for file in expand_pattern(&directory, pattern)? {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            directory,
            language,
            output_type,
            output_name,
            output_extension,
            output_directory,
            intermediate_directory,
            platform,
            toolset,
            optimization,
            warnings,
            compiler_arguments,
            linker_arguments,
            defines: owned(config.get_values("Defines", "Define")),
            include_directories,
            library_directories,
            libraries: owned(config.get_values("Libraries", "Library")),
            dependencies: owned(config.get_values("Dependencies", "Dependency")),
            files,
            pre_build_commands: owned(config.get_values("PreBuildCommands", "Command")),
            post_build_commands: owned(config.get_values("PostBuildCommands", "Command")),
            version: config.get_value("ProductInfo", "Version").map(str::to_string),
            version_source,
            version_header,
            version_source_file,
            name,
            config,
        })
    }

    /// Path of the artifact this project produces.
    pub fn output_file(&self) -> PathBuf {
        let mut file = self.output_name.clone();
        if !self.output_extension.is_empty() {
            file.push('.');
            file.push_str(&self.output_extension);
        }
        self.output_directory.join(file)
    }

    /// Where the build manifest for this project lives.
    pub fn manifest_file(&self) -> PathBuf {
        self.intermediate_directory.join(format!("{}.manifest", self.name))
    }

    /// Declared files the project's language compiles.
    pub fn source_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|f| self.language.is_source(f))
            .cloned()
            .collect()
    }
}

/// Expand a file pattern relative to `base`.
///
/// `*` and `?` match within one path component, `**` matches any number of
/// components. A pattern without wildcards names one file, which must
/// exist.
pub fn expand_pattern(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = pattern.replace('\\', "/");
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty() && *c != ".").collect();
    let wildcard = components.iter().position(|c| c.contains(['*', '?']));

    let Some(first_wild) = wildcard else {
        let file = rooted(base, &pattern);
        if !file.is_file() {
            bail!("file not found: {}", file.display());
        }
        return Ok(vec![file]);
    };

    let mut walk_root = if pattern.starts_with('/') { PathBuf::from("/") } else { base.to_path_buf() };
    for c in &components[..first_wild] {
        walk_root.push(c);
    }
    let rest = &components[first_wild..];

    let mut matches = Vec::new();
    for entry in WalkDir::new(&walk_root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", walk_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&walk_root) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        if glob_match(rest, &parts) {
            matches.push(entry.into_path());
        }
    }
    Ok(matches)
}

/// Match path components against pattern components.
fn glob_match(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| glob_match(rest, &path[skip..])),
        Some((first, rest)) => match path.split_first() {
            Some((head, tail)) => wildcard_match(first.as_bytes(), head.as_bytes()) && glob_match(rest, tail),
            None => false,
        },
    }
}

/// `*` / `?` matching within one component.
fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.split_first(), text.split_first()) {
        (None, None) => true,
        (Some((b'*', rest)), _) => {
            wildcard_match(rest, text) || (!text.is_empty() && wildcard_match(pattern, &text[1..]))
        }
        (Some((b'?', rest)), Some((_, tail))) => wildcard_match(rest, tail),
        (Some((p, rest)), Some((t, tail))) => p == t && wildcard_match(rest, tail),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn debug_x64() -> Target {
        Target { configuration: "Debug".into(), platform: "x64".into() }
    }

    const WORKSPACE: &str = "\
[Workspace]
Name = Demo
[Configurations]
Configuration = Debug
Configuration = Release
[Platforms]
Platform = x64
Platform = x86
[Projects]
Project = app/app.kiln
[Build]
WarningLevel = High
";

    #[test]
    fn glob_patterns() {
        assert!(glob_match(&["*.c"], &["main.c"]));
        assert!(!glob_match(&["*.c"], &["sub", "main.c"]));
        assert!(glob_match(&["**", "*.c"], &["main.c"]));
        assert!(glob_match(&["**", "*.c"], &["a", "b", "main.c"]));
        assert!(glob_match(&["src", "**"], &["src", "x", "y.h"]));
        assert!(glob_match(&["m?in.c"], &["main.c"]));
        assert!(!glob_match(&["*.c"], &["main.cpp"]));
    }

    #[test]
    fn expand_pattern_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/main.c"), "");
        write(&dir.path().join("src/util/str.c"), "");
        write(&dir.path().join("src/util/str.h"), "");

        let files = expand_pattern(dir.path(), "src/**/*.c").unwrap();
        assert_eq!(files, vec![dir.path().join("src/main.c"), dir.path().join("src/util/str.c")]);

        let files = expand_pattern(dir.path(), "src/util/str.h").unwrap();
        assert_eq!(files, vec![dir.path().join("src/util/str.h")]);
        assert!(expand_pattern(dir.path(), "src/missing.c").is_err());
    }

    #[test]
    fn workspace_defaults_to_first_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.kiln");
        write(&path, WORKSPACE);

        let requested = Target { configuration: String::new(), platform: String::new() };
        let (ws, target) = WorkspaceFile::load(&path, &requested).unwrap();
        assert_eq!(ws.name, "Demo");
        assert_eq!(target, debug_x64());
        assert_eq!(ws.configurations, vec!["Debug", "Release"]);
        assert_eq!(ws.projects, vec![ws.directory.join("app/app.kiln")]);
        assert_eq!(ws.config.get_value("Target", "Configuration"), Some("Debug"));
    }

    #[test]
    fn undeclared_configuration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.kiln");
        write(&path, WORKSPACE);
        let target = Target { configuration: "Profile".into(), platform: "x64".into() };
        let err = WorkspaceFile::load(&path, &target).unwrap_err();
        assert!(err.to_string().contains("configuration 'Profile'"), "{err}");
    }

    #[test]
    fn project_layers_over_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws_path = dir.path().join("demo.kiln");
        write(&ws_path, WORKSPACE);
        write(&dir.path().join("app/src/main.cpp"), "");
        write(&dir.path().join("app/src/util.h"), "");
        let project = "\
[Project]
Name = App
Language = Cpp
OutputType = StaticLibrary
[Build]
if (Target.Configuration == Release) {
    OptimizationLevel = Full
} else {
    OptimizationLevel = Debug
}
CompilerArguments = -fno-exceptions -fPIC
[Defines]
Define = APP_NAME=\"$(Project.Name)\"
if (Target.Platform == x64) {
    Define = APP_64
}
[SearchPaths]
IncludeDirectory = include
[Files]
File = src/**
[Dependencies]
Dependency = Core
[ProductInfo]
Version = 1.2.3
";
        let path = dir.path().join("app/app.kiln");
        write(&path, project);

        let (ws, target) = WorkspaceFile::load(&ws_path, &debug_x64()).unwrap();
        let p = ProjectFile::load(&path, &ws, &target).unwrap();

        assert_eq!(p.name, "App");
        assert_eq!(p.language, Language::Cpp);
        assert_eq!(p.output_type, OutputType::StaticLibrary);
        assert_eq!(p.optimization, OptimizationLevel::Debug);
        // Not set by the project: falls through to the workspace.
        assert_eq!(p.warnings, WarningLevel::High);
        assert_eq!(p.compiler_arguments, vec!["-fno-exceptions", "-fPIC"]);
        assert_eq!(p.defines, vec!["APP_NAME=\"App\"", "APP_64"]);
        assert_eq!(p.include_directories, vec![p.directory.join("include")]);
        assert_eq!(p.dependencies, vec!["Core"]);
        assert_eq!(p.version.as_deref(), Some("1.2.3"));
        assert_eq!(p.files.len(), 2);
        assert_eq!(p.source_files(), vec![p.directory.join("src/main.cpp")]);
        assert!(p.output_file().ends_with(format!("App.{}", OutputType::StaticLibrary.default_extension())));
        assert!(p.manifest_file().ends_with("App.manifest"));
        assert!(p.output_directory.starts_with(ws.directory.join("build/App/Debug_x64")));
    }

    #[test]
    fn version_source_file_is_a_project_file() {
        let dir = tempfile::tempdir().unwrap();
        let ws_path = dir.path().join("demo.kiln");
        write(&ws_path, WORKSPACE);
        write(&dir.path().join("app/src/main.c"), "");
        let path = dir.path().join("app/app.kiln");
        write(
            &path,
            "[Project]\nName = App\nLanguage = C\n[Files]\nFile = src/*.c\n\
             [ProductInfo]\nVersion = 0.9\nVersionHpp = src/version.h\nVersionCpp = src/version.c\n",
        );

        let (ws, target) = WorkspaceFile::load(&ws_path, &debug_x64()).unwrap();
        let p = ProjectFile::load(&path, &ws, &target).unwrap();
        assert_eq!(p.version_source, VersionSource::None);
        assert_eq!(p.version_header, Some(p.directory.join("src/version.h")));
        assert_eq!(p.files, vec![p.directory.join("src/version.c"), p.directory.join("src/main.c")]);

        // Once generated, the pattern finds it too but the order holds.
        write(&dir.path().join("app/src/version.c"), "");
        let p = ProjectFile::load(&path, &ws, &target).unwrap();
        assert_eq!(p.files, vec![p.directory.join("src/version.c"), p.directory.join("src/main.c")]);
    }

    #[test]
    fn unknown_enum_spelling_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ws_path = dir.path().join("demo.kiln");
        write(&ws_path, WORKSPACE);
        let path = dir.path().join("app/app.kiln");
        write(&path, "[Project]\nName = App\nOutputType = Plugin\n");

        let (ws, target) = WorkspaceFile::load(&ws_path, &debug_x64()).unwrap();
        let err = ProjectFile::load(&path, &ws, &target).unwrap_err();
        assert!(err.to_string().contains("Project.OutputType"), "{err}");
    }
}
