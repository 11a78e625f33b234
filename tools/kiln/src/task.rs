//! Build tasks: the units of work a toolchain hands to the builder.
//!
//! Each task is tagged with the stage it belongs to and whether it may run
//! alongside its siblings. The builder turns them into scheduler jobs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::command::ToolCommand;
use crate::state::{MessageLog, parse_compiler_messages};
use crate::report::{self, detail, status};

/// Stage of a target build. Stages run strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildStage {
    /// Work that must precede compilation, such as generated sources.
    PreBuild,
    /// Per-file compilation.
    Compile,
    /// Archiving or linking the target's artifact.
    Link,
    /// The project's post-build commands.
    PostBuild,
}

impl BuildStage {
    /// Every stage, in execution order.
    pub const ALL: [BuildStage; 4] = [
        BuildStage::PreBuild,
        BuildStage::Compile,
        BuildStage::Link,
        BuildStage::PostBuild,
    ];
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::PreBuild => "pre-build",
            BuildStage::Compile => "compile",
            BuildStage::Link => "link",
            BuildStage::PostBuild => "post-build",
        };
        f.write_str(name)
    }
}

/// One unit of build work.
pub trait BuildTask: Send {
    /// Short human-readable label, used in failure reports.
    fn description(&self) -> String;

    /// Stage this task belongs to.
    fn stage(&self) -> BuildStage;

    /// Whether the task may run concurrently with others in its stage.
    fn can_run_in_parallel(&self) -> bool;

    /// Whether the task wants an `[index/total]` progress position.
    fn should_give_job_index(&self) -> bool {
        false
    }

    /// Receive the progress position; `index` is 1-based.
    fn set_task_progress(&mut self, _index: usize, _total: usize) {}

    /// Run the task.
    fn execute(&mut self) -> Result<()>;
}

/// Runs one shell command line through the platform shell.
pub struct ShellCommandTask {
    stage: BuildStage,
    command: String,
    directory: PathBuf,
}

impl ShellCommandTask {
    /// A command run in `directory` during `stage`.
    pub fn new(stage: BuildStage, command: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            command: command.into(),
            directory: directory.into(),
        }
    }
}

/// Run `line` through `sh -c` (or `cmd /C`) in `directory`.
pub fn run_shell(line: &str, directory: &Path) -> Result<()> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    };
    let status = cmd
        .current_dir(directory)
        .status()
        .with_context(|| format!("failed to spawn shell for '{line}'"))?;
    if !status.success() {
        bail!("command '{line}' failed with {status}");
    }
    Ok(())
}

impl BuildTask for ShellCommandTask {
    fn description(&self) -> String {
        self.command.clone()
    }

    fn stage(&self) -> BuildStage {
        self.stage
    }

    fn can_run_in_parallel(&self) -> bool {
        false
    }

    fn execute(&mut self) -> Result<()> {
        status!("  Running {}", self.command);
        run_shell(&self.command, &self.directory)
    }
}

/// Compiles one source file to one object file.
///
/// Diagnostics the compiler prints are parsed and stored in the shared
/// [`MessageLog`] under the source path; the builder reports them once the
/// stage is over.
pub struct CompileTask {
    source: PathBuf,
    object: PathBuf,
    command: ToolCommand,
    progress: Option<(usize, usize)>,
    messages: MessageLog,
}

impl CompileTask {
    /// Compile `source` into `object` by running `command`.
    pub fn new(
        source: impl Into<PathBuf>,
        object: impl Into<PathBuf>,
        command: ToolCommand,
        messages: MessageLog,
    ) -> Self {
        Self {
            source: source.into(),
            object: object.into(),
            command,
            progress: None,
            messages,
        }
    }
}

impl BuildTask for CompileTask {
    fn description(&self) -> String {
        format!("compile {}", self.source.display())
    }

    fn stage(&self) -> BuildStage {
        BuildStage::Compile
    }

    fn can_run_in_parallel(&self) -> bool {
        true
    }

    fn should_give_job_index(&self) -> bool {
        true
    }

    fn set_task_progress(&mut self, index: usize, total: usize) {
        self.progress = Some((index, total));
    }

    fn execute(&mut self) -> Result<()> {
        let name = self
            .source
            .file_name()
            .map_or_else(|| self.source.display().to_string(), |n| n.to_string_lossy().into_owned());
        match self.progress {
            Some((index, total)) => status!("  [{index}/{total}] Compiling {name}"),
            None => status!("  Compiling {name}"),
        }
        detail!("    {}", self.command);

        if let Some(parent) = self.object.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let output = self.command.run()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let messages = parse_compiler_messages(&text);
        let parsed_any = !messages.is_empty();
        self.messages.record(&self.source, messages);

        if !output.status.success() {
            if !parsed_any {
                report::tool_output(&text);
            }
            bail!("failed to compile {}", self.source.display());
        }
        Ok(())
    }
}

/// Runs an archiver or linker to produce a target's artifact.
pub struct ToolTask {
    verb: &'static str,
    output: PathBuf,
    command: ToolCommand,
    replace_output: bool,
}

impl ToolTask {
    /// Link step producing `output`.
    pub fn link(output: impl Into<PathBuf>, command: ToolCommand) -> Self {
        Self {
            verb: "link",
            output: output.into(),
            command,
            replace_output: false,
        }
    }

    /// Archive step producing `output`. An existing archive is removed
    /// first so stale members do not survive.
    pub fn archive(output: impl Into<PathBuf>, command: ToolCommand) -> Self {
        Self {
            verb: "archive",
            output: output.into(),
            command,
            replace_output: true,
        }
    }
}

impl BuildTask for ToolTask {
    fn description(&self) -> String {
        format!("{} {}", self.verb, self.output.display())
    }

    fn stage(&self) -> BuildStage {
        BuildStage::Link
    }

    fn can_run_in_parallel(&self) -> bool {
        false
    }

    fn execute(&mut self) -> Result<()> {
        let name = self
            .output
            .file_name()
            .map_or_else(|| self.output.display().to_string(), |n| n.to_string_lossy().into_owned());
        let verb = if self.verb == "archive" { "Archiving" } else { "Linking" };
        status!("  {verb} {name}");
        detail!("    {}", self.command);

        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        if self.replace_output && self.output.exists() {
            std::fs::remove_file(&self.output)
                .with_context(|| format!("failed to remove {}", self.output.display()))?;
        }
        self.command.run_checked(self.verb)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FileInfo;

    #[test]
    fn stages_are_ordered() {
        let mut stages = BuildStage::ALL.to_vec();
        stages.sort();
        assert_eq!(stages, BuildStage::ALL);
        assert!(BuildStage::PreBuild < BuildStage::PostBuild);
        assert_eq!(BuildStage::Link.to_string(), "link");
    }

    #[test]
    fn task_flags() {
        let compile = CompileTask::new("a.c", "a.o", ToolCommand::new("cc", "a.c"), MessageLog::default());
        assert!(compile.can_run_in_parallel());
        assert!(compile.should_give_job_index());
        assert_eq!(compile.stage(), BuildStage::Compile);

        let link = ToolTask::link("app", ToolCommand::new("cc", "app"));
        assert!(!link.can_run_in_parallel());
        assert!(!link.should_give_job_index());
        assert_eq!(link.stage(), BuildStage::Link);

        let shell = ShellCommandTask::new(BuildStage::PostBuild, "true", ".");
        assert!(!shell.can_run_in_parallel());
        assert_eq!(shell.stage(), BuildStage::PostBuild);
    }

    #[cfg(unix)]
    #[test]
    fn shell_command_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut ok = ShellCommandTask::new(BuildStage::PreBuild, "echo hi > marker.txt", dir.path());
        ok.execute().unwrap();
        assert!(dir.path().join("marker.txt").exists());

        let mut failing = ShellCommandTask::new(BuildStage::PreBuild, "exit 3", dir.path());
        let err = failing.execute().unwrap_err();
        assert!(err.to_string().contains("exit 3"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn compile_task_collects_messages_from_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo 'src/a.c:4:2: error: unknown type name' >&2; exit 1";
        let mut cmd = ToolCommand::new("sh", "a.c");
        cmd.arg("-c").arg(script);
        let log = MessageLog::default();
        let mut task = CompileTask::new("src/a.c", dir.path().join("obj/a.o"), cmd, log.clone());
        task.set_task_progress(1, 1);

        let err = task.execute().unwrap_err();
        assert!(err.to_string().contains("failed to compile src/a.c"), "{err}");
        assert!(dir.path().join("obj").is_dir());

        let mut files = vec![FileInfo::new("src/a.c", dir.path().join("obj/a.o"))];
        log.attach(&mut files);
        assert_eq!(files[0].messages.len(), 1);
        assert_eq!(files[0].messages[0].line, 4);
    }
}
