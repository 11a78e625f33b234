//! Build orchestration.
//!
//! A [`Builder`] owns a loaded workspace and a worker pool. Building a
//! project runs its pre-build commands, checks every source and the output
//! against the manifest, asks the toolchain for tasks, and runs those tasks
//! as a staged job graph:
//!
//! ```text
//!   root ── stage(post) ── stage(link) ── stage(compile) ── stage(pre)
//!                               │
//!                     group ── parallel tasks
//!                       └── seq 1 ── seq 2 ...
//! ```
//!
//! Each stage waits on the previous stage job. Parallel tasks of a stage hang
//! under the stage's group job; sequential tasks run after the group, one
//! after another in declaration order. The manifest is written only when
//! every task succeeded.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use kiln_jobs::{JobHandle, JobScheduler};

use crate::hash::{file_mtime, hash64};
use crate::state::{
    BuildManifest, FileInfo, MessageLog, check_inputs, check_out_of_date, common_root, get_multiple_file_infos,
    parse_dep_info,
};
use crate::task::{BuildStage, BuildTask, ShellCommandTask, run_shell};
use crate::report::{self, Phase, detail, status};
use crate::toolchain::{Toolchain, ToolchainContext, create_toolchain};
use crate::version::write_version_files;
use crate::workspace::{OutputType, ProjectFile, Target, WorkspaceFile};

/// Creates the toolchain for a project.
pub type ToolchainFactory = Box<dyn Fn(&ToolchainContext) -> Result<Box<dyn Toolchain>> + Send + Sync>;

/// What happened to one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Tasks ran and the manifest was updated.
    Built,
    /// Every file and the output were fresh.
    UpToDate,
    /// Container project; nothing to build.
    Skipped,
}

/// Loaded workspace plus the machinery to build its projects.
pub struct Builder {
    workspace: WorkspaceFile,
    target: Target,
    projects: Vec<Arc<ProjectFile>>,
    scheduler: JobScheduler,
    factory: ToolchainFactory,
}

impl Builder {
    /// Load the workspace at `path` and every project it lists.
    ///
    /// `jobs` is the worker count; `0` detects it from the host.
    pub fn new(path: &Path, target: &Target, jobs: usize) -> Result<Self> {
        let (workspace, target) = {
            let _phase = Phase::start("load workspace");
            WorkspaceFile::load(path, target)?
        };

        let mut projects: Vec<Arc<ProjectFile>> = Vec::with_capacity(workspace.projects.len());
        for project_path in &workspace.projects {
            let _phase = Phase::start(format!("load {}", project_path.display()));
            let project = ProjectFile::load(project_path, &workspace, &target)
                .with_context(|| format!("failed to load project {}", project_path.display()))?;
            if projects.iter().any(|p| p.name == project.name) {
                bail!("duplicate project name '{}' in workspace '{}'", project.name, workspace.name);
            }
            projects.push(Arc::new(project));
        }

        Ok(Self {
            workspace,
            target,
            projects,
            scheduler: JobScheduler::new(jobs),
            factory: Box::new(create_toolchain),
        })
    }

    /// Replace how toolchains are created.
    #[must_use]
    pub fn with_toolchain_factory(mut self, factory: ToolchainFactory) -> Self {
        self.factory = factory;
        self
    }

    /// The loaded workspace.
    pub fn workspace(&self) -> &WorkspaceFile {
        &self.workspace
    }

    /// The configuration and platform being built.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Projects in workspace order.
    pub fn projects(&self) -> &[Arc<ProjectFile>] {
        &self.projects
    }

    /// Project by name.
    pub fn project(&self, name: &str) -> Result<&Arc<ProjectFile>> {
        self.projects
            .iter()
            .find(|p| p.name == name)
            .with_context(|| format!("no project named '{name}' in workspace '{}'", self.workspace.name))
    }

    /// Configuration fingerprint of `project`: the target, the project's
    /// location and the modification times of the project and workspace
    /// files folded into one hash.
    pub fn fingerprint(&self, project: &ProjectFile) -> u64 {
        let mut h = hash64(0, self.target.configuration.as_bytes());
        h = hash64(h, self.target.platform.as_bytes());
        h = hash64(h, project.path.to_string_lossy().as_bytes());
        h = hash64(h, &file_mtime(&project.path).unwrap_or(0).to_le_bytes());
        hash64(h, &file_mtime(&self.workspace.path).unwrap_or(0).to_le_bytes())
    }

    /// `name`'s dependencies in build order, followed by `name` itself.
    pub fn build_dependency_list(&self, name: &str) -> Result<Vec<Arc<ProjectFile>>> {
        let mut order = Vec::new();
        let mut processed = HashSet::new();
        let mut visiting = Vec::new();
        self.visit(name, &mut processed, &mut visiting, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        processed: &mut HashSet<String>,
        visiting: &mut Vec<String>,
        order: &mut Vec<Arc<ProjectFile>>,
    ) -> Result<()> {
        if processed.contains(name) {
            return Ok(());
        }
        if visiting.iter().any(|v| v == name) {
            visiting.push(name.to_string());
            bail!("dependency cycle between projects: {}", visiting.join(" -> "));
        }
        let project = self.project(name)?;
        visiting.push(name.to_string());
        for dep in &project.dependencies {
            self.visit(dep, processed, visiting, order)
                .with_context(|| format!("while resolving dependencies of '{name}'"))?;
        }
        visiting.pop();
        processed.insert(name.to_string());
        order.push(Arc::clone(project));
        Ok(())
    }

    /// Projects a build of `name` (or of the whole workspace) touches.
    fn selection(&self, name: Option<&str>, with_deps: bool) -> Result<Vec<Arc<ProjectFile>>> {
        let roots: Vec<&str> = match name {
            Some(name) => vec![name],
            None => self.projects.iter().map(|p| p.name.as_str()).collect(),
        };
        if !with_deps {
            return roots.into_iter().map(|n| self.project(n).cloned()).collect();
        }
        let mut selected: Vec<Arc<ProjectFile>> = Vec::new();
        for root in roots {
            for project in self.build_dependency_list(root)? {
                if !selected.iter().any(|p| p.name == project.name) {
                    selected.push(project);
                }
            }
        }
        Ok(selected)
    }

    /// Build `name` (or every project), dependencies first when `with_deps`.
    pub fn build(&self, name: Option<&str>, with_deps: bool) -> Result<Vec<(String, BuildOutcome)>> {
        let mut outcomes = Vec::new();
        for project in self.selection(name, with_deps)? {
            let outcome = self
                .build_project(&project)
                .with_context(|| format!("build of '{}' failed", project.name))?;
            outcomes.push((project.name.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Clean then build.
    pub fn rebuild(&self, name: Option<&str>, with_deps: bool) -> Result<Vec<(String, BuildOutcome)>> {
        for project in self.selection(name, with_deps)? {
            self.clean_project(&project)?;
        }
        self.build(name, with_deps)
    }

    /// Delete intermediate files and outputs of `name` (or every project).
    pub fn clean(&self, name: Option<&str>) -> Result<()> {
        for project in self.selection(name, false)? {
            self.clean_project(&project)?;
        }
        Ok(())
    }

    fn clean_project(&self, project: &ProjectFile) -> Result<()> {
        status!("Cleaning {}", project.name);
        if project.intermediate_directory.exists() {
            std::fs::remove_dir_all(&project.intermediate_directory)
                .with_context(|| format!("failed to remove {}", project.intermediate_directory.display()))?;
        }
        let output = project.output_file();
        if project.output_type != OutputType::Container && output.is_file() {
            std::fs::remove_file(&output).with_context(|| format!("failed to remove {}", output.display()))?;
        }
        Ok(())
    }

    /// Library artifacts `project` links against, dependents first.
    fn dependency_outputs(&self, project: &ProjectFile) -> Result<Vec<PathBuf>> {
        let order = self.build_dependency_list(&project.name)?;
        Ok(order
            .iter()
            .rev()
            .filter(|p| p.name != project.name && p.output_type.is_library())
            .map(|p| p.output_file())
            .collect())
    }

    /// Build one project without touching its dependencies.
    #[allow(clippy::too_many_lines)]
    pub fn build_project(&self, project: &Arc<ProjectFile>) -> Result<BuildOutcome> {
        let start = Instant::now();
        status!("Building {} ({} {})", project.name, self.target.configuration, self.target.platform);

        for command in &project.pre_build_commands {
            status!("  Running {command}");
            run_shell(command, &project.directory).context("pre-build command failed")?;
        }

        if project.output_type == OutputType::Container {
            status!("  Nothing to build for container project");
            return Ok(BuildOutcome::Skipped);
        }

        for dir in [&project.output_directory, &project.intermediate_directory] {
            std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        }
        if write_version_files(project)? {
            detail!("  Wrote version files for {}", project.name);
        }

        let manifest_path = project.manifest_file();
        let mut manifest = match BuildManifest::read(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                report::warning(format_args!("{e:#}; rebuilding {} from scratch", project.name));
                BuildManifest::new()
            }
        };

        let ctx = ToolchainContext {
            project: Arc::clone(project),
            dependency_outputs: self.dependency_outputs(project)?,
            messages: MessageLog::default(),
        };
        let mut toolchain = (self.factory)(&ctx)?;
        toolchain.init().context("failed to initialise toolchain")?;
        detail!("  Toolchain: {}", toolchain.description());

        let fingerprint = self.fingerprint(project);
        detail!("  Fingerprint: {fingerprint:016x}");
        let requires_compile = toolchain.requires_compile_step();

        let (mut files, mut output_info) = {
            let _phase = Phase::start(format!("staleness check ({})", project.name));
            let sources = project.source_files();
            let root = common_root(&sources);
            let files = get_multiple_file_infos(
                &sources,
                &root,
                &project.intermediate_directory,
                fingerprint,
                !requires_compile,
                &manifest,
                toolchain.object_extension(),
            );
            let mut output_info = FileInfo::new(project.path.clone(), project.output_file());
            check_out_of_date(&mut output_info, fingerprint, requires_compile, &manifest);
            if requires_compile {
                check_inputs(&mut output_info, &output_inputs(&files, &ctx));
            }
            (files, output_info)
        };

        for info in files.iter().chain(std::iter::once(&output_info)) {
            if let Some(reason) = &info.stale_reason {
                detail!("  stale: {} ({reason})", info.output_path.display());
            }
        }

        if !output_info.out_of_date && files.iter().all(|f| !f.out_of_date) {
            status!("  {} is up to date", project.name);
            return Ok(BuildOutcome::UpToDate);
        }

        let output = project.output_file();
        let mut tasks = toolchain.tasks(&files, fingerprint, &output, project.version.as_deref());
        for command in &project.post_build_commands {
            tasks.push(Box::new(ShellCommandTask::new(
                BuildStage::PostBuild,
                command.clone(),
                project.directory.clone(),
            )));
        }

        {
            let _phase = Phase::start(format!("scheduled build ({})", project.name));
            let result = self.run_tasks(tasks);
            ctx.messages.attach(&mut files);
            for message in files.iter().flat_map(|f| &f.messages) {
                report::compiler_message(message);
            }
            result?;
        }

        for info in &files {
            if !info.out_of_date {
                continue;
            }
            let discovered = if info.manifest_path.exists() {
                parse_dep_info(&info.manifest_path)?
            } else {
                Vec::new()
            };
            manifest.record(info, fingerprint, &discovered)?;
        }
        output_info.out_of_date = false;
        manifest.record(&output_info, fingerprint, &output_inputs(&files, &ctx))?;
        let current: Vec<&Path> = files
            .iter()
            .chain(std::iter::once(&output_info))
            .map(|f| f.output_path.as_path())
            .collect();
        manifest.retain_outputs(&current);
        manifest.write(&manifest_path)?;

        status!("Completed {} in {:.1} seconds", project.name, start.elapsed().as_secs_f64());
        Ok(BuildOutcome::Built)
    }

    /// Run `tasks` as a staged job graph and wait for all of them.
    ///
    /// A failing task sets a shared flag; tasks that have not started yet
    /// see it and return without doing anything.
    pub fn run_tasks(&self, tasks: Vec<Box<dyn BuildTask>>) -> Result<()> {
        let total = tasks.iter().filter(|t| t.should_give_job_index()).count();
        let failed = Arc::new(AtomicBool::new(false));
        let next_index = Arc::new(AtomicUsize::new(0));

        let mut by_stage: BTreeMap<BuildStage, Vec<Box<dyn BuildTask>>> = BTreeMap::new();
        for task in tasks {
            by_stage.entry(task.stage()).or_default().push(task);
        }

        let scheduler = &self.scheduler;
        let root = scheduler.create_host_job();
        let mut previous: Option<JobHandle> = None;

        for stage in BuildStage::ALL {
            let stage_job = scheduler.create_host_job();
            let group = scheduler.create_host_job();
            if let Some(prev) = previous {
                scheduler.add_dependency(stage_job, prev)?;
                scheduler.add_dependency(group, prev)?;
            }

            let mut last_sequential: Option<JobHandle> = None;
            for task in by_stage.remove(&stage).unwrap_or_default() {
                let parallel = task.can_run_in_parallel();
                let job = scheduler.create_job(task_job(
                    task,
                    Arc::clone(&failed),
                    Arc::clone(&next_index),
                    total,
                ));
                if let Some(prev) = previous {
                    scheduler.add_dependency(job, prev)?;
                }
                if parallel {
                    scheduler.add_dependency(group, job)?;
                } else {
                    scheduler.add_dependency(job, group)?;
                    if let Some(last) = last_sequential {
                        scheduler.add_dependency(job, last)?;
                    }
                    last_sequential = Some(job);
                }
            }

            scheduler.add_dependency(stage_job, group)?;
            if let Some(last) = last_sequential {
                scheduler.add_dependency(stage_job, last)?;
            }
            previous = Some(stage_job);
        }
        if let Some(last) = previous {
            scheduler.add_dependency(root, last)?;
        }

        scheduler.enqueue(root)?;
        scheduler.wait(root).context("build task panicked")?;

        if failed.load(Ordering::SeqCst) {
            bail!("one or more build tasks failed");
        }
        Ok(())
    }
}

/// What a project's output is built from: every object, then the
/// artifacts of its dependencies.
fn output_inputs(files: &[FileInfo], ctx: &ToolchainContext) -> Vec<PathBuf> {
    files
        .iter()
        .map(|f| f.output_path.clone())
        .chain(ctx.dependency_outputs.iter().cloned())
        .collect()
}

/// Wrap a task in a job body that honours the shared failure flag.
fn task_job(
    mut task: Box<dyn BuildTask>,
    failed: Arc<AtomicBool>,
    next_index: Arc<AtomicUsize>,
    total: usize,
) -> impl FnOnce() + Send + 'static {
    move || {
        if failed.load(Ordering::SeqCst) {
            return;
        }
        if task.should_give_job_index() {
            let index = next_index.fetch_add(1, Ordering::SeqCst) + 1;
            task.set_task_progress(index, total);
        }
        if let Err(e) = task.execute() {
            report::error(format_args!("{}: {e:#}", task.description()));
            failed.store(true, Ordering::SeqCst);
        }
    }
}
