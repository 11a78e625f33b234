//! Incremental build state.
//!
//! Decides per file whether existing output is still valid and persists
//! what was learned in a per-project manifest. Freshness uses a hybrid
//! strategy: a hash of mtime and length is the fast path, and a SHA-256
//! content hash decides when the metadata moved but the bytes may not have.
//! Secondary dependencies (included headers) come from the Makefile-style
//! `.d` files the compiler writes next to each object.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::hash::{self, hash64};

/// Current schema version. Bump when the manifest format changes.
pub const MANIFEST_VERSION: u32 = 1;

/// Result of a freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshResult {
    /// Existing output is valid.
    Fresh,
    /// Output must be rebuilt, with a human-readable reason.
    Stale(String),
}

impl FreshResult {
    /// Returns `true` if the result is `Fresh`.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// `error:` or `fatal error:`
    Error,
    /// `warning:`
    Warning,
    /// `note:`
    Note,
}

/// One diagnostic emitted while compiling a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerMessage {
    /// How serious the message is.
    pub severity: Severity,
    /// File the message points into, as the compiler printed it.
    pub file: PathBuf,
    /// 1-based line.
    pub line: u32,
    /// 1-based column; `0` when the compiler gave none.
    pub column: u32,
    /// Message text after the severity.
    pub text: String,
}

impl std::fmt::Display for CompilerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{}:{}:{}: {severity}: {}", self.file.display(), self.line, self.column, self.text)
    }
}

/// A compile unit and its freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Input file. For a target's output, the project file.
    pub source_path: PathBuf,
    /// File produced from the source.
    pub output_path: PathBuf,
    /// Dependency manifest the compiler writes beside the output (`.d`).
    pub manifest_path: PathBuf,
    /// Fingerprint folded with the source's metadata hash.
    pub hash: u64,
    /// Whether the output must be rebuilt.
    pub out_of_date: bool,
    /// Why the output is out of date, if it is.
    pub stale_reason: Option<String>,
    /// Secondary dependencies recorded by the last successful build.
    pub dependencies: Vec<PathBuf>,
    /// Diagnostics from the most recent compile of this unit.
    pub messages: Vec<CompilerMessage>,
}

impl FileInfo {
    /// A unit for `source` producing `output`, not yet checked.
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let output_path = output.into();
        Self {
            source_path: source.into(),
            manifest_path: output_path.with_extension("d"),
            output_path,
            hash: 0,
            out_of_date: true,
            stale_reason: None,
            dependencies: Vec::new(),
            messages: Vec::new(),
        }
    }
}

/// Recorded state of one file: metadata hash for the fast path, content
/// hash for the slow path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    /// [`hash::metadata_hash`] of the file.
    pub metadata: u64,
    /// Hex SHA-256 of the contents.
    pub content_hash: String,
}

impl FileStamp {
    /// Stamp a file as it currently is on disk.
    pub fn capture(path: &Path) -> Result<Self> {
        let metadata = hash::metadata_hash(path)
            .with_context(|| format!("cannot stat {}", path.display()))?;
        Ok(Self {
            metadata,
            content_hash: hash::hash_file(path)?,
        })
    }

    /// Compare against the file on disk.
    pub fn check(&self, path: &Path) -> FreshResult {
        let Some(metadata) = hash::metadata_hash(path) else {
            return FreshResult::Stale(format!("missing: {}", path.display()));
        };
        if metadata == self.metadata {
            return FreshResult::Fresh;
        }
        match hash::hash_file(path) {
            Ok(h) if h == self.content_hash => FreshResult::Fresh,
            Ok(_) => FreshResult::Stale(format!("changed: {}", path.display())),
            Err(_) => FreshResult::Stale(format!("failed to hash: {}", path.display())),
        }
    }
}

/// A secondary dependency and its state when last recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// The dependency.
    pub path: PathBuf,
    /// Its state when the dependent was built.
    pub stamp: FileStamp,
}

/// What the manifest knows about one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Configuration fingerprint the output was built with.
    pub fingerprint: u64,
    /// [`FileInfo::hash`] when the record was written.
    pub input_hash: u64,
    /// State of the source when the output was built.
    pub source: FileStamp,
    /// Secondary dependencies, in the order they were recorded.
    pub dependencies: Vec<DependencyRecord>,
}

/// Persisted records for one project, keyed by output path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Schema version; a mismatch reads as corruption.
    pub version: u32,
    /// One record per output path.
    pub records: BTreeMap<PathBuf, ManifestRecord>,
}

impl Default for BuildManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildManifest {
    /// An empty manifest.
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            records: BTreeMap::new(),
        }
    }

    /// Load a manifest. A missing file is an empty manifest; a file that
    /// cannot be decoded is an error.
    pub fn read(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read manifest {}", path.display()));
            }
        };
        let manifest: Self = serde_json::from_str(&data)
            .with_context(|| format!("corrupt build manifest {}", path.display()))?;
        if manifest.version != MANIFEST_VERSION {
            bail!(
                "build manifest {} has version {}, expected {MANIFEST_VERSION}",
                path.display(),
                manifest.version
            );
        }
        Ok(manifest)
    }

    /// Save the manifest atomically (write to tmp, then rename).
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let json = serde_json::to_string_pretty(self).context("failed to serialize build manifest")?;
        fs::write(&tmp, json).context("failed to write temporary build manifest")?;
        fs::rename(&tmp, path).context("failed to atomically replace build manifest")?;
        Ok(())
    }

    /// Record for `output`, if any.
    pub fn get(&self, output: &Path) -> Option<&ManifestRecord> {
        self.records.get(output)
    }

    /// Record `info` as successfully built, with `dependencies` as its
    /// secondary inputs.
    pub fn record(&mut self, info: &FileInfo, fingerprint: u64, dependencies: &[PathBuf]) -> Result<()> {
        let source = FileStamp::capture(&info.source_path)?;
        let mut records = Vec::with_capacity(dependencies.len());
        for path in dependencies {
            if path == &info.source_path {
                continue;
            }
            records.push(DependencyRecord {
                path: path.clone(),
                stamp: FileStamp::capture(path)?,
            });
        }
        self.records.insert(
            info.output_path.clone(),
            ManifestRecord {
                fingerprint,
                input_hash: input_hash(fingerprint, &info.source_path),
                source,
                dependencies: records,
            },
        );
        Ok(())
    }

    /// Drop records for outputs not in `outputs`, such as objects of
    /// sources that left the project.
    pub fn retain_outputs(&mut self, outputs: &[&Path]) {
        self.records.retain(|path, _| outputs.contains(&path.as_path()));
    }
}

/// The fingerprint folded with a source's metadata hash.
pub fn input_hash(fingerprint: u64, source: &Path) -> u64 {
    let metadata = hash::metadata_hash(source).unwrap_or(0);
    hash64(fingerprint, &metadata.to_le_bytes())
}

/// Decide whether `info` must be rebuilt and record why on it.
///
/// Without a compile step only the output's existence matters.
pub fn check_out_of_date(
    info: &mut FileInfo,
    fingerprint: u64,
    requires_compile_step: bool,
    manifest: &BuildManifest,
) -> FreshResult {
    info.hash = input_hash(fingerprint, &info.source_path);
    let result = freshness(info, fingerprint, requires_compile_step, manifest);
    info.out_of_date = !result.is_fresh();
    info.stale_reason = match &result {
        FreshResult::Fresh => None,
        FreshResult::Stale(reason) => Some(reason.clone()),
    };
    result
}

fn freshness(
    info: &mut FileInfo,
    fingerprint: u64,
    requires_compile_step: bool,
    manifest: &BuildManifest,
) -> FreshResult {
    if !info.output_path.exists() {
        return FreshResult::Stale("output missing".into());
    }
    if !requires_compile_step {
        return FreshResult::Fresh;
    }

    let Some(record) = manifest.get(&info.output_path) else {
        return FreshResult::Stale("no manifest record".into());
    };
    info.dependencies = record.dependencies.iter().map(|d| d.path.clone()).collect();

    if record.fingerprint != fingerprint {
        return FreshResult::Stale("configuration changed".into());
    }
    if record.input_hash != info.hash {
        if let FreshResult::Stale(reason) = record.source.check(&info.source_path) {
            return FreshResult::Stale(format!("source {reason}"));
        }
    }
    for dep in &record.dependencies {
        if let FreshResult::Stale(reason) = dep.stamp.check(&dep.path) {
            return FreshResult::Stale(format!("dependency {reason}"));
        }
    }
    FreshResult::Fresh
}

/// Mark a fresh `info` stale when its recorded dependencies are not exactly
/// `inputs`.
///
/// Used for a target's output, whose dependencies are its objects and the
/// artifacts of its dependencies. A source removed from the project leaves
/// its object on disk unchanged, so the recorded stamps alone still match.
pub fn check_inputs(info: &mut FileInfo, inputs: &[PathBuf]) -> FreshResult {
    if info.out_of_date {
        return FreshResult::Stale(info.stale_reason.clone().unwrap_or_default());
    }
    if info.dependencies != inputs {
        let reason = String::from("input set changed");
        info.out_of_date = true;
        info.stale_reason = Some(reason.clone());
        return FreshResult::Stale(reason);
    }
    FreshResult::Fresh
}

/// Compiler diagnostics gathered from compile tasks on worker threads,
/// keyed by source. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct MessageLog(Arc<Mutex<BTreeMap<PathBuf, Vec<CompilerMessage>>>>);

impl MessageLog {
    /// Store the diagnostics of one compile of `source`, replacing any
    /// earlier ones.
    pub fn record(&self, source: &Path, messages: Vec<CompilerMessage>) {
        self.entries().insert(source.to_path_buf(), messages);
    }

    /// Move recorded diagnostics onto the matching units.
    pub fn attach(&self, files: &mut [FileInfo]) {
        let mut entries = self.entries();
        for info in files {
            if let Some(messages) = entries.remove(&info.source_path) {
                info.messages = messages;
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Vec<CompilerMessage>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Map each source under `root` to an output under `output_dir` with
/// `extension`, and check each for staleness.
pub fn get_multiple_file_infos(
    sources: &[PathBuf],
    root: &Path,
    output_dir: &Path,
    fingerprint: u64,
    skip_compile_check: bool,
    manifest: &BuildManifest,
    extension: &str,
) -> Vec<FileInfo> {
    sources
        .iter()
        .map(|source| {
            let relative = source
                .strip_prefix(root)
                .ok()
                .map(Path::to_path_buf)
                .or_else(|| source.file_name().map(PathBuf::from))
                .unwrap_or_else(|| source.clone());
            let output = output_dir.join(sanitize(&relative)).with_extension(extension);
            let mut info = FileInfo::new(source.clone(), output);
            check_out_of_date(&mut info, fingerprint, !skip_compile_check, manifest);
            info
        })
        .collect()
}

/// Drop `..` and root components so a mirrored path stays inside the
/// output directory.
fn sanitize(relative: &Path) -> PathBuf {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Deepest directory containing every path in `paths`.
pub fn common_root(paths: &[PathBuf]) -> PathBuf {
    let mut iter = paths.iter().filter_map(|p| p.parent());
    let Some(first) = iter.next() else {
        return PathBuf::new();
    };
    let mut root: Vec<Component<'_>> = first.components().collect();
    for dir in iter {
        let shared = root
            .iter()
            .zip(dir.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        root.truncate(shared);
    }
    root.into_iter().collect()
}

/// Parse a Makefile-style `.d` dep-info file into a list of paths.
///
/// The format is `target: dep1 dep2 ...` with backslash-newline
/// continuations. Phony `header.h:` lines from `-MP` contribute nothing, and
/// duplicates are dropped.
pub fn parse_dep_info(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read dep-info: {}", path.display()))?;
    Ok(parse_dep_info_str(&content))
}

fn parse_dep_info_str(content: &str) -> Vec<PathBuf> {
    let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");

    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    for line in joined.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let deps_part = match find_target_separator(line) {
            Some(idx) => &line[idx + 1..],
            None => line,
        };
        for token in split_dep_tokens(deps_part) {
            let p = PathBuf::from(token);
            if seen.insert(p.clone()) {
                paths.push(p);
            }
        }
    }
    paths
}

/// Position of the `:` ending the target, skipping drive letters (`C:\`).
fn find_target_separator(line: &str) -> Option<usize> {
    line.char_indices()
        .filter(|&(_, c)| c == ':')
        .map(|(i, _)| i)
        .find(|&i| !matches!(line.as_bytes().get(i + 1), Some(b'\\' | b'/')))
}

/// Split a dep-info dependency string on whitespace, handling backslash-escaped spaces.
fn split_dep_tokens(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' && chars.peek() == Some(&' ') {
            current.push(' ');
            chars.next();
        } else if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Extract `file:line[:col]: severity: text` diagnostics from compiler
/// output. Other lines are ignored.
pub fn parse_compiler_messages(output: &str) -> Vec<CompilerMessage> {
    const MARKERS: [(&str, Severity); 4] = [
        (": fatal error: ", Severity::Error),
        (": error: ", Severity::Error),
        (": warning: ", Severity::Warning),
        (": note: ", Severity::Note),
    ];

    let mut messages = Vec::new();
    for line in output.lines() {
        let Some((idx, marker, severity)) = MARKERS
            .iter()
            .filter_map(|&(marker, severity)| line.find(marker).map(|idx| (idx, marker, severity)))
            .min_by_key(|&(idx, ..)| idx)
        else {
            continue;
        };
        let Some((file, line_no, column)) = split_location(&line[..idx]) else {
            continue;
        };
        messages.push(CompilerMessage {
            severity,
            file: PathBuf::from(file),
            line: line_no,
            column,
            text: line[idx + marker.len()..].trim().to_string(),
        });
    }
    messages
}

/// Split `file:line:col` or `file:line`.
fn split_location(location: &str) -> Option<(&str, u32, u32)> {
    let (rest, last) = location.rsplit_once(':')?;
    let last: u32 = last.parse().ok()?;
    match rest.rsplit_once(':') {
        Some((file, line)) if !file.is_empty() => match line.parse() {
            Ok(line) => Some((file, line, last)),
            Err(_) => Some((rest, last, 0)),
        },
        _ => Some((rest, last, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    /// A source plus an existing object in a temp dir.
    fn unit(dir: &Path) -> FileInfo {
        let source = dir.join("src/main.c");
        let output = dir.join("obj/main.o");
        write(&source, "int main(void) { return 0; }\n");
        write(&output, "object");
        FileInfo::new(source, output)
    }

    #[test]
    fn missing_record_is_out_of_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        let result = check_out_of_date(&mut info, 42, true, &BuildManifest::new());
        assert_eq!(result, FreshResult::Stale("no manifest record".into()));
        assert!(info.out_of_date);
    }

    #[test]
    fn unchanged_inputs_are_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 42, &[]).unwrap();

        assert!(check_out_of_date(&mut info, 42, true, &manifest).is_fresh());
        assert!(!info.out_of_date);
        assert_eq!(info.hash, input_hash(42, &info.source_path));
    }

    #[test]
    fn fingerprint_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 42, &[]).unwrap();

        let result = check_out_of_date(&mut info, 43, true, &manifest);
        assert_eq!(result, FreshResult::Stale("configuration changed".into()));
    }

    #[test]
    fn source_edit_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 42, &[]).unwrap();

        write(&info.source_path, "int main(void) { return 1 + 1; }\n");
        assert!(!check_out_of_date(&mut info, 42, true, &manifest).is_fresh());
    }

    #[test]
    fn rewrite_with_same_content_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 42, &[]).unwrap();

        // Force the slow path: the recorded metadata no longer matches.
        let record = manifest.records.get_mut(&info.output_path).unwrap();
        record.input_hash ^= 1;
        record.source.metadata ^= 1;
        assert!(check_out_of_date(&mut info, 42, true, &manifest).is_fresh());
    }

    #[test]
    fn header_edit_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        let header = dir.path().join("include/config.h");
        write(&header, "#define A 1\n");
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 42, &[info.source_path.clone(), header.clone()]).unwrap();
        assert_eq!(manifest.get(&info.output_path).unwrap().dependencies.len(), 1);

        assert!(check_out_of_date(&mut info, 42, true, &manifest).is_fresh());
        assert_eq!(info.dependencies, vec![header.clone()]);

        write(&header, "#define A 22\n");
        let result = check_out_of_date(&mut info, 42, true, &manifest);
        assert!(matches!(result, FreshResult::Stale(ref r) if r.starts_with("dependency changed")));

        fs::remove_file(&header).unwrap();
        let result = check_out_of_date(&mut info, 42, true, &manifest);
        assert!(matches!(result, FreshResult::Stale(ref r) if r.starts_with("dependency missing")));
    }

    #[test]
    fn missing_output_is_out_of_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 42, &[]).unwrap();
        fs::remove_file(&info.output_path).unwrap();
        assert_eq!(
            check_out_of_date(&mut info, 42, true, &manifest),
            FreshResult::Stale("output missing".into())
        );
    }

    #[test]
    fn without_compile_step_only_existence_matters() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = unit(dir.path());
        assert!(check_out_of_date(&mut info, 1, false, &BuildManifest::new()).is_fresh());
        fs::remove_file(&info.output_path).unwrap();
        assert!(!check_out_of_date(&mut info, 1, false, &BuildManifest::new()).is_fresh());
    }

    #[test]
    fn file_infos_mirror_the_source_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        let sources = vec![root.join("main.c"), root.join("util/strings.c")];
        for s in &sources {
            write(s, "int x;\n");
        }
        let obj = dir.path().join("obj");
        let infos = get_multiple_file_infos(&sources, &root, &obj, 7, false, &BuildManifest::new(), "o");

        assert_eq!(infos[0].output_path, obj.join("main.o"));
        assert_eq!(infos[1].output_path, obj.join("util/strings.o"));
        assert_eq!(infos[1].manifest_path, obj.join("util/strings.d"));
        assert!(infos.iter().all(|i| i.out_of_date));
    }

    #[test]
    fn manifest_round_trips_and_rejects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj/app.manifest");
        assert_eq!(BuildManifest::read(&path).unwrap(), BuildManifest::new());

        let info = unit(dir.path());
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 9, &[]).unwrap();
        manifest.write(&path).unwrap();
        assert_eq!(BuildManifest::read(&path).unwrap(), manifest);

        fs::write(&path, "{ not json").unwrap();
        assert!(BuildManifest::read(&path).is_err());

        let mut old = manifest.clone();
        old.version = MANIFEST_VERSION + 1;
        fs::write(&path, serde_json::to_string(&old).unwrap()).unwrap();
        assert!(BuildManifest::read(&path).is_err());
    }

    #[test]
    fn output_is_stale_when_its_input_set_changes() {
        let dir = tempfile::tempdir().unwrap();
        let objects: Vec<PathBuf> = ["a.o", "b.o"].iter().map(|n| dir.path().join(n)).collect();
        for o in &objects {
            write(o, "object");
        }
        let mut output = unit(dir.path());
        let mut manifest = BuildManifest::new();
        manifest.record(&output, 5, &objects).unwrap();

        check_out_of_date(&mut output, 5, true, &manifest);
        assert!(check_inputs(&mut output, &objects).is_fresh());

        // b.c left the project; b.o is still on disk and unchanged.
        let result = check_inputs(&mut output, &objects[..1]);
        assert_eq!(result, FreshResult::Stale("input set changed".into()));
        assert!(output.out_of_date);
    }

    #[test]
    fn retain_outputs_prunes_records() {
        let dir = tempfile::tempdir().unwrap();
        let info = unit(dir.path());
        let mut other = FileInfo::new(info.source_path.clone(), dir.path().join("obj/gone.o"));
        other.out_of_date = false;
        let mut manifest = BuildManifest::new();
        manifest.record(&info, 1, &[]).unwrap();
        manifest.record(&other, 1, &[]).unwrap();

        manifest.retain_outputs(&[info.output_path.as_path()]);
        assert!(manifest.get(&info.output_path).is_some());
        assert!(manifest.get(&other.output_path).is_none());
    }

    #[test]
    fn message_log_attaches_by_source() {
        let log = MessageLog::default();
        let mut files = vec![FileInfo::new("/src/a.c", "/obj/a.o"), FileInfo::new("/src/b.c", "/obj/b.o")];
        let worker = log.clone();
        std::thread::spawn(move || {
            worker.record(Path::new("/src/b.c"), parse_compiler_messages("/src/b.c:2:1: warning: unused\n"));
        })
        .join()
        .unwrap();

        log.attach(&mut files);
        assert!(files[0].messages.is_empty());
        assert_eq!(files[1].messages.len(), 1);
        assert_eq!(files[1].messages[0].severity, Severity::Warning);
    }

    #[test]
    fn parse_dep_info_handles_continuations() {
        let deps = parse_dep_info_str(
            "obj/main.o: src/main.c include/a.h \\\n  include/my\\ file.h include/a.h\n\ninclude/a.h:\n",
        );
        assert_eq!(
            deps,
            vec![
                PathBuf::from("src/main.c"),
                PathBuf::from("include/a.h"),
                PathBuf::from("include/my file.h"),
            ]
        );
    }

    #[test]
    fn parse_dep_info_skips_drive_letters() {
        let deps = parse_dep_info_str("C:\\obj\\main.o: C:\\src\\main.c\n");
        assert_eq!(deps, vec![PathBuf::from("C:\\src\\main.c")]);
    }

    #[test]
    fn compiler_messages_are_parsed() {
        let output = "\
src/main.c: In function 'main':
src/main.c:3:5: warning: unused variable 'x' [-Wunused-variable]
src/main.c:4:12: error: expected ';' before '}' token
include/a.h:1: note: in expansion of macro
collect2: error: ld returned 1 exit status
";
        let messages = parse_compiler_messages(output);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].severity, Severity::Warning);
        assert_eq!((messages[0].line, messages[0].column), (3, 5));
        assert_eq!(messages[1].severity, Severity::Error);
        assert_eq!(messages[1].text, "expected ';' before '}' token");
        assert_eq!(messages[2].file, PathBuf::from("include/a.h"));
        assert_eq!((messages[2].line, messages[2].column), (1, 0));
        assert_eq!(messages[1].to_string(), "src/main.c:4:12: error: expected ';' before '}' token");
    }

    #[test]
    fn common_root_of_sources() {
        let paths = vec![
            PathBuf::from("/w/app/src/main.c"),
            PathBuf::from("/w/app/src/util/a.c"),
            PathBuf::from("/w/app/gen/b.c"),
        ];
        assert_eq!(common_root(&paths), PathBuf::from("/w/app"));
        assert_eq!(common_root(&paths[..1]), PathBuf::from("/w/app/src"));
        assert_eq!(common_root(&[]), PathBuf::new());
    }
}
