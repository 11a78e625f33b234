//! Generated version sources.
//!
//! A project that sets both `ProductInfo.VersionHpp` and
//! `ProductInfo.VersionCpp` gets a header declaring its version constants
//! and a source file defining them:
//!
//! ```text
//! DAY MONTH YEAR HOUR MINUTE SECOND   last change, UTC
//! CHANGELIST FULLVERSION_STRING       ProductInfo.Version
//! TOTAL_CHANGELISTS                   always 0 without source control
//! ```
//!
//! The last change is the project file's modification time, so the files
//! only change when the project does. They are rewritten only when their
//! contents differ, which keeps an unchanged project up to date.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::workspace::{Language, ProjectFile, VersionSource};

/// Version numbers exported to generated sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Changelist identifier; the declared version without source control.
    pub changelist: String,
    /// Display form of the version.
    pub short_string: String,
    /// When the version last changed.
    pub last_change: DateTime<Utc>,
    /// Number of changelists in the history.
    pub total_changelists: u64,
}

enum Kind {
    Text,
    Number,
}

impl VersionInfo {
    /// Version of `project` as declared in its `ProductInfo` group.
    pub fn for_project(project: &ProjectFile) -> Result<Self> {
        match project.version_source {
            VersionSource::None => {}
            VersionSource::SourceControl => bail!(
                "project '{}': ProductInfo.VersionSource = SourceControl is not supported",
                project.name
            ),
        }
        let modified = fs::metadata(&project.path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let changelist = project.version.clone().unwrap_or_default();
        Ok(Self {
            short_string: changelist.clone(),
            changelist,
            last_change: DateTime::<Utc>::from(modified),
            total_changelists: 0,
        })
    }

    fn entries(&self) -> [(&'static str, Kind, String); 9] {
        let t = &self.last_change;
        [
            ("DAY", Kind::Text, t.day().to_string()),
            ("MONTH", Kind::Text, t.month().to_string()),
            ("YEAR", Kind::Text, t.year().to_string()),
            ("HOUR", Kind::Text, t.hour().to_string()),
            ("MINUTE", Kind::Text, t.minute().to_string()),
            ("SECOND", Kind::Text, t.second().to_string()),
            ("CHANGELIST", Kind::Text, self.changelist.clone()),
            ("FULLVERSION_STRING", Kind::Text, self.short_string.clone()),
            ("TOTAL_CHANGELISTS", Kind::Number, self.total_changelists.to_string()),
        ]
    }

    /// Header declaring the constants. C++ gets a `VersionInfo` class with
    /// static members; C gets `VersionInfo_`-prefixed externs.
    pub fn header(&self, language: Language) -> String {
        let mut out = String::from(BANNER);
        out.push_str("#pragma once\n\n");
        match language {
            Language::Cpp => {
                out.push_str("class VersionInfo\n{\npublic:\n");
                for (name, kind, _) in self.entries() {
                    let _ = writeln!(out, "    static const {} {name};", type_name(&kind));
                }
                out.push_str("};\n");
            }
            Language::C => {
                for (name, kind, _) in self.entries() {
                    let _ = writeln!(out, "extern const {} VersionInfo_{name};", type_name(&kind));
                }
            }
        }
        out
    }

    /// Source defining the constants; `header_name` is what it includes.
    pub fn source(&self, language: Language, header_name: &str) -> String {
        let mut out = String::from(BANNER);
        let _ = writeln!(out, "#include \"{header_name}\"\n");
        for (name, kind, value) in self.entries() {
            let value = match kind {
                Kind::Text => format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")),
                Kind::Number => value,
            };
            let qualified = match language {
                Language::Cpp => format!("VersionInfo::{name}"),
                Language::C => format!("VersionInfo_{name}"),
            };
            let _ = writeln!(out, "const {} {qualified} = {value};", type_name(&kind));
        }
        out
    }
}

const BANNER: &str = "// Automatically generated by kiln, do not modify directly.\n\n";

fn type_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Text => "char*",
        Kind::Number => "long",
    }
}

/// Write the version header and source of `project`, if it declares them.
///
/// Returns whether either file was created or changed.
pub fn write_version_files(project: &ProjectFile) -> Result<bool> {
    let (header, source) = match (&project.version_header, &project.version_source_file) {
        (None, None) => return Ok(false),
        (Some(header), Some(source)) => (header, source),
        _ => bail!(
            "project '{}': ProductInfo.VersionHpp and ProductInfo.VersionCpp must be set together",
            project.name
        ),
    };

    let info = VersionInfo::for_project(project)?;
    let header_name = header
        .file_name()
        .with_context(|| format!("invalid version header path {}", header.display()))?
        .to_string_lossy()
        .into_owned();

    let wrote_header = write_if_changed(header, &info.header(project.language))?;
    let wrote_source = write_if_changed(source, &info.source(project.language, &header_name))?;
    Ok(wrote_header || wrote_source)
}

fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == contents) {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}
