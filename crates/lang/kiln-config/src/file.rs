//! The group/key/value model and its resolver.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ast::{Expr, Literal, Statement};
use crate::error::{ConfigError, Diagnostic};
use crate::eval::{self, Scope};
use crate::lexer::{self, Span};
use crate::parser::Parser;
use crate::subst::{self, Piece};

/// Nesting limit for `$(...)` references and key lookups made by conditions.
pub const MAX_REFERENCE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Pending,
    InProgress,
    Done(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Unknown,
    Evaluating,
    Known(bool),
}

/// One candidate value for a key.
#[derive(Debug, Clone)]
struct Value {
    group: String,
    key: String,
    raw: String,
    /// All must hold for the value to be active.
    conditions: Arc<[Expr]>,
    origin: Option<Span>,
    text: Resolution,
    active: Activity,
}

impl Value {
    fn reset(&mut self) {
        self.text = Resolution::Pending;
        self.active = Activity::Unknown;
    }

    fn name(&self) -> String {
        if self.group.is_empty() {
            self.key.clone()
        } else {
            format!("{}.{}", self.group, self.key)
        }
    }
}

/// Text substituted for a reference that cannot be resolved.
pub fn placeholder(token: &str) -> String {
    format!("[unresolved:{token}]")
}

/// A parsed config file.
///
/// Values live in one arena in declaration order; each group maps its keys
/// to the arena indices of their values. Call [`resolve`](Self::resolve)
/// after parsing or mutating before querying values.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    groups: BTreeMap<String, BTreeMap<String, Vec<usize>>>,
    values: Vec<Value>,
    diagnostics: Vec<Diagnostic>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFile {
    /// An empty model holding only the global group.
    pub fn new() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(String::new(), BTreeMap::new());
        Self {
            path: PathBuf::new(),
            groups,
            values: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Read and parse the file at `path`, replacing the current model.
    pub fn parse(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_source(&source, path)
    }

    /// Parse `source` as if it had been read from `path`, replacing the
    /// current model.
    pub fn parse_source(&mut self, source: &str, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref().to_path_buf();
        let tokens = lexer::tokenize(source, path.clone())?;
        let statements = Parser::new(tokens, path.clone()).parse()?;

        *self = Self::new();
        self.path = path;
        for statement in statements {
            match statement {
                Statement::Group { name, .. } => {
                    self.groups.entry(name).or_default();
                }
                Statement::Assignment { group, key, value, conditions, span } => {
                    self.push_value(group, key, value, conditions.into(), Some(span));
                }
            }
        }
        Ok(())
    }

    /// Append an unconditional value, creating the group and key if needed.
    pub fn set_or_add_value(&mut self, group: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        if subst::is_unterminated(value) {
            return Err(ConfigError::UnterminatedInjected {
                group: group.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        self.push_value(group.to_string(), key.to_string(), value.to_string(), Arc::from([]), None);
        Ok(())
    }

    /// Append every value of `other` after this file's values for the same
    /// key. Resolution state is not carried over.
    pub fn merge(&mut self, other: &ConfigFile) {
        for (group, keys) in &other.groups {
            self.groups.entry(group.clone()).or_default();
            for (key, ids) in keys {
                for &id in ids {
                    let v = &other.values[id];
                    self.push_value(
                        group.clone(),
                        key.clone(),
                        v.raw.clone(),
                        Arc::clone(&v.conditions),
                        v.origin.clone(),
                    );
                }
            }
        }
    }

    /// Substitute references and evaluate conditions for every value.
    ///
    /// Clears the previous resolution first, so calling this twice yields
    /// the same results. Problems are recorded in
    /// [`diagnostics`](Self::diagnostics).
    pub fn resolve(&mut self) {
        self.diagnostics.clear();
        for value in &mut self.values {
            value.reset();
        }
        for id in 0..self.values.len() {
            self.text_of(id, 0);
            self.is_active(id, 0);
        }
    }

    /// Resolved text of every active value of `group.key`, in declaration
    /// order. Empty if the key is absent or nothing is active.
    pub fn get_values(&self, group: &str, key: &str) -> Vec<&str> {
        let Some(ids) = self.groups.get(group).and_then(|keys| keys.get(key)) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|&id| {
                let v = &self.values[id];
                match (&v.active, &v.text) {
                    (Activity::Known(true), Resolution::Done(text)) => Some(text.as_str()),
                    _ => None,
                }
            })
            .collect()
    }

    /// The first active value of `group.key`.
    pub fn get_value(&self, group: &str, key: &str) -> Option<&str> {
        self.get_values(group, key).into_iter().next()
    }

    /// Group names, global group (`""`) first.
    pub fn groups(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Key names declared in `group`.
    pub fn keys(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(group)
            .map(|keys| keys.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Warnings from the last [`resolve`](Self::resolve).
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The file this model was parsed from; empty for a built model.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn push_value(
        &mut self,
        group: String,
        key: String,
        raw: String,
        conditions: Arc<[Expr]>,
        origin: Option<Span>,
    ) {
        let id = self.values.len();
        self.groups
            .entry(group.clone())
            .or_default()
            .entry(key.clone())
            .or_default()
            .push(id);
        self.values.push(Value {
            group,
            key,
            raw,
            conditions,
            origin,
            text: Resolution::Pending,
            active: Activity::Unknown,
        });
    }

    fn diagnose(&mut self, id: usize, message: String) {
        let diagnostic = Diagnostic { message, location: self.values[id].origin.clone() };
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    /// Find the values a reference names: `group.key` explicitly, otherwise
    /// a bare key in `scope` and then in the global group.
    fn lookup(&self, token: &str, scope: &str) -> Option<Vec<usize>> {
        if let Some((group, key)) = token.split_once('.') {
            if let Some(ids) = self.groups.get(group).and_then(|keys| keys.get(key)) {
                return Some(ids.clone());
            }
        }
        self.groups
            .get(scope)
            .and_then(|keys| keys.get(token))
            .or_else(|| self.groups.get("").and_then(|keys| keys.get(token)))
            .cloned()
    }

    fn first_active(&mut self, ids: &[usize], depth: usize) -> Option<String> {
        for &id in ids {
            if self.is_active(id, depth) {
                return Some(self.text_of(id, depth));
            }
        }
        None
    }

    fn is_active(&mut self, id: usize, depth: usize) -> bool {
        match self.values[id].active {
            Activity::Known(active) => return active,
            Activity::Evaluating => {
                let value = &self.values[id];
                let condition = value
                    .conditions
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" and ");
                let name = value.name();
                self.diagnose(id, format!("condition ({condition}) on {name} depends on its own value"));
                return false;
            }
            Activity::Unknown => {}
        }
        if depth > MAX_REFERENCE_DEPTH {
            let name = self.values[id].name();
            self.diagnose(id, format!("reference depth exceeded while evaluating {name}"));
            return false;
        }

        self.values[id].active = Activity::Evaluating;
        let conditions = Arc::clone(&self.values[id].conditions);
        let group = self.values[id].group.clone();
        let mut scope = ValueScope { file: self, group: &group, origin: id, depth: depth + 1 };
        let active = conditions.iter().all(|cond| eval::evaluate(cond, &mut scope));
        self.values[id].active = Activity::Known(active);
        active
    }

    fn text_of(&mut self, id: usize, depth: usize) -> String {
        match &self.values[id].text {
            Resolution::Done(text) => return text.clone(),
            Resolution::InProgress => {
                let name = self.values[id].name();
                self.diagnose(id, format!("cyclic reference through {name}"));
                return placeholder(&name);
            }
            Resolution::Pending => {}
        }
        if depth > MAX_REFERENCE_DEPTH {
            let name = self.values[id].name();
            self.diagnose(id, format!("reference depth exceeded while expanding {name}"));
            return placeholder(&name);
        }

        self.values[id].text = Resolution::InProgress;
        let raw = self.values[id].raw.clone();
        let group = self.values[id].group.clone();
        let text = self.substitute(&raw, &group, id, depth + 1);
        self.values[id].text = Resolution::Done(text.clone());
        text
    }

    /// Replace every `$(token)` in `text`. Substituted text is not rescanned.
    fn substitute(&mut self, text: &str, scope: &str, origin: usize, depth: usize) -> String {
        // Unterminated references are rejected when values enter the model.
        let Ok(pieces) = subst::split(text) else {
            return text.to_string();
        };
        let mut out = String::with_capacity(text.len());
        for piece in pieces {
            match piece {
                Piece::Text(s) => out.push_str(s),
                Piece::Reference(token) => {
                    let resolved = self
                        .lookup(token, scope)
                        .and_then(|ids| self.first_active(&ids, depth));
                    if let Some(value) = resolved {
                        out.push_str(&value);
                    } else {
                        self.diagnose(origin, format!("unresolved reference $({token})"));
                        out.push_str(&placeholder(token));
                    }
                }
            }
        }
        out
    }
}

/// Evaluation scope of one value: references resolve relative to its group.
struct ValueScope<'a> {
    file: &'a mut ConfigFile,
    group: &'a str,
    origin: usize,
    depth: usize,
}

impl Scope for ValueScope<'_> {
    fn literal(&mut self, literal: &Literal) -> String {
        match literal {
            // A bare word that names no key stands for itself.
            Literal::Reference(name) => match self.file.lookup(name, self.group) {
                Some(ids) => self.file.first_active(&ids, self.depth).unwrap_or_default(),
                None => name.clone(),
            },
            Literal::Str(s) => self.file.substitute(s, self.group, self.origin, self.depth),
        }
    }
}
