//! The kiln configuration language.
//!
//! Workspace and project descriptions are written as groups of keys, where
//! each key may carry several candidate values guarded by `if`/`else`
//! conditions:
//!
//! ```text
//! [Project]
//! Name = "MyApp"
//! if (Platform == "x64") {
//!     Define = "IS_64BIT"
//! } else {
//!     Define = "IS_32BIT"
//! }
//! ```
//!
//! Values may reference other keys with `$(Key)` or `$(Group.Key)`. Nothing
//! is substituted or evaluated until [`ConfigFile::resolve`] runs, so values
//! injected after parsing (command-line overrides, merged workspace
//! defaults) take part in resolution like any other.
//!
//! # Pipeline
//!
//! - [`lexer`] turns text into tokens carrying file, line and column
//! - [`parser`] builds flat [`ast::Statement`]s, tagging every assignment
//!   with the conditions open at its declaration
//! - [`eval`] evaluates condition expressions
//! - [`ConfigFile`] owns the model and resolves it lazily, detecting cycles
//!
//! # Usage
//!
//! ```
//! use kiln_config::ConfigFile;
//!
//! let mut file = ConfigFile::new();
//! file.parse_source("[Build]\nOut = $(Root)/bin\n", "project.kiln").unwrap();
//! file.set_or_add_value("", "Root", "/src").unwrap();
//! file.resolve();
//! assert_eq!(file.get_value("Build", "Out"), Some("/src/bin"));
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

mod file;
mod subst;

pub use error::{ConfigError, Diagnostic};
pub use file::{ConfigFile, MAX_REFERENCE_DEPTH, placeholder};
