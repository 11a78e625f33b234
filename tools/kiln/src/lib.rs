//! kiln: incremental build orchestration for C and C++ workspaces.
//!
//! A workspace file lists projects; each project file declares its sources,
//! settings and dependencies in the kiln config language. Building a project
//! works out which sources changed since the last successful build, asks a
//! toolchain for compile and link tasks, and runs them on a job graph.
//!
//! Pipeline: load workspace → load projects → order dependencies →
//!           check staleness → schedule tasks → commit manifest.

pub mod builder;
pub mod cli;
pub mod command;
pub mod hash;
pub mod report;
pub mod state;
pub mod task;
pub mod toolchain;
pub mod version;
pub mod workspace;
