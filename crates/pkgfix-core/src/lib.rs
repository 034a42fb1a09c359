#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Materialize package dependency trees into `node_modules` layouts.
//!
//! Build a [`Project`] graph in memory (owned dependencies, dev-dependencies
//! and links to packages elsewhere on disk), then [`Project::write`] it. The
//! inverse, [`Project::from_dir`], reads an installed layout back.

pub mod bin;
pub mod config;
pub mod error;
pub mod fixture;
pub mod link;
pub mod linker;
pub mod manifest;
pub mod materialize;
pub mod project;
pub mod reconstruct;
pub mod resolve;
pub mod version;

pub use config::Config;
pub use error::{codes, Error, Result};
pub use fixture::{FixtureSpec, LinkSpec};
pub use link::{Link, ResolvedLink};
pub use linker::{HardLinker, StdHardLinker};
pub use manifest::Manifest;
pub use materialize::Materializer;
pub use pkgfix_util::{DirJson, FileEntry};
pub use project::{DepKind, DepSource, Dependency, Project, ProjectOptions, ProjectRef};
pub use reconstruct::ReadDirOptions;
pub use resolve::ResolutionCache;
pub use version::VERSION;
