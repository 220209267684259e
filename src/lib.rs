pub mod cli;
pub mod compile;
pub mod config;
pub mod context;
pub mod copy;
pub mod deps;
pub mod emit;
pub mod error;
pub mod launcher;
pub mod manifest;
pub mod package;
pub mod report;
pub mod request;
pub mod runtime;
pub mod templates;

pub use compile::{Compiler, SystemCompiler};
pub use config::{PackOptions, Platform};
pub use context::ContextEnv;
pub use copy::{copy_tree, ExclusionSet};
pub use deps::{DependencyClosure, Resolver};
pub use error::{CompileError, PackError};
pub use launcher::{emit_launcher, LauncherArtifacts};
pub use package::{LauncherBuild, PackOutcome, Packager, Stage};
pub use request::PackagingRequest;
pub use runtime::{stage_runtime, RuntimeLayout};
