//! Drives one packaging run from a validated request to a self-contained
//! application directory.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};

use crate::{
    compile::{Compiler, SystemCompiler},
    copy::{copy_tree, CopyStats, ExclusionSet},
    deps::{is_reserved, Resolver},
    error::{PackError, Result},
    launcher::{emit_launcher, LauncherArtifacts},
    manifest::{package_dir, PackageManifest, PACKAGE_STORAGE},
    request::PackagingRequest,
    runtime::{stage_runtime, RuntimeLayout, RuntimeReport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialized,
    StagingProject,
    StagingRuntime,
    ResolvingDependencies,
    StagingDependencies,
    EmittingLauncher,
    Compiling,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Initialized => "initialized",
            Stage::StagingProject => "staging project",
            Stage::StagingRuntime => "staging runtime",
            Stage::ResolvingDependencies => "resolving dependencies",
            Stage::StagingDependencies => "staging dependencies",
            Stage::EmittingLauncher => "emitting launcher",
            Stage::Compiling => "compiling launcher",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the launcher step left in the application directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherBuild {
    Compiled(PathBuf),
    /// Compilation was skipped or failed; the path is the C source.
    SourceOnly(PathBuf),
}

impl LauncherBuild {
    pub fn path(&self) -> &Path {
        match self {
            LauncherBuild::Compiled(p) | LauncherBuild::SourceOnly(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackOutcome {
    pub app_dir: PathBuf,
    pub entry: PathBuf,
    pub project: CopyStats,
    pub runtime: RuntimeReport,
    /// Closure in resolution order, including packages missing on disk.
    pub dependencies: Vec<String>,
    pub missing_dependencies: Vec<String>,
    pub launcher: LauncherArtifacts,
    pub build: LauncherBuild,
}

pub struct Packager {
    request: PackagingRequest,
    compiler: Box<dyn Compiler>,
    stage: Stage,
}

impl Packager {
    /// Uses the system C compiler configured in the request.
    pub fn new(request: PackagingRequest) -> Self {
        let compiler = SystemCompiler::for_target(request.platform(), request.launcher());
        Self {
            request,
            compiler: Box::new(compiler),
            stage: Stage::Initialized,
        }
    }

    pub fn with_compiler(mut self, compiler: impl Compiler + 'static) -> Self {
        self.compiler = Box::new(compiler);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn request(&self) -> &PackagingRequest {
        &self.request
    }

    /// Run every stage in order. On error the packager ends in
    /// [`Stage::Failed`] and the original error is returned.
    pub fn run(&mut self) -> Result<PackOutcome> {
        if self.stage.is_terminal() {
            return Err(PackError::Configuration(format!(
                "packager already finished ({})",
                self.stage
            )));
        }

        match self.run_stages() {
            Ok(outcome) => {
                self.enter(Stage::Done);
                Ok(outcome)
            }
            Err(e) => {
                error!(stage = %self.stage, error = %e, "packaging failed");
                self.stage = Stage::Failed;
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        info!(app = %self.request.app_name(), "{stage}");
        self.stage = stage;
    }

    fn run_stages(&mut self) -> Result<PackOutcome> {
        let app_dir = self.request.app_dir();
        let source_root = self.request.source_root().to_path_buf();
        let lookup_root = source_root.join(PACKAGE_STORAGE);

        self.enter(Stage::StagingProject);
        reset_dir(&app_dir)?;
        let project = copy_tree(&source_root, &app_dir, self.request.exclusions())?;

        self.enter(Stage::StagingRuntime);
        let layout = RuntimeLayout::new(self.request.platform(), self.request.runtime());
        let runtime = stage_runtime(&lookup_root, &app_dir, &layout)?;

        self.enter(Stage::ResolvingDependencies);
        let namespace = self.request.runtime().namespace.clone();
        let direct = self.direct_dependencies(&namespace);
        let closure = Resolver::new(&lookup_root)
            .with_namespace(namespace)
            .resolve(direct.iter().map(String::as_str));
        let dependencies: Vec<String> = closure.iter().map(str::to_string).collect();
        info!(direct = direct.len(), total = dependencies.len(), "dependency closure resolved");

        self.enter(Stage::StagingDependencies);
        let missing_dependencies = stage_dependencies(&lookup_root, &app_dir, &dependencies)?;

        self.enter(Stage::EmittingLauncher);
        let launcher = emit_launcher(
            &app_dir,
            self.request.app_name(),
            self.request.entry_file(),
            self.request.platform(),
        )?;

        let build = if self.request.launcher().compile {
            self.enter(Stage::Compiling);
            match self.compiler.compile(&launcher.source, &launcher.binary) {
                Ok(()) => {
                    info!(binary = %launcher.binary.display(), "launcher compiled");
                    LauncherBuild::Compiled(launcher.binary.clone())
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        source = %launcher.source.display(),
                        "launcher compilation failed; compile the source manually or use the startup script"
                    );
                    LauncherBuild::SourceOnly(launcher.source.clone())
                }
            }
        } else {
            info!("launcher compilation disabled");
            LauncherBuild::SourceOnly(launcher.source.clone())
        };

        Ok(PackOutcome {
            app_dir,
            entry: self.request.entry_file().to_path_buf(),
            project,
            runtime,
            dependencies,
            missing_dependencies,
            launcher,
            build,
        })
    }

    /// Project manifest dependencies followed by requested extras, without
    /// the runtime's own namespace.
    fn direct_dependencies(&self, namespace: &str) -> Vec<String> {
        let source_root = self.request.source_root();
        let mut names: Vec<String> = match PackageManifest::load_from_dir(source_root) {
            Ok(Some(m)) => m.dependency_names().map(str::to_string).collect(),
            Ok(None) => {
                warn!(dir = %source_root.display(), "project has no package.json; only extra modules are staged");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "project manifest unusable; only extra modules are staged");
                Vec::new()
            }
        };

        for extra in self.request.extra_packages() {
            if !names.contains(extra) {
                names.push(extra.clone());
            }
        }

        names.retain(|n| !is_reserved(n, namespace));
        names
    }
}

/// Empty `dir`, creating it if needed.
fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| PackError::io(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| PackError::io(dir, e))
}

/// Copy each package directory into the application's package storage.
/// Returns the names that had no directory under `lookup_root`.
fn stage_dependencies(lookup_root: &Path, app_dir: &Path, names: &[String]) -> Result<Vec<String>> {
    let storage = app_dir.join(PACKAGE_STORAGE);
    let mut missing = Vec::new();

    for name in names {
        let src = package_dir(lookup_root, name);
        if !src.is_dir() {
            warn!(package = %name, path = %src.display(), "dependency not found on disk");
            missing.push(name.clone());
            continue;
        }
        let stats = copy_tree(&src, &package_dir(&storage, name), &ExclusionSet::new())?;
        info!(package = %name, files = stats.files, "dependency staged");
    }

    Ok(missing)
}
