use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    config::{LauncherSettings, PackOptions, Platform, RuntimeSettings, DEFAULT_MAIN_FILE},
    copy::{relative_key, ExclusionSet},
    error::{PackError, Result},
    manifest::{is_valid_package_name, PackageManifest},
};

/// Validated, immutable input for one packaging run.
#[derive(Debug, Clone)]
pub struct PackagingRequest {
    app_name: String,
    source_root: PathBuf,
    output_root: PathBuf,
    entry_file: PathBuf,
    extra_packages: Vec<String>,
    exclusions: ExclusionSet,
    platform: Platform,
    runtime: RuntimeSettings,
    launcher: LauncherSettings,
}

impl PackagingRequest {
    /// Checks everything that can be checked before touching the output tree.
    /// The output root itself is created here so it can be canonicalized.
    pub fn validate(opts: PackOptions) -> Result<Self> {
        let app_name = validate_app_name(&opts.app_name)?;

        let source_root = dunce::canonicalize(&opts.source_dir).map_err(|e| {
            PackError::Configuration(format!(
                "source directory {} is not accessible: {e}",
                opts.source_dir.display()
            ))
        })?;
        if !source_root.is_dir() {
            return Err(PackError::Configuration(format!(
                "source path {} is not a directory",
                source_root.display()
            )));
        }

        let entry_raw = match opts.main_file.clone() {
            Some(m) => m,
            None => entry_from_manifest(&source_root),
        };
        let entry_file = normalize_entry(&entry_raw)?;
        if !source_root.join(&entry_file).is_file() {
            return Err(PackError::Configuration(format!(
                "entry file '{}' not found in {}",
                entry_raw,
                source_root.display()
            )));
        }

        if !is_valid_package_name(&opts.runtime.namespace) {
            return Err(PackError::Configuration(format!(
                "runtime namespace '{}' is not a valid package name",
                opts.runtime.namespace
            )));
        }

        // Removed again if validation fails below.
        let created = first_missing_ancestor(&opts.output_dir);
        fs::create_dir_all(&opts.output_dir).map_err(|e| PackError::io(&opts.output_dir, e))?;

        let checked = Self::with_output(opts, app_name, source_root, entry_file);
        if checked.is_err() {
            if let Some(dir) = created {
                if let Err(e) = fs::remove_dir_all(&dir) {
                    warn!(dir = %dir.display(), error = %e, "could not remove output directory");
                }
            }
        }
        checked
    }

    fn with_output(
        opts: PackOptions,
        app_name: String,
        source_root: PathBuf,
        entry_file: PathBuf,
    ) -> Result<Self> {
        let output_root =
            dunce::canonicalize(&opts.output_dir).map_err(|e| PackError::io(&opts.output_dir, e))?;

        let app_dir = output_root.join(&app_name);
        if source_root.starts_with(&app_dir) {
            return Err(PackError::Configuration(format!(
                "application directory {} would contain the source directory {}",
                app_dir.display(),
                source_root.display()
            )));
        }

        let mut exclusions = ExclusionSet::project_defaults();
        for e in &opts.exclude {
            exclusions.push(e);
        }
        if let Ok(rel) = output_root.strip_prefix(&source_root) {
            let key = if rel.as_os_str().is_empty() {
                app_name.clone()
            } else {
                relative_key(rel)
            };
            debug!(exclusion = %key, "output directory is inside the source tree");
            exclusions.push(key);
        }

        let entry_key = relative_key(&entry_file);
        if exclusions.is_excluded(&entry_key) {
            return Err(PackError::Configuration(format!(
                "entry file '{entry_key}' lies under an excluded path"
            )));
        }

        Ok(Self {
            app_name,
            source_root,
            output_root,
            entry_file,
            extra_packages: opts.extra_packages,
            exclusions,
            platform: opts.platform,
            runtime: opts.runtime,
            launcher: opts.launcher,
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `outputRoot/appName`.
    pub fn app_dir(&self) -> PathBuf {
        self.output_root.join(&self.app_name)
    }

    /// Relative to the source root; contains only normal components.
    pub fn entry_file(&self) -> &Path {
        &self.entry_file
    }

    pub fn extra_packages(&self) -> &[String] {
        &self.extra_packages
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub fn launcher(&self) -> &LauncherSettings {
        &self.launcher
    }
}

/// Outermost directory of `path` that does not exist yet.
fn first_missing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .last()
        .map(Path::to_path_buf)
}

fn validate_app_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(PackError::Configuration(format!(
            "invalid application name '{raw}'"
        )));
    }
    Ok(name.to_string())
}

fn entry_from_manifest(source_root: &Path) -> String {
    match PackageManifest::load_from_dir(source_root) {
        Ok(Some(m)) => m.main.unwrap_or_else(|| DEFAULT_MAIN_FILE.to_string()),
        Ok(None) => DEFAULT_MAIN_FILE.to_string(),
        Err(e) => {
            warn!(error = %e, "could not read project manifest for entry file");
            DEFAULT_MAIN_FILE.to_string()
        }
    }
}

fn normalize_entry(raw: &str) -> Result<PathBuf> {
    let unified = raw.trim().replace('\\', "/");
    let mut out = PathBuf::new();
    for c in Path::new(&unified).components() {
        match c {
            Component::Normal(s) => out.push(s),
            Component::CurDir => {}
            _ => {
                return Err(PackError::Configuration(format!(
                    "entry file '{raw}' must be a relative path inside the source directory"
                )))
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(PackError::Configuration("entry file is empty".to_string()));
    }
    Ok(out)
}
