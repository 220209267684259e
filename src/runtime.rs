//! Stages the GUI runtime: qode binary, the reserved package namespace, the
//! miniqt shared libraries and plugins, and a `qt.conf` pointing Qt at the
//! application directory.

use regex::Regex;
use semver::Version;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::{
    config::{Platform, RuntimeSettings},
    copy::{copy_tree, ExclusionSet},
    error::{PackError, Result},
    manifest::{package_dir, PACKAGE_STORAGE},
};

pub const RUNTIME_BINARY_STEM: &str = "qode";
pub const PLUGIN_DIRS: &[&str] = &["platforms", "styles", "imageformats"];
pub const PLUGIN_CONFIG_FILE: &str = "qt.conf";
pub const PLUGIN_CONFIG: &str = "[Paths]\nPrefix = .\nPlugins = .\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    RuntimeBinary,
    RuntimeNamespace,
    SharedLibraries,
    Plugin(String),
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::RuntimeBinary => f.write_str("runtime binary"),
            AssetKind::RuntimeNamespace => f.write_str("runtime package namespace"),
            AssetKind::SharedLibraries => f.write_str("shared libraries"),
            AssetKind::Plugin(name) => write!(f, "{name} plugins"),
        }
    }
}

#[derive(Debug, Clone)]
enum Transfer {
    File,
    Tree,
    /// Flat copy of the files in a directory whose names match.
    Libraries(Regex),
}

#[derive(Debug, Clone)]
pub struct RuntimeAsset {
    pub kind: AssetKind,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub requirement: Requirement,
    transfer: Transfer,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeReport {
    pub staged: Vec<AssetKind>,
    pub skipped: Vec<AssetKind>,
    pub libraries: usize,
    pub qt_version: Option<String>,
}

/// Where the runtime pieces live for one target platform.
#[derive(Debug, Clone)]
pub struct RuntimeLayout {
    platform: Platform,
    namespace: String,
    qt_version: Option<String>,
}

impl RuntimeLayout {
    pub fn new(platform: Platform, settings: &RuntimeSettings) -> Self {
        Self {
            platform,
            namespace: settings.namespace.clone(),
            qt_version: settings.qt_version.clone(),
        }
    }

    pub fn runtime_binary_name(&self) -> String {
        self.platform.executable_name(RUNTIME_BINARY_STEM)
    }

    pub fn namespace_dir(&self, lookup_root: &Path) -> PathBuf {
        package_dir(lookup_root, &self.namespace)
    }

    pub fn runtime_binary_source(&self, lookup_root: &Path) -> PathBuf {
        self.namespace_dir(lookup_root)
            .join("qode")
            .join("binaries")
            .join(self.runtime_binary_name())
    }

    pub fn miniqt_root(&self, lookup_root: &Path) -> PathBuf {
        self.namespace_dir(lookup_root).join("nodegui").join("miniqt")
    }

    fn library_subdir(&self) -> &'static str {
        match self.platform {
            Platform::Windows => "bin",
            Platform::Linux | Platform::Mac => "lib",
        }
    }

    fn library_pattern(&self) -> Result<Regex> {
        let pattern = match self.platform {
            Platform::Windows => r"(?i)\.dll$",
            Platform::Linux => r"\.so(\.\d+)*$",
            Platform::Mac => r"\.dylib$",
        };
        Regex::new(pattern).map_err(|e| PackError::Configuration(e.to_string()))
    }

    /// Every asset to stage, in order. Shared-library assets are only planned
    /// when a miniqt prefix was found.
    pub fn plan(&self, lookup_root: &Path, app_dir: &Path) -> Result<(Vec<RuntimeAsset>, Option<String>)> {
        // The runtime binary lives inside the namespace, so the namespace comes first.
        let mut assets = vec![
            RuntimeAsset {
                kind: AssetKind::RuntimeNamespace,
                source: self.namespace_dir(lookup_root),
                dest: package_dir(&app_dir.join(PACKAGE_STORAGE), &self.namespace),
                requirement: Requirement::Required,
                transfer: Transfer::Tree,
            },
            RuntimeAsset {
                kind: AssetKind::RuntimeBinary,
                source: self.runtime_binary_source(lookup_root),
                dest: app_dir.join(self.runtime_binary_name()),
                requirement: Requirement::Required,
                transfer: Transfer::File,
            },
        ];

        let Some((version, prefix)) = self.locate_qt_prefix(lookup_root) else {
            return Ok((assets, None));
        };

        assets.push(RuntimeAsset {
            kind: AssetKind::SharedLibraries,
            source: prefix.join(self.library_subdir()),
            dest: app_dir.to_path_buf(),
            requirement: Requirement::Optional,
            transfer: Transfer::Libraries(self.library_pattern()?),
        });
        for dir in PLUGIN_DIRS {
            assets.push(RuntimeAsset {
                kind: AssetKind::Plugin(dir.to_string()),
                source: prefix.join("plugins").join(dir),
                dest: app_dir.join(dir),
                requirement: Requirement::Optional,
                transfer: Transfer::Tree,
            });
        }

        Ok((assets, Some(version)))
    }

    /// `(version, prefix)` of the miniqt install to take libraries from.
    fn locate_qt_prefix(&self, lookup_root: &Path) -> Option<(String, PathBuf)> {
        let root = self.miniqt_root(lookup_root);
        let versions = list_dirs(&root);

        let version = match &self.qt_version {
            Some(pinned) if versions.iter().any(|v| v == pinned) => pinned.clone(),
            Some(pinned) => {
                warn!(version = %pinned, root = %root.display(), "pinned qt version is not installed");
                return None;
            }
            None => {
                if versions.len() > 1 {
                    debug!(candidates = ?versions, "several qt versions installed");
                }
                select_version(&versions)?
            }
        };

        let version_dir = root.join(&version);
        let has_layout = |dir: &Path| {
            dir.join(self.library_subdir()).is_dir() || dir.join("plugins").is_dir()
        };
        if has_layout(&version_dir) {
            return Some((version, version_dir));
        }

        // Qt ships per-compiler subdirectories, e.g. miniqt/6.4.1/msvc2019_64.
        let prefix = list_dirs(&version_dir)
            .into_iter()
            .map(|name| version_dir.join(name))
            .find(|p| has_layout(p));

        match prefix {
            Some(prefix) => Some((version, prefix)),
            None => {
                warn!(dir = %version_dir.display(), "qt install has no bin/lib/plugins directory");
                None
            }
        }
    }
}

fn list_dirs(root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut out: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    out.sort();
    out
}

/// Highest version wins. Names that do not parse as versions rank below all
/// versions, then lexically.
pub fn select_version(names: &[String]) -> Option<String> {
    names
        .iter()
        .max_by(|a, b| (parse_version(a), *a).cmp(&(parse_version(b), *b)))
        .cloned()
}

fn parse_version(name: &str) -> Option<Version> {
    let trimmed = name.strip_prefix('v').unwrap_or(name);
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }

    let mut parts: Vec<&str> = trimmed.split('.').collect();
    let numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if !numeric || parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&parts.join(".")).ok()
}

/// Copy the runtime into `app_dir`. Missing required assets abort; missing
/// optional ones are logged and recorded as skipped.
pub fn stage_runtime(lookup_root: &Path, app_dir: &Path, layout: &RuntimeLayout) -> Result<RuntimeReport> {
    let (assets, qt_version) = layout.plan(lookup_root, app_dir)?;
    let mut report = RuntimeReport {
        qt_version,
        ..RuntimeReport::default()
    };

    if report.qt_version.is_none() {
        warn!(
            root = %layout.miniqt_root(lookup_root).display(),
            "no qt shared-library bundle found; skipping libraries and plugins"
        );
        report.skipped.push(AssetKind::SharedLibraries);
        report
            .skipped
            .extend(PLUGIN_DIRS.iter().map(|d| AssetKind::Plugin(d.to_string())));
    }

    if let Some(missing) = assets
        .iter()
        .find(|a| a.requirement == Requirement::Required && !a.source.exists())
    {
        return Err(PackError::MandatoryAssetMissing {
            asset: missing.kind.to_string(),
            path: missing.source.clone(),
        });
    }

    for asset in assets {
        if !asset.source.exists() {
            match asset.requirement {
                Requirement::Required => {
                    return Err(PackError::MandatoryAssetMissing {
                        asset: asset.kind.to_string(),
                        path: asset.source,
                    })
                }
                Requirement::Optional => {
                    warn!(asset = %asset.kind, path = %asset.source.display(), "optional runtime asset not found");
                    report.skipped.push(asset.kind);
                    continue;
                }
            }
        }

        match &asset.transfer {
            Transfer::File => {
                if let Some(parent) = asset.dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
                }
                fs::copy(&asset.source, &asset.dest).map_err(|e| PackError::io(&asset.source, e))?;
            }
            Transfer::Tree => {
                copy_tree(&asset.source, &asset.dest, &ExclusionSet::new())?;
            }
            Transfer::Libraries(re) => {
                report.libraries += copy_libraries(&asset.source, &asset.dest, re)?;
            }
        }
        debug!(asset = %asset.kind, from = %asset.source.display(), "staged runtime asset");
        report.staged.push(asset.kind);
    }

    let conf = app_dir.join(PLUGIN_CONFIG_FILE);
    fs::write(&conf, PLUGIN_CONFIG).map_err(|e| PackError::io(&conf, e))?;

    info!(
        staged = report.staged.len(),
        skipped = report.skipped.len(),
        libraries = report.libraries,
        "runtime staged"
    );
    Ok(report)
}

fn copy_libraries(src: &Path, dest: &Path, re: &Regex) -> Result<usize> {
    let mut entries: Vec<_> = fs::read_dir(src)
        .map_err(|e| PackError::io(src, e))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| PackError::io(src, e))?;
    entries.sort_by_key(|e| e.file_name());

    let mut copied = 0;
    for entry in entries {
        let name = entry.file_name();
        if !re.is_match(&name.to_string_lossy()) || !entry.path().is_file() {
            continue;
        }
        let target = dest.join(&name);
        fs::copy(entry.path(), &target).map_err(|e| PackError::io(entry.path(), e))?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, rel).unwrap();
    }

    fn windows_layout() -> RuntimeLayout {
        RuntimeLayout::new(Platform::Windows, &RuntimeSettings::default())
    }

    fn fake_runtime(lookup: &Path) {
        touch(lookup, "@nodegui/qode/binaries/qode.exe");
        touch(lookup, "@nodegui/nodegui/package.json");
        touch(lookup, "@nodegui/nodegui/miniqt/6.4.1/msvc2019_64/bin/Qt6Core.dll");
        touch(lookup, "@nodegui/nodegui/miniqt/6.4.1/msvc2019_64/bin/Qt6Gui.DLL");
        touch(lookup, "@nodegui/nodegui/miniqt/6.4.1/msvc2019_64/bin/qmake.exe");
        touch(
            lookup,
            "@nodegui/nodegui/miniqt/6.4.1/msvc2019_64/plugins/platforms/qwindows.dll",
        );
        touch(
            lookup,
            "@nodegui/nodegui/miniqt/6.4.1/msvc2019_64/plugins/styles/qwindowsvistastyle.dll",
        );
    }

    #[test]
    #[traced_test]
    fn stages_windows_runtime() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        let app = tmp.path().join("app");
        fs::create_dir_all(&app).unwrap();
        fake_runtime(&lookup);

        let report = stage_runtime(&lookup, &app, &windows_layout()).unwrap();

        assert!(app.join("qode.exe").is_file());
        assert!(app.join("node_modules/@nodegui/nodegui/package.json").is_file());
        assert!(app.join("Qt6Core.dll").is_file());
        assert!(app.join("Qt6Gui.DLL").is_file());
        assert!(!app.join("qmake.exe").exists());
        assert!(app.join("platforms/qwindows.dll").is_file());
        assert!(app.join("styles/qwindowsvistastyle.dll").is_file());
        assert!(!app.join("imageformats").exists());
        assert_eq!(
            fs::read_to_string(app.join(PLUGIN_CONFIG_FILE)).unwrap(),
            PLUGIN_CONFIG
        );

        assert_eq!(report.libraries, 2);
        assert_eq!(report.qt_version.as_deref(), Some("6.4.1"));
        assert_eq!(
            report.skipped,
            vec![AssetKind::Plugin("imageformats".to_string())]
        );
        assert!(logs_contain("optional runtime asset not found"));
    }

    #[test]
    fn missing_runtime_binary_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        touch(&lookup, "@nodegui/nodegui/package.json");

        let err = stage_runtime(&lookup, tmp.path(), &windows_layout()).unwrap_err();
        match err {
            PackError::MandatoryAssetMissing { asset, path } => {
                assert_eq!(asset, "runtime binary");
                assert!(path.ends_with("qode.exe"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_namespace_is_reported_as_namespace() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        let app = tmp.path().join("app");
        fs::create_dir_all(&lookup).unwrap();

        let err = stage_runtime(&lookup, &app, &windows_layout()).unwrap_err();
        match err {
            PackError::MandatoryAssetMissing { asset, path } => {
                assert_eq!(asset, "runtime package namespace");
                assert!(path.ends_with("@nodegui"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!app.join(PACKAGE_STORAGE).exists());
    }

    #[test]
    fn required_assets_are_checked_before_copying() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        let app = tmp.path().join("app");
        touch(&lookup, "@nodegui/nodegui/package.json");

        assert!(stage_runtime(&lookup, &app, &windows_layout()).is_err());
        assert!(!app.join("node_modules/@nodegui/nodegui/package.json").exists());
    }

    #[test]
    fn compiler_subdirectory_without_layout_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        touch(&lookup, "@nodegui/nodegui/miniqt/6.4.1/docs/readme.txt");
        touch(&lookup, "@nodegui/nodegui/miniqt/6.4.1/gcc_64/lib/libQt6Core.so.6");

        let layout = RuntimeLayout::new(Platform::Linux, &RuntimeSettings::default());
        let (assets, version) = layout.plan(&lookup, tmp.path()).unwrap();

        assert_eq!(version.as_deref(), Some("6.4.1"));
        let libs = assets
            .iter()
            .find(|a| a.kind == AssetKind::SharedLibraries)
            .unwrap();
        assert!(libs.source.ends_with("gcc_64/lib"));
    }

    #[test]
    fn missing_qt_bundle_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        let app = tmp.path().join("app");
        touch(&lookup, "@nodegui/qode/binaries/qode");

        let layout = RuntimeLayout::new(Platform::Linux, &RuntimeSettings::default());
        let report = stage_runtime(&lookup, &app, &layout).unwrap();

        assert!(app.join("qode").is_file());
        assert!(report.qt_version.is_none());
        assert_eq!(report.skipped.len(), 1 + PLUGIN_DIRS.len());
    }

    #[test]
    fn linux_libraries_match_versioned_sonames() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        let app = tmp.path().join("app");
        touch(&lookup, "@nodegui/qode/binaries/qode");
        touch(&lookup, "@nodegui/nodegui/miniqt/5.15.2/lib/libQt5Core.so.5.15.2");
        touch(&lookup, "@nodegui/nodegui/miniqt/5.15.2/lib/libicu.so");
        touch(&lookup, "@nodegui/nodegui/miniqt/5.15.2/lib/libQt5Core.prl");

        let layout = RuntimeLayout::new(Platform::Linux, &RuntimeSettings::default());
        let report = stage_runtime(&lookup, &app, &layout).unwrap();

        assert_eq!(report.libraries, 2);
        assert!(app.join("libQt5Core.so.5.15.2").is_file());
        assert!(!app.join("libQt5Core.prl").exists());
    }

    #[test]
    fn pinned_version_is_honored() {
        let tmp = TempDir::new().unwrap();
        let lookup = tmp.path().join("node_modules");
        touch(&lookup, "@nodegui/nodegui/miniqt/5.15.2/lib/libold.so");
        touch(&lookup, "@nodegui/nodegui/miniqt/6.4.1/lib/libnew.so");

        let settings = RuntimeSettings {
            qt_version: Some("5.15.2".to_string()),
            ..RuntimeSettings::default()
        };
        let layout = RuntimeLayout::new(Platform::Linux, &settings);
        let (_, version) = layout.plan(&lookup, tmp.path()).unwrap();
        assert_eq!(version.as_deref(), Some("5.15.2"));

        let unpinned = RuntimeLayout::new(Platform::Linux, &RuntimeSettings::default());
        let (_, version) = unpinned.plan(&lookup, tmp.path()).unwrap();
        assert_eq!(version.as_deref(), Some("6.4.1"));
    }

    #[test]
    fn version_selection_is_numeric() {
        let names: Vec<String> = ["5.15.2", "6.10", "6.4.1", "latest", "v6.9.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(select_version(&names).as_deref(), Some("6.10"));

        let junk = vec!["b".to_string(), "a".to_string()];
        assert_eq!(select_version(&junk).as_deref(), Some("b"));
        assert_eq!(select_version(&[]), None);
    }
}
