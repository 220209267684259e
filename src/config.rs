use clap::ValueEnum;
use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{
    context::ContextEnv,
    deps::RESERVED_NAMESPACE,
    error::{PackError, Result},
};

pub const PROJECT_CONFIG_FILE: &str = "nodepack.toml";
pub const DEFAULT_APP_NAME: &str = "NodeGUIApp";
pub const DEFAULT_OUTPUT_DIR: &str = "deploy";
pub const DEFAULT_MAIN_FILE: &str = "main.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    #[serde(alias = "macos")]
    #[value(alias = "macos")]
    Mac,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Linux
        }
    }

    pub fn is_windows(self) -> bool {
        matches!(self, Platform::Windows)
    }

    pub fn executable_name(self, stem: &str) -> String {
        match self {
            Platform::Windows => format!("{stem}.exe"),
            Platform::Linux | Platform::Mac => stem.to_string(),
        }
    }

    pub fn path_separator(self) -> char {
        match self {
            Platform::Windows => '\\',
            Platform::Linux | Platform::Mac => '/',
        }
    }

    /// Variable the dynamic loader searches for shared libraries.
    pub fn library_path_var(self) -> &'static str {
        match self {
            Platform::Windows => "PATH",
            Platform::Linux => "LD_LIBRARY_PATH",
            Platform::Mac => "DYLD_LIBRARY_PATH",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Mac => "mac",
        })
    }
}

// -------------------- config file --------------------

/// One layer of `nodepack.toml`. Every field is optional so layers can be stacked.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub target: TargetSection,

    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub launcher: LauncherSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default)]
    pub name: Option<String>,

    /// Entry file, relative to the source directory.
    #[serde(default)]
    pub main: Option<String>,

    /// Relative paths are taken from the source directory.
    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub modules: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct TargetSection {
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RuntimeSection {
    #[serde(default)]
    pub namespace: Option<String>,

    /// Pin the miniqt version instead of taking the highest installed one.
    #[serde(default)]
    pub qt_version: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LauncherSection {
    #[serde(default)]
    pub compile: Option<bool>,

    #[serde(default)]
    pub compiler: Option<String>,

    #[serde(default)]
    pub compiler_args: Option<Vec<String>>,
}

impl ConfigFile {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PackError::io(path, e))?;
        toml::from_str(&text).map_err(|source| PackError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Stack `self` on top of `lower`: scalars from `self` win, lists accumulate.
    pub fn layered_over(self, lower: ConfigFile) -> ConfigFile {
        let mut modules = lower.app.modules;
        modules.extend(self.app.modules);
        let mut exclude = lower.app.exclude;
        exclude.extend(self.app.exclude);

        ConfigFile {
            app: AppSection {
                name: self.app.name.or(lower.app.name),
                main: self.app.main.or(lower.app.main),
                output: self.app.output.or(lower.app.output),
                modules,
                exclude,
            },
            target: TargetSection {
                platform: self.target.platform.or(lower.target.platform),
            },
            runtime: RuntimeSection {
                namespace: self.runtime.namespace.or(lower.runtime.namespace),
                qt_version: self.runtime.qt_version.or(lower.runtime.qt_version),
            },
            launcher: LauncherSection {
                compile: self.launcher.compile.or(lower.launcher.compile),
                compiler: self.launcher.compiler.or(lower.launcher.compiler),
                compiler_args: self.launcher.compiler_args.or(lower.launcher.compiler_args),
            },
        }
    }
}

/// user config < project config < `overlay` (normally built from CLI flags).
pub fn load_layers(
    ctx: &ContextEnv,
    cli_config: Option<&Path>,
    source_dir: &Path,
    overlay: ConfigFile,
) -> Result<ConfigFile> {
    let mut merged = ConfigFile::default();

    if let Some(user) = ctx.user_config_path().filter(|p| p.is_file()) {
        debug!(path = %user.display(), "loading user config");
        merged = ConfigFile::load_from_path(&user)?.layered_over(merged);
    }

    if let Some(project) = ctx.locate_project_config(cli_config, source_dir)? {
        debug!(path = %project.display(), "loading project config");
        let mut layer = ConfigFile::load_from_path(&project)?;
        if let Some(out) = layer.app.output.take() {
            layer.app.output = Some(source_dir.join(out));
        }
        merged = layer.layered_over(merged);
    }

    Ok(overlay.layered_over(merged))
}

// -------------------- resolved options --------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub namespace: String,
    pub qt_version: Option<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            namespace: RESERVED_NAMESPACE.to_string(),
            qt_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherSettings {
    pub compile: bool,
    pub compiler: Option<String>,
    pub compiler_args: Option<Vec<String>>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            compile: true,
            compiler: None,
            compiler_args: None,
        }
    }
}

/// Caller input before validation. Paths should already be absolute.
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub app_name: String,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// `None` falls back to `package.json` `main`, then `main.js`.
    pub main_file: Option<String>,
    pub extra_packages: Vec<String>,
    pub exclude: Vec<String>,
    pub platform: Platform,
    pub runtime: RuntimeSettings,
    pub launcher: LauncherSettings,
}

impl PackOptions {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            main_file: None,
            extra_packages: Vec::new(),
            exclude: Vec::new(),
            platform: Platform::host(),
            runtime: RuntimeSettings::default(),
            launcher: LauncherSettings::default(),
        }
    }

    pub fn from_config(ctx: &ContextEnv, source_dir: &Path, cfg: ConfigFile) -> Self {
        let output_dir = cfg
            .app
            .output
            .map(|p| ctx.absolutize(&p))
            .unwrap_or_else(|| ctx.cwd().join(DEFAULT_OUTPUT_DIR));

        let defaults = RuntimeSettings::default();
        Self {
            app_name: cfg.app.name.unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            source_dir: ctx.absolutize(source_dir),
            output_dir,
            main_file: cfg.app.main,
            extra_packages: cfg.app.modules,
            exclude: cfg.app.exclude,
            platform: cfg.target.platform.unwrap_or(ctx.host()),
            runtime: RuntimeSettings {
                namespace: cfg.runtime.namespace.unwrap_or(defaults.namespace),
                qt_version: cfg.runtime.qt_version,
            },
            launcher: LauncherSettings {
                compile: cfg.launcher.compile.unwrap_or(true),
                compiler: cfg.launcher.compiler,
                compiler_args: cfg.launcher.compiler_args,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn ctx(cwd: &Path) -> ContextEnv {
        ContextEnv::with_values(cwd.to_path_buf(), BTreeMap::new(), Platform::Linux)
    }

    #[test]
    fn parses_all_sections() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            [app]
            name = "Clock"
            main = "src/index.js"
            modules = ["moment"]
            exclude = ["docs"]

            [target]
            platform = "windows"

            [runtime]
            qt_version = "6.4.1"

            [launcher]
            compile = false
            compiler = "x86_64-w64-mingw32-gcc"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.app.name.as_deref(), Some("Clock"));
        assert_eq!(cfg.target.platform, Some(Platform::Windows));
        assert_eq!(cfg.runtime.qt_version.as_deref(), Some("6.4.1"));
        assert_eq!(cfg.launcher.compile, Some(false));
    }

    #[test]
    fn upper_layer_wins_and_lists_accumulate() {
        let lower: ConfigFile = toml::from_str(
            "[app]\nname = \"Lower\"\nmodules = [\"a\"]\n[launcher]\ncompiler = \"cc\"\n",
        )
        .unwrap();
        let upper: ConfigFile =
            toml::from_str("[app]\nname = \"Upper\"\nmodules = [\"b\"]\n").unwrap();

        let merged = upper.layered_over(lower);
        assert_eq!(merged.app.name.as_deref(), Some("Upper"));
        assert_eq!(merged.app.modules, vec!["a", "b"]);
        assert_eq!(merged.launcher.compiler.as_deref(), Some("cc"));
    }

    #[test]
    fn project_config_output_is_relative_to_source() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("app");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join(PROJECT_CONFIG_FILE),
            "[app]\noutput = \"dist\"\nname = \"FromFile\"\n",
        )
        .unwrap();

        let c = ctx(tmp.path());
        let cfg = load_layers(&c, None, &src, ConfigFile::default()).unwrap();
        assert_eq!(cfg.app.output, Some(src.join("dist")));

        let opts = PackOptions::from_config(&c, &src, cfg);
        assert_eq!(opts.app_name, "FromFile");
        assert_eq!(opts.output_dir, src.join("dist"));
        assert_eq!(opts.platform, Platform::Linux);
    }

    #[test]
    fn defaults_without_any_config() {
        let tmp = TempDir::new().unwrap();
        let c = ctx(tmp.path());
        let cfg = load_layers(&c, None, tmp.path(), ConfigFile::default()).unwrap();
        let opts = PackOptions::from_config(&c, tmp.path(), cfg);

        assert_eq!(opts.app_name, DEFAULT_APP_NAME);
        assert_eq!(opts.output_dir, tmp.path().join(DEFAULT_OUTPUT_DIR));
        assert!(opts.main_file.is_none());
        assert!(opts.launcher.compile);
        assert_eq!(opts.runtime.namespace, RESERVED_NAMESPACE);
    }

    #[test]
    fn malformed_config_is_reported_with_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(PROJECT_CONFIG_FILE);
        fs::write(&path, "[app\nname=").unwrap();
        let err = ConfigFile::load_from_path(&path).unwrap_err();
        assert!(matches!(err, PackError::ConfigFile { .. }));
        assert!(err.to_string().contains(PROJECT_CONFIG_FILE));
    }

    #[test]
    fn platform_naming() {
        assert_eq!(Platform::Windows.executable_name("qode"), "qode.exe");
        assert_eq!(Platform::Mac.executable_name("qode"), "qode");
        assert_eq!(Platform::Linux.library_path_var(), "LD_LIBRARY_PATH");
        assert_eq!(Platform::Mac.to_string(), "mac");
    }
}
