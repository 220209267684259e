use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use crate::{
    config::{Platform, PROJECT_CONFIG_FILE},
    error::{PackError, Result},
};

pub const CONFIG_ENV_VAR: &str = "NODEPACK_CONFIG";

/// Process-wide facts captured once at startup. Nothing downstream reads the
/// environment or the working directory on its own.
#[derive(Debug, Clone)]
pub struct ContextEnv {
    cwd: PathBuf,
    vars: BTreeMap<String, String>,
    host: Platform,
    user_config: Option<PathBuf>,
}

impl ContextEnv {
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| PackError::io(".", e))?;
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        let user_config = dirs::config_dir().map(|d| d.join("nodepack").join("config.toml"));

        Ok(Self {
            cwd,
            vars,
            host: Platform::host(),
            user_config,
        })
    }

    /// Fixed context without a user-level config file.
    pub fn with_values(cwd: PathBuf, vars: BTreeMap<String, String>, host: Platform) -> Self {
        Self {
            cwd,
            vars,
            host,
            user_config: None,
        }
    }

    pub fn with_user_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_config = Some(path.into());
        self
    }

    // ---------- getters ----------

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn host(&self) -> Platform {
        self.host
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn user_config_path(&self) -> Option<PathBuf> {
        self.user_config.clone()
    }

    /// Join relative paths onto the captured working directory and drop `.` segments.
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };
        joined
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }

    // ---------- locating config ----------

    /// Project config precedence:
    /// 1) `--config` (must exist)
    /// 2) NODEPACK_CONFIG (must exist)
    /// 3) `<source>/nodepack.toml` (optional)
    pub fn locate_project_config(
        &self,
        cli_config: Option<&Path>,
        source_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        if let Some(p) = cli_config {
            let p = self.absolutize(p);
            if !p.is_file() {
                return Err(PackError::Configuration(format!(
                    "--config was provided but file does not exist: {}",
                    p.display()
                )));
            }
            return Ok(Some(p));
        }

        if let Some(raw) = self.var(CONFIG_ENV_VAR) {
            let p = self.absolutize(Path::new(raw));
            if !p.is_file() {
                return Err(PackError::Configuration(format!(
                    "{CONFIG_ENV_VAR} is set but file does not exist: {}",
                    p.display()
                )));
            }
            return Ok(Some(p));
        }

        let p = source_dir.join(PROJECT_CONFIG_FILE);
        Ok(p.is_file().then_some(p))
    }
}
