use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::error::ManifestError;

pub const MANIFEST_FILE: &str = "package.json";
pub const PACKAGE_STORAGE: &str = "node_modules";

/// The subset of `package.json` the packager reads. Version specs are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub main: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, serde_json::Value>,
}

impl PackageManifest {
    pub fn parse(path: &Path, text: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `<dir>/package.json`; `Ok(None)` when the file does not exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = manifest_path(dir);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Read { path, source }),
        };
        Self::parse(&path, &text).map(Some)
    }

    /// Declared runtime dependency names, regular ones first.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str).chain(
            self.optional_dependencies
                .keys()
                .filter(|k| !self.dependencies.contains_key(*k))
                .map(String::as_str),
        )
    }
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// `name` or `@scope/name` made of plain path components. Anything else could
/// address a directory outside the package storage.
pub fn is_valid_package_name(name: &str) -> bool {
    let plain = |seg: &str| {
        !seg.is_empty()
            && seg != "."
            && seg != ".."
            && !seg.contains(['\\', ':'])
            && !seg.chars().any(char::is_control)
    };
    match name.split_once('/') {
        None => plain(name),
        Some((scope, pkg)) => {
            scope.len() > 1 && scope.starts_with('@') && plain(scope) && !pkg.contains('/') && plain(pkg)
        }
    }
}

/// Directory of a package under a lookup root. Scoped names (`@scope/pkg`) nest one level.
pub fn package_dir(lookup_root: &Path, name: &str) -> PathBuf {
    name.split('/')
        .fold(lookup_root.to_path_buf(), |acc, seg| acc.join(seg))
}
