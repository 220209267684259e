use std::{
    collections::{BTreeSet, VecDeque},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::manifest::{is_valid_package_name, package_dir, PackageManifest};

pub const RESERVED_NAMESPACE: &str = "@nodegui";

/// True for the GUI runtime's own packages, which are staged with the runtime instead.
pub fn is_reserved(name: &str, namespace: &str) -> bool {
    name == namespace
        || name
            .strip_prefix(namespace)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Set of package names in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyClosure {
    order: Vec<String>,
    members: BTreeSet<String>,
}

impl DependencyClosure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the name was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.members.contains(name) {
            return false;
        }
        self.members.insert(name.to_string());
        self.order.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for DependencyClosure {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut c = Self::new();
        for name in iter {
            c.insert(name);
        }
        c
    }
}

pub struct Resolver {
    lookup_root: PathBuf,
    namespace: String,
}

impl Resolver {
    pub fn new(lookup_root: impl Into<PathBuf>) -> Self {
        Self {
            lookup_root: lookup_root.into(),
            namespace: RESERVED_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn lookup_root(&self) -> &Path {
        &self.lookup_root
    }

    /// Transitive closure of `direct` over the manifests under the lookup root.
    ///
    /// - Valid seeds are always part of the result, even when they have no directory.
    /// - Names that are not plain `name` / `@scope/name` are logged and dropped.
    /// - Every name's manifest is read at most once; cycles terminate.
    /// - A missing manifest makes the package a leaf.
    /// - A malformed manifest is logged and treated like a missing one.
    /// - Names in the reserved namespace are never added while expanding.
    pub fn resolve<'a, I>(&self, direct: I) -> DependencyClosure
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result: DependencyClosure = direct
            .into_iter()
            .filter(|name| accept_name(name, None))
            .collect();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut frontier: VecDeque<String> = result.iter().map(str::to_string).collect();

        while let Some(name) = frontier.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let dir = package_dir(&self.lookup_root, &name);
            let manifest = match PackageManifest::load_from_dir(&dir) {
                Ok(Some(m)) => m,
                Ok(None) => {
                    debug!(package = %name, "no manifest; treating as leaf");
                    continue;
                }
                Err(e) => {
                    warn!(package = %name, error = %e, "ignoring unusable manifest; treating as leaf");
                    continue;
                }
            };

            for dep in manifest.dependency_names() {
                if is_reserved(dep, &self.namespace) || !accept_name(dep, Some(name.as_str())) {
                    continue;
                }
                if result.insert(dep) {
                    debug!(package = %dep, required_by = %name, "added transitive dependency");
                    frontier.push_back(dep.to_string());
                }
            }
        }

        result
    }
}

fn accept_name(name: &str, required_by: Option<&str>) -> bool {
    if is_valid_package_name(name) {
        return true;
    }
    warn!(package = %name, required_by = required_by.unwrap_or("<project>"), "skipping invalid package name");
    false
}
