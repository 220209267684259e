use std::{
    fs,
    path::{Component, Path},
};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{PackError, Result};

/// Always skipped when staging project files.
pub const FIXED_EXCLUSIONS: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    ".vscode",
    ".idea",
    ".cache",
    ".parcel-cache",
    ".DS_Store",
    "npm-debug.log",
];

/// Ordered list of path prefixes, relative to the copy root, using `/` separators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    prefixes: Vec<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_defaults() -> Self {
        let mut set = Self::new();
        for p in FIXED_EXCLUSIONS {
            set.push(p);
        }
        set
    }

    /// Adds a prefix. Accepts `./x/`, `x\y` and similar spellings; empty prefixes are ignored.
    pub fn push(&mut self, prefix: impl AsRef<str>) {
        let normalized = normalize_prefix(prefix.as_ref());
        if normalized.is_empty() || self.prefixes.contains(&normalized) {
            return;
        }
        self.prefixes.push(normalized);
    }

    /// Prefix match on whole path components: `foo` excludes `foo` and `foo/bar`, never `foobar`.
    pub fn is_excluded(&self, rel: &str) -> bool {
        self.matching(rel).is_some()
    }

    fn matching(&self, rel: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|p| {
                rel == p.as_str()
                    || rel
                        .strip_prefix(p.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

fn normalize_prefix(raw: &str) -> String {
    raw.trim()
        .replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Relative path rendered with `/` separators, the form exclusions are matched against.
pub fn relative_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
    pub skipped: usize,
}

/// Mirror `src` into `dest`, skipping every entry whose path relative to `src`
/// falls under one of `exclusions`. The first I/O failure aborts the copy.
pub fn copy_tree(src: &Path, dest: &Path, exclusions: &ExclusionSet) -> Result<CopyStats> {
    fs::create_dir_all(dest).map_err(|e| PackError::io(dest, e))?;

    let mut stats = CopyStats::default();
    let mut walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_dangling_link(&e) => {
                warn!(path = ?e.path(), "skipping dangling symlink");
                stats.skipped += 1;
                continue;
            }
            Err(e) => {
                return Err(PackError::Walk {
                    path: src.to_path_buf(),
                    source: e,
                })
            }
        };

        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let key = relative_key(rel);

        if let Some(prefix) = exclusions.matching(&key) {
            info!(path = %key, exclusion = %prefix, "skipping excluded entry");
            stats.skipped += 1;
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| PackError::io(&target, e))?;
            stats.dirs += 1;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| PackError::io(entry.path(), e))?;
            stats.files += 1;
        }
    }

    debug!(
        src = %src.display(),
        dest = %dest.display(),
        files = stats.files,
        dirs = stats.dirs,
        skipped = stats.skipped,
        "copied tree"
    );

    Ok(stats)
}

/// A link whose target is gone. Loops and unreadable entries stay fatal.
fn is_dangling_link(e: &walkdir::Error) -> bool {
    if e.loop_ancestor().is_some() {
        return false;
    }
    e.path().is_some_and(|p| {
        p.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) && !p.exists()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, body).unwrap();
    }

    fn exclusions(items: &[&str]) -> ExclusionSet {
        let mut set = ExclusionSet::new();
        for i in items {
            set.push(i);
        }
        set
    }

    #[test]
    fn copies_nested_files_with_identical_content() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "main.js", "console.log(1)");
        write(src.path(), "src/ui/view.js", "export {}");

        let stats = copy_tree(src.path(), dest.path(), &ExclusionSet::new()).unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(
            fs::read_to_string(dest.path().join("main.js")).unwrap(),
            "console.log(1)"
        );
        assert_eq!(
            fs::read_to_string(dest.path().join("src/ui/view.js")).unwrap(),
            "export {}"
        );
    }

    #[test]
    fn exclusion_is_prefix_aware() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "build/out.js", "x");
        write(src.path(), "build2/out.js", "y");
        write(src.path(), "buildfile", "z");

        let stats = copy_tree(src.path(), dest.path(), &exclusions(&["build"])).unwrap();

        assert!(!dest.path().join("build").exists());
        assert!(dest.path().join("build2/out.js").exists());
        assert!(dest.path().join("buildfile").exists());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn nested_exclusion_matches_from_copy_root() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "src/generated/a.js", "a");
        write(src.path(), "src/keep.js", "k");
        write(src.path(), "generated/b.js", "b");

        copy_tree(src.path(), dest.path(), &exclusions(&["src/generated"])).unwrap();

        assert!(!dest.path().join("src/generated").exists());
        assert!(dest.path().join("src/keep.js").exists());
        assert!(dest.path().join("generated/b.js").exists());
    }

    #[test]
    fn push_normalizes_spellings() {
        let set = exclusions(&["./deploy/", "out\\win", "", ".", "deploy"]);
        let items: Vec<&str> = set.iter().collect();
        assert_eq!(items, vec!["deploy", "out/win"]);
        assert!(set.is_excluded("out/win/app"));
        assert!(!set.is_excluded("out/winx"));
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = copy_tree(
            &tmp.path().join("nope"),
            &tmp.path().join("dest"),
            &ExclusionSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PackError::Walk { .. }));
    }

    #[test]
    #[traced_test]
    fn logs_each_skipped_entry() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), ".git/HEAD", "ref");
        write(src.path(), "index.js", "");

        copy_tree(src.path(), dest.path(), &ExclusionSet::project_defaults()).unwrap();

        assert!(logs_contain("skipping excluded entry"));
        assert!(logs_contain(".git"));
    }

    #[cfg(unix)]
    #[test]
    #[traced_test]
    fn dangling_symlink_is_skipped() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "index.js", "");
        fs::create_dir_all(src.path().join("node_modules/.bin")).unwrap();
        std::os::unix::fs::symlink(
            src.path().join("gone/cli.js"),
            src.path().join("node_modules/.bin/gone"),
        )
        .unwrap();

        let stats = copy_tree(src.path(), dest.path(), &ExclusionSet::new()).unwrap();

        assert_eq!(stats.skipped, 1);
        assert!(dest.path().join("index.js").is_file());
        assert!(!dest.path().join("node_modules/.bin/gone").exists());
        assert!(logs_contain("skipping dangling symlink"));
    }

    #[cfg(unix)]
    #[test]
    fn live_symlink_is_copied_as_content() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "lib/cli.js", "run()");
        std::os::unix::fs::symlink(src.path().join("lib/cli.js"), src.path().join("cli")).unwrap();

        copy_tree(src.path(), dest.path(), &ExclusionSet::new()).unwrap();

        assert_eq!(fs::read_to_string(dest.path().join("cli")).unwrap(), "run()");
    }

    fn tree_paths() -> impl Strategy<Value = Vec<String>> {
        let dir = prop::sample::select(vec!["a", "ab", "b", "a/c"]);
        let file = prop::sample::select(vec!["x.js", "y.js"]);
        prop::collection::vec((dir, file), 1..10)
            .prop_map(|v| v.into_iter().map(|(d, f)| format!("{d}/{f}")).collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn excluded_files_never_reach_destination(
            paths in tree_paths(),
            excl in prop::sample::subsequence(vec!["a", "ab", "a/c", "b/x.js"], 0..3),
        ) {
            let src = TempDir::new().unwrap();
            let dest = TempDir::new().unwrap();
            for p in &paths {
                write(src.path(), p, p);
            }
            let set = exclusions(&excl);

            copy_tree(src.path(), dest.path(), &set).unwrap();

            for p in &paths {
                let hidden = excl
                    .iter()
                    .any(|e| p == e || p.starts_with(&format!("{e}/")));
                let copied = dest.path().join(p);
                if hidden {
                    prop_assert!(!copied.exists(), "{} should be excluded", p);
                } else {
                    prop_assert_eq!(fs::read_to_string(copied).unwrap(), p.clone());
                }
            }
        }
    }
}
