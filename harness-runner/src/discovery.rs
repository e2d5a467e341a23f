// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding test files.

use crate::{config::DiscoverConfig, errors::DiscoveryError};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use harness_metadata::TestId;
use std::collections::HashSet;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directory names that are never descended into.
const SKIPPED_DIRS: &[&str] = &["node_modules"];

/// Finds test files under a root directory.
///
/// Identifiers are `/`-separated paths relative to the root.
#[derive(Clone, Debug)]
pub struct TestDiscovery {
    root: Utf8PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl TestDiscovery {
    /// Creates a new `TestDiscovery` using the include and exclude globs in `config`.
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        config: &DiscoverConfig,
    ) -> Result<Self, DiscoveryError> {
        Ok(Self {
            root: root.into(),
            include: build_glob_set(&config.include)?,
            exclude: build_glob_set(&config.exclude)?,
        })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Discovers test files selected by `args`.
    ///
    /// With no arguments, the whole root is searched. Each argument is resolved against the root:
    ///
    /// * a file is selected as-is, even if it doesn't match the include globs;
    /// * a directory is searched for files matching the include globs;
    /// * anything else is a glob matched against paths relative to the root.
    ///
    /// Exclude globs apply to directory searches and glob arguments. Hidden directories and
    /// `node_modules` are skipped. Results are in sorted walk order, without duplicates.
    pub fn discover(&self, args: &[impl AsRef<str>]) -> Result<Vec<TestId>, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut push = |id: TestId| {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        };

        if args.is_empty() {
            self.walk(&self.root, |rel| self.is_test_file(rel), &mut push)?;
        }

        for arg in args {
            let arg = arg.as_ref();
            let path = self.root.join(arg);
            if path.is_file() {
                push(TestId::new(self.relative_id(&path)));
            } else if path.is_dir() {
                self.walk(&path, |rel| self.is_test_file(rel), &mut push)?;
            } else {
                let matcher = build_glob(arg)?.compile_matcher();
                self.walk(&self.root, |rel| self.matches_glob(&matcher, rel), &mut push)?;
            }
        }

        debug!(count = ids.len(), "discovered test files");
        Ok(ids)
    }

    fn is_test_file(&self, rel: &str) -> bool {
        self.include.is_match(rel) && !self.exclude.is_match(rel)
    }

    fn matches_glob(&self, matcher: &GlobMatcher, rel: &str) -> bool {
        matcher.is_match(rel) && !self.exclude.is_match(rel)
    }

    fn walk(
        &self,
        dir: &Utf8Path,
        mut filter: impl FnMut(&str) -> bool,
        push: &mut impl FnMut(TestId),
    ) -> Result<(), DiscoveryError> {
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(entry));

        for entry in walker {
            let entry = entry.map_err(|error| DiscoveryError::Walk {
                root: dir.to_owned(),
                error,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                DiscoveryError::NonUtf8Path {
                    path: entry.path().to_owned(),
                }
            })?;
            let rel = self.relative_id(path);
            if filter(&rel) {
                push(TestId::new(rel));
            }
        }
        Ok(())
    }

    fn relative_id(&self, path: &Utf8Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|component| component.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn build_glob(glob: &str) -> Result<Glob, DiscoveryError> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map_err(|error| DiscoveryError::InvalidGlob {
            glob: glob.to_owned(),
            error,
        })
}

fn build_glob_set(globs: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(build_glob(glob)?);
    }
    builder.build().map_err(|error| DiscoveryError::InvalidGlob {
        glob: globs.join(", "),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::{Utf8TempDir, tempdir};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn fixture() -> Utf8TempDir {
        let root = tempdir().unwrap();
        for file in [
            "tests/a.test.ts",
            "tests/b.test.js",
            "tests/helper.ts",
            "tests/sub/e.test.mjs",
            "excluded/f.test.ts",
            "node_modules/pkg/c.test.js",
            ".cache/d.test.js",
        ] {
            let path = root.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "").unwrap();
        }
        root
    }

    fn discovery(root: &Utf8TempDir) -> TestDiscovery {
        TestDiscovery::new(
            root.path(),
            &DiscoverConfig {
                include: vec![
                    "**/*.test.js".to_owned(),
                    "**/*.test.mjs".to_owned(),
                    "**/*.test.ts".to_owned(),
                ],
                exclude: vec!["excluded/**".to_owned()],
            },
        )
        .unwrap()
    }

    #[test_case(
        &[],
        &["tests/a.test.ts", "tests/b.test.js", "tests/sub/e.test.mjs"]

        ; "whole root"
    )]
    #[test_case(
        &["tests/sub"],
        &["tests/sub/e.test.mjs"]

        ; "directory"
    )]
    #[test_case(
        &["tests/helper.ts"],
        &["tests/helper.ts"]

        ; "explicit file bypasses include globs"
    )]
    #[test_case(
        &["tests/*.test.*"],
        &["tests/a.test.ts", "tests/b.test.js"]

        ; "glob does not cross directories"
    )]
    #[test_case(
        &["**/f.test.ts"],
        &[]

        ; "glob honors excludes"
    )]
    #[test_case(
        &["tests/b.test.js", "tests"],
        &["tests/b.test.js", "tests/a.test.ts", "tests/sub/e.test.mjs"]

        ; "duplicates removed"
    )]
    #[test_case(
        &["does/not/exist.test.ts"],
        &[]

        ; "missing path"
    )]
    fn discover(args: &[&str], expected: &[&str]) {
        let root = fixture();
        let ids = discovery(&root).discover(args).unwrap();
        assert_eq!(
            ids.iter().map(TestId::as_str).collect::<Vec<_>>(),
            expected.to_vec()
        );
    }

    #[test]
    fn invalid_glob() {
        let root = tempdir().unwrap();
        let error = TestDiscovery::new(
            root.path(),
            &DiscoverConfig {
                include: vec!["tests/[.test.ts".to_owned()],
                exclude: Vec::new(),
            },
        )
        .unwrap_err();
        match error {
            DiscoveryError::InvalidGlob { glob, .. } => assert_eq!(glob, "tests/[.test.ts"),
            other => panic!("expected InvalidGlob, got {other:?}"),
        }

        let error = discovery(&fixture()).discover(&["tests/{a"]).unwrap_err();
        assert!(matches!(error, DiscoveryError::InvalidGlob { .. }));
    }
}
