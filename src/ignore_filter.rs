//! Path-level ignore rules shared by the file watcher and the build
//! trigger's own directory walks.
//!
//! Three rule sources are combined: a built-in list of directory names
//! that are always ignored regardless of configuration, user-supplied
//! glob patterns (matched against both the full relative path and the
//! bare file name), and user-supplied regex patterns (matched against
//! the full relative path).

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::RegexSet;

const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "__pycache__",
    "node_modules",
    ".hotsite",
    "dist",
    "build",
    ".idea",
    ".vscode",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".nox",
    ".tox",
    "coverage",
    "htmlcov",
    ".coverage",
];

#[derive(thiserror::Error, Debug)]
pub enum IgnoreFilterError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("invalid regex pattern set: {0}")]
    Regex(#[from] regex::Error),
}

/// Bounded insertion-order cache mapping a relative path to whether it was
/// ignored. Evicts the oldest entry once `capacity` is reached, mirroring
/// a hand-rolled LRU rather than pulling in a dependency for it.
struct PathCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, bool>,
}

impl PathCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<bool> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: String, value: bool) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        if self.capacity > 0 && self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

pub struct IgnoreFilter {
    root: PathBuf,
    globs: Option<GlobSet>,
    regexes: Option<RegexSet>,
    directories: Vec<PathBuf>,
    include_defaults: bool,
    cache: Mutex<PathCache>,
}

impl IgnoreFilter {
    pub fn new(
        root: impl Into<PathBuf>,
        glob_patterns: &[String],
        regex_patterns: &[String],
        directories: &[PathBuf],
        include_defaults: bool,
        cache_max_size: usize,
    ) -> Result<Self, IgnoreFilterError> {
        let globs = if glob_patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in glob_patterns {
                let glob = Glob::new(pattern).map_err(|source| IgnoreFilterError::Glob {
                    pattern: pattern.clone(),
                    source,
                })?;
                builder.add(glob);
            }
            Some(
                builder
                    .build()
                    .map_err(|source| IgnoreFilterError::Glob {
                        pattern: glob_patterns.join(", "),
                        source,
                    })?,
            )
        };

        let regexes = if regex_patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(regex_patterns)?)
        };

        Ok(Self {
            root: root.into(),
            globs,
            regexes,
            directories: directories.to_vec(),
            include_defaults,
            cache: Mutex::new(PathCache::new(cache_max_size)),
        })
    }

    /// `output_dir` is always ignored in addition to `settings`' own
    /// directory list: the build output lives under the watched tree, and
    /// without this the watcher would fire on its own writes and the
    /// build trigger would rebuild forever.
    pub fn from_settings(
        root: impl Into<PathBuf>,
        output_dir: &Path,
        settings: &crate::config::DevServerSettings,
    ) -> Result<Self, IgnoreFilterError> {
        Self::new(
            root,
            &settings.exclude_patterns,
            &settings.exclude_regex,
            &[output_dir.to_path_buf()],
            true,
            1000,
        )
    }

    /// Returns true if `path` should be ignored.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let key = path.to_string_lossy().into_owned();

        if let Ok(cache) = self.cache.lock()
            && let Some(hit) = cache.get(&key)
        {
            return hit;
        }

        let result = self.check_path(path);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result);
        }
        result
    }

    fn check_path(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        if self.include_defaults
            && relative
                .components()
                .any(|c| DEFAULT_IGNORED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
        {
            return true;
        }

        if self
            .directories
            .iter()
            .any(|dir| relative.starts_with(dir))
        {
            return true;
        }

        let relative_str = relative.to_string_lossy().replace('\\', "/");

        if let Some(globs) = &self.globs {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if globs.is_match(&relative_str) || globs.is_match(&file_name) {
                return true;
            }
        }

        if let Some(regexes) = &self.regexes
            && regexes.is_match(&relative_str)
        {
            return true;
        }

        false
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_default_directories() {
        let filter = IgnoreFilter::new("/site", &[], &[], &[], true, 1000).unwrap();
        assert!(filter.is_ignored(Path::new("/site/node_modules/pkg/index.js")));
        assert!(filter.is_ignored(Path::new("/site/.git/HEAD")));
        assert!(!filter.is_ignored(Path::new("/site/content/index.md")));
    }

    #[test]
    fn matches_glob_against_path_and_filename() {
        let filter = IgnoreFilter::new(
            "/site",
            &["*.tmp".to_string(), "drafts/**".to_string()],
            &[],
            &[],
            false,
            1000,
        )
        .unwrap();
        assert!(filter.is_ignored(Path::new("/site/content/scratch.tmp")));
        assert!(filter.is_ignored(Path::new("/site/drafts/unfinished.md")));
        assert!(!filter.is_ignored(Path::new("/site/content/index.md")));
    }

    #[test]
    fn matches_regex_against_relative_path() {
        let filter = IgnoreFilter::new(
            "/site",
            &[],
            &[r"content/.*\.bak$".to_string()],
            &[],
            false,
            1000,
        )
        .unwrap();
        assert!(filter.is_ignored(Path::new("/site/content/index.md.bak")));
        assert!(!filter.is_ignored(Path::new("/site/content/index.md")));
    }

    #[test]
    fn cache_evicts_oldest_entry_past_capacity() {
        let filter = IgnoreFilter::new("/site", &[], &[], &[], true, 2).unwrap();
        filter.is_ignored(Path::new("/site/a.md"));
        filter.is_ignored(Path::new("/site/b.md"));
        filter.is_ignored(Path::new("/site/c.md"));
        let cache = filter.cache.lock().unwrap();
        assert_eq!(cache.entries.len(), 2);
        assert!(!cache.entries.contains_key("/site/a.md"));
    }

    #[test]
    fn explicit_directories_are_ignored() {
        let filter = IgnoreFilter::new(
            "/site",
            &[],
            &[],
            &[PathBuf::from("vendor")],
            false,
            1000,
        )
        .unwrap();
        assert!(filter.is_ignored(Path::new("/site/vendor/lib.js")));
    }
}
