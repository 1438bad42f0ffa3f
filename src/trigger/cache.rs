//! The three small caches `BuildTrigger` owns: frontmatter-nav,
//! content-hash, and the resolved template-directory list. All are
//! per-process, bounded, and invalidated by mtime — never persisted.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Bounded FIFO-eviction cache shared by the frontmatter-nav and
/// content-hash caches (both are `Path -> (mtime, ...)` with the same
/// "revalidate on mtime change" shape).
pub struct BoundedCache<K: Eq + Hash + Clone, V> {
    capacity: usize,
    order: VecDeque<K>,
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= self.capacity
                && let Some(oldest) = self.order.pop_front()
            {
                self.entries.remove(&oldest);
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

pub const FRONTMATTER_NAV_CACHE_SIZE: usize = 500;
pub const CONTENT_HASH_CACHE_SIZE: usize = 500;

/// `Path -> (mtime, has_nav_affecting_keys)`.
pub type FrontmatterNavCache = BoundedCache<PathBuf, (SystemTime, bool)>;

/// `Path -> (mtime, frontmatter_hash, content_hash)`.
pub type ContentHashCache = BoundedCache<PathBuf, (SystemTime, String, String)>;

/// Resolved list of existing template directories; invalidated wholesale
/// when the theme changes.
#[derive(Default)]
pub struct TemplateDirsCache {
    dirs: Vec<PathBuf>,
    valid: bool,
}

impl TemplateDirsCache {
    pub fn get_or_resolve(&mut self, configured: &[PathBuf]) -> &[PathBuf] {
        if !self.valid {
            self.dirs = configured.iter().filter(|d| d.is_dir()).cloned().collect();
            self.valid = true;
        }
        &self.dirs
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

pub fn path_under_any<'a>(path: &Path, dirs: impl IntoIterator<Item = &'a PathBuf>) -> bool {
    dirs.into_iter().any(|dir| path.starts_with(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_cache_evicts_oldest() {
        let mut cache: BoundedCache<PathBuf, u32> = BoundedCache::new(2);
        cache.insert(PathBuf::from("a"), 1);
        cache.insert(PathBuf::from("b"), 2);
        cache.insert(PathBuf::from("c"), 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&PathBuf::from("a")).is_none());
        assert_eq!(cache.get(&PathBuf::from("c")), Some(&3));
    }

    #[test]
    fn template_dirs_cache_resolves_once_until_invalidated() {
        let mut cache = TemplateDirsCache::default();
        let dirs = vec![PathBuf::from(".")];
        assert_eq!(cache.get_or_resolve(&dirs).len(), 1);
        cache.invalidate();
        assert_eq!(cache.get_or_resolve(&dirs).len(), 1);
    }
}
