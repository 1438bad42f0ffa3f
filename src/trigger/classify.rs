//! Turns a raw `(paths, event_types)` batch into the three booleans
//! `BuildOptions` needs: whether a full rebuild is required, which
//! markdown sources touched nav-affecting frontmatter, and whether the
//! change was structural (create/remove/move).

use std::collections::BTreeSet;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::watch::EventType;

use super::cache::{path_under_any, ContentHashCache, FrontmatterNavCache, TemplateDirsCache};

#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    pub template_dirs: Vec<PathBuf>,
    pub icons_dir: Option<PathBuf>,
    pub autodoc_source_dirs: Vec<PathBuf>,
    pub autodoc_spec_file: Option<PathBuf>,
    pub versioning_enabled: bool,
    pub versioning_shared_dir: Option<PathBuf>,
    pub versioning_config_file: Option<PathBuf>,
    pub nav_affecting_keys: BTreeSet<String>,
}

impl ClassifierConfig {
    pub fn default_nav_affecting_keys() -> BTreeSet<String> {
        ["weight", "menu", "cascade", "title", "draft"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

pub struct Classification {
    pub needs_full_rebuild: bool,
    pub nav_changed_sources: BTreeSet<PathBuf>,
    pub structural_changed: bool,
}

pub struct Classifier {
    config: ClassifierConfig,
    template_dirs_cache: TemplateDirsCache,
    frontmatter_nav_cache: FrontmatterNavCache,
    content_hash_cache: ContentHashCache,
    /// Queries whether a template has at least one dependent page in the
    /// last build's dependency graph. `None` means no graph is available,
    /// in which case a template edit conservatively triggers a full
    /// rebuild.
    template_has_dependents: Option<Box<dyn Fn(&Path) -> bool + Send + Sync>>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            template_dirs_cache: TemplateDirsCache::default(),
            frontmatter_nav_cache: FrontmatterNavCache::new(super::cache::FRONTMATTER_NAV_CACHE_SIZE),
            content_hash_cache: ContentHashCache::new(super::cache::CONTENT_HASH_CACHE_SIZE),
            template_has_dependents: None,
        }
    }

    pub fn set_template_dependents_probe(&mut self, probe: Box<dyn Fn(&Path) -> bool + Send + Sync>) {
        self.template_has_dependents = Some(probe);
    }

    pub fn invalidate_template_dirs(&mut self) {
        self.template_dirs_cache.invalidate();
    }

    pub fn classify(&mut self, paths: &BTreeSet<PathBuf>, event_types: &BTreeSet<EventType>) -> Classification {
        let structural_changed = event_types
            .iter()
            .any(|e| matches!(e, EventType::Created | EventType::Deleted | EventType::Moved));

        let mut needs_full_rebuild = structural_changed;

        let template_dirs = self.template_dirs_cache.get_or_resolve(&self.config.template_dirs).to_vec();

        for path in paths {
            if !needs_full_rebuild && self.is_template_with_dependents(path, &template_dirs) {
                needs_full_rebuild = true;
            }
            if !needs_full_rebuild && self.is_autodoc_source(path) {
                needs_full_rebuild = true;
            }
            if !needs_full_rebuild && self.is_icon(path) {
                needs_full_rebuild = true;
            }
            if !needs_full_rebuild && self.is_version_affecting(path) {
                needs_full_rebuild = true;
            }
        }

        let mut nav_changed_sources = BTreeSet::new();
        for path in paths {
            let is_markdown = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"));
            if is_markdown && self.has_nav_affecting_frontmatter(path) {
                nav_changed_sources.insert(path.clone());
            }
        }

        Classification {
            needs_full_rebuild,
            nav_changed_sources,
            structural_changed,
        }
    }

    fn is_template_with_dependents(&self, path: &Path, template_dirs: &[PathBuf]) -> bool {
        if path.extension().is_none_or(|ext| ext != "html") {
            return false;
        }
        if !path_under_any(path, template_dirs) {
            return false;
        }
        match &self.template_has_dependents {
            Some(probe) => probe(path),
            None => true,
        }
    }

    fn is_autodoc_source(&self, path: &Path) -> bool {
        if let Some(spec_file) = &self.config.autodoc_spec_file
            && path == spec_file
        {
            return true;
        }
        path.extension().is_some_and(|ext| ext == "py")
            && path_under_any(path, &self.config.autodoc_source_dirs)
    }

    fn is_icon(&self, path: &Path) -> bool {
        self.config
            .icons_dir
            .as_ref()
            .is_some_and(|dir| path.starts_with(dir) && path.extension().is_some_and(|ext| ext == "svg"))
    }

    fn is_version_affecting(&self, path: &Path) -> bool {
        if !self.config.versioning_enabled {
            return false;
        }
        let under_shared = self
            .config
            .versioning_shared_dir
            .as_ref()
            .is_some_and(|dir| path.starts_with(dir));
        let is_version_config = self
            .config
            .versioning_config_file
            .as_ref()
            .is_some_and(|f| path == f)
            || path.file_name().is_some_and(|n| n == "versioning.yaml");
        under_shared || is_version_config
    }

    fn has_nav_affecting_frontmatter(&mut self, path: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(mtime) = metadata.modified() else {
            return false;
        };

        if let Some((cached_mtime, result)) = self.frontmatter_nav_cache.get(&path.to_path_buf())
            && *cached_mtime == mtime
        {
            return *result;
        }

        let result = read_frontmatter_keys(path)
            .map(|keys| keys.iter().any(|k| self.config.nav_affecting_keys.contains(k)))
            .unwrap_or(false);

        self.frontmatter_nav_cache.insert(path.to_path_buf(), (mtime, result));
        result
    }

    /// Computes whether a modified markdown file changed only its body
    /// (frontmatter hash unchanged, content hash changed), using the
    /// content-hash cache keyed by `(path, mtime)`. A hint consumed by the
    /// rendering engine's own fast paths; not used by `ReloadController`.
    pub fn is_content_only_change(&mut self, path: &Path) -> Option<bool> {
        let metadata = std::fs::metadata(path).ok()?;
        let mtime = metadata.modified().ok()?;
        let text = std::fs::read_to_string(path).ok()?;
        let (frontmatter, body) = split_frontmatter(&text);

        let frontmatter_hash = hex::encode(Sha256::digest(frontmatter.as_bytes()));
        let content_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let previous = self.content_hash_cache.get(&path.to_path_buf()).cloned();
        self.content_hash_cache
            .insert(path.to_path_buf(), (mtime, frontmatter_hash.clone(), content_hash.clone()));

        previous.map(|(_, prev_fm, prev_content)| prev_fm == frontmatter_hash && prev_content != content_hash)
    }
}

fn read_frontmatter_keys(path: &Path) -> Option<BTreeSet<String>> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut buf = vec![0u8; 4096];
    let read = file.read(&mut buf).ok()?;
    buf.truncate(read);
    let text = String::from_utf8_lossy(&buf);
    let (frontmatter, _) = split_frontmatter(&text);
    let value: serde_yaml::Value = serde_yaml::from_str(frontmatter).ok()?;
    let mapping = value.as_mapping()?;
    Some(
        mapping
            .keys()
            .filter_map(|k| k.as_str())
            .map(|k| k.to_lowercase())
            .collect(),
    )
}

fn split_frontmatter(text: &str) -> (&str, &str) {
    let Some(rest) = text.strip_prefix("---") else {
        return ("", text);
    };
    match rest.find("\n---") {
        Some(end) => (&rest[..end], &rest[end + 4..]),
        None => ("", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_events_force_full_rebuild() {
        let mut classifier = Classifier::new(ClassifierConfig::default());
        let mut paths = BTreeSet::new();
        paths.insert(PathBuf::from("/site/content/new.md"));
        let mut events = BTreeSet::new();
        events.insert(EventType::Created);
        let classification = classifier.classify(&paths, &events);
        assert!(classification.needs_full_rebuild);
        assert!(classification.structural_changed);
    }

    #[test]
    fn non_structural_unrelated_edit_is_incremental() {
        let mut classifier = Classifier::new(ClassifierConfig::default());
        let mut paths = BTreeSet::new();
        paths.insert(PathBuf::from("/site/content/about.md"));
        let mut events = BTreeSet::new();
        events.insert(EventType::Modified);
        let classification = classifier.classify(&paths, &events);
        assert!(!classification.needs_full_rebuild);
        assert!(!classification.structural_changed);
    }

    #[test]
    fn template_without_dependency_graph_forces_full_rebuild() {
        let config = ClassifierConfig {
            template_dirs: vec![PathBuf::from("/site/themes/default/templates")],
            ..Default::default()
        };
        let mut classifier = Classifier::new(config);
        let mut paths = BTreeSet::new();
        paths.insert(PathBuf::from("/site/themes/default/templates/base.html"));
        let mut events = BTreeSet::new();
        events.insert(EventType::Modified);
        assert!(classifier.classify(&paths, &events).needs_full_rebuild);
    }

    #[test]
    fn template_with_no_dependents_is_incremental() {
        let config = ClassifierConfig {
            template_dirs: vec![PathBuf::from("/site/themes/default/templates")],
            ..Default::default()
        };
        let mut classifier = Classifier::new(config);
        classifier.set_template_dependents_probe(Box::new(|_| false));
        let mut paths = BTreeSet::new();
        paths.insert(PathBuf::from("/site/themes/default/templates/unused.html"));
        let mut events = BTreeSet::new();
        events.insert(EventType::Modified);
        assert!(!classifier.classify(&paths, &events).needs_full_rebuild);
    }

    #[test]
    fn frontmatter_key_detection() {
        let (fm, body) = split_frontmatter("---\nweight: 5\ntitle: Hi\n---\nbody text");
        assert!(fm.contains("weight"));
        assert_eq!(body, "\nbody text");
    }
}
