//! Project file index and content store.
//!
//! [`FileContentStore`] walks the user-designated context roots, applies the
//! configured inclusion/exclusion regexes, and caches three expensive
//! results until explicitly invalidated: the filtered file list, per-file
//! line counts, and per-folder totals. Folder totals are derived bottom-up,
//! deepest folder first, by summing already-cached child counts.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use sibyl_common::{PipelineConfig, PipelineError};

/// Files tracked at once in the line-count cache. Beyond this, counts for
/// the least recently used paths are recomputed on demand.
const LINE_COUNT_CACHE_CAP: usize = 4096;

/// What the pipeline needs from the host's project index.
#[async_trait]
pub trait ProjectIndex: Send + Sync {
    /// Paths of all files currently eligible as context, in stable order.
    async fn all_filtered_files(&self) -> Vec<String>;

    /// Read one file's content. Failure is file-local, never pipeline-fatal.
    async fn read_file_content(&self, path: &str) -> Result<String, PipelineError>;
}

struct StoreCache {
    filtered_files: Option<Vec<String>>,
    line_counts: LruCache<PathBuf, usize>,
    folder_counts: Option<HashMap<PathBuf, usize>>,
}

/// Regex-filtered view over the user's designated files and folders.
pub struct FileContentStore {
    roots: Vec<PathBuf>,
    include: Regex,
    exclude: Option<Regex>,
    cache: Mutex<StoreCache>,
}

impl FileContentStore {
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let cap = NonZeroUsize::new(LINE_COUNT_CACHE_CAP).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            roots: config.context_roots.clone(),
            include: config.include_regex()?,
            exclude: config.exclude_regex()?,
            cache: Mutex::new(StoreCache {
                filtered_files: None,
                line_counts: LruCache::new(cap),
                folder_counts: None,
            }),
        })
    }

    /// Drop every cached result. Call on configuration change or when the
    /// host knows the file set went stale.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.filtered_files = None;
        cache.line_counts.clear();
        cache.folder_counts = None;
        debug!("file content store caches invalidated");
    }

    fn matches_filters(&self, path: &str) -> bool {
        if !self.include.is_match(path) {
            return false;
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(path),
            None => true,
        }
    }

    fn scan(&self) -> Vec<String> {
        let mut files = BTreeSet::new();
        for root in &self.roots {
            if root.is_file() {
                let path = root.to_string_lossy().to_string();
                if self.matches_filters(&path) {
                    files.insert(path);
                }
                continue;
            }
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path().to_string_lossy().to_string();
                if self.matches_filters(&path) {
                    files.insert(path);
                }
            }
        }
        files.into_iter().collect()
    }

    /// The filtered file list, computed on first use and cached until
    /// [`invalidate`](Self::invalidate).
    pub fn filtered_files(&self) -> Vec<String> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(files) = &cache.filtered_files {
            return files.clone();
        }
        let files = self.scan();
        debug!(count = files.len(), "scanned context roots");
        cache.filtered_files = Some(files.clone());
        files
    }

    /// Read a file's content. Callers treat failure as recoverable.
    pub fn read_file(&self, path: &str) -> Result<String, PipelineError> {
        std::fs::read_to_string(path).map_err(|e| PipelineError::retrieval(path, e))
    }

    /// Line count for one file, memoized per absolute path.
    pub fn line_count(&self, path: &Path) -> Result<usize, PipelineError> {
        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(count) = cache.line_counts.get(&key) {
                return Ok(*count);
            }
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::retrieval(path.to_string_lossy(), e))?;
        let count = content.lines().count();
        self.cache.lock().unwrap().line_counts.put(key, count);
        Ok(count)
    }

    /// Per-folder line totals over the filtered file set.
    ///
    /// Derived bottom-up: folders are visited deepest first, so each total is
    /// the sum of the folder's direct files plus the already-computed totals
    /// of its immediate subfolders. Cached until invalidated.
    pub fn folder_line_counts(&self) -> HashMap<PathBuf, usize> {
        if let Some(counts) = &self.cache.lock().unwrap().folder_counts {
            return counts.clone();
        }

        let files = self.filtered_files();
        let mut direct: HashMap<PathBuf, usize> = HashMap::new();
        let mut folders: BTreeSet<PathBuf> = BTreeSet::new();

        for file in &files {
            let path = PathBuf::from(file);
            let count = match self.line_count(&path) {
                Ok(count) => count,
                Err(e) => {
                    warn!(file_path = %file, error = %e, "skipping uncountable file");
                    continue;
                }
            };
            if let Some(parent) = path.parent() {
                *direct.entry(parent.to_path_buf()).or_insert(0) += count;
                let mut dir = parent.to_path_buf();
                loop {
                    folders.insert(dir.clone());
                    match dir.parent() {
                        Some(parent) if self.roots.iter().any(|r| dir.starts_with(r) && dir != *r) => {
                            dir = parent.to_path_buf();
                        }
                        _ => break,
                    }
                }
            }
        }

        // Deepest first, so child totals exist before their parent sums them.
        let mut ordered: Vec<PathBuf> = folders.into_iter().collect();
        ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

        let mut totals: HashMap<PathBuf, usize> = HashMap::new();
        for dir in &ordered {
            let children: usize = totals
                .iter()
                .filter(|(child, _)| child.parent() == Some(dir.as_path()))
                .map(|(_, count)| count)
                .sum();
            let own = direct.get(dir).copied().unwrap_or(0);
            totals.insert(dir.clone(), own + children);
        }

        self.cache.lock().unwrap().folder_counts = Some(totals.clone());
        totals
    }
}

#[async_trait]
impl ProjectIndex for FileContentStore {
    async fn all_filtered_files(&self) -> Vec<String> {
        self.filtered_files()
    }

    async fn read_file_content(&self, path: &str) -> Result<String, PipelineError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::retrieval(path, e))
    }
}

/// Map-backed index for hosts and tests that already know their file set.
#[derive(Default)]
pub struct InMemoryProjectIndex {
    files: HashMap<String, String>,
}

impl InMemoryProjectIndex {
    pub fn new(files: HashMap<String, String>) -> Self {
        Self { files }
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }
}

#[async_trait]
impl ProjectIndex for InMemoryProjectIndex {
    async fn all_filtered_files(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    async fn read_file_content(&self, path: &str) -> Result<String, PipelineError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::retrieval(path, "not in index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_for(root: &TempDir) -> FileContentStore {
        let config = PipelineConfig {
            include_pattern: r"\.rs$".to_string(),
            exclude_pattern: Some(r"(^|/)target(/|$)".to_string()),
            context_roots: vec![root.path().to_path_buf()],
            ..Default::default()
        };
        FileContentStore::new(&config).unwrap()
    }

    fn write(root: &TempDir, rel: &str, content: &str) {
        let path = root.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn applies_include_and_exclude_filters() {
        let root = TempDir::new().unwrap();
        write(&root, "src/lib.rs", "fn a() {}\n");
        write(&root, "src/notes.txt", "not code\n");
        write(&root, "target/debug/gen.rs", "fn b() {}\n");

        let store = store_for(&root);
        let files = store.filtered_files();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/lib.rs"));
    }

    #[test]
    fn filtered_list_is_cached_until_invalidated() {
        let root = TempDir::new().unwrap();
        write(&root, "src/lib.rs", "fn a() {}\n");

        let store = store_for(&root);
        assert_eq!(store.filtered_files().len(), 1);

        // New file is invisible until the cache is dropped.
        write(&root, "src/new.rs", "fn b() {}\n");
        assert_eq!(store.filtered_files().len(), 1);

        store.invalidate();
        assert_eq!(store.filtered_files().len(), 2);
    }

    #[test]
    fn line_counts_are_memoized() {
        let root = TempDir::new().unwrap();
        write(&root, "src/lib.rs", "a\nb\nc\n");

        let store = store_for(&root);
        let path = root.path().join("src/lib.rs");
        assert_eq!(store.line_count(&path).unwrap(), 3);

        // Mutate on disk; the cached count must survive until invalidation.
        write(&root, "src/lib.rs", "a\n");
        assert_eq!(store.line_count(&path).unwrap(), 3);

        store.invalidate();
        assert_eq!(store.line_count(&path).unwrap(), 1);
    }

    #[test]
    fn folder_counts_sum_bottom_up() {
        let root = TempDir::new().unwrap();
        write(&root, "src/a.rs", "1\n2\n");
        write(&root, "src/deep/b.rs", "1\n2\n3\n");

        let store = store_for(&root);
        let totals = store.folder_line_counts();

        let src = root.path().join("src");
        assert_eq!(totals.get(&src.join("deep")).copied(), Some(3));
        assert_eq!(totals.get(&src).copied(), Some(5));
    }

    #[test]
    fn unreadable_file_is_a_retrieval_error() {
        let root = TempDir::new().unwrap();
        let store = store_for(&root);
        let err = store.read_file("/nonexistent/x.rs").unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn in_memory_index_reads_and_lists() {
        let mut index = InMemoryProjectIndex::default();
        index.insert("b.rs", "fn b() {}");
        index.insert("a.rs", "fn a() {}");
        assert_eq!(index.all_filtered_files().await, vec!["a.rs", "b.rs"]);
        assert_eq!(index.read_file_content("a.rs").await.unwrap(), "fn a() {}");
        assert!(index.read_file_content("c.rs").await.is_err());
    }
}
