//! Filesystem discovery: walk the crawl root, yielding files and
//! version-control markers, pruning excluded directories as it goes.

use super::item::{CrawlItem, FileMeta};
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct Discoverer {
    base: PathBuf,
    excludes: GlobSet,
    git_support: bool,
}

impl Discoverer {
    pub fn new(base: &Path, exclude_patterns: &[String], git_support: bool) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_patterns {
            let glob = Glob::new(&pattern.to_lowercase())
                .with_context(|| format!("invalid exclude pattern {pattern:?}"))?;
            builder.add(glob);
        }
        Ok(Self {
            base: base.to_path_buf(),
            excludes: builder.build().context("failed to build exclude set")?,
            git_support,
        })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.excludes
            .is_match(path.to_string_lossy().to_lowercase())
    }

    /// Walk the tree, calling `emit` per item. `emit` returning false stops
    /// the walk (used when a pool shuts down mid-crawl). Returns how many
    /// items were emitted.
    pub fn scan(&self, emit: &mut dyn FnMut(CrawlItem) -> bool) -> u64 {
        let mut emitted = 0u64;
        let mut walker = WalkDir::new(&self.base).follow_links(false).into_iter();

        loop {
            let entry = match walker.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    warn!(error = %err, "walk error, skipping entry");
                    continue;
                }
            };

            let path = entry.path();

            if entry.file_type().is_dir() {
                if entry.file_name() == ".git" {
                    // The marker stands in for the whole history; never
                    // descend into object storage.
                    walker.skip_current_dir();
                    if self.git_support {
                        if !emit(CrawlItem::GitRepo(path.to_path_buf())) {
                            return emitted;
                        }
                        emitted += 1;
                    }
                    continue;
                }
                if entry.depth() > 0 && self.is_excluded(path) {
                    debug!(path = %path.display(), "pruning excluded directory");
                    walker.skip_current_dir();
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            match FileMeta::from_path(&self.base, path) {
                Ok(meta) => {
                    if !emit(CrawlItem::File(meta)) {
                        return emitted;
                    }
                    emitted += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %format!("{err:#}"), "cannot stat file");
                }
            }
        }

        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn collect(discoverer: &Discoverer) -> Vec<CrawlItem> {
        let mut items = Vec::new();
        discoverer.scan(&mut |item| {
            items.push(item);
            true
        });
        items
    }

    #[test]
    fn finds_files_and_prunes_excluded_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".idea")).unwrap();
        fs::write(dir.path().join("src/creds.txt"), "hello").unwrap();
        fs::write(dir.path().join(".idea/workspace.xml"), "junk").unwrap();
        fs::write(dir.path().join("logo.png"), [0u8; 4]).unwrap();

        let discoverer = Discoverer::new(
            dir.path(),
            &["*/.idea/*".to_string(), "*/*.png".to_string()],
            true,
        )
        .unwrap();

        let items = collect(&discoverer);
        let files: Vec<String> = items
            .iter()
            .filter_map(|i| match i {
                CrawlItem::File(meta) => Some(meta.path_virtual.clone()),
                _ => None,
            })
            .collect();

        assert!(files.contains(&"src/creds.txt".to_string()));
        assert!(!files.iter().any(|f| f.contains("workspace.xml")));
        // File-level excludes are enforced by the processing policy; the
        // walker only prunes directories.
        assert!(discoverer.is_excluded(&dir.path().join("logo.png")));
    }

    #[test]
    fn git_roots_become_markers_and_are_not_descended() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("repo/.git/objects")).unwrap();
        fs::write(dir.path().join("repo/.git/config"), "[core]").unwrap();
        fs::write(dir.path().join("repo/app.py"), "print('x')").unwrap();

        let discoverer = Discoverer::new(dir.path(), &[], true).unwrap();
        let items = collect(&discoverer);

        let repos: Vec<_> = items
            .iter()
            .filter(|i| matches!(i, CrawlItem::GitRepo(_)))
            .collect();
        assert_eq!(repos.len(), 1);
        assert!(!items.iter().any(|i| match i {
            CrawlItem::File(meta) => meta.path_virtual.contains(".git/"),
            _ => false,
        }));
    }

    #[test]
    fn git_markers_suppressed_when_disabled() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        let discoverer = Discoverer::new(dir.path(), &[], false).unwrap();
        assert!(collect(&discoverer).is_empty());
    }
}
