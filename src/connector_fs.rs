//! Filesystem scanning into [`SourceFile`]s.
//!
//! Files named directly are always taken. Directories are walked recursively
//! and filtered through the `[scan]` include/exclude globs, matched against
//! the path relative to the directory. Keys are the paths as given on the
//! command line, with `/` separators.
//!
//! Files over their `[limits]` entry are not read: they carry their metadata
//! size and no bytes, and the pipeline skips them on size alone.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::models::{file_extension, SourceFile};

/// `limits` maps lower-case extensions to a maximum size in bytes.
pub fn scan_paths(
    paths: &[PathBuf],
    scan: &ScanConfig,
    limits: &BTreeMap<String, u64>,
) -> Result<Vec<SourceFile>> {
    let include_set = build_globset(&scan.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(scan.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for root in paths {
        if !root.exists() {
            bail!("Path does not exist: {}", root.display());
        }
        if root.is_file() {
            files.push(read_source_file(root, limits)?);
            continue;
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(root).follow_links(scan.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = key_for(relative);

            if exclude_set.is_match(&rel_str) {
                continue;
            }
            if !include_set.is_match(&rel_str) {
                continue;
            }

            found.push(read_source_file(path, limits)?);
        }

        // Sort for deterministic ordering
        found.sort_by(|a, b| a.key.cmp(&b.key));
        files.extend(found);
    }

    tracing::debug!(files = files.len(), "scan finished");
    Ok(files)
}

fn read_source_file(path: &Path, limits: &BTreeMap<String, u64>) -> Result<SourceFile> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let key = key_for(path);
    if exceeds_limit(&key, metadata.len(), limits) {
        tracing::debug!(key = %key, size = metadata.len(), "over size limit; not read");
        return Ok(SourceFile::new(key, Vec::new()).with_size(metadata.len()));
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(SourceFile::new(key, bytes).with_size(metadata.len()))
}

/// True when `size` is over the limit configured for the key's extension.
pub fn exceeds_limit(key: &str, size: u64, limits: &BTreeMap<String, u64>) -> bool {
    file_extension(key)
        .and_then(|ext| limits.get(&ext))
        .is_some_and(|&limit| size > limit)
}

fn key_for(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
