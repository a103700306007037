//! Regex scanning of Terraform source files.
//!
//! This is a heuristic stand-in for parsing HCL: commented-out blocks still
//! match, and unusually formatted JSON may not. Files are matched as raw
//! bytes, so a file in a legacy encoding never aborts a scan. Callers go through the
//! `SourceScanner` trait so a real parser can replace it.

use crate::traits::FileSystem;
use anyhow::Result;
use regex::bytes::Regex;
use std::path::Path;
use std::sync::Arc;

/// Which files under a directory to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceGlob<'a> {
    /// File name suffix, e.g. ".tf" or ".tf.json"
    pub suffix: &'a str,
    /// Descend into subdirectories
    pub recursive: bool,
}

impl<'a> SourceGlob<'a> {
    /// Files with `suffix` directly in the directory (`dir/*.tf`)
    pub fn top_level(suffix: &'a str) -> Self {
        Self {
            suffix,
            recursive: false,
        }
    }

    /// Files with `suffix` anywhere below the directory (`dir/**/*.tf`)
    pub fn recursive(suffix: &'a str) -> Self {
        Self {
            suffix,
            recursive: true,
        }
    }
}

pub trait SourceScanner: Send + Sync {
    /// True if any file selected by `glob` under `root` matches `pattern`
    fn scan_matches(&self, pattern: &Regex, root: &Path, glob: SourceGlob<'_>) -> Result<bool>;
}

/// Scans files through the injected FileSystem
pub struct FileSystemScanner {
    fs: Arc<dyn FileSystem>,
}

impl FileSystemScanner {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl SourceScanner for FileSystemScanner {
    fn scan_matches(&self, pattern: &Regex, root: &Path, glob: SourceGlob<'_>) -> Result<bool> {
        if !self.fs.is_dir(root) {
            return Ok(false);
        }

        let max_depth = if glob.recursive { usize::MAX } else { 1 };

        for path in self.fs.walk_dir(root, max_depth)? {
            let matches_suffix = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(glob.suffix));

            if !matches_suffix || !self.fs.is_file(&path) {
                continue;
            }

            if pattern.is_match(&self.fs.read(&path)?) {
                return Ok(true);
            }
        }

        Ok(false)
    }
}
