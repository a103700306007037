//! Resolving a module's `source` into a local download location.

pub mod download;

use crate::config::ModuleConfig;
use crate::options::ExecutionOptions;
use crate::traits::FileSystem;
use anyhow::{Result, anyhow};
use sha1::{Digest, Sha1};
use std::path::{Component, Path, PathBuf};
use url::Url;

pub use download::download_terraform_source;

/// Marker written into a download dir recording which source it holds
const VERSION_FILE_NAME: &str = ".tgrun-source-version";

/// Where a module's external source is downloaded and run from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformSource {
    /// Canonical URL of the source, including any `//subdir` and query
    pub canonical_source_url: String,
    /// Directory the whole source root is downloaded into
    pub download_dir: PathBuf,
    /// Directory the engine runs in (download dir plus subdir)
    pub working_dir: PathBuf,
    pub version_file: PathBuf,
}

impl TerraformSource {
    pub fn is_local(&self) -> bool {
        self.canonical_source_url.starts_with("file://")
    }

    /// Identifier of the source version, stored in the version file
    pub fn encode_source_version(&self) -> String {
        sha1_hex(&self.canonical_source_url)
    }

    /// True if the download dir already holds this exact remote source.
    /// Local sources are always re-copied since they change without a new URL.
    pub fn already_have_latest_code(&self, fs: &dyn FileSystem) -> Result<bool> {
        if self.is_local()
            || !fs.exists(&self.download_dir)
            || !fs.exists(&self.working_dir)
            || !fs.is_file(&self.version_file)
        {
            return Ok(false);
        }

        let current = fs.read_to_string(&self.version_file)?;
        Ok(current.trim() == self.encode_source_version())
    }

    pub fn write_version_file(&self, fs: &dyn FileSystem) -> Result<()> {
        fs.write(&self.version_file, &self.encode_source_version())
    }
}

/// Turns an effective source URL into a TerraformSource
pub trait SourceDownloader: Send + Sync {
    fn resolve(&self, source_url: &str, options: &ExecutionOptions) -> Result<TerraformSource>;
}

/// Lays sources out under `options.download_dir`, keyed by working dir and source root
pub struct CacheSourceDownloader;

impl SourceDownloader for CacheSourceDownloader {
    fn resolve(&self, source_url: &str, options: &ExecutionOptions) -> Result<TerraformSource> {
        let canonical_source_url = canonical_source_url(source_url, &options.working_dir)?;
        let (root_url, module_path) = split_source_url(&canonical_source_url);

        let download_dir = options
            .download_dir
            .join(sha1_hex(&options.working_dir.to_string_lossy()))
            .join(sha1_hex(&root_url));

        let working_dir = if module_path.is_empty() {
            download_dir.clone()
        } else {
            download_dir.join(module_path)
        };

        Ok(TerraformSource {
            canonical_source_url,
            version_file: download_dir.join(VERSION_FILE_NAME),
            download_dir,
            working_dir,
        })
    }
}

/// The source to download, if any. A source given on the command line wins
/// over the one declared in config; an empty value means no download.
pub fn effective_source_url(options: &ExecutionOptions, config: &ModuleConfig) -> Option<String> {
    options
        .source
        .as_deref()
        .or_else(|| config.source())
        .map(str::trim)
        .filter(|source| !source.is_empty())
        .map(str::to_string)
}

/// Normalize a source into URL form. Remote URLs and forced getters
/// (`git::...`) pass through; local paths become absolute `file://` URLs.
pub fn canonical_source_url(source: &str, working_dir: &Path) -> Result<String> {
    if let Some(shorthand) = expand_host_shorthand(source) {
        return Ok(shorthand);
    }

    if has_scheme(source) {
        return Ok(source.to_string());
    }

    let (root, subdir) = match source.split_once("//") {
        Some((root, subdir)) => (root, Some(subdir)),
        None => (source, None),
    };

    let root_path = Path::new(root);
    let absolute = if root_path.is_absolute() {
        root_path.to_path_buf()
    } else {
        working_dir.join(root_path)
    };

    let url = Url::from_file_path(normalize_path(&absolute))
        .map_err(|_| anyhow!("Cannot convert {:?} into a file URL", absolute))?;

    Ok(match subdir {
        Some(subdir) => format!("{}//{}", url, subdir),
        None => url.to_string(),
    })
}

/// Split `root//subdir?query` into (`root?query`, `subdir`)
pub fn split_source_url(url: &str) -> (String, String) {
    let (prefix, rest) = match url.find("://") {
        Some(index) => url.split_at(index + 3),
        None => ("", url),
    };

    let (path, query) = match rest.find('?') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };

    match path.find("//") {
        Some(index) => (
            format!("{}{}{}", prefix, &path[..index], query),
            path[index + 2..].to_string(),
        ),
        None => (url.to_string(), String::new()),
    }
}

fn has_scheme(source: &str) -> bool {
    if let Some((getter, _)) = source.split_once("::") {
        if !getter.is_empty() && getter.chars().all(|c| c.is_ascii_alphanumeric()) {
            return true;
        }
    }

    // Single-letter schemes are Windows drive letters, not URLs
    matches!(Url::parse(source), Ok(url) if url.scheme().len() > 1)
}

fn expand_host_shorthand(source: &str) -> Option<String> {
    ["github.com/", "bitbucket.org/"]
        .iter()
        .find(|host| source.starts_with(*host))
        .map(|_| {
            let (root, rest) = split_source_url(source);
            let root = if root.contains(".git") {
                root
            } else {
                match root.split_once('?') {
                    Some((path, query)) => format!("{}.git?{}", path, query),
                    None => format!("{}.git", root),
                }
            };
            if rest.is_empty() {
                format!("git::https://{}", root)
            } else {
                let (path, query) = match root.split_once('?') {
                    Some((path, query)) => (path.to_string(), format!("?{}", query)),
                    None => (root.clone(), String::new()),
                };
                format!("git::https://{}//{}{}", path, rest, query)
            }
        })
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
